//! End-to-end behaviour of the detection pipeline against an in-process
//! cache and a stub compute engine.

mod common;

use bytes::Bytes;
use common::{Fixture, StalledStore, StubEngine, UnreachableStore, default_settings, png_bytes};
use feature_cache::cache::CacheEntry;
use feature_cache::pipeline::PipelineSettings;
use feature_cache::staging::cache_key_for_bytes;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn miss_then_hit_returns_identical_features() {
    let fixture = Fixture::new(StubEngine::ready(), default_settings()).await;
    let image = png_bytes(24, 24, 1);
    assert!(image.len() > 1024);

    let first = fixture
        .pipeline
        .handle(image.clone(), Some("a.png"), "req-a1")
        .await
        .unwrap();
    assert!(!first.cached);
    assert!(first.processing_time_ms >= 0.0);

    let second = fixture
        .pipeline
        .handle(image.clone(), Some("a.png"), "req-a2")
        .await
        .unwrap();
    assert!(second.cached);
    assert_eq!(second.keypoints, first.keypoints);
    assert_eq!(second.descriptor_shape, first.descriptor_shape);

    assert_eq!(fixture.engine.calls(), 1);
    assert_eq!(fixture.staged_files(), 0);

    let stored: Option<CacheEntry> = fixture
        .pipeline
        .cache()
        .get(&cache_key_for_bytes(&image))
        .await;
    assert_eq!(
        stored,
        Some(CacheEntry::new(first.keypoints, first.descriptor_shape))
    );
}

#[tokio::test]
async fn distinct_content_is_computed_separately() {
    let fixture = Fixture::new(StubEngine::ready(), default_settings()).await;

    let a = fixture
        .pipeline
        .handle(png_bytes(16, 16, 1), Some("a.png"), "r1")
        .await
        .unwrap();
    let b = fixture
        .pipeline
        .handle(png_bytes(16, 16, 2), Some("a.png"), "r2")
        .await
        .unwrap();

    assert!(!a.cached);
    assert!(!b.cached);
    assert_eq!(fixture.engine.calls(), 2);
    assert_eq!(fixture.store.len().await, 2);
}

#[tokio::test]
async fn oversized_upload_reports_size() {
    let fixture = Fixture::new(StubEngine::ready(), default_settings()).await;
    let huge = Bytes::from(vec![0u8; 15 * 1024 * 1024]);

    let err = fixture
        .pipeline
        .handle(huge, Some("huge.png"), "r")
        .await
        .unwrap_err();

    assert_eq!(err.code(), "IMAGE_TOO_LARGE");
    let details = err.details();
    let size_mb = details["size_mb"].as_f64().unwrap();
    assert!((size_mb - 15.0).abs() < 0.01);
    assert_eq!(details["max_size_mb"], 10);
    assert_eq!(fixture.staged_files(), 0);
    assert_eq!(fixture.engine.calls(), 0);
}

#[tokio::test]
async fn text_upload_is_invalid() {
    let fixture = Fixture::new(StubEngine::ready(), default_settings()).await;

    let err = fixture
        .pipeline
        .handle(Bytes::from_static(b"hello"), Some("notes.txt"), "r")
        .await
        .unwrap_err();

    assert_eq!(err.code(), "INVALID_IMAGE");
    assert_eq!(fixture.staged_files(), 0);
}

#[tokio::test]
async fn not_ready_rejects_before_any_io() {
    let engine = StubEngine::ready();
    engine.set_ready(false);
    let fixture = Fixture::new(engine, default_settings()).await;

    let err = fixture
        .pipeline
        .handle(png_bytes(16, 16, 3), Some("a.png"), "r")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SERVICE_NOT_READY");
    assert!(err.is_retryable());

    // The gate runs before validation too
    let err = fixture
        .pipeline
        .handle(Bytes::from_static(b"x"), Some("notes.txt"), "r")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SERVICE_NOT_READY");

    assert_eq!(fixture.staged_files(), 0);
    assert!(fixture.store.is_empty().await);
    assert_eq!(fixture.engine.calls(), 0);

    fixture.engine.set_ready(true);
    let result = fixture
        .pipeline
        .handle(png_bytes(16, 16, 3), Some("a.png"), "r")
        .await
        .unwrap();
    assert!(!result.cached);
}

#[tokio::test]
async fn compute_failure_releases_staged_file() {
    let engine = StubEngine::ready();
    engine.set_failing(true);
    let fixture = Fixture::new(engine, default_settings()).await;

    let err = fixture
        .pipeline
        .handle(png_bytes(16, 16, 4), Some("a.png"), "r")
        .await
        .unwrap_err();

    assert_eq!(err.code(), "COMPUTE_FAILED");
    assert!(!err.public_message().contains("stub failure"));
    assert_eq!(fixture.staged_files(), 0);
    assert!(fixture.store.is_empty().await);
}

#[tokio::test]
async fn unreachable_cache_degrades_to_misses() {
    let fixture = Fixture::build(
        StubEngine::ready(),
        default_settings(),
        10,
        Some(Arc::new(UnreachableStore)),
    )
    .await;
    let image = png_bytes(16, 16, 5);

    for request in ["r1", "r2"] {
        let result = fixture
            .pipeline
            .handle(image.clone(), Some("a.png"), request)
            .await
            .unwrap();
        assert!(!result.cached);
    }

    assert_eq!(fixture.engine.calls(), 2);
    assert_eq!(fixture.staged_files(), 0);
    assert!(!fixture.pipeline.cache().ping().await);
}

#[tokio::test]
async fn stalled_cache_degrades_within_deadline() {
    let fixture = Fixture::build(
        StubEngine::ready(),
        default_settings(),
        10,
        Some(Arc::new(StalledStore)),
    )
    .await;
    let image = png_bytes(16, 16, 10);

    for request in ["r1", "r2"] {
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            fixture.pipeline.handle(image.clone(), Some("a.png"), request),
        )
        .await
        .expect("request finished despite a silent cache")
        .unwrap();
        assert!(!result.cached);
    }

    assert_eq!(fixture.engine.calls(), 2);
    assert_eq!(fixture.staged_files(), 0);
    assert!(!fixture.pipeline.cache().ping().await);
}

#[tokio::test]
async fn entries_expire_after_ttl() {
    let settings = PipelineSettings {
        cache_ttl: Duration::from_millis(300),
        ..default_settings()
    };
    let fixture = Fixture::new(StubEngine::ready(), settings).await;
    let image = png_bytes(16, 16, 6);

    let handle = |request: &'static str| {
        let pipeline = fixture.pipeline.clone();
        let image = image.clone();
        async move { pipeline.handle(image, Some("a.png"), request).await.unwrap() }
    };

    assert!(!handle("r1").await.cached);
    assert!(handle("r2").await.cached);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!handle("r3").await.cached);
    assert_eq!(fixture.engine.calls(), 2);
}

#[tokio::test]
async fn disabled_cache_always_computes() {
    let settings = PipelineSettings {
        cache_enabled: false,
        ..default_settings()
    };
    let fixture = Fixture::new(StubEngine::ready(), settings).await;
    let image = png_bytes(16, 16, 7);

    for request in ["r1", "r2"] {
        let result = fixture
            .pipeline
            .handle(image.clone(), Some("a.png"), request)
            .await
            .unwrap();
        assert!(!result.cached);
    }
    assert_eq!(fixture.engine.calls(), 2);
    assert!(fixture.store.is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_flight_collapses_concurrent_misses() {
    let settings = PipelineSettings {
        single_flight: true,
        ..default_settings()
    };
    let fixture = Fixture::new(StubEngine::with_delay(Duration::from_millis(300)), settings).await;
    let image = png_bytes(32, 32, 8);

    let requests: Vec<_> = (0..4)
        .map(|i| {
            let pipeline = fixture.pipeline.clone();
            let image = image.clone();
            tokio::spawn(async move {
                pipeline
                    .handle(image, Some("a.png"), &format!("r{i}"))
                    .await
            })
        })
        .collect();

    let mut keypoints = Vec::new();
    for request in requests {
        keypoints.push(request.await.unwrap().unwrap().keypoints);
    }

    assert_eq!(fixture.engine.calls(), 1);
    assert!(keypoints.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(fixture.staged_files(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_uploads_stage_separately() {
    let fixture = Fixture::new(
        StubEngine::with_delay(Duration::from_millis(100)),
        default_settings(),
    )
    .await;
    let image = png_bytes(32, 32, 9);

    let requests: Vec<_> = (0..3)
        .map(|i| {
            let pipeline = fixture.pipeline.clone();
            let image = image.clone();
            tokio::spawn(async move {
                pipeline
                    .handle(image, Some("a.png"), &format!("r{i}"))
                    .await
            })
        })
        .collect();

    for request in requests {
        assert!(request.await.unwrap().is_ok());
    }
    assert!(fixture.engine.calls() >= 1);
    assert_eq!(fixture.staged_files(), 0);
    assert_eq!(fixture.store.len().await, 1);
}
