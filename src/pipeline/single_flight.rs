//! Per-key deduplication of concurrent computations

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

type Inflight<T> = Arc<Mutex<HashMap<String, watch::Receiver<Option<T>>>>>;

/// Map of keys with a computation in progress.
///
/// The first caller for a key becomes the leader. Later callers follow and
/// receive the leader's value. If the leader goes away without publishing
/// (error, panic, cancellation) followers see `None` and fall back to
/// computing on their own.
#[derive(Debug)]
pub struct SingleFlight<T> {
    inflight: Inflight<T>,
}

impl<T> Clone for SingleFlight<T> {
    fn clone(&self) -> Self {
        Self {
            inflight: self.inflight.clone(),
        }
    }
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

pub enum Flight<T> {
    Leader(FlightLeader<T>),
    Follower(FlightFollower<T>),
}

/// Held by the caller doing the work; the key stays claimed until drop
pub struct FlightLeader<T> {
    key: String,
    sender: watch::Sender<Option<T>>,
    inflight: Inflight<T>,
}

pub struct FlightFollower<T> {
    receiver: watch::Receiver<Option<T>>,
}

fn lock<T>(inflight: &Inflight<T>) -> MutexGuard<'_, HashMap<String, watch::Receiver<Option<T>>>> {
    // Critical sections never panic, but a poisoned map is still usable
    inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or join the computation already running for it
    pub fn join(&self, key: &str) -> Flight<T> {
        let mut inflight = lock(&self.inflight);
        if let Some(receiver) = inflight.get(key) {
            return Flight::Follower(FlightFollower {
                receiver: receiver.clone(),
            });
        }

        let (sender, receiver) = watch::channel(None);
        inflight.insert(key.to_string(), receiver);
        Flight::Leader(FlightLeader {
            key: key.to_string(),
            sender,
            inflight: self.inflight.clone(),
        })
    }

    /// Keys currently claimed by a leader
    pub fn in_progress(&self) -> usize {
        lock(&self.inflight).len()
    }
}

impl<T> FlightLeader<T> {
    /// Publish the result to every follower and release the key
    pub fn complete(self, value: T) {
        self.sender.send_replace(Some(value));
    }
}

impl<T> Drop for FlightLeader<T> {
    fn drop(&mut self) {
        lock(&self.inflight).remove(&self.key);
    }
}

impl<T: Clone> FlightFollower<T> {
    /// The leader's value, or `None` when it gave up
    pub async fn wait(mut self) -> Option<T> {
        match self.receiver.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_followers_receive_leader_value() {
        let flights = SingleFlight::<u64>::new();

        let Flight::Leader(leader) = flights.join("k") else {
            panic!("first caller must lead");
        };
        let Flight::Follower(follower) = flights.join("k") else {
            panic!("second caller must follow");
        };
        assert_eq!(flights.in_progress(), 1);

        let waiter = tokio::spawn(follower.wait());
        tokio::time::sleep(Duration::from_millis(10)).await;
        leader.complete(42);

        assert_eq!(waiter.await.unwrap(), Some(42));
        assert_eq!(flights.in_progress(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_leader_releases_followers() {
        let flights = SingleFlight::<u64>::new();
        let leader = flights.join("k");
        let Flight::Follower(follower) = flights.join("k") else {
            panic!("second caller must follow");
        };

        drop(leader);
        assert_eq!(follower.wait().await, None);
        assert!(matches!(flights.join("k"), Flight::Leader(_)));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let flights = SingleFlight::<u64>::new();
        let _a = flights.join("a");
        assert!(matches!(flights.join("b"), Flight::Leader(_)));
    }
}
