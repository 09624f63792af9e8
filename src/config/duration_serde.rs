//! Serde helpers for human-readable durations (`"1h"`, `"90s"`, or plain seconds).

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::{fmt, time::Duration};

struct DurationVisitor;

impl Visitor<'_> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a duration as seconds (number) or human-readable string (e.g. '90s', '1h')")
    }

    fn visit_u64<E>(self, seconds: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Duration::from_secs(seconds))
    }

    fn visit_i64<E>(self, seconds: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        u64::try_from(seconds)
            .map(Duration::from_secs)
            .map_err(|_| de::Error::custom(format!("Duration cannot be negative: {seconds}")))
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        humantime::parse_duration(value)
            .map_err(|e| de::Error::custom(format!("Invalid duration '{value}': {e}")))
    }
}

pub mod duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DurationVisitor)
    }
}

pub mod option_duration {
    use super::*;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OptionDurationVisitor;

        impl<'de> Visitor<'de> for OptionDurationVisitor {
            type Value = Option<Duration>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("null or a duration")
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(None)
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                super::duration::deserialize(deserializer).map(Some)
            }
        }

        deserializer.deserialize_option(OptionDurationVisitor)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize)]
    struct Sample {
        #[serde(with = "super::duration")]
        ttl: Duration,
        #[serde(default, skip_serializing_if = "Option::is_none", with = "super::option_duration")]
        timeout: Option<Duration>,
    }

    #[test]
    fn test_parses_strings_and_integers() {
        let from_str: Sample = toml::from_str("ttl = \"1h\"\ntimeout = \"30s\"").unwrap();
        assert_eq!(from_str.ttl, Duration::from_secs(3600));
        assert_eq!(from_str.timeout, Some(Duration::from_secs(30)));

        let from_int: Sample = toml::from_str("ttl = 120").unwrap();
        assert_eq!(from_int.ttl, Duration::from_secs(120));
        assert_eq!(from_int.timeout, None);
    }

    #[test]
    fn test_rejects_negative_and_garbage() {
        assert!(toml::from_str::<Sample>("ttl = -5").is_err());
        assert!(toml::from_str::<Sample>("ttl = \"soon\"").is_err());
    }

    #[test]
    fn test_serializes_human_readable() {
        let sample = Sample {
            ttl: Duration::from_secs(5400),
            timeout: None,
        };
        let out = toml::to_string(&sample).unwrap();
        assert!(out.contains("ttl = \"1h 30m\""));
        assert!(!out.contains("timeout"));
    }
}
