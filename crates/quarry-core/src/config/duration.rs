//! Serde helpers for human-readable durations (`"500ms"`, `"5m"`).
//!
//! Bare integers are accepted as seconds.

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

#[derive(Deserialize)]
#[serde(untagged)]
enum Raw {
    Text(String),
    Seconds(u64),
}

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
    match Raw::deserialize(deserializer)? {
        Raw::Text(text) => humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom),
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
    }
}

/// Same as the parent module, for `Option<Duration>` fields.
pub mod option {
    use super::*;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => super::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Text(text)) => humantime::parse_duration(text.trim())
                .map(Some)
                .map_err(serde::de::Error::custom),
            Some(Raw::Seconds(secs)) => Ok(Some(Duration::from_secs(secs))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Holder {
        #[serde(with = "super")]
        ttl: Duration,
    }

    #[test]
    fn test_parses_text_and_seconds() {
        let h: Holder = serde_json::from_str(r#"{"ttl": "5m"}"#).unwrap();
        assert_eq!(h.ttl, Duration::from_secs(300));

        let h: Holder = serde_json::from_str(r#"{"ttl": "250ms"}"#).unwrap();
        assert_eq!(h.ttl, Duration::from_millis(250));

        let h: Holder = serde_json::from_str(r#"{"ttl": 7}"#).unwrap();
        assert_eq!(h.ttl, Duration::from_secs(7));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(serde_json::from_str::<Holder>(r#"{"ttl": "soon"}"#).is_err());
    }

    #[test]
    fn test_serializes_as_text() {
        let json = serde_json::to_string(&Holder { ttl: Duration::from_secs(90) }).unwrap();
        assert_eq!(json, r#"{"ttl":"1m 30s"}"#);
    }
}
