use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use ulid::Ulid;

/// Header carrying an upstream request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id attached to every [`Request`](crate::Request).
///
/// Resolution failures and written errors log it, and handlers can ask for it
/// through [`value::request_id`](crate::value::request_id). Ids are ULIDs, so
/// they sort by the time the request entered the binder.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct RequestId(Ulid);

impl RequestId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Adopt the caller's `x-request-id` when it is a ULID, otherwise mint one.
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        let Some(raw) = header_value.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::new();
        };
        match raw.parse::<RequestId>() {
            Ok(id) => id,
            Err(err) => {
                debug!(header = REQUEST_ID_HEADER, value = raw, error = %err, "ignoring upstream request id");
                Self::new()
            }
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Milliseconds since the Unix epoch at which the id was minted.
    pub fn issued_at_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|err| serde::de::Error::custom(format!("invalid request id {s:?}: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_id_is_reused() {
        let id = RequestId::new();
        let parsed = RequestId::from_header_or_new(Some(&format!("  {id} ")));
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_garbage_or_blank_header_mints_new_id() {
        let a = RequestId::from_header_or_new(Some("not-a-ulid"));
        let b = RequestId::from_header_or_new(Some("   "));
        let c = RequestId::from_header_or_new(None);
        assert_ne!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn test_request_id_is_a_json_string() {
        let id = RequestId::new();
        let encoded = serde_json::to_value(id).unwrap();
        assert_eq!(encoded, serde_json::Value::String(id.to_string()));
        let decoded: RequestId = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, id);

        let err = serde_json::from_str::<RequestId>("\"nope\"").unwrap_err();
        assert!(err.to_string().contains("invalid request id"));
    }

    #[test]
    fn test_issued_at_tracks_mint_time() {
        let id = RequestId::new();
        assert_eq!(id.issued_at_ms(), id.as_ulid().timestamp_ms());
        assert!(id.issued_at_ms() > 0);
    }
}
