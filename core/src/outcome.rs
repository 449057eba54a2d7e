use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Header or gRPC metadata values keyed by lowercase name.
///
/// Every received value is kept, in arrival order. Duplicate headers are a
/// defect class the checker must be able to see, so nothing is merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HeaderMultiMap(BTreeMap<String, Vec<String>>);

impl HeaderMultiMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.0
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// All values received for `name` (case-insensitive), empty when absent.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.0
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn count(&self, name: &str) -> usize {
        self.get_all(name).len()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderMultiMap
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = HeaderMultiMap::new();
        for (k, v) in iter {
            map.append(k.as_ref(), v);
        }
        map
    }
}

/// Response body as seen by expectations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Empty,
    Text(String),
    Json(Value),
}

impl Payload {
    /// Decode a body opportunistically: JSON when it parses, text otherwise.
    pub fn from_body(bytes: &[u8]) -> Self {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Payload::Empty;
        }
        match serde_json::from_slice::<Value>(bytes) {
            Ok(v) => Payload::Json(v),
            Err(_) => Payload::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// Normalized result of one request/response cycle.
///
/// `status` is the HTTP status for HTTP probes, the handshake status for
/// WebSocket probes and the gRPC status code for gRPC probes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutcome {
    pub status: u16,
    pub headers: HeaderMultiMap,
    pub payload: Payload,
}

impl ProbeOutcome {
    pub fn new(status: u16) -> Self {
        Self { status, headers: HeaderMultiMap::new(), payload: Payload::Empty }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_kept_in_order() {
        let map: HeaderMultiMap =
            [("X-Node-Id", "a"), ("x-node-id", "b"), ("Vary", "Origin")].into_iter().collect();
        assert_eq!(map.get_all("X-NODE-ID"), ["a".to_string(), "b".to_string()]);
        assert_eq!(map.count("vary"), 1);
        assert_eq!(map.count("missing"), 0);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn body_decoding() {
        assert_eq!(Payload::from_body(b""), Payload::Empty);
        assert_eq!(Payload::from_body(b" \n"), Payload::Empty);
        assert_eq!(Payload::from_body(b"<html/>"), Payload::Text("<html/>".into()));
        let p = Payload::from_body(br#"{"data":{"ok":true}}"#);
        assert_eq!(p.as_json().unwrap()["data"]["ok"], Value::Bool(true));
    }
}
