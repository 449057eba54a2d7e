//! Wire messages for the node statistics call.
//!
//! Mirrors `proto/vega/api/v1/core.proto`, which declares only the fields the
//! checker reads. prost skips the rest.

use serde_json::{json, Value};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatisticsRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatisticsResponse {
    #[prost(message, optional, tag = "1")]
    pub statistics: Option<Statistics>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Statistics {
    #[prost(uint64, tag = "1")]
    pub block_height: u64,
    #[prost(string, tag = "4")]
    pub genesis_time: String,
    #[prost(string, tag = "5")]
    pub current_time: String,
    #[prost(string, tag = "6")]
    pub vega_time: String,
    #[prost(string, tag = "29")]
    pub app_version: String,
    #[prost(string, tag = "33")]
    pub chain_id: String,
}

impl StatisticsResponse {
    /// JSON view used by field expectations, e.g. `statistics.block_height`.
    pub fn to_json(&self) -> Value {
        match &self.statistics {
            None => json!({ "statistics": null }),
            Some(s) => json!({
                "statistics": {
                    "block_height": s.block_height,
                    "chain_id": s.chain_id,
                    "app_version": s.app_version,
                    "genesis_time": s.genesis_time,
                    "current_time": s.current_time,
                    "vega_time": s.vega_time,
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    const CORE_PROTO: &str = include_str!("../proto/vega/api/v1/core.proto");

    /// Field numbers of `message <name>` in the vendored proto.
    fn proto_fields(message: &str) -> Vec<(String, u32)> {
        let body = CORE_PROTO
            .split(&format!("message {} {{", message))
            .nth(1)
            .and_then(|rest| rest.split('}').next())
            .unwrap();
        body.lines()
            .filter_map(|line| {
                let (decl, number) = line.trim().trim_end_matches(';').split_once(" = ")?;
                Some((decl.split_whitespace().last()?.to_string(), number.parse().ok()?))
            })
            .collect()
    }

    #[test]
    fn tags_match_vendored_proto() {
        let fields = proto_fields("Statistics");
        let names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["block_height", "genesis_time", "current_time", "vega_time", "app_version", "chain_id"]);

        let mut stats = Statistics::default();
        for (name, number) in &fields {
            let mut one = Statistics::default();
            match name.as_str() {
                "block_height" => one.block_height = 7,
                "genesis_time" => one.genesis_time = "g".into(),
                "current_time" => one.current_time = "c".into(),
                "vega_time" => one.vega_time = "v".into(),
                "app_version" => one.app_version = "a".into(),
                "chain_id" => one.chain_id = "x".into(),
                other => panic!("unmapped field {}", other),
            }
            // The first key byte(s) carry the field number shifted past the wire type.
            let wire = one.encode_to_vec();
            let mut key = &wire[..];
            let tag = prost::encoding::decode_varint(&mut key).unwrap() >> 3;
            assert_eq!(tag, u64::from(*number), "{}", name);
            stats.merge(wire.as_slice()).unwrap();
        }
        assert_eq!(stats.chain_id, "x");
        assert_eq!(proto_fields("StatisticsResponse"), [("statistics".to_string(), 1)]);
    }

    #[test]
    fn decodes_known_tags_and_skips_unknown() {
        // block_height=150 (field 1), total_peers=9 (field 3), uptime (field 32)
        // and chain_id (field 33); only 1 and 33 are declared.
        let mut stats = vec![0x08, 150, 1, 0x18, 9, 0x82, 0x02, 3];
        stats.extend_from_slice(b"12h");
        stats.extend_from_slice(&[0x8a, 0x02, 17]);
        stats.extend_from_slice(b"vega-mainnet-0011");
        let mut wire = vec![0x0a, stats.len() as u8];
        wire.extend_from_slice(&stats);

        let resp = StatisticsResponse::decode(wire.as_slice()).unwrap();
        let s = resp.statistics.as_ref().unwrap();
        assert_eq!(s.block_height, 150);
        assert_eq!(s.chain_id, "vega-mainnet-0011");

        let doc = resp.to_json();
        assert_eq!(doc["statistics"]["block_height"], 150);
        assert_eq!(doc["statistics"]["chain_id"], "vega-mainnet-0011");
    }

    #[test]
    fn missing_statistics_is_null() {
        let resp = StatisticsResponse::decode(&[][..]).unwrap();
        assert_eq!(resp.to_json(), json!({ "statistics": null }));
    }
}
