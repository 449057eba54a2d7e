//! Declarative checks applied to probe results.

use crate::error::{FailureKind, ProbeError};
use crate::outcome::ProbeOutcome;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One named check. Evaluation is pure: the verdict depends only on the probe
/// result, never on other expectations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expectation {
    StatusEquals { expected: u16 },
    /// Zero values and duplicated values both fail.
    HeaderPresentExactlyOnce { name: String },
    /// `path` is dot separated; numeric segments index arrays.
    FieldSatisfies { path: String, predicate: Predicate },
    /// Negative contract: passes only when the exchange fails.
    ConnectionRejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Contains { value: String },
    /// Compares the textual form of a scalar.
    Equals { value: String },
    GreaterThan { value: f64 },
    NonEmpty,
    Matches {
        #[serde(with = "pattern")]
        pattern: Regex,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail { kind: FailureKind, detail: String },
}

impl Verdict {
    fn violation(detail: String) -> Self {
        Verdict::Fail { kind: FailureKind::Violation, detail }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Verdict::Pass => None,
            Verdict::Fail { kind, .. } => Some(*kind),
        }
    }
}

impl Expectation {
    pub fn status(expected: u16) -> Self {
        Expectation::StatusEquals { expected }
    }

    pub fn header_once(name: &str) -> Self {
        Expectation::HeaderPresentExactlyOnce { name: name.to_string() }
    }

    pub fn field(path: &str, predicate: Predicate) -> Self {
        Expectation::FieldSatisfies { path: path.to_string(), predicate }
    }

    /// Evaluate against a probe result. A probe error fails every positive
    /// expectation with the error's kind and message as detail.
    pub fn evaluate(&self, result: &Result<ProbeOutcome, ProbeError>) -> Verdict {
        match (self, result) {
            (Expectation::ConnectionRejected, Err(_)) => Verdict::Pass,
            (_, Err(e)) => Verdict::Fail { kind: e.kind(), detail: e.to_string() },
            (_, Ok(outcome)) => self.check(outcome),
        }
    }

    fn check(&self, outcome: &ProbeOutcome) -> Verdict {
        match self {
            Expectation::StatusEquals { expected } => {
                if outcome.status == *expected {
                    Verdict::Pass
                } else {
                    Verdict::violation(format!("expected status {}, got {}", expected, outcome.status))
                }
            }
            Expectation::HeaderPresentExactlyOnce { name } => match outcome.headers.get_all(name) {
                [_] => Verdict::Pass,
                [] => Verdict::violation(format!("header '{}' is missing", name)),
                values => Verdict::violation(format!(
                    "header '{}' appears {} times: {:?}",
                    name,
                    values.len(),
                    values
                )),
            },
            Expectation::FieldSatisfies { path, predicate } => {
                let Some(doc) = outcome.payload.as_json() else {
                    return Verdict::Fail {
                        kind: FailureKind::Protocol,
                        detail: format!("payload is not JSON, cannot read '{}'", path),
                    };
                };
                match lookup(doc, path) {
                    None => Verdict::violation(format!("field '{}' is missing", path)),
                    Some(v) => match predicate.test(v) {
                        Ok(()) => Verdict::Pass,
                        Err(why) => Verdict::violation(format!("field '{}' {}", path, why)),
                    },
                }
            }
            Expectation::ConnectionRejected => {
                Verdict::violation(format!("connection was accepted (status {})", outcome.status))
            }
        }
    }

    /// Stable human-readable identity used in reports.
    pub fn label(&self) -> String {
        match self {
            Expectation::StatusEquals { expected } => format!("status == {}", expected),
            Expectation::HeaderPresentExactlyOnce { name } => {
                format!("header {} exactly once", name.to_ascii_lowercase())
            }
            Expectation::FieldSatisfies { path, predicate } => format!("{} {}", path, predicate),
            Expectation::ConnectionRejected => "connection rejected".to_string(),
        }
    }
}

impl Predicate {
    pub fn contains(value: &str) -> Self {
        Predicate::Contains { value: value.to_string() }
    }

    pub fn equals(value: &str) -> Self {
        Predicate::Equals { value: value.to_string() }
    }

    pub fn greater_than(value: f64) -> Self {
        Predicate::GreaterThan { value }
    }

    fn test(&self, v: &Value) -> Result<(), String> {
        match self {
            Predicate::Contains { value } => match scalar_text(v) {
                Some(s) if s.contains(value.as_str()) => Ok(()),
                Some(s) => Err(format!("is {:?}, expected it to contain {:?}", s, value)),
                None => Err(format!("is not a scalar: {}", v)),
            },
            Predicate::Equals { value } => match scalar_text(v) {
                Some(s) if s == *value => Ok(()),
                Some(s) => Err(format!("is {:?}, expected {:?}", s, value)),
                None => Err(format!("is not a scalar: {}", v)),
            },
            Predicate::GreaterThan { value } => match numeric(v) {
                Some(n) if n > *value => Ok(()),
                Some(n) => Err(format!("is {}, expected greater than {}", n, value)),
                None => Err(format!("is not numeric: {}", v)),
            },
            Predicate::NonEmpty => {
                let empty = match v {
                    Value::Null => true,
                    Value::String(s) => s.is_empty(),
                    Value::Array(a) => a.is_empty(),
                    Value::Object(o) => o.is_empty(),
                    Value::Bool(_) | Value::Number(_) => false,
                };
                if empty { Err(format!("is empty: {}", v)) } else { Ok(()) }
            }
            Predicate::Matches { pattern } => match scalar_text(v) {
                Some(s) if pattern.is_match(&s) => Ok(()),
                Some(s) => Err(format!("is {:?}, expected to match /{}/", s, pattern.as_str())),
                None => Err(format!("is not a scalar: {}", v)),
            },
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Contains { value } => write!(f, "contains {:?}", value),
            Predicate::Equals { value } => write!(f, "equals {:?}", value),
            Predicate::GreaterThan { value } => write!(f, "> {}", value),
            Predicate::NonEmpty => f.write_str("non-empty"),
            Predicate::Matches { pattern } => write!(f, "matches /{}/", pattern.as_str()),
        }
    }
}

/// A path is valid when every dot-separated segment is non-empty.
pub fn is_valid_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(|seg| !seg.is_empty())
}

pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |cur, seg| match cur {
        Value::Object(map) => map.get(seg),
        Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

mod pattern {
    use regex::Regex;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(re: &Regex, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(re.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Regex, D::Error> {
        let raw = String::deserialize(d)?;
        Regex::new(&raw).map_err(D::Error::custom)
    }
}
