use crate::request::TransportKind;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why a report entry failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The exchange never completed: connect, dial, readiness, RPC or timeout.
    Transport,
    /// A reply arrived but could not be interpreted.
    Protocol,
    /// A valid reply failed a declared check.
    Violation,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Transport => "transport",
            FailureKind::Protocol => "protocol",
            FailureKind::Violation => "violation",
        })
    }
}

/// Failure of a single probe. Always local to one (host, spec) pair.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("{host}: invalid request: {cause}")]
    InvalidTarget { host: String, cause: String },
    #[error("{host}: no probe handles {transport}")]
    Unsupported { host: String, transport: TransportKind },
    #[error("{host}: connection failed: {cause}")]
    Connect { host: String, cause: String },
    #[error("{host}: {stage} timed out after {}ms", after.as_millis())]
    Timeout { host: String, stage: &'static str, after: Duration },
    #[error("{host}: dial failed: {cause}")]
    Dial { host: String, cause: String },
    #[error("{host}: connection not ready: {cause}")]
    NotReady { host: String, cause: String },
    #[error("{host}: rpc failed: {cause}")]
    Rpc { host: String, cause: String },
    #[error("{host}: invalid response: {cause}")]
    Protocol { host: String, cause: String },
}

impl ProbeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProbeError::Protocol { .. } => FailureKind::Protocol,
            _ => FailureKind::Transport,
        }
    }

    pub fn host(&self) -> &str {
        match self {
            ProbeError::InvalidTarget { host, .. }
            | ProbeError::Unsupported { host, .. }
            | ProbeError::Connect { host, .. }
            | ProbeError::Timeout { host, .. }
            | ProbeError::Dial { host, .. }
            | ProbeError::NotReady { host, .. }
            | ProbeError::Rpc { host, .. }
            | ProbeError::Protocol { host, .. } => host,
        }
    }
}

/// Render an error with its whole source chain, `outer: inner: root`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        let s = e.to_string();
        if !out.ends_with(&s) {
            out.push_str(": ");
            out.push_str(&s);
        }
        source = e.source();
    }
    out
}

/// A plan that cannot be run. Raised before any probe is issued.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse plan: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("plan declares no suites")]
    NoSuites,
    #[error("suite '{0}' is declared more than once")]
    DuplicateSuite(String),
    #[error("suite '{0}' declares no hosts")]
    NoHosts(String),
    #[error("suite '{0}' declares no endpoints")]
    NoEndpoints(String),
    #[error("suite '{suite}' declares endpoint '{endpoint}' more than once")]
    DuplicateEndpoint { suite: String, endpoint: String },
    #[error("endpoint '{endpoint}' references unknown header set '{set}'")]
    UnknownHeaderSet { endpoint: String, set: String },
    #[error("endpoint '{0}' declares no expectations")]
    NoExpectations(String),
    #[error("endpoint '{endpoint}' has invalid field path '{path}'")]
    InvalidFieldPath { endpoint: String, path: String },
    #[error("timeout '{0}' must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("max_in_flight must be greater than zero")]
    ZeroConcurrency,
    #[error("endpoint '{endpoint}' uses {transport}, which no configured probe handles")]
    UnsupportedTransport { endpoint: String, transport: TransportKind },
    #[error("no suite named '{0}'")]
    UnknownSuite(String),
}
