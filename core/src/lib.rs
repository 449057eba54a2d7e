//! Core model and engine for fleet conformance checks.
//!
//! A [`Plan`] groups hosts and endpoint specs into suites. The [`FleetRunner`]
//! probes every (host, spec) pair through a [`Probe`], evaluates each declared
//! [`Expectation`] against the result and collects a [`Report`].

pub mod cancel;
pub mod error;
pub mod expect;
pub mod outcome;
pub mod plan;
pub mod probe;
pub mod ratelimiter;
pub mod report;
pub mod request;
pub mod runner;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use cancel::CancelToken;
pub use error::{ConfigError, FailureKind, ProbeError};
pub use expect::{Expectation, Predicate, Verdict};
pub use outcome::{HeaderMultiMap, Payload, ProbeOutcome};
pub use plan::{EndpointSpec, Plan, PlanConfig, RunOptions, Suite};
pub use probe::{Probe, ProbeSet, ProbeTimeouts};
pub use report::{Report, ReportEntry, Summary};
pub use request::{Decode, RequestDescriptor, TransportKind};
pub use runner::FleetRunner;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// A fleet node, addressed by hostname.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Host(pub String);

impl Host {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Host {
    fn from(s: &str) -> Self {
        Host(s.to_string())
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
