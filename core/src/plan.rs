//! Plan file schema and its compiled, immutable form.

use crate::error::ConfigError;
use crate::expect::{is_valid_path, Expectation};
use crate::probe::ProbeTimeouts;
use crate::request::{Decode, RequestDescriptor, TransportKind};
use crate::Host;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanConfig {
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    pub max_in_flight: Option<usize>,
    pub qps: Option<u32>,
    pub deadline_secs: Option<u64>,
    /// Named header maps endpoints can pull in with `headers_from`.
    #[serde(default)]
    pub header_sets: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub suites: Vec<SuiteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    pub http_ms: u64,
    pub grpc_dial_ms: u64,
    pub grpc_call_ms: u64,
    pub ws_connect_ms: u64,
    pub ws_read_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        let d = ProbeTimeouts::default();
        let ms = |t: Duration| t.as_millis() as u64;
        Self {
            http_ms: ms(d.http),
            grpc_dial_ms: ms(d.grpc_dial),
            grpc_call_ms: ms(d.grpc_call),
            ws_connect_ms: ms(d.ws_connect),
            ws_read_ms: ms(d.ws_read),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    pub name: String,
    #[serde(default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub name: String,
    pub transport: TransportKind,
    #[serde(default)]
    pub path: String,
    pub port: Option<u16>,
    #[serde(default = "default_secure")]
    pub secure: bool,
    #[serde(default)]
    pub headers_from: Vec<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    #[serde(default)]
    pub decode: Decode,
    pub expect_status: Option<u16>,
    #[serde(default)]
    pub expect_headers_once: Vec<String>,
    #[serde(default)]
    pub expect: Vec<Expectation>,
}

fn default_secure() -> bool {
    true
}

/// A request plus the checks every host must pass for it.
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    pub name: String,
    pub request: RequestDescriptor,
    pub expectations: Vec<Expectation>,
}

impl EndpointSpec {
    pub fn new(name: impl Into<String>, request: RequestDescriptor) -> Self {
        Self { name: name.into(), request, expectations: Vec::new() }
    }

    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Suite {
    pub name: String,
    pub hosts: Vec<Host>,
    pub endpoints: Vec<Arc<EndpointSpec>>,
}

impl Suite {
    pub fn new(name: impl Into<String>, hosts: Vec<Host>, endpoints: Vec<EndpointSpec>) -> Self {
        Self { name: name.into(), hosts, endpoints: endpoints.into_iter().map(Arc::new).collect() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub max_in_flight: usize,
    /// Probe launches per second; `None` disables pacing.
    pub qps: Option<u32>,
    /// Overall run deadline; in-flight probes are cancelled when it elapses.
    pub deadline: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { max_in_flight: DEFAULT_MAX_IN_FLIGHT, qps: None, deadline: None }
    }
}

/// Everything one run needs. Immutable once the runner starts.
#[derive(Debug, Clone)]
pub struct Plan {
    pub suites: Vec<Suite>,
    pub timeouts: ProbeTimeouts,
    pub options: RunOptions,
}

impl Plan {
    pub fn new(suites: Vec<Suite>) -> Self {
        Self { suites, timeouts: ProbeTimeouts::default(), options: RunOptions::default() }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: PlanConfig = serde_yaml::from_str(text)?;
        cfg.compile()
    }

    /// Number of (host, spec) pairs.
    pub fn pair_count(&self) -> usize {
        self.suites.iter().map(|s| s.hosts.len() * s.endpoints.len()).sum()
    }

    /// Number of report entries a complete run produces.
    pub fn expected_entries(&self) -> usize {
        self.suites
            .iter()
            .map(|s| s.hosts.len() * s.endpoints.iter().map(|e| e.expectations.len()).sum::<usize>())
            .sum()
    }

    /// Keep only the named suites, in declaration order.
    pub fn retain_suites(&mut self, names: &[String]) -> Result<(), ConfigError> {
        if names.is_empty() {
            return Ok(());
        }
        if let Some(unknown) = names.iter().find(|n| !self.suites.iter().any(|s| &s.name == *n)) {
            return Err(ConfigError::UnknownSuite(unknown.clone()));
        }
        self.suites.retain(|s| names.contains(&s.name));
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.suites.is_empty() {
            return Err(ConfigError::NoSuites);
        }
        if self.options.max_in_flight == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        let t = &self.timeouts;
        for (name, d) in [
            ("http", t.http),
            ("grpc_dial", t.grpc_dial),
            ("grpc_call", t.grpc_call),
            ("ws_connect", t.ws_connect),
            ("ws_read", t.ws_read),
        ] {
            if d.is_zero() {
                return Err(ConfigError::ZeroTimeout(name));
            }
        }
        let mut suite_names = HashSet::new();
        for suite in &self.suites {
            if !suite_names.insert(suite.name.as_str()) {
                return Err(ConfigError::DuplicateSuite(suite.name.clone()));
            }
            if suite.hosts.is_empty() {
                return Err(ConfigError::NoHosts(suite.name.clone()));
            }
            if suite.endpoints.is_empty() {
                return Err(ConfigError::NoEndpoints(suite.name.clone()));
            }
            let mut names = HashSet::new();
            for spec in &suite.endpoints {
                if !names.insert(spec.name.as_str()) {
                    return Err(ConfigError::DuplicateEndpoint {
                        suite: suite.name.clone(),
                        endpoint: spec.name.clone(),
                    });
                }
                if spec.expectations.is_empty() {
                    return Err(ConfigError::NoExpectations(spec.name.clone()));
                }
                for e in &spec.expectations {
                    if let Expectation::FieldSatisfies { path, .. } = e {
                        if !is_valid_path(path) {
                            return Err(ConfigError::InvalidFieldPath {
                                endpoint: spec.name.clone(),
                                path: path.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl PlanConfig {
    pub fn compile(self) -> Result<Plan, ConfigError> {
        let t = &self.timeouts;
        let timeouts = ProbeTimeouts {
            http: Duration::from_millis(t.http_ms),
            grpc_dial: Duration::from_millis(t.grpc_dial_ms),
            grpc_call: Duration::from_millis(t.grpc_call_ms),
            ws_connect: Duration::from_millis(t.ws_connect_ms),
            ws_read: Duration::from_millis(t.ws_read_ms),
        };
        let options = RunOptions {
            max_in_flight: self.max_in_flight.unwrap_or(DEFAULT_MAX_IN_FLIGHT),
            qps: self.qps.filter(|q| *q > 0),
            deadline: self.deadline_secs.filter(|s| *s > 0).map(Duration::from_secs),
        };
        let mut suites = Vec::with_capacity(self.suites.len());
        for suite in self.suites {
            let mut endpoints = Vec::with_capacity(suite.endpoints.len());
            for ep in suite.endpoints {
                endpoints.push(compile_endpoint(ep, &self.header_sets)?);
            }
            suites.push(Suite::new(suite.name, suite.hosts, endpoints));
        }
        let plan = Plan { suites, timeouts, options };
        plan.validate()?;
        Ok(plan)
    }
}

fn compile_endpoint(
    ep: EndpointConfig,
    header_sets: &BTreeMap<String, BTreeMap<String, String>>,
) -> Result<EndpointSpec, ConfigError> {
    let mut layers = Vec::with_capacity(ep.headers_from.len() + 1);
    for set in &ep.headers_from {
        let headers = header_sets.get(set).ok_or_else(|| ConfigError::UnknownHeaderSet {
            endpoint: ep.name.clone(),
            set: set.clone(),
        })?;
        layers.push(headers);
    }
    layers.push(&ep.headers);

    let mut expectations = Vec::new();
    if let Some(status) = ep.expect_status {
        expectations.push(Expectation::status(status));
    }
    expectations.extend(ep.expect_headers_once.iter().map(|h| Expectation::header_once(h)));
    expectations.extend(ep.expect);

    let request = RequestDescriptor {
        transport: ep.transport,
        path: ep.path,
        port: ep.port,
        secure: ep.secure,
        headers: merge_headers(layers),
        body: ep.body,
        decode: ep.decode,
    };
    Ok(EndpointSpec { name: ep.name, request, expectations })
}

/// Flatten header layers; a later layer replaces an earlier value for the
/// same name regardless of case. Output is sorted by lowercase name.
pub fn merge_headers<'a, I>(layers: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = &'a BTreeMap<String, String>>,
{
    let mut merged: BTreeMap<String, (String, String)> = BTreeMap::new();
    for layer in layers {
        for (k, v) in layer {
            merged.insert(k.to_ascii_lowercase(), (k.clone(), v.clone()));
        }
    }
    merged.into_values().collect()
}
