//! Worker-pool orchestration of (host, spec) pairs.

use crate::cancel::CancelToken;
use crate::error::{ConfigError, ProbeError};
use crate::outcome::ProbeOutcome;
use crate::plan::{EndpointSpec, Plan};
use crate::probe::Probe;
use crate::ratelimiter::RateLimiter;
use crate::report::{Report, ReportEntry};
use crate::Host;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type ProbeResult = Result<ProbeOutcome, ProbeError>;

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

/// Runs every endpoint of every suite against every host of that suite.
///
/// Probe failures are recorded and the run continues; only an invalid plan
/// aborts, and it does so before the first probe is issued.
#[derive(Clone)]
pub struct FleetRunner {
    probe: Arc<dyn Probe>,
}

struct Launched<'a> {
    suite: &'a str,
    host: &'a Host,
    spec: &'a EndpointSpec,
    handle: JoinHandle<Option<ProbeResult>>,
}

impl FleetRunner {
    pub fn new(probe: Arc<dyn Probe>) -> Self {
        Self { probe }
    }

    /// Validate the plan and confirm every transport it uses has a probe.
    pub fn check(&self, plan: &Plan) -> Result<(), ConfigError> {
        plan.validate()?;
        for spec in plan.suites.iter().flat_map(|s| s.endpoints.iter()) {
            if !self.probe.supports(spec.request.transport) {
                return Err(ConfigError::UnsupportedTransport {
                    endpoint: spec.name.clone(),
                    transport: spec.request.transport,
                });
            }
        }
        Ok(())
    }

    pub async fn run(&self, plan: &Plan, cancel: CancelToken) -> Result<Report, ConfigError> {
        self.check(plan)?;
        let started_at = now_rfc3339();
        let opts = plan.options;
        let pairs_total = plan.pair_count();
        info!(
            suites = plan.suites.len(),
            pairs = pairs_total,
            entries = plan.expected_entries(),
            max_in_flight = opts.max_in_flight,
            "starting fleet run"
        );

        let deadline = opts.deadline.map(|after| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                warn!(after_secs = after.as_secs_f64(), "run deadline reached, cancelling");
                cancel.cancel();
            })
        });
        let pacer = opts.qps.map(RateLimiter::new);
        let slots = Arc::new(Semaphore::new(opts.max_in_flight.max(1)));

        let mut launched = Vec::with_capacity(pairs_total);
        'launch: for suite in &plan.suites {
            for host in &suite.hosts {
                for spec in &suite.endpoints {
                    let permit = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break 'launch,
                        p = slots.clone().acquire_owned() => match p {
                            Ok(p) => p,
                            Err(_) => break 'launch,
                        },
                    };
                    if let Some(pacer) = &pacer {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break 'launch,
                            _ = pacer.acquire() => {}
                        }
                    }
                    let probe = self.probe.clone();
                    let task_host = host.clone();
                    let task_spec = spec.clone();
                    let task_cancel = cancel.clone();
                    let handle = tokio::spawn(async move {
                        let _permit = permit;
                        debug!(host = %task_host, endpoint = %task_spec.name, "probing");
                        tokio::select! {
                            biased;
                            _ = task_cancel.cancelled() => None,
                            r = probe.probe(&task_host, &task_spec.request) => Some(r),
                        }
                    });
                    launched.push(Launched { suite: &suite.name, host, spec, handle });
                }
            }
        }

        let mut pairs_without_entries = pairs_total - launched.len();
        let mut entries = Vec::with_capacity(plan.expected_entries());
        for pair in launched {
            let result = match pair.handle.await {
                Ok(Some(result)) => result,
                Ok(None) => {
                    pairs_without_entries += 1;
                    continue;
                }
                Err(e) => Err(ProbeError::Protocol {
                    host: pair.host.to_string(),
                    cause: format!("probe task failed: {}", e),
                }),
            };
            if let Err(e) = &result {
                debug!(host = %pair.host, endpoint = %pair.spec.name, kind = %e.kind(), error = %e, "probe failed");
            }
            entries.extend(evaluate(pair.suite, pair.host, pair.spec, &result));
        }
        if let Some(d) = deadline {
            d.abort();
        }

        let cancelled = pairs_without_entries > 0;
        let report = Report {
            started_at,
            finished_at: now_rfc3339(),
            cancelled,
            pairs_total,
            pairs_without_entries,
            entries,
        };
        let summary = report.summary();
        if cancelled {
            warn!(skipped_pairs = pairs_without_entries, "run cancelled, report is partial");
        }
        info!(
            entries = summary.total,
            passed = summary.passed,
            failed = summary.failed(),
            "fleet run finished"
        );
        Ok(report)
    }
}

/// One entry per expectation, all evaluated regardless of earlier failures.
pub fn evaluate(suite: &str, host: &Host, spec: &EndpointSpec, result: &ProbeResult) -> Vec<ReportEntry> {
    spec.expectations
        .iter()
        .map(|e| ReportEntry {
            suite: suite.to_string(),
            host: host.clone(),
            endpoint: spec.name.clone(),
            transport: spec.request.transport,
            expectation: e.label(),
            verdict: e.evaluate(result),
        })
        .collect()
}
