use crate::error::FailureKind;
use crate::expect::Verdict;
use crate::request::TransportKind;
use crate::Host;
use serde::Serialize;

/// Verdict of one expectation for one (host, endpoint) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub suite: String,
    pub host: Host,
    pub endpoint: String,
    pub transport: TransportKind,
    pub expectation: String,
    #[serde(flatten)]
    pub verdict: Verdict,
}

impl ReportEntry {
    pub fn is_failure(&self) -> bool {
        !self.verdict.is_pass()
    }

    pub fn detail(&self) -> Option<&str> {
        match &self.verdict {
            Verdict::Pass => None,
            Verdict::Fail { detail, .. } => Some(detail),
        }
    }
}

/// Result of one run, entries in declaration order (suite, host, endpoint,
/// expectation).
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub started_at: String,
    pub finished_at: String,
    /// Set when the run was cut short and some pairs produced no entries.
    pub cancelled: bool,
    pub pairs_total: usize,
    pub pairs_without_entries: usize,
    pub entries: Vec<ReportEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub transport: usize,
    pub protocol: usize,
    pub violations: usize,
}

impl Summary {
    pub fn failed(&self) -> usize {
        self.transport + self.protocol + self.violations
    }
}

impl Report {
    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.is_failure())
    }

    /// Complete and without a single failing entry.
    pub fn is_passing(&self) -> bool {
        !self.cancelled && self.failures().next().is_none()
    }

    pub fn summary(&self) -> Summary {
        self.entries.iter().fold(Summary::default(), |mut s, e| {
            s.total += 1;
            match e.verdict.failure_kind() {
                None => s.passed += 1,
                Some(FailureKind::Transport) => s.transport += 1,
                Some(FailureKind::Protocol) => s.protocol += 1,
                Some(FailureKind::Violation) => s.violations += 1,
            }
            s
        })
    }
}
