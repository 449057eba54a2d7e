use anyhow::{Context, Result};
use clap::Args;
use fleetcheck_core::Plan;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PLAN_FILE: &str = "fleetcheck.yaml";

/// Command-line values that take precedence over the plan file.
#[derive(Debug, Default, Clone, Args)]
pub struct Overrides {
    /// Only run the named suite (repeatable)
    #[arg(long = "suite", value_name = "NAME")]
    pub suites: Vec<String>,
    /// Max probes in flight
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Probe launches per second; 0 disables pacing
    #[arg(long)]
    pub qps: Option<u32>,
    /// Cancel the run after this many seconds; 0 disables the deadline
    #[arg(long)]
    pub deadline_secs: Option<u64>,
}

impl Overrides {
    pub fn apply(&self, plan: &mut Plan) -> Result<()> {
        plan.retain_suites(&self.suites)?;
        if let Some(n) = self.concurrency {
            plan.options.max_in_flight = n;
        }
        if let Some(q) = self.qps {
            plan.options.qps = Some(q).filter(|q| *q > 0);
        }
        if let Some(s) = self.deadline_secs {
            plan.options.deadline = Some(s).filter(|s| *s > 0).map(Duration::from_secs);
        }
        plan.validate()?;
        Ok(())
    }
}

pub fn load_plan(path: Option<&Path>, overrides: &Overrides) -> Result<Plan> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_PLAN_FILE));
    let text = fs::read_to_string(path).with_context(|| format!("reading plan {}", path.display()))?;
    let mut plan = Plan::from_yaml_str(&text).with_context(|| format!("loading plan {}", path.display()))?;
    overrides.apply(&mut plan)?;
    Ok(plan)
}
