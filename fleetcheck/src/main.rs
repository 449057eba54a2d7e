use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fleetcheck_core::{CancelToken, FleetRunner, Plan};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

mod config;
mod probes;
mod render;

use config::Overrides;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Jsonl,
    Csv,
}

#[derive(Debug, Parser)]
#[command(name = "fleetcheck", version, about = "Conformance checks for a fleet of API nodes")]
struct Cli {
    /// Plan file (YAML). If omitted, loads ./fleetcheck.yaml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// More logging on stderr (-v debug, -vv trace). RUST_LOG wins when set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Probe every host of every suite and report each expectation
    Run {
        #[command(flatten)]
        overrides: Overrides,
        /// Output format: text, json, jsonl or csv
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Output file (overwrites); stdout when omitted
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Only emit failing entries (the text summary still counts everything)
        #[arg(long, default_value_t = false)]
        failures_only: bool,
    },
    /// Validate the plan without probing anything
    Check {
        #[command(flatten)]
        overrides: Overrides,
    },
    /// List suites, endpoints and their expectations
    List {
        #[command(flatten)]
        overrides: Overrides,
    },
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Version => {
            println!("fleetcheck {}", fleetcheck_core::version());
        }
        Commands::Check { overrides } => {
            let plan = config::load_plan(config, &overrides)?;
            FleetRunner::new(probes::build(&plan)?).check(&plan)?;
            println!(
                "plan ok: {} suites, {} probes, {} expectations",
                plan.suites.len(),
                plan.pair_count(),
                plan.expected_entries()
            );
        }
        Commands::List { overrides } => {
            let plan = config::load_plan(config, &overrides)?;
            print!("{}", render::outline(&plan));
        }
        Commands::Run { overrides, format, out, failures_only } => {
            let plan = config::load_plan(config, &overrides)?;
            return run(&plan, format, out, failures_only);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run(plan: &Plan, format: OutputFormat, out: Option<PathBuf>, failures_only: bool) -> Result<ExitCode> {
    let runner = FleetRunner::new(probes::build(plan)?);
    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        let cancel = CancelToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling in-flight probes");
                on_interrupt.cancel();
            }
        });
        runner.run(plan, cancel).await
    })?;

    let summary = report.summary();
    info!(
        total = summary.total,
        passed = summary.passed,
        failed = summary.failed(),
        cancelled = report.cancelled,
        "run finished"
    );

    match out {
        Some(path) => {
            let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            let mut w = BufWriter::new(file);
            render::write_report(&mut w, &report, format, failures_only)?;
            w.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            render::write_report(&mut w, &report, format, failures_only)?;
            w.flush()?;
        }
    }
    Ok(if report.is_passing() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
