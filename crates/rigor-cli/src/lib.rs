//! # rigor-cli
//!
//! Command-line front end for Rigor test binaries.
//!
//! A test binary registers its classes and hands them to [`run_main`]:
//!
//! ```no_run
//! use rigor_core::TestCaseEntry;
//! use std::process::ExitCode;
//!
//! fn main() -> ExitCode {
//!     let entries = vec![
//!         TestCaseEntry::new("SmokeTests").test("test_boots", |ctx| ctx.assert_true(true, "")),
//!     ];
//!     rigor_cli::run_main(&entries)
//! }
//! ```
//!
//! ```text
//! ┌──────────┐     ┌──────────────┐     ┌────────────────┐
//! │   Args   │────▶│ run_with_args│────▶│ RunEnvironment │
//! └──────────┘     └──────────────┘     └────────────────┘
//!                         │                      │
//!                         ▼                      ▼
//!                  ┌─────────────┐      ┌───────────────┐
//!                  │   listing   │      │ PrintObserver │
//!                  └─────────────┘      └───────────────┘
//! ```

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use rigor_core::{
    ConfigError, ListingError, RigorConfig, RunEnvironment, TestCaseEntry, TestFilter,
    build_root_suite, human_readable_listing, json_listing,
};
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

mod args;
mod print_observer;

pub use args::{Args, ExecutionMode, ListingFormat};
pub use print_observer::{PrintObserver, suite_summary};

/// Errors surfaced by the command-line front end.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Listing(#[from] ListingError),

    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

/// Installs the stderr log subscriber.
///
/// `RIGOR_LOG` takes an `EnvFilter` directive; without it only rigor's own
/// info (or debug, when `verbose`) events are shown.
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose { "rigor=debug" } else { "rigor=info" };
    let filter = std::env::var("RIGOR_LOG").unwrap_or_else(|_| fallback.to_string());
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Parses the process arguments, runs or lists `entries`, and maps the
/// outcome to an exit code.
pub fn run_main(entries: &[TestCaseEntry]) -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);
    if args.no_color {
        colored::control::set_override(false);
    }

    match dispatch(&args, entries) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn dispatch(args: &Args, entries: &[TestCaseEntry]) -> anyhow::Result<i32> {
    let config = args
        .load_config()
        .context("failed to load configuration")?;
    let code = run_with_args(args, entries, config, std::io::stdout())?;
    Ok(code)
}

/// Runs or lists `entries` as `args` asks, writing to `out`.
///
/// Returns the process exit code: 0 when nothing failed, 1 otherwise.
pub fn run_with_args<W>(
    args: &Args,
    entries: &[TestCaseEntry],
    config: RigorConfig,
    mut out: W,
) -> Result<i32, CliError>
where
    W: Write + Send + 'static,
{
    match args.mode() {
        ExecutionMode::List(ListingFormat::HumanReadable) => {
            out.write_all(human_readable_listing(entries, &config).as_bytes())?;
            out.flush()?;
            Ok(0)
        }
        ExecutionMode::List(ListingFormat::Json) => {
            let root = build_root_suite(entries, &TestFilter::All, &config);
            writeln!(out, "{}", json_listing(&root)?)?;
            out.flush()?;
            Ok(0)
        }
        ExecutionMode::Run { selection } => {
            let filter = TestFilter::parse(selection.as_deref());
            let root = build_root_suite(entries, &filter, &config);
            tracing::info!(
                tests = root.test_case_count(),
                filtered = filter.is_filtered(),
                "running tests"
            );

            let env = RunEnvironment::new(config);
            env.add_observer(Arc::new(PrintObserver::new(out).with_color(!args.no_color)));
            let run = env.run_bundle(&root);

            Ok(if run.total_failure_count() == 0 { 0 } else { 1 })
        }
    }
}
