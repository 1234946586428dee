//! Command-line arguments.

use clap::Parser;
use rigor_core::RigorConfig;
use std::path::PathBuf;

use crate::CliError;

/// Runs or lists the tests registered with this binary.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Tests to run: `Class`, `Module.Class`, `Class/method` or
    /// `Module.Class/method`, comma-separated
    pub selection: Option<String>,

    /// List all tests, one `Module.Class/method` per line
    #[arg(short = 'l', long = "list-tests", conflicts_with = "dump_tests_json")]
    pub list_tests: bool,

    /// Print the test tree as JSON
    #[arg(long)]
    pub dump_tests_json: bool,

    /// YAML configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable coloured verdicts
    #[arg(long)]
    pub no_color: bool,
}

/// Output format of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingFormat {
    HumanReadable,
    Json,
}

/// What the binary has been asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    Run { selection: Option<String> },
    List(ListingFormat),
}

impl Args {
    pub fn mode(&self) -> ExecutionMode {
        if self.dump_tests_json {
            ExecutionMode::List(ListingFormat::Json)
        } else if self.list_tests {
            ExecutionMode::List(ListingFormat::HumanReadable)
        } else {
            ExecutionMode::Run {
                selection: self.selection.clone(),
            }
        }
    }

    /// The `--config` file with environment overrides, or the environment
    /// alone.
    pub fn load_config(&self) -> Result<RigorConfig, CliError> {
        let config = match &self.config {
            Some(path) => RigorConfig::load(path)?,
            None => RigorConfig::from_env(),
        };
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode_runs_everything() {
        let args = Args::parse_from(["rigor"]);
        assert_eq!(args.mode(), ExecutionMode::Run { selection: None });
    }

    #[test]
    fn test_selection_is_positional() {
        let args = Args::parse_from(["rigor", "Parser/test_tokens"]);
        assert_eq!(
            args.mode(),
            ExecutionMode::Run {
                selection: Some("Parser/test_tokens".into())
            }
        );
    }

    #[test]
    fn test_listing_modes() {
        assert_eq!(
            Args::parse_from(["rigor", "-l"]).mode(),
            ExecutionMode::List(ListingFormat::HumanReadable)
        );
        assert_eq!(
            Args::parse_from(["rigor", "--dump-tests-json"]).mode(),
            ExecutionMode::List(ListingFormat::Json)
        );
    }

    #[test]
    fn test_listing_flags_conflict() {
        assert!(Args::try_parse_from(["rigor", "--list-tests", "--dump-tests-json"]).is_err());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let args = Args::parse_from([
            "rigor".into(),
            "--config".into(),
            dir.path().join("absent.yml").into_os_string(),
        ]);
        assert!(matches!(args.load_config(), Err(CliError::Config(_))));
    }
}
