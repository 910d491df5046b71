//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::OutputFormat;
use clap::Parser;
use std::path::PathBuf;

/// domain-summary - per-domain mailbox account report
///
/// Queries the directory for mailbox accounts, counts them per domain and
/// account status, writes the result as a text table and optionally mails it.
///
/// Examples:
///   domain-summary
///   domain-summary --sendmail --loglevel info
///   domain-summary --testmode --fixture fixtures/accounts.json
///   domain-summary --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Args {
    /// Print version
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    pub version: Option<bool>,

    /// Log verbosity
    #[arg(
        short = 'l',
        long = "loglevel",
        value_name = "LEVEL",
        default_value = "warn",
        ignore_case = true
    )]
    pub loglevel: LogLevel,

    /// Send the summary by email (default is a dry run)
    #[arg(short = 's', long = "sendmail")]
    pub sendmail: bool,

    /// Test mode: read accounts from a JSON fixture instead of the directory
    #[arg(short = 't', long = "testmode")]
    pub testmode: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .domain-summary.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output file for the summary table
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Fixture file read in test mode
    #[arg(long, value_name = "FILE")]
    pub fixture: Option<PathBuf>,

    /// Password for the directory bind
    #[arg(
        long,
        value_name = "PASSWORD",
        env = "DOMAIN_SUMMARY_BIND_PASSWORD",
        hide_env_values = true
    )]
    pub bind_password: Option<String>,

    /// Skip malformed records and unknown statuses instead of aborting
    #[arg(long)]
    pub skip_invalid: bool,

    /// Generate a default .domain-summary.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Log level for --loglevel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    #[value(alias = "critical")]
    Error,
    #[value(alias = "warning")]
    Warn,
    Info,
    Debug,
    Trace,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if let Some(ref output) = self.output {
            if output.is_dir() {
                return Err(format!("Output path is a directory: {}", output.display()));
            }
        }

        if let Some(ref fixture) = self.fixture {
            if !self.testmode {
                return Err("--fixture only applies together with --testmode".to_string());
            }
            if !fixture.is_file() {
                return Err(format!("Fixture file does not exist: {}", fixture.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level selected with --loglevel.
    pub fn log_level(&self) -> tracing::Level {
        match self.loglevel {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(argv: &[&str]) -> Args {
        let mut full = vec!["domain-summary"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.loglevel, LogLevel::Warn);
        assert!(!args.sendmail);
        assert!(!args.testmode);
        assert!(args.output.is_none());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_short_flags() {
        let args = parse(&["-s", "-t", "-l", "DEBUG"]);
        assert!(args.sendmail);
        assert!(args.testmode);
        assert_eq!(args.loglevel, LogLevel::Debug);
    }

    #[test]
    fn test_loglevel_aliases() {
        assert_eq!(parse(&["-l", "critical"]).loglevel, LogLevel::Error);
        assert_eq!(parse(&["--loglevel", "WARNING"]).loglevel, LogLevel::Warn);
        assert!(Args::try_parse_from(["domain-summary", "-l", "loud"]).is_err());
    }

    #[test]
    fn test_version_flag() {
        let err = Args::try_parse_from(["domain-summary", "-v"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_log_level() {
        assert_eq!(parse(&[]).log_level(), tracing::Level::WARN);
        assert_eq!(parse(&["-l", "info"]).log_level(), tracing::Level::INFO);
        assert_eq!(parse(&["-l", "trace"]).log_level(), tracing::Level::TRACE);
    }

    #[test]
    fn test_validation_fixture_requires_testmode() {
        let temp_dir = TempDir::new().unwrap();
        let fixture = temp_dir.path().join("accounts.json");
        std::fs::write(&fixture, "[]").unwrap();
        let fixture = fixture.to_str().unwrap();

        assert!(parse(&["--fixture", fixture]).validate().is_err());
        assert!(parse(&["-t", "--fixture", fixture]).validate().is_ok());
        assert!(parse(&["-t", "--fixture", "/nonexistent/accounts.json"])
            .validate()
            .is_err());
    }

    #[test]
    fn test_validation_output_directory() {
        let temp_dir = TempDir::new().unwrap();
        let args = parse(&["-o", temp_dir.path().to_str().unwrap()]);
        assert!(args.validate().is_err());
    }
}
