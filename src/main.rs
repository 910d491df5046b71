//! domain-summary - per-domain mailbox account report
//!
//! Queries the directory service for mailbox accounts, counts them per mail
//! domain and account status, writes the counts as a text table and mails
//! the table to a fixed recipient.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (directory, invalid record, report file, mail relay)

mod analysis;
mod cli;
mod config;
mod error;
mod mail;
mod models;
mod report;
mod source;

use anyhow::{Context, Result};
use cli::Args;
use config::{Config, DEFAULT_CONFIG_FILE};
use error::SummaryError;
use mail::{ComposedMessage, Notifier, SmtpTransport};
use source::{AccountSource, FixtureSource, LdapSource};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("domain-summary v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_summary(args).await {
        Ok(message) => println!("{}", message),
        Err(e) => {
            error!("Summary failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Handle --init-config: generate a default configuration file.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("Edit it to set the directory, relay and recipient.");
    Ok(())
}

/// Initialize logging on stderr. `RUST_LOG` wins over --loglevel.
fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(LevelFilter::from_level(args.log_level()).into())
    });

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();

    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Query, aggregate, write and mail the summary.
///
/// Returns the composed message, sent or not.
async fn run_summary(args: Args) -> Result<ComposedMessage> {
    let start_time = Instant::now();
    info!(action = "start", component = "main", "Starting domain summary");

    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let records = if args.testmode {
        info!("Test mode, reading accounts from {}", config.directory.fixture.display());
        fetch(FixtureSource::new(config.directory.fixture.clone())).await?
    } else {
        fetch(LdapSource::new(config.directory.clone())).await?
    };

    let policy = config.summary.on_invalid_record;
    let attributes = &config.directory.attributes;

    let index = analysis::DomainIndex::build(records, attributes, policy)?;
    if index.is_empty() {
        warn!("No accounts with a delivery address were found");
    }
    let aggregation = analysis::aggregate(&index, attributes, policy)?;

    let skipped = index.skipped() + aggregation.skipped;
    if skipped > 0 {
        warn!(skipped, "Some records were left out of the summary");
    }

    let content = report::render(&aggregation.summaries, config.report.format)?;
    if let Err(e) = report::write_report(&config.report.output, &content) {
        warn!(
            file_path = ?config.report.output,
            "Summary could not be saved, printing it instead"
        );
        println!("{}", content);
        return Err(e.into());
    }

    let sender = mail::sender_address(&config.mail);
    let helo_name = match sender.split_once('@') {
        Some((_, host)) => host.to_string(),
        None => "localhost".to_string(),
    };
    let notifier = Notifier::new(&config.mail, sender);
    let mut transport = SmtpTransport::new(config.mail.clone(), helo_name);

    let message = match notifier.notify(&mut transport, &content, args.sendmail).await {
        Ok(message) => message,
        Err(e @ SummaryError::Transport(_)) => {
            warn!(
                file_path = ?config.report.output,
                "Mail delivery failed, summary file was kept"
            );
            return Err(e).context("Failed to send summary");
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        action = "complete",
        component = "main",
        domain_count = aggregation.summaries.len(),
        duration_ms = start_time.elapsed().as_millis(),
        "Domain summary finished"
    );

    Ok(message)
}

/// Fetch every account record from a source.
async fn fetch<S: AccountSource>(mut source: S) -> Result<Vec<models::AccountRecord>> {
    let target = source.describe();
    source
        .fetch_accounts()
        .await
        .with_context(|| format!("Failed to read accounts from {}", target))
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn fixture_path() -> String {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("fixtures/accounts.json")
            .display()
            .to_string()
    }

    fn test_args(output: &std::path::Path) -> Args {
        let fixture = fixture_path();
        let output = output.display().to_string();
        Args::try_parse_from([
            "domain-summary",
            "--testmode",
            "--fixture",
            fixture.as_str(),
            "--output",
            output.as_str(),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_summary_dry_run_from_fixture() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("domainsummary.txt");

        let message = run_summary(test_args(&output)).await.unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        let mut lines = written.lines();
        assert!(lines.next().unwrap().starts_with("domain         | active |"));
        assert!(lines.next().unwrap().starts_with("-------------- | ------ |"));
        let dominio = lines.next().unwrap();
        assert!(dominio.starts_with("dominio.com.br | 1      | 1      | 1      |"));
        assert!(lines.next().unwrap().starts_with("filial.com.br  |"));
        assert_eq!(lines.next(), None);

        assert_eq!(message.body, written);
        assert_eq!(message.to, "lista@dominio.com.br");
        assert!(message.raw.contains("Subject: Zimbra Domain Summary\n"));
    }

    #[tokio::test]
    async fn test_run_summary_unwritable_output() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("missing").join("domainsummary.txt");

        let err = run_summary(test_args(&output)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SummaryError>(),
            Some(SummaryError::Render { .. })
        ));
    }
}
