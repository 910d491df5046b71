//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.domain-summary.toml` files. Directory server, relay, recipient and
//! attribute names all live here and are handed to each stage explicitly.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".domain-summary.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directory service settings.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Aggregation settings.
    #[serde(default)]
    pub summary: SummaryConfig,

    /// Report output settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Mail relay settings.
    #[serde(default)]
    pub mail: MailConfig,
}

/// Directory service (LDAP) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Server URL, `ldap://` or `ldaps://`.
    #[serde(default = "default_url")]
    pub url: String,

    /// DN used for the simple bind.
    #[serde(default = "default_bind_dn")]
    pub bind_dn: String,

    /// Password for the simple bind.
    #[serde(default)]
    pub bind_password: String,

    /// Search base.
    #[serde(default = "default_base_dn")]
    pub base_dn: String,

    /// Search filter. Whitespace is stripped before use, so it may be
    /// written indented.
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Connect and operation timeout in seconds.
    #[serde(default = "default_directory_timeout")]
    pub timeout_seconds: u64,

    /// JSON fixture read instead of the directory in test mode.
    #[serde(default = "default_fixture")]
    pub fixture: PathBuf,

    /// Names of the attributes the summary reads.
    #[serde(default)]
    pub attributes: AttributeNames,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            bind_dn: default_bind_dn(),
            bind_password: String::new(),
            base_dn: default_base_dn(),
            filter: default_filter(),
            timeout_seconds: default_directory_timeout(),
            fixture: default_fixture(),
            attributes: AttributeNames::default(),
        }
    }
}

impl DirectoryConfig {
    /// The search filter with all whitespace removed.
    pub fn compact_filter(&self) -> String {
        self.filter.split_whitespace().collect()
    }
}

fn default_url() -> String {
    "ldap://1.2.3.4".to_string()
}

fn default_bind_dn() -> String {
    "cn=config".to_string()
}

fn default_base_dn() -> String {
    "dc=br".to_string()
}

fn default_filter() -> String {
    "(&(objectClass=zimbraAccount)(zimbraMailDeliveryAddress=*)\
     (!(|(objectClass=zimbraCalendarResource)(zimbraExternalUserMailAddress=*))))"
        .to_string()
}

fn default_directory_timeout() -> u64 {
    30
}

fn default_fixture() -> PathBuf {
    PathBuf::from("fixtures/accounts.json")
}

/// Attribute names read from each account record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeNames {
    #[serde(default = "default_status_attr")]
    pub status: String,

    #[serde(default = "default_admin_attr")]
    pub is_admin: String,

    #[serde(default = "default_delegated_admin_attr")]
    pub is_delegated_admin: String,

    #[serde(default = "default_system_attr")]
    pub is_system: String,

    /// Address whose domain part groups the accounts.
    #[serde(default = "default_address_attr")]
    pub mail_delivery_address: String,
}

impl Default for AttributeNames {
    fn default() -> Self {
        Self {
            status: default_status_attr(),
            is_admin: default_admin_attr(),
            is_delegated_admin: default_delegated_admin_attr(),
            is_system: default_system_attr(),
            mail_delivery_address: default_address_attr(),
        }
    }
}

impl AttributeNames {
    /// Attribute list requested from the directory.
    pub fn to_request(&self) -> Vec<String> {
        vec![
            self.status.clone(),
            self.is_admin.clone(),
            self.is_delegated_admin.clone(),
            self.is_system.clone(),
            self.mail_delivery_address.clone(),
        ]
    }
}

fn default_status_attr() -> String {
    "zimbraAccountStatus".to_string()
}

fn default_admin_attr() -> String {
    "zimbraIsAdminAccount".to_string()
}

fn default_delegated_admin_attr() -> String {
    "zimbraIsDelegatedAdminAccount".to_string()
}

fn default_system_attr() -> String {
    "zimbraIsSystemAccount".to_string()
}

fn default_address_attr() -> String {
    "zimbraMailDeliveryAddress".to_string()
}

/// What to do with a record that cannot be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidRecordPolicy {
    /// Stop the run at the first bad record.
    #[default]
    Abort,
    /// Log the record and leave it out of every counter.
    Skip,
}

/// Aggregation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Handling of malformed records and unknown statuses.
    #[serde(default)]
    pub on_invalid_record: InvalidRecordPolicy,
}

/// Report output format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Fixed-width text table (default)
    #[default]
    Text,
    /// JSON array of domain summaries
    Json,
}

/// Report output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// File the summary is written to.
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Output format.
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            format: OutputFormat::Text,
        }
    }
}

fn default_output() -> PathBuf {
    PathBuf::from("/tmp/domainsummary.txt")
}

/// STARTTLS handling on the relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartTlsPolicy {
    /// Upgrade when the relay advertises STARTTLS, otherwise stay plain.
    #[default]
    Opportunistic,
    /// Fail when the relay does not advertise STARTTLS.
    Required,
    /// Never upgrade.
    Disabled,
}

/// Mail relay and message settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_relay_host")]
    pub relay_host: String,

    #[serde(default = "default_relay_port")]
    pub relay_port: u16,

    #[serde(default)]
    pub starttls: StartTlsPolicy,

    #[serde(default = "default_recipient")]
    pub recipient: String,

    #[serde(default = "default_subject")]
    pub subject: String,

    /// Host part of the sender address. Resolved with `hostname -f` when
    /// unset.
    #[serde(default)]
    pub sender_host: Option<String>,

    /// Timeout in seconds for connecting and for each relay reply.
    #[serde(default = "default_mail_timeout")]
    pub timeout_seconds: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            relay_host: default_relay_host(),
            relay_port: default_relay_port(),
            starttls: StartTlsPolicy::default(),
            recipient: default_recipient(),
            subject: default_subject(),
            sender_host: None,
            timeout_seconds: default_mail_timeout(),
        }
    }
}

fn default_relay_host() -> String {
    "smtp.dominio.com.br".to_string()
}

fn default_relay_port() -> u16 {
    587
}

fn default_recipient() -> String {
    "lista@dominio.com.br".to_string()
}

fn default_subject() -> String {
    "Zimbra Domain Summary".to_string()
}

fn default_mail_timeout() -> u64 {
    60
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.domain-summary.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.report.output = output.clone();
        }
        if let Some(format) = args.format {
            self.report.format = format;
        }
        if let Some(ref fixture) = args.fixture {
            self.directory.fixture = fixture.clone();
        }
        if let Some(ref password) = args.bind_password {
            self.directory.bind_password = password.clone();
        }
        if args.skip_invalid {
            self.summary.on_invalid_record = InvalidRecordPolicy::Skip;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
