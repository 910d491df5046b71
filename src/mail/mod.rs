//! Report delivery by email.
//!
//! The notifier always composes the message so it can be printed; it only
//! hands it to a transport when sending is enabled.

pub mod message;
pub mod smtp;

pub use message::{compose_message, ComposedMessage};
pub use smtp::SmtpTransport;

use crate::config::MailConfig;
use crate::error::{SummaryError, TransportError};
use chrono::{DateTime, FixedOffset, Local};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info, warn};

/// Something that can deliver a composed message.
pub trait MailTransport {
    async fn send(&mut self, message: &ComposedMessage) -> Result<(), TransportError>;
}

/// Composes the report message and optionally sends it.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: String,
    recipient: String,
    subject: String,
}

impl Notifier {
    pub fn new(config: &MailConfig, sender: String) -> Self {
        Self {
            sender,
            recipient: config.recipient.clone(),
            subject: config.subject.clone(),
        }
    }

    /// Compose the message with the current local time.
    pub fn compose(&self, report: &str) -> ComposedMessage {
        self.compose_at(report, Local::now().fixed_offset())
    }

    pub fn compose_at(&self, report: &str, date: DateTime<FixedOffset>) -> ComposedMessage {
        compose_message(&self.sender, &self.recipient, &self.subject, report, date)
    }

    /// Compose the report message and send it when `send` is true.
    ///
    /// With `send` false the transport is never touched. The composed
    /// message is returned either way.
    pub async fn notify<T: MailTransport>(
        &self,
        transport: &mut T,
        report: &str,
        send: bool,
    ) -> Result<ComposedMessage, SummaryError> {
        let message = self.compose(report);

        if send {
            info!(
                action = "send",
                component = "notifier",
                from = %message.from,
                to = %message.to,
                "Sending summary by email"
            );
            transport.send(&message).await?;
            info!(action = "sent", component = "notifier", "Summary sent");
        } else {
            info!(
                action = "skip",
                component = "notifier",
                "Dry run, summary not sent"
            );
        }

        Ok(message)
    }
}

/// Sender address `<program>@<host>`.
pub fn sender_address(config: &MailConfig) -> String {
    let host = match config.sender_host {
        Some(ref host) => host.clone(),
        None => local_fqdn(),
    };
    format!("{}@{}", program_name(), host)
}

/// Name of the running executable without extension.
pub fn program_name() -> String {
    std::env::args_os()
        .next()
        .and_then(|arg0| {
            Path::new(&arg0)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(String::from)
        })
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}

/// Fully qualified host name from `hostname -f`, `localhost` if unavailable.
pub fn local_fqdn() -> String {
    match Command::new("hostname").arg("-f").output() {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if let Some(name) = stdout.split_whitespace().next() {
                debug!(fqdn = name, "Resolved local host name");
                return name.to_string();
            }
            warn!("hostname -f printed nothing, using localhost");
        }
        Ok(output) => {
            warn!(status = %output.status, "hostname -f failed, using localhost");
        }
        Err(e) => {
            warn!(error = %e, "Could not run hostname, using localhost");
        }
    }
    "localhost".to_string()
}
