//! Directory (LDAP) account source.

use super::{sort_by_dn, AccountSource};
use crate::config::DirectoryConfig;
use crate::error::SummaryError;
use crate::models::{AccountRecord, AttributeValue};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Account source backed by a subtree search on the directory.
pub struct LdapSource {
    config: DirectoryConfig,
}

impl LdapSource {
    pub fn new(config: DirectoryConfig) -> Self {
        Self { config }
    }

    fn unavailable(&self, err: ldap3::LdapError) -> SummaryError {
        SummaryError::SourceUnavailable {
            target: self.config.url.clone(),
            source: Box::new(err),
        }
    }

    /// A bind DN with an empty password is an unauthenticated bind, which
    /// some servers accept and answer with an empty search result.
    fn check_credentials(&self) -> Result<(), SummaryError> {
        if !self.config.bind_dn.is_empty() && self.config.bind_password.is_empty() {
            return Err(SummaryError::SourceUnavailable {
                target: self.config.url.clone(),
                source: format!(
                    "empty bind password for '{}', set directory.bind_password or --bind-password",
                    self.config.bind_dn
                )
                .into(),
            });
        }
        Ok(())
    }

    async fn connect(&self) -> Result<Ldap, SummaryError> {
        self.check_credentials()?;

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        debug!(url = %self.config.url, "Creating LDAP connection");

        let settings = LdapConnSettings::new().set_conn_timeout(timeout);
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.config.url)
            .await
            .map_err(|e| self.unavailable(e))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection closed with error");
            }
        });

        ldap.with_timeout(timeout)
            .simple_bind(&self.config.bind_dn, &self.config.bind_password)
            .await
            .and_then(|result| result.success())
            .map_err(|e| self.unavailable(e))?;

        Ok(ldap)
    }
}

impl AccountSource for LdapSource {
    fn describe(&self) -> String {
        self.config.url.clone()
    }

    async fn fetch_accounts(&mut self) -> Result<Vec<AccountRecord>, SummaryError> {
        let start_time = Instant::now();
        info!(
            action = "start",
            component = "directory_query",
            base_dn = %self.config.base_dn,
            "Querying user accounts"
        );

        let mut ldap = self.connect().await?;

        let filter = self.config.compact_filter();
        let attributes = self.config.attributes.to_request();
        let timeout = Duration::from_secs(self.config.timeout_seconds);

        let (entries, _result) = ldap
            .with_timeout(timeout)
            .search(&self.config.base_dn, Scope::Subtree, &filter, &attributes)
            .await
            .and_then(|result| result.success())
            .map_err(|e| self.unavailable(e))?;

        if let Err(e) = ldap.unbind().await {
            warn!(error = %e, "Failed to unbind from directory");
        }

        let mut records: Vec<AccountRecord> = entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(record_from_entry)
            .collect();
        sort_by_dn(&mut records);

        info!(
            action = "complete",
            component = "directory_query",
            account_count = records.len(),
            duration_ms = start_time.elapsed().as_millis(),
            "Accounts found"
        );
        debug!(?records, "Directory search result");

        Ok(records)
    }
}

fn record_from_entry(entry: SearchEntry) -> AccountRecord {
    AccountRecord {
        dn: entry.dn,
        attributes: entry
            .attrs
            .into_iter()
            .map(|(name, values)| (name, AttributeValue::Multi(values)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_record_from_entry() {
        let mut attrs = HashMap::new();
        attrs.insert(
            "zimbraMailDeliveryAddress".to_string(),
            vec!["ana@example.com".to_string()],
        );
        attrs.insert("zimbraAccountStatus".to_string(), vec!["active".to_string()]);

        let entry = SearchEntry {
            dn: "uid=ana,ou=people,dc=example,dc=com".to_string(),
            attrs,
            bin_attrs: HashMap::new(),
        };

        let record = record_from_entry(entry);
        assert_eq!(record.dn, "uid=ana,ou=people,dc=example,dc=com");
        assert_eq!(record.first("zimbraMailDeliveryAddress"), Some("ana@example.com"));
        assert_eq!(record.first("zimbraAccountStatus"), Some("active"));
    }

    #[tokio::test]
    async fn test_unreachable_directory_is_source_unavailable() {
        let config = DirectoryConfig {
            url: "ldap://127.0.0.1:1".to_string(),
            bind_password: "secret".to_string(),
            timeout_seconds: 2,
            ..DirectoryConfig::default()
        };
        let mut source = LdapSource::new(config);

        let err = source.fetch_accounts().await.unwrap_err();
        assert!(matches!(err, SummaryError::SourceUnavailable { .. }));
        assert!(err.to_string().contains("ldap://127.0.0.1:1"));
    }

    #[tokio::test]
    async fn test_empty_bind_password_is_rejected() {
        let config = DirectoryConfig {
            url: "ldap://127.0.0.1:1".to_string(),
            bind_dn: "uid=zimbra,cn=admins,cn=zimbra".to_string(),
            bind_password: String::new(),
            ..DirectoryConfig::default()
        };
        let mut source = LdapSource::new(config);

        let err = source.fetch_accounts().await.unwrap_err();
        assert!(matches!(err, SummaryError::SourceUnavailable { .. }));
        let message = err.to_string();
        assert!(message.contains("empty bind password"));
        assert!(message.contains("uid=zimbra,cn=admins,cn=zimbra"));
    }
}
