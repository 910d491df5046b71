//! JSON fixture account source used by `--testmode`.
//!
//! The fixture is an array of `{ "dn": ..., "attributes": { ... } }`
//! objects; attribute values may be a string or a list of strings.

use super::{sort_by_dn, AccountSource};
use crate::error::SummaryError;
use crate::models::AccountRecord;
use std::path::PathBuf;
use tracing::info;

/// Account source reading records from a JSON file.
pub struct FixtureSource {
    path: PathBuf,
}

impl FixtureSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn unavailable(&self, err: impl std::error::Error + Send + Sync + 'static) -> SummaryError {
        SummaryError::SourceUnavailable {
            target: self.describe(),
            source: Box::new(err),
        }
    }
}

impl AccountSource for FixtureSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch_accounts(&mut self) -> Result<Vec<AccountRecord>, SummaryError> {
        info!(
            action = "load",
            component = "fixture",
            file_path = ?self.path,
            "Reading accounts from fixture"
        );

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.unavailable(e))?;
        let mut records: Vec<AccountRecord> =
            serde_json::from_str(&content).map_err(|e| self.unavailable(e))?;
        sort_by_dn(&mut records);

        info!(
            action = "loaded",
            component = "fixture",
            account_count = records.len(),
            "Fixture loaded"
        );
        Ok(records)
    }
}
