//! Account classification and per-domain counters.
//!
//! This module turns a [`DomainIndex`] into one [`DomainSummary`] per domain,
//! with the same buckets as the domain summary printed by `zmaccts`.

use super::{handle_invalid, DomainIndex};
use crate::config::{AttributeNames, InvalidRecordPolicy};
use crate::error::{MalformedReason, SummaryError};
use crate::models::{AccountClass, AccountRecord, AccountStatus, DomainSummary};
use std::time::Instant;
use tracing::{debug, info};

/// Result of aggregating a domain index.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// One summary per domain, sorted by domain name.
    pub summaries: Vec<DomainSummary>,
    /// Records left out under the skip policy.
    pub skipped: usize,
}

/// Decide which bucket an account is counted under.
///
/// Admin, delegated admin and system flags are checked in that order and win
/// over the account status; only accounts with none of them set are read
/// for their status.
pub fn classify(
    record: &AccountRecord,
    attributes: &AttributeNames,
) -> Result<AccountClass, SummaryError> {
    if record.is_flagged(&attributes.is_admin) {
        return Ok(AccountClass::Admin);
    }
    if record.is_flagged(&attributes.is_delegated_admin) {
        return Ok(AccountClass::DelegatedAdmin);
    }
    if record.is_flagged(&attributes.is_system) {
        return Ok(AccountClass::System);
    }

    let status = record
        .first(&attributes.status)
        .ok_or_else(|| SummaryError::MalformedRecord {
            dn: record.dn.clone(),
            reason: MalformedReason::MissingAttribute(attributes.status.clone()),
        })?;

    status
        .parse::<AccountStatus>()
        .map(AccountClass::Status)
        .map_err(|unknown| SummaryError::UnknownStatus {
            dn: record.dn.clone(),
            status: unknown.0,
        })
}

/// Count every domain's accounts.
pub fn aggregate(
    index: &DomainIndex,
    attributes: &AttributeNames,
    policy: InvalidRecordPolicy,
) -> Result<Aggregation, SummaryError> {
    let start_time = Instant::now();
    info!(
        action = "start",
        component = "aggregation",
        domain_count = index.len(),
        "Building summary counters"
    );

    let mut aggregation = Aggregation::default();

    for (domain, records) in index.iter() {
        let mut summary = DomainSummary::new(domain);

        for record in records {
            match classify(record, attributes) {
                Ok(class) => summary.record(class),
                Err(err) => {
                    handle_invalid(policy, err)?;
                    aggregation.skipped += 1;
                }
            }
        }

        debug!(?summary, "Domain summarized");
        aggregation.summaries.push(summary);
    }

    info!(
        action = "complete",
        component = "aggregation",
        domain_count = aggregation.summaries.len(),
        skipped = aggregation.skipped,
        duration_ms = start_time.elapsed().as_millis(),
        "Summary counters built"
    );

    Ok(aggregation)
}
