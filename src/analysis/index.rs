//! Grouping of account records by mail domain.

use super::handle_invalid;
use crate::config::{AttributeNames, InvalidRecordPolicy};
use crate::error::{MalformedReason, SummaryError};
use crate::models::AccountRecord;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Account records keyed by the domain of their delivery address.
///
/// Domains iterate in lexicographic order; records keep the order they were
/// supplied in.
#[derive(Debug, Default)]
pub struct DomainIndex {
    domains: BTreeMap<String, Vec<AccountRecord>>,
    skipped: usize,
}

impl DomainIndex {
    /// Build the index from a flat record list.
    pub fn build(
        records: Vec<AccountRecord>,
        attributes: &AttributeNames,
        policy: InvalidRecordPolicy,
    ) -> Result<Self, SummaryError> {
        info!(
            action = "start",
            component = "domain_index",
            record_count = records.len(),
            "Building domain-indexed database"
        );

        let mut index = Self::default();

        for record in records {
            match domain_of(&record, &attributes.mail_delivery_address) {
                Ok(domain) => index.domains.entry(domain).or_default().push(record),
                Err(err) => {
                    handle_invalid(policy, err)?;
                    index.skipped += 1;
                }
            }
        }

        info!(
            action = "complete",
            component = "domain_index",
            domain_count = index.domains.len(),
            skipped = index.skipped,
            "Domain-indexed database built"
        );
        debug!(domains = ?index.domains.keys().collect::<Vec<_>>(), "Indexed domains");

        Ok(index)
    }

    /// Iterate domains in order with their records.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[AccountRecord])> {
        self.domains
            .iter()
            .map(|(domain, records)| (domain.as_str(), records.as_slice()))
    }

    /// Records of one domain.
    #[cfg(test)]
    pub fn get(&self, domain: &str) -> Option<&[AccountRecord]> {
        self.domains.get(domain).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Records left out because their address could not be parsed.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Extract the domain from a record's delivery address.
///
/// The address is split on the first `@`; both sides must be non-empty.
pub fn domain_of(record: &AccountRecord, address_attr: &str) -> Result<String, SummaryError> {
    let address = record
        .first(address_attr)
        .ok_or_else(|| SummaryError::MalformedRecord {
            dn: record.dn.clone(),
            reason: MalformedReason::MissingAttribute(address_attr.to_string()),
        })?;

    match address.trim().split_once('@') {
        Some((user, domain)) if !user.is_empty() && !domain.is_empty() => {
            Ok(domain.to_string())
        }
        _ => Err(SummaryError::MalformedRecord {
            dn: record.dn.clone(),
            reason: MalformedReason::AddressWithoutDomain(address.to_string()),
        }),
    }
}
