//! Data models for the domain summary.
//!
//! This module contains the account records returned by a source, the
//! classification of a single account and the per-domain counters that end
//! up in the report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Value of a directory attribute: either a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Single-valued attribute.
    Single(String),
    /// Multi-valued attribute, in the order the source returned it.
    Multi(Vec<String>),
}

impl AttributeValue {
    /// Returns the first value, if any.
    pub fn first(&self) -> Option<&str> {
        match self {
            AttributeValue::Single(value) => Some(value.as_str()),
            AttributeValue::Multi(values) => values.first().map(String::as_str),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Single(value.to_string())
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        AttributeValue::Multi(values)
    }
}

/// One directory entry describing a mailbox, admin or system identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Unique key of the entry (the distinguished name for LDAP).
    pub dn: String,
    /// Attribute name to value(s).
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl AccountRecord {
    /// Creates a record with no attributes.
    #[cfg(test)]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute, builder style.
    #[cfg(test)]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Returns the first value of an attribute.
    ///
    /// Directory servers do not guarantee the case of attribute names, so the
    /// lookup falls back to a case-insensitive match.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .and_then(AttributeValue::first)
    }

    /// Whether a boolean-like attribute is set to `TRUE` (any case).
    pub fn is_flagged(&self, name: &str) -> bool {
        self.first(name)
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("TRUE"))
    }
}

/// Status of a regular (non-admin, non-system) account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccountStatus {
    Active,
    Closed,
    Locked,
    Maintenance,
    Pending,
}

impl AccountStatus {
    /// The status as stored in the directory.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Closed => "closed",
            AccountStatus::Locked => "locked",
            AccountStatus::Maintenance => "maintenance",
            AccountStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a status value is outside the known set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedStatus(pub String);

impl FromStr for AccountStatus {
    type Err = UnrecognizedStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "closed" => Ok(AccountStatus::Closed),
            "locked" => Ok(AccountStatus::Locked),
            "maintenance" => Ok(AccountStatus::Maintenance),
            "pending" => Ok(AccountStatus::Pending),
            _ => Err(UnrecognizedStatus(s.to_string())),
        }
    }
}

/// Bucket an account is counted under. Exactly one per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountClass {
    Admin,
    DelegatedAdmin,
    System,
    Status(AccountStatus),
}

/// Counters for a single domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSummary {
    pub domain: String,
    pub active: u32,
    pub closed: u32,
    pub locked: u32,
    pub maintenance: u32,
    /// Sum of the status buckets. Admin, delegated admin and system
    /// accounts are never part of it.
    pub total: u32,
    pub admin: u32,
    pub delegatedadmin: u32,
    pub system: u32,
    pub pending: u32,
}

impl DomainSummary {
    /// Creates an all-zero summary for a domain.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
    }

    /// Counts one account.
    pub fn record(&mut self, class: AccountClass) {
        match class {
            AccountClass::Admin => self.admin += 1,
            AccountClass::DelegatedAdmin => self.delegatedadmin += 1,
            AccountClass::System => self.system += 1,
            AccountClass::Status(status) => {
                match status {
                    AccountStatus::Active => self.active += 1,
                    AccountStatus::Closed => self.closed += 1,
                    AccountStatus::Locked => self.locked += 1,
                    AccountStatus::Maintenance => self.maintenance += 1,
                    AccountStatus::Pending => self.pending += 1,
                }
                self.total += 1;
            }
        }
    }

    /// Sum of the status buckets.
    pub fn bucketed(&self) -> u32 {
        self.active + self.closed + self.locked + self.maintenance + self.pending
    }

    /// `*` when at least one status-bucketed account was counted.
    pub fn marker(&self) -> &'static str {
        if self.bucketed() > 0 {
            "*"
        } else {
            ""
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_str() {
        assert_eq!("active".parse(), Ok(AccountStatus::Active));
        assert_eq!(" Locked ".parse(), Ok(AccountStatus::Locked));
        assert_eq!("MAINTENANCE".parse(), Ok(AccountStatus::Maintenance));
        assert_eq!(
            "lockout".parse::<AccountStatus>(),
            Err(UnrecognizedStatus("lockout".to_string()))
        );
    }

    #[test]
    fn test_attribute_lookup() {
        let record = AccountRecord::new("uid=a,dc=example,dc=com")
            .with("zimbraMailDeliveryAddress", vec!["a@example.com".to_string(), "b@example.com".to_string()])
            .with("zimbraIsAdminAccount", "true");

        assert_eq!(record.first("zimbraMailDeliveryAddress"), Some("a@example.com"));
        assert_eq!(record.first("zimbramaildeliveryaddress"), Some("a@example.com"));
        assert!(record.is_flagged("zimbraIsAdminAccount"));
        assert!(!record.is_flagged("zimbraIsSystemAccount"));
        assert_eq!(record.first("missing"), None);
    }

    #[test]
    fn test_flag_requires_true() {
        let record = AccountRecord::new("uid=a").with("zimbraIsSystemAccount", "FALSE");
        assert!(!record.is_flagged("zimbraIsSystemAccount"));
    }

    #[test]
    fn test_summary_total_excludes_admins() {
        let mut summary = DomainSummary::new("example.com");
        summary.record(AccountClass::Status(AccountStatus::Active));
        summary.record(AccountClass::Status(AccountStatus::Pending));
        summary.record(AccountClass::Admin);
        summary.record(AccountClass::DelegatedAdmin);
        summary.record(AccountClass::System);

        assert_eq!(summary.total, 2);
        assert_eq!(summary.total, summary.bucketed());
        assert_eq!(summary.admin, 1);
        assert_eq!(summary.delegatedadmin, 1);
        assert_eq!(summary.system, 1);
        assert_eq!(summary.marker(), "*");
    }

    #[test]
    fn test_marker_empty_without_status_accounts() {
        let mut summary = DomainSummary::new("example.com");
        summary.record(AccountClass::Admin);
        assert_eq!(summary.marker(), "");
    }

    #[test]
    fn test_attribute_value_deserialize() {
        let single: AttributeValue = serde_json::from_str("\"active\"").unwrap();
        let multi: AttributeValue = serde_json::from_str("[\"x\", \"y\"]").unwrap();
        assert_eq!(single.first(), Some("active"));
        assert_eq!(multi.first(), Some("x"));
        assert_eq!(AttributeValue::Multi(Vec::new()).first(), None);
    }
}
