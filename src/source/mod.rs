//! Account sources.
//!
//! A source yields the flat list of account records the summary is built
//! from. The directory-backed source is used in normal runs; the fixture
//! source backs `--testmode`.

pub mod fixture;
pub mod ldap;

pub use fixture::FixtureSource;
pub use ldap::LdapSource;

use crate::error::SummaryError;
use crate::models::AccountRecord;

/// Supplier of account records.
pub trait AccountSource {
    /// Short description used in logs and errors.
    fn describe(&self) -> String;

    /// Fetch every account, sorted by DN.
    async fn fetch_accounts(&mut self) -> Result<Vec<AccountRecord>, SummaryError>;
}

/// Sort records by DN, matching the order the report was always built in.
pub(crate) fn sort_by_dn(records: &mut [AccountRecord]) {
    records.sort_by(|a, b| a.dn.cmp(&b.dn));
}
