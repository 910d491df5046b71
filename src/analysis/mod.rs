//! Domain indexing and per-domain aggregation.
//!
//! Records are first grouped by the domain of their delivery address, then
//! each domain's records are classified and counted.

pub mod aggregator;
pub mod index;

pub use aggregator::aggregate;
pub use index::DomainIndex;

use crate::config::InvalidRecordPolicy;
use crate::error::SummaryError;
use tracing::warn;

/// Applies the invalid-record policy to a record-level error.
///
/// Returns `Ok(())` when the record should be skipped, or the error when the
/// run must stop.
pub(crate) fn handle_invalid(
    policy: InvalidRecordPolicy,
    err: SummaryError,
) -> Result<(), SummaryError> {
    match policy {
        InvalidRecordPolicy::Skip if err.is_record_error() => {
            warn!(error = %err, "Skipping record");
            Ok(())
        }
        _ => Err(err),
    }
}
