//! Result aggregation
//!
//! Folds chunk reports into a `BatchSummary`. Pure: no I/O and the inputs
//! are left untouched.

use crate::chunk::ChunkReport;
use crate::outcome::{BatchSummary, OperationOutcome};

/// Build the summary for a set of chunk reports
///
/// Reports are ordered by chunk index first, so the outcome list follows
/// submission order whatever order the chunks settled in.
#[must_use]
pub fn aggregate(reports: &[ChunkReport]) -> BatchSummary {
    let mut ordered: Vec<&ChunkReport> = reports.iter().collect();
    ordered.sort_by_key(|report| report.index);

    let outcomes: Vec<OperationOutcome> = ordered
        .iter()
        .flat_map(|report| report.outcomes.iter().cloned())
        .collect();
    let errors: Vec<OperationOutcome> = outcomes
        .iter()
        .filter(|outcome| !outcome.is_success())
        .cloned()
        .collect();

    let total_operations = outcomes.len();
    let failed_operations = errors.len();

    BatchSummary {
        success: failed_operations == 0,
        total_operations,
        successful_operations: total_operations - failed_operations,
        failed_operations,
        chunk_count: reports.len(),
        outcomes,
        errors,
    }
}
