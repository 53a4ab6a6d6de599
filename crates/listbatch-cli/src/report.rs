//! Human-readable rendering of summaries and check reports

use crate::plan::CheckReport;
use listbatch_core::BatchSummary;
use std::fmt::Write;

/// Render a batch summary as text
#[must_use]
pub fn render_summary(summary: &BatchSummary) -> String {
    let mut out = String::new();
    let status = if summary.success { "SUCCEEDED" } else { "FAILED" };
    let _ = writeln!(out, "Batch {status}");
    let _ = writeln!(out, "  Chunks: {}", summary.chunk_count);
    let _ = writeln!(out, "  Operations: {}", summary.total_operations);
    let _ = writeln!(out, "  Succeeded: {}", summary.successful_operations);
    let _ = writeln!(out, "  Failed: {}", summary.failed_operations);

    for (collection, failures) in summary.failures_by_collection() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{collection}:");
        for outcome in failures {
            let kind = outcome.kind().map_or("unknown", |k| k.as_str());
            let _ = writeln!(
                out,
                "  ✗ {} ({kind}): {}",
                outcome.operation_id(),
                outcome.error_message().unwrap_or("no message")
            );
        }
    }
    out
}

/// Render a check report as text
#[must_use]
pub fn render_check(report: &CheckReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Operations: {}", report.total_operations);
    let layout: Vec<String> = report.chunk_sizes.iter().map(ToString::to_string).collect();
    let _ = writeln!(
        out,
        "Chunks: {} [{}]",
        report.chunk_sizes.len(),
        layout.join(", ")
    );
    if report.is_clean() {
        let _ = writeln!(out, "No local problems found");
    } else {
        let _ = writeln!(out, "Problems: {}", report.issues.len());
        for issue in &report.issues {
            let _ = writeln!(out, "  #{} {}: {}", issue.index, issue.collection, issue.message);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanIssue;
    use listbatch_core::{FailureCause, OperationId, OperationKind, OperationOutcome};
    use serde_json::json;

    #[test]
    fn summary_lists_failures_by_collection() {
        let failed = OperationOutcome::failed(
            OperationId::from("Docs_2_0"),
            "Docs",
            Some(OperationKind::Delete),
            FailureCause::Operation,
            "Item 10 does not exist",
        );
        let summary = BatchSummary {
            success: false,
            total_operations: 2,
            successful_operations: 1,
            failed_operations: 1,
            chunk_count: 1,
            outcomes: vec![
                OperationOutcome::succeeded(
                    OperationId::from("Tasks_1_0"),
                    "Tasks",
                    Some(OperationKind::Add),
                    json!({}),
                ),
                failed.clone(),
            ],
            errors: vec![failed],
        };

        let text = render_summary(&summary);

        assert!(text.starts_with("Batch FAILED"));
        assert!(text.contains("Docs:\n  ✗ Docs_2_0 (delete): Item 10 does not exist"));
        assert!(!text.contains("Tasks:"));
    }

    #[test]
    fn check_shows_layout() {
        let report = CheckReport {
            total_operations: 5,
            chunk_sizes: vec![2, 2, 1],
            issues: vec![PlanIssue {
                index: 3,
                collection: "Tasks".into(),
                message: "bad".into(),
            }],
        };

        let text = render_check(&report);

        assert!(text.contains("Chunks: 3 [2, 2, 1]"));
        assert!(text.contains("#3 Tasks: bad"));
    }
}
