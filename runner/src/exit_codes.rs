//! Stable exit codes for CLI commands.
//!
//! Codes are bit flags so a pass with both changes and failures reports
//! `CHANGED | FAILED`.

use crate::core::types::{ConvergeReport, ConvergeStatus};

/// Nothing to do: every node already held its desired state.
pub const OK: i32 = 0;
/// Invalid spec, unreadable facts, or any error before convergence started.
pub const INVALID: i32 = 1;
/// At least one node changed (or, in noop mode, would change).
pub const CHANGED: i32 = 2;
/// At least one node failed or was skipped.
pub const FAILED: i32 = 4;
pub const CHANGED_AND_FAILED: i32 = CHANGED | FAILED;

/// Exit code summarizing a convergence pass.
pub fn for_report(report: &ConvergeReport) -> i32 {
    match report.status() {
        ConvergeStatus::Converged => OK,
        ConvergeStatus::Changed => CHANGED,
        ConvergeStatus::Failed if report.has_changes() => CHANGED_AND_FAILED,
        ConvergeStatus::Failed => FAILED,
    }
}
