//! Controller state machine and execution results.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle of one execution request.
///
/// `Idle → Running → {Completed | Aborted | Failed} → Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControllerState {
    #[default]
    Idle,
    Running,
    Completed,
    Aborted,
    Failed,
}

impl ControllerState {
    pub fn display_name(&self) -> &'static str {
        match self {
            ControllerState::Idle => "Idle",
            ControllerState::Running => "Running",
            ControllerState::Completed => "Completed",
            ControllerState::Aborted => "Aborted",
            ControllerState::Failed => "Failed",
        }
    }

    /// Terminal states are left for `Idle` as soon as they were reported.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ControllerState::Completed | ControllerState::Aborted | ControllerState::Failed
        )
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// How an execution request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed,
    Aborted,
    Failed { component: String, message: String },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed)
    }

    /// Terminal controller state matching this outcome.
    pub fn state(&self) -> ControllerState {
        match self {
            ExecutionOutcome::Completed => ControllerState::Completed,
            ExecutionOutcome::Aborted => ControllerState::Aborted,
            ExecutionOutcome::Failed { .. } => ControllerState::Failed,
        }
    }
}

/// Result of one `execute_model` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// Component the run was started on.
    pub component: String,
    pub outcome: ExecutionOutcome,
    pub elapsed: Duration,
    /// Number of process updates performed.
    pub updates: usize,
}

impl ExecutionReport {
    /// Elapsed time as `min:sec`.
    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed)
    }
}

/// Format a duration as `min:sec` with millisecond precision, e.g. `1:05.250`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64();
    let minutes = (total / 60.0).floor();
    format!("{}:{:06.3}", minutes as u64, total - minutes * 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(65_250)), "1:05.250");
        assert_eq!(format_elapsed(Duration::from_millis(3_000)), "0:03.000");
    }

    #[test]
    fn test_outcome_states() {
        assert_eq!(ExecutionOutcome::Completed.state(), ControllerState::Completed);
        assert_eq!(ExecutionOutcome::Aborted.state(), ControllerState::Aborted);
        let failed = ExecutionOutcome::Failed {
            component: "Calc".into(),
            message: "boom".into(),
        };
        assert!(!failed.is_success());
        assert!(failed.state().is_terminal());
        assert!(!ControllerState::Running.is_terminal());
    }
}
