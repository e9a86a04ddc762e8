use crate::{engine::FinalResult, error::JobError};
use serde::{Deserialize, Serialize};

/// Label shown while the engine warms up
pub const STARTING_LABEL: &str = "Starting...";
pub const COMPLETED_LABEL: &str = "Completed";
pub const CANCELLED_LABEL: &str = "Cancelled";

/// Live progress of a run. The percentage is always derived from `done` and `total`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total: u64,
    pub done: u64,
    #[serde(rename = "current_file")]
    pub current_label: String,
}

impl Progress {
    pub fn new(total: u64, done: u64, current_label: impl Into<String>) -> Self {
        Self {
            total,
            done,
            current_label: current_label.into(),
        }
    }

    /// `round(done / total * 100)`, 0 when nothing is planned, never above 100
    pub fn percentage(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let percent = (self.done as f64 / self.total as f64 * 100.0).round();
        percent.clamp(0.0, 100.0) as u8
    }
}

/// Lifecycle of the optimization job
#[derive(Debug, Clone, Default, PartialEq)]
pub enum JobState {
    #[default]
    Idle,
    Running,
    Completed(FinalResult),
    Failed(JobError),
    Cancelled(FinalResult),
}

impl JobState {
    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Running)
    }

    /// Completed, Failed or Cancelled
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed(_) | JobState::Failed(_) | JobState::Cancelled(_)
        )
    }

    pub fn result(&self) -> Option<&FinalResult> {
        match self {
            JobState::Completed(result) | JobState::Cancelled(result) => Some(result),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::Completed(_) => "completed",
            JobState::Failed(_) => "failed",
            JobState::Cancelled(_) => "cancelled",
        }
    }
}

/// Current state plus the last known progress
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Job {
    pub state: JobState,
    pub progress: Progress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_bounds() {
        assert_eq!(Progress::default().percentage(), 0);
        assert_eq!(Progress::new(0, 5, "").percentage(), 0);
        assert_eq!(Progress::new(3, 1, "").percentage(), 33);
        assert_eq!(Progress::new(3, 2, "").percentage(), 67);
        assert_eq!(Progress::new(10, 10, "").percentage(), 100);
        assert_eq!(Progress::new(10, 15, "").percentage(), 100);
    }

    #[test]
    fn test_percentage_matches_rounding_for_all_fractions() {
        for total in 1..=40u64 {
            for done in 0..=total {
                let expected = ((done as f64 / total as f64) * 100.0).round() as u8;
                assert_eq!(Progress::new(total, done, "x").percentage(), expected);
            }
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Idle.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Completed(FinalResult::default()).is_terminal());
        assert!(JobState::Failed(JobError::AlreadyRunning).is_terminal());
        assert!(JobState::Cancelled(FinalResult::default()).result().is_some());
    }
}
