use serde::{Deserialize, Serialize};

/// Job lifecycle state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Published, waiting for delivery
    Pending,

    /// Delivered to a consumer callback
    Running,

    /// Callback resolved
    Completed,

    /// Callback failed
    Failed,

    /// Withdrawn before completion
    Cancelled,
}

impl JobState {
    /// Check if the state is terminal
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Allowed edges: PENDING -> RUNNING, RUNNING -> {COMPLETED | FAILED},
    /// and CANCELLED from PENDING or RUNNING.
    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }

    /// Get the state name as a string
    pub fn name(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Running,
        JobState::Completed,
        JobState::Failed,
        JobState::Cancelled,
    ];

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {} must be rejected", from, to);
            }
        }
    }

    #[test]
    fn test_no_backward_transitions() {
        assert!(!JobState::Running.can_transition_to(JobState::Pending));
        assert!(!JobState::Running.can_transition_to(JobState::Running));
        assert!(!JobState::Pending.can_transition_to(JobState::Completed));
        assert!(!JobState::Pending.can_transition_to(JobState::Failed));
    }

    #[test]
    fn test_forward_transitions() {
        assert!(JobState::Pending.can_transition_to(JobState::Running));
        assert!(JobState::Pending.can_transition_to(JobState::Cancelled));
        assert!(JobState::Running.can_transition_to(JobState::Completed));
        assert!(JobState::Running.can_transition_to(JobState::Failed));
        assert!(JobState::Running.can_transition_to(JobState::Cancelled));
    }

    #[test]
    fn test_serde_uses_upper_case_names() {
        let json = serde_json::to_string(&JobState::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
    }
}
