//! Pipeline lifecycle states

use std::fmt;

/// State of a pipeline run.
///
/// ```text
/// Created → Loading → Iterating → Training → Finalizing → Saved
///    └─────────┴──────────┴───────────┴───────────┴──→ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Built, not yet run
    Created,
    /// Running `load` and fingerprinting datasets
    Loading,
    /// Running `model_iterator`
    Iterating,
    /// Training model configurations
    Training,
    /// Running `finalize`, stamping metadata and saving
    Finalizing,
    /// Run completed
    Saved,
    /// Run aborted
    Failed,
}

impl PipelineState {
    /// Check if no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Saved | Self::Failed)
    }

    /// Check if `next` directly follows this state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Created, Self::Loading)
            | (Self::Loading, Self::Iterating)
            | (Self::Iterating, Self::Training)
            | (Self::Training, Self::Finalizing)
            | (Self::Finalizing, Self::Saved) => true,
            (from, Self::Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "CREATED",
            Self::Loading => "LOADING",
            Self::Iterating => "ITERATING",
            Self::Training => "TRAINING",
            Self::Finalizing => "FINALIZING",
            Self::Saved => "SAVED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path() {
        let path = [
            PipelineState::Created,
            PipelineState::Loading,
            PipelineState::Iterating,
            PipelineState::Training,
            PipelineState::Finalizing,
            PipelineState::Saved,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
            assert!(!pair[1].can_transition_to(pair[0]));
        }
    }

    #[test]
    fn test_failed_reachable_from_non_terminal_only() {
        assert!(PipelineState::Training.can_transition_to(PipelineState::Failed));
        assert!(PipelineState::Created.can_transition_to(PipelineState::Failed));
        assert!(!PipelineState::Saved.can_transition_to(PipelineState::Failed));
        assert!(!PipelineState::Failed.can_transition_to(PipelineState::Failed));
    }

    #[test]
    fn test_no_skipping() {
        assert!(!PipelineState::Loading.can_transition_to(PipelineState::Training));
        assert!(!PipelineState::Created.can_transition_to(PipelineState::Saved));
    }
}
