use std::fmt;

/// Where the live search session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WorkflowState {
    #[default]
    NotStarted,
    Detecting,
    Detected,
    Confirming,
    Confirmed,
    Searching,
    Searched,
}

impl WorkflowState {
    /// States in which a confirmed object is kept around.
    pub fn holds_confirmed_object(&self) -> bool {
        matches!(
            self,
            WorkflowState::Confirmed | WorkflowState::Searching | WorkflowState::Searched
        )
    }

    /// States that need the camera preview running.
    pub fn needs_live_camera(&self) -> bool {
        matches!(
            self,
            WorkflowState::Detecting | WorkflowState::Detected | WorkflowState::Confirming
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::NotStarted => "NOT_STARTED",
            WorkflowState::Detecting => "DETECTING",
            WorkflowState::Detected => "DETECTED",
            WorkflowState::Confirming => "CONFIRMING",
            WorkflowState::Confirmed => "CONFIRMED",
            WorkflowState::Searching => "SEARCHING",
            WorkflowState::Searched => "SEARCHED",
        };
        f.write_str(name)
    }
}
