use serde::{Deserialize, Serialize};

/// Recording session state machine.
///
/// State transitions:
/// ```text
/// idle → starting → recording
///   ↑        │           │
///   └────────┴───────────┘  (stop, start failure, interruption)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    #[default]
    Idle,
    Starting,
    Recording,
}

impl RecordingState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    /// Whether a toggle in this state means "stop".
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Recording)
    }
}
