use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::error::RecorderError;
use crate::models::state::RecordingState;

/// Point-in-time view of a recording session, for UIs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: RecordingState,
    pub is_recording: bool,
    /// Captured time in seconds; grows while recording, zero otherwise.
    pub elapsed_secs: f64,
    #[serde(skip)]
    pub last_error: Option<RecorderError>,
    /// Human-readable form of `last_error`.
    pub last_error_message: Option<String>,
    /// Unique identifiers of the selected input devices, in order.
    pub selected_devices: Vec<String>,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}
