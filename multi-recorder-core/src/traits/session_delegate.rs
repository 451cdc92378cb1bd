use crate::models::error::RecorderError;
use crate::models::state::RecordingState;

/// Observer for recording session changes.
///
/// All methods are called from the session context thread, in the order the
/// session applies the changes. Implementations should marshal to the UI
/// thread if needed.
pub trait SessionDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: RecordingState);

    /// Called whenever elapsed recording time changes, including the reset
    /// to zero on stop.
    fn on_duration_updated(&self, elapsed_secs: f64);

    /// Called when an error becomes the session's last error.
    fn on_error(&self, error: &RecorderError);
}
