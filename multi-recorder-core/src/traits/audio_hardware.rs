use std::sync::Arc;

use crate::models::device::{AggregateDeviceDescription, AudioDevice, DeviceId};
use crate::models::error::RecorderError;

/// Callback invoked when the OS reports hardware attach, detach, or
/// reconfiguration. Carries no payload: subscribers re-query.
pub type DeviceListChangedCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// OS audio hardware capability: enumeration, aggregate-device primitives,
/// and default-device routing.
///
/// Implemented by:
/// - `CoreAudioHardware` (macOS)
///
/// Only the aggregate manager calls the aggregate primitives; everything else
/// goes through the manager.
pub trait AudioHardware: Send + Sync {
    /// All devices with at least one input channel.
    fn all_input_devices(&self) -> Result<Vec<AudioDevice>, RecorderError>;

    /// All devices with at least one output channel.
    fn all_output_devices(&self) -> Result<Vec<AudioDevice>, RecorderError>;

    /// All aggregate devices currently registered, by any process.
    fn all_aggregate_devices(&self) -> Result<Vec<AudioDevice>, RecorderError>;

    /// Synthesize an aggregate device. Returns the OS-assigned identifier.
    fn create_aggregate_device(
        &self,
        description: &AggregateDeviceDescription,
    ) -> Result<DeviceId, RecorderError>;

    /// Remove an aggregate device by its hardware identifier.
    fn remove_aggregate_device(&self, id: DeviceId) -> Result<(), RecorderError>;

    fn set_default_input_device(&self, id: DeviceId) -> Result<(), RecorderError>;

    fn set_default_output_device(&self, id: DeviceId) -> Result<(), RecorderError>;

    /// Whether the device is registered and usable.
    ///
    /// `None` means the OS offers no such query; callers fall back to a fixed
    /// settling delay.
    fn is_device_alive(&self, id: DeviceId) -> Option<bool>;

    /// Register for device-list change notifications. Callbacks may fire on
    /// any thread.
    fn subscribe_device_list_changes(&self, callback: DeviceListChangedCallback);
}
