//! Lifecycle of the recorder's single aggregate device.

use std::sync::Arc;

use crate::models::config::RecorderConfiguration;
use crate::models::device::{AggregateDevice, AggregateDeviceDescription, DeviceId};
use crate::models::error::RecorderError;
use crate::traits::audio_hardware::AudioHardware;

/// Owns the aggregate device registered under the well-known uid.
///
/// At most one aggregate with that uid exists at a time: `create` removes any
/// leftover first, including ones from a crashed process. Dropping the
/// manager releases a device it still holds.
pub struct AggregateDeviceManager<H: AudioHardware> {
    hardware: Arc<H>,
    name: String,
    uid: String,
    route_as_system_default: bool,
    is_private: bool,
    current: Option<AggregateDevice>,
}

impl<H: AudioHardware> AggregateDeviceManager<H> {
    pub fn new(hardware: Arc<H>, config: &RecorderConfiguration) -> Self {
        Self {
            hardware,
            name: config.aggregate_name.clone(),
            uid: config.aggregate_uid.clone(),
            route_as_system_default: config.route_as_system_default,
            is_private: config.private_aggregate,
            current: None,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// The aggregate created by the last successful `create`, if not yet
    /// destroyed.
    pub fn current(&self) -> Option<&AggregateDevice> {
        self.current.as_ref()
    }

    /// Create the aggregate from an ordered, non-empty list of member uids.
    /// The first member is the master and clock device.
    ///
    /// On failure nothing is left registered under the well-known uid.
    pub fn create(&mut self, member_uids: &[String]) -> Result<AggregateDevice, RecorderError> {
        let description =
            AggregateDeviceDescription::new(&self.name, &self.uid, member_uids, self.is_private)
                .ok_or_else(|| {
                    RecorderError::Hardware("an aggregate device needs at least one member".into())
                })?;

        self.destroy()?;

        log::info!(
            "Creating aggregate device {} (master {}) from {:?}",
            description.uid,
            description.master_uid,
            description.member_uids
        );

        let id = match self.hardware.create_aggregate_device(&description) {
            Ok(id) => id,
            Err(e) => {
                log::error!("Aggregate device creation failed: {}", e);
                if let Err(cleanup) = self.destroy() {
                    log::warn!("Cleanup after failed creation also failed: {}", cleanup);
                }
                return Err(e);
            }
        };
        log::info!("Created aggregate device {} with id {}", description.uid, id);

        let device = AggregateDevice {
            id,
            uid: description.uid,
            name: description.name,
            member_uids: description.member_uids,
        };
        self.current = Some(device.clone());

        if self.route_as_system_default {
            self.route_as_default(id);
        }

        Ok(device)
    }

    /// Remove every device registered under the well-known uid.
    ///
    /// Finding none is success, so this is safe to call repeatedly and from
    /// error-recovery paths.
    pub fn destroy(&mut self) -> Result<(), RecorderError> {
        let stale: Vec<DeviceId> = self
            .hardware
            .all_aggregate_devices()?
            .into_iter()
            .filter(|d| d.uid == self.uid)
            .map(|d| d.id)
            .collect();

        for id in stale {
            self.hardware.remove_aggregate_device(id)?;
            log::info!("Destroyed aggregate device {} (id {})", self.uid, id);
        }

        self.current = None;
        Ok(())
    }

    /// Whether the OS reports the device as usable. `None` when the OS has no
    /// readiness query.
    pub fn is_ready(&self, id: DeviceId) -> Option<bool> {
        self.hardware.is_device_alive(id)
    }

    // The OS applies default routing asynchronously and reverts it when the
    // device goes away.
    fn route_as_default(&self, id: DeviceId) {
        if let Err(e) = self.hardware.set_default_input_device(id) {
            log::warn!("Could not make aggregate the default input: {}", e);
        }
        if let Err(e) = self.hardware.set_default_output_device(id) {
            log::warn!("Could not make aggregate the default output: {}", e);
        }
    }
}

impl<H: AudioHardware> Drop for AggregateDeviceManager<H> {
    fn drop(&mut self) {
        if self.current.is_some() {
            if let Err(e) = self.destroy() {
                log::error!("Failed to release aggregate device on drop: {}", e);
            }
        }
    }
}
