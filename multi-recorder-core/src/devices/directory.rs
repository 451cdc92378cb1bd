//! Live view of the OS input and output devices.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::models::device::AudioDevice;
use crate::traits::audio_hardware::{AudioHardware, DeviceListChangedCallback};

#[derive(Default)]
struct DeviceLists {
    inputs: Vec<AudioDevice>,
    outputs: Vec<AudioDevice>,
}

struct DirectoryInner {
    lists: RwLock<DeviceLists>,
    subscribers: Mutex<Vec<DeviceListChangedCallback>>,
}

impl DirectoryInner {
    fn refresh<H: AudioHardware>(&self, hardware: &H) {
        let inputs = hardware.all_input_devices().unwrap_or_else(|e| {
            log::warn!("Failed to enumerate input devices: {}", e);
            Vec::new()
        });
        let outputs = hardware.all_output_devices().unwrap_or_else(|e| {
            log::warn!("Failed to enumerate output devices: {}", e);
            Vec::new()
        });
        log::debug!("Device directory: {} inputs, {} outputs", inputs.len(), outputs.len());

        *self.lists.write() = DeviceLists { inputs, outputs };
    }

    fn notify(&self) {
        let subscribers = self.subscribers.lock().clone();
        for subscriber in subscribers {
            subscriber();
        }
    }
}

/// Enumerates available hardware and tells subscribers when it changes.
///
/// Lists are cached: a refresh happens on construction and on every OS
/// change notification, before subscribers are called. A failed enumeration
/// is reported as an empty list.
pub struct DeviceDirectory<H: AudioHardware + 'static> {
    hardware: Arc<H>,
    inner: Arc<DirectoryInner>,
}

impl<H: AudioHardware + 'static> DeviceDirectory<H> {
    pub fn new(hardware: Arc<H>) -> Self {
        let inner = Arc::new(DirectoryInner {
            lists: RwLock::new(DeviceLists::default()),
            subscribers: Mutex::new(Vec::new()),
        });
        inner.refresh(hardware.as_ref());

        let weak_inner: Weak<DirectoryInner> = Arc::downgrade(&inner);
        let weak_hardware: Weak<H> = Arc::downgrade(&hardware);
        hardware.subscribe_device_list_changes(Arc::new(move || {
            let (Some(inner), Some(hardware)) = (weak_inner.upgrade(), weak_hardware.upgrade()) else {
                return;
            };
            inner.refresh(hardware.as_ref());
            inner.notify();
        }));

        Self { hardware, inner }
    }

    pub fn list_input_devices(&self) -> Vec<AudioDevice> {
        self.inner.lists.read().inputs.clone()
    }

    pub fn list_output_devices(&self) -> Vec<AudioDevice> {
        self.inner.lists.read().outputs.clone()
    }

    /// Look up an input device by its unique identifier.
    pub fn input_device(&self, uid: &str) -> Option<AudioDevice> {
        self.inner.lists.read().inputs.iter().find(|d| d.uid == uid).cloned()
    }

    /// Subscribe to device-list changes. The callback takes no payload;
    /// re-query the directory from inside it.
    pub fn on_device_list_changed(&self, callback: DeviceListChangedCallback) {
        self.inner.subscribers.lock().push(callback);
    }

    /// Re-read the device lists without waiting for a notification.
    pub fn refresh(&self) {
        self.inner.refresh(self.hardware.as_ref());
    }
}
