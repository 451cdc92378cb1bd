use super::device::AudioDevice;

/// Ordered set of input devices picked for the next recording.
///
/// Order matters: the first device becomes the aggregate's master/clock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSelection {
    devices: Vec<AudioDevice>,
}

impl DeviceSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a selection from a list, dropping repeated uids.
    pub fn from_devices(devices: impl IntoIterator<Item = AudioDevice>) -> Self {
        let mut selection = Self::new();
        for device in devices {
            if !selection.contains(&device) {
                selection.devices.push(device);
            }
        }
        selection
    }

    pub fn contains(&self, device: &AudioDevice) -> bool {
        self.devices.iter().any(|d| d.uid == device.uid)
    }

    /// Remove the device if selected, otherwise append it.
    pub fn toggle(&mut self, device: AudioDevice) {
        if self.contains(&device) {
            self.devices.retain(|d| d.uid != device.uid);
        } else {
            self.devices.push(device);
        }
    }

    pub fn devices(&self) -> &[AudioDevice] {
        &self.devices
    }

    pub fn uids(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.uid.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }
}
