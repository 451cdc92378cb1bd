//! CoreAudio hardware access via the `AudioObject` API.
//!
//! Lists devices with their UIDs, channel counts and transport types,
//! synthesizes and removes aggregate devices, routes the system default
//! input/output, and forwards device-list changes.

use core_foundation::array::CFArray;
use core_foundation::base::{CFType, TCFType};
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use coreaudio::sys::{AudioObjectID, OSStatus};
use parking_lot::Mutex;

use multi_recorder_core::models::device::{
    AggregateDeviceDescription, AudioDevice, AudioTransportType, DeviceId,
};
use multi_recorder_core::models::error::RecorderError;
use multi_recorder_core::traits::audio_hardware::{AudioHardware, DeviceListChangedCallback};

use crate::properties::{self, *};

#[link(name = "CoreAudio", kind = "framework")]
extern "C" {
    fn AudioHardwareCreateAggregateDevice(
        in_description: CFDictionaryRef,
        out_device_id: *mut AudioObjectID,
    ) -> OSStatus;
    fn AudioHardwareDestroyAggregateDevice(in_device_id: AudioObjectID) -> OSStatus;
}

// Aggregate description keys (kAudioAggregateDevice*Key).
const KEY_NAME: &str = "name";
const KEY_UID: &str = "uid";
const KEY_SUB_DEVICES: &str = "subdevices";
const KEY_SUB_DEVICE_UID: &str = "uid";
const KEY_MASTER: &str = "master";
const KEY_CLOCK: &str = "clock";
const KEY_PRIVATE: &str = "private";

/// CoreAudio implementation of [`AudioHardware`].
pub struct CoreAudioHardware {
    listeners: Mutex<Vec<PropertyListener>>,
}

impl CoreAudioHardware {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn all_devices(&self) -> Result<Vec<AudioDevice>, RecorderError> {
        let ids = get_object_list(kAudioObjectSystemObject, kAudioHardwarePropertyDevices)
            .map_err(|status| hardware_error("listing devices", status))?;

        let default_input = default_device(kAudioHardwarePropertyDefaultInputDevice);
        let default_output = default_device(kAudioHardwarePropertyDefaultOutputDevice);

        Ok(ids
            .into_iter()
            .filter_map(|id| describe(id, default_input, default_output))
            .collect())
    }

    fn set_default(&self, selector: u32, id: DeviceId, what: &str) -> Result<(), RecorderError> {
        set_u32(kAudioObjectSystemObject, selector, kAudioObjectPropertyScopeGlobal, id.0)
            .map_err(|status| hardware_error(what, status))
    }
}

impl Default for CoreAudioHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioHardware for CoreAudioHardware {
    fn all_input_devices(&self) -> Result<Vec<AudioDevice>, RecorderError> {
        Ok(self.all_devices()?.into_iter().filter(AudioDevice::is_input).collect())
    }

    fn all_output_devices(&self) -> Result<Vec<AudioDevice>, RecorderError> {
        Ok(self.all_devices()?.into_iter().filter(AudioDevice::is_output).collect())
    }

    fn all_aggregate_devices(&self) -> Result<Vec<AudioDevice>, RecorderError> {
        let ids = get_object_list(kAudioObjectSystemObject, kAudioHardwarePropertyDevices)
            .map_err(|status| hardware_error("listing devices", status))?;

        Ok(ids
            .into_iter()
            .filter(|&id| {
                get_u32(id, kAudioObjectPropertyClass, kAudioObjectPropertyScopeGlobal)
                    .is_ok_and(|class| class == kAudioAggregateDeviceClassID)
            })
            .filter_map(|id| describe(id, None, None))
            .collect())
    }

    fn create_aggregate_device(
        &self,
        description: &AggregateDeviceDescription,
    ) -> Result<DeviceId, RecorderError> {
        let dictionary = aggregate_dictionary(description);
        let mut id: AudioObjectID = 0;
        let status = unsafe {
            AudioHardwareCreateAggregateDevice(dictionary.as_concrete_TypeRef(), &mut id)
        };
        if status != 0 {
            return Err(hardware_error("AudioHardwareCreateAggregateDevice", status));
        }
        if id == 0 {
            return Err(RecorderError::Hardware(
                "AudioHardwareCreateAggregateDevice returned no device".into(),
            ));
        }

        log::debug!(
            "Created aggregate '{}' ({}) as device {}",
            description.name,
            description.uid,
            id
        );
        Ok(DeviceId(id))
    }

    fn remove_aggregate_device(&self, id: DeviceId) -> Result<(), RecorderError> {
        let status = unsafe { AudioHardwareDestroyAggregateDevice(id.0) };
        if status != 0 {
            return Err(hardware_error("AudioHardwareDestroyAggregateDevice", status));
        }
        Ok(())
    }

    fn set_default_input_device(&self, id: DeviceId) -> Result<(), RecorderError> {
        self.set_default(kAudioHardwarePropertyDefaultInputDevice, id, "setting default input")
    }

    fn set_default_output_device(&self, id: DeviceId) -> Result<(), RecorderError> {
        self.set_default(kAudioHardwarePropertyDefaultOutputDevice, id, "setting default output")
    }

    fn is_device_alive(&self, id: DeviceId) -> Option<bool> {
        // A freshly created aggregate may not answer yet; that counts as not alive.
        Some(
            get_u32(id.0, kAudioDevicePropertyDeviceIsAlive, kAudioObjectPropertyScopeGlobal)
                .is_ok_and(|alive| alive != 0),
        )
    }

    fn subscribe_device_list_changes(&self, callback: DeviceListChangedCallback) {
        match PropertyListener::register(
            kAudioObjectSystemObject,
            kAudioHardwarePropertyDevices,
            kAudioObjectPropertyScopeGlobal,
            move || callback(),
        ) {
            Ok(listener) => self.listeners.lock().push(listener),
            Err(status) => {
                log::warn!("Device-list listener registration failed with status {}", status)
            }
        }
    }
}

fn hardware_error(what: &str, status: OSStatus) -> RecorderError {
    RecorderError::Hardware(format!("{} failed with status {}", what, status))
}

fn default_device(selector: u32) -> Option<AudioObjectID> {
    get_u32(kAudioObjectSystemObject, selector, kAudioObjectPropertyScopeGlobal)
        .ok()
        .filter(|&id| id != 0)
}

/// Read one device's identity and capabilities. Devices without a UID are
/// skipped.
fn describe(
    id: AudioObjectID,
    default_input: Option<AudioObjectID>,
    default_output: Option<AudioObjectID>,
) -> Option<AudioDevice> {
    let uid = get_string(id, kAudioDevicePropertyDeviceUID)?;
    let name = get_string(id, kAudioObjectPropertyName).unwrap_or_else(|| uid.clone());
    let transport_type = get_u32(id, kAudioDevicePropertyTransportType, kAudioObjectPropertyScopeGlobal)
        .map(transport_type)
        .unwrap_or(AudioTransportType::Unknown);

    Some(AudioDevice {
        id: DeviceId(id),
        name,
        uid,
        input_channels: properties::channel_count(id, kAudioDevicePropertyScopeInput),
        output_channels: properties::channel_count(id, kAudioDevicePropertyScopeOutput),
        is_default_input: default_input == Some(id),
        is_default_output: default_output == Some(id),
        transport_type,
    })
}

fn transport_type(raw: u32) -> AudioTransportType {
    match raw {
        kAudioDeviceTransportTypeBuiltIn => AudioTransportType::BuiltIn,
        kAudioDeviceTransportTypeBluetooth | kAudioDeviceTransportTypeBluetoothLE => {
            AudioTransportType::Bluetooth
        }
        kAudioDeviceTransportTypeUSB => AudioTransportType::Usb,
        kAudioDeviceTransportTypeVirtual => AudioTransportType::Virtual,
        kAudioDeviceTransportTypeAggregate => AudioTransportType::Aggregate,
        _ => AudioTransportType::Unknown,
    }
}

/// Build the aggregate description dictionary. Sub-devices keep the order of
/// `member_uids`.
fn aggregate_dictionary(description: &AggregateDeviceDescription) -> CFDictionary<CFString, CFType> {
    let sub_devices: Vec<CFDictionary<CFString, CFType>> = description
        .member_uids
        .iter()
        .map(|uid| {
            CFDictionary::from_CFType_pairs(&[(
                CFString::new(KEY_SUB_DEVICE_UID),
                CFString::new(uid).as_CFType(),
            )])
        })
        .collect();
    let sub_devices = CFArray::from_CFTypes(&sub_devices);

    CFDictionary::from_CFType_pairs(&[
        (CFString::new(KEY_NAME), CFString::new(&description.name).as_CFType()),
        (CFString::new(KEY_UID), CFString::new(&description.uid).as_CFType()),
        (CFString::new(KEY_SUB_DEVICES), sub_devices.as_CFType()),
        (CFString::new(KEY_MASTER), CFString::new(&description.master_uid).as_CFType()),
        (CFString::new(KEY_CLOCK), CFString::new(&description.clock_uid).as_CFType()),
        (
            CFString::new(KEY_PRIVATE),
            CFNumber::from(i32::from(description.is_private)).as_CFType(),
        ),
    ])
}
