//! Thin wrappers over the `AudioObject` property API.

#![allow(non_upper_case_globals)]

use std::ffi::c_void;
use std::mem;
use std::ptr;

use core_foundation::base::TCFType;
use core_foundation::string::{CFString, CFStringRef};
use coreaudio::sys::{
    AudioBuffer, AudioBufferList, AudioObjectAddPropertyListener, AudioObjectGetPropertyData,
    AudioObjectGetPropertyDataSize, AudioObjectID, AudioObjectPropertyAddress,
    AudioObjectRemovePropertyListener, AudioObjectSetPropertyData, OSStatus,
};

pub(crate) const kAudioObjectSystemObject: AudioObjectID = 1;

// Selectors ('four char codes').
pub(crate) const kAudioHardwarePropertyDevices: u32 = 0x64657623; // 'dev#'
pub(crate) const kAudioHardwarePropertyDefaultInputDevice: u32 = 0x64496e20; // 'dIn '
pub(crate) const kAudioHardwarePropertyDefaultOutputDevice: u32 = 0x644f7574; // 'dOut'
pub(crate) const kAudioDevicePropertyDeviceUID: u32 = 0x75696420; // 'uid '
pub(crate) const kAudioObjectPropertyName: u32 = 0x6c6e616d; // 'lnam'
pub(crate) const kAudioObjectPropertyClass: u32 = 0x636c6173; // 'clas'
pub(crate) const kAudioDevicePropertyStreamConfiguration: u32 = 0x736c6179; // 'slay'
pub(crate) const kAudioDevicePropertyDeviceIsAlive: u32 = 0x6c69766e; // 'livn'
pub(crate) const kAudioDevicePropertyTransportType: u32 = 0x7472616e; // 'tran'
pub(crate) const kAudioDevicePropertyNominalSampleRate: u32 = 0x6e737274; // 'nsrt'
pub(crate) const kAudioDevicePropertyBufferFrameSize: u32 = 0x6673697a; // 'fsiz'
pub(crate) const kAudioDevicePropertyStreamFormat: u32 = 0x73666d74; // 'sfmt'
pub(crate) const kAudioDevicePropertyDeviceHasChanged: u32 = 0x64696666; // 'diff'

// Scopes.
pub(crate) const kAudioObjectPropertyScopeGlobal: u32 = 0x676c6f62; // 'glob'
pub(crate) const kAudioDevicePropertyScopeInput: u32 = 0x696e7074; // 'inpt'
pub(crate) const kAudioDevicePropertyScopeOutput: u32 = 0x6f757470; // 'outp'
const kAudioObjectPropertyElementMain: u32 = 0;

// Classes and transport types.
pub(crate) const kAudioAggregateDeviceClassID: u32 = 0x61616767; // 'aagg'
pub(crate) const kAudioDeviceTransportTypeBuiltIn: u32 = 0x626c746e; // 'bltn'
pub(crate) const kAudioDeviceTransportTypeUSB: u32 = 0x75736220; // 'usb '
pub(crate) const kAudioDeviceTransportTypeBluetooth: u32 = 0x626c7565; // 'blue'
pub(crate) const kAudioDeviceTransportTypeBluetoothLE: u32 = 0x626c6561; // 'blea'
pub(crate) const kAudioDeviceTransportTypeVirtual: u32 = 0x76697274; // 'virt'
pub(crate) const kAudioDeviceTransportTypeAggregate: u32 = 0x67727570; // 'grup'

pub(crate) fn address(selector: u32, scope: u32) -> AudioObjectPropertyAddress {
    AudioObjectPropertyAddress {
        mSelector: selector,
        mScope: scope,
        mElement: kAudioObjectPropertyElementMain,
    }
}

/// Read a fixed-size property value.
fn get_value<T: Copy>(object: AudioObjectID, selector: u32, scope: u32, initial: T) -> Result<T, OSStatus> {
    let address = address(selector, scope);
    let mut value = initial;
    let mut size = mem::size_of::<T>() as u32;
    let status = unsafe {
        AudioObjectGetPropertyData(
            object,
            &address,
            0,
            ptr::null(),
            &mut size,
            &mut value as *mut T as *mut c_void,
        )
    };
    if status != 0 {
        return Err(status);
    }
    Ok(value)
}

pub(crate) fn get_u32(object: AudioObjectID, selector: u32, scope: u32) -> Result<u32, OSStatus> {
    get_value(object, selector, scope, 0u32)
}

pub(crate) fn get_f64(object: AudioObjectID, selector: u32, scope: u32) -> Result<f64, OSStatus> {
    get_value(object, selector, scope, 0f64)
}

pub(crate) fn set_u32(object: AudioObjectID, selector: u32, scope: u32, value: u32) -> Result<(), OSStatus> {
    let address = address(selector, scope);
    let status = unsafe {
        AudioObjectSetPropertyData(
            object,
            &address,
            0,
            ptr::null(),
            mem::size_of::<u32>() as u32,
            &value as *const u32 as *const c_void,
        )
    };
    if status != 0 {
        return Err(status);
    }
    Ok(())
}

/// Read a CFString property. The HAL hands out a retained reference.
pub(crate) fn get_string(object: AudioObjectID, selector: u32) -> Option<String> {
    let address = address(selector, kAudioObjectPropertyScopeGlobal);
    let mut value: CFStringRef = ptr::null();
    let mut size = mem::size_of::<CFStringRef>() as u32;
    let status = unsafe {
        AudioObjectGetPropertyData(
            object,
            &address,
            0,
            ptr::null(),
            &mut size,
            &mut value as *mut CFStringRef as *mut c_void,
        )
    };
    if status != 0 || value.is_null() {
        return None;
    }
    let string = unsafe { CFString::wrap_under_create_rule(value) };
    Some(string.to_string())
}

/// Read a variable-length list of object ids.
pub(crate) fn get_object_list(object: AudioObjectID, selector: u32) -> Result<Vec<AudioObjectID>, OSStatus> {
    let address = address(selector, kAudioObjectPropertyScopeGlobal);
    let mut size: u32 = 0;
    let status = unsafe { AudioObjectGetPropertyDataSize(object, &address, 0, ptr::null(), &mut size) };
    if status != 0 {
        return Err(status);
    }

    let count = size as usize / mem::size_of::<AudioObjectID>();
    let mut ids: Vec<AudioObjectID> = vec![0; count];
    let status = unsafe {
        AudioObjectGetPropertyData(
            object,
            &address,
            0,
            ptr::null(),
            &mut size,
            ids.as_mut_ptr() as *mut c_void,
        )
    };
    if status != 0 {
        return Err(status);
    }
    ids.truncate(size as usize / mem::size_of::<AudioObjectID>());
    Ok(ids)
}

/// Total channels across all streams of a device in `scope`.
pub(crate) fn channel_count(device: AudioObjectID, scope: u32) -> u32 {
    let address = address(kAudioDevicePropertyStreamConfiguration, scope);
    let mut size: u32 = 0;
    let status = unsafe { AudioObjectGetPropertyDataSize(device, &address, 0, ptr::null(), &mut size) };
    if status != 0 || size == 0 {
        return 0;
    }

    // u64 backing keeps the AudioBufferList suitably aligned.
    let mut buffer = vec![0u64; (size as usize).div_ceil(mem::size_of::<u64>())];
    let status = unsafe {
        AudioObjectGetPropertyData(
            device,
            &address,
            0,
            ptr::null(),
            &mut size,
            buffer.as_mut_ptr() as *mut c_void,
        )
    };
    if status != 0 {
        return 0;
    }

    let list = unsafe { &*(buffer.as_ptr() as *const AudioBufferList) };
    let buffers = &list.mBuffers as *const AudioBuffer;
    (0..list.mNumberBuffers as usize)
        .map(|i| unsafe { (*buffers.add(i)).mNumberChannels })
        .sum()
}

type ListenerCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// A registered property listener, removed again on drop.
pub(crate) struct PropertyListener {
    object: AudioObjectID,
    address: AudioObjectPropertyAddress,
    callback: *mut ListenerCallback,
}

// SAFETY: the callback is `Send + Sync` and only reached through the raw
// pointer handed to CoreAudio; the remaining fields are plain data.
unsafe impl Send for PropertyListener {}
unsafe impl Sync for PropertyListener {}

impl PropertyListener {
    pub(crate) fn register(
        object: AudioObjectID,
        selector: u32,
        scope: u32,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Result<Self, OSStatus> {
        let callback: *mut ListenerCallback = Box::into_raw(Box::new(Box::new(callback)));
        let address = address(selector, scope);
        let status = unsafe {
            AudioObjectAddPropertyListener(object, &address, Some(listener_trampoline), callback as *mut c_void)
        };
        if status != 0 {
            unsafe { drop(Box::from_raw(callback)) };
            return Err(status);
        }
        Ok(Self {
            object,
            address,
            callback,
        })
    }
}

impl Drop for PropertyListener {
    fn drop(&mut self) {
        unsafe {
            let status = AudioObjectRemovePropertyListener(
                self.object,
                &self.address,
                Some(listener_trampoline),
                self.callback as *mut c_void,
            );
            if status != 0 {
                log::warn!("AudioObjectRemovePropertyListener failed with status {}", status);
            }
            drop(Box::from_raw(self.callback));
        }
    }
}

unsafe extern "C" fn listener_trampoline(
    _object: AudioObjectID,
    _address_count: u32,
    _addresses: *const AudioObjectPropertyAddress,
    client_data: *mut c_void,
) -> OSStatus {
    if client_data.is_null() {
        return 0;
    }
    let callback = &*(client_data as *const ListenerCallback);
    callback();
    0
}
