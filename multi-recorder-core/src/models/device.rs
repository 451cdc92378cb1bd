use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque hardware identifier assigned by the OS, stable for the OS session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport type for an audio device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioTransportType {
    BuiltIn,
    Bluetooth,
    Usb,
    Virtual,
    Aggregate,
    Unknown,
}

/// A physical or virtual hardware endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub id: DeviceId,
    pub name: String,
    /// Unique identifier string used for aggregation and lookup.
    pub uid: String,
    pub input_channels: u32,
    pub output_channels: u32,
    pub is_default_input: bool,
    pub is_default_output: bool,
    pub transport_type: AudioTransportType,
}

impl AudioDevice {
    pub fn is_input(&self) -> bool {
        self.input_channels > 0
    }

    pub fn is_output(&self) -> bool {
        self.output_channels > 0
    }
}

/// Everything the OS needs to synthesize an aggregate device.
///
/// The first member is both master and clock source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateDeviceDescription {
    pub name: String,
    pub uid: String,
    pub member_uids: Vec<String>,
    pub master_uid: String,
    pub clock_uid: String,
    pub is_private: bool,
}

impl AggregateDeviceDescription {
    /// Build a description from an ordered member list. Returns `None` when
    /// the list is empty since there would be no master device.
    pub fn new(name: &str, uid: &str, member_uids: &[String], is_private: bool) -> Option<Self> {
        let master = member_uids.first()?.clone();
        Some(Self {
            name: name.to_string(),
            uid: uid.to_string(),
            member_uids: member_uids.to_vec(),
            clock_uid: master.clone(),
            master_uid: master,
            is_private,
        })
    }
}

/// The aggregate device currently held by the aggregate manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateDevice {
    pub id: DeviceId,
    pub uid: String,
    pub name: String,
    pub member_uids: Vec<String>,
}

impl AggregateDevice {
    pub fn master_uid(&self) -> Option<&str> {
        self.member_uids.first().map(String::as_str)
    }
}
