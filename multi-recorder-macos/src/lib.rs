//! # multi-recorder-macos
//!
//! macOS CoreAudio backend for multi-recorder.
//!
//! Provides:
//! - `CoreAudioHardware` — device enumeration, aggregate-device creation and
//!   removal, default-device routing, and device-list change notifications
//! - `HalEngineFactory` / `HalEngine` — input-only HAL audio unit bound to one
//!   device, with buffer tap and configuration-change notifications
//!
//! ## Platform Requirements
//! - macOS 10.9+ (aggregate device creation via `AudioHardwareCreateAggregateDevice`)
//! - Microphone permission granted to the host process
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use multi_recorder_core::{DeviceDirectory, DeviceSelection, RecorderConfiguration, RecordingSession};
//! use multi_recorder_macos::{CoreAudioHardware, HalEngineFactory};
//!
//! let hardware = Arc::new(CoreAudioHardware::new());
//! let directory = DeviceDirectory::new(Arc::clone(&hardware));
//! let session = RecordingSession::spawn(hardware, Arc::new(HalEngineFactory::new()),
//!     RecorderConfiguration::default(), None)?;
//! session.select_devices(DeviceSelection::from_devices(directory.list_input_devices()));
//! session.toggle();
//! ```

#[cfg(target_os = "macos")]
pub mod engine;
#[cfg(target_os = "macos")]
pub mod hardware;
#[cfg(target_os = "macos")]
mod properties;

#[cfg(target_os = "macos")]
pub use engine::{HalEngine, HalEngineFactory};
#[cfg(target_os = "macos")]
pub use hardware::CoreAudioHardware;
