//! # multi-recorder-core
//!
//! Platform-agnostic core for synchronized multi-device recording.
//!
//! Composes user-selected input devices into one aggregate device, runs a
//! muted capture graph against it, and tracks elapsed recording time while
//! reacting to hardware reconfiguration. Platform backends (macOS CoreAudio)
//! implement the `AudioHardware` and `EngineFactory` traits and plug into
//! the generic `RecordingSession`.
//!
//! ## Architecture
//!
//! ```text
//! multi-recorder-core (this crate)
//! ├── traits/    ← AudioHardware, AudioEngine, EngineFactory, SessionDelegate
//! ├── models/    ← RecorderError, RecordingState, RecorderConfiguration, AudioDevice, etc.
//! ├── devices/   ← DeviceDirectory, AggregateDeviceManager
//! ├── graph/     ← CaptureGraph (input → mixer → muted main mixer)
//! └── session/   ← SessionMachine (state machine), RecordingSession (serialized context)
//! ```

pub mod devices;
pub mod graph;
pub mod models;
pub mod session;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types at crate root for convenience.
pub use devices::aggregate::AggregateDeviceManager;
pub use devices::directory::DeviceDirectory;
pub use graph::capture_graph::{duration_delta, CaptureGraph, DurationReporter};
pub use models::config::RecorderConfiguration;
pub use models::device::{AggregateDevice, AggregateDeviceDescription, AudioDevice, AudioTransportType, DeviceId};
pub use models::error::{ErrorKind, RecorderError};
pub use models::selection::DeviceSelection;
pub use models::state::RecordingState;
pub use session::context::RecordingSession;
pub use session::machine::{DurationSink, SessionMachine};
pub use session::snapshot::SessionSnapshot;
pub use traits::audio_engine::{
    AudioEngine, BufferTapCallback, ConfigurationChangedCallback, EngineFactory, EngineId, NodeId,
};
pub use traits::audio_hardware::{AudioHardware, DeviceListChangedCallback};
pub use traits::session_delegate::SessionDelegate;
