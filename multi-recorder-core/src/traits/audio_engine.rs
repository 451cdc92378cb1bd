use std::fmt;
use std::sync::Arc;

use crate::models::device::DeviceId;
use crate::models::error::RecorderError;

/// Identity of one engine instance, used to scope configuration-change
/// notifications to the engine that raised them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(pub u64);

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// Handle to a node inside an engine's processing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Callback invoked once per delivered buffer.
///
/// Parameters:
/// - `frame_count`: Number of frames in the buffer.
/// - `sample_rate`: Sample rate of the buffer's format.
///
/// Fires on the audio thread: keep it minimal.
pub type BufferTapCallback = Arc<dyn Fn(u32, f64) + Send + Sync + 'static>;

/// Callback for engine-level "configuration changed" notifications. The
/// argument identifies the engine the notification originated from.
pub type ConfigurationChangedCallback = Arc<dyn Fn(EngineId) + Send + Sync + 'static>;

/// OS audio engine primitive: a small processing graph bound to one input
/// device.
pub trait AudioEngine: Send {
    fn id(&self) -> EngineId;

    /// Bind the engine's input node to a hardware device.
    fn set_input_device(&mut self, device: DeviceId) -> Result<(), RecorderError>;

    /// The node delivering captured audio.
    fn input_node(&self) -> NodeId;

    /// The final mixer feeding the engine's output device.
    fn main_mixer_node(&self) -> NodeId;

    /// Add an intermediate mixer node to the graph.
    fn attach_mixer(&mut self) -> Result<NodeId, RecorderError>;

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), RecorderError>;

    fn set_output_volume(&mut self, node: NodeId, volume: f32) -> Result<(), RecorderError>;

    fn install_tap(
        &mut self,
        node: NodeId,
        buffer_frames: u32,
        callback: BufferTapCallback,
    ) -> Result<(), RecorderError>;

    fn remove_tap(&mut self, node: NodeId);

    fn prepare(&mut self) -> Result<(), RecorderError>;

    fn start(&mut self) -> Result<(), RecorderError>;

    fn stop(&mut self);

    /// Actual run state, which may turn false without a `stop` call.
    fn is_running(&self) -> bool;
}

/// Creates engines and carries the global configuration-change stream.
pub trait EngineFactory: Send + Sync {
    type Engine: AudioEngine + 'static;

    fn create_engine(&self) -> Result<Self::Engine, RecorderError>;

    /// Register for configuration-change notifications of every engine this
    /// factory creates. Callbacks may fire on any thread.
    fn subscribe_configuration_changes(&self, callback: ConfigurationChangedCallback);
}
