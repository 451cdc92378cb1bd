//! Fake OS collaborators for unit tests.
//!
//! `FakeHardware` keeps an in-memory device registry and records every
//! aggregate-device call. `FakeEngineFactory` hands out engines whose state
//! stays inspectable after the engine has been moved into a capture graph.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::device::{AggregateDeviceDescription, AudioDevice, AudioTransportType, DeviceId};
use crate::models::error::RecorderError;
use crate::models::state::RecordingState;
use crate::traits::audio_engine::{
    AudioEngine, BufferTapCallback, ConfigurationChangedCallback, EngineFactory, EngineId, NodeId,
};
use crate::traits::audio_hardware::{AudioHardware, DeviceListChangedCallback};
use crate::traits::session_delegate::SessionDelegate;

pub fn input_device(id: u32, uid: &str) -> AudioDevice {
    AudioDevice {
        id: DeviceId(id),
        name: format!("Input {}", uid),
        uid: uid.to_string(),
        input_channels: 2,
        output_channels: 0,
        is_default_input: false,
        is_default_output: false,
        transport_type: AudioTransportType::Usb,
    }
}

pub fn output_device(id: u32, uid: &str) -> AudioDevice {
    AudioDevice {
        id: DeviceId(id),
        name: format!("Output {}", uid),
        uid: uid.to_string(),
        input_channels: 0,
        output_channels: 2,
        is_default_input: false,
        is_default_output: false,
        transport_type: AudioTransportType::BuiltIn,
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

// --- Hardware ---

#[derive(Default)]
struct HardwareState {
    inputs: Vec<AudioDevice>,
    outputs: Vec<AudioDevice>,
    aggregates: Vec<AudioDevice>,
    created: Vec<AggregateDeviceDescription>,
    removed: Vec<DeviceId>,
    default_input: Option<DeviceId>,
    default_output: Option<DeviceId>,
    fail_create: Option<String>,
    fail_remove: Option<String>,
    fail_enumeration: bool,
    readiness: Option<bool>,
    next_id: u32,
    listeners: Vec<DeviceListChangedCallback>,
}

pub struct FakeHardware {
    state: Mutex<HardwareState>,
}

impl FakeHardware {
    pub fn new(inputs: Vec<AudioDevice>, outputs: Vec<AudioDevice>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HardwareState {
                inputs,
                outputs,
                readiness: Some(true),
                next_id: 100,
                ..Default::default()
            }),
        })
    }

    pub fn with_inputs(uids: &[&str]) -> Arc<Self> {
        let inputs = uids
            .iter()
            .enumerate()
            .map(|(i, uid)| input_device(i as u32 + 1, uid))
            .collect();
        Self::new(inputs, Vec::new())
    }

    /// Register an aggregate left behind by an earlier process.
    pub fn seed_aggregate(&self, uid: &str) -> DeviceId {
        let mut s = self.state.lock();
        s.next_id += 1;
        let id = DeviceId(s.next_id);
        s.aggregates.push(AudioDevice {
            id,
            name: "Stale aggregate".into(),
            uid: uid.to_string(),
            input_channels: 2,
            output_channels: 2,
            is_default_input: false,
            is_default_output: false,
            transport_type: AudioTransportType::Aggregate,
        });
        id
    }

    pub fn fail_next_create(&self, message: &str) {
        self.state.lock().fail_create = Some(message.to_string());
    }

    pub fn fail_next_remove(&self, message: &str) {
        self.state.lock().fail_remove = Some(message.to_string());
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.state.lock().fail_enumeration = fail;
    }

    pub fn set_readiness(&self, readiness: Option<bool>) {
        self.state.lock().readiness = readiness;
    }

    pub fn add_input(&self, device: AudioDevice) {
        self.state.lock().inputs.push(device);
        self.notify_device_list_changed();
    }

    pub fn remove_input(&self, uid: &str) {
        self.state.lock().inputs.retain(|d| d.uid != uid);
        self.notify_device_list_changed();
    }

    pub fn notify_device_list_changed(&self) {
        let listeners = self.state.lock().listeners.clone();
        for listener in listeners {
            listener();
        }
    }

    pub fn aggregates_with_uid(&self, uid: &str) -> Vec<AudioDevice> {
        self.state
            .lock()
            .aggregates
            .iter()
            .filter(|d| d.uid == uid)
            .cloned()
            .collect()
    }

    pub fn created(&self) -> Vec<AggregateDeviceDescription> {
        self.state.lock().created.clone()
    }

    pub fn removed(&self) -> Vec<DeviceId> {
        self.state.lock().removed.clone()
    }

    pub fn default_input(&self) -> Option<DeviceId> {
        self.state.lock().default_input
    }

    pub fn default_output(&self) -> Option<DeviceId> {
        self.state.lock().default_output
    }
}

impl AudioHardware for FakeHardware {
    fn all_input_devices(&self) -> Result<Vec<AudioDevice>, RecorderError> {
        let s = self.state.lock();
        if s.fail_enumeration {
            return Err(RecorderError::Hardware("enumeration failed".into()));
        }
        Ok(s.inputs.clone())
    }

    fn all_output_devices(&self) -> Result<Vec<AudioDevice>, RecorderError> {
        let s = self.state.lock();
        if s.fail_enumeration {
            return Err(RecorderError::Hardware("enumeration failed".into()));
        }
        Ok(s.outputs.clone())
    }

    fn all_aggregate_devices(&self) -> Result<Vec<AudioDevice>, RecorderError> {
        Ok(self.state.lock().aggregates.clone())
    }

    fn create_aggregate_device(
        &self,
        description: &AggregateDeviceDescription,
    ) -> Result<DeviceId, RecorderError> {
        let mut s = self.state.lock();
        s.created.push(description.clone());
        if let Some(message) = s.fail_create.take() {
            return Err(RecorderError::Hardware(message));
        }
        if s.aggregates.iter().any(|d| d.uid == description.uid) {
            return Err(RecorderError::Hardware(format!(
                "aggregate uid {} already in use",
                description.uid
            )));
        }
        s.next_id += 1;
        let id = DeviceId(s.next_id);
        s.aggregates.push(AudioDevice {
            id,
            name: description.name.clone(),
            uid: description.uid.clone(),
            input_channels: 2 * description.member_uids.len() as u32,
            output_channels: 2,
            is_default_input: false,
            is_default_output: false,
            transport_type: AudioTransportType::Aggregate,
        });
        Ok(id)
    }

    fn remove_aggregate_device(&self, id: DeviceId) -> Result<(), RecorderError> {
        let mut s = self.state.lock();
        if let Some(message) = s.fail_remove.take() {
            return Err(RecorderError::Hardware(message));
        }
        s.aggregates.retain(|d| d.id != id);
        s.removed.push(id);
        if s.default_input == Some(id) {
            s.default_input = None;
        }
        if s.default_output == Some(id) {
            s.default_output = None;
        }
        Ok(())
    }

    fn set_default_input_device(&self, id: DeviceId) -> Result<(), RecorderError> {
        self.state.lock().default_input = Some(id);
        Ok(())
    }

    fn set_default_output_device(&self, id: DeviceId) -> Result<(), RecorderError> {
        self.state.lock().default_output = Some(id);
        Ok(())
    }

    fn is_device_alive(&self, id: DeviceId) -> Option<bool> {
        let s = self.state.lock();
        let readiness = s.readiness?;
        Some(readiness && s.aggregates.iter().any(|d| d.id == id))
    }

    fn subscribe_device_list_changes(&self, callback: DeviceListChangedCallback) {
        self.state.lock().listeners.push(callback);
    }
}

// --- Engine ---

pub const INPUT_NODE: NodeId = NodeId(0);
pub const MAIN_MIXER_NODE: NodeId = NodeId(1);

#[derive(Default)]
struct EngineState {
    input_device: Option<DeviceId>,
    mixers: u32,
    connections: Vec<(NodeId, NodeId)>,
    volumes: HashMap<NodeId, f32>,
    tap: Option<BufferTapCallback>,
    tap_frames: u32,
    prepared: bool,
    running: bool,
    stop_calls: u32,
}

/// Test-side view of an engine owned by a capture graph.
#[derive(Clone)]
pub struct FakeEngineHandle {
    id: EngineId,
    state: Arc<Mutex<EngineState>>,
}

impl FakeEngineHandle {
    pub fn id(&self) -> EngineId {
        self.id
    }

    /// Deliver one buffer through the installed tap, as the audio thread would.
    pub fn deliver_buffer(&self, frame_count: u32, sample_rate: f64) {
        let tap = self.state.lock().tap.clone();
        if let Some(tap) = tap {
            tap(frame_count, sample_rate);
        }
    }

    /// The engine stops on its own, e.g. after the device vanished.
    pub fn simulate_external_stop(&self) {
        self.state.lock().running = false;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn input_device(&self) -> Option<DeviceId> {
        self.state.lock().input_device
    }

    pub fn connections(&self) -> Vec<(NodeId, NodeId)> {
        self.state.lock().connections.clone()
    }

    pub fn volume(&self, node: NodeId) -> Option<f32> {
        self.state.lock().volumes.get(&node).copied()
    }

    pub fn has_tap(&self) -> bool {
        self.state.lock().tap.is_some()
    }

    pub fn tap_frames(&self) -> u32 {
        self.state.lock().tap_frames
    }

    pub fn is_prepared(&self) -> bool {
        self.state.lock().prepared
    }

    pub fn stop_calls(&self) -> u32 {
        self.state.lock().stop_calls
    }
}

pub struct FakeEngine {
    handle: FakeEngineHandle,
    fail_start: Option<String>,
}

impl AudioEngine for FakeEngine {
    fn id(&self) -> EngineId {
        self.handle.id
    }

    fn set_input_device(&mut self, device: DeviceId) -> Result<(), RecorderError> {
        self.handle.state.lock().input_device = Some(device);
        Ok(())
    }

    fn input_node(&self) -> NodeId {
        INPUT_NODE
    }

    fn main_mixer_node(&self) -> NodeId {
        MAIN_MIXER_NODE
    }

    fn attach_mixer(&mut self) -> Result<NodeId, RecorderError> {
        let mut s = self.handle.state.lock();
        s.mixers += 1;
        Ok(NodeId(1 + s.mixers))
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), RecorderError> {
        self.handle.state.lock().connections.push((from, to));
        Ok(())
    }

    fn set_output_volume(&mut self, node: NodeId, volume: f32) -> Result<(), RecorderError> {
        self.handle.state.lock().volumes.insert(node, volume);
        Ok(())
    }

    fn install_tap(
        &mut self,
        _node: NodeId,
        buffer_frames: u32,
        callback: BufferTapCallback,
    ) -> Result<(), RecorderError> {
        let mut s = self.handle.state.lock();
        s.tap = Some(callback);
        s.tap_frames = buffer_frames;
        Ok(())
    }

    fn remove_tap(&mut self, _node: NodeId) {
        self.handle.state.lock().tap = None;
    }

    fn prepare(&mut self) -> Result<(), RecorderError> {
        self.handle.state.lock().prepared = true;
        Ok(())
    }

    fn start(&mut self) -> Result<(), RecorderError> {
        if let Some(message) = self.fail_start.take() {
            return Err(RecorderError::Engine(message));
        }
        self.handle.state.lock().running = true;
        Ok(())
    }

    fn stop(&mut self) {
        let mut s = self.handle.state.lock();
        s.running = false;
        s.stop_calls += 1;
    }

    fn is_running(&self) -> bool {
        self.handle.state.lock().running
    }
}

#[derive(Default)]
pub struct FakeEngineFactory {
    next_id: AtomicU64,
    engines: Mutex<Vec<FakeEngineHandle>>,
    listeners: Mutex<Vec<ConfigurationChangedCallback>>,
    fail_start: Mutex<Option<String>>,
}

impl FakeEngineFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_start(&self, message: &str) {
        *self.fail_start.lock() = Some(message.to_string());
    }

    pub fn last_engine(&self) -> Option<FakeEngineHandle> {
        self.engines.lock().last().cloned()
    }

    pub fn engine_count(&self) -> usize {
        self.engines.lock().len()
    }

    /// Broadcast a configuration-change notification, as the OS would.
    pub fn notify_configuration_change(&self, engine: EngineId) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(engine);
        }
    }

    /// A standalone engine not tracked as "created" by this factory.
    pub fn detached_engine(id: u64) -> (FakeEngine, FakeEngineHandle) {
        let handle = FakeEngineHandle {
            id: EngineId(id),
            state: Arc::new(Mutex::new(EngineState::default())),
        };
        let engine = FakeEngine {
            handle: handle.clone(),
            fail_start: None,
        };
        (engine, handle)
    }
}

impl EngineFactory for FakeEngineFactory {
    type Engine = FakeEngine;

    fn create_engine(&self) -> Result<FakeEngine, RecorderError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (mut engine, handle) = Self::detached_engine(id);
        engine.fail_start = self.fail_start.lock().take();
        self.engines.lock().push(handle);
        Ok(engine)
    }

    fn subscribe_configuration_changes(&self, callback: ConfigurationChangedCallback) {
        self.listeners.lock().push(callback);
    }
}

// --- Delegate ---

#[derive(Debug, Clone, PartialEq)]
pub enum DelegateEvent {
    State(RecordingState),
    Duration(f64),
    Error(RecorderError),
}

#[derive(Default)]
pub struct RecordingDelegate {
    events: Mutex<Vec<DelegateEvent>>,
}

impl RecordingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<DelegateEvent> {
        self.events.lock().clone()
    }

    pub fn states(&self) -> Vec<RecordingState> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                DelegateEvent::State(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<RecorderError> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                DelegateEvent::Error(err) => Some(err.clone()),
                _ => None,
            })
            .collect()
    }
}

impl SessionDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: RecordingState) {
        self.events.lock().push(DelegateEvent::State(state));
    }

    fn on_duration_updated(&self, elapsed_secs: f64) {
        self.events.lock().push(DelegateEvent::Duration(elapsed_secs));
    }

    fn on_error(&self, error: &RecorderError) {
        self.events.lock().push(DelegateEvent::Error(error.clone()));
    }
}
