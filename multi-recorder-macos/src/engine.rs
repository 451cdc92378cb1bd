//! Input-only HAL audio unit engine.
//!
//! The graph is tracked logically: the input node is the HAL unit's input
//! element, the main mixer is its output element with output IO disabled, so
//! nothing reaches the speakers regardless of mixer volume. The tap is the
//! unit's input callback.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use coreaudio::audio_unit::audio_format::LinearPcmFlags;
use coreaudio::audio_unit::render_callback::{self, data};
use coreaudio::audio_unit::{AudioUnit, Element, IOType, SampleFormat, Scope, StreamFormat};
use parking_lot::Mutex;

use multi_recorder_core::models::device::DeviceId;
use multi_recorder_core::models::error::RecorderError;
use multi_recorder_core::traits::audio_engine::{
    AudioEngine, BufferTapCallback, ConfigurationChangedCallback, EngineFactory, EngineId, NodeId,
};

use crate::properties::*;

const INPUT_NODE: NodeId = NodeId(0);
const MAIN_MIXER_NODE: NodeId = NodeId(1);

const RUN_LOOP_INTERVAL: Duration = Duration::from_millis(50);

/// Capture format resolved by `prepare`.
#[derive(Debug, Clone, Copy)]
struct CaptureFormat {
    device: DeviceId,
    sample_rate: f64,
    channels: u32,
}

/// One HAL input unit bound to one device.
pub struct HalEngine {
    id: EngineId,
    device: Option<DeviceId>,
    mixer_count: u32,
    connections: Vec<(NodeId, NodeId)>,
    tap: Option<(u32, BufferTapCallback)>,
    format: Option<CaptureFormat>,
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
    notifier: ConfigurationChangedCallback,
}

impl HalEngine {
    fn new(id: EngineId, notifier: ConfigurationChangedCallback) -> Self {
        Self {
            id,
            device: None,
            mixer_count: 0,
            connections: Vec::new(),
            tap: None,
            format: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            notifier,
        }
    }

    fn has_node(&self, node: NodeId) -> bool {
        node.0 < 2 + self.mixer_count
    }

    /// Whether audio entering `from` reaches the main mixer.
    fn reaches_main_mixer(&self, from: NodeId) -> bool {
        let mut current = from;
        for _ in 0..=self.connections.len() {
            if current == MAIN_MIXER_NODE {
                return true;
            }
            match self.connections.iter().find(|(src, _)| *src == current) {
                Some(&(_, next)) => current = next,
                None => return false,
            }
        }
        false
    }
}

impl AudioEngine for HalEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    fn set_input_device(&mut self, device: DeviceId) -> Result<(), RecorderError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RecorderError::Engine("cannot rebind a running engine".into()));
        }
        self.device = Some(device);
        self.format = None;
        Ok(())
    }

    fn input_node(&self) -> NodeId {
        INPUT_NODE
    }

    fn main_mixer_node(&self) -> NodeId {
        MAIN_MIXER_NODE
    }

    fn attach_mixer(&mut self) -> Result<NodeId, RecorderError> {
        self.mixer_count += 1;
        Ok(NodeId(1 + self.mixer_count))
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), RecorderError> {
        if !self.has_node(from) || !self.has_node(to) {
            return Err(RecorderError::Engine(format!(
                "unknown node in connection {:?} -> {:?}",
                from, to
            )));
        }
        if from == MAIN_MIXER_NODE {
            return Err(RecorderError::Engine("main mixer has no outgoing connections".into()));
        }
        self.connections.retain(|(src, _)| *src != from);
        self.connections.push((from, to));
        Ok(())
    }

    fn set_output_volume(&mut self, node: NodeId, volume: f32) -> Result<(), RecorderError> {
        if !self.has_node(node) {
            return Err(RecorderError::Engine(format!("unknown node {:?}", node)));
        }
        if node == MAIN_MIXER_NODE && volume > 0.0 {
            log::warn!("{}: output IO is disabled; main mixer volume {} has no effect", self.id, volume);
        }
        Ok(())
    }

    fn install_tap(
        &mut self,
        node: NodeId,
        buffer_frames: u32,
        callback: BufferTapCallback,
    ) -> Result<(), RecorderError> {
        if node != INPUT_NODE {
            return Err(RecorderError::Engine("taps are only supported on the input node".into()));
        }
        if self.tap.is_some() {
            return Err(RecorderError::Engine("input node already has a tap".into()));
        }
        self.tap = Some((buffer_frames, callback));
        Ok(())
    }

    fn remove_tap(&mut self, node: NodeId) {
        if node == INPUT_NODE {
            self.tap = None;
        }
    }

    fn prepare(&mut self) -> Result<(), RecorderError> {
        let device = self
            .device
            .ok_or_else(|| RecorderError::Engine("no input device bound".into()))?;
        if !self.reaches_main_mixer(INPUT_NODE) {
            return Err(RecorderError::Engine("input node is not connected to the main mixer".into()));
        }

        let channels = channel_count(device.0, kAudioDevicePropertyScopeInput);
        if channels == 0 {
            return Err(RecorderError::Engine(format!("device {} has no input channels", device)));
        }
        let sample_rate = get_f64(device.0, kAudioDevicePropertyNominalSampleRate, kAudioObjectPropertyScopeGlobal)
            .map_err(|status| {
                RecorderError::Engine(format!("reading sample rate failed with status {}", status))
            })?;

        if let Some((frames, _)) = &self.tap {
            if let Err(status) =
                set_u32(device.0, kAudioDevicePropertyBufferFrameSize, kAudioObjectPropertyScopeGlobal, *frames)
            {
                log::warn!("{}: could not set buffer size to {} frames (status {})", self.id, frames, status);
            }
        }

        log::debug!(
            "{}: prepared device {} ({} ch @ {} Hz)",
            self.id,
            device,
            channels,
            sample_rate
        );
        self.format = Some(CaptureFormat {
            device,
            sample_rate,
            channels,
        });
        Ok(())
    }

    fn start(&mut self) -> Result<(), RecorderError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RecorderError::Engine("engine already running".into()));
        }
        if self.format.is_none() {
            self.prepare()?;
        }
        let Some(format) = self.format else {
            return Err(RecorderError::Engine("engine is not prepared".into()));
        };
        // Reap a worker that ended on its own after a configuration change.
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }

        self.running.store(true, Ordering::SeqCst);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let running = Arc::clone(&self.running);
        let tap = self.tap.as_ref().map(|(_, callback)| Arc::clone(callback));
        let id = self.id;
        let notifier = Arc::clone(&self.notifier);

        let worker = thread::Builder::new()
            .name("hal-engine-capture".into())
            .spawn(move || {
                if let Err(e) = capture_loop(id, format, tap, Arc::clone(&running), notifier, ready_tx) {
                    log::error!("{}: capture error: {}", id, e);
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                RecorderError::Engine(format!("failed to spawn capture thread: {}", e))
            })?;

        let started = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(RecorderError::Engine("capture thread exited during start".into())));
        if let Err(e) = started {
            self.running.store(false, Ordering::SeqCst);
            let _ = worker.join();
            return Err(e);
        }

        self.worker = Some(worker);
        log::info!("{}: started on device {}", self.id, format.device);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("{}: capture thread panicked", self.id);
            }
            log::info!("{}: stopped", self.id);
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for HalEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns the audio unit for the lifetime of one run.
fn capture_loop(
    id: EngineId,
    format: CaptureFormat,
    tap: Option<BufferTapCallback>,
    running: Arc<AtomicBool>,
    notifier: ConfigurationChangedCallback,
    ready: crossbeam_channel::Sender<Result<(), RecorderError>>,
) -> Result<(), RecorderError> {
    let mut audio_unit = match open_unit(format, tap) {
        Ok(unit) => unit,
        Err(e) => {
            let _ = ready.send(Err(e.clone()));
            return Err(e);
        }
    };

    // Any change to the device's shape or presence stops the engine, then
    // notifies subscribers with this engine's identity.
    let mut listeners = Vec::new();
    for selector in [
        kAudioDevicePropertyDeviceIsAlive,
        kAudioDevicePropertyNominalSampleRate,
        kAudioDevicePropertyStreamFormat,
        kAudioDevicePropertyDeviceHasChanged,
    ] {
        let running = Arc::clone(&running);
        let notifier = Arc::clone(&notifier);
        match PropertyListener::register(format.device.0, selector, kAudioObjectPropertyScopeGlobal, move || {
            running.store(false, Ordering::SeqCst);
            notifier(id);
        }) {
            Ok(listener) => listeners.push(listener),
            Err(status) => log::warn!("{}: listener {:#x} not registered (status {})", id, selector, status),
        }
    }

    if let Err(e) = audio_unit.start() {
        let error = RecorderError::Engine(format!("audio unit start failed: {:?}", e));
        let _ = ready.send(Err(error.clone()));
        return Err(error);
    }
    let _ = ready.send(Ok(()));

    while running.load(Ordering::SeqCst) {
        thread::sleep(RUN_LOOP_INTERVAL);
    }

    drop(listeners);
    if let Err(e) = audio_unit.stop() {
        log::warn!("{}: audio unit stop failed: {:?}", id, e);
    }
    Ok(())
}

fn open_unit(format: CaptureFormat, tap: Option<BufferTapCallback>) -> Result<AudioUnit, RecorderError> {
    let engine_error = |what: &str, e: coreaudio::Error| RecorderError::Engine(format!("{}: {:?}", what, e));

    let mut audio_unit = AudioUnit::new(IOType::HalOutput).map_err(|e| engine_error("create audio unit", e))?;

    audio_unit
        .set_property(
            coreaudio::sys::kAudioOutputUnitProperty_EnableIO,
            Scope::Input,
            Element::Input,
            Some(&1u32),
        )
        .map_err(|e| engine_error("enable input", e))?;
    audio_unit
        .set_property(
            coreaudio::sys::kAudioOutputUnitProperty_EnableIO,
            Scope::Output,
            Element::Output,
            Some(&0u32),
        )
        .map_err(|e| engine_error("disable output", e))?;
    audio_unit
        .set_property(
            coreaudio::sys::kAudioOutputUnitProperty_CurrentDevice,
            Scope::Global,
            Element::Output,
            Some(&format.device.0),
        )
        .map_err(|e| engine_error("bind device", e))?;

    let stream_format = StreamFormat {
        sample_rate: format.sample_rate,
        sample_format: SampleFormat::F32,
        flags: LinearPcmFlags::IS_FLOAT | LinearPcmFlags::IS_PACKED,
        channels: format.channels,
    };
    audio_unit
        .set_property(
            coreaudio::sys::kAudioUnitProperty_StreamFormat,
            Scope::Output,
            Element::Input,
            Some(&stream_format.to_asbd()),
        )
        .map_err(|e| engine_error("set stream format", e))?;

    type Args = render_callback::Args<data::Interleaved<f32>>;
    let sample_rate = format.sample_rate;
    audio_unit
        .set_input_callback(move |args: Args| {
            if let Some(tap) = &tap {
                tap(args.num_frames as u32, sample_rate);
            }
            Ok(())
        })
        .map_err(|e| engine_error("install input callback", e))?;

    audio_unit.initialize().map_err(|e| engine_error("initialize audio unit", e))?;
    Ok(audio_unit)
}

/// Creates [`HalEngine`]s and fans their configuration changes out to
/// subscribers.
pub struct HalEngineFactory {
    next_id: AtomicU64,
    subscribers: Arc<Mutex<Vec<ConfigurationChangedCallback>>>,
}

impl HalEngineFactory {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Default for HalEngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFactory for HalEngineFactory {
    type Engine = HalEngine;

    fn create_engine(&self) -> Result<HalEngine, RecorderError> {
        let id = EngineId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let subscribers = Arc::clone(&self.subscribers);
        let notifier: ConfigurationChangedCallback = Arc::new(move |engine| {
            let callbacks = subscribers.lock().clone();
            for callback in callbacks {
                callback(engine);
            }
        });
        Ok(HalEngine::new(id, notifier))
    }

    fn subscribe_configuration_changes(&self, callback: ConfigurationChangedCallback) {
        self.subscribers.lock().push(callback);
    }
}
