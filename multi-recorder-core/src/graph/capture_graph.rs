use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::models::device::DeviceId;
use crate::models::error::RecorderError;
use crate::traits::audio_engine::{AudioEngine, BufferTapCallback, EngineId, NodeId};

/// Receives the captured duration of each buffer, in seconds.
///
/// Called on the audio thread.
pub type DurationReporter = Arc<dyn Fn(f64) + Send + Sync + 'static>;

/// Duration of a buffer of `frame_count` frames at `sample_rate` Hz.
pub fn duration_delta(frame_count: u32, sample_rate: f64) -> f64 {
    if sample_rate > 0.0 && sample_rate.is_finite() {
        frame_count as f64 / sample_rate
    } else {
        0.0
    }
}

/// Minimal capture topology bound to one input device:
///
/// ```text
/// [Input] ──tap──→ [Mixer] → [Main Mixer (volume 0)] → output
/// ```
///
/// The main mixer is always muted so capture never produces audible
/// monitoring. The tap reports buffer durations only while reporting is
/// switched on; the session turns it on once it is recording.
pub struct CaptureGraph<E: AudioEngine> {
    engine: E,
    buffer_frames: u32,
    device: Option<DeviceId>,
    tap_node: Option<NodeId>,
    reporting: Arc<AtomicBool>,
}

impl<E: AudioEngine> CaptureGraph<E> {
    pub fn new(engine: E, buffer_frames: u32) -> Self {
        Self {
            engine,
            buffer_frames,
            device: None,
            tap_node: None,
            reporting: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn engine_id(&self) -> EngineId {
        self.engine.id()
    }

    /// The device the graph is bound to, if started.
    pub fn device(&self) -> Option<DeviceId> {
        self.device
    }

    /// Build the graph against `device` and start the engine.
    ///
    /// On failure the graph is left stopped.
    pub fn start(&mut self, device: DeviceId, reporter: DurationReporter) -> Result<(), RecorderError> {
        if self.device.is_some() {
            return Err(RecorderError::Engine("capture graph already started".into()));
        }

        self.device = Some(device);
        let result = self.build_and_run(device, reporter);
        match &result {
            Ok(()) => log::info!("{} capturing from device {}", self.engine.id(), device),
            Err(e) => {
                log::error!("{} failed to start on device {}: {}", self.engine.id(), device, e);
                self.stop();
            }
        }
        result
    }

    fn build_and_run(&mut self, device: DeviceId, reporter: DurationReporter) -> Result<(), RecorderError> {
        self.engine.set_input_device(device)?;

        let input = self.engine.input_node();
        let reporting = Arc::clone(&self.reporting);
        let tap: BufferTapCallback = Arc::new(move |frame_count: u32, sample_rate: f64| {
            // The flag can flip right after this check; the session drops
            // reports that arrive once it is no longer recording.
            if reporting.load(Ordering::Acquire) {
                reporter(duration_delta(frame_count, sample_rate));
            }
        });
        self.engine.install_tap(input, self.buffer_frames, tap)?;
        self.tap_node = Some(input);

        let mixer = self.engine.attach_mixer()?;
        let main_mixer = self.engine.main_mixer_node();
        self.engine.connect(input, mixer)?;
        self.engine.connect(mixer, main_mixer)?;
        self.engine.set_output_volume(main_mixer, 0.0)?;

        self.engine.prepare()?;
        self.engine.start()
    }

    /// Switch duration reporting on or off.
    pub fn set_reporting(&self, enabled: bool) {
        self.reporting.store(enabled, Ordering::Release);
    }

    /// Halt the engine and release the bound device. A no-op when the graph
    /// was never started.
    pub fn stop(&mut self) {
        self.reporting.store(false, Ordering::Release);
        if let Some(node) = self.tap_node.take() {
            self.engine.remove_tap(node);
        }
        if let Some(device) = self.device.take() {
            self.engine.stop();
            log::info!("{} stopped, released device {}", self.engine.id(), device);
        }
    }

    /// Actual engine run state, independent of any session bookkeeping.
    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }
}

impl<E: AudioEngine> Drop for CaptureGraph<E> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use parking_lot::Mutex;

    use super::*;
    use crate::testing::{FakeEngineFactory, INPUT_NODE, MAIN_MIXER_NODE};

    fn collecting_reporter() -> (DurationReporter, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (Arc::new(move |delta| sink.lock().push(delta)), seen)
    }

    #[test]
    fn duration_delta_divides_frames_by_rate() {
        assert_relative_eq!(duration_delta(4096, 48000.0), 0.085_333_333, epsilon = 1e-6);
        assert_relative_eq!(duration_delta(44100, 44100.0), 1.0);
        assert_eq!(duration_delta(512, 0.0), 0.0);
        assert_eq!(duration_delta(512, f64::NAN), 0.0);
    }

    #[test]
    fn start_builds_muted_topology_bound_to_device() {
        let (engine, handle) = FakeEngineFactory::detached_engine(1);
        let mut graph = CaptureGraph::new(engine, 4096);
        let (reporter, _) = collecting_reporter();

        graph.start(DeviceId(42), reporter).unwrap();

        assert!(graph.is_running());
        assert_eq!(graph.device(), Some(DeviceId(42)));
        assert_eq!(handle.input_device(), Some(DeviceId(42)));
        assert!(handle.is_prepared());
        assert!(handle.has_tap());
        assert_eq!(handle.tap_frames(), 4096);

        let connections = handle.connections();
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0].0, INPUT_NODE);
        assert_eq!(connections[0].1, connections[1].0);
        assert_eq!(connections[1].1, MAIN_MIXER_NODE);
        assert_eq!(handle.volume(MAIN_MIXER_NODE), Some(0.0));
    }

    #[test]
    fn buffers_report_only_while_reporting() {
        let (engine, handle) = FakeEngineFactory::detached_engine(1);
        let mut graph = CaptureGraph::new(engine, 4096);
        let (reporter, seen) = collecting_reporter();
        graph.start(DeviceId(7), reporter).unwrap();

        handle.deliver_buffer(4800, 48000.0);
        assert!(seen.lock().is_empty());

        graph.set_reporting(true);
        handle.deliver_buffer(4800, 48000.0);
        handle.deliver_buffer(2400, 48000.0);
        let deltas = seen.lock().clone();
        assert_eq!(deltas.len(), 2);
        assert_relative_eq!(deltas[0] + deltas[1], 0.15, epsilon = 1e-12);

        graph.set_reporting(false);
        handle.deliver_buffer(4800, 48000.0);
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn stop_halts_engine_and_is_idempotent() {
        let (engine, handle) = FakeEngineFactory::detached_engine(1);
        let mut graph = CaptureGraph::new(engine, 4096);
        let (reporter, _) = collecting_reporter();
        graph.start(DeviceId(7), reporter).unwrap();

        graph.stop();
        graph.stop();

        assert!(!graph.is_running());
        assert!(!handle.has_tap());
        assert_eq!(handle.stop_calls(), 1);
        assert_eq!(graph.device(), None);
    }

    #[test]
    fn stop_without_start_is_noop() {
        let (engine, handle) = FakeEngineFactory::detached_engine(1);
        let mut graph = CaptureGraph::new(engine, 4096);
        graph.stop();
        assert_eq!(handle.stop_calls(), 0);
    }

    #[test]
    fn start_failure_leaves_graph_stopped() {
        let factory = FakeEngineFactory::new();
        factory.fail_next_start("format mismatch");
        let engine = crate::traits::audio_engine::EngineFactory::create_engine(factory.as_ref()).unwrap();
        let handle = factory.last_engine().unwrap();
        let mut graph = CaptureGraph::new(engine, 4096);
        let (reporter, _) = collecting_reporter();

        let err = graph.start(DeviceId(7), reporter).unwrap_err();

        assert_eq!(err, RecorderError::Engine("format mismatch".into()));
        assert!(!graph.is_running());
        assert!(!handle.has_tap());
        assert_eq!(graph.device(), None);
    }

    #[test]
    fn second_start_is_rejected() {
        let (engine, _handle) = FakeEngineFactory::detached_engine(1);
        let mut graph = CaptureGraph::new(engine, 4096);
        let (reporter, _) = collecting_reporter();
        graph.start(DeviceId(7), Arc::clone(&reporter)).unwrap();

        assert!(matches!(graph.start(DeviceId(8), reporter), Err(RecorderError::Engine(_))));
        assert_eq!(graph.device(), Some(DeviceId(7)));
    }

    #[test]
    fn external_stop_is_visible_through_is_running() {
        let (engine, handle) = FakeEngineFactory::detached_engine(1);
        let mut graph = CaptureGraph::new(engine, 4096);
        let (reporter, _) = collecting_reporter();
        graph.start(DeviceId(7), reporter).unwrap();

        handle.simulate_external_stop();
        assert!(!graph.is_running());
    }
}
