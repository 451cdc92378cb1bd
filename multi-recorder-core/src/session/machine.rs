use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::devices::aggregate::AggregateDeviceManager;
use crate::graph::capture_graph::{CaptureGraph, DurationReporter};
use crate::models::config::RecorderConfiguration;
use crate::models::device::AggregateDevice;
use crate::models::error::RecorderError;
use crate::models::selection::DeviceSelection;
use crate::models::state::RecordingState;
use crate::session::snapshot::SessionSnapshot;
use crate::traits::audio_engine::{EngineFactory, EngineId};
use crate::traits::audio_hardware::AudioHardware;
use crate::traits::session_delegate::SessionDelegate;

/// Where buffer durations go: `(generation, delta_secs)`.
///
/// Called on the audio thread. The session context forwards the pair back to
/// [`SessionMachine::report_duration`].
pub type DurationSink = Arc<dyn Fn(u64, f64) + Send + Sync + 'static>;

/// A start sequence waiting for the aggregate device to settle.
struct PendingStart {
    generation: u64,
    device: AggregateDevice,
    deadline: Instant,
    next_poll: Instant,
}

/// Recording session state machine.
///
/// Owns the aggregate manager and the capture graph. Every method must be
/// called from one serialized context; [`RecordingSession`] provides that
/// context. Time is passed in so the start sequence can be driven
/// deterministically.
///
/// Each start attempt and each teardown bumps a generation counter. Duration
/// reports and settling deadlines carry the generation they were issued
/// under and are dropped when it no longer matches.
///
/// [`RecordingSession`]: crate::session::context::RecordingSession
pub struct SessionMachine<H: AudioHardware, F: EngineFactory> {
    config: RecorderConfiguration,
    aggregate: AggregateDeviceManager<H>,
    engines: Arc<F>,
    graph: Option<CaptureGraph<F::Engine>>,
    selection: DeviceSelection,
    state: RecordingState,
    elapsed_secs: f64,
    last_error: Option<RecorderError>,
    generation: u64,
    pending: Option<PendingStart>,
    session_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    duration_sink: DurationSink,
    delegate: Option<Arc<dyn SessionDelegate>>,
}

impl<H: AudioHardware, F: EngineFactory> SessionMachine<H, F> {
    pub fn new(
        hardware: Arc<H>,
        engines: Arc<F>,
        config: RecorderConfiguration,
        duration_sink: DurationSink,
    ) -> Result<Self, RecorderError> {
        config.validate().map_err(RecorderError::Configuration)?;
        Ok(Self {
            aggregate: AggregateDeviceManager::new(hardware, &config),
            config,
            engines,
            graph: None,
            selection: DeviceSelection::new(),
            state: RecordingState::Idle,
            elapsed_secs: 0.0,
            last_error: None,
            generation: 0,
            pending: None,
            session_id: None,
            started_at: None,
            duration_sink,
            delegate: None,
        })
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn SessionDelegate>) {
        self.delegate = Some(delegate);
    }

    /// Replace the device selection. A session already under way keeps the
    /// devices it started with.
    pub fn select_devices(&mut self, selection: DeviceSelection) {
        self.selection = selection;
    }

    pub fn selection(&self) -> &DeviceSelection {
        &self.selection
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    pub fn last_error(&self) -> Option<&RecorderError> {
        self.last_error.as_ref()
    }

    /// Identity of the engine currently owned, if any.
    pub fn engine_id(&self) -> Option<EngineId> {
        self.graph.as_ref().map(|g| g.engine_id())
    }

    /// Current generation. Reports tagged with an older one are ignored.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            is_recording: self.state.is_recording(),
            elapsed_secs: self.elapsed_secs,
            last_error: self.last_error.clone(),
            last_error_message: self.last_error.as_ref().map(|e| e.to_string()),
            selected_devices: self.selection.uids(),
            session_id: self.session_id.map(|id| id.to_string()),
            started_at: self.started_at,
        }
    }

    /// Stop when starting or recording, start when idle. Clears the last
    /// error either way.
    pub fn toggle(&mut self, now: Instant) {
        self.last_error = None;
        if self.state.is_active() {
            self.stop();
        } else {
            self.begin_start(now);
        }
    }

    /// When the context should call [`poll`](Self::poll) next.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.next_poll.min(p.deadline))
    }

    /// Advance a start sequence that is waiting for the aggregate device to
    /// settle.
    pub fn poll(&mut self, now: Instant) {
        let interval = self.config.readiness_poll_interval();
        let prefix = self.log_prefix();
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        if pending.generation != self.generation {
            self.pending = None;
            return;
        }
        if now < pending.next_poll && now < pending.deadline {
            return;
        }

        let ready = if now >= pending.deadline {
            if self.aggregate.is_ready(pending.device.id) == Some(false) {
                log::warn!(
                    "{} Aggregate device {} not reported ready after settling delay, starting anyway",
                    prefix,
                    pending.device.id
                );
            }
            true
        } else {
            match self.aggregate.is_ready(pending.device.id) {
                Some(true) => true,
                Some(false) => {
                    pending.next_poll = now + interval;
                    false
                }
                // No readiness query: wait out the full settling delay.
                None => {
                    pending.next_poll = pending.deadline;
                    false
                }
            }
        };

        if ready {
            if let Some(pending) = self.pending.take() {
                self.finish_start(pending);
            }
        }
    }

    /// Accrue captured time. Ignored unless recording under `generation`.
    pub fn report_duration(&mut self, generation: u64, delta_secs: f64) {
        if generation != self.generation || !self.state.is_recording() {
            log::trace!("Dropping stale duration report ({} s)", delta_secs);
            return;
        }
        if !delta_secs.is_finite() || delta_secs <= 0.0 {
            return;
        }
        self.elapsed_secs += delta_secs;
        if let Some(ref delegate) = self.delegate {
            delegate.on_duration_updated(self.elapsed_secs);
        }
    }

    /// React to an engine "configuration changed" notification.
    ///
    /// Only notifications from the engine this session owns count. If that
    /// engine is no longer running, the session stops as if the user had
    /// asked, and the last error becomes [`RecorderError::Interrupted`].
    pub fn handle_configuration_change(&mut self, engine: EngineId) {
        let Some(graph) = self.graph.as_ref() else {
            log::debug!("Ignoring configuration change from {}: no engine owned", engine);
            return;
        };
        if graph.engine_id() != engine {
            log::debug!("Ignoring configuration change from foreign {}", engine);
            return;
        }
        if graph.is_running() {
            log::info!("{} {} configuration changed, still running", self.log_prefix(), engine);
            return;
        }

        log::warn!("{} {} stopped after a configuration change", self.log_prefix(), engine);
        if let Err(e) = self.teardown() {
            log::error!("Cleanup after interruption failed: {}", e);
        }
        self.fail(RecorderError::Interrupted);
    }

    /// Full teardown for process shutdown.
    pub fn shutdown(&mut self) {
        if self.state.is_idle() && self.aggregate.current().is_none() {
            return;
        }
        log::info!("{} Shutting down session", self.log_prefix());
        if let Err(e) = self.teardown() {
            log::error!("Cleanup on shutdown failed: {}", e);
        }
    }

    // --- Internal helpers ---

    fn begin_start(&mut self, now: Instant) {
        if self.selection.is_empty() {
            self.fail(RecorderError::Configuration(
                "select at least one input device".into(),
            ));
            return;
        }

        self.generation += 1;
        self.session_id = Some(Uuid::new_v4());
        self.started_at = None;
        self.set_state(RecordingState::Starting);

        let member_uids = self.selection.uids();
        log::info!("{} Starting with devices {:?}", self.log_prefix(), member_uids);

        match self.aggregate.create(&member_uids) {
            Ok(device) => {
                self.pending = Some(PendingStart {
                    generation: self.generation,
                    device,
                    deadline: now + self.config.settling_delay(),
                    next_poll: now + self.config.readiness_poll_interval(),
                });
            }
            Err(e) => self.abort_start(e),
        }
    }

    fn finish_start(&mut self, pending: PendingStart) {
        let engine = match self.engines.create_engine() {
            Ok(engine) => engine,
            Err(e) => return self.abort_start(e),
        };
        let mut graph = CaptureGraph::new(engine, self.config.tap_buffer_frames);

        let generation = pending.generation;
        let sink = Arc::clone(&self.duration_sink);
        let reporter: DurationReporter = Arc::new(move |delta| sink(generation, delta));

        if let Err(e) = graph.start(pending.device.id, reporter) {
            drop(graph);
            return self.abort_start(e);
        }

        graph.set_reporting(true);
        self.graph = Some(graph);
        self.started_at = Some(Utc::now());
        self.set_state(RecordingState::Recording);
        log::info!("{} Recording from aggregate device {}", self.log_prefix(), pending.device.id);
    }

    fn abort_start(&mut self, error: RecorderError) {
        log::error!("{} Start failed: {}", self.log_prefix(), error);
        if let Err(e) = self.teardown() {
            log::warn!("Cleanup after failed start also failed: {}", e);
        }
        self.fail(error);
    }

    fn stop(&mut self) {
        log::info!("{} Stopping", self.log_prefix());
        if let Err(e) = self.teardown() {
            self.fail(e);
        }
    }

    /// Tear down whatever the start sequence built, however far it got, and
    /// return to idle. The aggregate is destroyed even if the graph never
    /// started.
    fn teardown(&mut self) -> Result<(), RecorderError> {
        self.generation += 1;
        self.pending = None;
        if let Some(mut graph) = self.graph.take() {
            graph.stop();
        }
        let destroyed = self.aggregate.destroy();

        self.started_at = None;
        if self.elapsed_secs != 0.0 {
            self.elapsed_secs = 0.0;
            if let Some(ref delegate) = self.delegate {
                delegate.on_duration_updated(0.0);
            }
        }
        self.set_state(RecordingState::Idle);
        destroyed
    }

    fn set_state(&mut self, state: RecordingState) {
        if self.state == state {
            return;
        }
        self.state = state;
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(state);
        }
    }

    fn fail(&mut self, error: RecorderError) {
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(&error);
        }
        self.last_error = Some(error);
    }

    fn log_prefix(&self) -> String {
        match self.session_id {
            Some(id) => format!("[session {}]", id),
            None => "[session -]".to_string(),
        }
    }
}
