use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;

use crate::models::config::RecorderConfiguration;
use crate::models::error::RecorderError;
use crate::models::selection::DeviceSelection;
use crate::session::machine::{DurationSink, SessionMachine};
use crate::session::snapshot::SessionSnapshot;
use crate::traits::audio_engine::{EngineFactory, EngineId};
use crate::traits::audio_hardware::AudioHardware;
use crate::traits::session_delegate::SessionDelegate;

/// Messages handled on the session context thread.
enum SessionCommand {
    Toggle,
    Select(DeviceSelection),
    ReportDuration { generation: u64, delta_secs: f64 },
    ConfigurationChanged(EngineId),
    Shutdown,
}

/// Public handle to a recording session.
///
/// A dedicated thread owns the [`SessionMachine`]. User toggles, per-buffer
/// duration reports from the audio thread, and OS engine notifications are
/// all queued onto that thread, so session state is only ever mutated in one
/// place. The settling wait after aggregate creation is a deadline on the
/// same loop, which keeps the thread responsive to a stop request.
///
/// ```text
/// toggle() ───────────────┐
/// audio thread (tap) ─────┼→ [command queue] → session thread → SessionMachine
/// OS config-change ───────┘                                   └→ snapshot / delegate
/// ```
pub struct RecordingSession {
    commands: Sender<SessionCommand>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl RecordingSession {
    pub fn spawn<H, F>(
        hardware: Arc<H>,
        engines: Arc<F>,
        config: RecorderConfiguration,
        delegate: Option<Arc<dyn SessionDelegate>>,
    ) -> Result<Self, RecorderError>
    where
        H: AudioHardware + 'static,
        F: EngineFactory + 'static,
    {
        let (commands, inbox) = crossbeam_channel::unbounded();

        let duration_tx = commands.clone();
        let duration_sink: DurationSink = Arc::new(move |generation, delta_secs| {
            let _ = duration_tx.send(SessionCommand::ReportDuration {
                generation,
                delta_secs,
            });
        });

        let mut machine = SessionMachine::new(hardware, Arc::clone(&engines), config, duration_sink)?;
        if let Some(delegate) = delegate {
            machine.set_delegate(delegate);
        }

        let notify_tx = commands.clone();
        engines.subscribe_configuration_changes(Arc::new(move |engine| {
            let _ = notify_tx.send(SessionCommand::ConfigurationChanged(engine));
        }));

        let snapshot = Arc::new(RwLock::new(machine.snapshot()));
        let published = Arc::clone(&snapshot);

        let worker = thread::Builder::new()
            .name("recording-session".into())
            .spawn(move || run_session(machine, inbox, published))
            .map_err(|e| {
                RecorderError::Configuration(format!("failed to spawn session thread: {}", e))
            })?;

        Ok(Self {
            commands,
            snapshot,
            worker: Some(worker),
        })
    }

    /// Start when idle, stop otherwise. Returns immediately; the start
    /// sequence runs on the session thread.
    pub fn toggle(&self) {
        self.send(SessionCommand::Toggle);
    }

    /// Set the devices the next start will aggregate.
    pub fn select_devices(&self, selection: DeviceSelection) {
        self.send(SessionCommand::Select(selection));
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.read().clone()
    }

    pub fn is_recording(&self) -> bool {
        self.snapshot.read().is_recording
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.snapshot.read().elapsed_secs
    }

    pub fn last_error(&self) -> Option<RecorderError> {
        self.snapshot.read().last_error.clone()
    }

    /// Stop any recording, destroy the aggregate device, and join the
    /// session thread.
    pub fn shutdown(mut self) {
        self.stop_worker();
    }

    fn send(&self, command: SessionCommand) {
        if self.commands.send(command).is_err() {
            log::warn!("Recording session thread is gone; command dropped");
        }
    }

    fn stop_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.commands.send(SessionCommand::Shutdown);
        if worker.join().is_err() {
            log::error!("Recording session thread panicked");
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

fn run_session<H, F>(
    mut machine: SessionMachine<H, F>,
    inbox: Receiver<SessionCommand>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
) where
    H: AudioHardware,
    F: EngineFactory,
{
    log::debug!("Recording session thread started");
    loop {
        let received = match machine.next_deadline() {
            Some(deadline) => inbox.recv_deadline(deadline),
            None => inbox.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(SessionCommand::Toggle) => machine.toggle(Instant::now()),
            Ok(SessionCommand::Select(selection)) => machine.select_devices(selection),
            Ok(SessionCommand::ReportDuration {
                generation,
                delta_secs,
            }) => machine.report_duration(generation, delta_secs),
            Ok(SessionCommand::ConfigurationChanged(engine)) => {
                machine.handle_configuration_change(engine)
            }
            Ok(SessionCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                machine.shutdown();
                *snapshot.write() = machine.snapshot();
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        machine.poll(Instant::now());
        *snapshot.write() = machine.snapshot();
    }
    log::debug!("Recording session thread stopped");
}
