use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::audio::{meter, AudioCaptureSource, AudioFrame, CaptureHandle, VolumeSample};
use crate::transport::{AudioChunk, LiveSessionTransport, TransportEvent, TransportHandle};

use super::config::SessionConfig;
use super::state::{ErrorReason, SessionError, SessionHandle, SessionState};
use super::stats::SessionStats;

/// Orchestrates one live voice session at a time
///
/// `start` acquires the microphone and the voice channel concurrently and
/// only reports success once both are live; a partial acquisition is rolled
/// back before the caller sees anything. A spawned session task owns both
/// handles from acquisition to teardown, so every exit path (stop, remote
/// close, fault, cancelled start) releases the transport first and the
/// capture source second.
///
/// Dropping the controller mid-session tears the session down in the
/// background; the task notices its stop signal source is gone.
pub struct SessionController {
    capture: Arc<dyn AudioCaptureSource>,
    transport: Arc<dyn LiveSessionTransport>,
    config: SessionConfig,
    shared: Arc<Shared>,
    /// Stop signal and join handle of the task holding resources.
    /// Lock order: `runtime` before `shared.current`, never the reverse.
    runtime: Mutex<Option<SessionRuntime>>,
    playback_tx: mpsc::Sender<AudioChunk>,
    playback_rx: Mutex<Option<mpsc::Receiver<AudioChunk>>>,
}

struct SessionRuntime {
    handle: SessionHandle,
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// State shared between the controller surface and the session task
struct Shared {
    state_tx: watch::Sender<SessionState>,
    volume_tx: watch::Sender<VolumeSample>,
    current: Mutex<CurrentSession>,
    counters: Counters,
}

#[derive(Default)]
struct CurrentSession {
    /// Session whose task may still transition the state machine
    active: Option<SessionHandle>,
    /// Most recent session, running or not (for stats)
    last_handle: Option<SessionHandle>,
    last_error: Option<SessionError>,
}

#[derive(Default)]
struct Counters {
    frames_captured: AtomicU64,
    frames_forwarded: AtomicU64,
    frames_dropped: AtomicU64,
    chunks_received: AtomicU64,
}

impl Counters {
    fn reset(&self) {
        self.frames_captured.store(0, Ordering::Relaxed);
        self.frames_forwarded.store(0, Ordering::Relaxed);
        self.frames_dropped.store(0, Ordering::Relaxed);
        self.chunks_received.store(0, Ordering::Relaxed);
    }
}

impl SessionController {
    pub fn new(
        capture: Arc<dyn AudioCaptureSource>,
        transport: Arc<dyn LiveSessionTransport>,
        config: SessionConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (volume_tx, _) = watch::channel(0.0);
        let (playback_tx, playback_rx) = mpsc::channel(config.playback_buffer_chunks.max(1));

        Self {
            capture,
            transport,
            config,
            shared: Arc::new(Shared {
                state_tx,
                volume_tx,
                current: Mutex::new(CurrentSession::default()),
                counters: Counters::default(),
            }),
            runtime: Mutex::new(None),
            playback_tx,
            playback_rx: Mutex::new(Some(playback_rx)),
        }
    }

    /// Start a session
    ///
    /// Suspends until both resources are acquired (`Active`) or the attempt
    /// has been fully rolled back. Rejected while another session is
    /// starting, active, or still stopping.
    pub async fn start(&self) -> Result<SessionHandle, SessionError> {
        let handle = SessionHandle::new();
        let (ready_tx, ready_rx) = oneshot::channel();

        {
            let mut runtime = self.runtime.lock().unwrap();
            {
                let mut current = self.shared.current.lock().unwrap();
                let state = *self.shared.state_tx.borrow();
                if state != SessionState::Idle {
                    return Err(SessionError::AlreadyRunning(state));
                }
                current.active = Some(handle);
                current.last_handle = Some(handle);
                current.last_error = None;
                self.shared.state_tx.send_replace(SessionState::Starting);
            }
            self.shared.counters.reset();

            let (stop_tx, stop_rx) = watch::channel(false);
            let task = SessionTask {
                capture: Arc::clone(&self.capture),
                transport: Arc::clone(&self.transport),
                shared: Arc::clone(&self.shared),
                handle,
                stop_rx,
                playback_tx: self.playback_tx.clone(),
            };
            let join = tokio::spawn(task.run(ready_tx));
            *runtime = Some(SessionRuntime {
                handle,
                stop_tx,
                join,
            });
        }

        info!("session {} starting", handle.id());

        match ready_rx.await {
            Ok(result) => result.map(|_| handle),
            Err(_) => Err(SessionError::Failed {
                reason: ErrorReason::InternalError,
                message: "session task exited before reporting readiness".to_string(),
            }),
        }
    }

    /// Stop the current session
    ///
    /// No-op when nothing is running. Otherwise suspends until both
    /// resources are released: transport first, capture second. A stop
    /// during `Starting` cancels the start.
    pub async fn stop(&self) {
        let runtime = self.runtime.lock().unwrap().take();
        let Some(runtime) = runtime else {
            return;
        };

        info!("session {} stop requested", runtime.handle.id());
        let _ = runtime.stop_tx.send(true);
        if let Err(e) = runtime.join.await {
            error!("session task panicked: {}", e);
        }
    }

    /// Observe lifecycle transitions
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Latest loudness sample for visualization (latest value wins)
    pub fn volume(&self) -> watch::Receiver<VolumeSample> {
        self.shared.volume_tx.subscribe()
    }

    /// Take the synthesized-audio receiver (single consumer)
    pub fn take_playback(&self) -> Option<mpsc::Receiver<AudioChunk>> {
        self.playback_rx.lock().unwrap().take()
    }

    /// Handle of the session currently holding resources, if any
    pub fn current_session(&self) -> Option<SessionHandle> {
        self.shared.current.lock().unwrap().active
    }

    /// Most recent terminal failure
    pub fn last_error(&self) -> Option<SessionError> {
        self.shared.current.lock().unwrap().last_error.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stats(&self) -> SessionStats {
        let (state, last_handle) = {
            let current = self.shared.current.lock().unwrap();
            (*self.shared.state_tx.borrow(), current.last_handle)
        };
        let started_at = last_handle.map(|h| h.started_at());
        let duration_secs = started_at
            .map(|t| Utc::now().signed_duration_since(t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionStats {
            state,
            session_id: last_handle.map(|h| h.id()),
            started_at,
            duration_secs,
            frames_captured: self.shared.counters.frames_captured.load(Ordering::Relaxed),
            frames_forwarded: self.shared.counters.frames_forwarded.load(Ordering::Relaxed),
            frames_dropped: self.shared.counters.frames_dropped.load(Ordering::Relaxed),
            chunks_received: self.shared.counters.chunks_received.load(Ordering::Relaxed),
        }
    }
}

/// How the pump loop ended
enum SessionEnd {
    UserStop,
    RemoteClose,
    Fault(SessionError),
}

/// Owns both resource handles for the lifetime of one session
struct SessionTask {
    capture: Arc<dyn AudioCaptureSource>,
    transport: Arc<dyn LiveSessionTransport>,
    shared: Arc<Shared>,
    handle: SessionHandle,
    stop_rx: watch::Receiver<bool>,
    playback_tx: mpsc::Sender<AudioChunk>,
}

impl SessionTask {
    async fn run(self, ready_tx: oneshot::Sender<Result<(), SessionError>>) {
        let mut stop_rx = self.stop_rx.clone();

        // Acquire both resources concurrently, racing the stop signal.
        // wait_for also resolves if the controller is dropped; either way
        // the acquisition future is dropped and its handles release.
        let acquired = tokio::select! {
            biased;
            _ = stop_rx.wait_for(|stopped| *stopped) => None,
            results = async { tokio::join!(self.capture.open(), self.transport.connect()) } => {
                Some(results)
            }
        };

        match acquired {
            None => {
                info!("session {} cancelled during startup", self.handle.id());
                self.finish_idle();
                let _ = ready_tx.send(Err(SessionError::Cancelled));
            }
            Some((Ok(capture), Ok(transport))) => {
                self.transition(SessionState::Active);
                info!("session {} active", self.handle.id());
                let _ = ready_tx.send(Ok(()));
                self.pump(capture, transport).await;
            }
            Some((capture_result, transport_result)) => {
                // At least one acquisition failed. Partial success is never
                // exposed: close whatever made it before reporting.
                let mut failure: Option<SessionError> = None;
                match capture_result {
                    Ok(mut capture) => capture.close().await,
                    Err(err) => failure = Some(err.into()),
                }
                match transport_result {
                    Ok(mut transport) => transport.close().await,
                    Err(err) => {
                        if failure.is_none() {
                            failure = Some(err.into());
                        }
                    }
                }
                let err = failure.unwrap_or_else(|| SessionError::Failed {
                    reason: ErrorReason::InternalError,
                    message: "acquisition failed without an error".to_string(),
                });
                warn!("session {} failed to start: {}", self.handle.id(), err);
                self.finish_failed(err.clone());
                let _ = ready_tx.send(Err(err));
            }
        }
    }

    /// Forward frames outward and events inward until something ends the
    /// session, then tear down in order
    async fn pump(&self, mut capture: CaptureHandle, mut transport: TransportHandle) {
        let mut stop_rx = self.stop_rx.clone();

        let outcome = loop {
            tokio::select! {
                biased;
                _ = stop_rx.wait_for(|stopped| *stopped) => break SessionEnd::UserStop,
                maybe_frame = capture.recv() => match maybe_frame {
                    Some(frame) => self.forward_frame(frame, &transport),
                    None => break SessionEnd::Fault(SessionError::Failed {
                        reason: ErrorReason::DeviceUnavailable,
                        message: "capture stream ended unexpectedly".to_string(),
                    }),
                },
                maybe_event = transport.next_event() => match maybe_event {
                    Some(TransportEvent::AudioOut(chunk)) => self.deliver_chunk(chunk),
                    Some(TransportEvent::RemoteClose) => {
                        info!("session {} closed by remote service", self.handle.id());
                        break SessionEnd::RemoteClose;
                    }
                    None => break SessionEnd::Fault(SessionError::Failed {
                        reason: ErrorReason::TransportDropped,
                        message: "voice channel dropped mid-session".to_string(),
                    }),
                },
            }
        };

        match &outcome {
            SessionEnd::UserStop | SessionEnd::RemoteClose => {
                self.transition(SessionState::Stopping);
            }
            SessionEnd::Fault(err) => {
                error!("session {} fault: {}", self.handle.id(), err);
            }
        }

        // Teardown order holds on every path: transport first so nothing
        // is sent into a dead channel while the microphone winds down
        transport.close().await;
        capture.close().await;
        self.shared.volume_tx.send_replace(0.0);

        match outcome {
            SessionEnd::Fault(err) => self.finish_failed(err),
            _ => self.finish_idle(),
        }
    }

    fn forward_frame(&self, frame: AudioFrame, transport: &TransportHandle) {
        self.shared
            .counters
            .frames_captured
            .fetch_add(1, Ordering::Relaxed);
        self.shared.volume_tx.send_replace(meter::measure(&frame));
        transport.send_audio(frame);
        self.shared
            .counters
            .frames_forwarded
            .fetch_add(1, Ordering::Relaxed);
        self.shared
            .counters
            .frames_dropped
            .store(transport.dropped_frames(), Ordering::Relaxed);
    }

    fn deliver_chunk(&self, chunk: AudioChunk) {
        self.shared
            .counters
            .chunks_received
            .fetch_add(1, Ordering::Relaxed);
        // A stalled playback consumer must not stall the pump
        if let Err(e) = self.playback_tx.try_send(chunk) {
            warn!("dropping playback chunk: {}", e);
        }
    }

    /// State changes are guarded by the handle so a finished session can
    /// never clobber its successor
    fn transition(&self, next: SessionState) {
        let current = self.shared.current.lock().unwrap();
        if current.active == Some(self.handle) {
            self.shared.state_tx.send_replace(next);
        }
    }

    /// Final transition for a clean end (or a cancelled start)
    fn finish_idle(&self) {
        let mut current = self.shared.current.lock().unwrap();
        if current.active == Some(self.handle) {
            current.active = None;
            self.shared.state_tx.send_replace(SessionState::Idle);
        }
    }

    /// Final transition for a fault: record it, pass through `Failed`,
    /// rest at `Idle`. Resources are already released when this runs.
    fn finish_failed(&self, err: SessionError) {
        let mut current = self.shared.current.lock().unwrap();
        if current.active != Some(self.handle) {
            return;
        }
        current.active = None;
        if let Some(reason) = err.reason() {
            self.shared.state_tx.send_replace(SessionState::Failed(reason));
        }
        current.last_error = Some(err);
        self.shared.state_tx.send_replace(SessionState::Idle);
    }
}
