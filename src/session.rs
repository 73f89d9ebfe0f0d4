//! Session lifecycle and the reference-counted shared stream.
//!
//! A [`CameraSource`] owns one logical camera. The first [`subscribe`]
//! (CameraSource::subscribe) starts a capture session on a dedicated worker
//! thread; further subscribers share that session by reference count; when
//! the last [`FrameStream`] is dropped the session is cancelled and torn
//! down. A later subscribe starts a fresh session from Idle.
//!
//! Only one session may touch the device at a time. The worker holds a
//! session-scoped lock for its whole lifetime, so a new session spawned
//! right after the previous one was cancelled waits until the old worker has
//! powered the device down and disconnected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use crate::capture::{run_session, SessionState, SessionStateCell};
use crate::config::{CameraConfig, CameraControls};
use crate::connection::PowerSequencer;
use crate::device::CameraDevice;
use crate::error::{CamError, CamResult};
use crate::frame::OutputFrame;

/// Frames buffered per subscriber before the oldest is dropped. The core
/// keeps a single frame in flight; this only smooths scheduling jitter
/// between the worker and its consumers.
const FRAME_CHANNEL_CAPACITY: usize = 4;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ActiveSession {
    generation: u64,
    sender: broadcast::Sender<Arc<OutputFrame>>,
    capturing: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<String>>>,
    subscribers: usize,
}

#[derive(Default)]
struct Slot {
    active: Option<ActiveSession>,
    next_generation: u64,
}

struct SourceShared {
    config: CameraConfig,
    controls: CameraControls,
    device: Arc<dyn CameraDevice>,
    sequencer: PowerSequencer,
    /// Held by the worker for the whole session lifetime; serializes
    /// back-to-back sessions on the same device.
    session_gate: Mutex<()>,
    slot: Mutex<Slot>,
    state: SessionStateCell,
}

/// One logical camera, shareable among any number of subscribers.
#[derive(Clone)]
pub struct CameraSource {
    shared: Arc<SourceShared>,
}

impl CameraSource {
    /// Creates a source over the given device backend.
    ///
    /// # Errors
    ///
    /// Returns [`CamError::Config`] when the configuration is invalid.
    pub fn new(config: CameraConfig, device: Arc<dyn CameraDevice>) -> CamResult<Self> {
        config.validate()?;
        let controls = CameraControls::from_config(&config);
        let sequencer = PowerSequencer::new(std::time::Duration::from_millis(
            config.power_poll_interval_ms,
        ));
        Ok(Self {
            shared: Arc::new(SourceShared {
                config,
                controls,
                device,
                sequencer,
                session_gate: Mutex::new(()),
                slot: Mutex::new(Slot::default()),
                state: SessionStateCell::new(),
            }),
        })
    }

    /// The live control surface. Values may be changed at any time; the
    /// capture loop observes them once per produced frame.
    #[must_use]
    pub fn controls(&self) -> &CameraControls {
        &self.shared.controls
    }

    /// Current lifecycle state of the active session, or the state the last
    /// session ended in.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state.get()
    }

    /// Attaches to the shared frame stream, starting a capture session if
    /// none is active.
    ///
    /// # Errors
    ///
    /// Returns [`CamError::Session`] when the worker thread cannot be
    /// spawned. Connect-time device failures are not reported here; they
    /// surface through the returned stream.
    pub fn subscribe(&self) -> CamResult<FrameStream> {
        let mut slot = lock(&self.shared.slot);

        if let Some(active) = slot.active.as_mut() {
            active.subscribers += 1;
            tracing::debug!(subscribers = active.subscribers, "joining active session");
            return Ok(FrameStream {
                rx: active.sender.subscribe(),
                failure: active.failure.clone(),
                shared: self.shared.clone(),
                generation: active.generation,
                ended: false,
            });
        }

        let generation = slot.next_generation;
        slot.next_generation += 1;

        let (sender, rx) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        let capturing = Arc::new(AtomicBool::new(false));
        let failure = Arc::new(Mutex::new(None));

        self.spawn_worker(generation, sender.clone(), capturing.clone(), failure.clone())?;

        tracing::info!(generation, "started capture session");
        slot.active = Some(ActiveSession {
            generation,
            sender,
            capturing,
            failure: failure.clone(),
            subscribers: 1,
        });

        Ok(FrameStream {
            rx,
            failure,
            shared: self.shared.clone(),
            generation,
            ended: false,
        })
    }

    fn spawn_worker(
        &self,
        generation: u64,
        sender: broadcast::Sender<Arc<OutputFrame>>,
        capturing: Arc<AtomicBool>,
        failure: Arc<Mutex<Option<String>>>,
    ) -> CamResult<()> {
        let shared = self.shared.clone();
        std::thread::Builder::new()
            .name(format!("iidc-cam-{}", self.shared.config.index))
            .spawn(move || {
                // Blocks here until any previous session has finished its
                // teardown, then owns the device for this session.
                let _session = lock(&shared.session_gate);

                let mut emit = |frame: OutputFrame| sender.send(Arc::new(frame)).is_ok();
                let result = run_session(
                    shared.device.as_ref(),
                    &shared.config,
                    &shared.controls,
                    &shared.sequencer,
                    &capturing,
                    &shared.state,
                    &mut emit,
                );
                if let Err(err) = result {
                    *lock(&failure) = Some(err.to_string());
                }

                // Drop this session from the slot so late subscribers start
                // a fresh one instead of joining a corpse.
                let mut slot = lock(&shared.slot);
                if slot
                    .active
                    .as_ref()
                    .is_some_and(|active| active.generation == generation)
                {
                    slot.active = None;
                }
            })
            .map_err(|err| CamError::Session(format!("failed to spawn capture worker: {err}")))?;
        Ok(())
    }
}

fn unsubscribe(shared: &Arc<SourceShared>, generation: u64) {
    let mut slot = lock(&shared.slot);
    let Some(active) = slot.active.as_mut() else {
        return;
    };
    if active.generation != generation {
        return;
    }
    active.subscribers -= 1;
    if active.subscribers > 0 {
        tracing::debug!(subscribers = active.subscribers, "subscriber detached");
        return;
    }

    tracing::info!(generation, "last subscriber detached, cancelling session");
    // Cancellation protocol: clear the flag first, then stop the device so
    // the worker's blocking retrieval fails and is treated as a clean stop.
    if active.capturing.swap(false, Ordering::SeqCst) {
        if let Err(err) = shared.device.stop_capture() {
            tracing::warn!(%err, "stop-capture during cancellation failed");
        }
    }
    slot.active = None;
}

/// A subscriber's handle on the shared frame stream.
///
/// Dropping the stream detaches the subscriber; dropping the last one
/// cancels the underlying session.
pub struct FrameStream {
    rx: broadcast::Receiver<Arc<OutputFrame>>,
    failure: Arc<Mutex<Option<String>>>,
    shared: Arc<SourceShared>,
    generation: u64,
    ended: bool,
}

impl FrameStream {
    /// Blocks the calling thread until the next frame.
    ///
    /// `None` marks the clean end of the stream (cancellation); a final
    /// `Some(Err(..))` reports a fatal session failure, after which the
    /// stream yields `None`. Must not be called from an async context.
    pub fn blocking_next(&mut self) -> Option<CamResult<Arc<OutputFrame>>> {
        if self.ended {
            return None;
        }
        loop {
            match self.rx.blocking_recv() {
                Ok(frame) => return Some(Ok(frame)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagging, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return self.finish(),
            }
        }
    }

    /// Awaits the next frame; semantics match [`blocking_next`]
    /// (Self::blocking_next).
    pub async fn next(&mut self) -> Option<CamResult<Arc<OutputFrame>>> {
        if self.ended {
            return None;
        }
        loop {
            match self.rx.recv().await {
                Ok(frame) => return Some(Ok(frame)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagging, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return self.finish(),
            }
        }
    }

    fn finish(&mut self) -> Option<CamResult<Arc<OutputFrame>>> {
        self.ended = true;
        // The failure slot is shared by every subscriber of the session, so
        // read it without consuming; `ended` keeps the report to once per
        // stream.
        lock(&self.failure)
            .clone()
            .map(|message| Err(CamError::Session(message)))
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        unsubscribe(&self.shared, self.generation);
    }
}
