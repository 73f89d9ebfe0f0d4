//! The acquisition state machine.
//!
//! One session walks Idle → Connecting → PoweringUp → Configuring →
//! Capturing → Stopping → Disconnected. A device that reaches Capturing is
//! guaranteed to be powered off and disconnected by exactly one teardown
//! sequence, no matter how the loop exits: clean cancellation, loss of all
//! receivers, or a fatal device error.
//!
//! Cancellation is cooperative. The cancelling side clears the shared
//! capturing flag and stops the device, which makes the in-flight blocking
//! retrieval fail; the loop treats a retrieval error with the flag already
//! cleared as a clean stop and anything else as fatal.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::config::{CameraConfig, CameraControls};
use crate::connection::{self, PowerSequencer};
use crate::decoder::decode;
use crate::device::CameraDevice;
use crate::error::CamResult;
use crate::frame::OutputFrame;
use crate::properties::{reconcile, PropertyKind, PropertySpec, ShadowState};
use crate::registers::{aux_output_value, frame_info_value, REG_AUX_OUTPUT, REG_FRAME_INFO};

/// Lifecycle phase of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session exists.
    Idle,
    /// Resolving and opening the device.
    Connecting,
    /// Waiting for the power-on handshake.
    PoweringUp,
    /// One-time property and register setup.
    Configuring,
    /// Streaming frames.
    Capturing,
    /// Teardown in progress.
    Stopping,
    /// Session over; device powered off and closed.
    Disconnected,
}

impl SessionState {
    fn as_u8(self) -> u8 {
        match self {
            SessionState::Idle => 0,
            SessionState::Connecting => 1,
            SessionState::PoweringUp => 2,
            SessionState::Configuring => 3,
            SessionState::Capturing => 4,
            SessionState::Stopping => 5,
            SessionState::Disconnected => 6,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Connecting,
            2 => SessionState::PoweringUp,
            3 => SessionState::Configuring,
            4 => SessionState::Capturing,
            5 => SessionState::Stopping,
            6 => SessionState::Disconnected,
            _ => SessionState::Idle,
        }
    }
}

/// Lock-free cell publishing the current [`SessionState`] to observers.
#[derive(Debug)]
pub(crate) struct SessionStateCell(AtomicU8);

impl SessionStateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(SessionState::Idle.as_u8()))
    }

    pub(crate) fn set(&self, state: SessionState) {
        tracing::debug!(?state, "session state");
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }

    pub(crate) fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// Runs one complete capture session on the calling thread.
///
/// Blocks until the session ends. `emit` hands each decoded frame to the
/// downstream sink and returns false when no receiver is left, which stops
/// the loop cleanly. The `capturing` flag is shared with the cancellation
/// path; see the module docs for the protocol.
pub(crate) fn run_session(
    device: &dyn CameraDevice,
    config: &CameraConfig,
    controls: &CameraControls,
    sequencer: &PowerSequencer,
    capturing: &AtomicBool,
    state: &SessionStateCell,
    emit: &mut dyn FnMut(OutputFrame) -> bool,
) -> CamResult<()> {
    state.set(SessionState::Connecting);
    connection::open(device, config.index)?;

    // From here the handle is open: whatever happens next, teardown runs.
    let result: CamResult<()> = (|| {
        state.set(SessionState::PoweringUp);
        sequencer.power_on(device)?;

        state.set(SessionState::Configuring);
        configure(device, config, controls)?;
        device.start_capture()?;
        capturing.store(true, Ordering::SeqCst);

        state.set(SessionState::Capturing);
        capture_loop(device, controls, capturing, emit)
    })();

    state.set(SessionState::Stopping);
    teardown(device, capturing, sequencer);
    state.set(SessionState::Disconnected);

    if let Err(err) = &result {
        tracing::error!(%err, "capture session failed");
    } else {
        tracing::info!("capture session ended");
    }
    result
}

/// One-time session setup: frame rate, embedded-info bits, auxiliary pin.
///
/// These are applied before capture starts and are not reconciled per frame.
fn configure(
    device: &dyn CameraDevice,
    config: &CameraConfig,
    controls: &CameraControls,
) -> CamResult<()> {
    let frame_rate = controls.frame_rate_hz();
    tracing::info!(frame_rate, "configuring session");
    device.push_property(&PropertySpec::manual_absolute(
        PropertyKind::FrameRate,
        frame_rate,
    ))?;

    let current = device.read_register(REG_FRAME_INFO)?;
    device.write_register(
        REG_FRAME_INFO,
        frame_info_value(current, config.embed_timestamp, config.embed_frame_counter),
    )?;

    device.write_register(REG_AUX_OUTPUT, aux_output_value(config.aux_voltage))?;
    Ok(())
}

fn capture_loop(
    device: &dyn CameraDevice,
    controls: &CameraControls,
    capturing: &AtomicBool,
    emit: &mut dyn FnMut(OutputFrame) -> bool,
) -> CamResult<()> {
    let mut shadow = ShadowState::default();
    let mut emitted: u64 = 0;

    loop {
        let desired = controls.snapshot();
        reconcile(device, &desired, &mut shadow)?;

        let frame =
            match device.retrieve_frame(&mut |raw| decode(device, raw, desired.color_processing)) {
                Ok(frame) => frame,
                Err(err) if !capturing.load(Ordering::SeqCst) => {
                    // The retrieval failed because cancellation already
                    // stopped the capture: a clean end of stream.
                    tracing::debug!(%err, emitted, "retrieval aborted by cancellation");
                    break;
                }
                Err(err) => return Err(err),
            };

        emitted += 1;
        tracing::trace!(emitted, "frame decoded");

        if !emit(frame) {
            tracing::debug!(emitted, "all receivers gone, stopping");
            break;
        }
        if !capturing.load(Ordering::SeqCst) {
            tracing::debug!(emitted, "cancellation observed");
            break;
        }
    }
    Ok(())
}

/// Unconditional cleanup: power off, stop capture if nothing stopped it yet,
/// disconnect. Failures here are logged, never propagated, so that every
/// exit path leaves the device in the same state.
fn teardown(device: &dyn CameraDevice, capturing: &AtomicBool, sequencer: &PowerSequencer) {
    if let Err(err) = sequencer.power_off(device) {
        tracing::warn!(%err, "power-off write failed during teardown");
    }
    if capturing.swap(false, Ordering::SeqCst) {
        if let Err(err) = device.stop_capture() {
            tracing::warn!(%err, "stop-capture failed during teardown");
        }
    }
    if let Err(err) = device.disconnect() {
        tracing::warn!(%err, "disconnect failed during teardown");
    }
}
