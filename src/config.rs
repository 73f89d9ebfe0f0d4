//! Static configuration and the live control surface.
//!
//! [`CameraConfig`] is the serde-backed configuration read once when a source
//! is created: bus index, one-time register setup, and the initial values of
//! the adjustable controls. [`CameraControls`] is the mutable surface those
//! initial values seed: callers may change exposure-related values at any
//! time while a stream is running, and the capture loop observes them once
//! per produced frame.
//!
//! The controls are plain atomics read without locking by the worker.
//! Multi-field updates may therefore be observed torn across one frame
//! period; staleness is bounded to a single frame.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use serde::Deserialize;

use crate::error::{CamError, CamResult};
use crate::frame::ColorProcessing;

fn default_frame_rate() -> f64 {
    30.0
}

fn default_normalized() -> f64 {
    0.5
}

fn default_power_poll_interval_ms() -> u64 {
    100
}

fn default_color_processing() -> ColorProcessing {
    ColorProcessing::Default
}

/// Configuration for one camera source.
///
/// All fields have defaults, so a partial JSON/TOML document deserializes
/// cleanly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Bus index of the camera to open.
    pub index: u32,

    /// Initial frame rate in Hz, pushed once at session start as an
    /// absolute-control, auto-disabled property. Valid range `[0, 1000]`.
    #[serde(rename = "frame_rate")]
    pub frame_rate_hz: f64,

    /// Initial normalized shutter value in `[0, 1]`.
    pub shutter: f64,

    /// Initial normalized gain value in `[0, 1]`.
    pub gain: f64,

    /// Whether the device's auto-exposure loop starts enabled.
    pub auto_exposure: bool,

    /// Demosaicing algorithm for Bayer-mosaiced frames.
    pub color_processing: ColorProcessing,

    /// Drive the auxiliary output voltage pin high at session start.
    pub aux_voltage: bool,

    /// Embed the capture timestamp into pixel data.
    pub embed_timestamp: bool,

    /// Embed a frame counter into pixel data.
    pub embed_frame_counter: bool,

    /// Declared for compatibility with the device's option surface; the
    /// capture path does not currently consult it.
    pub ignore_image_consistency_error: bool,

    /// Interval between reads of the power register while waiting for the
    /// power-on handshake to complete.
    pub power_poll_interval_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            frame_rate_hz: default_frame_rate(),
            shutter: default_normalized(),
            gain: default_normalized(),
            auto_exposure: false,
            color_processing: default_color_processing(),
            aux_voltage: false,
            embed_timestamp: false,
            embed_frame_counter: false,
            ignore_image_consistency_error: false,
            power_poll_interval_ms: default_power_poll_interval_ms(),
        }
    }
}

impl CameraConfig {
    /// Checks semantic validity of the configured values.
    ///
    /// # Errors
    ///
    /// Returns [`CamError::Config`] naming the offending field.
    pub fn validate(&self) -> CamResult<()> {
        if !(0.0..=1000.0).contains(&self.frame_rate_hz) {
            return Err(CamError::Config(format!(
                "frame_rate {} outside [0, 1000] Hz",
                self.frame_rate_hz
            )));
        }
        if !(0.0..=1.0).contains(&self.shutter) {
            return Err(CamError::Config(format!(
                "shutter {} outside [0, 1]",
                self.shutter
            )));
        }
        if !(0.0..=1.0).contains(&self.gain) {
            return Err(CamError::Config(format!("gain {} outside [0, 1]", self.gain)));
        }
        if self.power_poll_interval_ms == 0 {
            return Err(CamError::Config(
                "power_poll_interval_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// The values the capture loop re-reads on every iteration, plus the frame
/// rate, which is applied once when a session starts.
///
/// Setters clamp to the documented ranges so a live adjustment can never push
/// an out-of-range value at the hardware.
#[derive(Debug)]
pub struct CameraControls {
    auto_exposure: AtomicBool,
    shutter_bits: AtomicU64,
    gain_bits: AtomicU64,
    frame_rate_bits: AtomicU64,
    color_processing: AtomicU8,
}

impl CameraControls {
    pub(crate) fn from_config(config: &CameraConfig) -> Self {
        Self {
            auto_exposure: AtomicBool::new(config.auto_exposure),
            shutter_bits: AtomicU64::new(config.shutter.to_bits()),
            gain_bits: AtomicU64::new(config.gain.to_bits()),
            frame_rate_bits: AtomicU64::new(config.frame_rate_hz.to_bits()),
            color_processing: AtomicU8::new(config.color_processing.as_u8()),
        }
    }

    /// Enables or disables the device auto-exposure loop.
    pub fn set_auto_exposure(&self, enabled: bool) {
        self.auto_exposure.store(enabled, Ordering::Relaxed);
    }

    /// Current auto-exposure selection.
    #[must_use]
    pub fn auto_exposure(&self) -> bool {
        self.auto_exposure.load(Ordering::Relaxed)
    }

    /// Sets the normalized shutter value, clamped to `[0, 1]`. Takes effect
    /// on the next frame when auto-exposure is off.
    pub fn set_shutter(&self, normalized: f64) {
        self.shutter_bits
            .store(normalized.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Current normalized shutter value.
    #[must_use]
    pub fn shutter(&self) -> f64 {
        f64::from_bits(self.shutter_bits.load(Ordering::Relaxed))
    }

    /// Sets the normalized gain value, clamped to `[0, 1]`. Takes effect on
    /// the next frame when auto-exposure is off.
    pub fn set_gain(&self, normalized: f64) {
        self.gain_bits
            .store(normalized.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Current normalized gain value.
    #[must_use]
    pub fn gain(&self) -> f64 {
        f64::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    /// Sets the frame rate in Hz, clamped to `[0, 1000]`. Applied when the
    /// next session starts; a running session keeps its rate.
    pub fn set_frame_rate_hz(&self, hz: f64) {
        self.frame_rate_bits
            .store(hz.clamp(0.0, 1000.0).to_bits(), Ordering::Relaxed);
    }

    /// Current frame rate selection in Hz.
    #[must_use]
    pub fn frame_rate_hz(&self) -> f64 {
        f64::from_bits(self.frame_rate_bits.load(Ordering::Relaxed))
    }

    /// Selects the demosaicing algorithm. Takes effect on the next frame.
    pub fn set_color_processing(&self, algorithm: ColorProcessing) {
        self.color_processing
            .store(algorithm.as_u8(), Ordering::Relaxed);
    }

    /// Current demosaicing selection.
    #[must_use]
    pub fn color_processing(&self) -> ColorProcessing {
        ColorProcessing::from_u8(self.color_processing.load(Ordering::Relaxed))
    }

    /// One coherent read of the per-iteration values.
    pub(crate) fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            auto_exposure: self.auto_exposure(),
            shutter: self.shutter(),
            gain: self.gain(),
            color_processing: self.color_processing(),
        }
    }
}

/// The desired configuration as observed at the top of one loop iteration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ControlSnapshot {
    pub auto_exposure: bool,
    pub shutter: f64,
    pub gain: f64,
    pub color_processing: ColorProcessing,
}
