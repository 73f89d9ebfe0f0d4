//! Property controller: normalized user values to device absolute units.
//!
//! The caller-facing shutter and gain values live in `[0, 1]`; the device
//! wants absolute units (milliseconds, dB). [`reconcile`] runs once per loop
//! iteration, compares the desired values against the last-applied
//! [`ShadowState`], and pushes a property to hardware only when something
//! actually changed. Polling once per produced frame bounds the staleness of
//! applied settings to one frame period without putting a lock in the hot
//! loop.

use crate::config::ControlSnapshot;
use crate::device::CameraDevice;
use crate::error::CamResult;
use crate::frame::ColorProcessing;

/// Device property selected by a [`PropertySpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Frames per second.
    FrameRate,
    /// Integration time.
    Shutter,
    /// Analog gain.
    Gain,
    /// The device's own exposure control loop.
    AutoExposure,
}

/// One property write, constructed fresh per push.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySpec {
    /// Which property to write.
    pub kind: PropertyKind,
    /// Absolute (physical-unit) control rather than normalized/indexed.
    pub absolute: bool,
    /// Device adjusts the property continuously when true; `value` is
    /// ignored by the hardware in that case.
    pub auto: bool,
    /// The property is switched on.
    pub enabled: bool,
    /// Absolute value to apply when `auto` is false.
    pub value: f64,
}

impl PropertySpec {
    /// Manual absolute-control write of `value`.
    #[must_use]
    pub fn manual_absolute(kind: PropertyKind, value: f64) -> Self {
        Self {
            kind,
            absolute: true,
            auto: false,
            enabled: true,
            value,
        }
    }

    /// Hand the property over to the device's automatic control.
    #[must_use]
    pub fn automatic(kind: PropertyKind) -> Self {
        Self {
            kind,
            absolute: true,
            auto: true,
            enabled: true,
            value: 0.0,
        }
    }

    /// The auto-exposure master switch.
    #[must_use]
    pub fn auto_exposure_on() -> Self {
        Self {
            kind: PropertyKind::AutoExposure,
            absolute: false,
            auto: true,
            enabled: true,
            value: 0.0,
        }
    }
}

/// Absolute range of a property, queried from hardware per push.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyRange {
    /// Smallest absolute value the device accepts.
    pub abs_min: f64,
    /// Largest absolute value the device accepts.
    pub abs_max: f64,
}

impl PropertyRange {
    /// Maps a normalized `[0, 1]` value into this range.
    #[must_use]
    pub fn absolute(&self, normalized: f64) -> f64 {
        normalized * (self.abs_max - self.abs_min) + self.abs_min
    }
}

/// Last-applied snapshot used to detect user-driven changes between
/// iterations.
///
/// Starts fully unset, which guarantees the first iteration always applies
/// the exposure state.
#[derive(Debug, Default)]
pub(crate) struct ShadowState {
    auto_exposure: Option<bool>,
    shutter: Option<f64>,
    gain: Option<f64>,
    color_processing: Option<ColorProcessing>,
}

/// Pushes whatever changed since the previous iteration to the device and
/// updates the shadow.
///
/// On an auto-exposure edge the shutter and gain trackers are invalidated in
/// both directions: turning auto on hands both properties to the device's
/// control loop, and the unset trackers force a fresh manual push on the next
/// transition back to manual.
pub(crate) fn reconcile(
    device: &dyn CameraDevice,
    desired: &ControlSnapshot,
    shadow: &mut ShadowState,
) -> CamResult<()> {
    if shadow.auto_exposure != Some(desired.auto_exposure) {
        if desired.auto_exposure {
            tracing::debug!("auto-exposure enabled, handing shutter and gain to device");
            device.push_property(&PropertySpec::auto_exposure_on())?;
            device.push_property(&PropertySpec::automatic(PropertyKind::Shutter))?;
            device.push_property(&PropertySpec::automatic(PropertyKind::Gain))?;
        } else if shadow.auto_exposure.is_some() {
            tracing::debug!("auto-exposure disabled, resuming manual control");
        }
        shadow.shutter = None;
        shadow.gain = None;
        shadow.auto_exposure = Some(desired.auto_exposure);
    }

    if !desired.auto_exposure {
        if shadow.shutter != Some(desired.shutter) {
            push_manual(device, PropertyKind::Shutter, desired.shutter)?;
            shadow.shutter = Some(desired.shutter);
        }
        if shadow.gain != Some(desired.gain) {
            push_manual(device, PropertyKind::Gain, desired.gain)?;
            shadow.gain = Some(desired.gain);
        }
    }

    if shadow.color_processing != Some(desired.color_processing) {
        if shadow.color_processing.is_some() {
            tracing::debug!(algorithm = ?desired.color_processing, "color processing changed");
        }
        shadow.color_processing = Some(desired.color_processing);
    }

    Ok(())
}

fn push_manual(device: &dyn CameraDevice, kind: PropertyKind, normalized: f64) -> CamResult<()> {
    let range = device.property_range(kind)?;
    let value = range.absolute(normalized);
    tracing::debug!(?kind, normalized, value, "pushing manual property");
    device.push_property(&PropertySpec::manual_absolute(kind, value))
}
