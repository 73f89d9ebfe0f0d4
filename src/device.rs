//! The blocking hardware seam.
//!
//! [`CameraDevice`] is the single trait a backend implements: bus
//! enumeration, register access, property control, and frame retrieval. All
//! methods block the calling thread the way the underlying SDK calls do; the
//! capture worker is a dedicated thread for exactly that reason.
//!
//! Implementations use interior mutability (`&self` methods) because the
//! cancellation path must be able to issue `stop_capture` from another thread
//! while the worker is parked inside `retrieve_frame`.

use crate::error::CamResult;
use crate::frame::{ColorProcessing, OutputFrame, RawFrame};
use crate::properties::{PropertyKind, PropertyRange, PropertySpec};
use crate::registers::{RegisterAddress, RegisterValue};

/// Opaque identity of a camera resolved from a bus index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId(pub u64);

/// Callback receiving the borrowed view of one retrieved frame.
///
/// The view is valid only for the duration of the call; whatever the
/// callback wants to keep must be copied into the returned [`OutputFrame`].
pub type FrameConsumer<'a> = &'a mut dyn FnMut(&RawFrame<'_>) -> CamResult<OutputFrame>;

/// Blocking interface to one camera and the bus it sits on.
pub trait CameraDevice: Send + Sync {
    /// Resolves a bus index to a device identity.
    ///
    /// # Errors
    ///
    /// [`CamError::DeviceNotFound`](crate::CamError::DeviceNotFound) when no
    /// device answers at `index`, [`CamError::Bus`](crate::CamError::Bus) on
    /// enumeration failure.
    fn resolve(&self, index: u32) -> CamResult<DeviceId>;

    /// Opens a connection to the resolved device. The handle is exclusively
    /// owned by the active session until [`disconnect`](Self::disconnect).
    fn connect(&self, id: DeviceId) -> CamResult<()>;

    /// Closes the connection. Called exactly once on every session exit path.
    fn disconnect(&self) -> CamResult<()>;

    /// Reads a 32-bit control register.
    fn read_register(&self, addr: RegisterAddress) -> CamResult<RegisterValue>;

    /// Writes a 32-bit control register.
    fn write_register(&self, addr: RegisterAddress, value: RegisterValue) -> CamResult<()>;

    /// Queries the absolute range of a property.
    fn property_range(&self, kind: PropertyKind) -> CamResult<PropertyRange>;

    /// Applies one property write.
    fn push_property(&self, spec: &PropertySpec) -> CamResult<()>;

    /// Starts frame delivery.
    fn start_capture(&self) -> CamResult<()>;

    /// Stops frame delivery. Safe to call from a thread other than the
    /// capture worker, and idempotent: stopping an already stopped capture
    /// is not an error. Causes an in-flight [`retrieve_frame`]
    /// (Self::retrieve_frame) to fail.
    fn stop_capture(&self) -> CamResult<()>;

    /// Blocks until the device delivers a frame, then hands a borrowed view
    /// of it to `consume` and returns whatever `consume` produced.
    ///
    /// # Errors
    ///
    /// [`CamError::Retrieval`](crate::CamError::Retrieval) when the fetch
    /// fails, including when capture was stopped out from under it.
    fn retrieve_frame(&self, consume: FrameConsumer<'_>) -> CamResult<OutputFrame>;

    /// Runs the device's native color conversion of `raw` into `dst`, which
    /// must be `width * height * 3` bytes of BGR output.
    fn convert_frame(
        &self,
        raw: &RawFrame<'_>,
        algorithm: ColorProcessing,
        dst: &mut [u8],
    ) -> CamResult<()>;
}
