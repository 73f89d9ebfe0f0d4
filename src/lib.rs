//! Streaming driver for IIDC-style industrial cameras.
//!
//! The crate runs one capture session per camera on a dedicated worker
//! thread and fans decoded frames out to any number of subscribers:
//!
//! - [`CameraSource`] is the entry point: it owns the configuration, the
//!   live [`CameraControls`], and the session slot. [`CameraSource::subscribe`]
//!   joins the active session or starts one, returning a [`FrameStream`].
//! - The session walks connect → power-up → configure → capture → teardown
//!   ([`SessionState`]), reconciling control changes against the device once
//!   per frame and decoding each frame to mono passthrough or BGR.
//! - Hardware access goes through the [`CameraDevice`] trait; the `mock`
//!   feature (on by default) provides [`MockCamera`] for development and
//!   tests.
//!
//! ```no_run
//! use std::sync::Arc;
//! use iidc_stream::{CameraConfig, CameraSource, MockCamera};
//!
//! # fn main() -> Result<(), iidc_stream::CamError> {
//! let source = CameraSource::new(CameraConfig::default(), Arc::new(MockCamera::new()))?;
//! let mut stream = source.subscribe()?;
//! while let Some(frame) = stream.blocking_next() {
//!     let frame = frame?;
//!     println!("{}x{} {:?}", frame.width, frame.height, frame.format);
//! }
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod connection;
pub mod decoder;
pub mod device;
pub mod error;
pub mod frame;
#[cfg(feature = "mock")]
pub mod mock;
pub mod properties;
pub mod registers;
pub mod session;

pub use capture::SessionState;
pub use config::{CameraConfig, CameraControls};
pub use connection::PowerSequencer;
pub use device::{CameraDevice, DeviceId};
pub use error::{CamError, CamResult};
pub use frame::{
    BayerTile, ColorProcessing, FrameMetadata, OutputFormat, OutputFrame, PixelFormat, RawFrame,
};
#[cfg(feature = "mock")]
pub use mock::MockCamera;
pub use properties::{PropertyKind, PropertyRange, PropertySpec};
pub use session::{CameraSource, FrameStream};
