//! Error types for the camera streaming driver.
//!
//! `CamError` is the single error enum for the crate, built with `thiserror`.
//! The variants follow the failure taxonomy of the acquisition state machine:
//!
//! - **`DeviceNotFound` / `Bus`**: connect-time failures, fatal to the session.
//! - **`Retrieval`**: raised by a blocking frame fetch. Benign exactly when it
//!   occurs after cancellation has already stopped the capture; fatal
//!   otherwise. The capture loop makes that distinction, not this type.
//! - **`Register` / `Property` / `Conversion`**: device-call failures that are
//!   never locally recovered; they propagate and terminate the session.
//! - **`Config`**: semantic configuration errors caught by validation before
//!   a session starts.
//! - **`Session`**: the terminal failure of a shared stream as seen by a
//!   subscriber.

use thiserror::Error;

use crate::properties::PropertyKind;
use crate::registers::RegisterAddress;

/// Convenience alias for results using the crate error type.
pub type CamResult<T> = std::result::Result<T, CamError>;

/// Errors produced by the camera bus, the device, or the session machinery.
#[derive(Error, Debug)]
pub enum CamError {
    /// No camera answered at the requested bus index.
    #[error("no camera at bus index {0}")]
    DeviceNotFound(u32),

    /// The bus failed while enumerating or talking to the device.
    #[error("bus error: {0}")]
    Bus(String),

    /// An operation required an open connection and there was none.
    #[error("device is not connected")]
    NotConnected,

    /// A control-register access was rejected by the device.
    #[error("register {addr:#x} access failed: {reason}")]
    Register {
        /// Address of the register that failed.
        addr: RegisterAddress,
        /// Device-reported reason.
        reason: String,
    },

    /// The device rejected a property push or range query.
    #[error("property {kind:?} rejected by device: {reason}")]
    Property {
        /// The property involved.
        kind: PropertyKind,
        /// Device-reported reason.
        reason: String,
    },

    /// A blocking frame retrieval failed.
    #[error("frame retrieval failed: {0}")]
    Retrieval(String),

    /// The device color-conversion routine failed.
    #[error("color conversion failed: {0}")]
    Conversion(String),

    /// The configuration is semantically invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A capture session terminated with a fatal error.
    #[error("capture session failed: {0}")]
    Session(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_error_formats_address_as_hex() {
        let err = CamError::Register {
            addr: 0x610,
            reason: "bus timeout".into(),
        };
        assert_eq!(err.to_string(), "register 0x610 access failed: bus timeout");

        let err = CamError::Register {
            addr: 0x19D0,
            reason: "write rejected".into(),
        };
        assert_eq!(
            err.to_string(),
            "register 0x19d0 access failed: write rejected"
        );
    }

    #[test]
    fn device_not_found_names_index() {
        assert_eq!(
            CamError::DeviceNotFound(2).to_string(),
            "no camera at bus index 2"
        );
    }
}
