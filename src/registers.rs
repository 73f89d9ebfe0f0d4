//! IIDC control-register map and bit helpers.
//!
//! Pure protocol knowledge: addresses, magic values, and the bit layout of
//! the registers this driver touches. No device state lives here; the
//! [`CameraDevice`](crate::device::CameraDevice) trait performs the actual
//! reads and writes.

/// Address of a 32-bit device control register.
pub type RegisterAddress = u32;

/// Value read from or written to a control register.
pub type RegisterValue = u32;

/// Camera power control register.
pub const REG_CAMERA_POWER: RegisterAddress = 0x610;

/// Power-on command: bit 31 set.
pub const CAMERA_POWER_ON: RegisterValue = 0x8000_0000;

/// Power-off command.
pub const CAMERA_POWER_OFF: RegisterValue = 0x0000_0000;

/// Auxiliary output pin (pull-up) register.
pub const REG_AUX_OUTPUT: RegisterAddress = 0x19D0;

/// Enables the auxiliary output voltage.
pub const AUX_OUTPUT_ENABLE: RegisterValue = 0x1000_0001;

/// Disables the auxiliary output voltage.
pub const AUX_OUTPUT_DISABLE: RegisterValue = 0x1000_0000;

/// Embedded frame-info register: selects metadata the device encodes into
/// pixel data at capture time.
pub const REG_FRAME_INFO: RegisterAddress = 0x12F8;

/// Frame-info bit 0: embed a capture timestamp.
pub const FRAME_INFO_TIMESTAMP: RegisterValue = 1 << 0;

/// Frame-info bit 6: embed a frame counter.
pub const FRAME_INFO_FRAME_COUNTER: RegisterValue = 1 << 6;

/// Whether a value read from [`REG_CAMERA_POWER`] reports the camera powered.
#[must_use]
pub fn power_bit_set(value: RegisterValue) -> bool {
    value & CAMERA_POWER_ON != 0
}

/// The value to write to [`REG_AUX_OUTPUT`] for the requested pin state.
#[must_use]
pub fn aux_output_value(enable: bool) -> RegisterValue {
    if enable {
        AUX_OUTPUT_ENABLE
    } else {
        AUX_OUTPUT_DISABLE
    }
}

/// Merges the timestamp and frame-counter selections into a previously read
/// frame-info value, preserving all other bits (read-modify-write).
#[must_use]
pub fn frame_info_value(current: RegisterValue, timestamp: bool, frame_counter: bool) -> RegisterValue {
    let mut value = current & !(FRAME_INFO_TIMESTAMP | FRAME_INFO_FRAME_COUNTER);
    if timestamp {
        value |= FRAME_INFO_TIMESTAMP;
    }
    if frame_counter {
        value |= FRAME_INFO_FRAME_COUNTER;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_bit() {
        assert!(power_bit_set(CAMERA_POWER_ON));
        assert!(power_bit_set(0x8000_0001));
        assert!(!power_bit_set(CAMERA_POWER_OFF));
        assert!(!power_bit_set(0x7FFF_FFFF));
    }

    #[test]
    fn aux_output_values() {
        assert_eq!(aux_output_value(true), 0x1000_0001);
        assert_eq!(aux_output_value(false), 0x1000_0000);
    }

    #[test]
    fn frame_info_sets_selected_bits() {
        assert_eq!(frame_info_value(0, true, false), 0x01);
        assert_eq!(frame_info_value(0, false, true), 0x40);
        assert_eq!(frame_info_value(0, true, true), 0x41);
    }

    #[test]
    fn frame_info_preserves_unrelated_bits() {
        // Bits 1 and 8 belong to other embedding options; they must survive.
        let current = 0x0000_0102 | FRAME_INFO_TIMESTAMP;
        let updated = frame_info_value(current, false, true);
        assert_eq!(updated, 0x0000_0102 | FRAME_INFO_FRAME_COUNTER);
    }
}
