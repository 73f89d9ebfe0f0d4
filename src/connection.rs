//! Connection manager: power sequencing and teardown.
//!
//! The power-on handshake writes the power-on value and then polls the same
//! register at a fixed interval until the power bit reads back set. There is
//! deliberately no timeout: an absent or unresponsive device blocks the
//! worker indefinitely. That is a documented limitation of the handshake,
//! kept behind [`PowerSequencer`] so a bounded variant can replace it without
//! touching the rest of the state machine.

use std::time::Duration;

use crate::device::CameraDevice;
use crate::error::CamResult;
use crate::registers::{
    power_bit_set, CAMERA_POWER_OFF, CAMERA_POWER_ON, REG_CAMERA_POWER,
};

/// Performs the power-on handshake and the power-off write.
#[derive(Debug, Clone)]
pub struct PowerSequencer {
    poll_interval: Duration,
}

impl PowerSequencer {
    /// Default interval between polls of the power register.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// A sequencer polling at the given interval.
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Writes the power-on value, then polls until the power bit is set.
    ///
    /// Blocks without bound while the bit stays clear; returns early only if
    /// a register access itself fails.
    pub fn power_on(&self, device: &dyn CameraDevice) -> CamResult<()> {
        device.write_register(REG_CAMERA_POWER, CAMERA_POWER_ON)?;
        let mut polls: u32 = 0;
        loop {
            let value = device.read_register(REG_CAMERA_POWER)?;
            if power_bit_set(value) {
                tracing::debug!(polls, "camera reports powered up");
                return Ok(());
            }
            polls += 1;
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Writes the power-off value.
    pub fn power_off(&self, device: &dyn CameraDevice) -> CamResult<()> {
        device.write_register(REG_CAMERA_POWER, CAMERA_POWER_OFF)
    }
}

impl Default for PowerSequencer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_POLL_INTERVAL)
    }
}

/// Enumerates the bus and opens the device at `index`.
///
/// The power-on handshake is a separate [`PowerSequencer::power_on`] call:
/// once `open` succeeds the handle exists and teardown must run, even if
/// powering up fails afterwards.
pub fn open(device: &dyn CameraDevice, index: u32) -> CamResult<()> {
    let id = device.resolve(index)?;
    tracing::info!(index, id = ?id, "connecting camera");
    device.connect(id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCamera;
    use crate::registers::RegisterValue;

    fn fast_sequencer() -> PowerSequencer {
        PowerSequencer::new(Duration::from_millis(1))
    }

    fn power_writes(mock: &MockCamera) -> Vec<RegisterValue> {
        mock.register_writes()
            .into_iter()
            .filter(|(addr, _)| *addr == REG_CAMERA_POWER)
            .map(|(_, value)| value)
            .collect()
    }

    #[test]
    fn power_on_polls_until_bit_reads_set() {
        let mock = MockCamera::new().with_power_on_polls(3);
        let id = mock.resolve(0).unwrap();
        mock.connect(id).unwrap();

        fast_sequencer().power_on(&mock).unwrap();

        // The device needed 3 reads before reporting the bit; the handshake
        // kept polling and never wrote the power-off value meanwhile.
        assert!(power_bit_set(mock.register(REG_CAMERA_POWER).unwrap()));
        assert_eq!(power_writes(&mock), vec![CAMERA_POWER_ON]);
    }

    #[test]
    fn power_off_writes_zero() {
        let mock = MockCamera::new().with_power_on_polls(0);
        let id = mock.resolve(0).unwrap();
        mock.connect(id).unwrap();
        let sequencer = fast_sequencer();
        sequencer.power_on(&mock).unwrap();
        sequencer.power_off(&mock).unwrap();

        assert_eq!(power_writes(&mock), vec![CAMERA_POWER_ON, CAMERA_POWER_OFF]);
        assert!(!power_bit_set(mock.register(REG_CAMERA_POWER).unwrap()));
    }

    #[test]
    fn open_resolves_then_connects() {
        let mock = MockCamera::new();
        open(&mock, 0).unwrap();
        assert_eq!(mock.connects(), 1);
    }

    #[test]
    fn open_fails_for_unknown_index() {
        let mock = MockCamera::new();
        let err = open(&mock, 5).unwrap_err();
        assert!(matches!(err, crate::CamError::DeviceNotFound(5)));
        assert_eq!(mock.connects(), 0);
    }
}
