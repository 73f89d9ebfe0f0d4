//! Simulated camera for development and tests.
//!
//! `MockCamera` reproduces the hardware semantics the state machine depends
//! on: the power bit only reads back set after a configurable number of
//! polls, frame retrieval blocks until capture is stopped out from under it,
//! and every connect/disconnect/start/stop/property/register interaction is
//! counted so tests can assert on exact call sequences.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::device::{CameraDevice, DeviceId, FrameConsumer};
use crate::error::{CamError, CamResult};
use crate::frame::{BayerTile, ColorProcessing, FrameMetadata, OutputFrame, PixelFormat, RawFrame};
use crate::properties::{PropertyKind, PropertyRange, PropertySpec};
use crate::registers::{
    power_bit_set, CAMERA_POWER_ON, REG_CAMERA_POWER, REG_FRAME_INFO,
    FRAME_INFO_FRAME_COUNTER, FRAME_INFO_TIMESTAMP, RegisterAddress, RegisterValue,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct MockState {
    device_count: u32,
    connected: bool,
    capturing: bool,

    registers: HashMap<RegisterAddress, RegisterValue>,
    register_writes: Vec<(RegisterAddress, RegisterValue)>,

    /// Reads of the power register that still report the bit clear after a
    /// power-on write, simulating handshake latency.
    power_on_polls: u32,
    power_polls_left: u32,

    ranges: HashMap<PropertyKind, PropertyRange>,
    pushed_properties: Vec<PropertySpec>,

    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    bayer_tile: BayerTile,
    frame_limit: Option<u64>,
    retrieval_fault_after: Option<u64>,
    frames_produced: u64,
    frame_buf: Vec<u8>,

    connects: u32,
    disconnects: u32,
    start_captures: u32,
    stop_captures: u32,
}

/// Simulated camera and bus.
pub struct MockCamera {
    state: Mutex<MockState>,
    wakeup: Condvar,
    conversions: AtomicU32,
    last_algorithm: AtomicU8,
}

impl MockCamera {
    /// A single simulated 640x480 raw8/RGGB camera that powers up after two
    /// polls and produces frames without limit.
    #[must_use]
    pub fn new() -> Self {
        let mut ranges = HashMap::new();
        ranges.insert(
            PropertyKind::Shutter,
            PropertyRange {
                abs_min: 0.03,
                abs_max: 33.3,
            },
        );
        ranges.insert(
            PropertyKind::Gain,
            PropertyRange {
                abs_min: 0.0,
                abs_max: 24.0,
            },
        );
        ranges.insert(
            PropertyKind::FrameRate,
            PropertyRange {
                abs_min: 1.0,
                abs_max: 120.0,
            },
        );
        ranges.insert(
            PropertyKind::AutoExposure,
            PropertyRange {
                abs_min: 0.0,
                abs_max: 1.0,
            },
        );
        Self {
            state: Mutex::new(MockState {
                device_count: 1,
                connected: false,
                capturing: false,
                registers: HashMap::new(),
                register_writes: Vec::new(),
                power_on_polls: 2,
                power_polls_left: 0,
                ranges,
                pushed_properties: Vec::new(),
                width: 640,
                height: 480,
                pixel_format: PixelFormat::Raw8,
                bayer_tile: BayerTile::Rggb,
                frame_limit: None,
                retrieval_fault_after: None,
                frames_produced: 0,
                frame_buf: Vec::new(),
                connects: 0,
                disconnects: 0,
                start_captures: 0,
                stop_captures: 0,
            }),
            wakeup: Condvar::new(),
            conversions: AtomicU32::new(0),
            last_algorithm: AtomicU8::new(u8::MAX),
        }
    }

    /// Number of devices the simulated bus reports.
    #[must_use]
    pub fn with_device_count(self, count: u32) -> Self {
        lock(&self.state).device_count = count;
        self
    }

    /// Pixel format and Bayer tile of produced frames.
    #[must_use]
    pub fn with_pixel_format(self, format: PixelFormat, bayer: BayerTile) -> Self {
        {
            let mut state = lock(&self.state);
            state.pixel_format = format;
            state.bayer_tile = bayer;
        }
        self
    }

    /// Frame dimensions.
    #[must_use]
    pub fn with_resolution(self, width: u32, height: u32) -> Self {
        {
            let mut state = lock(&self.state);
            state.width = width;
            state.height = height;
        }
        self
    }

    /// How many power-register reads report the bit clear after power-on.
    #[must_use]
    pub fn with_power_on_polls(self, polls: u32) -> Self {
        lock(&self.state).power_on_polls = polls;
        self
    }

    /// After this many frames, retrieval blocks until capture is stopped.
    #[must_use]
    pub fn with_frame_limit(self, frames: u64) -> Self {
        lock(&self.state).frame_limit = Some(frames);
        self
    }

    /// After this many successful frames, the next retrieval fails with a
    /// device error even though capture is still running.
    #[must_use]
    pub fn with_retrieval_fault_after(self, frames: u64) -> Self {
        lock(&self.state).retrieval_fault_after = Some(frames);
        self
    }

    /// Overrides the absolute range reported for `kind`.
    pub fn set_property_range(&self, kind: PropertyKind, range: PropertyRange) {
        lock(&self.state).ranges.insert(kind, range);
    }

    /// Connect calls so far.
    #[must_use]
    pub fn connects(&self) -> u32 {
        lock(&self.state).connects
    }

    /// Disconnect calls so far.
    #[must_use]
    pub fn disconnects(&self) -> u32 {
        lock(&self.state).disconnects
    }

    /// Start-capture calls so far.
    #[must_use]
    pub fn start_captures(&self) -> u32 {
        lock(&self.state).start_captures
    }

    /// Stop-capture calls so far.
    #[must_use]
    pub fn stop_captures(&self) -> u32 {
        lock(&self.state).stop_captures
    }

    /// Every property pushed to the device, in order.
    #[must_use]
    pub fn pushed_properties(&self) -> Vec<PropertySpec> {
        lock(&self.state).pushed_properties.clone()
    }

    /// Every register write, in order.
    #[must_use]
    pub fn register_writes(&self) -> Vec<(RegisterAddress, RegisterValue)> {
        lock(&self.state).register_writes.clone()
    }

    /// Current value of a register, if it was ever written.
    #[must_use]
    pub fn register(&self, addr: RegisterAddress) -> Option<RegisterValue> {
        lock(&self.state).registers.get(&addr).copied()
    }

    /// Color conversions performed so far.
    #[must_use]
    pub fn conversion_count(&self) -> u32 {
        self.conversions.load(Ordering::Relaxed)
    }

    /// Algorithm used by the most recent conversion.
    #[must_use]
    pub fn last_conversion_algorithm(&self) -> Option<ColorProcessing> {
        match self.last_algorithm.load(Ordering::Relaxed) {
            u8::MAX => None,
            value => Some(ColorProcessing::from_u8(value)),
        }
    }

    fn powered(state: &MockState) -> bool {
        state.power_polls_left == 0
            && state
                .registers
                .get(&REG_CAMERA_POWER)
                .copied()
                .is_some_and(power_bit_set)
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraDevice for MockCamera {
    fn resolve(&self, index: u32) -> CamResult<DeviceId> {
        let state = lock(&self.state);
        if index >= state.device_count {
            return Err(CamError::DeviceNotFound(index));
        }
        Ok(DeviceId(0xB09D_0000 + u64::from(index)))
    }

    fn connect(&self, _id: DeviceId) -> CamResult<()> {
        let mut state = lock(&self.state);
        state.connected = true;
        state.connects += 1;
        Ok(())
    }

    fn disconnect(&self) -> CamResult<()> {
        let mut state = lock(&self.state);
        state.connected = false;
        state.capturing = false;
        state.disconnects += 1;
        self.wakeup.notify_all();
        Ok(())
    }

    fn read_register(&self, addr: RegisterAddress) -> CamResult<RegisterValue> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(CamError::NotConnected);
        }
        let value = state.registers.get(&addr).copied().unwrap_or(0);
        if addr == REG_CAMERA_POWER && state.power_polls_left > 0 {
            state.power_polls_left -= 1;
            return Ok(value & !CAMERA_POWER_ON);
        }
        Ok(value)
    }

    fn write_register(&self, addr: RegisterAddress, value: RegisterValue) -> CamResult<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(CamError::NotConnected);
        }
        if addr == REG_CAMERA_POWER && power_bit_set(value) {
            state.power_polls_left = state.power_on_polls;
        }
        state.registers.insert(addr, value);
        state.register_writes.push((addr, value));
        Ok(())
    }

    fn property_range(&self, kind: PropertyKind) -> CamResult<PropertyRange> {
        let state = lock(&self.state);
        if !state.connected {
            return Err(CamError::NotConnected);
        }
        state.ranges.get(&kind).copied().ok_or(CamError::Property {
            kind,
            reason: "no range table".into(),
        })
    }

    fn push_property(&self, spec: &PropertySpec) -> CamResult<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(CamError::NotConnected);
        }
        state.pushed_properties.push(spec.clone());
        Ok(())
    }

    fn start_capture(&self) -> CamResult<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(CamError::NotConnected);
        }
        if !Self::powered(&state) {
            return Err(CamError::Bus("camera is not powered".into()));
        }
        state.capturing = true;
        state.start_captures += 1;
        Ok(())
    }

    fn stop_capture(&self) -> CamResult<()> {
        let mut state = lock(&self.state);
        state.capturing = false;
        state.stop_captures += 1;
        self.wakeup.notify_all();
        Ok(())
    }

    fn retrieve_frame(&self, consume: FrameConsumer<'_>) -> CamResult<OutputFrame> {
        let mut state = lock(&self.state);
        loop {
            if !state.connected {
                return Err(CamError::NotConnected);
            }
            if !state.capturing {
                return Err(CamError::Retrieval("capture is not running".into()));
            }
            if let Some(after) = state.retrieval_fault_after {
                if state.frames_produced >= after {
                    return Err(CamError::Retrieval("simulated transfer fault".into()));
                }
            }
            let exhausted = state
                .frame_limit
                .is_some_and(|limit| state.frames_produced >= limit);
            if !exhausted {
                break;
            }
            // Out of frames: park until someone stops the capture.
            state = self
                .wakeup
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let st = &mut *state;
        st.frames_produced += 1;
        let seq = st.frames_produced;

        let stride = st.width * st.pixel_format.bytes_per_pixel();
        let len = (stride * st.height) as usize;
        st.frame_buf.resize(len, 0);
        for (i, byte) in st.frame_buf.iter_mut().enumerate() {
            *byte = ((i as u64).wrapping_add(seq) % 251) as u8;
        }

        let frame_info = st.registers.get(&REG_FRAME_INFO).copied().unwrap_or(0);
        let metadata = FrameMetadata {
            embedded_timestamp: (frame_info & FRAME_INFO_TIMESTAMP != 0)
                .then(|| (seq as u32).wrapping_mul(125)),
            embedded_frame_counter: (frame_info & FRAME_INFO_FRAME_COUNTER != 0)
                .then_some(seq as u32),
            received_at: Utc::now(),
        };

        let raw = RawFrame {
            width: st.width,
            height: st.height,
            stride_bytes: stride,
            pixel_format: st.pixel_format,
            bayer_tile: st.bayer_tile,
            data: &st.frame_buf,
            metadata,
        };
        consume(&raw)
    }

    fn convert_frame(
        &self,
        raw: &RawFrame<'_>,
        algorithm: ColorProcessing,
        dst: &mut [u8],
    ) -> CamResult<()> {
        let expected = (raw.width * raw.height * 3) as usize;
        if dst.len() != expected {
            return Err(CamError::Conversion(format!(
                "destination is {} bytes, expected {expected}",
                dst.len()
            )));
        }
        // Must stay lock-free: called from inside retrieve_frame's consume
        // callback while the state lock is held.
        self.conversions.fetch_add(1, Ordering::Relaxed);
        self.last_algorithm.store(algorithm.as_u8(), Ordering::Relaxed);

        let bpp = raw.pixel_format.bytes_per_pixel() as usize;
        let stride = raw.stride_bytes as usize;
        for y in 0..raw.height as usize {
            for x in 0..raw.width as usize {
                let src = y * stride + x * bpp;
                // Most significant byte for 16-bit little-endian data.
                let value = if bpp == 2 {
                    raw.data[src + 1]
                } else {
                    raw.data[src]
                };
                let out = (y * raw.width as usize + x) * 3;
                dst[out] = value;
                dst[out + 1] = value;
                dst[out + 2] = value;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn resolve_honors_device_count() {
        let mock = MockCamera::new().with_device_count(2);
        assert!(mock.resolve(0).is_ok());
        assert!(mock.resolve(1).is_ok());
        assert!(matches!(mock.resolve(2), Err(CamError::DeviceNotFound(2))));
    }

    #[test]
    fn power_bit_hidden_for_configured_polls() {
        let mock = MockCamera::new().with_power_on_polls(2);
        let id = mock.resolve(0).unwrap();
        mock.connect(id).unwrap();
        mock.write_register(REG_CAMERA_POWER, CAMERA_POWER_ON).unwrap();

        assert!(!power_bit_set(mock.read_register(REG_CAMERA_POWER).unwrap()));
        assert!(!power_bit_set(mock.read_register(REG_CAMERA_POWER).unwrap()));
        assert!(power_bit_set(mock.read_register(REG_CAMERA_POWER).unwrap()));
    }

    #[test]
    fn start_capture_requires_power() {
        let mock = MockCamera::new().with_power_on_polls(0);
        let id = mock.resolve(0).unwrap();
        mock.connect(id).unwrap();
        assert!(matches!(mock.start_capture(), Err(CamError::Bus(_))));

        mock.write_register(REG_CAMERA_POWER, CAMERA_POWER_ON).unwrap();
        mock.start_capture().unwrap();
        assert_eq!(mock.start_captures(), 1);
    }

    #[test]
    fn stop_capture_unblocks_exhausted_retrieval() {
        let mock = Arc::new(MockCamera::new().with_power_on_polls(0).with_frame_limit(0));
        let id = mock.resolve(0).unwrap();
        mock.connect(id).unwrap();
        mock.write_register(REG_CAMERA_POWER, CAMERA_POWER_ON).unwrap();
        mock.start_capture().unwrap();

        let retriever = {
            let mock = Arc::clone(&mock);
            std::thread::spawn(move || {
                mock.retrieve_frame(&mut |_| {
                    Err(CamError::Retrieval("should not produce".into()))
                })
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        mock.stop_capture().unwrap();

        let result = retriever.join().expect("retriever panicked");
        assert!(matches!(result, Err(CamError::Retrieval(_))));
    }

    #[test]
    fn retrieval_produces_frames_until_fault() {
        let mock = MockCamera::new().with_power_on_polls(0).with_retrieval_fault_after(1);
        let id = mock.resolve(0).unwrap();
        mock.connect(id).unwrap();
        mock.write_register(REG_CAMERA_POWER, CAMERA_POWER_ON).unwrap();
        mock.start_capture().unwrap();

        let mut widths = Vec::new();
        let first = mock.retrieve_frame(&mut |raw| {
            widths.push(raw.width);
            Ok(OutputFrame {
                width: raw.width,
                height: raw.height,
                stride_bytes: raw.stride_bytes,
                format: crate::frame::OutputFormat::Mono8,
                bayer_tile: raw.bayer_tile,
                pixels: raw.data.to_vec(),
                metadata: raw.metadata.clone(),
            })
        });
        assert!(first.is_ok());
        assert_eq!(widths, vec![640]);

        let second = mock.retrieve_frame(&mut |_| {
            Err(CamError::Retrieval("should not produce".into()))
        });
        assert!(matches!(second, Err(CamError::Retrieval(_))));
    }
}
