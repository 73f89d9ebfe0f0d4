//! Frame data model: pixel formats, Bayer tiles, raw views and owned frames.
//!
//! A [`RawFrame`] borrows the device's retrieval buffer and is only valid for
//! one loop iteration; the borrow checker enforces that it cannot outlive the
//! retrieval call that produced it. Anything handed downstream is an
//! [`OutputFrame`], which owns its pixels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire pixel format reported by the device for a retrieved buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit monochrome.
    Mono8,
    /// 16-bit monochrome.
    Mono16,
    /// 8-bit raw sensor data, possibly Bayer-mosaiced.
    Raw8,
    /// 16-bit raw sensor data, possibly Bayer-mosaiced.
    Raw16,
    /// Packed 8-bit RGB.
    Rgb8,
    /// YUV 4:2:2.
    Yuv422,
}

impl PixelFormat {
    /// Bytes per pixel on the wire.
    #[must_use]
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Mono8 | PixelFormat::Raw8 => 1,
            PixelFormat::Mono16 | PixelFormat::Raw16 | PixelFormat::Yuv422 => 2,
            PixelFormat::Rgb8 => 3,
        }
    }
}

/// Color-filter mosaic pattern over a monochrome sensor.
///
/// `None` means the pixel data carries no mosaic, either inherently or
/// because color conversion already resolved it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BayerTile {
    /// No mosaic.
    None,
    /// Red-green rows over green-blue rows.
    Rggb,
    /// Green-red rows over blue-green rows.
    Grbg,
    /// Green-blue rows over red-green rows.
    Gbrg,
    /// Blue-green rows over green-red rows.
    Bggr,
}

/// Demosaicing algorithm requested from the device conversion routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorProcessing {
    /// Device default algorithm.
    Default,
    /// Explicitly no processing: raw data passes through unconverted.
    NoProcessing,
    /// Nearest-neighbor demosaicing (fastest).
    NearestNeighbor,
    /// Edge-sensing demosaicing.
    EdgeSensing,
    /// High-quality linear interpolation.
    HqLinear,
    /// Rigorous (slowest, best quality) demosaicing.
    Rigorous,
}

impl ColorProcessing {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            ColorProcessing::Default => 0,
            ColorProcessing::NoProcessing => 1,
            ColorProcessing::NearestNeighbor => 2,
            ColorProcessing::EdgeSensing => 3,
            ColorProcessing::HqLinear => 4,
            ColorProcessing::Rigorous => 5,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ColorProcessing::NoProcessing,
            2 => ColorProcessing::NearestNeighbor,
            3 => ColorProcessing::EdgeSensing,
            4 => ColorProcessing::HqLinear,
            5 => ColorProcessing::Rigorous,
            _ => ColorProcessing::Default,
        }
    }
}

/// Per-frame metadata carried from retrieval through to the consumer.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Capture timestamp embedded into pixel data by the device, if enabled.
    pub embedded_timestamp: Option<u32>,
    /// Frame counter embedded into pixel data by the device, if enabled.
    pub embedded_frame_counter: Option<u32>,
    /// Host time at which the frame was retrieved.
    pub received_at: DateTime<Utc>,
}

/// Borrowed view of a raw frame buffer owned by the device.
///
/// Valid only until the next retrieval call; the lifetime parameter ties the
/// view to the retrieval that produced it. Copy the data (or decode into an
/// [`OutputFrame`]) before the view goes away.
#[derive(Debug)]
pub struct RawFrame<'a> {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per row, including any padding.
    pub stride_bytes: u32,
    /// Wire pixel format of `data`.
    pub pixel_format: PixelFormat,
    /// Mosaic pattern of `data`, if any.
    pub bayer_tile: BayerTile,
    /// The raw pixel bytes, `stride_bytes * height` long.
    pub data: &'a [u8],
    /// Metadata captured alongside the pixels.
    pub metadata: FrameMetadata,
}

/// Pixel layout of a decoded [`OutputFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Single channel, 1 byte per pixel.
    Mono8,
    /// Single channel, 2 bytes per pixel.
    Mono16,
    /// Three channels, blue-green-red, 1 byte each.
    Bgr8,
}

impl OutputFormat {
    /// Number of color channels.
    #[must_use]
    pub fn channels(self) -> u32 {
        match self {
            OutputFormat::Mono8 | OutputFormat::Mono16 => 1,
            OutputFormat::Bgr8 => 3,
        }
    }

    /// Bytes per pixel.
    #[must_use]
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            OutputFormat::Mono8 => 1,
            OutputFormat::Mono16 => 2,
            OutputFormat::Bgr8 => 3,
        }
    }
}

/// Decoded frame with owned pixel storage.
///
/// Ownership transfers to the downstream consumer on emission.
#[derive(Debug, Clone)]
pub struct OutputFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per row of `pixels`.
    pub stride_bytes: u32,
    /// Pixel layout of `pixels`.
    pub format: OutputFormat,
    /// Mosaic pattern still present in `pixels`. [`BayerTile::None`] after
    /// color conversion.
    pub bayer_tile: BayerTile,
    /// Owned pixel bytes.
    pub pixels: Vec<u8>,
    /// Metadata carried over from the raw frame.
    pub metadata: FrameMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_depths() {
        assert_eq!(PixelFormat::Mono8.bytes_per_pixel(), 1);
        assert_eq!(PixelFormat::Raw8.bytes_per_pixel(), 1);
        assert_eq!(PixelFormat::Mono16.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::Raw16.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::Rgb8.bytes_per_pixel(), 3);
    }

    #[test]
    fn output_channels() {
        assert_eq!(OutputFormat::Mono8.channels(), 1);
        assert_eq!(OutputFormat::Mono16.channels(), 1);
        assert_eq!(OutputFormat::Bgr8.channels(), 3);
        assert_eq!(OutputFormat::Bgr8.bytes_per_pixel(), 3);
    }

    #[test]
    fn color_processing_roundtrip() {
        for algo in [
            ColorProcessing::Default,
            ColorProcessing::NoProcessing,
            ColorProcessing::NearestNeighbor,
            ColorProcessing::EdgeSensing,
            ColorProcessing::HqLinear,
            ColorProcessing::Rigorous,
        ] {
            assert_eq!(ColorProcessing::from_u8(algo.as_u8()), algo);
        }
    }
}
