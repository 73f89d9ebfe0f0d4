//! Frame decoder: passthrough or device color conversion, decided per frame.
//!
//! Decision rule:
//!
//! 1. Monochrome data (8- or 16-bit), and 8-bit raw data that either carries
//!    no Bayer tile or has processing explicitly disabled, pass through
//!    unconverted: the raw bytes are copied into an owned single-channel
//!    buffer of matching depth and the Bayer tag is recorded as-is.
//! 2. Everything else goes through the device's native conversion into an
//!    owned 3-channel BGR buffer; the mosaic is resolved away, so the output
//!    Bayer tag is [`BayerTile::None`].

use crate::device::CameraDevice;
use crate::error::CamResult;
use crate::frame::{BayerTile, ColorProcessing, OutputFormat, OutputFrame, PixelFormat, RawFrame};

/// Decodes one raw frame view into an owned [`OutputFrame`].
pub fn decode(
    device: &dyn CameraDevice,
    raw: &RawFrame<'_>,
    processing: ColorProcessing,
) -> CamResult<OutputFrame> {
    let passthrough = match raw.pixel_format {
        PixelFormat::Mono8 | PixelFormat::Mono16 => true,
        PixelFormat::Raw8 => {
            raw.bayer_tile == BayerTile::None || processing == ColorProcessing::NoProcessing
        }
        _ => false,
    };

    if passthrough {
        let format = match raw.pixel_format {
            PixelFormat::Mono16 => OutputFormat::Mono16,
            _ => OutputFormat::Mono8,
        };
        return Ok(OutputFrame {
            width: raw.width,
            height: raw.height,
            stride_bytes: raw.stride_bytes,
            format,
            bayer_tile: raw.bayer_tile,
            pixels: raw.data.to_vec(),
            metadata: raw.metadata.clone(),
        });
    }

    let stride = raw.width * 3;
    let mut pixels = vec![0u8; (stride * raw.height) as usize];
    device.convert_frame(raw, processing, &mut pixels)?;
    Ok(OutputFrame {
        width: raw.width,
        height: raw.height,
        stride_bytes: stride,
        format: OutputFormat::Bgr8,
        bayer_tile: BayerTile::None,
        pixels,
        metadata: raw.metadata.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameMetadata;
    use crate::mock::MockCamera;
    use chrono::Utc;

    fn raw<'a>(format: PixelFormat, bayer: BayerTile, data: &'a [u8]) -> RawFrame<'a> {
        let bpp = format.bytes_per_pixel();
        RawFrame {
            width: 4,
            height: 2,
            stride_bytes: 4 * bpp,
            pixel_format: format,
            bayer_tile: bayer,
            data,
            metadata: FrameMetadata {
                embedded_timestamp: Some(7),
                embedded_frame_counter: Some(3),
                received_at: Utc::now(),
            },
        }
    }

    #[test]
    fn mono8_passes_through() {
        let device = MockCamera::new();
        let data = [9u8; 8];
        let frame = decode(&device, &raw(PixelFormat::Mono8, BayerTile::None, &data), ColorProcessing::Default).unwrap();
        assert_eq!(frame.format, OutputFormat::Mono8);
        assert_eq!(frame.bayer_tile, BayerTile::None);
        assert_eq!(frame.pixels, data);
        assert_eq!(device.conversion_count(), 0);
    }

    #[test]
    fn mono16_keeps_two_bytes_per_pixel() {
        let device = MockCamera::new();
        let data = [1u8; 16];
        let frame = decode(&device, &raw(PixelFormat::Mono16, BayerTile::None, &data), ColorProcessing::Default).unwrap();
        assert_eq!(frame.format, OutputFormat::Mono16);
        assert_eq!(frame.pixels.len(), 16);
        assert_eq!(frame.format.bytes_per_pixel(), 2);
    }

    #[test]
    fn raw8_without_bayer_passes_through() {
        let device = MockCamera::new();
        let data = [5u8; 8];
        let frame = decode(&device, &raw(PixelFormat::Raw8, BayerTile::None, &data), ColorProcessing::Default).unwrap();
        assert_eq!(frame.format, OutputFormat::Mono8);
        assert_eq!(device.conversion_count(), 0);
    }

    #[test]
    fn raw8_with_processing_disabled_keeps_bayer_tag() {
        let device = MockCamera::new();
        let data = [5u8; 8];
        let frame = decode(
            &device,
            &raw(PixelFormat::Raw8, BayerTile::Rggb, &data),
            ColorProcessing::NoProcessing,
        )
        .unwrap();
        assert_eq!(frame.format, OutputFormat::Mono8);
        assert_eq!(frame.bayer_tile, BayerTile::Rggb);
        assert_eq!(device.conversion_count(), 0);
    }

    #[test]
    fn raw8_with_bayer_converts_to_bgr() {
        let device = MockCamera::new();
        let data = [5u8; 8];
        let frame = decode(
            &device,
            &raw(PixelFormat::Raw8, BayerTile::Gbrg, &data),
            ColorProcessing::HqLinear,
        )
        .unwrap();
        assert_eq!(frame.format, OutputFormat::Bgr8);
        assert_eq!(frame.bayer_tile, BayerTile::None);
        assert_eq!(frame.pixels.len(), 4 * 2 * 3);
        assert_eq!(frame.stride_bytes, 12);
        assert_eq!(device.conversion_count(), 1);
        assert_eq!(device.last_conversion_algorithm(), Some(ColorProcessing::HqLinear));
    }

    #[test]
    fn raw16_with_bayer_converts_to_bgr() {
        let device = MockCamera::new();
        let data = [0u8; 16];
        let frame = decode(
            &device,
            &raw(PixelFormat::Raw16, BayerTile::Bggr, &data),
            ColorProcessing::Default,
        )
        .unwrap();
        assert_eq!(frame.format, OutputFormat::Bgr8);
        assert_eq!(frame.bayer_tile, BayerTile::None);
    }

    #[test]
    fn metadata_is_carried_over() {
        let device = MockCamera::new();
        let data = [0u8; 8];
        let frame = decode(
            &device,
            &raw(PixelFormat::Raw8, BayerTile::Rggb, &data),
            ColorProcessing::Default,
        )
        .unwrap();
        assert_eq!(frame.metadata.embedded_timestamp, Some(7));
        assert_eq!(frame.metadata.embedded_frame_counter, Some(3));
    }
}
