//! End-to-end streaming through the public API against the mock device.

use std::sync::Arc;
use std::time::{Duration, Instant};

use iidc_stream::registers::{CAMERA_POWER_OFF, REG_CAMERA_POWER};
use iidc_stream::{
    BayerTile, CamError, CameraConfig, CameraSource, MockCamera, OutputFormat, PixelFormat,
    PropertyKind, SessionState,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_config() -> CameraConfig {
    CameraConfig {
        power_poll_interval_ms: 1,
        ..CameraConfig::default()
    }
}

/// Polls `cond` until it holds or two seconds pass.
fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(2) {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[test]
fn streams_bgr_frames_and_tears_down_on_drop() {
    init_tracing();
    let mock = Arc::new(
        MockCamera::new()
            .with_pixel_format(PixelFormat::Raw8, BayerTile::Rggb)
            .with_power_on_polls(2),
    );
    let source = CameraSource::new(fast_config(), mock.clone()).unwrap();

    let mut stream = source.subscribe().unwrap();
    for _ in 0..5 {
        let frame = stream.blocking_next().expect("stream ended early").unwrap();
        assert_eq!(frame.format, OutputFormat::Bgr8);
        assert_eq!(frame.bayer_tile, BayerTile::None);
        assert_eq!(frame.pixels.len(), 640 * 480 * 3);
    }
    assert_eq!(source.state(), SessionState::Capturing);

    drop(stream);
    assert!(
        wait_until(|| source.state() == SessionState::Disconnected),
        "teardown never ran"
    );
    assert_eq!(mock.disconnects(), 1);
    assert_eq!(mock.stop_captures(), 1);
    assert_eq!(mock.register(REG_CAMERA_POWER), Some(CAMERA_POWER_OFF));
}

#[test]
fn mono16_frames_pass_through_unconverted() {
    init_tracing();
    let mock = Arc::new(
        MockCamera::new()
            .with_pixel_format(PixelFormat::Mono16, BayerTile::None)
            .with_resolution(8, 4),
    );
    let source = CameraSource::new(fast_config(), mock.clone()).unwrap();

    let mut stream = source.subscribe().unwrap();
    let frame = stream.blocking_next().unwrap().unwrap();
    assert_eq!(frame.format, OutputFormat::Mono16);
    assert_eq!(frame.pixels.len(), 8 * 4 * 2);
    assert_eq!(mock.conversion_count(), 0);
}

#[test]
fn auto_exposure_toggle_reaches_device_mid_stream() {
    init_tracing();
    let mock = Arc::new(MockCamera::new());
    let source = CameraSource::new(fast_config(), mock.clone()).unwrap();

    let mut stream = source.subscribe().unwrap();
    stream.blocking_next().unwrap().unwrap();

    source.controls().set_auto_exposure(true);
    assert!(
        wait_until(|| mock
            .pushed_properties()
            .iter()
            .any(|push| push.kind == PropertyKind::AutoExposure && push.auto)),
        "auto-exposure push never reached the device"
    );

    // Entering auto mode also hands shutter and gain over to the device.
    let pushes = mock.pushed_properties();
    assert!(pushes
        .iter()
        .any(|push| push.kind == PropertyKind::Shutter && push.auto));
    assert!(pushes
        .iter()
        .any(|push| push.kind == PropertyKind::Gain && push.auto));
}

#[test]
fn fatal_device_error_surfaces_then_ends_stream() {
    init_tracing();
    let mock = Arc::new(MockCamera::new().with_retrieval_fault_after(2));
    let source = CameraSource::new(fast_config(), mock.clone()).unwrap();

    let mut stream = source.subscribe().unwrap();
    assert!(stream.blocking_next().unwrap().is_ok());
    assert!(stream.blocking_next().unwrap().is_ok());

    match stream.blocking_next() {
        Some(Err(CamError::Session(_))) => {}
        other => panic!("expected session error, got {other:?}"),
    }
    assert!(stream.blocking_next().is_none());

    // The error path still powered down and disconnected.
    assert!(wait_until(|| mock.disconnects() == 1));
    assert_eq!(mock.register(REG_CAMERA_POWER), Some(CAMERA_POWER_OFF));
}

#[tokio::test(flavor = "multi_thread")]
async fn async_subscriber_receives_frames() {
    init_tracing();
    let mock = Arc::new(MockCamera::new());
    let source = CameraSource::new(fast_config(), mock).unwrap();

    let mut stream = source.subscribe().unwrap();
    for _ in 0..3 {
        let frame = stream.next().await.expect("stream ended early").unwrap();
        assert_eq!(frame.format, OutputFormat::Bgr8);
    }
}
