mod common;

use common::FakeDevice;

use v4l_capture::buffer;
use v4l_capture::capability::Flags;
use v4l_capture::crop::{CropRequest, Rect};
use v4l_capture::device::negotiate;
use v4l_capture::{Error, FourCC};

fn fourccs(codes: &[&[u8; 4]]) -> Vec<FourCC> {
    codes.iter().map(|code| FourCC::new(code)).collect()
}

#[test]
fn first_caller_preference_present_on_device_wins() {
    let dev = FakeDevice::new().with_formats(&[b"YUYV", b"GREY"]);
    let negotiated = negotiate(&dev, &fourccs(&[b"GREY", b"RGB3", b"YUYV"]), None).unwrap();

    assert_eq!(negotiated.format.fourcc, FourCC::new(b"GREY"));
    assert_eq!(negotiated.typ, buffer::Type::VideoCapture);
    assert_eq!(negotiated.formats.len(), 2);
    assert_eq!(negotiated.crop, None);
}

#[test]
fn no_common_format() {
    let dev = FakeDevice::new().with_formats(&[b"YUYV", b"MJPG"]);
    let err = negotiate(&dev, &fourccs(&[b"RGB3", b"BGR3"]), None).unwrap_err();

    assert!(matches!(err, Error::FormatNegotiation { .. }), "{}", err);
    assert_eq!(err.os_code(), None);
}

#[test]
fn silently_refused_format_is_detected() {
    let dev = FakeDevice::new().refusing_formats();
    let err = negotiate(&dev, &fourccs(&[b"YUYV"]), None).unwrap_err();

    assert!(matches!(err, Error::FormatNegotiation { .. }), "{}", err);
}

#[test]
fn rejects_non_capture_devices() {
    let dev = FakeDevice::new().with_caps(Flags::VIDEO_OUTPUT | Flags::STREAMING);
    let err = negotiate(&dev, &fourccs(&[b"YUYV"]), None).unwrap_err();
    assert!(matches!(err, Error::Capability { .. }), "{}", err);
}

#[test]
fn rejects_devices_without_streaming() {
    let dev = FakeDevice::new().with_caps(Flags::VIDEO_CAPTURE | Flags::READ_WRITE);
    let err = negotiate(&dev, &fourccs(&[b"YUYV"]), None).unwrap_err();
    assert!(matches!(err, Error::Capability { .. }), "{}", err);
}

#[test]
fn multi_planar_devices_use_planar_addressing() {
    let dev = FakeDevice::new()
        .with_caps(Flags::VIDEO_CAPTURE_MPLANE | Flags::STREAMING)
        .with_planes(2);
    let negotiated = negotiate(&dev, &fourccs(&[b"YUYV"]), None).unwrap();

    assert_eq!(negotiated.typ, buffer::Type::VideoCaptureMplane);
    assert_eq!(negotiated.format.planes, 2);
}

#[test]
fn single_planar_wins_over_multi_planar() {
    let dev = FakeDevice::new()
        .with_caps(Flags::VIDEO_CAPTURE | Flags::VIDEO_CAPTURE_MPLANE | Flags::STREAMING);
    let negotiated = negotiate(&dev, &fourccs(&[b"YUYV"]), None).unwrap();
    assert_eq!(negotiated.typ, buffer::Type::VideoCapture);
}

#[test]
fn crop_is_clamped_and_applied_once() {
    let dev = FakeDevice::new();
    let request = CropRequest::new(-50, -1, 10000, -1);
    let negotiated = negotiate(&dev, &fourccs(&[b"YUYV"]), Some(&request)).unwrap();

    assert_eq!(dev.crops_set(), vec![Rect::new(0, 0, 640, 480)]);
    assert_eq!(negotiated.crop, Some(Rect::new(0, 0, 640, 480)));
}

#[test]
fn crop_region_inside_bounds() {
    let dev = FakeDevice::new();
    let request = CropRequest::new(100, 50, 320, 240);
    negotiate(&dev, &fourccs(&[b"YUYV"]), Some(&request)).unwrap();

    assert_eq!(dev.crops_set(), vec![Rect::new(100, 50, 320, 240)]);
}

#[test]
fn default_crop_request_leaves_device_alone() {
    let dev = FakeDevice::new();
    let request = CropRequest::default();
    let negotiated = negotiate(&dev, &fourccs(&[b"YUYV"]), Some(&request)).unwrap();

    assert!(dev.crops_set().is_empty());
    assert_eq!(negotiated.crop, None);
}
