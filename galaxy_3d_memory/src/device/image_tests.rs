//! Unit tests for image formats and descriptors

use super::*;

#[test]
fn test_bytes_per_pixel() {
    assert_eq!(ImageFormat::R8_UNORM.bytes_per_pixel(), 1);
    assert_eq!(ImageFormat::R8G8_UNORM.bytes_per_pixel(), 2);
    assert_eq!(ImageFormat::R8G8B8A8_UNORM.bytes_per_pixel(), 4);
    assert_eq!(ImageFormat::R8G8B8A8_SRGB.bytes_per_pixel(), 4);
    assert_eq!(ImageFormat::R16G16B16A16_SFLOAT.bytes_per_pixel(), 8);
    assert_eq!(ImageFormat::R32G32B32A32_SFLOAT.bytes_per_pixel(), 16);
}

#[test]
fn test_bytes_per_pixel_is_power_of_two() {
    for format in [
        ImageFormat::R8_UNORM,
        ImageFormat::R8G8_UNORM,
        ImageFormat::R8G8B8A8_UNORM,
        ImageFormat::R8G8B8A8_SRGB,
        ImageFormat::R16G16B16A16_SFLOAT,
        ImageFormat::R32G32B32A32_SFLOAT,
    ] {
        assert!(format.bytes_per_pixel().is_power_of_two(), "{:?}", format);
    }
}

#[test]
fn test_byte_size() {
    let desc = ImageDesc {
        name: "albedo".to_string(),
        width: 16,
        height: 8,
        format: ImageFormat::R8G8B8A8_UNORM,
    };
    assert_eq!(desc.byte_size(), 16 * 8 * 4);
}
