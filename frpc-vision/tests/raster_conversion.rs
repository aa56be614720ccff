use frpc_vision::raster::{to_rgb_image, PixelLayout};
use image::GenericImageView;

#[test]
fn gray_raster_expands_to_rgb() {
    let data = vec![0u8, 64, 128, 255, 10, 20];
    let img = to_rgb_image(3, 2, PixelLayout::Gray8, &data).unwrap();
    assert_eq!(img.dimensions(), (3, 2));
    let rgb = img.to_rgb8();
    assert_eq!(rgb.get_pixel(1, 0).0, [64, 64, 64]);
    assert_eq!(rgb.get_pixel(2, 1).0, [20, 20, 20]);
}

#[test]
fn rgb_raster_keeps_interleaving() {
    let data = vec![1u8, 2, 3, 4, 5, 6];
    let img = to_rgb_image(2, 1, PixelLayout::Rgb24, &data).unwrap();
    let rgb = img.to_rgb8();
    assert_eq!(rgb.get_pixel(0, 0).0, [1, 2, 3]);
    assert_eq!(rgb.get_pixel(1, 0).0, [4, 5, 6]);
}

#[test]
fn trailing_bytes_are_ignored() {
    let data = vec![9u8; 10];
    let img = to_rgb_image(1, 1, PixelLayout::Rgb24, &data).unwrap();
    assert_eq!(img.to_rgb8().into_raw(), vec![9, 9, 9]);
}

#[test]
fn short_buffer_is_rejected() {
    let err = to_rgb_image(4, 4, PixelLayout::Rgb24, &[0u8; 47]).unwrap_err();
    assert!(err.to_string().contains("short"));
}
