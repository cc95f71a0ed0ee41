use aen::processor::{stack_batch, ImagePreprocessor, ImageProcessor};
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use ndarray::s;
use tempfile::tempdir;

mod common;
use common::{write_corrupt, write_image};

const RED: Rgb<u8> = Rgb([255, 0, 0]);

#[test]
fn test_transparency_becomes_white() {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0])));
    let processor = ImagePreprocessor::new(4, false);
    let tensor = processor.process(&image).unwrap();

    assert_eq!(tensor.shape(), &[4, 4, 3]);
    assert!(tensor.iter().all(|&v| v == 255.0));
}

#[test]
fn test_half_transparent_pixels_blend_with_white() {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 128])));
    let processor = ImagePreprocessor::new(2, false);
    let tensor = processor.process(&image).unwrap();

    let value = tensor[[0, 0, 0]];
    assert!(value > 120.0 && value < 135.0, "got {}", value);
}

#[test]
fn test_wide_image_is_centered_vertically() {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 2, RED));
    let processor = ImagePreprocessor::new(4, false);
    let tensor = processor.process(&image).unwrap();

    for y in 0..4 {
        let expected = if (1..=2).contains(&y) { 0.0 } else { 255.0 };
        assert_eq!(tensor[[y, 0, 1]], expected, "row {}", y);
    }
}

#[test]
fn test_odd_padding_puts_extra_row_below() {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 1, RED));
    let processor = ImagePreprocessor::new(4, false);
    let tensor = processor.process(&image).unwrap();

    let green = tensor.slice(s![.., 0, 1]).to_vec();
    assert_eq!(green, vec![255.0, 0.0, 255.0, 255.0]);
}

#[test]
fn test_tall_image_is_centered_horizontally() {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 4, RED));
    let processor = ImagePreprocessor::new(4, false);
    let tensor = processor.process(&image).unwrap();

    let green = tensor.slice(s![0, .., 1]).to_vec();
    assert_eq!(green, vec![255.0, 0.0, 0.0, 255.0]);
}

#[test]
fn test_bgr_channel_order() {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 3, Rgb([10, 20, 30])));

    let bgr = ImagePreprocessor::new(3, true).process(&image).unwrap();
    assert_eq!(bgr.slice(s![1, 1, ..]).to_vec(), vec![30.0, 20.0, 10.0]);

    let rgb = ImagePreprocessor::new(3, false).process(&image).unwrap();
    assert_eq!(rgb.slice(s![1, 1, ..]).to_vec(), vec![10.0, 20.0, 30.0]);
}

#[test]
fn test_resizes_to_target_size() {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 20, Rgb([90, 90, 90])));
    let processor = ImagePreprocessor::new(8, true);
    let tensor = processor.process(&image).unwrap();

    assert_eq!(tensor.shape(), &[8, 8, 3]);
    // Center pixels keep the source color after a smooth resize.
    assert!((tensor[[4, 4, 0]] - 90.0).abs() < 1.0);
}

#[test]
fn test_load_from_disk() {
    let dir = tempdir().unwrap();
    write_image(dir.path(), "x/y.png", [1, 2, 3]);
    write_corrupt(dir.path(), "x/z.png");

    let processor = ImagePreprocessor::new(8, true);
    let tensor = processor.load(dir.path().join("x/y.png")).unwrap();
    assert_eq!(tensor.shape(), &[8, 8, 3]);

    assert!(processor.load(dir.path().join("x/z.png")).is_err());
    assert!(processor.load(dir.path().join("x/missing.png")).is_err());
}

#[test]
fn test_stack_batch() {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(5, 5, RED));
    let processor = ImagePreprocessor::new(5, true);
    let buffer = processor.process(&image).unwrap();

    let batch = stack_batch(&[buffer.clone(), buffer]).unwrap();
    assert_eq!(batch.shape(), &[2, 5, 5, 3]);
    assert_eq!(batch.slice(s![0, .., .., ..]), batch.slice(s![1, .., .., ..]));
}
