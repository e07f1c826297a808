mod common;

use std::path::Path;

use common::document;
use image::ImageFormat;
use scrollstitch_core::io::image_io::output_format;
use scrollstitch_core::io::{load_frame, load_frames, save_image};
use scrollstitch_core::StitchError;

// ---------------------------------------------------------------------------
// Formats
// ---------------------------------------------------------------------------

#[test]
fn test_output_format_follows_the_extension() {
    assert_eq!(output_format(Path::new("out.png")), ImageFormat::Png);
    assert_eq!(output_format(Path::new("out.TIF")), ImageFormat::Tiff);
    assert_eq!(output_format(Path::new("out.jpeg")), ImageFormat::Jpeg);
    assert_eq!(output_format(Path::new("out.bmp")), ImageFormat::Bmp);
    assert_eq!(output_format(Path::new("out")), ImageFormat::Png);
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

#[test]
fn test_png_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    let image = document(64, 48, 50);
    save_image(&image, &path).unwrap();

    let frame = load_frame(&path).unwrap();
    assert_eq!((frame.width(), frame.height()), (64, 48));
    assert_eq!(frame.image().to_rgb8(), image);
}

#[test]
fn test_frames_load_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = (0..3)
        .map(|i| {
            let path = dir.path().join(format!("{i}.png"));
            save_image(&document(16 + i * 8, 16, 51), &path).unwrap();
            path
        })
        .collect();

    let frames = load_frames(&paths).unwrap();
    let widths: Vec<u32> = frames.iter().map(|f| f.width()).collect();
    assert_eq!(widths, vec![16, 24, 32]);
}

#[test]
fn test_empty_list_is_an_error() {
    assert!(matches!(load_frames(&[]), Err(StitchError::EmptySequence)));
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_frame(&dir.path().join("missing.png")).is_err());
}
