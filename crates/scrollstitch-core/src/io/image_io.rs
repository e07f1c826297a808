use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};
use tracing::debug;

use crate::error::{Result, StitchError};
use crate::frame::Frame;

/// Load an image file of any supported format as a frame.
pub fn load_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(StitchError::InvalidDimensions {
            width: image.width(),
            height: image.height(),
        });
    }
    debug!(path = %path.display(), width = image.width(), height = image.height(), "Loaded frame");
    Ok(Frame::new(image))
}

/// Load frames in the given order.
pub fn load_frames(paths: &[PathBuf]) -> Result<Vec<Frame>> {
    if paths.is_empty() {
        return Err(StitchError::EmptySequence);
    }
    paths.iter().map(|p| load_frame(p)).collect()
}

/// Output format implied by the file extension. PNG when unknown.
pub fn output_format(path: &Path) -> ImageFormat {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("tiff" | "tif") => ImageFormat::Tiff,
        Some("jpg" | "jpeg") => ImageFormat::Jpeg,
        Some("bmp") => ImageFormat::Bmp,
        _ => ImageFormat::Png,
    }
}

/// Save the stitched image, choosing the format from the file extension.
pub fn save_image(image: &RgbImage, path: &Path) -> Result<()> {
    image.save_with_format(path, output_format(path))?;
    Ok(())
}
