use thiserror::Error;

#[derive(Error, Debug)]
pub enum StitchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Canvas allocation of {bytes} bytes failed")]
    Allocation { bytes: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Empty frame sequence")]
    EmptySequence,
}

pub type Result<T> = std::result::Result<T, StitchError>;
