use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};

/// A single captured screenshot of the scrolling viewport.
///
/// Any pixel format is accepted; frames are converted to packed RGB when
/// the engine prepares them.
#[derive(Clone, Debug)]
pub struct Frame {
    image: DynamicImage,
}

impl Frame {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn from_rgb(image: RgbImage) -> Self {
        Self {
            image: DynamicImage::ImageRgb8(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }

    /// Length of the frame along the scroll axis.
    pub fn axis_len(&self, mode: CaptureMode) -> usize {
        match mode {
            CaptureMode::Vertical => self.height() as usize,
            CaptureMode::Horizontal => self.width() as usize,
        }
    }

    /// Length of the frame across the scroll axis.
    pub fn cross_len(&self, mode: CaptureMode) -> usize {
        match mode {
            CaptureMode::Vertical => self.width() as usize,
            CaptureMode::Horizontal => self.height() as usize,
        }
    }

    /// Remove `leading` and `trailing` pixels along the scroll axis.
    ///
    /// Returns the frame unchanged when the bands would consume it entirely.
    pub fn crop_scroll_axis(&self, mode: CaptureMode, leading: usize, trailing: usize) -> Frame {
        let axis = self.axis_len(mode);
        if leading + trailing == 0 || leading + trailing >= axis {
            return self.clone();
        }
        let keep = (axis - leading - trailing) as u32;
        let image = match mode {
            CaptureMode::Vertical => self.image.crop_imm(0, leading as u32, self.width(), keep),
            CaptureMode::Horizontal => self.image.crop_imm(leading as u32, 0, keep, self.height()),
        };
        Frame { image }
    }
}

impl From<DynamicImage> for Frame {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}

impl From<RgbImage> for Frame {
    fn from(image: RgbImage) -> Self {
        Self::from_rgb(image)
    }
}

/// Axis along which the captured content scrolls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureMode {
    #[default]
    Vertical,
    Horizontal,
}

impl CaptureMode {
    /// Direction tried first: forward along the scroll axis.
    pub fn primary(self) -> ScrollDirection {
        match self {
            Self::Vertical => ScrollDirection::Down,
            Self::Horizontal => ScrollDirection::Right,
        }
    }

    /// Direction tried second: backward along the scroll axis.
    pub fn secondary(self) -> ScrollDirection {
        match self {
            Self::Vertical => ScrollDirection::Up,
            Self::Horizontal => ScrollDirection::Left,
        }
    }
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vertical => write!(f, "Vertical"),
            Self::Horizontal => write!(f, "Horizontal"),
        }
    }
}

/// Direction the content moved between two frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrollDirection {
    Down,
    Up,
    Right,
    Left,
}

impl ScrollDirection {
    /// True for directions that reveal content past the trailing edge.
    pub fn is_forward(self) -> bool {
        matches!(self, Self::Down | Self::Right)
    }
}

impl std::fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Down => write!(f, "Down"),
            Self::Up => write!(f, "Up"),
            Self::Right => write!(f, "Right"),
            Self::Left => write!(f, "Left"),
        }
    }
}

/// Rectangle covered by the most recently placed frame, in canvas pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewportRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl ViewportRect {
    pub fn bottom(&self) -> usize {
        self.y + self.height
    }

    /// Swap axes when converting between scroll orientation and image
    /// orientation.
    pub(crate) fn oriented(self, mode: CaptureMode) -> Self {
        match mode {
            CaptureMode::Vertical => self,
            CaptureMode::Horizontal => Self {
                x: self.y,
                y: self.x,
                width: self.height,
                height: self.width,
            },
        }
    }
}
