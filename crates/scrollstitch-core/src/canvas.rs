//! Growable RGB canvas in scroll orientation.
//!
//! Rows run along the scroll axis. The backing buffer keeps headroom in
//! front of the first valid row so scrolling back above the start does not
//! move every stored row on each prepend.

use image::RgbImage;
use ndarray::{concatenate, s, Array2, Array3, ArrayView3, Axis};

use crate::consts::{CANVAS_GROWTH_DEN, CANVAS_GROWTH_NUM, MAX_CANVAS_DIMENSION};
use crate::error::{Result, StitchError};
use crate::frame::CaptureMode;
use crate::preprocess::luminance;

#[derive(Clone, Debug)]
pub struct StitchedCanvas {
    /// Backing storage, shape = (capacity, cross, 3).
    data: Array3<u8>,
    /// Index of the first valid row in `data`.
    origin: usize,
    valid_len: usize,
}

impl Default for StitchedCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl StitchedCanvas {
    pub fn new() -> Self {
        Self {
            data: Array3::zeros((0, 0, 3)),
            origin: 0,
            valid_len: 0,
        }
    }

    /// Rows along the scroll axis.
    pub fn len(&self) -> usize {
        self.valid_len
    }

    pub fn is_empty(&self) -> bool {
        self.valid_len == 0
    }

    /// Pixels across the scroll axis.
    pub fn cross(&self) -> usize {
        self.data.dim().1
    }

    pub fn capacity(&self) -> usize {
        self.data.dim().0
    }

    /// Replace the contents with `rows`.
    pub fn seed(&mut self, rows: ArrayView3<'_, u8>) -> Result<()> {
        let (len, cross, _) = rows.dim();
        self.data = allocate(len, cross)?;
        self.data.slice_mut(s![..len, .., ..]).assign(&rows);
        self.origin = 0;
        self.valid_len = len;
        Ok(())
    }

    /// Add `rows` after the last valid row.
    pub fn append(&mut self, rows: ArrayView3<'_, u8>) -> Result<()> {
        let n = rows.dim().0;
        self.reserve(0, n)?;
        let end = self.origin + self.valid_len;
        self.data.slice_mut(s![end..end + n, .., ..]).assign(&rows);
        self.valid_len += n;
        Ok(())
    }

    /// Add `rows` before the first valid row.
    pub fn prepend(&mut self, rows: ArrayView3<'_, u8>) -> Result<()> {
        let n = rows.dim().0;
        self.reserve(n, 0)?;
        self.origin -= n;
        let origin = self.origin;
        self.data.slice_mut(s![origin..origin + n, .., ..]).assign(&rows);
        self.valid_len += n;
        Ok(())
    }

    /// Drop `n` rows from the end.
    pub fn truncate(&mut self, n: usize) {
        self.valid_len -= n.min(self.valid_len);
    }

    /// Drop `n` rows from the start.
    pub fn drop_leading(&mut self, n: usize) {
        let n = n.min(self.valid_len);
        self.origin += n;
        self.valid_len -= n;
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// All valid rows.
    pub fn view(&self) -> ArrayView3<'_, u8> {
        self.rows(0, self.valid_len)
    }

    /// Valid rows `start..end`, clamped to the canvas.
    pub fn rows(&self, start: usize, end: usize) -> ArrayView3<'_, u8> {
        let end = end.min(self.valid_len);
        let start = start.min(end);
        self.data
            .slice(s![self.origin + start..self.origin + end, .., ..])
    }

    /// Grayscale copy of rows `start..end`.
    pub fn gray_rows(&self, start: usize, end: usize) -> Array2<f32> {
        to_gray(self.rows(start, end))
    }

    /// Make room for `front` extra rows before and `back` extra rows after
    /// the valid range, reallocating with geometric growth when needed.
    fn reserve(&mut self, front: usize, back: usize) -> Result<()> {
        let cross = self.cross();
        if self.origin >= front && self.origin + self.valid_len + back <= self.capacity() {
            return Ok(());
        }

        let needed = self.valid_len + front + back;
        let grown = self.capacity() * CANVAS_GROWTH_NUM / CANVAS_GROWTH_DEN;
        let capacity = grown.max(needed).min(MAX_CANVAS_DIMENSION.max(needed));
        let slack = capacity - needed;
        let origin = if front > 0 { front + slack / 2 } else { 0 };

        let mut data = allocate(capacity, cross)?;
        data.slice_mut(s![origin..origin + self.valid_len, .., ..])
            .assign(&self.view());
        self.data = data;
        self.origin = origin;
        Ok(())
    }
}

fn allocate(rows: usize, cross: usize) -> Result<Array3<u8>> {
    let bytes = rows * cross * 3;
    let mut buffer: Vec<u8> = Vec::new();
    buffer
        .try_reserve_exact(bytes)
        .map_err(|_| StitchError::Allocation { bytes })?;
    buffer.resize(bytes, 0);
    Array3::from_shape_vec((rows, cross, 3), buffer).map_err(|_| StitchError::InvalidDimensions {
        width: cross as u32,
        height: rows as u32,
    })
}

/// Grayscale in [0.0, 1.0] of an RGB block.
pub(crate) fn to_gray(rows: ArrayView3<'_, u8>) -> Array2<f32> {
    let (n, cross, _) = rows.dim();
    Array2::from_shape_fn((n, cross), |(r, c)| {
        luminance(rows[[r, c, 0]], rows[[r, c, 1]], rows[[r, c, 2]])
    })
}

/// Concatenate scroll-oriented parts and convert back to image orientation.
pub(crate) fn compose_image(parts: &[ArrayView3<'_, u8>], mode: CaptureMode) -> Result<RgbImage> {
    let parts: Vec<ArrayView3<'_, u8>> = parts.iter().filter(|p| p.dim().0 > 0).cloned().collect();
    if parts.is_empty() {
        return Err(StitchError::EmptySequence);
    }
    let joined = concatenate(Axis(0), &parts).map_err(|_| StitchError::InvalidDimensions {
        width: parts[0].dim().1 as u32,
        height: parts.iter().map(|p| p.dim().0).sum::<usize>() as u32,
    })?;

    let (axis, cross, _) = joined.dim();
    let (width, height, raw): (usize, usize, Vec<u8>) = match mode {
        CaptureMode::Vertical => (cross, axis, joined.iter().copied().collect()),
        CaptureMode::Horizontal => (
            axis,
            cross,
            joined.permuted_axes([1, 0, 2]).iter().copied().collect(),
        ),
    };
    RgbImage::from_raw(width as u32, height as u32, raw).ok_or(StitchError::InvalidDimensions {
        width: width as u32,
        height: height as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(rows: usize, cross: usize, value: u8) -> Array3<u8> {
        Array3::from_elem((rows, cross, 3), value)
    }

    #[test]
    fn append_and_prepend_keep_order() {
        let mut canvas = StitchedCanvas::new();
        canvas.seed(block(4, 3, 10).view()).unwrap();
        canvas.append(block(2, 3, 20).view()).unwrap();
        canvas.prepend(block(3, 3, 5).view()).unwrap();

        assert_eq!(canvas.len(), 9);
        let column: Vec<u8> = canvas.view().slice(s![.., 0, 0]).to_vec();
        assert_eq!(column, vec![5, 5, 5, 10, 10, 10, 10, 20, 20]);
    }

    #[test]
    fn prepend_reuses_headroom() {
        let mut canvas = StitchedCanvas::new();
        canvas.seed(block(10, 2, 1).view()).unwrap();
        canvas.prepend(block(2, 2, 2).view()).unwrap();
        let capacity = canvas.capacity();
        canvas.prepend(block(1, 2, 3).view()).unwrap();
        assert_eq!(canvas.capacity(), capacity);
        assert_eq!(canvas.view()[[0, 0, 0]], 3);
    }

    #[test]
    fn truncate_and_drop_leading_shrink_the_valid_range() {
        let mut canvas = StitchedCanvas::new();
        canvas.seed(block(4, 2, 1).view()).unwrap();
        canvas.append(block(3, 2, 2).view()).unwrap();
        canvas.prepend(block(2, 2, 0).view()).unwrap();
        canvas.truncate(3);
        canvas.drop_leading(2);
        assert_eq!(canvas.len(), 4);
        assert!(canvas.view().iter().all(|&v| v == 1));
    }

    #[test]
    fn horizontal_image_is_transposed_back() {
        let mut rows = block(5, 2, 0);
        rows[[4, 1, 0]] = 255;
        let image = compose_image(&[rows.view()], CaptureMode::Horizontal).unwrap();
        assert_eq!((image.width(), image.height()), (5, 2));
        assert_eq!(image.get_pixel(4, 1).0[0], 255);
    }

    #[test]
    fn parts_are_stacked_along_the_scroll_axis() {
        let image = compose_image(&[block(2, 3, 7).view(), block(4, 3, 9).view()], CaptureMode::Vertical).unwrap();
        assert_eq!((image.width(), image.height()), (3, 6));
        assert_eq!(image.get_pixel(0, 1).0, [7, 7, 7]);
        assert_eq!(image.get_pixel(2, 5).0, [9, 9, 9]);
    }
}
