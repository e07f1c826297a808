#![allow(dead_code)]

use image::{imageops, Rgb, RgbImage};
use scrollstitch_core::Frame;

/// SplitMix64 finalizer, used as a stateless pixel hash.
pub fn hash(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// High-texture synthetic page. Every row is distinct.
pub fn document(width: u32, height: u32, seed: u64) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let h = hash(seed.wrapping_mul(0x1000_0000_0000) ^ ((y as u64) << 20) ^ x as u64);
        Rgb([h as u8, (h >> 8) as u8, (h >> 16) as u8])
    })
}

/// Rows `top..top + height` of `page`, as a vertical capture.
pub fn rows(page: &RgbImage, top: u32, height: u32) -> Frame {
    Frame::from_rgb(imageops::crop_imm(page, 0, top, page.width(), height).to_image())
}

/// Columns `left..left + width` of `page`, as a horizontal capture.
pub fn columns(page: &RgbImage, left: u32, width: u32) -> Frame {
    Frame::from_rgb(imageops::crop_imm(page, left, 0, width, page.height()).to_image())
}

/// Horizontal bars of `period` rows (half dark, half light) with a weak
/// brightness ramp tied to the content, so frames shifted by one period
/// still differ pixel-wise.
pub fn stripes(width: u32, height: u32, period: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |_, y| {
        let base = if y % period < period / 2 { 40.0 } else { 200.0 };
        let v = (base + y as f32 * 0.1).round().min(255.0) as u8;
        Rgb([v, v, v])
    })
}

/// A capture with a static `header` over page rows `top..top + height - header`.
pub fn with_header(page: &RgbImage, header: &RgbImage, top: u32, height: u32) -> Frame {
    let header_rows = header.height();
    let mut out = RgbImage::new(page.width(), height);
    imageops::replace(&mut out, header, 0, 0);
    let content = imageops::crop_imm(page, 0, top, page.width(), height - header_rows).to_image();
    imageops::replace(&mut out, &content, 0, header_rows as i64);
    Frame::from_rgb(out)
}

/// Pixel-exact comparison of `image` against rows of `page`.
pub fn matches_rows(image: &RgbImage, page: &RgbImage, top: u32) -> bool {
    image.width() == page.width()
        && (0..image.height()).all(|y| (0..image.width()).all(|x| image.get_pixel(x, y) == page.get_pixel(x, top + y)))
}

/// A capture with a static `footer` under page rows `top..top + height - footer`.
pub fn with_footer(page: &RgbImage, footer: &RgbImage, top: u32, height: u32) -> Frame {
    let content_rows = height - footer.height();
    let mut out = RgbImage::new(page.width(), height);
    let content = imageops::crop_imm(page, 0, top, page.width(), content_rows).to_image();
    imageops::replace(&mut out, &content, 0, 0);
    imageops::replace(&mut out, footer, 0, content_rows as i64);
    Frame::from_rgb(out)
}

/// Rows `top..top + height` of `page` with `patch` pasted at (`x`, `y`).
pub fn patched(page: &RgbImage, top: u32, height: u32, patch: &RgbImage, x: u32, y: u32) -> Frame {
    let mut out = imageops::crop_imm(page, 0, top, page.width(), height).to_image();
    imageops::replace(&mut out, patch, x as i64, y as i64);
    Frame::from_rgb(out)
}

/// Black and white noise in which each pair of adjacent pixels holds one of
/// each, so every even-aligned span of a row has the same mean.
pub fn balanced(width: u32, height: u32, seed: u64) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let h = hash(seed.wrapping_mul(0x1000_0000_0000) ^ ((y as u64) << 20) ^ (x / 2) as u64);
        let v = if (h & 1 == 1) == (x % 2 == 0) { 255 } else { 0 };
        Rgb([v, v, v])
    })
}
