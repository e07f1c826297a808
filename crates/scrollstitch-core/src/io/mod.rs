pub mod image_io;

pub use image_io::{load_frame, load_frames, save_image};
