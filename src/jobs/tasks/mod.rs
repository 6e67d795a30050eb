pub mod image_resize;

pub use image_resize::{ImageResizeConfig, ImageResizeTask, ImageResizeWorker, ResizeArgs};
