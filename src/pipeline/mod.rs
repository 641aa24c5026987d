//! Image and Video Pipelines (spec.md §4.D, §4.E): per-item media
//! transformation, dispatched by the Job Executor.

mod image;
mod video;

pub use image::run_image_pipeline;
pub use video::{run_video_pipeline, synthesize_master_playlist};
