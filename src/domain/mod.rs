//! Core data types shared across the store, blob, encoder, pipeline, executor
//! and worker modules.

mod cleanup;
mod job;
mod rendition;
mod result;

pub use cleanup::CleanupFailedMediaJob;
pub use job::{Item, ItemCommon, Job, MediaType};
pub use rendition::{select_renditions, Rendition, RENDITION_LADDER};
pub use result::{ItemResult, ProgressSnapshot, ProgressStatus};
