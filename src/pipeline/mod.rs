//! From image files on disk to completed transfers.

pub mod collaborators;
pub mod companion;
pub mod image_pipeline;
