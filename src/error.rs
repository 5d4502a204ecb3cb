use thiserror::Error;

use crate::modules::overlay_editor::ElementId;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Project parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Project is missing the `{0}` field")]
    MissingField(&'static str),

    #[error("Invalid project: {0}")]
    Project(String),

    #[error("Duplicate element id {0}")]
    DuplicateId(ElementId),

    #[error("No image loaded")]
    NoImage,
}

pub type Result<T> = std::result::Result<T, EditorError>;
