pub mod image_export;
pub mod overlay_editor;
