//! Text-overlay editing: positioned, styled text elements drawn over a base
//! image, with pointer-driven move/resize, alignment snapping and undo.

pub mod oe_history;
pub mod oe_interact;
pub mod oe_main;
pub mod oe_model;
pub mod oe_project;
pub mod oe_render;
pub mod oe_snap;
pub mod oe_text;

pub use oe_interact::Viewport;
pub use oe_main::OverlayEditor;
pub use oe_model::{ElementId, ElementPatch, ImageFilters, TextAlign, TextElement};
pub use oe_snap::Guide;
pub use oe_text::FontBook;
