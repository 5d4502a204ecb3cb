use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{EditorError, Result};
use super::oe_model::{EditorState, ElementId};

const ELEMENTS_FIELD: &str = "textElements";
const FILTERS_FIELD: &str = "imageFilters";

pub fn encode_project(state: &EditorState) -> Result<String> {
    Ok(serde_json::to_string_pretty(state)?)
}

/// Parses a project document. Both top-level fields must be present; ids
/// must be unique, every box must have a positive size and every number
/// must be finite and in range.
pub fn decode_project(text: &str) -> Result<EditorState> {
    let doc: Value = serde_json::from_str(text)?;
    let Some(obj) = doc.as_object() else {
        return Err(EditorError::Project("top level is not an object".to_string()));
    };
    for field in [ELEMENTS_FIELD, FILTERS_FIELD] {
        if !obj.contains_key(field) { return Err(EditorError::MissingField(field)); }
    }

    let state: EditorState = serde_json::from_value(doc)?;
    let mut seen: HashSet<ElementId> = HashSet::new();
    for el in &state.elements {
        if !seen.insert(el.id) { return Err(EditorError::DuplicateId(el.id)); }
        if !(el.width > 0.0 && el.height > 0.0 && el.size > 0.0) {
            return Err(EditorError::Project(format!("element {} has a non-positive size", el.id)));
        }
        if let Some(field) = el.out_of_range() {
            return Err(EditorError::Project(format!("element {} has an out-of-range {}", el.id, field)));
        }
    }
    Ok(state)
}

pub fn read_project(path: &Path) -> Result<EditorState> {
    let text: String = fs::read_to_string(path)?;
    let state: EditorState = decode_project(&text)?;
    tracing::info!("Loaded project {} with {} element(s)", path.display(), state.elements.len());
    Ok(state)
}

pub fn write_project(path: &Path, state: &EditorState) -> Result<()> {
    fs::write(path, encode_project(state)?)?;
    tracing::info!("Saved project {}", path.display());
    Ok(())
}
