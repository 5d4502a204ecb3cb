//! Editor preferences.
//!
//! Stored as JSON at `<config dir>/overlay_editor/config.json`. A missing or
//! unreadable file yields the defaults, and every field carries a serde
//! default so files written by older builds keep loading.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Distance in image pixels within which a dragged box snaps to a guide.
    #[serde(default = "default_snap_threshold")]
    pub snap_threshold: f32,
    /// Side of the square around the bottom-right corner that starts a resize.
    #[serde(default = "default_handle_hit")]
    pub handle_hit: f32,
    /// Side of the drawn corner handles.
    #[serde(default = "default_handle_size")]
    pub handle_size: f32,
    /// Oldest history entries are dropped past this many. `None` keeps everything.
    #[serde(default)]
    pub history_limit: Option<usize>,
    /// Extra directory scanned for `.ttf` / `.otf` faces.
    #[serde(default)]
    pub font_dir: Option<PathBuf>,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_snap_threshold() -> f32 { 5.0 }
fn default_handle_hit() -> f32 { 18.0 }
fn default_handle_size() -> f32 { 8.0 }
fn default_jpeg_quality() -> u8 { 90 }

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            snap_threshold: default_snap_threshold(),
            handle_hit: default_handle_hit(),
            handle_size: default_handle_size(),
            history_limit: None,
            font_dir: None,
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl EditorConfig {
    pub fn load() -> Self {
        let path: PathBuf = Self::get_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) {
        let path: PathBuf = Self::get_config_path();
        if let Some(parent) = path.parent() { let _ = fs::create_dir_all(parent); }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, json) { tracing::warn!("Failed to write config {}: {}", path.display(), e); }
            }
            Err(e) => tracing::warn!("Failed to encode config: {}", e),
        }
    }

    fn get_config_path() -> PathBuf {
        let mut path: PathBuf = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("overlay_editor");
        path.push("config.json");
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config: EditorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EditorConfig::default());
        assert_eq!(config.snap_threshold, 5.0);
        assert_eq!(config.history_limit, None);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: EditorConfig = serde_json::from_str(r#"{"history_limit": 50, "handle_hit": 24.0}"#).unwrap();
        assert_eq!(config.history_limit, Some(50));
        assert_eq!(config.handle_hit, 24.0);
        assert_eq!(config.jpeg_quality, 90);
    }
}
