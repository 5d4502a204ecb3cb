use ab_glyph::{Font as AbFont, FontVec, GlyphId, PxScale, ScaleFont};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::EditorConfig;

/// Average advance used when no face is available, as a fraction of the font size.
const FALLBACK_ADVANCE: f32 = 0.58;
const SCAN_DEPTH: usize = 4;

const SYSTEM_FONT_DIRS: &[&str] = &[
    "/usr/share/fonts",
    "/usr/local/share/fonts",
    "/Library/Fonts",
    "/System/Library/Fonts",
    "C:\\Windows\\Fonts",
];

/// Families tried, in order, when a requested family is not installed.
const PREFERRED_FALLBACKS: &[&str] = &["arial", "helvetica", "liberationsans", "dejavusans", "roboto", "ubuntu", "notosans"];

/// Glyph metrics and coverage for the renderer.
pub trait FontSource {
    /// Width of `text` laid out on one line.
    fn measure(&self, family: &str, size: f32, text: &str) -> f32;
    /// Rasterizes one line whose top-left is (0, 0) with the baseline at the
    /// face's ascent, reporting `(x, y, coverage)`.
    fn draw_line(&self, family: &str, size: f32, text: &str, plot: &mut dyn FnMut(i32, i32, f32));
    fn families(&self) -> Vec<String> { Vec::new() }
}

/// Greedy word wrap. Words are never split; a word wider than `max_width`
/// gets a line of its own. Explicit newlines always break.
pub fn wrap_lines(fonts: &dyn FontSource, family: &str, size: f32, text: &str, max_width: f32) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.split('\n') {
        let mut line: String = String::new();
        for word in paragraph.split_whitespace() {
            if line.is_empty() { line.push_str(word); continue; }
            let candidate: String = format!("{} {}", line, word);
            if fonts.measure(family, size, &candidate) > max_width {
                lines.push(std::mem::replace(&mut line, word.to_string()));
            } else {
                line = candidate;
            }
        }
        lines.push(line);
    }
    lines
}

fn normalize(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii_alphanumeric()).map(|c| c.to_ascii_lowercase()).collect()
}

/// Faces discovered on disk, keyed by normalized file stem and parsed on first use.
pub struct FontBook {
    paths: Vec<(String, PathBuf)>,
    loaded: RefCell<HashMap<String, Option<FontVec>>>,
    warned: Cell<bool>,
}

impl FontBook {
    pub fn empty() -> Self {
        Self { paths: Vec::new(), loaded: RefCell::new(HashMap::new()), warned: Cell::new(false) }
    }

    pub fn load(config: &EditorConfig) -> Self {
        let mut book: FontBook = Self::empty();
        let mut dirs_to_scan: Vec<PathBuf> = Vec::new();
        if let Some(dir) = &config.font_dir { dirs_to_scan.push(dir.clone()); }
        if let Some(dir) = dirs::font_dir() { dirs_to_scan.push(dir); }
        dirs_to_scan.extend(SYSTEM_FONT_DIRS.iter().map(PathBuf::from));

        for dir in dirs_to_scan.iter().filter(|d| d.is_dir()) {
            let count: usize = book.index_dir(dir);
            tracing::debug!("Indexed {} font file(s) in {}", count, dir.display());
        }
        tracing::info!("Font book ready with {} face(s)", book.paths.len());
        book
    }

    /// Records every `.ttf` / `.otf` below `dir`. Returns how many were added.
    pub fn index_dir(&mut self, dir: &Path) -> usize {
        let before: usize = self.paths.len();
        for entry in WalkDir::new(dir).max_depth(SCAN_DEPTH).into_iter().filter_map(|e| e.ok()) {
            let path: &Path = entry.path();
            let is_font: bool = path.extension().and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("ttf") || e.eq_ignore_ascii_case("otf"))
                .unwrap_or(false);
            if !is_font { continue; }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let key: String = normalize(stem);
            if self.paths.iter().any(|(k, _)| *k == key) { continue; }
            self.paths.push((key, path.to_path_buf()));
        }
        self.paths.len() - before
    }

    fn is_broken(&self, key: &str) -> bool {
        matches!(self.loaded.borrow().get(key), Some(None))
    }

    /// Picks the face for `family`, skipping faces that already failed to parse.
    fn resolve_key(&self, family: &str) -> Option<&str> {
        let wanted: String = normalize(family);
        let usable = move || self.paths.iter().filter(move |(k, _)| !self.is_broken(k));
        let exact = usable().find(|(k, _)| *k == wanted);
        let regular = || usable().find(|(k, _)| *k == format!("{}regular", wanted));
        let prefixed = || usable().filter(|(k, _)| !wanted.is_empty() && k.starts_with(&wanted)).min_by_key(|(k, _)| k.len());
        let fallback = || PREFERRED_FALLBACKS.iter()
            .find_map(|f| usable().find(|(k, _)| k.as_str() == *f || *k == format!("{}regular", f)))
            .or_else(|| usable().next());
        exact.or_else(regular).or_else(prefixed).or_else(fallback).map(|(k, _)| k.as_str())
    }

    /// Parses `key` on first use. False once the face is known to be unreadable.
    fn parse_face(&self, key: &str) -> bool {
        if !self.loaded.borrow().contains_key(key) {
            let parsed: Option<FontVec> = self.paths.iter().find(|(k, _)| k == key)
                .and_then(|(_, path)| match fs::read(path) {
                    Ok(bytes) => FontVec::try_from_vec(bytes).map_err(|e| tracing::warn!("Failed to parse font {}: {}", path.display(), e)).ok(),
                    Err(e) => { tracing::warn!("Failed to read font {}: {}", path.display(), e); None }
                });
            self.loaded.borrow_mut().insert(key.to_string(), parsed);
        }
        !self.is_broken(key)
    }

    /// Runs `f` with the face for `family`, parsing it from disk if needed.
    fn with_face<R>(&self, family: &str, f: impl FnOnce(&FontVec) -> R) -> Option<R> {
        let key: String = loop {
            let key: String = self.resolve_key(family)?.to_string();
            if self.parse_face(&key) { break key; }
        };
        let loaded = self.loaded.borrow();
        loaded.get(&key).and_then(|face| face.as_ref()).map(f)
    }

    fn warn_missing(&self) {
        if !self.warned.replace(true) { tracing::warn!("No usable font face found; text is measured approximately and not drawn"); }
    }
}

impl FontSource for FontBook {
    fn measure(&self, family: &str, size: f32, text: &str) -> f32 {
        self.with_face(family, |font| {
            let scaled = font.as_scaled(PxScale::from(size));
            let mut width: f32 = 0.0;
            let mut prev: Option<GlyphId> = None;
            for ch in text.chars() {
                let gid: GlyphId = font.glyph_id(ch);
                if let Some(p) = prev { width += scaled.kern(p, gid); }
                width += scaled.h_advance(gid);
                prev = Some(gid);
            }
            width
        }).unwrap_or_else(|| text.chars().count() as f32 * size * FALLBACK_ADVANCE)
    }

    fn draw_line(&self, family: &str, size: f32, text: &str, plot: &mut dyn FnMut(i32, i32, f32)) {
        let drawn: Option<()> = self.with_face(family, |font| {
            let scale: PxScale = PxScale::from(size);
            let scaled = font.as_scaled(scale);
            let baseline: f32 = scaled.ascent();
            let mut caret: f32 = 0.0;
            let mut prev: Option<GlyphId> = None;
            for ch in text.chars() {
                let gid: GlyphId = font.glyph_id(ch);
                if let Some(p) = prev { caret += scaled.kern(p, gid); }
                let glyph: ab_glyph::Glyph = gid.with_scale_and_position(scale, ab_glyph::point(caret, baseline));
                if let Some(outlined) = font.outline_glyph(glyph) {
                    let bounds: ab_glyph::Rect = outlined.px_bounds();
                    outlined.draw(|gx, gy, cov| plot(bounds.min.x as i32 + gx as i32, bounds.min.y as i32 + gy as i32, cov));
                }
                caret += scaled.h_advance(gid);
                prev = Some(gid);
            }
        });
        if drawn.is_none() && !text.is_empty() { self.warn_missing(); }
    }

    fn families(&self) -> Vec<String> {
        let mut names: Vec<String> = self.paths.iter()
            .map(|(k, path)| path.file_stem().and_then(|s| s.to_str()).unwrap_or(k).to_string())
            .collect();
        names.sort_by_key(|n| n.to_lowercase());
        names
    }
}

/// Deterministic stand-in: every char advances half the size, and every
/// non-space char is a solid block from 20% of the size down to the size.
#[cfg(test)]
pub(crate) struct BlockFont;

#[cfg(test)]
impl FontSource for BlockFont {
    fn measure(&self, _family: &str, size: f32, text: &str) -> f32 { text.chars().count() as f32 * size * 0.5 }
    fn draw_line(&self, _family: &str, size: f32, text: &str, plot: &mut dyn FnMut(i32, i32, f32)) {
        let adv: f32 = size * 0.5;
        for (i, ch) in text.chars().enumerate() {
            if ch.is_whitespace() { continue; }
            let x0: i32 = (i as f32 * adv) as i32 + 1;
            let x1: i32 = ((i + 1) as f32 * adv) as i32 - 1;
            for y in (size * 0.2) as i32..size as i32 {
                for x in x0..x1 { plot(x, y, 1.0); }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_greedily() {
        // 10px per char at size 20
        let lines: Vec<String> = wrap_lines(&BlockFont, "any", 20.0, "aaa bbb ccc dddd", 80.0);
        assert_eq!(lines, vec!["aaa bbb", "ccc dddd"]);
    }

    #[test]
    fn long_word_gets_its_own_line() {
        let lines: Vec<String> = wrap_lines(&BlockFont, "any", 20.0, "hi extraordinarily ok", 60.0);
        assert_eq!(lines, vec!["hi", "extraordinarily", "ok"]);
        assert!(BlockFont.measure("any", 20.0, &lines[1]) > 60.0);
    }

    #[test]
    fn newlines_split_paragraphs() {
        let lines: Vec<String> = wrap_lines(&BlockFont, "any", 20.0, "one\n\ntwo", 500.0);
        assert_eq!(lines, vec!["one", "", "two"]);
        assert_eq!(wrap_lines(&BlockFont, "any", 20.0, "", 500.0), vec![String::new()]);
    }

    #[test]
    fn empty_book_falls_back_to_estimate() {
        let book: FontBook = FontBook::empty();
        assert!((book.measure("Arial", 10.0, "abcd") - 4.0 * 10.0 * FALLBACK_ADVANCE).abs() < 1e-4);
        let mut plotted: usize = 0;
        book.draw_line("Arial", 10.0, "abcd", &mut |_, _, _| plotted += 1);
        assert_eq!(plotted, 0);
    }

    #[test]
    fn unreadable_face_falls_back() {
        let dir: PathBuf = std::env::temp_dir().join(format!("overlay_fonts_{}", std::process::id()));
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("nested").join("Broken Sans.ttf"), [0u8, 1, 2, 3]).unwrap();
        fs::write(dir.join("notes.txt"), "not a font").unwrap();

        let mut book: FontBook = FontBook::empty();
        assert_eq!(book.index_dir(&dir), 1);
        assert_eq!(book.families(), vec!["Broken Sans".to_string()]);
        assert!((book.measure("Broken Sans", 10.0, "ab") - 2.0 * 10.0 * FALLBACK_ADVANCE).abs() < 1e-4);
        assert_eq!(book.index_dir(&dir), 0);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn broken_faces_are_skipped_when_resolving() {
        let dir: PathBuf = std::env::temp_dir().join(format!("overlay_fonts_skip_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("first.ttf"), [9u8; 16]).unwrap();

        let mut book: FontBook = FontBook::empty();
        book.paths = vec![
            ("first".to_string(), dir.join("first.ttf")),
            ("second".to_string(), dir.join("second.ttf")),
        ];
        assert_eq!(book.resolve_key("Unknown"), Some("first"));
        assert!(!book.parse_face("first"));
        assert_eq!(book.resolve_key("Unknown"), Some("second"));
        assert_eq!(book.resolve_key("First"), Some("second"));

        // every candidate is tried before giving up
        assert!((book.measure("Unknown", 10.0, "ab") - 2.0 * 10.0 * FALLBACK_ADVANCE).abs() < 1e-4);
        assert!(book.is_broken("second"));
        assert_eq!(book.resolve_key("Unknown"), None);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn normalizes_family_names() {
        assert_eq!(normalize("DejaVu Sans-Bold"), "dejavusansbold");
    }
}
