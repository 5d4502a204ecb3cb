use eframe::egui;
use image::RgbaImage;
use std::path::Path;

use crate::config::EditorConfig;
use crate::error::{EditorError, Result};
use crate::modules::image_export::{export_image, ExportFormat};
use super::oe_history::HistoryLog;
use super::oe_interact::{snap_rotation, InteractionController, Viewport};
use super::oe_model::{
    add_element, find_element, next_element_id, remove_element, update_element,
    EditorState, ElementId, ElementPatch, ImageFilters, TextElement,
};
use super::oe_project::{read_project, write_project};
use super::oe_render::Renderer;
use super::oe_snap::Guide;
use super::oe_text::FontSource;

/// One editing session: the base image, the editable state and its history,
/// the selection, and the rendered surface. Every mutation re-renders before
/// returning, and bumps [`OverlayEditor::revision`] so the shell knows to
/// re-upload its texture.
pub struct OverlayEditor {
    image: Option<RgbaImage>,
    surface: RgbaImage,
    state: EditorState,
    active: Option<ElementId>,
    history: HistoryLog,
    interaction: InteractionController,
    fonts: Box<dyn FontSource>,
    config: EditorConfig,
    revision: u64,
}

impl OverlayEditor {
    pub fn new(config: EditorConfig, fonts: Box<dyn FontSource>) -> Self {
        let state: EditorState = EditorState::default();
        Self {
            image: None,
            surface: RgbaImage::new(1, 1),
            history: HistoryLog::with_limit(state.clone(), config.history_limit),
            interaction: InteractionController::from_config(&config),
            state,
            active: None,
            fonts,
            config,
            revision: 0,
        }
    }

    pub fn image(&self) -> Option<&RgbaImage> { self.image.as_ref() }
    pub fn surface(&self) -> &RgbaImage { &self.surface }
    pub fn state(&self) -> &EditorState { &self.state }
    pub fn elements(&self) -> &[TextElement] { &self.state.elements }
    pub fn filters(&self) -> &ImageFilters { &self.state.filters }
    pub fn active(&self) -> Option<ElementId> { self.active }
    pub fn active_element(&self) -> Option<&TextElement> { self.active.and_then(|id| find_element(&self.state.elements, id)) }
    pub fn guides(&self) -> &[Guide] { self.interaction.guides() }
    pub fn revision(&self) -> u64 { self.revision }
    pub fn can_undo(&self) -> bool { self.history.can_undo() }
    pub fn can_redo(&self) -> bool { self.history.can_redo() }
    pub fn config(&self) -> &EditorConfig { &self.config }

    pub fn font_families(&self) -> Vec<String> { self.fonts.families() }

    /// Swaps the base image. Elements and filters stay; history restarts from here.
    pub fn load_image(&mut self, image: RgbaImage) {
        tracing::info!("Loaded base image {}x{}", image.width(), image.height());
        self.image = Some(image);
        self.active = None;
        self.interaction.cancel();
        self.history.reset(self.state.clone());
        self.render();
    }

    pub fn open_image(&mut self, path: &Path) -> Result<()> {
        let image: RgbaImage = image::open(path)?.to_rgba8();
        self.load_image(image);
        Ok(())
    }

    /// Appends a default element on top, selects it and commits.
    pub fn add_text(&mut self) -> ElementId {
        let (elements, id) = add_element(&self.state.elements, TextElement::new(next_element_id(&self.state.elements)));
        self.state.elements = elements;
        self.active = Some(id);
        self.commit();
        id
    }

    /// Removes the selected element. Nothing selected is a no-op.
    pub fn delete_active(&mut self) -> bool {
        let Some(id) = self.active_element().map(|el| el.id) else { return false };
        self.state.elements = remove_element(&self.state.elements, id);
        self.active = None;
        self.interaction.cancel();
        self.commit();
        true
    }

    /// Changes the selection. Unknown ids deselect.
    pub fn select(&mut self, id: Option<ElementId>) {
        let next: Option<ElementId> = id.filter(|id| find_element(&self.state.elements, *id).is_some());
        if next != self.active {
            self.active = next;
            self.render();
        }
    }

    /// Live edit of the selected element, not committed.
    pub fn edit_active(&mut self, patch: &ElementPatch) -> bool {
        let Some(id) = self.active_element().map(|el| el.id) else { return false };
        self.state.elements = update_element(&self.state.elements, id, patch);
        self.render();
        true
    }

    /// Edit of the selected element that is committed straight away.
    pub fn apply_active(&mut self, patch: &ElementPatch) -> bool {
        if !self.edit_active(patch) { return false; }
        self.commit();
        true
    }

    pub fn set_filters_live(&mut self, filters: ImageFilters) {
        self.state.filters = filters.clamped();
        self.render();
    }

    pub fn set_rotation_live(&mut self, deg: f32) -> bool { self.edit_active(&ElementPatch::rotation(deg)) }

    /// Snaps the selected element's rotation to a nearby stop and commits.
    pub fn release_rotation(&mut self) -> bool {
        let Some(current) = self.active_element().map(|el| el.rotation) else { return false };
        self.apply_active(&ElementPatch::rotation(snap_rotation(current)))
    }

    /// Records the live state as a history entry, unless nothing changed
    /// since the entry under the cursor.
    pub fn commit(&mut self) {
        if self.history.current() != Some(&self.state) {
            self.history.commit(self.state.clone());
        }
        self.render();
    }

    pub fn undo(&mut self) -> bool {
        self.interaction.cancel();
        let Some(state) = self.history.undo().cloned() else { return false };
        self.restore(state);
        true
    }

    pub fn redo(&mut self) -> bool {
        self.interaction.cancel();
        let Some(state) = self.history.redo().cloned() else { return false };
        self.restore(state);
        true
    }

    fn restore(&mut self, state: EditorState) {
        self.state = state;
        if self.active_element().is_none() { self.active = None; }
        self.render();
    }

    fn canvas_size(&self) -> Option<(f32, f32)> {
        self.image.as_ref().map(|img| (img.width() as f32, img.height() as f32))
    }

    /// Pointer pressed at device point `p`. Returns the element now selected.
    pub fn pointer_down(&mut self, p: egui::Pos2, viewport: &Viewport) -> Option<ElementId> {
        self.canvas_size()?;
        let hit: Option<ElementId> = self.interaction.pointer_down(&self.state.elements, viewport.to_image(p));
        self.select(hit);
        hit
    }

    pub fn pointer_move(&mut self, p: egui::Pos2, viewport: &Viewport) {
        let Some(canvas) = self.canvas_size() else { return };
        let Some((id, geometry)) = self.interaction.pointer_move(&self.state.elements, canvas, viewport.to_image(p)) else { return };
        self.state.elements = update_element(&self.state.elements, id, &ElementPatch::geometry(geometry));
        self.render();
    }

    pub fn pointer_up(&mut self) {
        if self.interaction.pointer_up() { self.commit(); }
    }

    pub fn pointer_leave(&mut self) { self.pointer_up(); }

    /// The composite without any selection affordance.
    pub fn export(&self) -> Result<RgbaImage> {
        let image: &RgbaImage = self.image.as_ref().ok_or(EditorError::NoImage)?;
        let mut out: RgbaImage = RgbaImage::new(image.width(), image.height());
        Renderer::new(self.fonts.as_ref(), self.config.handle_size)
            .render(&mut out, Some(image), &self.state.filters, &self.state.elements, None);
        Ok(out)
    }

    /// Writes the export to `path`, picking the format from the extension
    /// unless one is given.
    pub fn export_to(&self, path: &Path, format: Option<ExportFormat>) -> Result<()> {
        let format: ExportFormat = format.or_else(|| ExportFormat::from_path(path)).unwrap_or(ExportFormat::Png);
        export_image(&self.export()?, path, format, self.config.jpeg_quality)
    }

    pub fn save_project(&self, path: &Path) -> Result<()> { write_project(path, &self.state) }

    /// Replaces the editable state from a project file. On any error the
    /// current state is left exactly as it was.
    pub fn load_project(&mut self, path: &Path) -> Result<()> {
        let state: EditorState = read_project(path)?;
        self.state = state;
        self.active = None;
        self.interaction.cancel();
        self.history.reset(self.state.clone());
        self.render();
        Ok(())
    }

    fn render(&mut self) {
        let renderer: Renderer = Renderer::new(self.fonts.as_ref(), self.config.handle_size);
        renderer.render(&mut self.surface, self.image.as_ref(), &self.state.filters, &self.state.elements, self.active);
        self.revision = self.revision.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::overlay_editor::oe_render::SELECTION_COLOR;
    use crate::modules::overlay_editor::oe_text::BlockFont;
    use image::Rgba;
    use std::path::PathBuf;

    fn editor() -> OverlayEditor {
        let mut ed: OverlayEditor = OverlayEditor::new(EditorConfig::default(), Box::new(BlockFont));
        ed.load_image(RgbaImage::from_pixel(800, 600, Rgba([40, 40, 40, 255])));
        ed
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("overlay_session_{}_{}", std::process::id(), name))
    }

    #[test]
    fn drag_undo_redo_delete() {
        let mut ed: OverlayEditor = editor();
        let vp: Viewport = Viewport::identity(800.0, 600.0);
        let id: ElementId = ed.add_text();
        ed.apply_active(&ElementPatch::text("Hello World"));
        let el: &TextElement = ed.active_element().unwrap();
        assert_eq!((el.x, el.y, el.width, el.height), (50.0, 50.0, 400.0, 60.0));

        assert_eq!(ed.pointer_down(egui::pos2(100.0, 70.0), &vp), Some(id));
        ed.pointer_move(egui::pos2(110.0, 80.0), &vp);
        ed.pointer_up();
        assert_eq!(ed.elements()[0].geometry().center(), (260.0, 90.0));

        assert!(ed.undo());
        assert_eq!((ed.elements()[0].x, ed.elements()[0].y), (50.0, 50.0));
        assert!(ed.redo());
        assert_eq!((ed.elements()[0].x, ed.elements()[0].y), (60.0, 60.0));

        assert!(ed.delete_active());
        assert!(ed.elements().is_empty());
        assert_eq!(ed.active(), None);
        assert!(!ed.delete_active());
    }

    #[test]
    fn pointer_respects_display_scale() {
        let mut ed: OverlayEditor = editor();
        ed.add_text();
        let half: Viewport = Viewport {
            rect: egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(400.0, 300.0)),
            image_size: egui::vec2(800.0, 600.0),
        };
        assert!(ed.pointer_down(egui::pos2(50.0, 35.0), &half).is_some());
        ed.pointer_move(egui::pos2(55.0, 40.0), &half);
        ed.pointer_leave();
        assert_eq!((ed.elements()[0].x, ed.elements()[0].y), (60.0, 60.0));
    }

    #[test]
    fn clicking_empty_canvas_deselects_without_commit() {
        let mut ed: OverlayEditor = editor();
        ed.add_text();
        let entries: usize = ed.history.len();
        assert_eq!(ed.pointer_down(egui::pos2(700.0, 500.0), &Viewport::identity(800.0, 600.0)), None);
        ed.pointer_up();
        assert_eq!(ed.active(), None);
        assert_eq!(ed.history.len(), entries);
    }

    #[test]
    fn live_edits_commit_only_when_asked() {
        let mut ed: OverlayEditor = editor();
        ed.add_text();
        let entries: usize = ed.history.len();
        ed.set_filters_live(ImageFilters { brightness: 150.0, ..Default::default() });
        ed.edit_active(&ElementPatch::text("typing"));
        assert_eq!(ed.history.len(), entries);
        ed.commit();
        assert_eq!(ed.history.len(), entries + 1);
        ed.commit();
        assert_eq!(ed.history.len(), entries + 1);
        assert!(ed.undo());
        assert_eq!(ed.filters().brightness, 100.0);
    }

    #[test]
    fn rotation_release_snaps_and_commits() {
        let mut ed: OverlayEditor = editor();
        ed.add_text();
        ed.set_rotation_live(60.0);
        ed.set_rotation_live(88.0);
        assert!(ed.release_rotation());
        assert_eq!(ed.active_element().map(|e| e.rotation), Some(90.0));
        ed.undo();
        assert_eq!(ed.active_element().map(|e| e.rotation), Some(0.0));

        ed.set_rotation_live(80.0);
        ed.release_rotation();
        assert_eq!(ed.active_element().map(|e| e.rotation), Some(80.0));
    }

    #[test]
    fn undo_drops_stale_selection() {
        let mut ed: OverlayEditor = editor();
        ed.add_text();
        assert!(ed.active().is_some());
        ed.undo();
        assert!(ed.elements().is_empty());
        assert_eq!(ed.active(), None);
        assert!(!ed.set_rotation_live(10.0));
    }

    #[test]
    fn export_has_no_selection() {
        let mut ed: OverlayEditor = editor();
        ed.add_text();
        let accent: Rgba<u8> = Rgba(SELECTION_COLOR.to_array());
        assert_eq!(*ed.surface().get_pixel(50, 50), accent);
        let out: RgbaImage = ed.export().unwrap();
        assert_ne!(*out.get_pixel(50, 50), accent);

        let path: PathBuf = temp_path("export.png");
        ed.export_to(&path, None).unwrap();
        assert_eq!(image::open(&path).unwrap().to_rgba8(), out);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn export_without_image_fails() {
        let ed: OverlayEditor = OverlayEditor::new(EditorConfig::default(), Box::new(BlockFont));
        assert!(matches!(ed.export(), Err(EditorError::NoImage)));
    }

    #[test]
    fn bad_project_leaves_state_alone() {
        let mut ed: OverlayEditor = editor();
        ed.add_text();
        let before: EditorState = ed.state().clone();
        let path: PathBuf = temp_path("bad.json");
        std::fs::write(&path, r#"{"textElements": []}"#).unwrap();
        assert!(matches!(ed.load_project(&path), Err(EditorError::MissingField("imageFilters"))));
        assert_eq!(ed.state(), &before);
        assert!(ed.active().is_some());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn project_load_resets_history() {
        let mut ed: OverlayEditor = editor();
        ed.add_text();
        ed.apply_active(&ElementPatch::text("saved"));
        let path: PathBuf = temp_path("good.json");
        ed.save_project(&path).unwrap();

        let mut other: OverlayEditor = editor();
        other.load_project(&path).unwrap();
        assert_eq!(other.state(), ed.state());
        assert!(!other.can_undo() && !other.can_redo());
        assert_eq!(other.active(), None);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn new_image_keeps_elements_and_restarts_history() {
        let mut ed: OverlayEditor = editor();
        ed.add_text();
        assert!(ed.can_undo());
        ed.load_image(RgbaImage::new(320, 240));
        assert_eq!(ed.elements().len(), 1);
        assert!(!ed.can_undo());
        assert_eq!(ed.surface().dimensions(), (320, 240));
    }

    #[test]
    fn every_mutation_re_renders() {
        let mut ed: OverlayEditor = editor();
        let before: u64 = ed.revision();
        ed.add_text();
        let after_add: u64 = ed.revision();
        assert!(after_add > before);
        ed.edit_active(&ElementPatch::text("x"));
        assert!(ed.revision() > after_add);
    }
}
