use eframe::egui;
use std::path::PathBuf;

use crate::error::Result;
use crate::modules::image_export::ExportFormat;
use crate::modules::overlay_editor::oe_interact::{hit_test, Hit};
use crate::modules::overlay_editor::oe_model::{BackgroundPatch, RgbaColor, ShadowPatch, StrokePatch, MAX_EXTENT};
use crate::modules::overlay_editor::oe_snap::{MIN_HEIGHT, MIN_WIDTH};
use crate::modules::overlay_editor::{ElementPatch, Guide, ImageFilters, OverlayEditor, TextAlign, TextElement, Viewport};
use crate::style::{self, ColorPalette, ThemeMode};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];
const TEXT_FIELD_ID: &str = "overlay_text_field";

/// A change requested by a side-panel control this frame.
enum Edit {
    /// Applied now, committed once the pointer is released.
    Live(ElementPatch),
    /// Applied now and never committed by itself (typing).
    Typing(ElementPatch),
    Commit(ElementPatch),
    Rotate(f32),
    Filters(ImageFilters),
    /// Commits whatever is live.
    Flush,
}

pub struct OverlayApp {
    editor: OverlayEditor,
    theme_mode: ThemeMode,
    texture: Option<egui::TextureId>,
    uploaded_revision: Option<u64>,
    text_buffer: String,
    pending_commit: bool,
    pending_rotation: bool,
    project_path: Option<PathBuf>,
    status: Option<(String, bool)>,
}

impl OverlayApp {
    pub fn new(cc: &eframe::CreationContext<'_>, editor: OverlayEditor) -> Self {
        let theme_mode: ThemeMode = match cc.egui_ctx.theme() {
            egui::Theme::Dark => ThemeMode::Dark,
            egui::Theme::Light => ThemeMode::Light,
        };
        style::apply_theme(&cc.egui_ctx, theme_mode);

        Self {
            editor,
            theme_mode,
            texture: None,
            uploaded_revision: None,
            text_buffer: String::new(),
            pending_commit: false,
            pending_rotation: false,
            project_path: None,
            status: None,
        }
    }

    pub fn with_project_path(mut self, path: Option<PathBuf>) -> Self {
        self.project_path = path;
        self
    }

    fn report(&mut self, result: Result<()>, done: impl Into<String>) {
        match result {
            Ok(()) => self.status = Some((done.into(), false)),
            Err(e) => {
                tracing::warn!("{}", e);
                self.status = Some((e.to_string(), true));
            }
        }
    }

    fn open_image_dialog(&mut self) {
        let Some(path) = rfd::FileDialog::new().add_filter("Images", IMAGE_EXTENSIONS).pick_file() else { return };
        let result: Result<()> = self.editor.open_image(&path);
        self.report(result, format!("Opened {}", path.display()));
    }

    fn open_project_dialog(&mut self) {
        let Some(path) = rfd::FileDialog::new().add_filter("Overlay Project", &["json"]).pick_file() else { return };
        let result: Result<()> = self.editor.load_project(&path);
        if result.is_ok() { self.project_path = Some(path.clone()); }
        self.report(result, format!("Loaded {}", path.display()));
    }

    fn save_project(&mut self, save_as: bool) {
        let path: Option<PathBuf> = match (&self.project_path, save_as) {
            (Some(p), false) => Some(p.clone()),
            _ => rfd::FileDialog::new().add_filter("Overlay Project", &["json"]).set_file_name("project.json").save_file(),
        };
        let Some(path) = path else { return };
        let result: Result<()> = self.editor.save_project(&path);
        if result.is_ok() { self.project_path = Some(path.clone()); }
        self.report(result, format!("Saved {}", path.display()));
    }

    fn export_dialog(&mut self) {
        let mut dialog = rfd::FileDialog::new().set_file_name("overlay.png");
        for format in ExportFormat::all() {
            dialog = dialog.add_filter(format.as_str(), &[format.extension()]);
        }
        let Some(path) = dialog.save_file() else { return };
        let result: Result<()> = self.editor.export_to(&path, ExportFormat::from_path(&path));
        self.report(result, format!("Exported {}", path.display()));
    }

    fn handle_keyboard(&mut self, ctx: &egui::Context) {
        // a focused text field keeps its own undo and delete keys
        if ctx.memory(|m| m.focused().is_some()) { return; }
        let (undo, redo, delete) = ctx.input_mut(|i| {
            let redo: bool = i.consume_key(egui::Modifiers::CTRL | egui::Modifiers::SHIFT, egui::Key::Z)
                || i.consume_key(egui::Modifiers::CTRL, egui::Key::Y);
            let undo: bool = i.consume_key(egui::Modifiers::CTRL, egui::Key::Z);
            let delete: bool = i.consume_key(egui::Modifiers::NONE, egui::Key::Delete);
            (undo, redo, delete)
        });
        if undo { self.editor.undo(); }
        if redo { self.editor.redo(); }
        if delete { self.editor.delete_active(); }
    }

    fn ensure_texture(&mut self, ctx: &egui::Context) {
        if self.editor.image().is_none() || self.uploaded_revision == Some(self.editor.revision()) { return; }
        let surface = self.editor.surface();
        let color_image: egui::ColorImage = egui::ColorImage::from_rgba_unmultiplied(
            [surface.width() as usize, surface.height() as usize],
            surface.as_raw(),
        );
        if let Some(texture_id) = self.texture {
            ctx.tex_manager().write().set(texture_id, egui::epaint::ImageDelta::full(color_image, egui::TextureOptions::LINEAR));
        } else {
            self.texture = Some(ctx.tex_manager().write().alloc("overlay_surface".into(), color_image.into(), egui::TextureOptions::LINEAR));
        }
        self.uploaded_revision = Some(self.editor.revision());
    }

    fn top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.add_space(4.0);
            egui::MenuBar::new().ui(ui, |ui| {
                let has_image: bool = self.editor.image().is_some();
                ui.menu_button("File", |ui| {
                    if ui.button("Open Image...").clicked() { self.open_image_dialog(); ui.close(); }
                    if ui.button("Open Project...").clicked() { self.open_project_dialog(); ui.close(); }
                    ui.separator();
                    if ui.button("Save Project").clicked() { self.save_project(false); ui.close(); }
                    if ui.button("Save Project As...").clicked() { self.save_project(true); ui.close(); }
                    if ui.add_enabled(has_image, egui::Button::new("Export Image...")).clicked() { self.export_dialog(); ui.close(); }
                    ui.separator();
                    if ui.button("Exit").clicked() { ctx.send_viewport_cmd(egui::ViewportCommand::Close); ui.close(); }
                });
                ui.menu_button("Edit", |ui| {
                    if ui.add_enabled(self.editor.can_undo(), egui::Button::new("Undo (Ctrl+Z)")).clicked() { self.editor.undo(); ui.close(); }
                    if ui.add_enabled(self.editor.can_redo(), egui::Button::new("Redo (Ctrl+Y)")).clicked() { self.editor.redo(); ui.close(); }
                    ui.separator();
                    if ui.button("Add Text").clicked() { self.editor.add_text(); ui.close(); }
                    let has_active: bool = self.editor.active().is_some();
                    if ui.add_enabled(has_active, egui::Button::new("Delete Text (Del)")).clicked() { self.editor.delete_active(); ui.close(); }
                });
                ui.menu_button("View", |ui| {
                    let label: &str = match self.theme_mode { ThemeMode::Dark => "Light Theme", ThemeMode::Light => "Dark Theme" };
                    if ui.button(label).clicked() {
                        self.theme_mode = self.theme_mode.toggled();
                        style::apply_theme(ctx, self.theme_mode);
                        ui.close();
                    }
                });
            });
        });
    }

    fn status_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if let Some(img) = self.editor.image() {
                    ui.label(format!("{} x {}", img.width(), img.height()));
                    ui.separator();
                }
                ui.label(format!("{} element(s)", self.editor.elements().len()));
                if let Some((msg, is_error)) = &self.status {
                    ui.separator();
                    let text = egui::RichText::new(msg);
                    ui.label(if *is_error { text.color(style::error_text(self.theme_mode)) } else { text });
                }
            });
        });
    }

    fn side_panel(&mut self, ctx: &egui::Context) {
        let mut edits: Vec<Edit> = Vec::new();
        let mut add: bool = false;
        let mut delete: bool = false;

        egui::SidePanel::right("properties").resizable(true).default_width(280.0).show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.add_space(6.0);
                ui.horizontal(|ui| {
                    if ui.button("Add Text").clicked() { add = true; }
                    if ui.add_enabled(self.editor.active().is_some(), egui::Button::new("Delete")).clicked() { delete = true; }
                });
                ui.separator();

                match self.editor.active_element().cloned() {
                    Some(el) => self.element_controls(ui, ctx, &el, &mut edits),
                    None => { ui.weak("Select a text element on the canvas, or add one."); }
                }

                ui.separator();
                ui.strong("Image Filters");
                let mut f: ImageFilters = *self.editor.filters();
                let mut changed: bool = false;
                changed |= ui.add(egui::Slider::new(&mut f.brightness, 0.0..=200.0).text("Brightness").suffix("%")).changed();
                changed |= ui.add(egui::Slider::new(&mut f.contrast, 0.0..=200.0).text("Contrast").suffix("%")).changed();
                changed |= ui.add(egui::Slider::new(&mut f.grayscale, 0.0..=100.0).text("Grayscale").suffix("%")).changed();
                changed |= ui.add(egui::Slider::new(&mut f.sepia, 0.0..=100.0).text("Sepia").suffix("%")).changed();
                if changed { edits.push(Edit::Filters(f)); }
                if ui.button("Reset Filters").clicked() {
                    edits.push(Edit::Filters(ImageFilters::default()));
                    edits.push(Edit::Flush);
                }
            });
        });

        if add { self.editor.add_text(); }
        if delete { self.editor.delete_active(); }
        for edit in edits {
            match edit {
                Edit::Live(p) => { self.editor.edit_active(&p); self.pending_commit = true; }
                Edit::Typing(p) => { self.editor.edit_active(&p); }
                Edit::Commit(p) => { self.editor.apply_active(&p); }
                Edit::Rotate(deg) => { self.editor.set_rotation_live(deg); self.pending_rotation = true; }
                Edit::Filters(f) => { self.editor.set_filters_live(f); self.pending_commit = true; }
                Edit::Flush => { self.editor.commit(); self.pending_commit = false; }
            }
        }
    }

    fn element_controls(&mut self, ui: &mut egui::Ui, ctx: &egui::Context, el: &TextElement, edits: &mut Vec<Edit>) {
        let text_id: egui::Id = egui::Id::new(TEXT_FIELD_ID);
        if !ctx.memory(|m| m.has_focus(text_id)) { self.text_buffer = el.text.clone(); }

        ui.strong("Text");
        let r = ui.add(egui::TextEdit::multiline(&mut self.text_buffer).id(text_id).desired_rows(3).desired_width(f32::INFINITY));
        if r.changed() { edits.push(Edit::Typing(ElementPatch::text(self.text_buffer.clone()))); }
        if r.lost_focus() { edits.push(Edit::Flush); }

        ui.horizontal(|ui| {
            ui.label("Font");
            egui::ComboBox::from_id_salt("font_family").selected_text(el.font.as_str()).show_ui(ui, |ui| {
                let mut families: Vec<String> = self.editor.font_families();
                if !families.contains(&el.font) { families.insert(0, el.font.clone()); }
                for family in families {
                    if ui.selectable_label(family == el.font, family.as_str()).clicked() {
                        edits.push(Edit::Commit(ElementPatch { font: Some(family), ..Default::default() }));
                    }
                }
            });
        });

        ui.horizontal(|ui| {
            let mut size: f32 = el.size;
            ui.label("Size");
            if ui.add(egui::DragValue::new(&mut size).range(4.0..=400.0).speed(0.5)).changed() {
                edits.push(Edit::Live(ElementPatch { size: Some(size), ..Default::default() }));
            }
            let mut rgba: [u8; 4] = el.color.to_array();
            ui.label("Color");
            if ui.color_edit_button_srgba_unmultiplied(&mut rgba).changed() {
                edits.push(Edit::Live(ElementPatch { color: Some(RgbaColor::from_array(rgba)), ..Default::default() }));
            }
        });

        ui.horizontal(|ui| {
            ui.label("Align");
            for align in TextAlign::all() {
                if ui.selectable_label(el.align == align, align.as_str()).clicked() && el.align != align {
                    edits.push(Edit::Commit(ElementPatch { align: Some(align), ..Default::default() }));
                }
            }
        });

        let mut rotation: f32 = el.rotation;
        if ui.add(egui::Slider::new(&mut rotation, -180.0..=180.0).text("Rotation").suffix("°")).changed() {
            edits.push(Edit::Rotate(rotation));
        }

        egui::CollapsingHeader::new("Position").default_open(false).show(ui, |ui| {
            let g = el.geometry();
            let (mut x, mut y, mut w, mut h) = (g.x, g.y, g.width, g.height);
            let mut changed: bool = false;
            egui::Grid::new("geometry_grid").num_columns(4).show(ui, |ui| {
                ui.label("X"); changed |= ui.add(egui::DragValue::new(&mut x).range(-MAX_EXTENT..=MAX_EXTENT)).changed();
                ui.label("Y"); changed |= ui.add(egui::DragValue::new(&mut y).range(-MAX_EXTENT..=MAX_EXTENT)).changed();
                ui.end_row();
                ui.label("W"); changed |= ui.add(egui::DragValue::new(&mut w).range(MIN_WIDTH..=MAX_EXTENT)).changed();
                ui.label("H"); changed |= ui.add(egui::DragValue::new(&mut h).range(MIN_HEIGHT..=MAX_EXTENT)).changed();
                ui.end_row();
            });
            if changed {
                edits.push(Edit::Live(ElementPatch { x: Some(x), y: Some(y), width: Some(w), height: Some(h), ..Default::default() }));
            }
        });

        egui::CollapsingHeader::new("Shadow").default_open(true).show(ui, |ui| {
            let s = el.shadow;
            let mut enabled: bool = s.enabled;
            if ui.checkbox(&mut enabled, "Enabled").changed() {
                edits.push(Edit::Commit(ElementPatch { shadow: Some(ShadowPatch { enabled: Some(enabled), ..Default::default() }), ..Default::default() }));
            }
            ui.add_enabled_ui(s.enabled, |ui| {
                let mut patch: ShadowPatch = ShadowPatch::default();
                let mut rgba: [u8; 4] = s.color.to_array();
                ui.horizontal(|ui| {
                    ui.label("Color");
                    if ui.color_edit_button_srgba_unmultiplied(&mut rgba).changed() { patch.color = Some(RgbaColor::from_array(rgba)); }
                });
                let (mut blur, mut ox, mut oy) = (s.blur, s.offset_x, s.offset_y);
                if ui.add(egui::Slider::new(&mut blur, 0.0..=50.0).text("Blur")).changed() { patch.blur = Some(blur); }
                if ui.add(egui::Slider::new(&mut ox, -50.0..=50.0).text("Offset X")).changed() { patch.offset_x = Some(ox); }
                if ui.add(egui::Slider::new(&mut oy, -50.0..=50.0).text("Offset Y")).changed() { patch.offset_y = Some(oy); }
                if patch != ShadowPatch::default() {
                    edits.push(Edit::Live(ElementPatch { shadow: Some(patch), ..Default::default() }));
                }
            });
        });

        egui::CollapsingHeader::new("Background").default_open(true).show(ui, |ui| {
            let b = el.bg_color;
            let mut enabled: bool = b.enabled;
            let mut rgba: [u8; 4] = b.color.to_array();
            ui.horizontal(|ui| {
                if ui.checkbox(&mut enabled, "Enabled").changed() {
                    edits.push(Edit::Commit(ElementPatch { bg_color: Some(BackgroundPatch { enabled: Some(enabled), color: None }), ..Default::default() }));
                }
                if ui.add_enabled_ui(b.enabled, |ui| ui.color_edit_button_srgba_unmultiplied(&mut rgba)).inner.changed() {
                    edits.push(Edit::Live(ElementPatch { bg_color: Some(BackgroundPatch { enabled: None, color: Some(RgbaColor::from_array(rgba)) }), ..Default::default() }));
                }
            });
        });

        egui::CollapsingHeader::new("Stroke").default_open(true).show(ui, |ui| {
            let s = el.stroke;
            let mut enabled: bool = s.enabled;
            let mut rgba: [u8; 4] = s.color.to_array();
            let mut width: f32 = s.width;
            ui.horizontal(|ui| {
                if ui.checkbox(&mut enabled, "Enabled").changed() {
                    edits.push(Edit::Commit(ElementPatch { stroke: Some(StrokePatch { enabled: Some(enabled), ..Default::default() }), ..Default::default() }));
                }
                if ui.add_enabled_ui(s.enabled, |ui| ui.color_edit_button_srgba_unmultiplied(&mut rgba)).inner.changed() {
                    edits.push(Edit::Live(ElementPatch { stroke: Some(StrokePatch { color: Some(RgbaColor::from_array(rgba)), ..Default::default() }), ..Default::default() }));
                }
            });
            if ui.add_enabled(s.enabled, egui::Slider::new(&mut width, 0.0..=20.0).text("Width")).changed() {
                edits.push(Edit::Live(ElementPatch { stroke: Some(StrokePatch { width: Some(width), ..Default::default() }), ..Default::default() }));
            }
        });
    }

    fn canvas(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let Some((w, h)) = self.editor.image().map(|i| (i.width() as f32, i.height() as f32)) else {
            ui.centered_and_justified(|ui| {
                ui.vertical_centered(|ui| {
                    ui.add_space(ui.available_height() / 3.0);
                    ui.heading("Overlay Editor");
                    ui.label("Open an image to start placing text.");
                    ui.add_space(16.0);
                    if style::primary_button(ui, "Open Image...").clicked() { self.open_image_dialog(); }
                });
            });
            return;
        };

        let (rect, response) = ui.allocate_exact_size(ui.available_size(), egui::Sense::click_and_drag());
        let viewport: Viewport = Viewport::fit(rect.shrink(8.0), egui::vec2(w, h));
        let painter: egui::Painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, style::canvas_backdrop(self.theme_mode));
        if let Some(texture) = self.texture {
            let uv: egui::Rect = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
            painter.image(texture, viewport.rect, uv, egui::Color32::WHITE);
        }

        if response.drag_started_by(egui::PointerButton::Primary) {
            let origin: Option<egui::Pos2> = ui.input(|i| i.pointer.press_origin()).or(response.interact_pointer_pos());
            if let Some(p) = origin { self.editor.pointer_down(p, &viewport); }
        }
        if response.dragged_by(egui::PointerButton::Primary) {
            if let Some(p) = response.interact_pointer_pos() { self.editor.pointer_move(p, &viewport); }
        }
        if response.drag_stopped_by(egui::PointerButton::Primary) {
            self.editor.pointer_up();
        } else if response.clicked() {
            if let Some(p) = response.interact_pointer_pos() {
                self.editor.pointer_down(p, &viewport);
                self.editor.pointer_up();
            }
        }
        if !response.dragged() && !ui.input(|i| i.pointer.primary_down()) {
            self.editor.pointer_leave();
        }

        if let Some(hover) = response.hover_pos() {
            match hit_test(self.editor.elements(), viewport.to_image(hover), self.editor.config().handle_hit) {
                Some(Hit::Handle(_)) => ctx.set_cursor_icon(egui::CursorIcon::ResizeNwSe),
                Some(Hit::Body(_)) => ctx.set_cursor_icon(egui::CursorIcon::Move),
                None => {}
            }
        }

        let stroke: egui::Stroke = egui::Stroke::new(1.0, ColorPalette::GUIDE);
        for guide in self.editor.guides() {
            let (a, b) = match *guide {
                Guide::Vertical(x) => (egui::pos2(x, 0.0), egui::pos2(x, h)),
                Guide::Horizontal(y) => (egui::pos2(0.0, y), egui::pos2(w, y)),
            };
            painter.line_segment([viewport.to_screen(a), viewport.to_screen(b)], stroke);
        }
    }

    /// Commits live panel edits once nothing is held down any more.
    fn flush_pending(&mut self, ctx: &egui::Context) {
        if ctx.input(|i| i.pointer.any_down()) { return; }
        if self.pending_rotation {
            self.pending_rotation = false;
            self.editor.release_rotation();
        }
        if self.pending_commit {
            self.pending_commit = false;
            self.editor.commit();
        }
    }
}

impl eframe::App for OverlayApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_keyboard(ctx);
        self.top_bar(ctx);
        self.status_bar(ctx);
        self.side_panel(ctx);
        self.flush_pending(ctx);
        self.ensure_texture(ctx);

        egui::CentralPanel::default().frame(egui::Frame::NONE).show(ctx, |ui| {
            self.canvas(ui, ctx);
        });
        // pointer edits made by the canvas this frame
        self.ensure_texture(ctx);
    }
}
