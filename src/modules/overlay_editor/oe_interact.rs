use eframe::egui;

use crate::config::EditorConfig;
use super::oe_model::{find_element, ElementId, Geometry, TextElement};
use super::oe_snap::{snap, Guide, SnapMode, SnapResult, MIN_HEIGHT, MIN_WIDTH};

pub const ROTATION_STOPS: [f32; 9] = [-180.0, -135.0, -90.0, -45.0, 0.0, 45.0, 90.0, 135.0, 180.0];
pub const ROTATION_SNAP: f32 = 4.0;

/// Where the image is shown on screen. Maps device points to image pixels
/// and back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub rect: egui::Rect,
    pub image_size: egui::Vec2,
}

impl Viewport {
    /// Image drawn 1:1 at the origin.
    #[cfg(test)]
    pub fn identity(width: f32, height: f32) -> Self {
        Self { rect: egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(width, height)), image_size: egui::vec2(width, height) }
    }

    /// Largest uniform scale (never above 1) that fits `image_size` in `available`, centered.
    pub fn fit(available: egui::Rect, image_size: egui::Vec2) -> Self {
        let sx: f32 = available.width() / image_size.x.max(1.0);
        let sy: f32 = available.height() / image_size.y.max(1.0);
        let zoom: f32 = sx.min(sy).clamp(0.01, 1.0);
        Self { rect: egui::Rect::from_center_size(available.center(), image_size * zoom), image_size }
    }

    pub fn zoom(&self) -> f32 { self.rect.width() / self.image_size.x.max(1.0) }

    pub fn to_image(&self, p: egui::Pos2) -> egui::Pos2 {
        let zoom: f32 = self.zoom().max(f32::EPSILON);
        egui::pos2((p.x - self.rect.min.x) / zoom, (p.y - self.rect.min.y) / zoom)
    }

    pub fn to_screen(&self, p: egui::Pos2) -> egui::Pos2 {
        self.rect.min + p.to_vec2() * self.zoom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hit {
    Handle(ElementId),
    Body(ElementId),
}

/// Rotates `p` by `-deg` about `center`, undoing an element's rotation.
fn unrotate(p: egui::Pos2, center: egui::Pos2, deg: f32) -> egui::Pos2 {
    let (sin_a, cos_a) = deg.to_radians().sin_cos();
    let d: egui::Vec2 = p - center;
    egui::pos2(center.x + d.x * cos_a + d.y * sin_a, center.y - d.x * sin_a + d.y * cos_a)
}

fn unrotate_vec(v: egui::Vec2, deg: f32) -> egui::Vec2 {
    unrotate(egui::Pos2::ZERO + v, egui::Pos2::ZERO, deg).to_vec2()
}

/// Topmost element under `p` (image pixels). Each element's resize handle,
/// a square of side `handle_hit` on its bottom-right corner, is tried before its body.
pub fn hit_test(elements: &[TextElement], p: egui::Pos2, handle_hit: f32) -> Option<Hit> {
    for el in elements.iter().rev() {
        let g: Geometry = el.geometry();
        let (cx, cy) = g.center();
        let local: egui::Pos2 = unrotate(p, egui::pos2(cx, cy), el.rotation);

        let handle: egui::Rect = egui::Rect::from_center_size(egui::pos2(g.right(), g.bottom()), egui::vec2(handle_hit, handle_hit));
        if handle.contains(local) { return Some(Hit::Handle(el.id)); }
        let body: egui::Rect = egui::Rect::from_min_size(egui::pos2(g.x, g.y), egui::vec2(g.width, g.height));
        if body.contains(local) { return Some(Hit::Body(el.id)); }
    }
    None
}

/// Nearest of [`ROTATION_STOPS`] within [`ROTATION_SNAP`] degrees, or `deg` unchanged.
pub fn snap_rotation(deg: f32) -> f32 {
    ROTATION_STOPS.iter().copied()
        .filter(|stop| (deg - stop).abs() <= ROTATION_SNAP)
        .min_by(|a, b| (deg - a).abs().total_cmp(&(deg - b).abs()))
        .unwrap_or(deg)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Gesture {
    Idle,
    Dragging { id: ElementId, pointer: egui::Pos2, origin: Geometry },
    Resizing { id: ElementId, pointer: egui::Pos2, origin: Geometry },
}

/// Pointer state machine for moving and resizing elements. Works in image
/// pixels; the session converts device points through a [`Viewport`] first.
#[derive(Debug, Clone)]
pub struct InteractionController {
    gesture: Gesture,
    guides: Vec<Guide>,
    snap_threshold: f32,
    handle_hit: f32,
}

impl InteractionController {
    pub fn new(snap_threshold: f32, handle_hit: f32) -> Self {
        Self { gesture: Gesture::Idle, guides: Vec::new(), snap_threshold, handle_hit }
    }

    pub fn from_config(config: &EditorConfig) -> Self { Self::new(config.snap_threshold, config.handle_hit) }

    /// Starts a drag or resize on the topmost hit element and returns it.
    /// A miss leaves the controller idle and returns `None`.
    pub fn pointer_down(&mut self, elements: &[TextElement], p: egui::Pos2) -> Option<ElementId> {
        self.guides.clear();
        let hit: Option<Hit> = hit_test(elements, p, self.handle_hit);
        self.gesture = match hit {
            Some(Hit::Handle(id)) => find_element(elements, id)
                .map(|el| Gesture::Resizing { id, pointer: p, origin: el.geometry() })
                .unwrap_or(Gesture::Idle),
            Some(Hit::Body(id)) => find_element(elements, id)
                .map(|el| Gesture::Dragging { id, pointer: p, origin: el.geometry() })
                .unwrap_or(Gesture::Idle),
            None => Gesture::Idle,
        };
        match self.gesture {
            Gesture::Dragging { id, .. } | Gesture::Resizing { id, .. } => Some(id),
            Gesture::Idle => None,
        }
    }

    /// New geometry for the element under gesture, already clamped and snapped.
    /// `None` when idle or when the element has gone away.
    pub fn pointer_move(&mut self, elements: &[TextElement], canvas: (f32, f32), p: egui::Pos2) -> Option<(ElementId, Geometry)> {
        let (id, start, origin, mode) = match self.gesture {
            Gesture::Idle => return None,
            Gesture::Dragging { id, pointer, origin } => (id, pointer, origin, SnapMode::Move),
            Gesture::Resizing { id, pointer, origin } => (id, pointer, origin, SnapMode::Resize),
        };
        let Some(el) = find_element(elements, id) else {
            self.cancel();
            return None;
        };

        let delta: egui::Vec2 = p - start;
        let proposed: Geometry = match mode {
            SnapMode::Move => Geometry { x: origin.x + delta.x, y: origin.y + delta.y, ..origin },
            SnapMode::Resize => {
                let d: egui::Vec2 = unrotate_vec(delta, el.rotation);
                Geometry { width: (origin.width + d.x).max(MIN_WIDTH), height: (origin.height + d.y).max(MIN_HEIGHT), ..origin }
            }
        };
        let siblings: Vec<Geometry> = elements.iter().filter(|e| e.id != id).map(|e| e.geometry()).collect();
        let result: SnapResult = snap(proposed, &siblings, canvas, mode, self.snap_threshold);
        self.guides = result.guides;
        Some((id, result.geometry))
    }

    /// Ends the gesture. Returns whether one was in progress, which is when
    /// the caller should commit.
    pub fn pointer_up(&mut self) -> bool {
        let was_active: bool = self.is_active();
        self.cancel();
        was_active
    }

    /// Drops any gesture and guides without reporting a commit.
    pub fn cancel(&mut self) {
        self.gesture = Gesture::Idle;
        self.guides.clear();
    }

    pub fn is_active(&self) -> bool { self.gesture != Gesture::Idle }
    pub fn guides(&self) -> &[Guide] { &self.guides }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANVAS: (f32, f32) = (1000.0, 800.0);

    fn element(id: u64, x: f32, y: f32, width: f32, height: f32) -> TextElement {
        let mut el: TextElement = TextElement::new(ElementId(id));
        el.x = x; el.y = y; el.width = width; el.height = height;
        el
    }

    #[test]
    fn rotation_snaps_only_near_stops() {
        assert_eq!(snap_rotation(88.0), 90.0);
        assert_eq!(snap_rotation(80.0), 80.0);
        assert_eq!(snap_rotation(-47.0), -45.0);
        assert_eq!(snap_rotation(184.0), 180.0);
        assert_eq!(snap_rotation(22.5), 22.5);
    }

    #[test]
    fn viewport_maps_scaled_display() {
        let vp: Viewport = Viewport { rect: egui::Rect::from_min_max(egui::pos2(10.0, 20.0), egui::pos2(110.0, 70.0)), image_size: egui::vec2(200.0, 100.0) };
        assert_eq!(vp.to_image(egui::pos2(60.0, 45.0)), egui::pos2(100.0, 50.0));
        assert_eq!(vp.to_screen(egui::pos2(100.0, 50.0)), egui::pos2(60.0, 45.0));

        let fit: Viewport = Viewport::fit(egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(400.0, 400.0)), egui::vec2(800.0, 200.0));
        assert_eq!(fit.zoom(), 0.5);
        assert_eq!(fit.rect.min, egui::pos2(0.0, 150.0));
    }

    #[test]
    fn topmost_wins_and_handle_beats_body() {
        let elements: Vec<TextElement> = vec![element(1, 0.0, 0.0, 200.0, 100.0), element(2, 50.0, 50.0, 100.0, 40.0)];
        assert_eq!(hit_test(&elements, egui::pos2(60.0, 60.0), 18.0), Some(Hit::Body(ElementId(2))));
        assert_eq!(hit_test(&elements, egui::pos2(10.0, 10.0), 18.0), Some(Hit::Body(ElementId(1))));
        assert_eq!(hit_test(&elements, egui::pos2(155.0, 95.0), 18.0), Some(Hit::Handle(ElementId(2))));
        assert_eq!(hit_test(&elements, egui::pos2(300.0, 300.0), 18.0), None);
    }

    #[test]
    fn hits_follow_rotation() {
        let mut el: TextElement = element(1, 0.0, 0.0, 100.0, 20.0);
        el.rotation = 90.0;
        let elements: Vec<TextElement> = vec![el];
        assert_eq!(hit_test(&elements, egui::pos2(50.0, 50.0), 18.0), Some(Hit::Body(ElementId(1))));
        assert_eq!(hit_test(&elements, egui::pos2(90.0, 10.0), 18.0), None);
    }

    #[test]
    fn drag_moves_by_pointer_delta() {
        let elements: Vec<TextElement> = vec![element(1, 50.0, 50.0, 400.0, 60.0)];
        let mut ctl: InteractionController = InteractionController::new(5.0, 18.0);
        assert_eq!(ctl.pointer_down(&elements, egui::pos2(100.0, 70.0)), Some(ElementId(1)));
        let (id, g) = ctl.pointer_move(&elements, CANVAS, egui::pos2(110.0, 80.0)).unwrap();
        assert_eq!(id, ElementId(1));
        assert_eq!((g.x, g.y, g.width, g.height), (60.0, 60.0, 400.0, 60.0));
        assert!(ctl.pointer_up());
        assert!(!ctl.pointer_up());
        assert!(ctl.pointer_move(&elements, CANVAS, egui::pos2(200.0, 200.0)).is_none());
    }

    #[test]
    fn drag_near_sibling_shows_one_guide() {
        let elements: Vec<TextElement> = vec![element(1, 100.0, 600.0, 120.0, 40.0), element(2, 300.0, 300.0, 217.0, 33.0)];
        let mut ctl: InteractionController = InteractionController::new(5.0, 18.0);
        ctl.pointer_down(&elements, egui::pos2(310.0, 310.0));
        let (_, g) = ctl.pointer_move(&elements, CANVAS, egui::pos2(113.0, 310.0)).unwrap();
        assert_eq!(g.x, 100.0);
        assert_eq!(ctl.guides(), &[Guide::Vertical(100.0)]);
        ctl.pointer_up();
        assert!(ctl.guides().is_empty());
    }

    #[test]
    fn resize_clamps_to_minimum() {
        let elements: Vec<TextElement> = vec![element(1, 50.0, 50.0, 400.0, 60.0)];
        let mut ctl: InteractionController = InteractionController::new(5.0, 18.0);
        assert_eq!(ctl.pointer_down(&elements, egui::pos2(450.0, 110.0)), Some(ElementId(1)));
        let (_, g) = ctl.pointer_move(&elements, CANVAS, egui::pos2(60.0, 60.0)).unwrap();
        assert_eq!((g.x, g.y), (50.0, 50.0));
        assert_eq!((g.width, g.height), (50.0, 20.0));
    }

    #[test]
    fn miss_stays_idle() {
        let elements: Vec<TextElement> = vec![element(1, 50.0, 50.0, 400.0, 60.0)];
        let mut ctl: InteractionController = InteractionController::new(5.0, 18.0);
        assert_eq!(ctl.pointer_down(&elements, egui::pos2(5.0, 5.0)), None);
        assert!(!ctl.is_active());
        assert!(!ctl.pointer_up());
    }
}
