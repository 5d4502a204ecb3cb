use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_X: f32 = 50.0;
pub const DEFAULT_Y: f32 = 50.0;
pub const DEFAULT_WIDTH: f32 = 400.0;
pub const DEFAULT_HEIGHT: f32 = 60.0;
pub const DEFAULT_FONT: &str = "Arial";
pub const DEFAULT_SIZE: f32 = 40.0;
pub const LINE_PITCH: f32 = 1.2;

/// Largest coordinate or box side a project may carry.
pub const MAX_EXTENT: f32 = 100_000.0;
pub const MAX_FONT_SIZE: f32 = 2_000.0;
/// Upper bound for shadow blur, shadow offset and stroke width.
pub const MAX_EFFECT: f32 = 1_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RgbaColor { pub r: u8, pub g: u8, pub b: u8, pub a: u8 }

impl RgbaColor {
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self { Self { r, g, b, a: 255 } }

    pub fn to_array(&self) -> [u8; 4] { [self.r, self.g, self.b, self.a] }
    pub fn from_array([r, g, b, a]: [u8; 4]) -> Self { Self { r, g, b, a } }

    /// Channels in 0..=1, straight alpha.
    pub fn to_unit(&self) -> [f32; 4] {
        [self.r as f32 / 255.0, self.g as f32 / 255.0, self.b as f32 / 255.0, self.a as f32 / 255.0]
    }

    pub fn to_hex(&self) -> String {
        if self.a == 255 { format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b) }
        else { format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a) }
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex: &str = hex.trim().trim_start_matches('#');
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        let nibble = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok().map(|n| n * 17);
        match hex.len() {
            3 => Some(Self::rgb(nibble(0)?, nibble(1)?, nibble(2)?)),
            6 => Some(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Self { r: byte(0)?, g: byte(2)?, b: byte(4)?, a: byte(6)? }),
            _ => None,
        }
    }
}

impl TryFrom<String> for RgbaColor {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s).ok_or_else(|| format!("invalid color `{}`", s))
    }
}

impl From<RgbaColor> for String {
    fn from(c: RgbaColor) -> Self { c.to_hex() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

impl TextAlign {
    pub fn all() -> [TextAlign; 3] { [TextAlign::Left, TextAlign::Center, TextAlign::Right] }

    pub fn as_str(&self) -> &str {
        match self {
            TextAlign::Left => "Left",
            TextAlign::Center => "Center",
            TextAlign::Right => "Right",
        }
    }

    /// Anchor x of a line inside a box starting at `x`.
    pub fn anchor(&self, x: f32, width: f32) -> f32 {
        match self {
            TextAlign::Left => x,
            TextAlign::Center => x + width / 2.0,
            TextAlign::Right => x + width,
        }
    }

    /// Left edge of a line of `line_width` drawn at `anchor`.
    pub fn line_left(&self, anchor: f32, line_width: f32) -> f32 {
        match self {
            TextAlign::Left => anchor,
            TextAlign::Center => anchor - line_width / 2.0,
            TextAlign::Right => anchor - line_width,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowStyle {
    pub enabled: bool,
    pub color: RgbaColor,
    pub blur: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Default for ShadowStyle {
    fn default() -> Self { Self { enabled: false, color: RgbaColor::BLACK, blur: 4.0, offset_x: 2.0, offset_y: 2.0 } }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundStyle { pub enabled: bool, pub color: RgbaColor }

impl Default for BackgroundStyle {
    fn default() -> Self { Self { enabled: false, color: RgbaColor::BLACK } }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle { pub enabled: bool, pub color: RgbaColor, pub width: f32 }

impl Default for StrokeStyle {
    fn default() -> Self { Self { enabled: false, color: RgbaColor::BLACK, width: 2.0 } }
}

/// Position and size of an element's box in image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry { pub x: f32, pub y: f32, pub width: f32, pub height: f32 }

impl Geometry {
    pub fn right(&self) -> f32 { self.x + self.width }
    pub fn bottom(&self) -> f32 { self.y + self.height }
    pub fn center(&self) -> (f32, f32) { (self.x + self.width / 2.0, self.y + self.height / 2.0) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    pub id: ElementId,
    pub text: String,
    pub font: String,
    pub size: f32,
    pub color: RgbaColor,
    #[serde(default)]
    pub align: TextAlign,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default)]
    pub shadow: ShadowStyle,
    #[serde(default)]
    pub bg_color: BackgroundStyle,
    #[serde(default)]
    pub stroke: StrokeStyle,
}

impl TextElement {
    pub fn new(id: ElementId) -> Self {
        Self {
            id,
            text: "New Text".to_string(),
            font: DEFAULT_FONT.to_string(),
            size: DEFAULT_SIZE,
            color: RgbaColor::WHITE,
            align: TextAlign::Center,
            x: DEFAULT_X, y: DEFAULT_Y, width: DEFAULT_WIDTH, height: DEFAULT_HEIGHT,
            rotation: 0.0,
            shadow: ShadowStyle::default(),
            bg_color: BackgroundStyle::default(),
            stroke: StrokeStyle::default(),
        }
    }

    pub fn geometry(&self) -> Geometry { Geometry { x: self.x, y: self.y, width: self.width, height: self.height } }

    pub fn line_height(&self) -> f32 { self.size * LINE_PITCH }

    /// Name of the first numeric field that is not finite or lies outside
    /// what the renderer accepts.
    pub fn out_of_range(&self) -> Option<&'static str> {
        let within = |v: f32, lo: f32, hi: f32| v.is_finite() && v >= lo && v <= hi;
        let checks: [(&'static str, bool); 10] = [
            ("x", within(self.x, -MAX_EXTENT, MAX_EXTENT)),
            ("y", within(self.y, -MAX_EXTENT, MAX_EXTENT)),
            ("width", within(self.width, 0.0, MAX_EXTENT)),
            ("height", within(self.height, 0.0, MAX_EXTENT)),
            ("size", within(self.size, 0.0, MAX_FONT_SIZE)),
            ("rotation", self.rotation.is_finite()),
            ("shadow.blur", within(self.shadow.blur, 0.0, MAX_EFFECT)),
            ("shadow.offsetX", within(self.shadow.offset_x, -MAX_EFFECT, MAX_EFFECT)),
            ("shadow.offsetY", within(self.shadow.offset_y, -MAX_EFFECT, MAX_EFFECT)),
            ("stroke.width", within(self.stroke.width, 0.0, MAX_EFFECT)),
        ];
        checks.iter().find(|(_, ok)| !ok).map(|(name, _)| *name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageFilters {
    pub brightness: f32,
    pub contrast: f32,
    pub grayscale: f32,
    pub sepia: f32,
}

impl Default for ImageFilters {
    fn default() -> Self { Self { brightness: 100.0, contrast: 100.0, grayscale: 0.0, sepia: 0.0 } }
}

impl ImageFilters {
    pub fn is_identity(&self) -> bool { *self == Self::default() }

    pub fn clamped(&self) -> Self {
        Self {
            brightness: self.brightness.clamp(0.0, 200.0),
            contrast: self.contrast.clamp(0.0, 200.0),
            grayscale: self.grayscale.clamp(0.0, 100.0),
            sepia: self.sepia.clamp(0.0, 100.0),
        }
    }
}

/// Everything one history entry captures. Selection is deliberately absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EditorState {
    #[serde(rename = "textElements")]
    pub elements: Vec<TextElement>,
    #[serde(rename = "imageFilters")]
    pub filters: ImageFilters,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShadowPatch {
    pub enabled: Option<bool>,
    pub color: Option<RgbaColor>,
    pub blur: Option<f32>,
    pub offset_x: Option<f32>,
    pub offset_y: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BackgroundPatch { pub enabled: Option<bool>, pub color: Option<RgbaColor> }

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StrokePatch { pub enabled: Option<bool>, pub color: Option<RgbaColor>, pub width: Option<f32> }

/// A partial set of element properties. `None` leaves the field as it is;
/// the style records merge field by field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementPatch {
    pub text: Option<String>,
    pub font: Option<String>,
    pub size: Option<f32>,
    pub color: Option<RgbaColor>,
    pub align: Option<TextAlign>,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub rotation: Option<f32>,
    pub shadow: Option<ShadowPatch>,
    pub bg_color: Option<BackgroundPatch>,
    pub stroke: Option<StrokePatch>,
}

impl ElementPatch {
    pub fn geometry(g: Geometry) -> Self {
        Self { x: Some(g.x), y: Some(g.y), width: Some(g.width), height: Some(g.height), ..Default::default() }
    }
    pub fn rotation(deg: f32) -> Self { Self { rotation: Some(deg), ..Default::default() } }
    pub fn text(text: impl Into<String>) -> Self { Self { text: Some(text.into()), ..Default::default() } }

    pub fn apply(&self, el: &TextElement) -> TextElement {
        let mut out: TextElement = el.clone();
        if let Some(t) = &self.text { out.text = t.clone(); }
        if let Some(f) = &self.font { out.font = f.clone(); }
        if let Some(s) = self.size.filter(|s| *s > 0.0) { out.size = s; }
        if let Some(c) = self.color { out.color = c; }
        if let Some(a) = self.align { out.align = a; }
        if let Some(x) = self.x { out.x = x; }
        if let Some(y) = self.y { out.y = y; }
        if let Some(w) = self.width.filter(|w| *w > 0.0) { out.width = w; }
        if let Some(h) = self.height.filter(|h| *h > 0.0) { out.height = h; }
        if let Some(r) = self.rotation { out.rotation = r; }
        if let Some(p) = &self.shadow {
            let s: &mut ShadowStyle = &mut out.shadow;
            if let Some(v) = p.enabled { s.enabled = v; }
            if let Some(v) = p.color { s.color = v; }
            if let Some(v) = p.blur { s.blur = v.max(0.0); }
            if let Some(v) = p.offset_x { s.offset_x = v; }
            if let Some(v) = p.offset_y { s.offset_y = v; }
        }
        if let Some(p) = &self.bg_color {
            if let Some(v) = p.enabled { out.bg_color.enabled = v; }
            if let Some(v) = p.color { out.bg_color.color = v; }
        }
        if let Some(p) = &self.stroke {
            if let Some(v) = p.enabled { out.stroke.enabled = v; }
            if let Some(v) = p.color { out.stroke.color = v; }
            if let Some(v) = p.width { out.stroke.width = v.max(0.0); }
        }
        out
    }
}

pub fn find_element(elements: &[TextElement], id: ElementId) -> Option<&TextElement> {
    elements.iter().find(|e| e.id == id)
}

/// One past the largest id in use.
pub fn next_element_id(elements: &[TextElement]) -> ElementId {
    ElementId(elements.iter().map(|e| e.id.0 + 1).max().unwrap_or(1))
}

/// Appends `element` on top of the z-order. An id already in use is
/// replaced by the next free one; the id actually stored is returned.
pub fn add_element(elements: &[TextElement], mut element: TextElement) -> (Vec<TextElement>, ElementId) {
    if find_element(elements, element.id).is_some() {
        element.id = next_element_id(elements);
    }
    let id: ElementId = element.id;
    let mut out: Vec<TextElement> = Vec::with_capacity(elements.len() + 1);
    out.extend_from_slice(elements);
    out.push(element);
    (out, id)
}

pub fn remove_element(elements: &[TextElement], id: ElementId) -> Vec<TextElement> {
    elements.iter().filter(|e| e.id != id).cloned().collect()
}

/// Returns a new collection with `patch` merged into element `id`.
/// An unknown id gives back an unchanged copy.
pub fn update_element(elements: &[TextElement], id: ElementId, patch: &ElementPatch) -> Vec<TextElement> {
    if find_element(elements, id).is_none() {
        tracing::debug!("Ignoring update to missing element {}", id);
        return elements.to_vec();
    }
    elements.iter().map(|e| if e.id == id { patch.apply(e) } else { e.clone() }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(n: u64) -> Vec<TextElement> {
        (1..=n).map(|i| {
            let mut el: TextElement = TextElement::new(ElementId(i));
            el.text = format!("element {}", i);
            el.x = i as f32 * 10.0;
            el
        }).collect()
    }

    #[test]
    fn hex_colors() {
        assert_eq!(RgbaColor::from_hex("#ff8000"), Some(RgbaColor::rgb(255, 128, 0)));
        assert_eq!(RgbaColor::from_hex("#fff"), Some(RgbaColor::WHITE));
        assert_eq!(RgbaColor::from_hex("11223344"), Some(RgbaColor { r: 0x11, g: 0x22, b: 0x33, a: 0x44 }));
        assert_eq!(RgbaColor::from_hex("#12345"), None);
        assert_eq!(RgbaColor::from_hex("#zzzzzz"), None);
        assert_eq!(RgbaColor::rgb(1, 2, 3).to_hex(), "#010203");
    }

    #[test]
    fn update_touches_only_target() {
        let before: Vec<TextElement> = sample(4);
        let patch: ElementPatch = ElementPatch { text: Some("changed".into()), y: Some(99.0), ..Default::default() };
        let after: Vec<TextElement> = update_element(&before, ElementId(3), &patch);

        assert_eq!(after.len(), 4);
        for (b, a) in before.iter().zip(&after) {
            if a.id == ElementId(3) {
                assert_eq!(a.text, "changed");
                assert_eq!(a.y, 99.0);
                assert_eq!(a.x, b.x);
                assert_eq!(a.shadow, b.shadow);
            } else {
                assert_eq!(a, b);
            }
        }
        assert_eq!(before[2].text, "element 3");
    }

    #[test]
    fn nested_patch_merges_fields() {
        let before: Vec<TextElement> = sample(1);
        let patch: ElementPatch = ElementPatch {
            shadow: Some(ShadowPatch { enabled: Some(true), blur: Some(10.0), ..Default::default() }),
            stroke: Some(StrokePatch { color: Some(RgbaColor::rgb(255, 0, 0)), ..Default::default() }),
            ..Default::default()
        };
        let el: &TextElement = &update_element(&before, ElementId(1), &patch)[0];
        assert!(el.shadow.enabled);
        assert_eq!(el.shadow.blur, 10.0);
        assert_eq!(el.shadow.offset_x, 2.0);
        assert_eq!(el.stroke.color, RgbaColor::rgb(255, 0, 0));
        assert!(!el.stroke.enabled);
        assert_eq!(el.stroke.width, 2.0);
    }

    #[test]
    fn update_missing_id_is_unchanged() {
        let before: Vec<TextElement> = sample(2);
        let after: Vec<TextElement> = update_element(&before, ElementId(42), &ElementPatch::text("x"));
        assert_eq!(before, after);
    }

    #[test]
    fn patch_rejects_non_positive_size() {
        let el: TextElement = TextElement::new(ElementId(1));
        let out: TextElement = ElementPatch { width: Some(0.0), height: Some(-5.0), ..Default::default() }.apply(&el);
        assert_eq!(out.width, DEFAULT_WIDTH);
        assert_eq!(out.height, DEFAULT_HEIGHT);
    }

    #[test]
    fn add_and_remove() {
        let base: Vec<TextElement> = sample(2);
        let (added, id) = add_element(&base, TextElement::new(ElementId(7)));
        assert_eq!(id, ElementId(7));
        assert_eq!(added.last().map(|e| e.id), Some(ElementId(7)));
        assert_eq!(next_element_id(&added), ElementId(8));

        let (again, taken) = add_element(&added, TextElement::new(ElementId(2)));
        assert_eq!(taken, ElementId(8));
        assert_eq!(again.len(), 4);
        assert_eq!(again.iter().filter(|e| e.id == ElementId(2)).count(), 1);

        let removed: Vec<TextElement> = remove_element(&added, ElementId(1));
        assert_eq!(removed.iter().map(|e| e.id.0).collect::<Vec<_>>(), vec![2, 7]);
        assert_eq!(remove_element(&removed, ElementId(1)), removed);
        assert_eq!(next_element_id(&[]), ElementId(1));
    }

    #[test]
    fn element_json_uses_camel_case() {
        let mut el: TextElement = TextElement::new(ElementId(5));
        el.bg_color.enabled = true;
        let json: serde_json::Value = serde_json::to_value(&el).unwrap();
        assert_eq!(json["bgColor"]["enabled"], serde_json::Value::Bool(true));
        assert_eq!(json["shadow"]["offsetX"], serde_json::json!(2.0));
        assert_eq!(json["color"], serde_json::json!("#ffffff"));
        assert_eq!(json["align"], serde_json::json!("center"));
    }
}
