use image::{GrayImage, Luma, Rgba, RgbaImage};

use super::oe_model::{find_element, ElementId, ImageFilters, RgbaColor, ShadowStyle, TextElement};
use super::oe_text::{wrap_lines, FontSource};

pub const SELECTION_COLOR: RgbaColor = RgbaColor::rgb(59, 130, 246);
pub const HANDLE_RIM_COLOR: RgbaColor = RgbaColor::WHITE;
const DASH_ON: f32 = 6.0;
const DASH_PERIOD: f32 = 10.0;
const OUTLINE_HALF_WIDTH: f32 = 1.0;

/// Draws the composite: filtered base image, then every element bottom to top,
/// then the selection affordance of the active element.
pub struct Renderer<'a> {
    fonts: &'a dyn FontSource,
    handle_size: f32,
}

impl<'a> Renderer<'a> {
    pub fn new(fonts: &'a dyn FontSource, handle_size: f32) -> Self { Self { fonts, handle_size } }

    /// Same inputs always give the same pixels. Without an image nothing is touched.
    pub fn render(&self, surface: &mut RgbaImage, image: Option<&RgbaImage>, filters: &ImageFilters, elements: &[TextElement], active: Option<ElementId>) {
        let Some(image) = image else { return };
        draw_base(surface, image, filters);
        for el in elements { self.draw_element(surface, el); }
        if let Some(el) = active.and_then(|id| find_element(elements, id)) {
            draw_selection(surface, el, self.handle_size);
        }
    }

    fn draw_element(&self, surface: &mut RgbaImage, el: &TextElement) {
        let lines: Vec<String> = wrap_lines(self.fonts, &el.font, el.size, &el.text, el.width);
        let widths: Vec<f32> = lines.iter().map(|l| self.fonts.measure(&el.font, el.size, l)).collect();
        let line_h: f32 = el.line_height();
        let total_h: f32 = lines.len() as f32 * line_h;
        let anchor: f32 = el.align.anchor(el.x, el.width);

        let stroke_r: f32 = if el.stroke.enabled { el.stroke.width / 2.0 } else { 0.0 };
        let shadow: Option<&ShadowStyle> = el.shadow.enabled.then_some(&el.shadow);
        let blur_pad: f32 = shadow.map(|s| (s.blur / 2.0 * 3.0).ceil()).unwrap_or(0.0);
        let shift: f32 = shadow.map(|s| s.offset_x.abs().max(s.offset_y.abs()).ceil()).unwrap_or(0.0);
        let ink_pad: f32 = stroke_r.ceil() + blur_pad + (el.size * 0.25).ceil() + 2.0;
        let pad: f32 = ink_pad + shift;

        let lefts: Vec<f32> = widths.iter().map(|w| el.align.line_left(anchor, *w)).collect();
        let min_left: f32 = lefts.iter().copied().fold(el.x, f32::min);
        let max_right: f32 = lefts.iter().zip(&widths).map(|(l, w)| l + w).fold(el.x + el.width, f32::max);
        let extent: Bounds = (min_left - pad, el.y - pad, max_right + pad, el.y + total_h.max(el.height) + pad);
        let frame: Frame = Frame::of(el);
        let visible: Bounds = frame.visible(surface, pad + 1.0);
        let Some((left, top, right, bottom)) = overlap(extent, visible) else { return };
        let mut layer: Layer = Layer::new(left, top, right, bottom);

        if el.bg_color.enabled {
            layer.fill_rect(el.x, el.y, el.x + el.width, el.y + total_h, el.bg_color.color.to_unit());
        }

        for (i, (line, (left, w))) in lines.iter().zip(lefts.iter().zip(&widths)).enumerate() {
            if line.is_empty() { continue; }
            let line_top: f32 = el.y + i as f32 * line_h;
            let reach: Bounds = (left - ink_pad, line_top - ink_pad, left + w + ink_pad, line_top + line_h + ink_pad);
            let Some((ml, mt, mr, mb)) = overlap(reach, layer.bounds()) else { continue };
            let (ox, oy) = (left.round() as i32, line_top.round() as i32);
            let mut glyphs: Mask = Mask::new(ml, mt, mr - ml, mb - mt);
            self.fonts.draw_line(&el.font, el.size, line, &mut |x, y, cov| glyphs.plot(ox.saturating_add(x), oy.saturating_add(y), cov));

            if stroke_r > 0.0 {
                paint_pass(&mut layer, &glyphs.dilate(stroke_r), el.stroke.color, shadow);
            }
            paint_pass(&mut layer, &glyphs, el.color, shadow);
        }

        composite_rotated(surface, &layer, &frame);
    }
}

/// Copies `image` into `surface` (resizing it to match) through the filter chain.
pub fn draw_base(surface: &mut RgbaImage, image: &RgbaImage, filters: &ImageFilters) {
    if surface.dimensions() != image.dimensions() {
        *surface = RgbaImage::new(image.width(), image.height());
    }
    if filters.is_identity() {
        surface.copy_from_slice(image.as_raw());
        return;
    }
    let pipeline: FilterPipeline = FilterPipeline::new(filters);
    for (dst, src) in surface.pixels_mut().zip(image.pixels()) { *dst = Rgba(pipeline.apply(src.0)); }
}

/// brightness, contrast, grayscale then sepia, each clamped to 0..=1 before the next.
struct FilterPipeline {
    tone: [u8; 256],
    matrices: Vec<[[f32; 3]; 3]>,
}

impl FilterPipeline {
    fn new(filters: &ImageFilters) -> Self {
        let f: ImageFilters = filters.clamped();
        let (b, c) = (f.brightness / 100.0, f.contrast / 100.0);
        let mut tone: [u8; 256] = [0; 256];
        for (i, t) in tone.iter_mut().enumerate() {
            let v: f32 = (i as f32 / 255.0 * b).clamp(0.0, 1.0);
            let v: f32 = ((v - 0.5) * c + 0.5).clamp(0.0, 1.0);
            *t = (v * 255.0).round() as u8;
        }

        let mut matrices: Vec<[[f32; 3]; 3]> = Vec::new();
        if f.grayscale > 0.0 {
            let k: f32 = 1.0 - f.grayscale / 100.0;
            matrices.push([
                [0.2126 + 0.7874 * k, 0.7152 - 0.7152 * k, 0.0722 - 0.0722 * k],
                [0.2126 - 0.2126 * k, 0.7152 + 0.2848 * k, 0.0722 - 0.0722 * k],
                [0.2126 - 0.2126 * k, 0.7152 - 0.7152 * k, 0.0722 + 0.9278 * k],
            ]);
        }
        if f.sepia > 0.0 {
            let k: f32 = 1.0 - f.sepia / 100.0;
            matrices.push([
                [0.393 + 0.607 * k, 0.769 - 0.769 * k, 0.189 - 0.189 * k],
                [0.349 - 0.349 * k, 0.686 + 0.314 * k, 0.168 - 0.168 * k],
                [0.272 - 0.272 * k, 0.534 - 0.534 * k, 0.131 + 0.869 * k],
            ]);
        }
        Self { tone, matrices }
    }

    fn apply(&self, [r, g, b, a]: [u8; 4]) -> [u8; 4] {
        let toned: [u8; 3] = [self.tone[r as usize], self.tone[g as usize], self.tone[b as usize]];
        if self.matrices.is_empty() { return [toned[0], toned[1], toned[2], a]; }

        let mut v: [f32; 3] = toned.map(|c| c as f32 / 255.0);
        for m in &self.matrices {
            v = [0, 1, 2].map(|row| (m[row][0] * v[0] + m[row][1] * v[1] + m[row][2] * v[2]).clamp(0.0, 1.0));
        }
        let [r, g, b] = v.map(|c| (c * 255.0).round() as u8);
        [r, g, b, a]
    }
}

/// `(left, top, right, bottom)` in image pixels.
type Bounds = (f32, f32, f32, f32);

/// Keeps layer coordinates far enough from the `i32` limits that offsets never overflow.
const COORD_LIMIT: f32 = (i32::MAX / 4) as f32;

/// Integer pixel rect covering the overlap of `a` and `b`, if there is one
/// and it fits comfortably in `i32`.
fn overlap(a: Bounds, b: Bounds) -> Option<(i32, i32, i32, i32)> {
    let (l, t) = (a.0.max(b.0).floor(), a.1.max(b.1).floor());
    let (r, bt) = (a.2.min(b.2).ceil(), a.3.min(b.3).ceil());
    if !(r > l && bt > t) || [l, t, r, bt].iter().any(|v| v.abs() > COORD_LIMIT) { return None; }
    Some((l as i32, t as i32, r as i32, bt as i32))
}

/// Straight-alpha RGBA scratch buffer positioned in image coordinates.
struct Layer { left: i32, top: i32, w: usize, h: usize, px: Vec<[f32; 4]> }

impl Layer {
    fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        let w: usize = (right - left).max(1) as usize;
        let h: usize = (bottom - top).max(1) as usize;
        Self { left, top, w, h, px: vec![[0.0; 4]; w * h] }
    }

    fn bounds(&self) -> Bounds {
        (self.left as f32, self.top as f32, (self.left + self.w as i32) as f32, (self.top + self.h as i32) as f32)
    }

    fn get(&self, x: i32, y: i32) -> Option<[f32; 4]> {
        let (tx, ty) = (x.saturating_sub(self.left), y.saturating_sub(self.top));
        if tx < 0 || ty < 0 || tx >= self.w as i32 || ty >= self.h as i32 { return None; }
        Some(self.px[ty as usize * self.w + tx as usize])
    }

    fn blend(&mut self, x: i32, y: i32, color: [f32; 4], cov: f32) {
        let (tx, ty) = (x.saturating_sub(self.left), y.saturating_sub(self.top));
        if tx < 0 || ty < 0 || tx >= self.w as i32 || ty >= self.h as i32 { return; }
        let src_a: f32 = (cov * color[3]).clamp(0.0, 1.0);
        if src_a <= 0.0 { return; }
        let dst: &mut [f32; 4] = &mut self.px[ty as usize * self.w + tx as usize];
        let out_a: f32 = src_a + dst[3] * (1.0 - src_a);
        if out_a < 1e-5 { return; }
        for i in 0..3 { dst[i] = (color[i] * src_a + dst[i] * dst[3] * (1.0 - src_a)) / out_a; }
        dst[3] = out_a;
    }

    /// Fills the part of the rect that falls inside the layer.
    fn fill_rect(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, color: [f32; 4]) {
        let Some((l, t, r, b)) = overlap((x0.round(), y0.round(), x1.round(), y1.round()), self.bounds()) else { return };
        for y in t..b {
            for x in l..r { self.blend(x, y, color, 1.0); }
        }
    }
}

/// Single-channel coverage in image coordinates.
struct Mask { left: i32, top: i32, w: usize, h: usize, cov: Vec<f32> }

impl Mask {
    fn new(left: i32, top: i32, w: i32, h: i32) -> Self {
        let (w, h) = (w.max(1) as usize, h.max(1) as usize);
        Self { left, top, w, h, cov: vec![0.0; w * h] }
    }

    fn at(&self, tx: i32, ty: i32) -> f32 {
        if tx < 0 || ty < 0 || tx >= self.w as i32 || ty >= self.h as i32 { return 0.0; }
        self.cov[ty as usize * self.w + tx as usize]
    }

    fn plot(&mut self, x: i32, y: i32, cov: f32) {
        let (tx, ty) = (x.saturating_sub(self.left), y.saturating_sub(self.top));
        if tx < 0 || ty < 0 || tx >= self.w as i32 || ty >= self.h as i32 { return; }
        let c: &mut f32 = &mut self.cov[ty as usize * self.w + tx as usize];
        *c = c.max(cov.clamp(0.0, 1.0));
    }

    /// Grows coverage outward by `radius`, the half of an outline that lies outside the glyph.
    fn dilate(&self, radius: f32) -> Mask {
        let reach: i32 = radius.ceil() as i32;
        let offsets: Vec<(i32, i32, f32)> = (-reach..=reach)
            .flat_map(|dy| (-reach..=reach).map(move |dx| (dx, dy)))
            .filter_map(|(dx, dy)| {
                let weight: f32 = (radius + 0.5 - ((dx * dx + dy * dy) as f32).sqrt()).clamp(0.0, 1.0);
                (weight > 0.0).then_some((dx, dy, weight))
            })
            .collect();

        let mut out: Mask = Mask { left: self.left, top: self.top, w: self.w, h: self.h, cov: vec![0.0; self.cov.len()] };
        for ty in 0..self.h as i32 {
            for tx in 0..self.w as i32 {
                let c: f32 = offsets.iter().map(|(dx, dy, wgt)| self.at(tx + dx, ty + dy) * wgt).fold(0.0, f32::max);
                out.cov[ty as usize * self.w + tx as usize] = c;
            }
        }
        out
    }

    fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.w as u32, self.h as u32, |x, y| {
            Luma([(self.cov[y as usize * self.w + x as usize] * 255.0).round() as u8])
        })
    }
}

/// Draws `mask` in `color`, preceded by its shadow when one is configured.
fn paint_pass(layer: &mut Layer, mask: &Mask, color: RgbaColor, shadow: Option<&ShadowStyle>) {
    if let Some(s) = shadow {
        let sigma: f32 = s.blur / 2.0;
        let hard: GrayImage = mask.to_gray();
        let soft: GrayImage = if sigma > 0.0 { image::imageops::blur(&hard, sigma) } else { hard };
        let (dx, dy) = (s.offset_x.round() as i32, s.offset_y.round() as i32);
        let tint: [f32; 4] = s.color.to_unit();
        for (x, y, p) in soft.enumerate_pixels() {
            if p.0[0] == 0 { continue; }
            layer.blend(mask.left + x as i32 + dx, mask.top + y as i32 + dy, tint, p.0[0] as f32 / 255.0);
        }
    }
    let ink: [f32; 4] = color.to_unit();
    for (i, cov) in mask.cov.iter().enumerate() {
        if *cov <= 0.0 { continue; }
        layer.blend(mask.left + (i % mask.w) as i32, mask.top + (i / mask.w) as i32, ink, *cov);
    }
}

fn blend_pixel(dst: &mut Rgba<u8>, src: [f32; 4]) {
    let src_a: f32 = src[3];
    if src_a < 1e-5 { return; }
    let d: [u8; 4] = dst.0;
    let dst_a: f32 = d[3] as f32 / 255.0;
    let out_a: f32 = (src_a + dst_a * (1.0 - src_a)).min(1.0);
    if out_a < 1e-5 { return; }
    let mix = |s: f32, d: u8| -> u8 {
        ((s * src_a + d as f32 / 255.0 * dst_a * (1.0 - src_a)) / out_a * 255.0).round().clamp(0.0, 255.0) as u8
    };
    *dst = Rgba([mix(src[0], d[0]), mix(src[1], d[1]), mix(src[2], d[2]), (out_a * 255.0).round().min(255.0) as u8]);
}

/// An element's rotation about its box center. Kept in `f64` so boxes far
/// from the origin still map to the right pixels.
struct Frame { cx: f64, cy: f64, sin_a: f64, cos_a: f64 }

impl Frame {
    fn of(el: &TextElement) -> Self {
        let (sin_a, cos_a) = (el.rotation as f64).to_radians().sin_cos();
        Self { cx: el.x as f64 + el.width as f64 / 2.0, cy: el.y as f64 + el.height as f64 / 2.0, sin_a, cos_a }
    }

    /// Unrotated frame to surface.
    fn to_surface(&self, x: f64, y: f64) -> (f64, f64) {
        let (dx, dy) = (x - self.cx, y - self.cy);
        (self.cx + dx * self.cos_a - dy * self.sin_a, self.cy + dx * self.sin_a + dy * self.cos_a)
    }

    /// Surface point back into the unrotated frame.
    fn to_local(&self, x: f64, y: f64) -> (f64, f64) {
        let (dx, dy) = (x - self.cx, y - self.cy);
        (self.cx + dx * self.cos_a + dy * self.sin_a, self.cy - dx * self.sin_a + dy * self.cos_a)
    }

    /// Centre of surface pixel `(px, py)` in the unrotated frame.
    fn pixel_to_local(&self, px: i32, py: i32) -> (f32, f32) {
        let (x, y) = self.to_local(px as f64 + 0.5, py as f64 + 0.5);
        (x as f32, y as f32)
    }

    /// Pixel range of the surface covered by the local rect once rotated.
    fn surface_range(&self, surface: &RgbaImage, (l, t, r, b): Bounds) -> (i32, i32, i32, i32) {
        let (l, t, r, b) = (l as f64, t as f64, r as f64, b as f64);
        let corners: [(f64, f64); 4] = [(l, t), (r, t), (r, b), (l, b)].map(|(x, y)| self.to_surface(x, y));
        let min_x: i32 = (corners.iter().map(|c| c.0).fold(f64::MAX, f64::min).floor() as i32).max(0);
        let max_x: i32 = (corners.iter().map(|c| c.0).fold(f64::MIN, f64::max).ceil() as i32).min(surface.width() as i32);
        let min_y: i32 = (corners.iter().map(|c| c.1).fold(f64::MAX, f64::min).floor() as i32).max(0);
        let max_y: i32 = (corners.iter().map(|c| c.1).fold(f64::MIN, f64::max).ceil() as i32).min(surface.height() as i32);
        (min_x, min_y, max_x, max_y)
    }

    /// The surface's extent in the unrotated frame, grown by `margin`.
    fn visible(&self, surface: &RgbaImage, margin: f32) -> Bounds {
        let (w, h) = (surface.width() as f64, surface.height() as f64);
        let corners: [(f64, f64); 4] = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)].map(|(x, y)| self.to_local(x, y));
        let m: f64 = margin as f64;
        (
            (corners.iter().map(|c| c.0).fold(f64::MAX, f64::min) - m) as f32,
            (corners.iter().map(|c| c.1).fold(f64::MAX, f64::min) - m) as f32,
            (corners.iter().map(|c| c.0).fold(f64::MIN, f64::max) + m) as f32,
            (corners.iter().map(|c| c.1).fold(f64::MIN, f64::max) + m) as f32,
        )
    }
}

fn composite_rotated(surface: &mut RgbaImage, layer: &Layer, frame: &Frame) {
    let (min_x, min_y, max_x, max_y) = frame.surface_range(surface, layer.bounds());

    for py in min_y..max_y {
        for px in min_x..max_x {
            let (lx, ly) = frame.pixel_to_local(px, py);
            let Some(src) = layer.get(lx.floor() as i32, ly.floor() as i32) else { continue };
            blend_pixel(surface.get_pixel_mut(px as u32, py as u32), src);
        }
    }
}

/// Dashed box outline plus four corner handles, in the element's rotated frame.
pub fn draw_selection(surface: &mut RgbaImage, el: &TextElement, handle_size: f32) {
    let g = el.geometry();
    let frame: Frame = Frame::of(el);
    let half: f32 = handle_size / 2.0;
    let rect: Bounds = (g.x - half - 1.0, g.y - half - 1.0, g.right() + half + 1.0, g.bottom() + half + 1.0);
    let (min_x, min_y, max_x, max_y) = frame.surface_range(surface, rect);
    let corners: [(f32, f32); 4] = [(g.x, g.y), (g.right(), g.y), (g.right(), g.bottom()), (g.x, g.bottom())];
    let accent: [f32; 4] = SELECTION_COLOR.to_unit();
    let rim: [f32; 4] = HANDLE_RIM_COLOR.to_unit();

    for py in min_y..max_y {
        for px in min_x..max_x {
            let (lx, ly) = frame.pixel_to_local(px, py);

            let handle: Option<f32> = corners.iter()
                .map(|(hx, hy)| (lx - hx).abs().max((ly - hy).abs()))
                .find(|d| *d <= half);
            if let Some(d) = handle {
                blend_pixel(surface.get_pixel_mut(px as u32, py as u32), if d > half - 1.0 { rim } else { accent });
                continue;
            }

            let in_x: bool = lx >= g.x && lx <= g.right();
            let in_y: bool = ly >= g.y && ly <= g.bottom();
            let along: Option<f32> = if in_y && ((lx - g.x).abs() <= OUTLINE_HALF_WIDTH || (lx - g.right()).abs() <= OUTLINE_HALF_WIDTH) {
                Some(ly - g.y)
            } else if in_x && ((ly - g.y).abs() <= OUTLINE_HALF_WIDTH || (ly - g.bottom()).abs() <= OUTLINE_HALF_WIDTH) {
                Some(lx - g.x)
            } else {
                None
            };
            if along.is_some_and(|t| t.rem_euclid(DASH_PERIOD) < DASH_ON) {
                blend_pixel(surface.get_pixel_mut(px as u32, py as u32), accent);
            }
        }
    }
}
