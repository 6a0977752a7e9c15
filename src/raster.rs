//! CPU rasterization of drawables into straight-alpha RGBA buffers.
//!
//! Everything here is a pure function of its inputs so that two renders of
//! the same content produce identical pixels.

use ab_glyph::{Font, FontArc, PxScale, ScaleFont, point};
use egui::{Color32, Pos2, Rect, pos2};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage, Rgba, RgbaImage};

use crate::element::{
    Drawable, Element, ImageObject, Shape, ShapeKind, Stroke, StrokeMode, TextObject, distance_to_line_segment,
};
use crate::layer::BlendMode;

/// Horizontal shear applied to synthesize italics
const ITALIC_SHEAR: f32 = 0.2;

/// Colour source used when painting a drawable
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Paint {
    /// Each object's own colours
    Natural,
    /// Every painted pixel gets this colour (coverage still applies)
    Solid([u8; 4]),
}

impl Paint {
    fn pick(self, natural: Color32) -> [u8; 4] {
        match self {
            Paint::Natural => natural.to_srgba_unmultiplied(),
            Paint::Solid(color) => color,
        }
    }
}

/// Pixel bounds `(x0, y0, x1, y1)` (exclusive end) of `rect` clipped to the image.
fn pixel_bounds(rect: Rect, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    if !(rect.min.x.is_finite() && rect.min.y.is_finite() && rect.max.x.is_finite() && rect.max.y.is_finite()) {
        return None;
    }
    let x0 = rect.min.x.floor().max(0.0) as u32;
    let y0 = rect.min.y.floor().max(0.0) as u32;
    let x1 = (rect.max.x.ceil().max(0.0) as u32).min(width);
    let y1 = (rect.max.y.ceil().max(0.0) as u32).min(height);
    (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
}

fn pixel_center(x: u32, y: u32) -> Pos2 {
    pos2(x as f32 + 0.5, y as f32 + 0.5)
}

/// Source-over of a straight-alpha colour with partial coverage
pub fn blend_over(dst: &mut Rgba<u8>, src: [u8; 4], coverage: f32) {
    let src_a = src[3] as f32 / 255.0 * coverage.clamp(0.0, 1.0);
    if src_a <= 0.0 {
        return;
    }
    let dst_a = dst[3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    for c in 0..3 {
        let s = src[c] as f32;
        let d = dst[c] as f32;
        let v = (s * src_a + d * dst_a * (1.0 - src_a)) / out_a;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// Removes `coverage` worth of alpha from a pixel
fn erase(dst: &mut Rgba<u8>, coverage: f32) {
    let keep = 1.0 - coverage.clamp(0.0, 1.0);
    dst[3] = (dst[3] as f32 * keep).round() as u8;
    if dst[3] == 0 {
        *dst = Rgba([0, 0, 0, 0]);
    }
}

/// Coverage accumulated over a sub-rectangle before being applied once.
///
/// Keeps overlapping segments of one stroke from darkening each other.
struct CoverageMask {
    x0: u32,
    y0: u32,
    width: u32,
    values: Vec<f32>,
}

impl CoverageMask {
    fn new((x0, y0, x1, y1): (u32, u32, u32, u32)) -> Self {
        let width = x1 - x0;
        Self {
            x0,
            y0,
            width,
            values: vec![0.0; (width * (y1 - y0)) as usize],
        }
    }

    fn raise(&mut self, x: u32, y: u32, coverage: f32) {
        let idx = ((y - self.y0) * self.width + (x - self.x0)) as usize;
        if let Some(v) = self.values.get_mut(idx) {
            *v = v.max(coverage.clamp(0.0, 1.0));
        }
    }

    fn apply(&self, target: &mut RgbaImage, mut op: impl FnMut(&mut Rgba<u8>, f32)) {
        for (i, coverage) in self.values.iter().enumerate() {
            if *coverage <= 0.0 {
                continue;
            }
            let x = self.x0 + (i as u32 % self.width);
            let y = self.y0 + (i as u32 / self.width);
            op(target.get_pixel_mut(x, y), *coverage);
        }
    }
}

/// Coverage of a pixel centre at distance `d` from a line of half-width `r`, 1px anti-aliased
fn line_coverage(d: f32, r: f32) -> f32 {
    (r + 0.5 - d).clamp(0.0, 1.0)
}

pub fn draw_stroke(target: &mut RgbaImage, stroke: &Stroke, paint: Paint) {
    let (width, height) = target.dimensions();
    let r = stroke.width() / 2.0;
    let Some(bounds) = pixel_bounds(stroke.rect().expand(1.0), width, height) else {
        return;
    };
    let mut mask = CoverageMask::new(bounds);
    let points = stroke.points();
    let segments: Vec<(Pos2, Pos2)> = match points {
        [] => return,
        [single] => vec![(*single, *single)],
        _ => points.windows(2).map(|w| (w[0], w[1])).collect(),
    };
    for (a, b) in segments {
        let seg_rect = Rect::from_two_pos(a, b).expand(r + 1.0);
        let Some((x0, y0, x1, y1)) = pixel_bounds(seg_rect, width, height) else {
            continue;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                let d = distance_to_line_segment(pixel_center(x, y), a, b);
                let c = line_coverage(d, r);
                if c > 0.0 {
                    mask.raise(x, y, c);
                }
            }
        }
    }
    match stroke.mode() {
        StrokeMode::Paint => {
            let color = paint.pick(stroke.color());
            mask.apply(target, |px, c| blend_over(px, color, c));
        }
        StrokeMode::Erase => mask.apply(target, erase),
    }
}

/// Distance from `p` to the outline of `shape`
fn distance_to_outline(shape: &Shape, p: Pos2) -> f32 {
    let bounds = shape.bounds();
    match shape.kind() {
        ShapeKind::Rectangle => {
            let corners = [
                bounds.left_top(),
                bounds.right_top(),
                bounds.right_bottom(),
                bounds.left_bottom(),
            ];
            closed_polyline_distance(p, &corners)
        }
        ShapeKind::Ellipse => {
            let center = bounds.center();
            let rx = bounds.width() / 2.0;
            let ry = bounds.height() / 2.0;
            if rx <= 0.0 || ry <= 0.0 {
                return f32::INFINITY;
            }
            let nx = (p.x - center.x) / rx;
            let ny = (p.y - center.y) / ry;
            ((nx * nx + ny * ny).sqrt() - 1.0).abs() * rx.min(ry)
        }
        ShapeKind::Polygon(points) => closed_polyline_distance(p, points),
    }
}

fn closed_polyline_distance(p: Pos2, points: &[Pos2]) -> f32 {
    match points {
        [] => f32::INFINITY,
        [single] => (p - *single).length(),
        _ => (0..points.len())
            .map(|i| distance_to_line_segment(p, points[i], points[(i + 1) % points.len()]))
            .fold(f32::INFINITY, f32::min),
    }
}

pub fn draw_shape(target: &mut RgbaImage, shape: &Shape, paint: Paint) {
    let (width, height) = target.dimensions();
    let style = shape.style();
    let half = style.stroke_width / 2.0;
    let Some(bounds) = pixel_bounds(shape.bounds().expand(half + 1.0), width, height) else {
        return;
    };

    if let Some(fill) = style.fill {
        let color = paint.pick(fill);
        for y in bounds.1..bounds.3 {
            for x in bounds.0..bounds.2 {
                if shape.contains(pixel_center(x, y)) {
                    blend_over(target.get_pixel_mut(x, y), color, 1.0);
                }
            }
        }
    }

    if style.stroke_width > 0.0 {
        let color = paint.pick(style.stroke_color);
        let mut mask = CoverageMask::new(bounds);
        for y in bounds.1..bounds.3 {
            for x in bounds.0..bounds.2 {
                let c = line_coverage(distance_to_outline(shape, pixel_center(x, y)), half);
                if c > 0.0 {
                    mask.raise(x, y, c);
                }
            }
        }
        mask.apply(target, |px, c| blend_over(px, color, c));
    }
}

/// Rasterizes text with `font`. Without a font nothing is drawn.
pub fn draw_text(target: &mut RgbaImage, text: &TextObject, font: Option<&FontArc>, paint: Paint) {
    let Some(font) = font else {
        return;
    };
    let (width, height) = target.dimensions();
    let style = text.style();
    let scale = PxScale::from(style.font_size.max(1.0));
    let scaled = font.as_scaled(scale);
    let origin = text.position();
    let mut mask = CoverageMask::new((0, 0, width, height));

    for (line_idx, line) in text.text().split('\n').enumerate() {
        let baseline = origin.y + scaled.ascent() + line_idx as f32 * scaled.height();
        let mut cursor_x = origin.x;
        let mut previous = None;
        for ch in line.chars() {
            let glyph_id = font.glyph_id(ch);
            if let Some(prev) = previous {
                cursor_x += scaled.kern(prev, glyph_id);
            }
            previous = Some(glyph_id);
            let glyph = glyph_id.with_scale_and_position(scale, point(cursor_x, baseline));
            cursor_x += scaled.h_advance(glyph_id);

            let Some(outlined) = font.outline_glyph(glyph) else {
                continue;
            };
            let px = outlined.px_bounds();
            let passes: &[f32] = if style.bold { &[0.0, 1.0] } else { &[0.0] };
            outlined.draw(|gx, gy, coverage| {
                let y = px.min.y + gy as f32;
                let shear = if style.italic { (baseline - y) * ITALIC_SHEAR } else { 0.0 };
                for offset in passes {
                    let x = (px.min.x + gx as f32 + shear + offset).round();
                    if x >= 0.0 && y >= 0.0 && (x as u32) < width && (y as u32) < height {
                        mask.raise(x as u32, y as u32, coverage);
                    }
                }
            });
        }
    }

    let color = paint.pick(style.color);
    mask.apply(target, |px, c| blend_over(px, color, c));
}

/// Draws an image object at its placement, resampled to its display size
pub fn draw_image(target: &mut RgbaImage, image: &ImageObject, paint: Paint) {
    let Some(source) = image.to_rgba_image() else {
        log::error!("Image object {} has a malformed pixel buffer", image.id());
        return;
    };
    let size = image.display_size();
    let display_w = size.x.round().max(1.0) as u32;
    let display_h = size.y.round().max(1.0) as u32;
    let resized = if (display_w, display_h) == source.dimensions() {
        source
    } else {
        imageops::resize(&source, display_w, display_h, FilterType::Triangle)
    };

    let placement = image.placement();
    let left = placement.left.round() as i64;
    let top = placement.top.round() as i64;
    let (width, height) = target.dimensions();
    for (sx, sy, px) in resized.enumerate_pixels() {
        let x = left + sx as i64;
        let y = top + sy as i64;
        if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
            continue;
        }
        let color = match paint {
            Paint::Natural => px.0,
            Paint::Solid(c) => [c[0], c[1], c[2], ((c[3] as u16 * px[3] as u16) / 255) as u8],
        };
        blend_over(target.get_pixel_mut(x as u32, y as u32), color, 1.0);
    }
}

pub fn draw_drawable(target: &mut RgbaImage, drawable: &Drawable, font: Option<&FontArc>, paint: Paint) {
    match drawable {
        Drawable::Stroke(stroke) => draw_stroke(target, stroke, paint),
        Drawable::Shape(shape) => draw_shape(target, shape, paint),
        Drawable::Text(text) => draw_text(target, text, font, paint),
        Drawable::Image(image) => draw_image(target, image, paint),
    }
}

fn overlay_channel(base: f32, top: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * top
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - top)
    }
}

/// Blend one pixel of a layer onto the pixel below it
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: f32) -> Rgba<u8> {
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    if matches!(mode, BlendMode::Normal) && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let top_a = top[3] as f32 / 255.0 * opacity.clamp(0.0, 1.0);
    let base_a = base[3] as f32 / 255.0;
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let b = base[c] as f32 / 255.0;
        let t = top[c] as f32 / 255.0;
        let mixed = match mode {
            BlendMode::Normal => t,
            BlendMode::Multiply => b * t,
            BlendMode::Screen => 1.0 - (1.0 - b) * (1.0 - t),
            BlendMode::Overlay => overlay_channel(b, t),
            BlendMode::Darken => b.min(t),
            BlendMode::Lighten => b.max(t),
        };
        let v = (top_a * ((1.0 - base_a) * t + base_a * mixed) + base_a * (1.0 - top_a) * b) / out_a;
        out[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

/// Blend a whole layer buffer onto `target`. Both buffers must share dimensions.
pub fn blend_layer(target: &mut RgbaImage, layer: &RgbaImage, mode: BlendMode, opacity: f32) {
    for (dst, src) in target.pixels_mut().zip(layer.pixels()) {
        *dst = blend_pixel(*dst, *src, mode, opacity);
    }
}

/// Drop alpha by compositing over an opaque background colour
pub fn flatten(image: &RgbaImage, background: Color32) -> RgbImage {
    let [br, bg, bb, _] = background.to_srgba_unmultiplied();
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let mut px = Rgba([br, bg, bb, 255]);
        blend_over(&mut px, image.get_pixel(x, y).0, 1.0);
        Rgb([px[0], px[1], px[2]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ShapeStyle, TextStyle};
    use egui::vec2;

    #[test]
    fn test_stroke_paints_along_its_path() {
        let mut img = RgbaImage::new(20, 20);
        let stroke = Stroke::new(vec![pos2(2.0, 10.0), pos2(18.0, 10.0)], Color32::RED, 4.0);
        draw_stroke(&mut img, &stroke, Paint::Natural);
        assert_eq!(img.get_pixel(10, 10).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(10, 2)[3], 0);
    }

    #[test]
    fn test_eraser_clears_pixels() {
        let mut img = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 255, 255]));
        let eraser = Stroke::eraser(vec![pos2(0.0, 10.0), pos2(20.0, 10.0)], 6.0);
        draw_stroke(&mut img, &eraser, Paint::Natural);
        assert_eq!(img.get_pixel(10, 10)[3], 0);
        assert_eq!(img.get_pixel(10, 0)[3], 255);
    }

    #[test]
    fn test_filled_rectangle_and_solid_paint() {
        let mut img = RgbaImage::new(10, 10);
        let shape = Shape::new(
            ShapeKind::Rectangle,
            Rect::from_min_size(pos2(2.0, 2.0), vec2(4.0, 4.0)),
            ShapeStyle::filled(Color32::GREEN),
        );
        draw_shape(&mut img, &shape, Paint::Solid([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(3, 3).0, [255, 255, 255, 255]);
        assert_eq!(img.get_pixel(8, 8)[3], 0);
    }

    #[test]
    fn test_text_without_font_draws_nothing() {
        let mut img = RgbaImage::new(10, 10);
        let text = TextObject::new("abc", pos2(0.0, 0.0), TextStyle::default());
        draw_text(&mut img, &text, None, Paint::Natural);
        assert!(img.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_blend_modes() {
        let base = Rgba([200, 100, 50, 255]);
        let top = Rgba([100, 100, 100, 255]);
        assert_eq!(blend_pixel(base, top, BlendMode::Normal, 1.0), top);
        assert_eq!(blend_pixel(base, top, BlendMode::Darken, 1.0), Rgba([100, 100, 50, 255]));
        assert_eq!(blend_pixel(base, top, BlendMode::Lighten, 1.0), Rgba([200, 100, 100, 255]));
        // Zero opacity leaves the base untouched
        assert_eq!(blend_pixel(base, top, BlendMode::Multiply, 0.0), base);
    }

    #[test]
    fn test_flatten_over_white() {
        let img = RgbaImage::new(2, 2);
        let flat = flatten(&img, Color32::WHITE);
        assert_eq!(flat.get_pixel(0, 0).0, [255, 255, 255]);
    }
}
