use ab_glyph::FontArc;
use image::RgbaImage;
use log::debug;

use crate::layer::Layer;
use crate::raster::{self, Paint};

/// Everything a render pass needs besides the layers themselves
#[derive(Clone)]
pub struct RenderContext {
    pub width: u32,
    pub height: u32,
    pub font: Option<FontArc>,
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("font", &self.font.as_ref().map(|_| "<font>"))
            .finish()
    }
}

impl RenderContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            font: None,
        }
    }

    /// A transparent buffer of canvas size
    pub fn blank(&self) -> RgbaImage {
        RgbaImage::new(self.width, self.height)
    }
}

/// Rasterize one layer's content onto a transparent canvas-sized buffer.
///
/// Layer opacity and blend mode are not applied here.
pub fn render_layer(layer: &Layer, ctx: &RenderContext, paint: Paint) -> RgbaImage {
    let mut buffer = ctx.blank();
    for drawable in &layer.content {
        raster::draw_drawable(&mut buffer, drawable, ctx.font.as_ref(), paint);
    }
    buffer
}

/// Composite `layers` bottom to top, skipping hidden ones.
///
/// Callers pass layers already in canonical order.
pub fn composite<'a>(layers: impl IntoIterator<Item = &'a Layer>, ctx: &RenderContext) -> RgbaImage {
    let mut surface = ctx.blank();
    for layer in layers {
        if !layer.visible || layer.is_empty() {
            continue;
        }
        let buffer = render_layer(layer, ctx, Paint::Natural);
        raster::blend_layer(&mut surface, &buffer, layer.blend_mode, layer.opacity);
    }
    surface
}

/// Owns the visible surface. Renders are requested per mutation and
/// performed at most once per `present`.
#[derive(Debug)]
pub struct Compositor {
    surface: RgbaImage,
    render_requested: bool,
    render_count: u64,
}

impl Compositor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface: RgbaImage::new(width, height),
            render_requested: true,
            render_count: 0,
        }
    }

    /// Mark the surface stale. Cheap; call on every mutation.
    pub fn request_render(&mut self) {
        self.render_requested = true;
    }

    pub fn is_render_requested(&self) -> bool {
        self.render_requested
    }

    /// Number of full render passes performed so far
    pub fn render_count(&self) -> u64 {
        self.render_count
    }

    /// Bring the surface up to date if a render was requested and return it
    pub fn present<'a>(&mut self, layers: impl IntoIterator<Item = &'a Layer>, ctx: &RenderContext) -> &RgbaImage {
        if self.render_requested {
            self.surface = composite(layers, ctx);
            self.render_requested = false;
            self.render_count += 1;
            debug!("Rendered canvas surface (pass {})", self.render_count);
        }
        &self.surface
    }
}
