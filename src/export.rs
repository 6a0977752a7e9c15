//! Canonical artifacts produced from a frozen copy of the canvas.
//!
//! Exports never read the live layer store. [`LayerStore::snapshot`] hands
//! out a [`CanvasSnapshot`] and every export is a pure function of it, so
//! encoding can run while the user keeps editing.
//!
//! [`LayerStore::snapshot`]: crate::LayerStore::snapshot

use std::fmt;

use egui::Color32;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops;
use image::{DynamicImage, ExtendedColorType, GrayImage, ImageEncoder, RgbaImage};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::compositor::{self, RenderContext};
use crate::element::TextObject;
use crate::error::{CanvasError, CanvasResult};
use crate::event::{ContentAnalysis, analyze_content};
use crate::layer::{Layer, LayerKind, LayerSummary};
use crate::raster::{self, Paint};
use crate::state::CanvasState;
use crate::util::time;

const WHITE: [u8; 4] = [255, 255, 255, 255];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Webp => "webp",
        }
    }
}

/// Encoded image bytes plus what is needed to interpret them
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl EncodedImage {
    /// Decode back into pixels
    pub fn decode(&self) -> CanvasResult<RgbaImage> {
        Ok(image::load_from_memory(&self.bytes)?.to_rgba8())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

/// Description of the canvas sent along with the images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub layers: Vec<LayerSummary>,
    pub text_objects: Vec<TextObject>,
    pub canvas_size: CanvasSize,
    pub analysis: ContentAnalysis,
    /// Milliseconds since the UNIX epoch
    pub exported_at: u64,
}

/// Everything the generation adapter receives
#[derive(Debug, Clone, PartialEq)]
pub struct ExportBundle {
    pub full_image: EncodedImage,
    pub drawing: EncodedImage,
    pub base_image: Option<EncodedImage>,
    pub mask: EncodedImage,
    pub metadata: ExportMetadata,
}

impl ExportBundle {
    /// 64-bit FNV-1a hash of the drawing layer bytes, usable as a cache key
    pub fn drawing_fingerprint(&self) -> u64 {
        fingerprint(&self.drawing.bytes)
    }
}

pub fn fingerprint(bytes: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    bytes
        .iter()
        .fold(FNV_OFFSET, |hash, b| (hash ^ *b as u64).wrapping_mul(FNV_PRIME))
}

/// Knobs the exports need from the canvas configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportOptions {
    pub background: Color32,
    pub mask_blur_sigma: f32,
    pub thumbnail_size: u32,
}

/// Immutable copy of layer content taken at one instant
#[derive(Debug, Clone)]
pub struct CanvasSnapshot {
    /// Canonical order, bottom to top
    layers: Vec<Layer>,
    ctx: RenderContext,
    options: ExportOptions,
    state: CanvasState,
}

impl CanvasSnapshot {
    pub fn new(layers: Vec<Layer>, ctx: RenderContext, options: ExportOptions, state: CanvasState) -> Self {
        Self {
            layers,
            ctx,
            options,
            state,
        }
    }

    pub fn width(&self) -> u32 {
        self.ctx.width
    }

    pub fn height(&self) -> u32 {
        self.ctx.height
    }

    pub fn state(&self) -> &CanvasState {
        &self.state
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn layer(&self, kind: LayerKind) -> Option<&Layer> {
        self.layers.iter().find(|l| l.kind == kind)
    }

    /// Composite of all visible layers
    pub fn composite(&self) -> RgbaImage {
        compositor::composite(&self.layers, &self.ctx)
    }
}

/// Produces encoded artifacts from a [`CanvasSnapshot`].
#[derive(Debug, Clone)]
pub struct ExportEngine {
    snapshot: CanvasSnapshot,
}

impl ExportEngine {
    pub fn new(snapshot: CanvasSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &CanvasSnapshot {
        &self.snapshot
    }

    /// Drawing layer alone on a transparent background.
    ///
    /// An empty drawing layer gives a fully transparent image.
    pub fn export_drawing_layer(&self) -> CanvasResult<EncodedImage> {
        let pixels = match self.snapshot.layer(LayerKind::Drawing) {
            Some(layer) => compositor::render_layer(layer, &self.snapshot.ctx, Paint::Natural),
            None => self.snapshot.ctx.blank(),
        };
        encode_rgba(&pixels, ImageFormat::Png, 100, self.snapshot.options.background)
    }

    /// Base image rendered at canvas size, `None` when there is no base image
    pub fn export_base_image(&self) -> CanvasResult<Option<EncodedImage>> {
        let Some(layer) = self.snapshot.layer(LayerKind::Base).filter(|l| !l.is_empty()) else {
            return Ok(None);
        };
        let pixels = compositor::render_layer(layer, &self.snapshot.ctx, Paint::Natural);
        encode_rgba(&pixels, ImageFormat::Png, 100, self.snapshot.options.background).map(Some)
    }

    /// Modification mask: white where the mask layer has content, black elsewhere,
    /// with softened edges. Always a greyscale PNG.
    pub fn export_mask(&self) -> CanvasResult<EncodedImage> {
        let (width, height) = (self.snapshot.width(), self.snapshot.height());
        let mask = match self.snapshot.layer(LayerKind::Mask).filter(|l| !l.is_empty()) {
            Some(layer) => {
                let painted = compositor::render_layer(layer, &self.snapshot.ctx, Paint::Solid(WHITE));
                let gray = DynamicImage::ImageRgb8(raster::flatten(&painted, Color32::BLACK)).to_luma8();
                let sigma = self.snapshot.options.mask_blur_sigma;
                if sigma > 0.0 { imageops::blur(&gray, sigma) } else { gray }
            }
            None => GrayImage::new(width, height),
        };
        encode_gray(&mask)
    }

    /// All visible layers composited, in the requested format.
    ///
    /// `quality` (1..=100) only affects JPEG; WEBP is always lossless.
    pub fn export_full_image(&self, format: ImageFormat, quality: u8) -> CanvasResult<EncodedImage> {
        let pixels = self.snapshot.composite();
        encode_rgba(&pixels, format, quality, self.snapshot.options.background)
    }

    /// Crop of the full composite as PNG
    pub fn export_region(&self, x: u32, y: u32, width: u32, height: u32) -> CanvasResult<EncodedImage> {
        let (canvas_width, canvas_height) = (self.snapshot.width(), self.snapshot.height());
        let fits = width > 0
            && height > 0
            && x.checked_add(width).is_some_and(|r| r <= canvas_width)
            && y.checked_add(height).is_some_and(|b| b <= canvas_height);
        if !fits {
            return Err(CanvasError::InvalidRegion {
                x,
                y,
                width,
                height,
                canvas_width,
                canvas_height,
            });
        }
        let composite = self.snapshot.composite();
        let region = imageops::crop_imm(&composite, x, y, width, height).to_image();
        encode_rgba(&region, ImageFormat::Png, 100, self.snapshot.options.background)
    }

    /// Downscaled composite, longest edge `thumbnail_size`
    pub fn export_thumbnail(&self) -> CanvasResult<EncodedImage> {
        let max_edge = self.snapshot.options.thumbnail_size.max(1);
        let composite = self.snapshot.composite();
        let (width, height) = composite.dimensions();
        let scale = (max_edge as f32 / width.max(height) as f32).min(1.0);
        let thumb_w = ((width as f32 * scale).round() as u32).max(1);
        let thumb_h = ((height as f32 * scale).round() as u32).max(1);
        let thumbnail = imageops::thumbnail(&composite, thumb_w, thumb_h);
        encode_rgba(&thumbnail, ImageFormat::Png, 100, self.snapshot.options.background)
    }

    pub fn metadata(&self) -> ExportMetadata {
        let state = &self.snapshot.state;
        let text_objects = self
            .snapshot
            .layer(LayerKind::Text)
            .map(|layer| layer.content.iter().filter_map(|d| d.as_text()).cloned().collect())
            .unwrap_or_default();
        ExportMetadata {
            layers: state.layers.clone(),
            text_objects,
            canvas_size: CanvasSize {
                width: self.snapshot.width(),
                height: self.snapshot.height(),
            },
            analysis: analyze_content(state),
            exported_at: time::timestamp_millis(),
        }
    }

    /// Run the four image exports together and bundle them with metadata.
    pub async fn export_bundle(&self) -> CanvasResult<ExportBundle> {
        let (full_image, drawing, base_image, mask) = futures::join!(
            async { self.export_full_image(ImageFormat::Png, 100) },
            async { self.export_drawing_layer() },
            async { self.export_base_image() },
            async { self.export_mask() },
        );
        let bundle = ExportBundle {
            full_image: full_image?,
            drawing: drawing?,
            base_image: base_image?,
            mask: mask?,
            metadata: self.metadata(),
        };
        debug!(
            "Exported bundle: full {}B, drawing {}B, base {}, mask {}B",
            bundle.full_image.bytes.len(),
            bundle.drawing.bytes.len(),
            bundle.base_image.as_ref().map_or("none".to_string(), |b| format!("{}B", b.bytes.len())),
            bundle.mask.bytes.len()
        );
        Ok(bundle)
    }
}

fn encode_rgba(pixels: &RgbaImage, format: ImageFormat, quality: u8, background: Color32) -> CanvasResult<EncodedImage> {
    let (width, height) = pixels.dimensions();
    let mut bytes = Vec::new();
    let result = match format {
        ImageFormat::Png => {
            PngEncoder::new(&mut bytes).write_image(pixels.as_raw(), width, height, ExtendedColorType::Rgba8)
        }
        ImageFormat::Jpeg => {
            let rgb = raster::flatten(pixels, background);
            JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100)).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
        ImageFormat::Webp => {
            WebPEncoder::new_lossless(&mut bytes).write_image(pixels.as_raw(), width, height, ExtendedColorType::Rgba8)
        }
    };
    if let Err(e) = result {
        error!("Failed to encode {}x{} {:?}: {}", width, height, format, e);
        return Err(e.into());
    }
    Ok(EncodedImage {
        format,
        width,
        height,
        bytes,
    })
}

fn encode_gray(pixels: &GrayImage) -> CanvasResult<EncodedImage> {
    let (width, height) = pixels.dimensions();
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes).write_image(pixels.as_raw(), width, height, ExtendedColorType::L8)?;
    Ok(EncodedImage {
        format: ImageFormat::Png,
        width,
        height,
        bytes,
    })
}
