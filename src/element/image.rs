use std::sync::Arc;

use egui::{Pos2, Rect, Vec2, pos2, vec2};
use image::RgbaImage;
use log::info;
use serde::{Deserialize, Serialize};

use super::Element;
use crate::id_generator::generate_id;

/// Where an image sits on the canvas: uniform scale plus top-left offset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub left: f32,
    pub top: f32,
    pub scale: f32,
}

impl Placement {
    /// Fit `image_size` inside the canvas preserving aspect ratio, centred.
    pub fn fit(image_width: u32, image_height: u32, canvas_width: u32, canvas_height: u32) -> Self {
        let scale = (canvas_width as f32 / image_width as f32)
            .min(canvas_height as f32 / image_height as f32);
        Self {
            left: (canvas_width as f32 - image_width as f32 * scale) / 2.0,
            top: (canvas_height as f32 - image_height as f32 * scale) / 2.0,
            scale,
        }
    }
}

/// Bitmap object, stored as straight RGBA8 rows
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageObject {
    id: usize,
    width: u32,
    height: u32,
    pixels: Arc<Vec<u8>>,
    placement: Placement,
}

// Pixel data is too large to be useful in debug output
impl std::fmt::Debug for ImageObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageObject")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("data_len", &self.pixels.len())
            .field("placement", &self.placement)
            .finish()
    }
}

impl ImageObject {
    pub fn new(image: RgbaImage, placement: Placement) -> Self {
        let (width, height) = image.dimensions();
        Self {
            id: generate_id(),
            width,
            height,
            pixels: Arc::new(image.into_raw()),
            placement,
        }
    }

    /// Place `image` centred on a `canvas_width` x `canvas_height` canvas
    pub fn fitted(image: RgbaImage, canvas_width: u32, canvas_height: u32) -> Self {
        let placement = Placement::fit(image.width(), image.height(), canvas_width, canvas_height);
        info!(
            "Placing {}x{} image at ({}, {}) with scale {}",
            image.width(),
            image.height(),
            placement.left,
            placement.top,
            placement.scale
        );
        Self::new(image, placement)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Source pixels as an image buffer, `None` if the stored data is malformed
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.as_ref().clone())
    }

    /// Size of the image on the canvas after scaling
    pub fn display_size(&self) -> Vec2 {
        vec2(
            self.width as f32 * self.placement.scale,
            self.height as f32 * self.placement.scale,
        )
    }

    /// Whether the pixel buffer matches the declared dimensions
    pub fn is_well_formed(&self) -> bool {
        self.pixels.len() == self.width as usize * self.height as usize * 4
    }
}

impl Element for ImageObject {
    fn id(&self) -> usize {
        self.id
    }

    fn element_type(&self) -> &'static str {
        "image"
    }

    fn rect(&self) -> Rect {
        Rect::from_min_size(pos2(self.placement.left, self.placement.top), self.display_size())
    }

    fn hit_test(&self, pos: Pos2) -> bool {
        self.rect().contains(pos)
    }

    fn translate(&mut self, delta: Vec2) -> Result<(), String> {
        self.placement.left += delta.x;
        self.placement.top += delta.y;
        Ok(())
    }
}
