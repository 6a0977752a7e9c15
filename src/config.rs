use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ab_glyph::FontArc;
use egui::Color32;
use serde::{Deserialize, Serialize};

use crate::error::{CanvasError, CanvasResult};

/// Settings shared by every component of a canvas session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Canvas width in pixels
    pub width: u32,
    /// Canvas height in pixels
    pub height: u32,
    /// Number of history snapshots kept before the oldest is evicted
    pub max_history_size: usize,
    /// Number of versions kept before pruning kicks in
    pub max_versions: usize,
    /// Quiescence required before a pending history capture fires
    pub capture_debounce_ms: u64,
    /// Number of change events kept in the detector's log
    pub event_log_capacity: usize,
    /// Stroke colour used while drawing on the mask layer
    pub mask_stroke_color: Color32,
    /// Gaussian sigma of the softening pass applied to exported masks
    pub mask_blur_sigma: f32,
    pub brush_color: Color32,
    pub brush_width: f32,
    pub eraser_width: f32,
    pub shape_stroke_width: f32,
    /// Colour used when flattening onto an opaque format (JPEG)
    pub background: Color32,
    /// Longest edge of history/version thumbnails
    pub thumbnail_size: u32,
    pub capture_thumbnails: bool,
    /// Optional TTF/OTF file used to rasterize text objects
    pub font_path: Option<PathBuf>,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            max_history_size: 50,
            max_versions: 100,
            capture_debounce_ms: 300,
            event_log_capacity: 100,
            mask_stroke_color: Color32::from_rgba_unmultiplied(255, 0, 0, 128),
            mask_blur_sigma: 3.0,
            brush_color: Color32::BLACK,
            brush_width: 5.0,
            eraser_width: 20.0,
            shape_stroke_width: 2.0,
            background: Color32::WHITE,
            thumbnail_size: 128,
            capture_thumbnails: true,
            font_path: None,
        }
    }
}

impl CanvasConfig {
    /// Default configuration with the given canvas size
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> CanvasResult<Self> {
        let json = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> CanvasResult<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> CanvasResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CanvasError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.max_history_size == 0 {
            return Err(CanvasError::Config("max_history_size must be at least 1".into()));
        }
        if self.max_versions < 2 {
            return Err(CanvasError::Config("max_versions must be at least 2".into()));
        }
        if self.mask_blur_sigma.is_nan() || self.mask_blur_sigma < 0.0 {
            return Err(CanvasError::Config("mask_blur_sigma must be non-negative".into()));
        }
        Ok(())
    }

    pub fn capture_debounce(&self) -> Duration {
        Duration::from_millis(self.capture_debounce_ms)
    }

    /// Load the configured font, if any.
    pub fn load_font(&self) -> CanvasResult<Option<FontArc>> {
        let Some(path) = &self.font_path else {
            return Ok(None);
        };
        let bytes = fs::read(path)?;
        FontArc::try_from_vec(bytes)
            .map(Some)
            .map_err(|e| CanvasError::Font(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CanvasConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_history_size, 50);
        assert_eq!(config.max_versions, 100);
        assert_eq!(config.capture_debounce(), Duration::from_millis(300));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CanvasConfig = serde_json::from_str(r#"{ "width": 1024 }"#).unwrap();
        assert_eq!(config.width, 1024);
        assert_eq!(config.height, 600);
        assert_eq!(config.event_log_capacity, 100);
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let config = CanvasConfig::with_size(0, 10);
        assert!(matches!(
            config.validate(),
            Err(CanvasError::InvalidDimensions { width: 0, height: 10 })
        ));
    }
}
