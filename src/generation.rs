//! Seam to an external image generator.
//!
//! The core never calls a generator on its own. The session builds a
//! [`GenerationRequest`] from an export bundle, hands it to an
//! [`ImageGenerator`] and applies the result only if no newer request was
//! issued in the meantime.

use std::fmt;
use std::future::Future;

use log::warn;
use thiserror::Error;

use crate::error::CanvasError;
use crate::export::{ExportBundle, ExportMetadata};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generator failed: {0}")]
    Adapter(String),

    #[error("Generator returned no image")]
    EmptyResult,

    #[error("Result of request {ticket} superseded by request {latest}")]
    Stale { ticket: u64, latest: u64 },

    #[error(transparent)]
    Canvas(#[from] CanvasError),
}

/// Input handed to the generator, built only from an export bundle
#[derive(Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Full composite, present when the canvas has content
    pub image: Option<Vec<u8>>,
    /// Modification mask, present when the mask layer has content
    pub mask: Option<Vec<u8>>,
    pub style_hints: Vec<String>,
    pub metadata: ExportMetadata,
}

impl fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("prompt", &self.prompt)
            .field("image", &self.image.as_ref().map(Vec::len))
            .field("mask", &self.mask.as_ref().map(Vec::len))
            .field("style_hints", &self.style_hints)
            .finish()
    }
}

impl GenerationRequest {
    pub fn from_bundle(prompt: &str, bundle: &ExportBundle, style_hints: Vec<String>) -> Self {
        let analysis = &bundle.metadata.analysis;
        let has_content = analysis.content_type != crate::event::ContentType::Empty;
        let has_mask = bundle
            .metadata
            .layers
            .iter()
            .any(|l| l.kind == crate::layer::LayerKind::Mask && l.object_count > 0);
        Self {
            prompt: prompt.to_string(),
            image: has_content.then(|| bundle.full_image.bytes.clone()),
            mask: has_mask.then(|| bundle.mask.bytes.clone()),
            style_hints,
            metadata: bundle.metadata.clone(),
        }
    }
}

/// Encoded image returned by a generator
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
}

impl fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedImage").field("bytes", &self.bytes.len()).finish()
    }
}

/// External model that turns a prompt plus canvas artifacts into an image
pub trait ImageGenerator {
    fn generate(&self, request: &GenerationRequest) -> impl Future<Output = Result<GeneratedImage, GenerationError>>;
}

/// Identifies one generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationTicket(u64);

impl GenerationTicket {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GenerationTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out increasing tickets; only the newest one may apply its result
#[derive(Debug, Default)]
pub struct GenerationSequencer {
    latest: u64,
}

impl GenerationSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self) -> GenerationTicket {
        self.latest += 1;
        GenerationTicket(self.latest)
    }

    pub fn latest(&self) -> Option<GenerationTicket> {
        (self.latest > 0).then_some(GenerationTicket(self.latest))
    }

    pub fn is_current(&self, ticket: GenerationTicket) -> bool {
        ticket.0 == self.latest
    }

    /// `Ok` if `ticket` is still the newest, otherwise `Stale`
    pub fn check(&self, ticket: GenerationTicket) -> Result<(), GenerationError> {
        if self.is_current(ticket) {
            Ok(())
        } else {
            warn!("Dropping stale generation result {} (latest #{})", ticket, self.latest);
            Err(GenerationError::Stale {
                ticket: ticket.0,
                latest: self.latest,
            })
        }
    }
}
