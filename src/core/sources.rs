use crate::errors::Result;
use crate::types::BoundingBox;
use crate::vision::Frame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Supplies a raster of the current view on demand.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Fails with `PilotError::CaptureFailed` when no frame can be taken.
    async fn capture(&self) -> Result<Frame>;
}

/// A piece of recognized text with its approximate location in the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextToken {
    pub text: String,
    pub bbox: Option<BoundingBox>,
}

impl TextToken {
    pub fn new(text: impl Into<String>, bbox: Option<BoundingBox>) -> Self {
        Self {
            text: text.into(),
            bbox,
        }
    }
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Tokens in reading order. May be empty.
    async fn extract(&self, frame: &Frame) -> Result<Vec<TextToken>>;
}

/// Extractor for setups without OCR.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTextExtractor;

#[async_trait]
impl TextExtractor for NullTextExtractor {
    async fn extract(&self, _frame: &Frame) -> Result<Vec<TextToken>> {
        Ok(Vec::new())
    }
}

/// Moves the environment to the next candidate target.
#[async_trait]
pub trait JobAdvancer: Send + Sync {
    /// Fails with `PilotError::AdvancementFailed` when there is nowhere to go.
    async fn advance(&self) -> Result<()>;
}

/// Joins token text into a single block, one token per line.
pub fn join_tokens(tokens: &[TextToken]) -> String {
    tokens
        .iter()
        .map(|t| t.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
