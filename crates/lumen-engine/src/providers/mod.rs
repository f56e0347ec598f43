mod dryrun;
mod gemini;

use anyhow::Result;
use lumen_contracts::chat::ImagePayload;
use lumen_contracts::modes::AspectRatio;

pub use dryrun::DryrunProvider;
pub use gemini::{GeminiProvider, DEFAULT_API_BASE as GEMINI_DEFAULT_API_BASE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRequest {
    pub model: String,
    pub system: String,
    pub context: String,
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    /// Ordered reference images, sent ahead of the prompt.
    pub references: Vec<ImagePayload>,
}

/// Prompt-refinement endpoint.
pub trait TextModel: Send + Sync {
    fn name(&self) -> &str;
    fn complete(&self, request: &TextRequest) -> Result<String>;
}

/// Image endpoint. `Ok(None)` means a well-formed reply that carried no
/// image, which callers must keep apart from `Err`.
pub trait ImageModel: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &ImageRequest) -> Result<Option<ImagePayload>>;
}
