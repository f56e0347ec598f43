use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inline image: base64 data plus its declared mime type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: String,
}

impl ImagePayload {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(mime_type, BASE64.encode(bytes))
    }

    /// Parses `data:<mime>;base64,<data>`. Bare base64 is accepted as PNG.
    pub fn from_data_url(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let Some(rest) = trimmed.strip_prefix("data:") else {
            if trimmed.is_empty() {
                bail!("image payload is empty");
            }
            return Ok(Self::new("image/png", trimmed));
        };
        let Some((header, data)) = rest.split_once(',') else {
            bail!("malformed data URL: missing ',' separator");
        };
        let Some(mime_type) = header.strip_suffix(";base64") else {
            bail!("unsupported data URL encoding (expected base64)");
        };
        if data.is_empty() {
            bail!("image payload is empty");
        }
        let mime_type = if mime_type.is_empty() {
            "image/png"
        } else {
            mime_type
        };
        Ok(Self::new(mime_type, data))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let mime_type = mime_for_path(path).unwrap_or("image/png");
        Ok(Self::from_bytes(mime_type, &bytes))
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(self.data.as_bytes())
            .context("image payload base64 decode failed")
    }

    pub fn extension(&self) -> &'static str {
        match self.mime_type.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub original_prompt: String,
    pub final_prompt: String,
    pub liked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImagePayload>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            images: Vec::new(),
            created_at: Utc::now(),
            metadata: None,
            error: None,
        }
    }

    pub fn user(content: impl Into<String>, references: Vec<ImagePayload>) -> Self {
        let mut message = Self::new(Role::User, content);
        message.images = references;
        message
    }

    pub fn assistant_image(
        image: ImagePayload,
        original_prompt: impl Into<String>,
        final_prompt: impl Into<String>,
    ) -> Self {
        let final_prompt = final_prompt.into();
        let mut message = Self::new(Role::Assistant, final_prompt.clone());
        message.images = vec![image];
        message.metadata = Some(MessageMetadata {
            original_prompt: original_prompt.into(),
            final_prompt,
            liked: false,
        });
        message
    }

    pub fn assistant_error(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut message = Self::new(Role::Assistant, text.clone());
        message.error = Some(text);
        message
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    pub fn final_prompt(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .map(|metadata| metadata.final_prompt.as_str())
            .filter(|prompt| !prompt.trim().is_empty())
    }

    pub fn is_liked(&self) -> bool {
        self.metadata
            .as_ref()
            .map(|metadata| metadata.liked)
            .unwrap_or(false)
    }

    /// Sets `liked` once. Returns false when there is no metadata or the
    /// flag was already set.
    pub fn mark_liked(&mut self) -> bool {
        match self.metadata.as_mut() {
            Some(metadata) if !metadata.liked => {
                metadata.liked = true;
                true
            }
            _ => false,
        }
    }
}
