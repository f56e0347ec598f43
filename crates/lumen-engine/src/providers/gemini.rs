use std::time::Duration;

use anyhow::{Context, Result};
use lumen_contracts::chat::ImagePayload;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};

use super::{ImageModel, ImageRequest, TextModel, TextRequest};
use crate::error::{truncate_text, ProviderError};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROVIDER: &str = "Gemini";

const SAFETY_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "IMAGE_SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "RECITATION",
];

/// `generateContent` client used for both refinement and image calls.
pub struct GeminiProvider {
    api_base: String,
    api_key: String,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let api_base = api_base.into().trim().trim_end_matches('/').to_string();
        Self {
            api_base: if api_base.is_empty() {
                DEFAULT_API_BASE.to_string()
            } else {
                api_base
            },
            api_key: api_key.into(),
            timeout,
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn post(&self, model: &str, payload: &Value) -> Result<Value> {
        let endpoint = self.endpoint_for_model(model);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .json(payload)
            .send()
            .with_context(|| format!("{PROVIDER} request failed ({endpoint})"))?;
        response_json_or_error(response)
    }
}

impl TextModel for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn complete(&self, request: &TextRequest) -> Result<String> {
        let payload = text_payload(request);
        let response = self.post(&request.model, &payload)?;
        check_blocked(&response)?;
        Ok(extract_text(&response))
    }
}

impl ImageModel for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &ImageRequest) -> Result<Option<ImagePayload>> {
        let payload = image_payload(request);
        let response = self.post(&request.model, &payload)?;
        check_blocked(&response)?;
        let image = extract_image(&response);
        if image.is_none() {
            if let Some(reason) = safety_finish_reason(&response) {
                return Err(ProviderError::safety(
                    PROVIDER,
                    format!("generation stopped with finishReason={reason}"),
                )
                .into());
            }
        }
        Ok(image)
    }
}

fn text_payload(request: &TextRequest) -> Value {
    let mut parts = Vec::new();
    if !request.context.trim().is_empty() {
        parts.push(json!({ "text": request.context }));
    }
    parts.push(json!({ "text": request.input }));
    json!({
        "systemInstruction": {
            "parts": [{ "text": request.system }],
        },
        "contents": [{
            "role": "user",
            "parts": parts,
        }],
        "generationConfig": {
            "temperature": 0.7,
        },
    })
}

fn image_payload(request: &ImageRequest) -> Value {
    let mut parts = request
        .references
        .iter()
        .map(|image| {
            json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.data,
                }
            })
        })
        .collect::<Vec<Value>>();
    parts.push(json!({ "text": request.prompt }));
    json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
            "imageConfig": {
                "aspectRatio": request.aspect_ratio.as_str(),
            },
        },
    })
}

fn response_json_or_error(response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{PROVIDER} response body read failed"))?;
    if !status.is_success() {
        return Err(ProviderError::http(PROVIDER, code, error_message_from_body(&body)).into());
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{PROVIDER} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// Google error bodies look like `{"error": {"status": "...", "message": "..."}}`.
fn error_message_from_body(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let error = parsed
        .as_ref()
        .and_then(|value| value.get("error"))
        .and_then(Value::as_object);
    let Some(error) = error else {
        return truncate_text(body.trim(), 512);
    };
    let status = error.get("status").and_then(Value::as_str).unwrap_or("");
    let message = error.get("message").and_then(Value::as_str).unwrap_or("");
    let text = match (status.is_empty(), message.is_empty()) {
        (false, false) => format!("{status}: {message}"),
        (false, true) => status.to_string(),
        _ => message.to_string(),
    };
    truncate_text(&text, 512)
}

fn check_blocked(response: &Value) -> Result<()> {
    let reason = response
        .get("promptFeedback")
        .and_then(Value::as_object)
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|reason| !reason.is_empty());
    if let Some(reason) = reason {
        return Err(ProviderError::safety(PROVIDER, format!("prompt blocked (blockReason={reason})")).into());
    }
    Ok(())
}

fn candidate_parts(response: &Value) -> Vec<Map<String, Value>> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .map(|candidates| {
            candidates
                .iter()
                .filter_map(|candidate| candidate.get("content"))
                .filter_map(|content| content.get("parts"))
                .filter_map(Value::as_array)
                .flatten()
                .filter_map(Value::as_object)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn extract_text(response: &Value) -> String {
    candidate_parts(response)
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<&str>>()
        .join("")
        .trim()
        .to_string()
}

fn extract_image(response: &Value) -> Option<ImagePayload> {
    candidate_parts(response).into_iter().find_map(|part| {
        let inline = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)?;
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .filter(|data| !data.is_empty())?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("image/png");
        Some(ImagePayload::new(mime_type, data))
    })
}

fn safety_finish_reason(response: &Value) -> Option<String> {
    response
        .get("candidates")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|candidate| candidate.get("finishReason").and_then(Value::as_str))
        .find(|reason| SAFETY_FINISH_REASONS.contains(reason))
        .map(str::to_string)
}
