use std::fmt;

/// Failure reported by a remote model endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{provider} request failed{}: {message}", status_suffix(.status))]
pub struct ProviderError {
    pub provider: String,
    pub status: Option<u16>,
    pub message: String,
    pub safety_blocked: bool,
}

impl ProviderError {
    pub fn http(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status: Some(status),
            message: message.into(),
            safety_blocked: false,
        }
    }

    pub fn safety(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status: None,
            message: message.into(),
            safety_blocked: true,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" ({code})")).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    ServiceUnavailable,
    AccessDenied,
    SafetyBlocked,
    NoImageReturned,
    Other,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ServiceUnavailable => "service_unavailable",
            FailureKind::AccessDenied => "access_denied",
            FailureKind::SafetyBlocked => "safety_blocked",
            FailureKind::NoImageReturned => "no_image_returned",
            FailureKind::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured status wins over message sniffing. A provider status outside
/// the retryable and access codes is `Other` unless the body reports a quota;
/// only errors that never reached an HTTP status are sniffed further.
pub fn classify(err: &anyhow::Error) -> FailureKind {
    let provider_err = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<ProviderError>());
    let text = error_chain_text(err, 4096).to_ascii_lowercase();
    match provider_err {
        Some(provider_err) if provider_err.safety_blocked => FailureKind::SafetyBlocked,
        Some(ProviderError {
            status: Some(status),
            ..
        }) => match status {
            429 => FailureKind::RateLimited,
            503 => FailureKind::ServiceUnavailable,
            401 | 403 => FailureKind::AccessDenied,
            _ if mentions_quota(&text) => FailureKind::RateLimited,
            _ => FailureKind::Other,
        },
        _ => classify_message(&text),
    }
}

fn mentions_quota(lower: &str) -> bool {
    lower.contains("quota") || lower.contains("resource_exhausted")
}

fn classify_message(lower: &str) -> FailureKind {
    if mentions_quota(lower) || lower.contains("429") {
        FailureKind::RateLimited
    } else if lower.contains("503") {
        FailureKind::ServiceUnavailable
    } else if lower.contains("permission_denied")
        || lower.contains("permission denied")
        || lower.contains("api key not valid")
        || lower.contains("api_key_invalid")
    {
        FailureKind::AccessDenied
    } else {
        FailureKind::Other
    }
}

/// Text shown to the user in place of an image.
pub fn user_message(kind: FailureKind, err: Option<&anyhow::Error>) -> String {
    match kind {
        FailureKind::RateLimited => {
            "Rate limit reached. Please wait a minute and try again.".to_string()
        }
        FailureKind::ServiceUnavailable => {
            "The image service is temporarily unavailable. Please try again.".to_string()
        }
        FailureKind::AccessDenied => {
            "Access denied. Check that your API key is valid and has access to the image models."
                .to_string()
        }
        FailureKind::SafetyBlocked => {
            "The request was blocked by the safety filter. Please rephrase your prompt.".to_string()
        }
        FailureKind::NoImageReturned => "Couldn't generate an image. Please try again.".to_string(),
        FailureKind::Other => {
            let detail = err
                .map(|err| err.to_string())
                .and_then(|text| text.lines().next().map(str::trim).map(str::to_string))
                .filter(|line| !line.is_empty())
                .unwrap_or_else(|| "unknown error".to_string());
            format!("Generation failed: {}", truncate_text(&detail, 200))
        }
    }
}

pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
