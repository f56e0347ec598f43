use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::providers::{
    DryrunProvider, GeminiProvider, ImageModel, TextModel, GEMINI_DEFAULT_API_BASE,
};
use crate::retry::{
    RetryPolicy, DEFAULT_QUOTA_COOLDOWN, DEFAULT_UNAVAILABLE_DELAY, IMAGE_QUOTA_COOLDOWN,
};

pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_IMAGE_MODEL_HQ: &str = "gemini-3-pro-image-preview";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub text_model: String,
    pub image_model: String,
    pub image_model_hq: String,
    pub request_timeout: Duration,
    pub refine_retries: usize,
    pub image_retries: usize,
    pub text_quota_cooldown: Duration,
    pub image_quota_cooldown: Duration,
    pub unavailable_delay: Duration,
    pub dryrun: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: GEMINI_DEFAULT_API_BASE.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            image_model_hq: DEFAULT_IMAGE_MODEL_HQ.to_string(),
            request_timeout: Duration::from_secs(120),
            refine_retries: 1,
            image_retries: 2,
            text_quota_cooldown: DEFAULT_QUOTA_COOLDOWN,
            image_quota_cooldown: IMAGE_QUOTA_COOLDOWN,
            unavailable_delay: DEFAULT_UNAVAILABLE_DELAY,
            dryrun: false,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY")),
            api_base: non_empty_env("GEMINI_API_BASE").unwrap_or(defaults.api_base),
            text_model: non_empty_env("LUMEN_TEXT_MODEL").unwrap_or(defaults.text_model),
            image_model: non_empty_env("LUMEN_IMAGE_MODEL").unwrap_or(defaults.image_model),
            image_model_hq: non_empty_env("LUMEN_IMAGE_MODEL_HQ")
                .unwrap_or(defaults.image_model_hq),
            request_timeout: Duration::from_secs(
                env_u64("LUMEN_REQUEST_TIMEOUT_S", defaults.request_timeout.as_secs())
                    .clamp(5, 600),
            ),
            refine_retries: defaults.refine_retries,
            image_retries: defaults.image_retries,
            text_quota_cooldown: Duration::from_secs(
                env_u64("LUMEN_QUOTA_COOLDOWN_S", defaults.text_quota_cooldown.as_secs())
                    .clamp(0, 120),
            ),
            image_quota_cooldown: Duration::from_secs(
                env_u64("LUMEN_QUOTA_COOLDOWN_S", defaults.image_quota_cooldown.as_secs())
                    .clamp(0, 120),
            ),
            unavailable_delay: Duration::from_secs(
                env_u64("LUMEN_UNAVAILABLE_DELAY_S", defaults.unavailable_delay.as_secs())
                    .clamp(0, 60),
            ),
            dryrun: defaults.dryrun,
        }
    }

    pub fn refine_policy(&self) -> RetryPolicy {
        RetryPolicy::with_retries(self.refine_retries)
            .quota_cooldown(self.text_quota_cooldown)
            .unavailable_delay(self.unavailable_delay)
    }

    pub fn image_policy(&self) -> RetryPolicy {
        RetryPolicy::with_retries(self.image_retries)
            .quota_cooldown(self.image_quota_cooldown)
            .unavailable_delay(self.unavailable_delay)
    }

    /// Gemini when a key is configured, otherwise the offline provider.
    pub fn build_models(&self) -> (Arc<dyn TextModel>, Arc<dyn ImageModel>) {
        let api_key = self.api_key.as_deref().filter(|_| !self.dryrun);
        match api_key {
            Some(api_key) => {
                let provider = Arc::new(GeminiProvider::new(
                    self.api_base.clone(),
                    api_key,
                    self.request_timeout,
                ));
                let text: Arc<dyn TextModel> = provider.clone();
                let image: Arc<dyn ImageModel> = provider;
                (text, image)
            }
            None => {
                if !self.dryrun {
                    tracing::warn!(
                        "GEMINI_API_KEY or GOOGLE_API_KEY not set; using offline dryrun provider"
                    );
                }
                let text: Arc<dyn TextModel> = Arc::new(DryrunProvider);
                let image: Arc<dyn ImageModel> = Arc::new(DryrunProvider);
                (text, image)
            }
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_per_call_budgets() {
        let config = EngineConfig::default();
        assert_eq!(config.refine_policy().retries, 1);
        assert_eq!(config.image_policy().retries, 2);
        assert_eq!(config.refine_policy().quota_cooldown, Duration::from_secs(15));
        assert_eq!(config.image_policy().quota_cooldown, Duration::from_secs(18));
        assert_eq!(config.image_policy().unavailable_delay, Duration::from_secs(5));
    }

    #[test]
    fn missing_key_selects_dryrun_models() {
        let config = EngineConfig::default();
        let (text, image) = config.build_models();
        assert_eq!(text.name(), "dryrun");
        assert_eq!(image.name(), "dryrun");
    }

    #[test]
    fn dryrun_flag_wins_over_key() {
        let config = EngineConfig {
            api_key: Some("secret".to_string()),
            dryrun: true,
            ..EngineConfig::default()
        };
        assert_eq!(config.build_models().1.name(), "dryrun");

        let live = EngineConfig {
            api_key: Some("secret".to_string()),
            ..EngineConfig::default()
        };
        assert_eq!(live.build_models().0.name(), "gemini");
    }
}
