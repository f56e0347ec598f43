use std::sync::Arc;

use anyhow::Result;
use lumen_contracts::chat::ImagePayload;
use lumen_contracts::events::EventWriter;
use lumen_contracts::modes::AspectRatio;
use serde_json::json;

use crate::error::{classify, truncate_text};
use crate::providers::{ImageModel, ImageRequest};
use crate::retry::{RetryPolicy, Sleeper};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Standard,
    High,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::High => "high",
        }
    }
}

/// Two-tier image generation with a one-shot downgrade.
pub struct ImageGenerator {
    model: Arc<dyn ImageModel>,
    standard_model: String,
    high_model: String,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    events: Option<EventWriter>,
}

impl ImageGenerator {
    pub fn new(
        model: Arc<dyn ImageModel>,
        standard_model: impl Into<String>,
        high_model: impl Into<String>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            model,
            standard_model: standard_model.into(),
            high_model: high_model.into(),
            policy,
            sleeper,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn model_for(&self, tier: Tier) -> &str {
        match tier {
            Tier::Standard => &self.standard_model,
            Tier::High => &self.high_model,
        }
    }

    /// High tier first when asked. Any high-tier error, after its own
    /// retries, gets exactly one standard-tier attempt. A high-tier reply
    /// without an image is returned as-is.
    pub fn generate_from_text(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        high_quality: bool,
    ) -> Result<Option<ImagePayload>> {
        if !high_quality {
            return self.attempt(Tier::Standard, prompt, aspect_ratio, &[]);
        }
        match self.attempt(Tier::High, prompt, aspect_ratio, &[]) {
            Ok(image) => Ok(image),
            Err(err) => {
                let kind = classify(&err);
                tracing::warn!(
                    from = %self.high_model,
                    to = %self.standard_model,
                    failure = %kind,
                    error = %err,
                    "high tier failed; falling back to standard tier"
                );
                if let Some(events) = &self.events {
                    events.record(
                        "tier_fallback",
                        json!({
                            "from_model": self.high_model,
                            "to_model": self.standard_model,
                            "failure": kind.as_str(),
                            "error": truncate_text(&err.to_string(), 240),
                        }),
                    );
                }
                self.attempt(Tier::Standard, prompt, aspect_ratio, &[])
            }
        }
    }

    /// Edits always run on the standard multimodal tier.
    pub fn generate_from_images(
        &self,
        references: &[ImagePayload],
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<Option<ImagePayload>> {
        self.attempt(Tier::Standard, prompt, aspect_ratio, references)
    }

    fn attempt(
        &self,
        tier: Tier,
        prompt: &str,
        aspect_ratio: AspectRatio,
        references: &[ImagePayload],
    ) -> Result<Option<ImagePayload>> {
        let request = ImageRequest {
            model: self.model_for(tier).to_string(),
            prompt: prompt.to_string(),
            aspect_ratio,
            references: references.to_vec(),
        };
        tracing::info!(
            tier = tier.as_str(),
            model = %request.model,
            provider = self.model.name(),
            aspect_ratio = %aspect_ratio,
            references = references.len(),
            "dispatching image generation"
        );
        let label = format!("generate:{}", tier.as_str());
        self.policy
            .run(self.sleeper.as_ref(), &label, || self.model.generate(&request))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;
    use serde_json::Value;

    use super::*;
    use crate::error::ProviderError;
    use crate::retry::testing::RecordingSleeper;
    use crate::retry::DEFAULT_UNAVAILABLE_DELAY;

    type Reply = Result<Option<ImagePayload>>;

    /// Replies per model name, consumed in order; an exhausted script fails.
    struct ScriptedImage {
        script: Mutex<Vec<(String, Reply)>>,
        seen: Mutex<Vec<ImageRequest>>,
    }

    impl ScriptedImage {
        fn new(script: Vec<(&str, Reply)>) -> Self {
            Self {
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|(model, reply)| (model.to_string(), reply))
                        .collect(),
                ),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn models_called(&self) -> Vec<String> {
            self.seen
                .lock()
                .map(|rows| rows.iter().map(|row| row.model.clone()).collect())
                .unwrap_or_default()
        }

        fn requests(&self) -> Vec<ImageRequest> {
            self.seen.lock().map(|rows| rows.clone()).unwrap_or_default()
        }
    }

    impl ImageModel for ScriptedImage {
        fn name(&self) -> &str {
            "scripted"
        }

        fn generate(&self, request: &ImageRequest) -> Reply {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(request.clone());
            }
            let mut script = self
                .script
                .lock()
                .map_err(|_| anyhow!("script lock poisoned"))?;
            let position = script
                .iter()
                .position(|(model, _)| model == &request.model)
                .ok_or_else(|| anyhow!("no scripted reply for {}", request.model))?;
            script.remove(position).1
        }
    }

    fn image() -> ImagePayload {
        ImagePayload::new("image/png", "iVBORw0KGgo=")
    }

    fn unavailable() -> Reply {
        Err(ProviderError::http("Gemini", 503, "UNAVAILABLE: overloaded").into())
    }

    fn generator(model: Arc<ScriptedImage>) -> (ImageGenerator, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let generator = ImageGenerator::new(
            model,
            "std-model",
            "hq-model",
            RetryPolicy::with_retries(2),
            sleeper.clone(),
        );
        (generator, sleeper)
    }

    #[test]
    fn standard_request_never_touches_high_tier() -> anyhow::Result<()> {
        let model = Arc::new(ScriptedImage::new(vec![("std-model", Ok(Some(image())))]));
        let (generator, _) = generator(model.clone());
        let result = generator.generate_from_text("a kite", AspectRatio::Square, false)?;
        assert_eq!(result, Some(image()));
        assert_eq!(model.models_called(), vec!["std-model"]);
        Ok(())
    }

    #[test]
    fn persistent_503_on_high_tier_falls_back_once() -> anyhow::Result<()> {
        let model = Arc::new(ScriptedImage::new(vec![
            ("hq-model", unavailable()),
            ("hq-model", unavailable()),
            ("hq-model", unavailable()),
            ("std-model", Ok(Some(image()))),
        ]));
        let (generator, sleeper) = generator(model.clone());
        let result = generator.generate_from_text("a kite", AspectRatio::Wide, true)?;
        assert_eq!(result, Some(image()));
        assert_eq!(
            model.models_called(),
            vec!["hq-model", "hq-model", "hq-model", "std-model"]
        );
        assert_eq!(sleeper.slept(), vec![DEFAULT_UNAVAILABLE_DELAY; 2]);
        Ok(())
    }

    #[test]
    fn standard_failure_after_fallback_is_returned() {
        let model = Arc::new(ScriptedImage::new(vec![
            ("hq-model", Err(anyhow!("boom"))),
            ("std-model", Err(ProviderError::safety("Gemini", "blocked").into())),
        ]));
        let (generator, sleeper) = generator(model.clone());
        let result = generator.generate_from_text("a kite", AspectRatio::Wide, true);
        let err = result.err().map(|err| classify(&err));
        assert_eq!(err, Some(crate::error::FailureKind::SafetyBlocked));
        assert_eq!(model.models_called(), vec!["hq-model", "std-model"]);
        assert!(sleeper.slept().is_empty());
    }

    #[test]
    fn high_tier_without_image_is_not_a_failure() -> anyhow::Result<()> {
        let model = Arc::new(ScriptedImage::new(vec![("hq-model", Ok(None))]));
        let (generator, _) = generator(model.clone());
        assert_eq!(generator.generate_from_text("a kite", AspectRatio::Square, true)?, None);
        assert_eq!(model.models_called(), vec!["hq-model"]);
        Ok(())
    }

    #[test]
    fn image_edits_use_standard_tier_with_ordered_references() -> anyhow::Result<()> {
        let model = Arc::new(ScriptedImage::new(vec![("std-model", Ok(Some(image())))]));
        let (generator, _) = generator(model.clone());
        let references = vec![
            ImagePayload::new("image/jpeg", "Zmlyc3Q="),
            ImagePayload::new("image/png", "c2Vjb25k"),
        ];
        generator.generate_from_images(&references, "make it blue", AspectRatio::Tall)?;
        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].references, references);
        assert_eq!(requests[0].aspect_ratio, AspectRatio::Tall);
        assert_eq!(requests[0].prompt, "make it blue");
        Ok(())
    }

    #[test]
    fn fallback_is_logged_to_events() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let events = EventWriter::new(dir.path().join("events.jsonl"), "s-1");
        let model = Arc::new(ScriptedImage::new(vec![
            ("hq-model", Err(ProviderError::http("Gemini", 403, "PERMISSION_DENIED").into())),
            ("std-model", Ok(Some(image()))),
        ]));
        let (generator, _) = generator(model);
        let generator = generator.with_events(events.clone());
        generator.generate_from_text("a kite", AspectRatio::Square, true)?;

        let raw = std::fs::read_to_string(events.path())?;
        let rows: Vec<Value> = raw
            .lines()
            .map(serde_json::from_str)
            .collect::<std::result::Result<_, _>>()?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["type"], json!("tier_fallback"));
        assert_eq!(rows[0]["from_model"], json!("hq-model"));
        assert_eq!(rows[0]["failure"], json!("access_denied"));
        Ok(())
    }
}
