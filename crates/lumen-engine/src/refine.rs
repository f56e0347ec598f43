use std::sync::Arc;

use lumen_contracts::memory::StyleMemory;
use lumen_contracts::modes::Mode;

use crate::error::truncate_text;
use crate::providers::{TextModel, TextRequest};
use crate::retry::{RetryPolicy, Sleeper};

const BASE_ROLE: &str = "You are a prompt engineer for an image generation model. \
Rewrite the user's request into one detailed, self-contained image prompt. \
Keep the user's subject exactly; add composition, lighting, palette and style \
detail that fits the target format. Reply with the prompt text only, no \
preamble, no markdown, no quotes around the whole prompt.";

const LITERAL_TEXT_RULE: &str = "If the user asks for words, a name or a slogan \
to appear in the image, keep that text verbatim and write it as a typography \
directive, for example: the text \"OPEN LATE\" in bold, clean, legible \
typography.";

const REFERENCE_NOTE: &str = "Reference images are attached. Describe the edit \
to apply to them (what to change, what to keep) instead of inventing a new \
scene.";

/// Turns a short user request into a model-ready prompt for one mode.
///
/// Never fails: a remote error or an empty reply hands back the user's own
/// text so generation can still run.
pub struct PromptRefiner {
    model: Arc<dyn TextModel>,
    model_name: String,
    memory: StyleMemory,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl PromptRefiner {
    pub fn new(
        model: Arc<dyn TextModel>,
        model_name: impl Into<String>,
        memory: StyleMemory,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            memory,
            policy,
            sleeper,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn refine(&self, user_input: &str, mode: Mode, has_reference_images: bool) -> String {
        let request = TextRequest {
            model: self.model_name.clone(),
            system: self.system_instruction(mode),
            context: task_context(mode, has_reference_images),
            input: user_input.to_string(),
        };
        let result = self.policy.run(self.sleeper.as_ref(), "refine", || {
            self.model.complete(&request)
        });
        match result {
            Ok(reply) => {
                let reply = reply.trim();
                if reply.is_empty() {
                    tracing::warn!(mode = %mode, "refinement returned an empty prompt; using input");
                    return user_input.to_string();
                }
                tracing::debug!(mode = %mode, refined = %truncate_text(reply, 160), "prompt refined");
                reply.to_string()
            }
            Err(err) => {
                tracing::warn!(mode = %mode, error = %err, "refinement failed; using input");
                user_input.to_string()
            }
        }
    }

    /// Role, mode strategy, typography rule, then recalled style last so it
    /// takes precedence over the defaults.
    pub fn system_instruction(&self, mode: Mode) -> String {
        let spec = mode.spec();
        let mut sections = vec![
            BASE_ROLE.to_string(),
            format!(
                "Format: {}. {}\nTarget keywords: {}.",
                spec.label,
                spec.guidance,
                spec.keywords.join(", ")
            ),
            LITERAL_TEXT_RULE.to_string(),
        ];
        let recalled = self.memory.recall(mode);
        if !recalled.trim().is_empty() {
            sections.push(recalled);
        }
        sections.join("\n\n")
    }
}

pub fn task_context(mode: Mode, has_reference_images: bool) -> String {
    let spec = mode.spec();
    let mut lines = vec![
        format!("Mode: {}", spec.label),
        format!("Target keywords: {}", spec.keywords.join(", ")),
    ];
    if has_reference_images {
        lines.push(REFERENCE_NOTE.to_string());
    } else {
        lines.push("No reference images are attached.".to_string());
    }
    lines.join("\n")
}
