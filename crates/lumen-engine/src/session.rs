use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lumen_contracts::chat::{ChatMessage, ConversationHistory, ImagePayload};
use lumen_contracts::events::EventWriter;
use lumen_contracts::memory::StyleMemory;
use lumen_contracts::modes::{AspectRatio, GenerationConfig, Mode};
use serde_json::json;

use crate::config::EngineConfig;
use crate::error::{classify, truncate_text, user_message, FailureKind};
use crate::generate::ImageGenerator;
use crate::refine::PromptRefiner;
use crate::retry::{Sleeper, ThreadSleeper};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeState {
    Idle,
    Generating,
}

impl ModeState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Generating => "generating",
        }
    }
}

impl fmt::Display for ModeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct ModeSlot {
    state: ModeState,
    /// Bumped by `reset`; replies started under an older epoch are dropped.
    epoch: u64,
}

impl Default for ModeSlot {
    fn default() -> Self {
        Self {
            state: ModeState::Idle,
            epoch: 0,
        }
    }
}

struct SessionState {
    active_mode: Mode,
    config: GenerationConfig,
    history: ConversationHistory,
    slots: HashMap<Mode, ModeSlot>,
}

impl SessionState {
    fn slot(&mut self, mode: Mode) -> &mut ModeSlot {
        self.slots.entry(mode).or_default()
    }
}

/// Conversation driver: one transcript and one busy flag per mode.
///
/// All mutable state sits behind a single mutex which is released before any
/// remote call, so sends into different modes can run on different threads.
/// Keeping a second send out of a busy mode is the caller's job.
pub struct Session {
    state: Mutex<SessionState>,
    refiner: PromptRefiner,
    generator: ImageGenerator,
    memory: StyleMemory,
    events: Option<EventWriter>,
}

impl Session {
    pub fn new(
        refiner: PromptRefiner,
        generator: ImageGenerator,
        memory: StyleMemory,
        mode: Mode,
    ) -> Self {
        Self {
            state: Mutex::new(SessionState {
                active_mode: mode,
                config: mode.default_config(),
                history: ConversationHistory::new(),
                slots: HashMap::new(),
            }),
            refiner,
            generator,
            memory,
            events: None,
        }
    }

    /// Wires models, retry budgets and the event log from an engine config.
    pub fn from_config(
        config: &EngineConfig,
        memory: StyleMemory,
        events: Option<EventWriter>,
        mode: Mode,
    ) -> Self {
        let sleeper: Arc<dyn Sleeper> = Arc::new(ThreadSleeper);
        let (text_model, image_model) = config.build_models();
        let refiner = PromptRefiner::new(
            text_model,
            config.text_model.clone(),
            memory.clone(),
            config.refine_policy(),
            sleeper.clone(),
        );
        let mut generator = ImageGenerator::new(
            image_model,
            config.image_model.clone(),
            config.image_model_hq.clone(),
            config.image_policy(),
            sleeper,
        );
        if let Some(events) = &events {
            generator = generator.with_events(events.clone());
        }
        let session = Self::new(refiner, generator, memory, mode);
        match events {
            Some(events) => session.with_events(events),
            None => session,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        let mode = self.active_mode();
        events.record(
            "session_started",
            json!({
                "mode": mode.as_str(),
                "text_model": self.refiner.model_name(),
            }),
        );
        self.events = Some(events);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event_type: &str, payload: serde_json::Value) {
        if let Some(events) = &self.events {
            events.record(event_type, payload);
        }
    }

    pub fn active_mode(&self) -> Mode {
        self.lock().active_mode
    }

    pub fn config(&self) -> GenerationConfig {
        self.lock().config
    }

    pub fn state(&self, mode: Mode) -> ModeState {
        self.lock()
            .slots
            .get(&mode)
            .map(|slot| slot.state)
            .unwrap_or(ModeState::Idle)
    }

    pub fn history(&self, mode: Mode) -> Vec<ChatMessage> {
        self.lock().history.messages(mode).to_vec()
    }

    pub fn last_assistant_index(&self, mode: Mode) -> Option<usize> {
        self.lock().history.last_assistant_index(mode)
    }

    pub fn memory(&self) -> &StyleMemory {
        &self.memory
    }

    /// Runs one turn in the active mode and returns the assistant reply.
    ///
    /// Failures never escape: they come back as an assistant message with
    /// `error` set. The reply is appended to the mode's history unless the
    /// mode was reset while it was being produced.
    pub fn send_message(&self, text: &str, references: Vec<ImagePayload>) -> ChatMessage {
        let (mode, config, epoch) = {
            let mut state = self.lock();
            let mode = state.active_mode;
            let config = state.config;
            state
                .history
                .push(mode, ChatMessage::user(text, references.clone()));
            let slot = state.slot(mode);
            slot.state = ModeState::Generating;
            (mode, config, slot.epoch)
        };
        let _guard = GeneratingGuard {
            session: self,
            mode,
            epoch,
        };
        self.record(
            "message_sent",
            json!({
                "mode": mode.as_str(),
                "text": text,
                "references": references.len(),
                "aspect_ratio": config.aspect_ratio.as_str(),
                "high_quality": config.high_quality,
            }),
        );

        let prompt = self.final_prompt(text, mode, !references.is_empty());
        let result = if references.is_empty() {
            self.generator
                .generate_from_text(&prompt, config.aspect_ratio, config.high_quality)
        } else {
            self.generator
                .generate_from_images(&references, &prompt, config.aspect_ratio)
        };

        let reply = match result {
            Ok(Some(image)) => {
                self.record(
                    "generation_succeeded",
                    json!({
                        "mode": mode.as_str(),
                        "final_prompt": prompt,
                        "mime_type": image.mime_type,
                    }),
                );
                ChatMessage::assistant_image(image, text, prompt)
            }
            Ok(None) => self.failure_reply(mode, FailureKind::NoImageReturned, None),
            Err(err) => self.failure_reply(mode, classify(&err), Some(&err)),
        };

        {
            let mut state = self.lock();
            if state.slot(mode).epoch == epoch {
                state.history.push(mode, reply.clone());
            } else {
                tracing::debug!(%mode, "mode was reset during generation; reply not kept");
            }
        }
        reply
    }

    /// Refined prompt, or the mode's stock prompt when nothing usable is left.
    fn final_prompt(&self, text: &str, mode: Mode, has_references: bool) -> String {
        let refined = if text.trim().is_empty() {
            String::new()
        } else {
            self.refiner.refine(text, mode, has_references)
        };
        let prompt = if refined.trim().is_empty() {
            mode.empty_prompt_fallback().to_string()
        } else {
            refined
        };
        self.record(
            "prompt_refined",
            json!({
                "mode": mode.as_str(),
                "original_prompt": text,
                "final_prompt": prompt,
            }),
        );
        prompt
    }

    fn failure_reply(
        &self,
        mode: Mode,
        kind: FailureKind,
        err: Option<&anyhow::Error>,
    ) -> ChatMessage {
        let message = user_message(kind, err);
        tracing::warn!(
            %mode,
            failure = %kind,
            error = %err.map(|err| err.to_string()).unwrap_or_default(),
            "generation failed"
        );
        self.record(
            "generation_failed",
            json!({
                "mode": mode.as_str(),
                "failure": kind.as_str(),
                "message": message,
                "error": err.map(|err| truncate_text(&err.to_string(), 240)),
            }),
        );
        ChatMessage::assistant_error(message)
    }

    /// Approves the refinement at `index` in `mode` and teaches it to the
    /// style memory. Only an unliked assistant reply with a final prompt that
    /// directly follows a user message qualifies; anything else is a no-op.
    /// The store is written without holding the session lock.
    pub fn like_message(&self, mode: Mode, index: usize) -> bool {
        let Some(user_index) = index.checked_sub(1) else {
            return false;
        };
        let (user_text, final_prompt, epoch) = {
            let mut state = self.lock();
            let epoch = state.slot(mode).epoch;
            let Some(message) = state.history.get(mode, index) else {
                return false;
            };
            let Some(final_prompt) = message.final_prompt() else {
                return false;
            };
            if !message.is_assistant() || message.is_liked() {
                return false;
            }
            let Some(previous) = state.history.get(mode, user_index) else {
                return false;
            };
            if !previous.is_user() {
                return false;
            }
            (previous.content.clone(), final_prompt.to_string(), epoch)
        };

        let learned = self.memory.learn(mode, &user_text, &final_prompt);
        let liked = {
            let mut state = self.lock();
            if state.slot(mode).epoch != epoch {
                tracing::debug!(%mode, "mode was reset while liking; flag not set");
                false
            } else {
                state
                    .history
                    .get_mut(mode, index)
                    .map(ChatMessage::mark_liked)
                    .unwrap_or(false)
            }
        };
        if liked {
            self.record(
                "message_liked",
                json!({
                    "mode": mode.as_str(),
                    "index": index,
                    "learned": learned,
                    "final_prompt": final_prompt,
                }),
            );
        }
        liked
    }

    /// Switches the active mode and restores that mode's generation defaults.
    /// Histories are kept.
    pub fn change_mode(&self, mode: Mode) {
        let previous = {
            let mut state = self.lock();
            let previous = state.active_mode;
            state.active_mode = mode;
            state.config = mode.default_config();
            previous
        };
        self.record(
            "mode_changed",
            json!({"from": previous.as_str(), "to": mode.as_str()}),
        );
    }

    pub fn set_aspect_ratio(&self, aspect_ratio: AspectRatio) {
        self.lock().config.aspect_ratio = aspect_ratio;
    }

    pub fn set_high_quality(&self, high_quality: bool) {
        self.lock().config.high_quality = high_quality;
    }

    /// Clears one mode's transcript and forces it idle.
    pub fn reset(&self, mode: Mode) {
        {
            let mut state = self.lock();
            state.history.clear(mode);
            let slot = state.slot(mode);
            slot.state = ModeState::Idle;
            slot.epoch += 1;
        }
        self.record("mode_reset", json!({"mode": mode.as_str()}));
    }
}

/// Returns the mode to idle however the turn ends.
struct GeneratingGuard<'a> {
    session: &'a Session,
    mode: Mode,
    epoch: u64,
}

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.session.lock();
        let slot = state.slot(self.mode);
        if slot.epoch == self.epoch {
            slot.state = ModeState::Idle;
        }
    }
}
