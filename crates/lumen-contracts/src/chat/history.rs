use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::messages::ChatMessage;
use crate::modes::Mode;

/// Independent, append-only transcripts keyed by mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationHistory {
    modes: IndexMap<Mode, Vec<ChatMessage>>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self, mode: Mode) -> &[ChatMessage] {
        self.modes.get(&mode).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self, mode: Mode) -> usize {
        self.messages(mode).len()
    }

    pub fn is_empty(&self, mode: Mode) -> bool {
        self.messages(mode).is_empty()
    }

    /// Appends and returns the index of the new message.
    pub fn push(&mut self, mode: Mode, message: ChatMessage) -> usize {
        let rows = self.modes.entry(mode).or_default();
        rows.push(message);
        rows.len() - 1
    }

    pub fn get(&self, mode: Mode, index: usize) -> Option<&ChatMessage> {
        self.messages(mode).get(index)
    }

    pub fn get_mut(&mut self, mode: Mode, index: usize) -> Option<&mut ChatMessage> {
        self.modes.get_mut(&mode)?.get_mut(index)
    }

    pub fn last_assistant_index(&self, mode: Mode) -> Option<usize> {
        self.messages(mode)
            .iter()
            .rposition(|message| message.is_assistant())
    }

    pub fn clear(&mut self, mode: Mode) {
        if let Some(rows) = self.modes.get_mut(&mode) {
            rows.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ConversationHistory;
    use crate::chat::ChatMessage;
    use crate::modes::Mode;

    #[test]
    fn modes_keep_independent_transcripts() {
        let mut history = ConversationHistory::new();
        history.push(Mode::Logo, ChatMessage::user("a fox head", Vec::new()));
        history.push(Mode::Poster, ChatMessage::user("a city at night", Vec::new()));
        history.push(Mode::Logo, ChatMessage::assistant_error("nope"));

        assert_eq!(history.len(Mode::Logo), 2);
        assert_eq!(history.len(Mode::Poster), 1);
        assert!(history.is_empty(Mode::Avatar));
        assert_eq!(history.last_assistant_index(Mode::Logo), Some(1));
        assert_eq!(history.last_assistant_index(Mode::Poster), None);
    }

    #[test]
    fn clear_only_touches_one_mode() {
        let mut history = ConversationHistory::new();
        history.push(Mode::Logo, ChatMessage::user("one", Vec::new()));
        history.push(Mode::Banner, ChatMessage::user("two", Vec::new()));
        history.clear(Mode::Logo);
        history.clear(Mode::General);

        assert!(history.is_empty(Mode::Logo));
        assert_eq!(history.messages(Mode::Banner)[0].content, "two");
    }
}
