mod command_parser;
mod command_registry;
mod history;
mod messages;

pub use command_parser::{parse_command, Command};
pub use command_registry::CHAT_HELP_COMMANDS;
pub use history::ConversationHistory;
pub use messages::{mime_for_path, ChatMessage, ImagePayload, MessageMetadata, Role};
