use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, INDEX_ARG_COMMANDS, NO_ARG_COMMANDS, PATH_ARG_COMMANDS, VALUE_ARG_COMMANDS,
};

/// One parsed line of chat input.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Command {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_switch(arg: &str) -> Option<bool> {
    match arg.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" | "high" => Some(true),
        "off" | "false" | "no" | "0" | "standard" => Some(false),
        _ => None,
    }
}

pub fn parse_command(text: &str) -> Command {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Command::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, VALUE_ARG_COMMANDS) {
                let mut parsed = Command::new(action, text);
                if action == "set_quality" {
                    // A bare `/hq` toggles; the caller resolves Null against current state.
                    let value = if arg.is_empty() {
                        Value::Null
                    } else {
                        parse_switch(arg)
                            .map(Value::Bool)
                            .unwrap_or_else(|| Value::String(arg.to_string()))
                    };
                    parsed.command_args.insert("value".to_string(), value);
                } else {
                    parsed
                        .command_args
                        .insert("value".to_string(), Value::String(arg.to_string()));
                }
                return parsed;
            }

            if let Some(action) = find_action(&command, PATH_ARG_COMMANDS) {
                let mut parsed = Command::new(action, text);
                parsed.command_args.insert(
                    "paths".to_string(),
                    Value::Array(
                        parse_path_args(arg)
                            .into_iter()
                            .map(Value::String)
                            .collect(),
                    ),
                );
                return parsed;
            }

            if let Some(action) = find_action(&command, INDEX_ARG_COMMANDS) {
                let mut parsed = Command::new(action, text);
                let index = if arg.is_empty() {
                    Value::Null
                } else {
                    arg.parse::<u64>()
                        .map(|value| Value::Number(value.into()))
                        .unwrap_or_else(|_| Value::String(arg.to_string()))
                };
                parsed.command_args.insert("index".to_string(), index);
                return parsed;
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Command::new(action, text);
            }

            let mut parsed = Command::new("unknown", text);
            parsed
                .command_args
                .insert("command".to_string(), Value::String(command));
            parsed
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return parsed;
        }
    }

    let mut parsed = Command::new("send", text);
    parsed.prompt = Some(raw_trimmed.to_string());
    parsed
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_command;

    #[test]
    fn plain_text_is_a_send() {
        let parsed = parse_command("  a fox head logo  ");
        assert_eq!(parsed.action, "send");
        assert_eq!(parsed.prompt.as_deref(), Some("a fox head logo"));
    }

    #[test]
    fn blank_input_is_noop() {
        assert_eq!(parse_command("   ").action, "noop");
    }

    #[test]
    fn value_commands_keep_their_argument() {
        let mode = parse_command("/mode background-removal");
        assert_eq!(mode.action, "set_mode");
        assert_eq!(mode.command_args["value"], json!("background-removal"));

        let ratio = parse_command("/ratio 16:9");
        assert_eq!(ratio.action, "set_ratio");
        assert_eq!(ratio.command_args["value"], json!("16:9"));
    }

    #[test]
    fn hq_accepts_switch_words_and_toggle() {
        assert_eq!(parse_command("/hq on").command_args["value"], json!(true));
        assert_eq!(parse_command("/hq OFF").command_args["value"], json!(false));
        assert_eq!(parse_command("/hq").command_args["value"], json!(null));
        assert_eq!(parse_command("/hq maybe").command_args["value"], json!("maybe"));
    }

    #[test]
    fn attach_splits_quoted_paths() {
        let parsed = parse_command("/attach \"/tmp/a b.png\" c.jpg");
        assert_eq!(parsed.action, "attach");
        assert_eq!(parsed.command_args["paths"], json!(["/tmp/a b.png", "c.jpg"]));
    }

    #[test]
    fn like_takes_optional_index() {
        assert_eq!(parse_command("/like").command_args["index"], json!(null));
        assert_eq!(parse_command("/like 3").command_args["index"], json!(3));
        assert_eq!(parse_command("/like last").command_args["index"], json!("last"));
    }

    #[test]
    fn no_arg_commands() {
        assert_eq!(parse_command("/reset").action, "reset");
        assert_eq!(parse_command("/modes").action, "list_modes");
        assert_eq!(parse_command("/memory").action, "memory");
        assert_eq!(parse_command("/QUIT").action, "quit");
    }

    #[test]
    fn unknown_command() {
        let parsed = parse_command("/magic foo bar");
        assert_eq!(parsed.action, "unknown");
        assert_eq!(parsed.command_args["command"], json!("magic"));
        assert_eq!(parsed.command_args["arg"], json!("foo bar"));
    }
}
