use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use lumen_contracts::chat::{
    parse_command, ChatMessage, Command as ChatCommand, ImagePayload, CHAT_HELP_COMMANDS,
};
use lumen_contracts::events::EventWriter;
use lumen_contracts::memory::{JsonFileBackend, StyleMemory};
use lumen_contracts::modes::{AspectRatio, Mode};
use lumen_engine::{EngineConfig, Session};
use serde_json::Value;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Parser)]
#[command(name = "lumen", version, about = "Mode-aware image generation chat")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive chat; one transcript per mode.
    Chat(ChatArgs),
    /// Single prompt, single image.
    Run(RunArgs),
}

#[derive(Debug, clap::Args)]
struct EngineArgs {
    /// Event log path (default: <out>/events.jsonl).
    #[arg(long)]
    events: Option<PathBuf>,
    /// Style memory file (default: <out>/style_memory.json).
    #[arg(long)]
    memory: Option<PathBuf>,
    /// Use the offline provider even when an API key is set.
    #[arg(long)]
    dryrun: bool,
    #[arg(long)]
    text_model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
    #[arg(long)]
    image_model_hq: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value = "general")]
    mode: Mode,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = "general")]
    mode: Mode,
    #[arg(long)]
    out: PathBuf,
    /// Reference image; repeat for several.
    #[arg(long = "ref")]
    references: Vec<PathBuf>,
    #[arg(long)]
    ratio: Option<AspectRatio>,
    #[arg(long, value_parser = parse_on_off)]
    hq: Option<bool>,
    #[command(flatten)]
    engine: EngineArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("lumen error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            init_tracing(args.engine.verbose)?;
            run_chat(args)?;
            Ok(0)
        }
        Command::Run(args) => {
            init_tracing(args.engine.verbose)?;
            run_once(args)
        }
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")
}

fn parse_on_off(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("expected on or off, got '{other}'")),
    }
}

fn engine_config(args: &EngineArgs) -> EngineConfig {
    let mut config = EngineConfig::from_env();
    if let Some(key) = non_empty(args.api_key.as_deref()) {
        config.api_key = Some(key);
    }
    if let Some(model) = non_empty(args.text_model.as_deref()) {
        config.text_model = model;
    }
    if let Some(model) = non_empty(args.image_model.as_deref()) {
        config.image_model = model;
    }
    if let Some(model) = non_empty(args.image_model_hq.as_deref()) {
        config.image_model_hq = model;
    }
    config.dryrun = args.dryrun;
    config
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn open_session(out: &Path, args: &EngineArgs, mode: Mode, label: &str) -> Result<Session> {
    fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| out.join("events.jsonl"));
    let memory_path = args
        .memory
        .clone()
        .unwrap_or_else(|| out.join("style_memory.json"));
    let session_id = format!("{label}-{}", Utc::now().format("%Y%m%dT%H%M%S%3f"));
    let events = EventWriter::new(events_path, session_id);
    let memory = StyleMemory::new(Arc::new(JsonFileBackend::new(memory_path)));
    let config = engine_config(args);
    tracing::debug!(
        text_model = %config.text_model,
        image_model = %config.image_model,
        image_model_hq = %config.image_model_hq,
        dryrun = config.dryrun || config.api_key.is_none(),
        "engine configured"
    );
    Ok(Session::from_config(&config, memory, Some(events), mode))
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let session = open_session(&args.out, &args.engine, args.mode, "chat")?;
    let stdin = io::stdin();
    let mut line = String::new();
    let mut staged: Vec<ImagePayload> = Vec::new();

    println!(
        "Lumen chat started in {} mode. Type /help for commands.",
        session.active_mode().label()
    );

    loop {
        print!("[{}]> ", session.active_mode());
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let command = parse_command(input);
        if let Some(prompt) = outgoing_prompt(&command, &staged) {
            let references = std::mem::take(&mut staged);
            let mode = session.active_mode();
            let reply = session.send_message(&prompt, references);
            report_reply(&args.out, mode, &reply);
            continue;
        }
        match command.action.as_str() {
            "noop" => continue,
            "quit" => break,
            "help" => println!("Commands: {}", CHAT_HELP_COMMANDS.join(" ")),
            "list_modes" => print_modes(session.active_mode()),
            "show_config" => print_config(&session),
            "set_mode" => {
                match value_as_non_empty_string(command.command_args.get("value")) {
                    Some(raw) => match raw.parse::<Mode>() {
                        Ok(mode) => {
                            session.change_mode(mode);
                            println!("Mode set to {}", mode.label());
                            print_config(&session);
                        }
                        Err(err) => println!("{err}"),
                    },
                    None => println!("/mode requires a mode name (see /modes)"),
                }
            }
            "set_ratio" => {
                match value_as_non_empty_string(command.command_args.get("value")) {
                    Some(raw) => match raw.parse::<AspectRatio>() {
                        Ok(ratio) => {
                            session.set_aspect_ratio(ratio);
                            println!("Aspect ratio set to {ratio}");
                        }
                        Err(err) => println!("{err}"),
                    },
                    None => println!("/ratio requires a value such as 16:9"),
                }
            }
            "set_quality" => match command.command_args.get("value") {
                Some(Value::Bool(flag)) => {
                    session.set_high_quality(*flag);
                    println!("High quality {}", on_off(*flag));
                }
                Some(Value::String(other)) => println!("/hq expects on or off, got '{other}'"),
                _ => {
                    let flag = !session.config().high_quality;
                    session.set_high_quality(flag);
                    println!("High quality {}", on_off(flag));
                }
            },
            "attach" => {
                let paths = value_as_string_list(command.command_args.get("paths"));
                if paths.is_empty() {
                    println!("/attach requires one or more image paths");
                    continue;
                }
                for raw in paths {
                    match load_attachment(&raw) {
                        Ok(payload) => {
                            println!("Attached {}", attachment_label(&raw));
                            staged.push(payload);
                        }
                        Err(err) => println!("Attach failed: {err:#}"),
                    }
                }
            }
            "detach" => {
                println!("Cleared {} attachment(s)", staged.len());
                staged.clear();
            }
            "like" => {
                let mode = session.active_mode();
                let index = match command.command_args.get("index") {
                    Some(Value::Number(number)) => number.as_u64().map(|value| value as usize),
                    Some(Value::String(other)) => {
                        println!("/like expects a message number, got '{other}'");
                        continue;
                    }
                    _ => session.last_assistant_index(mode),
                };
                let Some(index) = index else {
                    println!("Nothing to like yet");
                    continue;
                };
                if session.like_message(mode, index) {
                    println!("Saved to style memory: message {index}");
                } else {
                    println!("Message {index} can't be liked (needs an unliked generated image)");
                }
            }
            "reset" => {
                let mode = session.active_mode();
                session.reset(mode);
                staged.clear();
                println!("{} history cleared", mode.label());
            }
            "history" => print_history(&session.history(session.active_mode())),
            "memory" => {
                let recalled = session.memory().recall(session.active_mode());
                if recalled.is_empty() {
                    println!("No approved styles for this mode yet. Use /like on a result.");
                } else {
                    println!("{recalled}");
                }
            }
            "unknown" => {
                let name = value_as_non_empty_string(command.command_args.get("command"))
                    .unwrap_or_default();
                println!("Unknown command /{name}. Type /help for commands.");
            }
            other => println!("Unhandled action {other}"),
        }
    }

    Ok(())
}

/// Text to send for this line, if it is a send. A blank line sends the
/// staged attachments with no text.
fn outgoing_prompt(command: &ChatCommand, staged: &[ImagePayload]) -> Option<String> {
    match command.action.as_str() {
        "send" => Some(command.prompt.clone().unwrap_or_default()),
        "noop" if !staged.is_empty() => Some(String::new()),
        _ => None,
    }
}

/// `data:` URLs are decoded in place; anything else is a file path.
fn load_attachment(raw: &str) -> Result<ImagePayload> {
    if raw.trim_start().starts_with("data:") {
        return ImagePayload::from_data_url(raw);
    }
    ImagePayload::from_path(Path::new(raw))
}

fn attachment_label(raw: &str) -> String {
    if raw.trim_start().starts_with("data:") {
        let header = raw.split(',').next().unwrap_or_default();
        format!("inline image ({header})")
    } else {
        raw.to_string()
    }
}

fn run_once(args: RunArgs) -> Result<i32> {
    let session = open_session(&args.out, &args.engine, args.mode, "run")?;
    if let Some(ratio) = args.ratio {
        session.set_aspect_ratio(ratio);
    }
    if let Some(flag) = args.hq {
        session.set_high_quality(flag);
    }
    let references = args
        .references
        .iter()
        .map(|path| ImagePayload::from_path(path))
        .collect::<Result<Vec<_>>>()?;
    let reply = session.send_message(&args.prompt, references);
    Ok(if report_reply(&args.out, args.mode, &reply) {
        0
    } else {
        1
    })
}

/// Prints the outcome and writes any image. Returns whether an image was saved.
fn report_reply(out: &Path, mode: Mode, reply: &ChatMessage) -> bool {
    if let Some(error) = reply.error.as_deref() {
        println!("{error}");
        return false;
    }
    let Some(image) = reply.images.first() else {
        println!("Couldn't generate an image. Please try again.");
        return false;
    };
    match write_reply_image(out, mode, image) {
        Ok(path) => {
            if let Some(prompt) = reply.final_prompt() {
                println!("Prompt: {prompt}");
            }
            println!("Saved {}", path.display());
            true
        }
        Err(err) => {
            println!("Image could not be saved: {err:#}");
            false
        }
    }
}

fn write_reply_image(out: &Path, mode: Mode, image: &ImagePayload) -> Result<PathBuf> {
    let bytes = image.decode()?;
    if bytes.is_empty() {
        bail!("image payload was empty");
    }
    fs::create_dir_all(out)?;
    let stamp = Utc::now().format("%Y%m%d-%H%M%S%3f");
    let path = out.join(format!("{}-{stamp}.{}", mode.as_str(), image.extension()));
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn print_modes(active: Mode) {
    for mode in Mode::ALL {
        let config = mode.default_config();
        let marker = if mode == active { "*" } else { " " };
        println!(
            "{marker} {:<18} {:<5} hq {}",
            mode.as_str(),
            config.aspect_ratio,
            on_off(config.high_quality)
        );
    }
}

fn print_config(session: &Session) {
    let config = session.config();
    println!(
        "{}: aspect ratio {}, high quality {}",
        session.active_mode().label(),
        config.aspect_ratio,
        on_off(config.high_quality)
    );
}

fn print_history(messages: &[ChatMessage]) {
    if messages.is_empty() {
        println!("No messages in this mode.");
        return;
    }
    for (index, message) in messages.iter().enumerate() {
        let who = if message.is_user() { "you" } else { "lumen" };
        let mut notes = Vec::new();
        if !message.images.is_empty() {
            notes.push(format!("{} image(s)", message.images.len()));
        }
        if message.is_liked() {
            notes.push("liked".to_string());
        }
        let suffix = if notes.is_empty() {
            String::new()
        } else {
            format!(" [{}]", notes.join(", "))
        };
        println!("{index:>3} {who}: {}{suffix}", message.content);
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn value_as_non_empty_string(value: Option<&Value>) -> Option<String> {
    let raw = value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

fn value_as_string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
