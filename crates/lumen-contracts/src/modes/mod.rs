mod config;
mod registry;

pub use config::{AspectRatio, GenerationConfig};
pub use registry::{Mode, ModeSpec, GENERIC_EMPTY_PROMPT};
