mod backend;
mod style_memory;

pub use backend::{InMemoryBackend, JsonFileBackend, MemoryBackend};
pub use style_memory::{
    render_style_context, LearnedPattern, StyleMemory, MAX_PATTERNS, RECALL_LIMIT,
    STYLE_MEMORY_KEY,
};
