pub mod config;
pub mod error;
pub mod generate;
pub mod providers;
pub mod refine;
pub mod retry;
pub mod session;

pub use config::EngineConfig;
pub use error::{classify, user_message, FailureKind, ProviderError};
pub use generate::{ImageGenerator, Tier};
pub use refine::PromptRefiner;
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use session::{ModeState, Session};
