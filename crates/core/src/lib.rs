pub mod boards;
pub mod config;
pub mod error;
pub mod submission;

pub use boards::{TargetBoards, TARGET_BOARDS};
pub use config::Config;
pub use error::ConfigError;
pub use submission::Submission;
