//! Configuration documents and built-in vote defaults.

pub mod defaults;
pub mod document;

pub use defaults::{merge, DefaultConfig, VOTE_CONFIG_KEY};
pub use document::{ConfigDoc, ConfigError};
