//! Configuration management module.
//!
//! Handles TOML configuration file loading, validation, and default generation.

mod service;
mod types;
mod validation;

pub use types::Config;

pub use service::ConfigService;
pub use types::{ExecutorConfig, FollowConfig, QueueConfig, ReaperConfig, RuleConfig};
pub use validation::validate;
