pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use app::pipelines::{FilePipeline, RunSummary};
pub use config::{cli::LocalStorage, toml_config::ConflateConfig};
pub use core::{
    conflation::{Conflation, ConflationParams},
    engine::ConflateEngine,
    feedback::{CancellationToken, ProgressFeedback},
    sinks::MemorySinks,
};
pub use utils::error::{ConflateError, Result};
