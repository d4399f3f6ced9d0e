pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::Cli;
pub use config::AppConfig;

pub use adapters::db::{NoDatabase, PgMediaRepository};
pub use adapters::http::RemoteFetcher;
pub use adapters::storage::{local::LocalStorage, AnyStorage};
pub use core::{
    engine::ReconcileEngine,
    locator::LocalFileLocator,
    pipeline::{PipelineOptions, ReconcilePipeline},
    upload::MediaUploader,
};
pub use utils::error::{ReconcileError, Result};
