pub mod engine;
pub mod locator;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod upload;

pub use crate::domain::ports::{MediaRepository, Pipeline, Storage};
pub use crate::utils::error::Result;
