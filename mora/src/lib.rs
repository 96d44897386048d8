pub mod api;
pub mod cache;
pub mod config;
pub mod embedding;
pub mod error;
pub mod history;
pub mod llm;
pub mod pipeline;
pub mod retrieval;
pub mod session;

pub use config::Config;
pub use error::{Error, Result};
