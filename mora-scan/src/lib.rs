//! # Mora Scan
//!
//! Capture, encrypt and upload scan images, with a small HTTP API that
//! tracks asynchronous processing jobs.
//!
//! ```rust,ignore
//! use mora_scan::{ScanConfig, ScanPipeline, ImageFileSource};
//!
//! let pipeline = ScanPipeline::from_config(&ScanConfig::default())?;
//! let outcome = pipeline.run_once(&ImageFileSource::new("still.png"), None).await?;
//! println!("{}", outcome.url);
//! ```

pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod frame;
pub mod jobs;
pub mod pipeline;

pub use analysis::{AnalysisResult, Analyzer, MockAnalyzer};
pub use api::{router, ScanState, TokenAuth};
pub use config::{ScanConfig, UploadPayload};
pub use error::{Result, ScanError};
pub use frame::{decode_image, encode_png, Frame, FrameSource, ImageFileSource};
pub use jobs::{JobRecord, JobStatus, JobTracker, ScanReport};
pub use pipeline::{default_filename, object_key_for, ScanOutcome, ScanPipeline};
