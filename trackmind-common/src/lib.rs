//! # TrackMind Common Library
//!
//! Shared code for the TrackMind crates:
//! - Error type
//! - Bootstrap configuration (TOML) and config file resolution
//! - Progress event model and bounded progress channel

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventKind, PipelineStep, ProgressEmitter, ProgressEvent, ProgressReceiver, StepStatus};
