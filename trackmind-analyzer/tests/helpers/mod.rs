//! Test Helper Utilities
//!
//! Shared utilities for testing trackmind-analyzer

#![allow(dead_code)]

pub mod audio_generator;
pub mod fakes;

pub use audio_generator::{clip_bytes, garbage_bytes, generate_clip, ClipConfig, C_MAJOR};
pub use fakes::{orchestrator, CountingModel, FakeUploader, UploadMode};
