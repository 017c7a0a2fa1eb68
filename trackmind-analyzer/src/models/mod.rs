//! Data models for trackmind-analyzer
//!
//! - Audio input description
//! - Extracted features and chord events
//! - Terminal analysis result
//! - Pipeline run state machine

pub mod analysis_result;
pub mod audio_source;
pub mod feature_set;
pub mod pipeline_run;

pub use analysis_result::{AnalysisResult, AnalysisStatus};
pub use audio_source::{AudioSource, TempAudioFile};
pub use feature_set::{ChordEvent, EnergyLevel, FeatureSet, TempoFeel};
pub use pipeline_run::{InvalidTransition, PipelineRun, PipelineStage, StageTransition};
