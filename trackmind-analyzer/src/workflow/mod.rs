//! Analysis pipeline
//!
//! Prepare → (technical analysis ‖ upload) → creative annotation → compile.
//! Chord tracking and smoothing feed the technical stage.

pub mod chord_smoother;
pub mod chord_tracker;
pub mod creative_annotation;
pub mod orchestrator;
pub mod prompts;
pub mod result_compiler;
pub mod technical_analysis;
pub mod upload_stage;

pub use chord_smoother::ChordSmoother;
pub use chord_tracker::{ChordTrackerConfig, FrameChordTracker};
pub use creative_annotation::{AnnotationOutcome, CreativeAnnotationStage};
pub use orchestrator::PipelineOrchestrator;
pub use result_compiler::ResultCompiler;
pub use technical_analysis::TechnicalAnalysisStage;
pub use upload_stage::{UploadOutcome, UploadStage};
