//! Pipeline run state machine
//!
//! Preparing → (TechnicalAnalysis ‖ Uploading) → CreativeAnnotation → Compiling → Done
//!
//! Any non-terminal stage may move to Failed. The two parallel branches are
//! entered together by `fork` and left together by `join`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineStage {
    Preparing,
    TechnicalAnalysis,
    Uploading,
    CreativeAnnotation,
    Compiling,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Preparing => "Preparing",
            Self::TechnicalAnalysis => "TechnicalAnalysis",
            Self::Uploading => "Uploading",
            Self::CreativeAnnotation => "CreativeAnnotation",
            Self::Compiling => "Compiling",
            Self::Done => "Done",
            Self::Failed => "Failed",
        })
    }
}

/// Rejected stage change
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid stage transition {from:?} -> {to}")]
pub struct InvalidTransition {
    pub from: Vec<PipelineStage>,
    pub to: PipelineStage,
}

/// Recorded stage change
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTransition {
    pub run_id: Uuid,
    pub from: Vec<PipelineStage>,
    pub to: Vec<PipelineStage>,
    pub transitioned_at: DateTime<Utc>,
}

/// One pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub id: Uuid,
    /// Active stages: two while forked, otherwise one
    stages: Vec<PipelineStage>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRun {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            stages: vec![PipelineStage::Preparing],
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Currently active stages
    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    pub fn is_in(&self, stage: PipelineStage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn is_terminal(&self) -> bool {
        self.stages.iter().any(|s| s.is_terminal())
    }

    fn record(&mut self, to: Vec<PipelineStage>) -> StageTransition {
        let transition = StageTransition {
            run_id: self.id,
            from: std::mem::replace(&mut self.stages, to.clone()),
            to,
            transitioned_at: Utc::now(),
        };
        if self.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }
        transition
    }

    fn require(&self, expected: &[PipelineStage], to: PipelineStage) -> Result<(), InvalidTransition> {
        if self.stages == expected {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.stages.clone(),
                to,
            })
        }
    }

    /// Preparing → TechnicalAnalysis ‖ Uploading
    pub fn fork(&mut self) -> Result<StageTransition, InvalidTransition> {
        self.require(&[PipelineStage::Preparing], PipelineStage::TechnicalAnalysis)?;
        Ok(self.record(vec![PipelineStage::TechnicalAnalysis, PipelineStage::Uploading]))
    }

    /// Both branches finished → CreativeAnnotation
    pub fn join(&mut self) -> Result<StageTransition, InvalidTransition> {
        self.require(
            &[PipelineStage::TechnicalAnalysis, PipelineStage::Uploading],
            PipelineStage::CreativeAnnotation,
        )?;
        Ok(self.record(vec![PipelineStage::CreativeAnnotation]))
    }

    /// CreativeAnnotation → Compiling
    pub fn compile(&mut self) -> Result<StageTransition, InvalidTransition> {
        self.require(&[PipelineStage::CreativeAnnotation], PipelineStage::Compiling)?;
        Ok(self.record(vec![PipelineStage::Compiling]))
    }

    /// Compiling → Done
    pub fn finish(&mut self) -> Result<StageTransition, InvalidTransition> {
        self.require(&[PipelineStage::Compiling], PipelineStage::Done)?;
        Ok(self.record(vec![PipelineStage::Done]))
    }

    /// Any non-terminal stage → Failed
    pub fn fail(&mut self) -> Result<StageTransition, InvalidTransition> {
        if self.is_terminal() {
            return Err(InvalidTransition {
                from: self.stages.clone(),
                to: PipelineStage::Failed,
            });
        }
        Ok(self.record(vec![PipelineStage::Failed]))
    }
}
