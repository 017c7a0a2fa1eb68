//! Terminal result of one pipeline run

use super::FeatureSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    /// Technical features extracted; creative commentary may still be absent
    Success,
    /// Fatal failure (decode error or cancellation)
    Failure,
}

/// Immutable result, created once per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub run_id: Uuid,
    pub status: AnalysisStatus,
    pub file_name: String,
    /// Absent only on `Failure`
    pub technical: Option<FeatureSet>,
    pub creative: Option<String>,
    /// Detailed narrative of the run
    pub message: String,
    /// Short status line
    pub final_message: String,
}

impl AnalysisResult {
    pub fn is_success(&self) -> bool {
        self.status == AnalysisStatus::Success
    }
}
