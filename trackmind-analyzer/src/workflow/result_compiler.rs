//! Final result assembly

use crate::error::PipelineError;
use crate::models::feature_set::fmt_opt;
use crate::models::{AnalysisResult, AnalysisStatus, FeatureSet};
use uuid::Uuid;

pub const FINAL_OK: &str = "Audio analysis complete!";
pub const FINAL_FAILED: &str = "Audio analysis failed";
pub const FINAL_CANCELLED: &str = "Audio analysis cancelled";

/// Chords listed inline in the report before eliding the rest
const REPORT_CHORD_LIMIT: usize = 8;

/// Builds the immutable terminal result of a run
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultCompiler;

impl ResultCompiler {
    /// Successful run, with or without commentary
    pub fn compile(
        &self,
        run_id: Uuid,
        file_name: &str,
        features: FeatureSet,
        creative: Option<String>,
    ) -> AnalysisResult {
        let message = Self::report(file_name, &features, creative.as_deref());
        AnalysisResult {
            run_id,
            status: AnalysisStatus::Success,
            file_name: file_name.to_string(),
            technical: Some(features),
            creative,
            message,
            final_message: FINAL_OK.to_string(),
        }
    }

    /// Fatal failure: no features, message names the cause
    pub fn compile_failure(&self, run_id: Uuid, file_name: &str, error: &PipelineError) -> AnalysisResult {
        let final_message = match error {
            PipelineError::Cancelled => FINAL_CANCELLED,
            _ => FINAL_FAILED,
        };
        AnalysisResult {
            run_id,
            status: AnalysisStatus::Failure,
            file_name: file_name.to_string(),
            technical: None,
            creative: None,
            message: format!("**Analysis failed: {}**\n\n{}", file_name, error),
            final_message: final_message.to_string(),
        }
    }

    fn report(file_name: &str, f: &FeatureSet, creative: Option<&str>) -> String {
        let mut lines = vec![
            format!("**Complete Analysis: {}**\n", file_name),
            "**Technical Analysis:**".to_string(),
            format!(
                "• **Tempo**: {} BPM{}",
                fmt_opt(f.bpm, 1),
                f.tempo_feel().map(|t| format!(" ({})", t)).unwrap_or_default()
            ),
            format!("• **Key**: {}", f.key_label()),
            format!("• **Duration**: {:.1} seconds", f.duration_seconds),
            format!(
                "• **Energy**: {}{}",
                fmt_opt(f.energy, 0),
                f.energy_level().map(|e| format!(" ({})", e)).unwrap_or_default()
            ),
            format!("• **Danceability**: {}", f.danceability_percent()),
            format!("• **Loudness**: {}", fmt_opt(f.loudness, 1)),
            format!("• **Spectral Centroid**: {} Hz (brightness)", fmt_opt(f.spectral_centroid, 0)),
            format!("• **Spectral Rolloff**: {} Hz", fmt_opt(f.spectral_rolloff, 0)),
            format!(
                "• **Zero Crossing Rate**: {} (texture)",
                fmt_opt(f.zero_crossing_rate.map(|z| z * 1000.0), 1)
            ),
            format!("• **Onset Rate**: {} events/sec", fmt_opt(f.onset_rate, 2)),
        ];
        if !f.chords.is_empty() {
            let shown: Vec<&str> = f
                .chords
                .iter()
                .take(REPORT_CHORD_LIMIT)
                .map(|c| c.label.as_str())
                .collect();
            let more = if f.chords.len() > REPORT_CHORD_LIMIT { " → …" } else { "" };
            lines.push(format!("• **Chord Progression**: {}{}", shown.join(" → "), more));
        }
        lines.push(String::new());
        lines.push(match creative {
            Some(text) => format!("**Creative Analysis:**\n{}", text),
            None => "*Creative analysis unavailable - using technical data only.*".to_string(),
        });
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::Scale;
    use crate::models::ChordEvent;

    fn features() -> FeatureSet {
        let mut f = FeatureSet::new(8.0, 44100);
        f.bpm = Some(128.0);
        f.key = Some("C".to_string());
        f.scale = Some(Scale::Major);
        f.energy = Some(120_000.0);
        f.danceability = Some(0.81);
        f.zero_crossing_rate = Some(0.0425);
        f.chords = vec![ChordEvent::new("C", 0.9, 0.0), ChordEvent::new("Am", 0.8, 2.0)];
        f
    }

    #[test]
    fn test_success_with_commentary() {
        let id = Uuid::new_v4();
        let result = ResultCompiler.compile(id, "loop.wav", features(), Some("Bright and punchy.".to_string()));

        assert_eq!(result.status, AnalysisStatus::Success);
        assert_eq!(result.run_id, id);
        assert_eq!(result.final_message, FINAL_OK);
        assert!(result.message.starts_with("**Complete Analysis: loop.wav**"));
        assert!(result.message.contains("• **Tempo**: 128.0 BPM (upbeat)"));
        assert!(result.message.contains("• **Energy**: 120000 (High)"));
        assert!(result.message.contains("• **Danceability**: 81%"));
        assert!(result.message.contains("• **Zero Crossing Rate**: 42.5 (texture)"));
        assert!(result.message.contains("• **Chord Progression**: C → Am"));
        assert!(result.message.ends_with("**Creative Analysis:**\nBright and punchy."));
    }

    #[test]
    fn test_success_without_commentary() {
        let result = ResultCompiler.compile(Uuid::new_v4(), "loop.wav", features(), None);
        assert!(result.is_success());
        assert!(result.creative.is_none());
        assert!(result.technical.is_some());
        assert!(result
            .message
            .ends_with("*Creative analysis unavailable - using technical data only.*"));
    }

    #[test]
    fn test_message_layout() {
        let result = ResultCompiler.compile(Uuid::new_v4(), "x.wav", features(), Some("Warm.".to_string()));
        assert!(result.message.starts_with("**Complete Analysis: x.wav**\n\n**Technical Analysis:**\n"));
        assert!(result.message.contains("\n\n**Creative Analysis:**\nWarm."));
    }

    #[test]
    fn test_absent_values_render_na() {
        let result = ResultCompiler.compile(Uuid::new_v4(), "x.wav", FeatureSet::new(2.0, 48000), None);
        assert!(result.message.contains("• **Tempo**: N/A BPM\n"));
        assert!(result.message.contains("• **Onset Rate**: N/A events/sec"));
        assert!(!result.message.contains("Chord Progression"));
    }

    #[test]
    fn test_failure_has_no_features() {
        let err = PipelineError::Decode("unsupported codec".to_string());
        let result = ResultCompiler.compile_failure(Uuid::new_v4(), "bad.xyz", &err);

        assert_eq!(result.status, AnalysisStatus::Failure);
        assert!(result.technical.is_none());
        assert!(result.creative.is_none());
        assert!(result.message.contains("unsupported codec"));
        assert_eq!(result.final_message, FINAL_FAILED);

        let cancelled = ResultCompiler.compile_failure(Uuid::new_v4(), "a.wav", &PipelineError::Cancelled);
        assert_eq!(cancelled.final_message, FINAL_CANCELLED);
    }
}
