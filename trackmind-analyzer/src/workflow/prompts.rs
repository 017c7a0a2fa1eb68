//! Language-model prompt construction

use crate::models::feature_set::fmt_opt;
use crate::models::{ChordEvent, FeatureSet};

const ANALYSIS_PROMPT: &str = "Listen to this audio and tell me what you hear.

Technical reference from signal analysis:
{technical}

After your analysis, also cover:
1. Based on the bass you hear and the key, what's the chord progression? Give one per section.
2. Describe the different sections (if any), with approximate timestamps
3. Describe the stereo field
4. Describe the production style";

/// Compact chord list: `C (0.0s), Am (2.3s)` plus a truncation note
pub fn chord_digest(chords: &[ChordEvent], limit: usize) -> String {
    if chords.is_empty() {
        return "none detected".to_string();
    }

    let listed: Vec<String> = chords
        .iter()
        .take(limit)
        .map(|c| format!("{} ({:.1}s)", c.label, c.timestamp_seconds))
        .collect();

    let mut digest = listed.join(", ");
    if chords.len() > limit {
        digest.push_str(&format!(" ... and {} more", chords.len() - limit));
    }
    digest
}

/// Human-readable feature digest embedded in the prompt
pub fn technical_digest(features: &FeatureSet, chord_limit: usize) -> String {
    format!(
        "Duration: {:.1} seconds\n\
         BPM: {}\n\
         Key: {}\n\
         Energy: {}\n\
         Loudness: {}\n\
         Spectral Centroid: {}\n\
         Danceability: {}\n\
         Chords: {}",
        features.duration_seconds,
        fmt_opt(features.bpm, 1),
        features.key_label(),
        fmt_opt(features.energy, 2),
        fmt_opt(features.loudness, 2),
        fmt_opt(features.spectral_centroid, 2),
        features
            .danceability
            .map_or_else(|| "N/A".to_string(), |d| format!("{:.1}%", d * 100.0)),
        chord_digest(&features.chords, chord_limit),
    )
}

/// Full prompt for the creative annotation call
pub fn build_analysis_prompt(features: &FeatureSet, chord_limit: usize) -> String {
    ANALYSIS_PROMPT.replace("{technical}", &technical_digest(features, chord_limit))
}
