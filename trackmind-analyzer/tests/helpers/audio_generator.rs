//! Audio Test Fixture Generator
//!
//! Synthesises WAV clips with a known tempo and harmony

use std::f64::consts::PI;
use std::path::{Path, PathBuf};

/// C major triad (C4, E4, G4)
pub const C_MAJOR: [f64; 3] = [261.63, 329.63, 392.0];

/// Configuration for generated audio
#[derive(Debug, Clone)]
pub struct ClipConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Four-on-the-floor kick tempo; `None` for no drums
    pub kick_bpm: Option<f64>,
    /// Sustained pad frequencies; empty for no pad
    pub pad: Vec<f64>,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 8.0,
            sample_rate: 44100,
            channels: 2,
            kick_bpm: Some(128.0),
            pad: C_MAJOR.to_vec(),
        }
    }
}

/// Kick drum: pitch-swept sine with a fast decay
fn kick(t: f64) -> f64 {
    if !(0.0..0.25).contains(&t) {
        return 0.0;
    }
    let freq = 50.0 + 110.0 * (-t * 35.0).exp();
    let click = if t < 0.002 { 0.4 } else { 0.0 };
    (-t * 18.0).exp() * (2.0 * PI * freq * t).sin() + click
}

fn sample_at(config: &ClipConfig, i: usize) -> f64 {
    let t = i as f64 / config.sample_rate as f64;

    let drums = config.kick_bpm.map_or(0.0, |bpm| {
        let period = 60.0 / bpm;
        kick(t % period)
    });

    let pad: f64 = config
        .pad
        .iter()
        .map(|f| 0.1 * (2.0 * PI * f * t).sin())
        .sum();

    (0.6 * drums + pad).clamp(-1.0, 1.0)
}

/// Write the clip described by `config` to `path`
pub fn generate_clip(path: &Path, config: &ClipConfig) -> anyhow::Result<PathBuf> {
    let bytes = clip_bytes(config)?;
    std::fs::write(path, bytes)?;
    Ok(path.to_path_buf())
}

/// The clip as in-memory WAV bytes
pub fn clip_bytes(config: &ClipConfig) -> anyhow::Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        let total = (config.duration_seconds * config.sample_rate as f64) as usize;
        for i in 0..total {
            let sample = (sample_at(config, i) * i16::MAX as f64) as i16;
            for _ in 0..config.channels {
                writer.write_sample(sample)?;
            }
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Bytes no decoder accepts
pub fn garbage_bytes() -> Vec<u8> {
    b"definitely not an audio container, just some text padding it out"
        .repeat(16)
}
