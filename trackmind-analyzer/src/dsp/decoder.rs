//! Audio decoding
//!
//! Decodes any container/codec symphonia supports to a mono f64 signal.
//! Channels are averaged; the native sample rate is kept.

use super::{DecodedAudio, DspError, DspResult};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Decode an audio file to mono samples
///
/// # Errors
/// `DspError::Decode` when the file cannot be opened, probed, or contains
/// no decodable audio. Individual corrupt packets are skipped.
pub fn decode_file(path: &Path) -> DspResult<DecodedAudio> {
    debug!(path = %path.display(), "Decoding audio file");

    let file = std::fs::File::open(path)
        .map_err(|e| DspError::Decode(format!("cannot open {}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DspError::Decode(format!("unrecognised format in {}: {}", path.display(), e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DspError::Decode(format!("no audio track in {}", path.display())))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DspError::Decode(format!("unsupported codec in {}: {}", path.display(), e)))?;

    let mut samples: Vec<f64> = Vec::new();
    let mut channels = 0usize;
    let mut sample_buf: Option<SampleBuffer<f64>> = None;
    let mut skipped_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(DspError::Decode(format!("error reading packet: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                skipped_packets += 1;
                debug!(error = %e, "Skipping corrupt packet");
                continue;
            }
            Err(e) => {
                return Err(DspError::Decode(format!("decoder error: {}", e)));
            }
        };

        let spec = *decoded.spec();
        if sample_rate == 0 {
            sample_rate = spec.rate;
        }
        channels = spec.channels.count().max(1);

        let needed = decoded.capacity() * channels;
        if sample_buf.as_ref().map_or(true, |buf| buf.capacity() < needed) {
            sample_buf = Some(SampleBuffer::<f64>::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        samples.extend(
            buf.samples()
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f64>() / channels as f64),
        );
    }

    if skipped_packets > 0 {
        warn!(
            path = %path.display(),
            skipped_packets,
            "Skipped undecodable packets"
        );
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(DspError::Decode(format!("no audio samples decoded from {}", path.display())));
    }

    debug!(
        path = %path.display(),
        total_samples = samples.len(),
        sample_rate,
        channels,
        "Audio decoding complete"
    );

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_decode_missing_file() {
        let result = decode_file(Path::new("/nonexistent/file.mp3"));
        match result {
            Err(DspError::Decode(msg)) => assert!(msg.contains("cannot open")),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_garbage_file() {
        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        file.write_all(b"definitely not a RIFF header").unwrap();
        file.flush().unwrap();

        assert!(matches!(decode_file(file.path()), Err(DspError::Decode(_))));
    }

    #[test]
    fn test_decode_stereo_wav_downmixes() {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
        for _ in 0..2205 {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(-16384i16).unwrap();
        }
        writer.finalize().unwrap();

        let audio = decode_file(file.path()).unwrap();
        assert_eq!(audio.sample_rate, 22050);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.samples.len(), 2205);
        assert!(audio.samples.iter().all(|s| s.abs() < 1e-3));
    }
}
