//! Chord progression smoothing
//!
//! Run-length encodes the raw per-frame chord stream and drops runs shorter
//! than the minimum length. Two rules to be aware of:
//!
//! - The first run ever accepted bypasses the length threshold, so a stream
//!   always keeps its opening chord even if it lasted a single frame. The
//!   final run gets no such bypass.
//! - When a dropped run separated two accepted runs of the same label, the
//!   later run is folded into the earlier one (start time kept, confidence
//!   averaged over both), so no two consecutive outputs share a label.

use crate::models::ChordEvent;

/// Accumulated run of identical labels
#[derive(Debug)]
struct Run {
    label: String,
    confidence_sum: f64,
    count: usize,
    start: f64,
}

impl Run {
    fn start(event: &ChordEvent) -> Self {
        Self {
            label: event.label.clone(),
            confidence_sum: event.confidence,
            count: 1,
            start: event.timestamp_seconds,
        }
    }

    fn into_event(self) -> ChordEvent {
        ChordEvent {
            label: self.label,
            confidence: self.confidence_sum / self.count as f64,
            timestamp_seconds: self.start,
        }
    }
}

/// Run-length chord smoother
#[derive(Debug, Clone, Copy)]
pub struct ChordSmoother {
    min_run: usize,
}

impl Default for ChordSmoother {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_RUN)
    }
}

impl ChordSmoother {
    pub const DEFAULT_MIN_RUN: usize = 3;

    pub fn new(min_run: usize) -> Self {
        Self { min_run }
    }

    pub fn min_run(&self) -> usize {
        self.min_run
    }

    /// Smooth a time-ordered raw chord stream
    ///
    /// Streams of two events or fewer are returned unchanged.
    pub fn smooth(&self, raw: &[ChordEvent]) -> Vec<ChordEvent> {
        if raw.len() <= 2 {
            return raw.to_vec();
        }

        let mut accepted: Vec<Run> = Vec::new();
        let mut current: Option<Run> = None;

        for event in raw {
            let extends = current.as_ref().is_some_and(|run| run.label == event.label);
            if extends {
                if let Some(run) = current.as_mut() {
                    run.confidence_sum += event.confidence;
                    run.count += 1;
                }
                continue;
            }

            if let Some(finished) = current.take() {
                if finished.count >= self.min_run || accepted.is_empty() {
                    accept(&mut accepted, finished);
                }
            }
            current = Some(Run::start(event));
        }

        if let Some(last) = current {
            if last.count >= self.min_run {
                accept(&mut accepted, last);
            }
        }

        accepted.into_iter().map(Run::into_event).collect()
    }
}

fn accept(accepted: &mut Vec<Run>, run: Run) {
    match accepted.last_mut() {
        Some(previous) if previous.label == run.label => {
            previous.confidence_sum += run.confidence_sum;
            previous.count += run.count;
        }
        _ => accepted.push(run),
    }
}
