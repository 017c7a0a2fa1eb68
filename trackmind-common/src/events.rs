//! Progress event model and the bounded channel that carries it
//!
//! A pipeline run owns one `ProgressEmitter`; any number of consumers
//! subscribe before the run starts. The channel is a `tokio::sync::broadcast`
//! ring: when a consumer falls more than `capacity` events behind, the oldest
//! events are overwritten and the consumer is told how many it lost. Emitting
//! never blocks and never fails the caller.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Named steps of the analysis pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStep {
    PrepareAudio,
    TechnicalAnalysis,
    UploadAudio,
    CreativeAnalysis,
    CompileResults,
}

impl PipelineStep {
    /// Wire name of the step (matches the serde representation)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrepareAudio => "prepare-audio",
            Self::TechnicalAnalysis => "technical-analysis",
            Self::UploadAudio => "upload-audio",
            Self::CreativeAnalysis => "creative-analysis",
            Self::CompileResults => "compile-results",
        }
    }

    /// Human-readable description announced when the step starts
    pub fn start_message(self) -> &'static str {
        match self {
            Self::PrepareAudio => "Loading audio file...",
            Self::TechnicalAnalysis => "Analyzing technical features (BPM, key, energy, chords)...",
            Self::UploadAudio => "Uploading audio for AI listening...",
            Self::CreativeAnalysis => "Getting creative insights from the language model...",
            Self::CompileResults => "Compiling final analysis...",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Intermediate progress (stage start or stage result)
    Progress,
    /// Terminal notification for the run
    Result,
}

/// Completion marker for stage-result events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Complete,
}

/// One progress notification
///
/// Transient: never persisted, delivered at most once per subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
    pub step_name: PipelineStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
}

impl ProgressEvent {
    /// Stage-start event carrying the step's description
    pub fn started(step: PipelineStep) -> Self {
        Self {
            kind: EventKind::Progress,
            message: step.start_message().to_string(),
            step_name: step,
            status: None,
        }
    }

    /// Stage-result event carrying the step's own summary message
    pub fn completed(step: PipelineStep, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Progress,
            message: message.into(),
            step_name: step,
            status: Some(StepStatus::Complete),
        }
    }

    /// Terminal event for the run
    pub fn result(step: PipelineStep, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Result,
            message: message.into(),
            step_name: step,
            status: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind == EventKind::Result
    }
}

/// Sending half of the progress channel
///
/// Cheap to clone; clones share the same ring buffer, so the two parallel
/// branches of a run can each hold one.
#[derive(Clone)]
pub struct ProgressEmitter {
    tx: broadcast::Sender<ProgressEvent>,
    capacity: usize,
}

impl ProgressEmitter {
    /// Create an emitter with a bounded ring of `capacity` events
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Attach a consumer. Events emitted before this call are not replayed.
    pub fn subscribe(&self) -> ProgressReceiver {
        ProgressReceiver {
            rx: self.tx.subscribe(),
            dropped: 0,
        }
    }

    /// Best-effort delivery
    ///
    /// Returns false when nobody is listening. That case is logged and
    /// otherwise ignored.
    pub fn emit(&self, event: ProgressEvent) -> bool {
        match self.tx.send(event) {
            Ok(receiver_count) => {
                debug!(receivers = receiver_count, "Progress event delivered");
                true
            }
            Err(broadcast::error::SendError(event)) => {
                debug!(
                    step = %event.step_name,
                    message = %event.message,
                    "No progress consumer attached, event discarded"
                );
                false
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Receiving half of the progress channel
pub struct ProgressReceiver {
    rx: broadcast::Receiver<ProgressEvent>,
    dropped: u64,
}

impl ProgressReceiver {
    /// Next event, or `None` once every emitter is gone and the ring is drained
    ///
    /// Overrun is not an error: lost events are counted and skipped.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    self.dropped += skipped;
                    warn!(skipped, "Progress consumer fell behind, oldest events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv)
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    self.dropped += skipped;
                    warn!(skipped, "Progress consumer fell behind, oldest events dropped");
                }
                Err(_) => return None,
            }
        }
    }

    /// Total events lost to overrun so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
