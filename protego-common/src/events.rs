//! Pipeline event types and broadcast bus
//!
//! The pipeline emits `PipelineEvent`s for run lifecycle and per-record
//! outcomes. Consumers (log shippers, dashboards, tests) subscribe to the
//! `EventBus`; the pipeline never formats or routes these itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{AnalysisType, SourceType};

/// What caused a scheduled job to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Timer,
    Startup,
    Manual,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Panicked,
}

/// Structured pipeline events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// A scheduled job moved from Idle to Running
    RunStarted {
        job: String,
        run_id: Uuid,
        trigger: TriggerSource,
        timestamp: DateTime<Utc>,
    },

    /// A scheduled job returned to Idle
    RunFinished {
        job: String,
        run_id: Uuid,
        status: RunStatus,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A trigger arrived while the job was already running
    TriggerRejected {
        job: String,
        trigger: TriggerSource,
        timestamp: DateTime<Utc>,
    },

    /// Ingestion stored a new record
    RecordInserted {
        source_type: SourceType,
        external_id: String,
        record_id: Uuid,
    },

    /// Ingestion found the record already stored
    RecordSkipped {
        source_type: SourceType,
        external_id: String,
    },

    /// Ingestion could not store the record
    RecordFailed {
        source_type: SourceType,
        external_id: String,
        reason: String,
    },

    /// Analysis outputs for a record were committed
    RecordAnalyzed {
        record_id: Uuid,
        analysis_types: Vec<AnalysisType>,
        outputs_inserted: usize,
        outputs_skipped: usize,
    },

    /// Analysis of a record failed; it stays unprocessed
    RecordAnalysisFailed { record_id: Uuid, reason: String },

    /// An analysis pass worked through every selectable batch
    PassCompleted {
        batches: usize,
        processed: usize,
        failed: usize,
        cancelled: bool,
    },
}

/// Broadcast bus for pipeline events
///
/// Emitting never blocks and never fails the pipeline: slow subscribers lag
/// and lose the oldest events, and emitting with no subscribers is a no-op.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PipelineEvent) {
        tracing::trace!(?event, "pipeline event");
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
