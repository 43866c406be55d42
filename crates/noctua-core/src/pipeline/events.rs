//! Canonical event protocol for pipeline observers.
//!
//! `PipelineEvent` is the single source of truth for everything the driver
//! emits. The observer is a plain unbounded channel; consumers map events
//! to their own presentation. The driver never fails because of an
//! observer: send errors are ignored, and every event is also accumulated
//! into the trace returned from `run_pipeline`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;

use super::state::Stage;
use crate::report::TestReport;

/// Events emitted by the pipeline driver, in emission order:
/// `stage_start` → tool events → (`stage_complete` xor `stage_error`),
/// with `test_result` / `repair_attempt` interleaved by the test⇄repair
/// loop and exactly one `pipeline_complete` or `pipeline_failed` at the
/// end of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageStart {
        stage: Stage,
    },
    StageComplete {
        stage: Stage,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    StageError {
        stage: Stage,
        error: String,
    },
    StageToolStart {
        stage: Stage,
        tool: String,
    },
    StageToolEnd {
        stage: Stage,
        tool: String,
        duration_ms: u64,
    },
    TestResult {
        report: TestReport,
        attempt: u32,
    },
    RepairAttempt {
        attempt: u32,
        max_attempts: u32,
    },
    PipelineComplete {
        scraper_dir: PathBuf,
        record_count: u32,
    },
    PipelineFailed {
        reason: String,
        stage: Stage,
    },
}

/// Fans events out to the optional observer and into the run trace.
/// Cloneable so tool-activity forwarder tasks can emit concurrently with
/// the driver.
#[derive(Clone)]
pub(crate) struct EventEmitter {
    observer: Option<mpsc::UnboundedSender<PipelineEvent>>,
    trace: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl EventEmitter {
    pub fn new(observer: Option<mpsc::UnboundedSender<PipelineEvent>>) -> Self {
        Self {
            observer,
            trace: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn emit(&self, event: PipelineEvent) {
        if let Some(observer) = &self.observer {
            // A dropped receiver must not disturb the pipeline.
            let _ = observer.send(event.clone());
        }
        self.trace.lock().expect("trace lock").push(event);
    }

    pub fn trace(&self) -> Vec<PipelineEvent> {
        self.trace.lock().expect("trace lock").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let event = PipelineEvent::StageStart {
            stage: Stage::Recon,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "stage_start");
        assert_eq!(value["stage"], "recon");

        let event = PipelineEvent::PipelineFailed {
            reason: "boom".into(),
            stage: Stage::Repair,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "pipeline_failed");
        assert_eq!(value["stage"], "repair");
    }

    #[test]
    fn emitter_survives_dropped_observer() {
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = EventEmitter::new(Some(tx));
        drop(rx);
        emitter.emit(PipelineEvent::StageStart {
            stage: Stage::Schema,
        });
        assert_eq!(emitter.trace().len(), 1);
    }

    #[test]
    fn trace_preserves_order_across_clones() {
        let emitter = EventEmitter::new(None);
        let clone = emitter.clone();
        emitter.emit(PipelineEvent::StageStart {
            stage: Stage::Recon,
        });
        clone.emit(PipelineEvent::StageComplete {
            stage: Stage::Recon,
            duration_ms: 10,
            summary: None,
        });
        let trace = emitter.trace();
        assert_eq!(trace.len(), 2);
        assert!(matches!(trace[0], PipelineEvent::StageStart { .. }));
    }
}
