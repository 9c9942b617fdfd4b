//! Progress Stream
//!
//! A bounded broadcast of [`ProgressEvent`]s. Publishing never waits: each
//! subscriber has its own buffer of `capacity` events and a subscriber that
//! falls behind loses the oldest ones. Subscribers only observe; nothing they
//! do reaches back into a run.

pub mod log;

use crate::gateway::TokenUsage;
use crate::types::TaskId;
use chrono::{DateTime, Utc};
use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub use log::EventLog;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressKind {
    TaskStarted {
        query: String,
        depth: u32,
        breadth_index: u32,
    },
    SectionCompleted {
        header: String,
        low_confidence: bool,
        #[serde(default)]
        counts: TaskCounts,
    },
    TaskFailed {
        reason: String,
        /// Absent when the whole run failed rather than one task
        #[serde(default, skip_serializing_if = "Option::is_none")]
        counts: Option<TaskCounts>,
    },
    RunCompleted {
        sections: usize,
        failed: usize,
        incomplete: bool,
        #[serde(default)]
        usage: TokenUsage,
    },
}

/// Terminal tasks against tasks planned so far. `planned` grows while a
/// deep run discovers subtopics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub finished: usize,
    pub planned: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Publication order within one stream, starting at 0
    pub seq: u64,
    pub run_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ProgressKind,
}

impl ProgressEvent {
    /// Unpublished event; `seq` and `timestamp` are stamped by
    /// [`ProgressStream::publish`].
    pub fn new(run_id: Uuid, task_id: Option<TaskId>, kind: ProgressKind) -> Self {
        Self {
            seq: 0,
            run_id,
            task_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn is_run_completed(&self) -> bool {
        matches!(self.kind, ProgressKind::RunCompleted { .. })
    }
}

struct StreamState {
    sender: Option<broadcast::Sender<ProgressEvent>>,
    next_seq: u64,
}

pub struct ProgressStream {
    state: Mutex<StreamState>,
}

impl ProgressStream {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            state: Mutex::new(StreamState {
                sender: Some(sender),
                next_seq: 0,
            }),
        }
    }

    /// Stamp and fan out `event`, returning its sequence number.
    ///
    /// Having no subscribers is not an error. After [`close`](Self::close)
    /// events are numbered but go nowhere.
    pub fn publish(&self, mut event: ProgressEvent) -> u64 {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;

        event.seq = seq;
        event.timestamp = Utc::now();

        if let Some(sender) = &state.sender {
            // Err only means nobody is listening right now
            let _ = sender.send(event);
        }
        seq
    }

    /// Lazy sequence of every event published from now on.
    ///
    /// Ends once the stream is closed and the subscriber's buffer is drained.
    pub fn subscribe(&self) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        let receiver = self.state.lock().sender.as_ref().map(|s| s.subscribe());

        async_stream::stream! {
            let Some(mut receiver) = receiver else {
                return;
            };
            loop {
                match receiver.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "progress subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .sender
            .as_ref()
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    pub fn close(&self) {
        self.state.lock().sender = None;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().sender.is_none()
    }
}

impl Default for ProgressStream {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for ProgressStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ProgressStream")
            .field("next_seq", &state.next_seq)
            .field("closed", &state.sender.is_none())
            .finish()
    }
}
