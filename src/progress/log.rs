//! JSON event log
//!
//! Subscribes to a [`ProgressStream`] for one run and writes everything it saw
//! to `{dir}/task_{unix_ts}_{query}.json` when the run completes.

use super::{ProgressEvent, ProgressStream};
use crate::types::{ResearchError, Result};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Byte budget for the query part of a log file name
const MAX_QUERY_BYTES: usize = 120;

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\w-]").expect("UNSAFE_FILENAME_CHARS regex should compile")
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogDocument {
    pub timestamp: DateTime<Utc>,
    pub run_id: Uuid,
    pub query: String,
    pub events: Vec<ProgressEvent>,
}

#[derive(Debug, Clone)]
pub struct EventLog {
    dir: PathBuf,
}

impl EventLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Start recording `run_id`. Subscribe before the run starts or early
    /// events are missed.
    ///
    /// The task resolves to the written path once the run's `RunCompleted`
    /// event arrives or the stream closes.
    pub fn spawn(
        &self,
        stream: &ProgressStream,
        run_id: Uuid,
        query: &str,
    ) -> JoinHandle<Result<PathBuf>> {
        let events = stream.subscribe();
        let started = Utc::now();
        let path = self
            .dir
            .join(format!("{}.json", log_file_stem(query, started.timestamp())));
        let dir = self.dir.clone();
        let query = query.to_string();

        tokio::spawn(async move {
            futures::pin_mut!(events);
            let mut recorded = Vec::new();
            while let Some(event) = events.next().await {
                if event.run_id != run_id {
                    continue;
                }
                let done = event.is_run_completed();
                recorded.push(event);
                if done {
                    break;
                }
            }

            let document = EventLogDocument {
                timestamp: started,
                run_id,
                query,
                events: recorded,
            };
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(&path, serde_json::to_vec_pretty(&document)?).await?;
            tracing::info!(path = %path.display(), events = document.events.len(), "wrote event log");
            Ok::<_, ResearchError>(path)
        })
    }
}

/// `task_{unix_ts}_{query}` with the query truncated and unsafe chars removed
pub fn log_file_stem(query: &str, unix_ts: i64) -> String {
    let mut end = 0;
    for (idx, ch) in query.char_indices() {
        if idx + ch.len_utf8() > MAX_QUERY_BYTES {
            break;
        }
        end = idx + ch.len_utf8();
    }
    sanitize_filename(&format!("task_{}_{}", unix_ts, &query[..end]))
}

/// Keep only word characters and `-`.
pub fn sanitize_filename(raw: &str) -> String {
    UNSAFE_FILENAME_CHARS.replace_all(raw, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::TokenUsage;
    use crate::progress::ProgressKind;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(
            sanitize_filename("task_1700000000_What is CRISPR? (2024)"),
            "task_1700000000_WhatisCRISPR2024"
        );
        assert_eq!(sanitize_filename("a/b\\c..d"), "abcd");
    }

    #[test]
    fn test_long_queries_truncated_on_char_boundary() {
        let query = "é".repeat(100);
        let stem = log_file_stem(&query, 1);
        assert_eq!(stem, format!("task_1_{}", "é".repeat(60)));
    }

    #[tokio::test]
    async fn test_log_written_on_run_completed() {
        let dir = tempfile::tempdir().unwrap();
        let stream = ProgressStream::new(16);
        let run_id = Uuid::new_v4();
        let handle = EventLog::new(dir.path()).spawn(&stream, run_id, "solar power");

        stream.publish(ProgressEvent::new(
            Uuid::new_v4(),
            None,
            ProgressKind::TaskFailed {
                reason: "other run".into(),
                counts: None,
            },
        ));
        stream.publish(ProgressEvent::new(
            run_id,
            None,
            ProgressKind::RunCompleted {
                sections: 1,
                failed: 0,
                incomplete: false,
                usage: TokenUsage::default(),
            },
        ));

        let path = handle.await.unwrap().unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("task_") && name.ends_with("_solarpower.json"));

        let document: EventLogDocument =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(document.query, "solar power");
        assert_eq!(document.events.len(), 1);
        assert!(document.events[0].is_run_completed());
    }
}
