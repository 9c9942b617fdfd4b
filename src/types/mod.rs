use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============= Task Types =============

/// Arena index of a task inside a run's [`crate::tree::TaskTree`].
///
/// Ids are handed out in creation order, so comparing two ids tells which task
/// was created first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u32);

impl TaskId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// How a run explores its query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ReportMode {
    /// One retrieval + synthesis pass, no subtopics.
    SinglePhase,
    /// Root pass plus one level of subtopics and a conclusion.
    DetailedSubtopic,
    /// Recursive breadth x depth exploration.
    DeepRecursive,
    /// Role-based crew (researcher, analyst, writer, reviewer, editor).
    MultiAgent,
}

impl ReportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportMode::SinglePhase => "single-phase",
            ReportMode::DetailedSubtopic => "detailed-subtopic",
            ReportMode::DeepRecursive => "deep-recursive",
            ReportMode::MultiAgent => "multi-agent",
        }
    }
}

impl fmt::Display for ReportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportMode {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "single-phase" | "single" | "research-report" => Ok(ReportMode::SinglePhase),
            "detailed-subtopic" | "detailed" | "detailed-report" => Ok(ReportMode::DetailedSubtopic),
            "deep-recursive" | "deep" => Ok(ReportMode::DeepRecursive),
            "multi-agent" | "multi-agents" => Ok(ReportMode::MultiAgent),
            other => Err(ResearchError::InvalidRequest(format!(
                "unknown report mode '{}'",
                other
            ))),
        }
    }
}

/// A unit of research work. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchTask {
    pub id: TaskId,
    pub query: String,
    pub mode: ReportMode,
    pub parent: Option<TaskId>,
    pub depth: u32,
    /// Position among siblings, in the order the parent proposed them.
    pub breadth_index: u32,
}

impl ResearchTask {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

// ============= Source Types =============

/// A retrieved document with its extracted text. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// URL or local document id
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub retrieved_at: DateTime<Utc>,
    /// Opaque reliability score; higher is better
    #[serde(default)]
    pub trust: f32,
}

impl SourceDocument {
    pub fn new(origin: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            title: None,
            text: text.into(),
            retrieved_at: Utc::now(),
            trust: 0.0,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_trust(mut self, trust: f32) -> Self {
        self.trust = trust;
        self
    }

    /// Citation pointing at this document
    pub fn citation(&self) -> CitationReference {
        CitationReference {
            display: self
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| self.origin.clone()),
            location: self.origin.clone(),
        }
    }
}

// ============= Report Types =============

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CitationReference {
    pub display: String,
    /// URL or document name
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionStatus {
    Complete,
    /// Accepted after the review budget ran out without approval.
    LowConfidence { rounds: u32 },
    /// Partial-failure placeholder.
    Failed { note: String },
}

/// Display form of a header: surrounding whitespace trimmed, inner runs of
/// whitespace (newlines included) collapsed to one space.
pub fn clean_header(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub header: String,
    pub body: String,
    pub citations: Vec<CitationReference>,
    pub task_id: TaskId,
    /// Depth of the originating task, used for heading levels.
    pub depth: u32,
    pub status: SectionStatus,
}

impl Section {
    pub fn new(task: &ResearchTask, body: impl Into<String>, citations: Vec<CitationReference>) -> Self {
        Self {
            header: clean_header(&task.query),
            body: body.into(),
            citations,
            task_id: task.id,
            depth: task.depth,
            status: SectionStatus::Complete,
        }
    }

    /// Gap marker for a task that could not produce content.
    pub fn placeholder(task: &ResearchTask, note: impl Into<String>) -> Self {
        Self {
            header: clean_header(&task.query),
            body: String::new(),
            citations: Vec::new(),
            task_id: task.id,
            depth: task.depth,
            status: SectionStatus::Failed { note: note.into() },
        }
    }

    pub fn low_confidence(mut self, rounds: u32) -> Self {
        self.status = SectionStatus::LowConfidence { rounds };
        self
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.status, SectionStatus::Failed { .. })
    }

    pub fn is_low_confidence(&self) -> bool {
        matches!(self.status, SectionStatus::LowConfidence { .. })
    }
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    /// Duplicate-free assembly can no longer be guaranteed. Fatal to the run.
    #[error("Coordination failure: {0}")]
    Coordination(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<crate::utils::toml_config::ConfigError> for ResearchError {
    fn from(err: crate::utils::toml_config::ConfigError) -> Self {
        ResearchError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ResearchError>;
