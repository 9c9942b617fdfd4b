//! Retrieval and synthesis capabilities
//!
//! The orchestration core only ever talks to backends through the two traits
//! in this module. Concrete backends are chosen by configuration (see
//! [`replay::ReplayGateway`]) and handed to the engine as a [`Gateways`] pair.

pub mod curation;
pub mod replay;
pub mod retry;

use crate::types::{ResearchError, SourceDocument};
use crate::utils::toml_config::{GatewayConfig, GatewayKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use curation::SourceFilter;
pub use retry::RetryPolicy;

/// Failure of a single gateway call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("call exceeded its {0:?} deadline")]
    Timeout(Duration),

    /// Refused by the backend. Never retried.
    #[error("content policy refusal: {0}")]
    ContentPolicy(String),

    #[error("cancelled")]
    Cancelled,
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Transient(_) | GatewayError::RateLimited { .. } | GatewayError::Timeout(_)
        )
    }

    /// Backend-provided wait hint, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Which step of a workflow a synthesis call serves.
///
/// Backends map this to their own prompt templates; the core never carries
/// prompt wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Branch pass: write one section and optionally propose subtopics
    Section,
    /// Closing summary over already written sections
    Conclusion,
    /// Orchestrator decomposition of the query into section topics
    Plan,
    Research,
    Analyze,
    Draft,
    Review,
    Edit,
}

impl PromptKind {
    pub const ALL: [PromptKind; 8] = [
        PromptKind::Section,
        PromptKind::Conclusion,
        PromptKind::Plan,
        PromptKind::Research,
        PromptKind::Analyze,
        PromptKind::Draft,
        PromptKind::Review,
        PromptKind::Edit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::Section => "section",
            PromptKind::Conclusion => "conclusion",
            PromptKind::Plan => "plan",
            PromptKind::Research => "research",
            PromptKind::Analyze => "analyze",
            PromptKind::Draft => "draft",
            PromptKind::Review => "review",
            PromptKind::Edit => "edit",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
    }
}

/// Structured input to a synthesis call
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub kind: PromptKind,
    /// The topic this call is about
    pub query: String,
    /// The run's root query
    pub root_query: String,
    pub sources: Arc<[SourceDocument]>,
    /// Upstream text (findings, insight, previous draft)
    pub material: Option<String>,
    /// Reviewer comments for a redraft
    pub feedback: Option<String>,
    /// Maximum subtopics the caller will accept; 0 asks for none
    pub subtopic_limit: usize,
    /// Role instructions from the agent roster
    pub instructions: Option<String>,
}

impl PromptContext {
    pub fn new(kind: PromptKind, query: impl Into<String>, root_query: impl Into<String>) -> Self {
        Self {
            kind,
            query: query.into(),
            root_query: root_query.into(),
            sources: Arc::from(Vec::new()),
            material: None,
            feedback: None,
            subtopic_limit: 0,
            instructions: None,
        }
    }

    pub fn with_sources(mut self, sources: Arc<[SourceDocument]>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = Some(material.into());
        self
    }

    pub fn with_feedback(mut self, feedback: Option<String>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_subtopic_limit(mut self, limit: usize) -> Self {
        self.subtopic_limit = limit;
        self
    }

    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions;
        self
    }
}

/// Token usage statistics reported by a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// Running total of synthesis spend for one run.
///
/// Every successful call is recorded, including calls whose result is
/// discarded after cancellation.
#[derive(Debug, Default)]
pub struct UsageMeter {
    total: Mutex<TokenUsage>,
    calls: AtomicU32,
}

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, synthesis: &Synthesis) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(usage) = &synthesis.usage {
            self.total.lock().add(usage);
        }
    }

    pub fn total(&self) -> TokenUsage {
        *self.total.lock()
    }

    /// Successful synthesis calls recorded so far
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

/// Result of one synthesis call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_subtopics: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl Synthesis {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_subtopics<I, S>(mut self, subtopics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.proposed_subtopics = Some(subtopics.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Retrieval plus content extraction
#[async_trait]
pub trait SourceGateway: Send + Sync {
    /// Ranked documents for `query`. An empty list is a valid answer.
    async fn search(&self, query: &str) -> Result<Vec<SourceDocument>, GatewayError>;
}

/// Text generation
#[async_trait]
pub trait SynthesisGateway: Send + Sync {
    /// Generate text for `ctx`, steering away from `excluded_headers`.
    async fn generate(
        &self,
        ctx: &PromptContext,
        excluded_headers: &[String],
    ) -> Result<Synthesis, GatewayError>;
}

/// The pair of backends a run uses
#[derive(Clone)]
pub struct Gateways {
    pub sources: Arc<dyn SourceGateway>,
    pub synthesis: Arc<dyn SynthesisGateway>,
}

impl Gateways {
    pub fn new(sources: Arc<dyn SourceGateway>, synthesis: Arc<dyn SynthesisGateway>) -> Self {
        Self { sources, synthesis }
    }
}

/// Build the backend pair selected by `[gateway]`.
pub async fn from_config(config: &GatewayConfig) -> crate::types::Result<Gateways> {
    match config.kind {
        GatewayKind::Replay => {
            let path = config.fixture.as_ref().ok_or_else(|| {
                ResearchError::Configuration(
                    "gateway.fixture is required for the replay gateway".to_string(),
                )
            })?;
            let gateway = Arc::new(replay::ReplayGateway::load(path).await?);
            Ok(Gateways::new(gateway.clone(), gateway))
        }
    }
}

impl std::fmt::Debug for Gateways {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateways").finish_non_exhaustive()
    }
}
