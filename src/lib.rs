//! # A.R.E.S Research
//!
//! Research orchestration core: given a query, explore it as a tree of
//! subtopics (or hand it to a crew of role agents), keep every branch from
//! repeating what another already covered, and assemble one ordered report
//! with a deduplicated reference list.
//!
//! ## Overview
//!
//! Retrieval and text generation are pluggable capabilities
//! ([`SourceGateway`], [`SynthesisGateway`]). Everything else lives here:
//!
//! - [`scheduler`] - recursive breadth x depth exploration on a bounded pool
//! - [`coverage`] - run-wide header ownership with atomic claims
//! - [`agents`] - researcher / analyst / writer / reviewer / editor crews
//! - [`report`] - deterministic assembly and markdown rendering
//! - [`progress`] - drop-tolerant broadcast of progress events
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use ares_research::{Gateways, ReportMode, ResearchConfig, ResearchEngine, RunRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! let gateways = Gateways::new(my_search.clone(), my_llm.clone());
//! let engine = ResearchEngine::new(gateways, &ResearchConfig::default());
//!
//! let request = RunRequest::new("Grid-scale storage", ReportMode::DeepRecursive)
//!     .depth(2)
//!     .breadth(3);
//! let draft = engine.run(request, CancellationToken::new()).await?;
//! println!("{}", draft.to_markdown());
//! ```
//!
//! ## Modes
//!
//! | Mode | Behavior |
//! |------|----------|
//! | `single-phase` | one retrieval + synthesis pass |
//! | `detailed-subtopic` | root pass, one level of subtopics, conclusion |
//! | `deep-recursive` | subtopics down to `max_depth` |
//! | `multi-agent` | planned sections written by a role crew with review rounds |

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// Multi-role agent coordination.
pub mod agents;
/// Command-line interface.
pub mod cli;
/// Section header ownership across a run.
pub mod coverage;
/// Run requests and mode dispatch.
pub mod engine;
/// Retrieval and synthesis capability traits.
pub mod gateway;
/// Progress events and the JSON event log.
pub mod progress;
/// Report assembly and rendering.
pub mod report;
/// Recursive branch exploration.
pub mod scheduler;
/// Arena task tree.
pub mod tree;
/// Core types and error handling.
pub mod types;
/// Configuration loading.
pub mod utils;

// Re-export commonly used types
pub use agents::{AgentCoordinator, AgentRole, AgentRoster, AgentSpec};
pub use coverage::{normalize_header, CoverageTracker};
pub use engine::{ResearchEngine, RunContext, RunRequest};
pub use gateway::{
    GatewayError, Gateways, PromptContext, PromptKind, RetryPolicy, SourceFilter, SourceGateway,
    Synthesis, SynthesisGateway, TokenUsage, UsageMeter,
};
pub use progress::{EventLog, ProgressEvent, ProgressKind, ProgressStream, TaskCounts};
pub use report::{ReportAssembler, ReportDraft};
pub use scheduler::{BranchLimits, BranchScheduler};
pub use types::{
    CitationReference, ReportMode, ResearchError, ResearchTask, Result, Section, SectionStatus,
    SourceDocument, TaskId,
};
pub use utils::toml_config::ResearchConfig;
