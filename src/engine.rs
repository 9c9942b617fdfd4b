//! Run entry point
//!
//! [`ResearchEngine::run`] validates a [`RunRequest`], creates the per-run
//! [`RunContext`] (fresh coverage tracker and usage meter, shared progress
//! stream, caller's cancellation token) and dispatches to the branch scheduler or the agent
//! coordinator. The two modes never mix within one run.

use crate::agents::{AgentCoordinator, AgentRoster, CoordinatorLimits};
use crate::coverage::{normalize_header, CoverageTracker};
use crate::gateway::{Gateways, RetryPolicy, SourceFilter, UsageMeter};
use crate::progress::{ProgressEvent, ProgressKind, ProgressStream};
use crate::report::ReportDraft;
use crate::scheduler::{BranchLimits, BranchScheduler};
use crate::types::{ReportMode, ResearchError, Result, TaskId};
use crate::utils::toml_config::{ResearchConfig, ResearchSettings};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// What the caller wants researched
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: Uuid,
    pub query: String,
    pub mode: ReportMode,
    /// Falls back to `[research].max_depth` (deep-recursive only)
    pub max_depth: Option<u32>,
    pub max_breadth: Option<usize>,
    pub max_concurrency: Option<usize>,
    /// Multi-agent only; falls back to the configured roster
    pub roster: Option<AgentRoster>,
}

impl RunRequest {
    pub fn new(query: impl Into<String>, mode: ReportMode) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            query: query.into(),
            mode,
            max_depth: None,
            max_breadth: None,
            max_concurrency: None,
            roster: None,
        }
    }

    pub fn depth(mut self, depth: u32) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn breadth(mut self, breadth: usize) -> Self {
        self.max_breadth = Some(breadth);
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.max_concurrency = Some(concurrency);
        self
    }

    pub fn roster(mut self, roster: AgentRoster) -> Self {
        self.roster = Some(roster);
        self
    }
}

/// Per-run shared state handed to the scheduler or coordinator
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub coverage: Arc<CoverageTracker>,
    pub usage: Arc<UsageMeter>,
    pub cancel: CancellationToken,
    pub progress: Arc<ProgressStream>,
}

impl RunContext {
    pub fn new(run_id: Uuid, progress: Arc<ProgressStream>, cancel: CancellationToken) -> Self {
        Self {
            run_id,
            coverage: Arc::new(CoverageTracker::new()),
            usage: Arc::new(UsageMeter::new()),
            cancel,
            progress,
        }
    }

    pub fn emit(&self, task_id: Option<TaskId>, kind: ProgressKind) -> u64 {
        self.progress
            .publish(ProgressEvent::new(self.run_id, task_id, kind))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub struct ResearchEngine {
    gateways: Gateways,
    settings: ResearchSettings,
    retry: RetryPolicy,
    filter: SourceFilter,
    roster: AgentRoster,
    progress: Arc<ProgressStream>,
}

impl ResearchEngine {
    pub fn new(gateways: Gateways, config: &ResearchConfig) -> Self {
        Self {
            gateways,
            settings: config.research.clone(),
            retry: RetryPolicy::from(&config.retry),
            filter: SourceFilter::from(&config.sources),
            roster: config.roster(),
            progress: Arc::new(ProgressStream::new(config.progress.channel_capacity)),
        }
    }

    /// Override the per-call retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Stream of progress events for every run of this engine
    pub fn progress(&self) -> Arc<ProgressStream> {
        self.progress.clone()
    }

    /// Execute one run to completion or cancellation.
    ///
    /// Cancelling `cancel` yields `Ok` with a draft marked incomplete. `Err`
    /// means the request was invalid or duplicate-free assembly could not be
    /// guaranteed.
    pub async fn run(&self, request: RunRequest, cancel: CancellationToken) -> Result<ReportDraft> {
        let query = request.query.trim().to_string();
        if normalize_header(&query).is_empty() {
            return Err(ResearchError::InvalidRequest(
                "query must contain at least one letter or digit".to_string(),
            ));
        }

        let ctx = RunContext::new(request.run_id, self.progress.clone(), cancel);
        tracing::info!(run = %ctx.run_id, mode = %request.mode, %query, "research run started");

        let result = match request.mode {
            ReportMode::MultiAgent => {
                let roster = request.roster.as_ref().unwrap_or(&self.roster);
                let coordinator = AgentCoordinator::new(
                    self.gateways.clone(),
                    self.retry,
                    self.filter.clone(),
                    CoordinatorLimits {
                        max_sections: self.settings.max_sections,
                        max_review_rounds: self.settings.max_review_rounds,
                        max_concurrency: self.concurrency(&request),
                    },
                );
                coordinator.run(&ctx, &query, roster).await
            }
            mode => {
                let limits = self.branch_limits(&request);
                BranchScheduler::new(self.gateways.clone(), self.retry, self.filter.clone())
                    .with_conclusion(mode == ReportMode::DetailedSubtopic)
                    .run(&ctx, &query, mode, limits)
                    .await
            }
        };
        ctx.coverage.close();

        match &result {
            Ok(draft) => {
                ctx.emit(
                    None,
                    ProgressKind::RunCompleted {
                        sections: draft.sections().len(),
                        failed: draft.failed_count(),
                        incomplete: draft.is_incomplete(),
                        usage: draft.usage(),
                    },
                );
                tracing::info!(
                    run = %ctx.run_id,
                    sections = draft.sections().len(),
                    failed = draft.failed_count(),
                    incomplete = draft.is_incomplete(),
                    total_tokens = draft.usage().total_tokens,
                    "research run finished"
                );
            }
            Err(err) => {
                tracing::error!(run = %ctx.run_id, error = %err, "research run failed");
                ctx.emit(
                    None,
                    ProgressKind::TaskFailed {
                        reason: err.to_string(),
                        counts: None,
                    },
                );
                ctx.emit(
                    None,
                    ProgressKind::RunCompleted {
                        sections: 0,
                        failed: 0,
                        incomplete: true,
                        usage: ctx.usage.total(),
                    },
                );
            }
        }
        result
    }

    /// Depth and breadth for a branch-mode request, clamped to the caps.
    pub fn branch_limits(&self, request: &RunRequest) -> BranchLimits {
        let depth = match request.mode {
            ReportMode::SinglePhase => 0,
            ReportMode::DetailedSubtopic => 1,
            _ => request.max_depth.unwrap_or(self.settings.max_depth),
        };
        let breadth = request.max_breadth.unwrap_or(self.settings.max_breadth);

        if depth > self.settings.depth_cap {
            tracing::warn!(requested = depth, cap = self.settings.depth_cap, "clamping depth");
        }
        if breadth > self.settings.breadth_cap || breadth == 0 {
            tracing::warn!(requested = breadth, cap = self.settings.breadth_cap, "clamping breadth");
        }

        BranchLimits {
            max_depth: depth.min(self.settings.depth_cap),
            max_breadth: breadth.clamp(1, self.settings.breadth_cap.max(1)),
            max_concurrency: self.concurrency(request),
        }
    }

    fn concurrency(&self, request: &RunRequest) -> usize {
        request
            .max_concurrency
            .unwrap_or(self.settings.max_concurrency)
            .max(1)
    }
}
