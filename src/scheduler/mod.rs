//! Branch Scheduler
//!
//! Recursive breadth x depth exploration. One driver loop owns the
//! [`TaskTree`] and a `JoinSet` of branch workers; workers share nothing but
//! the coverage tracker, the progress stream and a semaphore sized to
//! `max_concurrency`. Children of a branch are planned by the driver when that
//! branch finishes, so the tree is only ever mutated in one place.
//!
//! A worker holds its permit across its gateway calls and never holds a lock
//! across one; coverage claims are the only shared writes.

use crate::coverage::{normalize_header, CoverageTracker};
use crate::engine::RunContext;
use crate::gateway::{
    GatewayError, Gateways, PromptContext, PromptKind, RetryPolicy, SourceFilter,
};
use crate::progress::{ProgressKind, TaskCounts};
use crate::report::{cited_sources, ReportAssembler, ReportDraft};
use crate::tree::{TaskTree, TreeLimits};
use crate::types::{clean_header, ReportMode, ResearchError, ResearchTask, Result, Section, TaskId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchLimits {
    pub max_depth: u32,
    pub max_breadth: usize,
    pub max_concurrency: usize,
}

/// Terminal state of one branch
#[derive(Debug)]
enum BranchOutcome {
    Completed {
        section: Section,
        subtopics: Vec<String>,
    },
    /// Retries exhausted or a non-retryable refusal
    Failed { note: String },
    /// Another task already owns this header
    Duplicate,
    /// Abandoned because the run was cancelled
    Skipped,
    Fatal(ResearchError),
}

pub struct BranchScheduler {
    gateways: Gateways,
    retry: RetryPolicy,
    filter: Arc<SourceFilter>,
    write_conclusion: bool,
}

impl BranchScheduler {
    pub fn new(gateways: Gateways, retry: RetryPolicy, filter: SourceFilter) -> Self {
        Self {
            gateways,
            retry,
            filter: Arc::new(filter),
            write_conclusion: false,
        }
    }

    /// Synthesize a closing section over the finished report
    pub fn with_conclusion(mut self, enabled: bool) -> Self {
        self.write_conclusion = enabled;
        self
    }

    /// Explore `root_query` and assemble every terminal section in tree order.
    ///
    /// Returns once every spawned branch is terminal. Branch failures become
    /// placeholders; only a coverage failure is an `Err`.
    pub async fn run(
        &self,
        ctx: &RunContext,
        root_query: &str,
        mode: ReportMode,
        limits: BranchLimits,
    ) -> Result<ReportDraft> {
        let mut tree = TaskTree::new(
            root_query.trim(),
            mode,
            TreeLimits {
                max_depth: limits.max_depth,
                max_breadth: limits.max_breadth,
            },
        );

        let worker = BranchWorker {
            gateways: self.gateways.clone(),
            retry: self.retry,
            filter: self.filter.clone(),
            ctx: ctx.clone(),
            permits: Arc::new(Semaphore::new(limits.max_concurrency.max(1))),
            root_query: Arc::from(root_query.trim()),
            limits,
        };

        tracing::info!(
            run = %ctx.run_id,
            %mode,
            max_depth = limits.max_depth,
            max_breadth = limits.max_breadth,
            max_concurrency = limits.max_concurrency,
            "starting branch exploration"
        );

        let mut branches = JoinSet::new();
        let mut running: HashMap<tokio::task::Id, TaskId> = HashMap::new();
        let mut sections = Vec::new();
        let mut finished = 0usize;

        let root = tree
            .get(tree.root())
            .cloned()
            .ok_or_else(|| ResearchError::Internal("task tree has no root".to_string()))?;
        spawn_branch(&mut branches, &mut running, &worker, &tree, root);

        while let Some(joined) = branches.join_next_with_id().await {
            let (join_id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(err) => {
                    let outcome = if err.is_cancelled() {
                        BranchOutcome::Skipped
                    } else {
                        tracing::error!(error = %err, "branch worker panicked");
                        BranchOutcome::Failed {
                            note: "branch worker crashed".to_string(),
                        }
                    };
                    (err.id(), outcome)
                }
            };
            let Some(task_id) = running.remove(&join_id) else {
                continue;
            };
            let task = tree.get(task_id).cloned().ok_or_else(|| {
                ResearchError::Internal(format!("finished branch {} is not in the tree", task_id))
            })?;
            finished += 1;

            match outcome {
                BranchOutcome::Completed { section, subtopics } => {
                    let header = section.header.clone();
                    let low_confidence = section.is_low_confidence();
                    sections.push(section);

                    if !ctx.is_cancelled() && task.depth < limits.max_depth {
                        for query in
                            plan_children(&tree, &ctx.coverage, task_id, subtopics, limits.max_breadth)
                        {
                            if let Some(child_id) = tree.add_child(task_id, query) {
                                if let Some(child) = tree.get(child_id).cloned() {
                                    spawn_branch(&mut branches, &mut running, &worker, &tree, child);
                                }
                            }
                        }
                    }

                    // emitted after planning so `planned` includes the new children
                    ctx.emit(
                        Some(task_id),
                        ProgressKind::SectionCompleted {
                            header,
                            low_confidence,
                            counts: TaskCounts {
                                finished,
                                planned: tree.len(),
                            },
                        },
                    );
                }
                BranchOutcome::Failed { note } => {
                    tracing::warn!(task = %task_id, depth = task.depth, %note, "branch failed");
                    ctx.emit(
                        Some(task_id),
                        ProgressKind::TaskFailed {
                            reason: note.clone(),
                            counts: Some(TaskCounts {
                                finished,
                                planned: tree.len(),
                            }),
                        },
                    );
                    // gaps hold their header so a later duplicate cannot fill it
                    match ctx.coverage.claim(&task.query, task_id) {
                        Ok(true) => sections.push(Section::placeholder(&task, note)),
                        Ok(false) => {
                            tracing::debug!(task = %task_id, "failed branch duplicated an existing header")
                        }
                        Err(err) => return Self::abort(&mut branches, err).await,
                    }
                }
                BranchOutcome::Duplicate => {
                    tracing::debug!(task = %task_id, query = %task.query, "discarding duplicate section");
                }
                BranchOutcome::Skipped => {
                    tracing::debug!(task = %task_id, "branch abandoned after cancellation");
                }
                BranchOutcome::Fatal(err) => return Self::abort(&mut branches, err).await,
            }
        }

        let order = tree.preorder();
        let conclusion = if self.write_conclusion && !ctx.is_cancelled() {
            self.conclude(ctx, root_query, &sections, &order).await
        } else {
            None
        };

        tracing::info!(
            run = %ctx.run_id,
            tasks = tree.len(),
            sections = sections.len(),
            depth_reached = tree.max_depth_reached(),
            "branch exploration finished"
        );

        ReportAssembler::new(ctx.run_id, root_query.trim(), mode)
            .conclusion(conclusion)
            .incomplete(ctx.is_cancelled())
            .usage(ctx.usage.total())
            .assemble(sections, &order)
    }

    async fn abort(
        branches: &mut JoinSet<BranchOutcome>,
        err: ResearchError,
    ) -> Result<ReportDraft> {
        tracing::error!(error = %err, "coordination failure, aborting run");
        branches.shutdown().await;
        Err(err)
    }

    /// Best effort: a failed conclusion is left out of the report.
    async fn conclude(
        &self,
        ctx: &RunContext,
        root_query: &str,
        sections: &[Section],
        order: &[TaskId],
    ) -> Option<String> {
        let mut ordered: Vec<&Section> = sections.iter().filter(|s| !s.is_placeholder()).collect();
        ordered.sort_by_key(|s| order.iter().position(|id| *id == s.task_id));
        if ordered.is_empty() {
            return None;
        }

        let material = ordered
            .iter()
            .map(|s| format!("## {}\n{}", s.header, s.body.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt =
            PromptContext::new(PromptKind::Conclusion, root_query, root_query).with_material(material);
        let covered = ctx.coverage.covered();
        let synthesis = &self.gateways.synthesis;

        match self
            .retry
            .run("conclusion", &ctx.cancel, || synthesis.generate(&prompt, &covered))
            .await
        {
            Ok(synthesis) => {
                ctx.usage.record(&synthesis);
                if ctx.is_cancelled() {
                    tracing::debug!("run cancelled while concluding, dropping conclusion");
                    return None;
                }
                Some(synthesis.text).filter(|text| !text.trim().is_empty())
            }
            Err(err) => {
                tracing::warn!(error = %err, "conclusion synthesis failed, omitting conclusion");
                None
            }
        }
    }
}

fn spawn_branch(
    branches: &mut JoinSet<BranchOutcome>,
    running: &mut HashMap<tokio::task::Id, TaskId>,
    worker: &BranchWorker,
    tree: &TaskTree,
    task: ResearchTask,
) {
    let ancestors = tree.ancestors(task.id);
    let task_id = task.id;
    let handle = branches.spawn(worker.clone().run(task, ancestors));
    running.insert(handle.id(), task_id);
}

/// Children worth spawning under `parent`, in proposal order.
///
/// A proposal is dropped when its normalized header matches a task query or a
/// covered header on the parent's path to the root, or an earlier proposal in
/// the same list. What survives is truncated to `max_breadth`.
pub(crate) fn plan_children(
    tree: &TaskTree,
    coverage: &CoverageTracker,
    parent: TaskId,
    proposals: Vec<String>,
    max_breadth: usize,
) -> Vec<String> {
    let path = tree.path_to_root(parent);
    let mut blocked: HashSet<String> = path
        .iter()
        .filter_map(|id| tree.get(*id))
        .map(|task| normalize_header(&task.query))
        .collect();
    blocked.extend(coverage.covered_under(&path).iter().map(|h| normalize_header(h)));

    let mut kept = Vec::new();
    for proposal in proposals {
        let query = clean_header(&proposal);
        let key = normalize_header(&query);
        if key.is_empty() || !blocked.insert(key) {
            tracing::debug!(parent = %parent, subtopic = %query, "dropping already covered subtopic");
            continue;
        }
        kept.push(query);
    }

    if kept.len() > max_breadth {
        tracing::warn!(
            parent = %parent,
            proposed = kept.len(),
            max_breadth,
            "truncating subtopic list"
        );
        kept.truncate(max_breadth);
    }
    kept
}

#[derive(Clone)]
struct BranchWorker {
    gateways: Gateways,
    retry: RetryPolicy,
    filter: Arc<SourceFilter>,
    ctx: RunContext,
    permits: Arc<Semaphore>,
    root_query: Arc<str>,
    limits: BranchLimits,
}

impl BranchWorker {
    async fn run(self, task: ResearchTask, ancestors: Vec<TaskId>) -> BranchOutcome {
        let cancel = self.ctx.cancel.clone();
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return BranchOutcome::Skipped,
            permit = self.permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return BranchOutcome::Skipped,
            },
        };

        self.ctx.emit(
            Some(task.id),
            ProgressKind::TaskStarted {
                query: task.query.clone(),
                depth: task.depth,
                breadth_index: task.breadth_index,
            },
        );
        tracing::info!(task = %task.id, depth = task.depth, query = %task.query, "branch started");

        let sources_gw = &self.gateways.sources;
        let sources = match self
            .retry
            .run("search", &cancel, || sources_gw.search(&task.query))
            .await
        {
            Ok(documents) => self.filter.curate(documents),
            Err(GatewayError::Cancelled) => return BranchOutcome::Skipped,
            Err(err) => {
                return BranchOutcome::Failed {
                    note: format!("retrieval failed: {}", err),
                }
            }
        };
        if cancel.is_cancelled() {
            return BranchOutcome::Skipped;
        }

        let excluded = self.ctx.coverage.covered_under(&ancestors);
        let subtopic_limit = if task.depth < self.limits.max_depth {
            self.limits.max_breadth
        } else {
            0
        };
        let sources: Arc<[_]> = Arc::from(sources);
        let prompt = PromptContext::new(PromptKind::Section, task.query.as_str(), &*self.root_query)
            .with_sources(sources.clone())
            .with_subtopic_limit(subtopic_limit);

        let synthesis_gw = &self.gateways.synthesis;
        let synthesis = match self
            .retry
            .run("synthesis", &cancel, || synthesis_gw.generate(&prompt, &excluded))
            .await
        {
            Ok(synthesis) => synthesis,
            Err(GatewayError::Cancelled) => return BranchOutcome::Skipped,
            Err(err) => {
                return BranchOutcome::Failed {
                    note: format!("synthesis failed: {}", err),
                }
            }
        };
        self.ctx.usage.record(&synthesis);
        // a call still in flight when the run was cancelled finishes, but its
        // section is not kept
        if cancel.is_cancelled() {
            tracing::debug!(task = %task.id, "discarding synthesis finished after cancellation");
            return BranchOutcome::Skipped;
        }
        if synthesis.text.trim().is_empty() {
            return BranchOutcome::Failed {
                note: "synthesis returned no text".to_string(),
            };
        }

        let citations = cited_sources(&synthesis.text, &sources);
        let section = Section::new(&task, synthesis.text, citations);

        match self.ctx.coverage.claim(&section.header, task.id) {
            Ok(true) => BranchOutcome::Completed {
                section,
                subtopics: synthesis.proposed_subtopics.unwrap_or_default(),
            },
            Ok(false) => BranchOutcome::Duplicate,
            Err(err) => BranchOutcome::Fatal(err),
        }
    }
}
