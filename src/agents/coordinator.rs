use super::messages::{AgentMessage, MessagePayload, Postbox, Recipient};
use super::workers::{CrewContext, RoleWorker};
use super::{AgentRole, AgentRoster};
use crate::coverage::normalize_header;
use crate::engine::RunContext;
use crate::gateway::{Gateways, PromptContext, PromptKind, RetryPolicy, SourceFilter, UsageMeter};
use crate::progress::{ProgressKind, TaskCounts};
use crate::report::{cited_sources, ReportAssembler, ReportDraft};
use crate::tree::{TaskTree, TreeLimits};
use crate::types::{
    clean_header, CitationReference, ReportMode, ResearchTask, Result, Section, SourceDocument,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Inbox size for every crew member
const INBOX_CAPACITY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorLimits {
    /// Upper bound on planned sections
    pub max_sections: usize,
    /// Drafts a reviewer sees before accepting as low confidence
    pub max_review_rounds: u32,
    /// Sections in flight at once
    pub max_concurrency: usize,
}

enum SectionOutcome {
    Completed(Section),
    Failed(String),
    Abandoned,
}

pub struct AgentCoordinator {
    gateways: Gateways,
    retry: RetryPolicy,
    filter: Arc<SourceFilter>,
    limits: CoordinatorLimits,
}

impl AgentCoordinator {
    pub fn new(
        gateways: Gateways,
        retry: RetryPolicy,
        filter: SourceFilter,
        limits: CoordinatorLimits,
    ) -> Self {
        Self {
            gateways,
            retry,
            filter: Arc::new(filter),
            limits,
        }
    }

    /// Plan topics, run one crew per topic, and assemble the sections in plan
    /// order.
    pub async fn run(&self, ctx: &RunContext, query: &str, roster: &AgentRoster) -> Result<ReportDraft> {
        roster.validate()?;
        let query = query.trim();
        let roster = Arc::new(roster.clone());

        let mut tree = TaskTree::new(
            query,
            ReportMode::MultiAgent,
            TreeLimits {
                max_depth: 1,
                max_breadth: self.limits.max_sections.max(1),
            },
        );

        let topics = self.plan(ctx, query, &roster).await;
        let mut seen = HashSet::new();
        let mut assignments = Vec::new();
        for topic in topics {
            let key = normalize_header(&topic);
            if key.is_empty() || !seen.insert(key) || ctx.coverage.is_claimed(&topic) {
                tracing::debug!(%topic, "dropping overlapping topic");
                continue;
            }
            let Some(task_id) = tree.add_child(tree.root(), topic.as_str()) else {
                tracing::warn!(max_sections = self.limits.max_sections, "truncating planned topics");
                break;
            };
            if !ctx.coverage.claim(&topic, task_id)? {
                continue;
            }
            if let Some(task) = tree.get(task_id) {
                assignments.push(task.clone());
            }
        }

        tracing::info!(run = %ctx.run_id, sections = assignments.len(), "multi-agent plan ready");
        let planned = assignments.len();

        let permits = Arc::new(Semaphore::new(self.limits.max_concurrency.max(1)));
        let mut sections_in_flight = JoinSet::new();
        for task in assignments {
            let crew = self.crew_for(ctx, &task, query);
            let permits = permits.clone();
            let roster = roster.clone();
            let ctx = ctx.clone();
            let max_rounds = self.limits.max_review_rounds.max(1);
            sections_in_flight.spawn(async move {
                let outcome = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => SectionOutcome::Abandoned,
                    permit = permits.acquire() => match permit {
                        Ok(_permit) => {
                            ctx.emit(
                                Some(task.id),
                                ProgressKind::TaskStarted {
                                    query: task.query.clone(),
                                    depth: task.depth,
                                    breadth_index: task.breadth_index,
                                },
                            );
                            run_crew(crew, &task, &roster, max_rounds).await
                        }
                        Err(_) => SectionOutcome::Abandoned,
                    },
                };
                (task, outcome)
            });
        }

        let mut sections = Vec::new();
        let mut finished = 0usize;
        while let Some(joined) = sections_in_flight.join_next().await {
            finished += 1;
            let counts = TaskCounts { finished, planned };
            let (task, outcome) = match joined {
                Ok(done) => done,
                Err(err) => {
                    // the task identity is lost with a panic; nothing to place
                    tracing::error!(error = %err, "section crew panicked");
                    continue;
                }
            };
            match outcome {
                SectionOutcome::Completed(section) => {
                    ctx.emit(
                        Some(task.id),
                        ProgressKind::SectionCompleted {
                            header: section.header.clone(),
                            low_confidence: section.is_low_confidence(),
                            counts,
                        },
                    );
                    sections.push(section);
                }
                SectionOutcome::Failed(note) => {
                    tracing::warn!(task = %task.id, topic = %task.query, %note, "section failed");
                    ctx.emit(
                        Some(task.id),
                        ProgressKind::TaskFailed {
                            reason: note.clone(),
                            counts: Some(counts),
                        },
                    );
                    sections.push(Section::placeholder(&task, note));
                }
                SectionOutcome::Abandoned => {
                    tracing::debug!(task = %task.id, "section abandoned after cancellation");
                }
            }
        }

        ReportAssembler::new(ctx.run_id, query, ReportMode::MultiAgent)
            .incomplete(ctx.is_cancelled())
            .usage(ctx.usage.total())
            .assemble(sections, &tree.preorder())
    }

    /// Topics for the run; the query itself when planning yields nothing.
    async fn plan(&self, ctx: &RunContext, query: &str, roster: &AgentRoster) -> Vec<String> {
        if ctx.is_cancelled() {
            return Vec::new();
        }

        let prompt = PromptContext::new(PromptKind::Plan, query, query)
            .with_subtopic_limit(self.limits.max_sections)
            .with_instructions(roster.instructions(AgentRole::Orchestrator).map(str::to_string));
        let covered = ctx.coverage.covered();
        let synthesis = &self.gateways.synthesis;

        let topics = match self
            .retry
            .run("plan", &ctx.cancel, || synthesis.generate(&prompt, &covered))
            .await
        {
            Ok(plan) => {
                ctx.usage.record(&plan);
                match plan.proposed_subtopics {
                    Some(topics) if !topics.is_empty() => topics,
                    _ => parse_topic_lines(&plan.text),
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "planning failed, researching the query as one section");
                Vec::new()
            }
        };

        let topics: Vec<String> = topics
            .into_iter()
            .map(|t| clean_header(&t))
            .filter(|t| !t.is_empty())
            .collect();
        if topics.is_empty() {
            vec![query.to_string()]
        } else {
            topics
        }
    }

    fn crew_for(&self, ctx: &RunContext, task: &ResearchTask, root_query: &str) -> CrewParts {
        let own = normalize_header(&task.query);
        let excluded = ctx
            .coverage
            .covered()
            .into_iter()
            .filter(|h| normalize_header(h) != own)
            .collect();
        CrewParts {
            gateways: self.gateways.clone(),
            retry: self.retry,
            filter: self.filter.clone(),
            cancel: ctx.cancel.clone(),
            usage: ctx.usage.clone(),
            root_query: Arc::from(root_query),
            excluded,
        }
    }
}

/// Shared inputs for building one crew inside its section task
struct CrewParts {
    gateways: Gateways,
    retry: RetryPolicy,
    filter: Arc<SourceFilter>,
    cancel: CancellationToken,
    usage: Arc<UsageMeter>,
    root_query: Arc<str>,
    excluded: Vec<String>,
}

/// Drive one section: start the crew, hand the researcher its assignment,
/// and wait on the orchestrator inbox for the finished draft.
async fn run_crew(
    parts: CrewParts,
    task: &ResearchTask,
    roster: &AgentRoster,
    max_rounds: u32,
) -> SectionOutcome {
    let (sink_tx, mut sink) = mpsc::channel(INBOX_CAPACITY);
    let mut inboxes = HashMap::from([(AgentRole::Orchestrator, sink_tx)]);
    let mut receivers = Vec::new();
    for role in roster.worker_roles() {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        inboxes.insert(role, tx);
        receivers.push((role, rx));
    }

    let postbox = Arc::new(Postbox::new(inboxes));
    let crew = Arc::new(CrewContext {
        topic: task.query.clone(),
        root_query: parts.root_query,
        excluded: parts.excluded,
        gateways: parts.gateways,
        retry: parts.retry,
        filter: parts.filter,
        cancel: parts.cancel,
        usage: parts.usage,
        postbox: postbox.clone(),
        max_rounds,
    });

    let mut members = JoinSet::new();
    for (role, inbox) in receivers {
        let instructions = roster.instructions(role).map(str::to_string);
        members.spawn(RoleWorker::new(role, instructions, crew.clone()).run(inbox));
    }

    let assigned = postbox
        .send(
            AgentRole::Orchestrator,
            Recipient::Role(AgentRole::Researcher),
            MessagePayload::Assignment {
                topic: task.query.clone(),
            },
        )
        .await;

    let outcome = if !assigned {
        SectionOutcome::Failed("researcher unavailable".to_string())
    } else {
        collect_section(&mut sink, &mut members, task).await
    };

    members.shutdown().await;
    outcome
}

async fn collect_section(
    sink: &mut mpsc::Receiver<AgentMessage>,
    members: &mut JoinSet<()>,
    task: &ResearchTask,
) -> SectionOutcome {
    let mut sources: Arc<[SourceDocument]> = Arc::from(Vec::new());
    loop {
        tokio::select! {
            message = sink.recv() => {
                let Some(message) = message else {
                    return SectionOutcome::Failed("crew stopped without a result".to_string());
                };
                match message.payload {
                    MessagePayload::Findings { sources: found, .. } => sources = found,
                    MessagePayload::Accepted { text, rounds, approved } => {
                        let citations = cited_sources(&text, &sources);
                        return finished(task, text, citations, rounds, approved);
                    }
                    MessagePayload::Final { text, rounds, approved, citations } => {
                        return finished(task, text, citations, rounds, approved);
                    }
                    MessagePayload::Failure { role, reason } => {
                        return SectionOutcome::Failed(format!("{} failed: {}", role, reason));
                    }
                    MessagePayload::Abandoned => return SectionOutcome::Abandoned,
                    other => tracing::debug!(kind = other.kind(), "orchestrator ignoring message"),
                }
            }
            Some(joined) = members.join_next() => {
                if let Err(err) = joined {
                    if err.is_panic() {
                        tracing::error!(error = %err, topic = %task.query, "crew member panicked");
                        return SectionOutcome::Failed("a crew member crashed".to_string());
                    }
                }
            }
        }
    }
}

fn finished(
    task: &ResearchTask,
    text: String,
    citations: Vec<CitationReference>,
    rounds: u32,
    approved: bool,
) -> SectionOutcome {
    let section = Section::new(task, text, citations);
    if approved {
        SectionOutcome::Completed(section)
    } else {
        SectionOutcome::Completed(section.low_confidence(rounds))
    }
}

/// One topic per non-empty line with list markers and numbering removed
pub(crate) fn parse_topic_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_numeric() || c == '.' || c == ')' || c == '-' || c == '*')
                .trim()
                .trim_matches('*')
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topic_lines_strips_numbering() {
        let text = "1. Battery chemistry\n2) **Grid storage**\n\n- Recycling\n  * Policy  ";
        assert_eq!(
            parse_topic_lines(text),
            vec!["Battery chemistry", "Grid storage", "Recycling", "Policy"]
        );
    }
}
