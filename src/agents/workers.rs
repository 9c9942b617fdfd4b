//! Role workers for one section crew.
//!
//! Pipeline: researcher -> (analyst) -> writer <-> (reviewer) -> (editor) ->
//! orchestrator. Findings are broadcast so every later role sees the sources.
//! A writer/reviewer pair alternates strictly: the writer only redrafts after
//! a review arrives, and the reviewer gives up after `max_rounds` drafts.

use super::messages::{AgentMessage, MessagePayload, Postbox, Recipient};
use super::{AgentRole, ReviewVerdict};
use crate::gateway::{
    GatewayError, Gateways, PromptContext, PromptKind, RetryPolicy, SourceFilter, UsageMeter,
};
use crate::report::cited_sources;
use crate::types::SourceDocument;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Everything a crew shares for one section
pub(crate) struct CrewContext {
    pub topic: String,
    pub root_query: Arc<str>,
    /// Headers owned by other sections of the run
    pub excluded: Vec<String>,
    pub gateways: Gateways,
    pub retry: RetryPolicy,
    pub filter: Arc<SourceFilter>,
    pub cancel: CancellationToken,
    pub usage: Arc<UsageMeter>,
    pub postbox: Arc<Postbox>,
    pub max_rounds: u32,
}

/// Why a worker stopped early
enum Halt {
    Failed(String),
    Cancelled,
}

impl From<GatewayError> for Halt {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Cancelled => Halt::Cancelled,
            other => Halt::Failed(other.to_string()),
        }
    }
}

pub(crate) struct RoleWorker {
    role: AgentRole,
    instructions: Option<String>,
    crew: Arc<CrewContext>,
    sources: Arc<[SourceDocument]>,
    last_draft: Option<String>,
}

impl RoleWorker {
    pub(crate) fn new(role: AgentRole, instructions: Option<String>, crew: Arc<CrewContext>) -> Self {
        Self {
            role,
            instructions,
            crew,
            sources: Arc::from(Vec::new()),
            last_draft: None,
        }
    }

    pub(crate) async fn run(mut self, mut inbox: mpsc::Receiver<AgentMessage>) {
        while let Some(message) = inbox.recv().await {
            if let Err(halt) = self.handle(message.payload).await {
                let payload = match halt {
                    Halt::Failed(reason) => {
                        tracing::warn!(role = %self.role, topic = %self.crew.topic, %reason, "crew member failed");
                        MessagePayload::Failure {
                            role: self.role,
                            reason,
                        }
                    }
                    Halt::Cancelled => MessagePayload::Abandoned,
                };
                self.send(Recipient::Role(AgentRole::Orchestrator), payload).await;
                return;
            }
        }
    }

    async fn handle(&mut self, payload: MessagePayload) -> Result<(), Halt> {
        match (self.role, payload) {
            (AgentRole::Researcher, MessagePayload::Assignment { topic }) => self.research(&topic).await,

            (_, MessagePayload::Findings { text, sources }) => {
                self.sources = sources;
                match self.role {
                    AgentRole::Analyst => {
                        let insight = self.synthesize(PromptKind::Analyze, Some(text), None).await?;
                        self.forward(
                            Recipient::Role(AgentRole::Writer),
                            MessagePayload::Insight { text: insight },
                        )
                        .await
                    }
                    AgentRole::Writer if !self.crew.postbox.has(AgentRole::Analyst) => {
                        self.draft(1, text, None).await
                    }
                    _ => Ok(()),
                }
            }

            (AgentRole::Writer, MessagePayload::Insight { text }) => self.draft(1, text, None).await,

            (
                AgentRole::Writer,
                MessagePayload::Review {
                    round,
                    verdict: ReviewVerdict::Revise(comments),
                },
            ) => {
                let previous = self.last_draft.clone().unwrap_or_default();
                self.draft(round + 1, previous, Some(comments)).await
            }

            (AgentRole::Reviewer, MessagePayload::Draft { round, text }) => self.review(round, text).await,

            (
                AgentRole::Editor,
                MessagePayload::Accepted {
                    text,
                    rounds,
                    approved,
                },
            ) => {
                let edited = self.synthesize(PromptKind::Edit, Some(text), None).await?;
                let citations = cited_sources(&edited, &self.sources);
                self.forward(
                    Recipient::Role(AgentRole::Orchestrator),
                    MessagePayload::Final {
                        text: edited,
                        rounds,
                        approved,
                        citations,
                    },
                )
                .await
            }

            (role, other) => {
                tracing::debug!(%role, kind = other.kind(), "ignoring message");
                Ok(())
            }
        }
    }

    async fn research(&mut self, topic: &str) -> Result<(), Halt> {
        if self.crew.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        let sources_gw = &self.crew.gateways.sources;
        let documents = self
            .crew
            .retry
            .run("search", &self.crew.cancel, || sources_gw.search(topic))
            .await?;
        self.sources = Arc::from(self.crew.filter.curate(documents));

        let findings = self.synthesize(PromptKind::Research, None, None).await?;
        self.forward(
            Recipient::Broadcast,
            MessagePayload::Findings {
                text: findings,
                sources: self.sources.clone(),
            },
        )
        .await
    }

    async fn draft(&mut self, round: u32, material: String, feedback: Option<String>) -> Result<(), Halt> {
        let text = self.synthesize(PromptKind::Draft, Some(material), feedback).await?;
        self.last_draft = Some(text.clone());

        if self.crew.postbox.has(AgentRole::Reviewer) {
            self.forward(
                Recipient::Role(AgentRole::Reviewer),
                MessagePayload::Draft { round, text },
            )
            .await
        } else {
            self.accept(text, round, true).await
        }
    }

    async fn review(&mut self, round: u32, draft: String) -> Result<(), Halt> {
        // an empty review approves, so no text check here
        let comments = self
            .generate(PromptKind::Review, Some(draft.clone()), None)
            .await?;
        let verdict = ReviewVerdict::parse(&comments);

        if verdict.is_approved() {
            tracing::debug!(topic = %self.crew.topic, round, "draft approved");
            return self.accept(draft, round, true).await;
        }
        if round >= self.crew.max_rounds {
            tracing::warn!(topic = %self.crew.topic, round, "review rounds exhausted, accepting draft");
            return self.accept(draft, round, false).await;
        }
        self.forward(
            Recipient::Role(AgentRole::Writer),
            MessagePayload::Review { round, verdict },
        )
        .await
    }

    async fn accept(&self, text: String, rounds: u32, approved: bool) -> Result<(), Halt> {
        let next = if self.crew.postbox.has(AgentRole::Editor) {
            AgentRole::Editor
        } else {
            AgentRole::Orchestrator
        };
        self.forward(
            Recipient::Role(next),
            MessagePayload::Accepted {
                text,
                rounds,
                approved,
            },
        )
        .await
    }

    /// Like [`generate`](Self::generate), but blank output is a failure.
    async fn synthesize(
        &self,
        kind: PromptKind,
        material: Option<String>,
        feedback: Option<String>,
    ) -> Result<String, Halt> {
        let text = self.generate(kind, material, feedback).await?;
        if text.trim().is_empty() {
            return Err(Halt::Failed(format!("{} returned no text", kind.as_str())));
        }
        Ok(text)
    }

    async fn generate(
        &self,
        kind: PromptKind,
        material: Option<String>,
        feedback: Option<String>,
    ) -> Result<String, Halt> {
        if self.crew.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }

        let mut prompt = PromptContext::new(kind, self.crew.topic.as_str(), &*self.crew.root_query)
            .with_sources(self.sources.clone())
            .with_feedback(feedback)
            .with_instructions(self.instructions.clone());
        if let Some(material) = material {
            prompt = prompt.with_material(material);
        }

        let synthesis_gw = &self.crew.gateways.synthesis;
        let excluded = &self.crew.excluded;
        let synthesis = self
            .crew
            .retry
            .run(kind.as_str(), &self.crew.cancel, || synthesis_gw.generate(&prompt, excluded))
            .await?;
        self.crew.usage.record(&synthesis);

        // nothing produced after cancellation moves down the pipeline
        if self.crew.cancel.is_cancelled() {
            tracing::debug!(role = %self.role, topic = %self.crew.topic, "discarding output finished after cancellation");
            return Err(Halt::Cancelled);
        }
        Ok(synthesis.text)
    }

    async fn forward(&self, recipient: Recipient, payload: MessagePayload) -> Result<(), Halt> {
        if self.send(recipient, payload).await {
            Ok(())
        } else {
            Err(Halt::Failed("crew channel closed".to_string()))
        }
    }

    async fn send(&self, recipient: Recipient, payload: MessagePayload) -> bool {
        self.crew.postbox.send(self.role, recipient, payload).await
    }
}
