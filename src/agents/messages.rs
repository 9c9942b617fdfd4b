//! Messages exchanged inside one section crew.

use super::{AgentRole, ReviewVerdict};
use crate::types::{CitationReference, SourceDocument};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Role(AgentRole),
    /// Every crew member except the sender, orchestrator included
    Broadcast,
}

#[derive(Debug, Clone)]
pub enum MessagePayload {
    Assignment {
        topic: String,
    },
    Findings {
        text: String,
        sources: Arc<[SourceDocument]>,
    },
    Insight {
        text: String,
    },
    Draft {
        round: u32,
        text: String,
    },
    Review {
        round: u32,
        verdict: ReviewVerdict,
    },
    /// Draft that left the review loop, approved or out of rounds
    Accepted {
        text: String,
        rounds: u32,
        approved: bool,
    },
    /// Edited section with its citations
    Final {
        text: String,
        rounds: u32,
        approved: bool,
        citations: Vec<CitationReference>,
    },
    Failure {
        role: AgentRole,
        reason: String,
    },
    /// The run was cancelled before this role could continue
    Abandoned,
}

impl MessagePayload {
    pub fn kind(&self) -> &'static str {
        match self {
            MessagePayload::Assignment { .. } => "assignment",
            MessagePayload::Findings { .. } => "findings",
            MessagePayload::Insight { .. } => "insight",
            MessagePayload::Draft { .. } => "draft",
            MessagePayload::Review { .. } => "review",
            MessagePayload::Accepted { .. } => "accepted",
            MessagePayload::Final { .. } => "final",
            MessagePayload::Failure { .. } => "failure",
            MessagePayload::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentMessage {
    /// Send order within one crew
    pub seq: u64,
    pub sender: AgentRole,
    pub recipient: Recipient,
    pub payload: MessagePayload,
}

/// Routing table for one crew. The orchestrator's inbox is the section
/// driver's sink.
pub(crate) struct Postbox {
    inboxes: HashMap<AgentRole, mpsc::Sender<AgentMessage>>,
    next_seq: AtomicU64,
}

impl Postbox {
    pub(crate) fn new(inboxes: HashMap<AgentRole, mpsc::Sender<AgentMessage>>) -> Self {
        Self {
            inboxes,
            next_seq: AtomicU64::new(0),
        }
    }

    pub(crate) fn has(&self, role: AgentRole) -> bool {
        self.inboxes.contains_key(&role)
    }

    /// Deliver `payload`. Waits only while a recipient's inbox is full.
    /// Returns false if any addressed inbox is gone.
    pub(crate) async fn send(
        &self,
        sender: AgentRole,
        recipient: Recipient,
        payload: MessagePayload,
    ) -> bool {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let targets: Vec<AgentRole> = match recipient {
            Recipient::Role(role) => vec![role],
            Recipient::Broadcast => {
                let mut roles: Vec<AgentRole> =
                    self.inboxes.keys().copied().filter(|r| *r != sender).collect();
                roles.sort();
                roles
            }
        };

        tracing::debug!(seq, %sender, kind = payload.kind(), targets = targets.len(), "crew message");

        let mut delivered = true;
        for target in targets {
            let Some(inbox) = self.inboxes.get(&target) else {
                tracing::warn!(%sender, %target, "message addressed to a role outside the crew");
                delivered = false;
                continue;
            };
            let message = AgentMessage {
                seq,
                sender,
                recipient,
                payload: payload.clone(),
            };
            if inbox.send(message).await.is_err() {
                delivered = false;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let (writer_tx, mut writer_rx) = mpsc::channel(4);
        let (researcher_tx, mut researcher_rx) = mpsc::channel(4);
        let (sink_tx, mut sink_rx) = mpsc::channel(4);
        let postbox = Postbox::new(HashMap::from([
            (AgentRole::Writer, writer_tx),
            (AgentRole::Researcher, researcher_tx),
            (AgentRole::Orchestrator, sink_tx),
        ]));

        let delivered = postbox
            .send(
                AgentRole::Researcher,
                Recipient::Broadcast,
                MessagePayload::Insight { text: "x".into() },
            )
            .await;
        assert!(delivered);

        assert_eq!(writer_rx.recv().await.unwrap().seq, 0);
        assert_eq!(sink_rx.recv().await.unwrap().sender, AgentRole::Researcher);
        assert!(researcher_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_missing_role_reports_failure() {
        let (sink_tx, _sink_rx) = mpsc::channel(4);
        let postbox = Postbox::new(HashMap::from([(AgentRole::Orchestrator, sink_tx)]));
        let delivered = postbox
            .send(
                AgentRole::Writer,
                Recipient::Role(AgentRole::Editor),
                MessagePayload::Abandoned,
            )
            .await;
        assert!(!delivered);
    }
}
