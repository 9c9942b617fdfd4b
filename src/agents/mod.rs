//! Agent Coordinator
//!
//! Multi-role research: an orchestrator plans section topics, then a small
//! crew of role workers (researcher, analyst, writer, reviewer, editor)
//! produces each section by exchanging [`AgentMessage`]s over bounded
//! channels. Topics are claimed in the run's coverage tracker before any
//! researcher sees them, the same mechanism the branch scheduler uses.

pub mod coordinator;
pub mod messages;
pub mod review;
mod workers;

use crate::types::{ResearchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub use coordinator::{AgentCoordinator, CoordinatorLimits};
pub use messages::{AgentMessage, MessagePayload, Recipient};
pub use review::ReviewVerdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Plans topics and collects finished sections
    Orchestrator,
    Researcher,
    Analyst,
    Writer,
    Reviewer,
    /// Final style pass; owns citation formatting
    Editor,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Orchestrator => "orchestrator",
            AgentRole::Researcher => "researcher",
            AgentRole::Analyst => "analyst",
            AgentRole::Writer => "writer",
            AgentRole::Reviewer => "reviewer",
            AgentRole::Editor => "editor",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One roster entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub role: AgentRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Passed to every synthesis call this role makes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl AgentSpec {
    pub fn new(role: AgentRole) -> Self {
        Self {
            role,
            name: None,
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

/// The crew available to a multi-agent run.
///
/// Researcher and writer are required. Analyst, reviewer and editor are
/// optional; a missing role is skipped in the pipeline. The orchestrator is
/// always present, listing it only attaches instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRoster {
    agents: Vec<AgentSpec>,
}

impl AgentRoster {
    pub fn new(agents: Vec<AgentSpec>) -> Self {
        Self { agents }
    }

    /// Every role, no custom instructions
    pub fn standard() -> Self {
        Self::new(
            [
                AgentRole::Orchestrator,
                AgentRole::Researcher,
                AgentRole::Analyst,
                AgentRole::Writer,
                AgentRole::Reviewer,
                AgentRole::Editor,
            ]
            .into_iter()
            .map(AgentSpec::new)
            .collect(),
        )
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.agents {
            if !seen.insert(spec.role) {
                return Err(ResearchError::InvalidRequest(format!(
                    "agent roster lists role '{}' more than once",
                    spec.role
                )));
            }
        }
        for required in [AgentRole::Researcher, AgentRole::Writer] {
            if !seen.contains(&required) {
                return Err(ResearchError::InvalidRequest(format!(
                    "agent roster needs a {}",
                    required
                )));
            }
        }
        Ok(())
    }

    pub fn has(&self, role: AgentRole) -> bool {
        role == AgentRole::Orchestrator || self.agents.iter().any(|a| a.role == role)
    }

    pub fn instructions(&self, role: AgentRole) -> Option<&str> {
        self.agents
            .iter()
            .find(|a| a.role == role)
            .and_then(|a| a.instructions.as_deref())
    }

    /// Roles that run as workers, in pipeline order
    pub fn worker_roles(&self) -> Vec<AgentRole> {
        let mut roles: Vec<AgentRole> = self
            .agents
            .iter()
            .map(|a| a.role)
            .filter(|r| *r != AgentRole::Orchestrator)
            .collect();
        roles.sort();
        roles.dedup();
        roles
    }

    pub fn specs(&self) -> &[AgentSpec] {
        &self.agents
    }
}

impl Default for AgentRoster {
    fn default() -> Self {
        Self::standard()
    }
}
