//! Report Assembler
//!
//! Sections arrive in whatever order their tasks finished. [`ReportAssembler`]
//! puts them back into task-tree pre-order, builds the reference list from the
//! citations in that order, and freezes the result as a [`ReportDraft`].

pub mod citations;
mod render;

use crate::coverage::normalize_header;
use crate::gateway::TokenUsage;
use crate::types::{CitationReference, ReportMode, ResearchError, Result, Section, TaskId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub use citations::{cited_sources, normalize_location};

/// Finalized research document. Immutable once assembled.
#[derive(Debug, Clone, Serialize)]
pub struct ReportDraft {
    run_id: Uuid,
    query: String,
    mode: ReportMode,
    generated_at: DateTime<Utc>,
    sections: Vec<Section>,
    conclusion: Option<String>,
    references: Vec<CitationReference>,
    incomplete: bool,
    usage: TokenUsage,
}

impl ReportDraft {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn mode(&self) -> ReportMode {
        self.mode
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn conclusion(&self) -> Option<&str> {
        self.conclusion.as_deref()
    }

    /// Deduplicated references in first-citation order
    pub fn references(&self) -> &[CitationReference] {
        &self.references
    }

    /// True when the run was cancelled before every task finished
    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    /// Synthesis tokens spent on the run, as reported by the backend
    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    pub fn headers(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.header.as_str()).collect()
    }

    pub fn failed_count(&self) -> usize {
        self.sections.iter().filter(|s| s.is_placeholder()).count()
    }

    pub fn low_confidence_count(&self) -> usize {
        self.sections.iter().filter(|s| s.is_low_confidence()).count()
    }

    pub fn to_markdown(&self) -> String {
        render::markdown(self)
    }
}

#[derive(Debug, Clone)]
pub struct ReportAssembler {
    run_id: Uuid,
    query: String,
    mode: ReportMode,
    conclusion: Option<String>,
    incomplete: bool,
    usage: TokenUsage,
}

impl ReportAssembler {
    pub fn new(run_id: Uuid, query: impl Into<String>, mode: ReportMode) -> Self {
        Self {
            run_id,
            query: query.into(),
            mode,
            conclusion: None,
            incomplete: false,
            usage: TokenUsage::default(),
        }
    }

    pub fn conclusion(mut self, conclusion: Option<String>) -> Self {
        self.conclusion = conclusion.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn incomplete(mut self, incomplete: bool) -> Self {
        self.incomplete = incomplete;
        self
    }

    pub fn usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Order `sections` by `order` (task creation pre-order) and freeze them.
    ///
    /// Tasks in `order` without a section are skipped. A section whose task is
    /// not in `order`, two sections for one task, or two sections sharing a
    /// normalized header mean coverage was violated upstream and fail with
    /// [`ResearchError::Coordination`].
    pub fn assemble(self, sections: Vec<Section>, order: &[TaskId]) -> Result<ReportDraft> {
        let planned: HashSet<TaskId> = order.iter().copied().collect();
        let mut by_task: HashMap<TaskId, Section> = HashMap::with_capacity(sections.len());

        for section in sections {
            if !planned.contains(&section.task_id) {
                return Err(ResearchError::Coordination(format!(
                    "section '{}' belongs to task {} which is not in the task tree",
                    section.header, section.task_id
                )));
            }
            let task_id = section.task_id;
            if by_task.insert(task_id, section).is_some() {
                return Err(ResearchError::Coordination(format!(
                    "task {} produced more than one section",
                    task_id
                )));
            }
        }

        let mut ordered = Vec::with_capacity(by_task.len());
        let mut headers = HashSet::new();
        for task_id in order {
            let Some(section) = by_task.remove(task_id) else {
                continue;
            };
            if !headers.insert(normalize_header(&section.header)) {
                return Err(ResearchError::Coordination(format!(
                    "duplicate section header '{}' reached assembly",
                    section.header
                )));
            }
            ordered.push(section);
        }

        let references = collect_references(&ordered);

        tracing::debug!(
            sections = ordered.len(),
            references = references.len(),
            incomplete = self.incomplete,
            "assembled report"
        );

        Ok(ReportDraft {
            run_id: self.run_id,
            query: self.query,
            mode: self.mode,
            generated_at: Utc::now(),
            sections: ordered,
            conclusion: self.conclusion,
            references,
            incomplete: self.incomplete,
            usage: self.usage,
        })
    }
}

fn collect_references(sections: &[Section]) -> Vec<CitationReference> {
    let mut seen = HashSet::new();
    sections
        .iter()
        .flat_map(|s| s.citations.iter())
        .filter(|c| seen.insert(normalize_location(&c.location)))
        .cloned()
        .collect()
}
