//! Fixture-backed gateway
//!
//! Answers both [`SourceGateway`] and [`SynthesisGateway`] from a JSON file,
//! so a run can be reproduced offline:
//!
//! ```json
//! {
//!   "sources":   { "solar power": [{ "origin": "https://...", "text": "..." }] },
//!   "responses": {
//!     "solar power":      { "text": "...", "proposed_subtopics": ["storage"] },
//!     "plan:solar power": { "text": "1. Storage\n2. Policy" }
//!   },
//!   "fallback": "No data recorded for this topic."
//! }
//! ```
//!
//! Response keys may carry a `kind:` prefix (`section`, `plan`, `review`, ...)
//! which wins over the bare query. Keys are matched after header
//! normalization.

use super::{GatewayError, PromptContext, PromptKind, SourceGateway, Synthesis, SynthesisGateway};
use crate::coverage::normalize_header;
use crate::types::{ResearchError, Result, SourceDocument};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayFixture {
    #[serde(default)]
    pub sources: HashMap<String, Vec<SourceDocument>>,
    #[serde(default)]
    pub responses: HashMap<String, Synthesis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

type ResponseKey = (Option<PromptKind>, String);

#[derive(Debug, Clone)]
pub struct ReplayGateway {
    sources: HashMap<String, Vec<SourceDocument>>,
    responses: HashMap<ResponseKey, Synthesis>,
    fallback: Option<String>,
}

impl ReplayGateway {
    pub fn new(fixture: ReplayFixture) -> Self {
        let sources = fixture
            .sources
            .into_iter()
            .map(|(query, docs)| (normalize_header(&query), docs))
            .collect();
        let responses = fixture
            .responses
            .into_iter()
            .map(|(key, synthesis)| (response_key(&key), synthesis))
            .collect();
        Self {
            sources,
            responses,
            fallback: fixture.fallback,
        }
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ResearchError::Configuration(format!(
                "cannot read replay fixture {}: {}",
                path.display(),
                e
            ))
        })?;
        let fixture: ReplayFixture = serde_json::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            queries = fixture.sources.len(),
            responses = fixture.responses.len(),
            "loaded replay fixture"
        );
        Ok(Self::new(fixture))
    }

    fn lookup(&self, kind: PromptKind, query: &str) -> Option<&Synthesis> {
        let query = normalize_header(query);
        self.responses
            .get(&(Some(kind), query.clone()))
            .or_else(|| self.responses.get(&(None, query)))
    }
}

fn response_key(raw: &str) -> ResponseKey {
    if let Some((prefix, rest)) = raw.split_once(':') {
        if let Some(kind) = PromptKind::parse(prefix) {
            return (Some(kind), normalize_header(rest));
        }
    }
    (None, normalize_header(raw))
}

#[async_trait]
impl SourceGateway for ReplayGateway {
    async fn search(&self, query: &str) -> std::result::Result<Vec<SourceDocument>, GatewayError> {
        Ok(self
            .sources
            .get(&normalize_header(query))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl SynthesisGateway for ReplayGateway {
    async fn generate(
        &self,
        ctx: &PromptContext,
        _excluded_headers: &[String],
    ) -> std::result::Result<Synthesis, GatewayError> {
        if let Some(recorded) = self.lookup(ctx.kind, &ctx.query) {
            return Ok(recorded.clone());
        }
        // unrecorded reviews approve so offline runs converge
        if ctx.kind == PromptKind::Review {
            return Ok(Synthesis::text("APPROVED"));
        }
        match &self.fallback {
            Some(text) => Ok(Synthesis::text(text.clone())),
            None => Err(GatewayError::Transient(format!(
                "no recorded {} response for '{}'",
                ctx.kind.as_str(),
                ctx.query
            ))),
        }
    }
}
