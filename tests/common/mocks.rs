//! Mock gateways shared by the integration tests.
//!
//! [`StaticSources`] and [`ScriptedSynthesis`] answer from in-memory scripts
//! keyed by normalized query, record every call, and can inject failures or
//! trip a cancellation token at a chosen point of the run. Synthesis can also
//! be slowed down and reports how many calls it had in flight at once.

use ares_research::{
    normalize_header, GatewayError, PromptContext, PromptKind, SourceDocument, SourceGateway,
    Synthesis, SynthesisGateway, TokenUsage,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How far into a `cancel_during` call the token is cancelled, and how long
/// the call runs on afterwards
const CANCEL_AFTER: Duration = Duration::from_millis(40);
const RUN_ON_AFTER_CANCEL: Duration = Duration::from_millis(10);

/// Long enough to pass the default `min_content_length`
const FILLER: &str = "This document was recorded for the test suite and carries enough \
                      extracted text to survive source curation in every scenario.";

/// Default document for a query without a scripted result
pub fn document_for(query: &str) -> SourceDocument {
    let slug = normalize_header(query).replace(' ', "-");
    SourceDocument::new(format!("https://example.com/{}", slug), format!("{} {}", query, FILLER))
        .with_title(format!("About {}", query))
}

/// Retrieval mock
#[derive(Default)]
pub struct StaticSources {
    documents: HashMap<String, Vec<SourceDocument>>,
    failing: HashMap<String, GatewayError>,
    flaky: Mutex<HashMap<String, usize>>,
    cancel_on: Option<(usize, CancellationToken)>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl StaticSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(mut self, query: &str, documents: Vec<SourceDocument>) -> Self {
        self.documents.insert(normalize_header(query), documents);
        self
    }

    /// Every search for `query` fails with `error`
    pub fn failing(mut self, query: &str, error: GatewayError) -> Self {
        self.failing.insert(normalize_header(query), error);
        self
    }

    /// The first `failures` searches for `query` fail transiently
    pub fn flaky(self, query: &str, failures: usize) -> Self {
        self.flaky.lock().insert(normalize_header(query), failures);
        self
    }

    /// Cancel `token` during the `nth` search (1-based). That search still
    /// returns its documents.
    pub fn cancel_on_search(mut self, nth: usize, token: CancellationToken) -> Self {
        self.cancel_on = Some((nth, token));
        self
    }

    pub fn search_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl SourceGateway for StaticSources {
    async fn search(&self, query: &str) -> Result<Vec<SourceDocument>, GatewayError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.queries.lock().push(query.to_string());
        if let Some((nth, token)) = &self.cancel_on {
            if call == *nth {
                token.cancel();
            }
        }

        let key = normalize_header(query);
        if let Some(err) = self.failing.get(&key) {
            return Err(err.clone());
        }
        {
            let mut flaky = self.flaky.lock();
            if let Some(remaining) = flaky.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(GatewayError::Transient("connection reset".to_string()));
                }
            }
        }

        Ok(self
            .documents
            .get(&key)
            .cloned()
            .unwrap_or_else(|| vec![document_for(query)]))
    }
}

/// One synthesis request as the gateway saw it
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: PromptKind,
    pub query: String,
    pub excluded: Vec<String>,
    pub material: Option<String>,
    pub feedback: Option<String>,
    pub subtopic_limit: usize,
    pub source_count: usize,
}

/// Synthesis mock
///
/// Unscripted calls answer `"Notes on {query}."` with the first source's
/// location appended, reviews answer `APPROVED`, and plans answer nothing.
#[derive(Default)]
pub struct ScriptedSynthesis {
    responses: HashMap<(PromptKind, String), Synthesis>,
    failing: HashMap<(PromptKind, String), GatewayError>,
    reviews: Mutex<HashMap<String, VecDeque<String>>>,
    review_default: Option<String>,
    propose: Option<usize>,
    usage: Option<TokenUsage>,
    latency: Option<Duration>,
    cancel_during: Option<(PromptKind, String, CancellationToken)>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<RecordedCall>>,
}

/// Decrements the in-flight count however the call ends
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedSynthesis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, kind: PromptKind, query: &str, synthesis: Synthesis) -> Self {
        self.responses.insert((kind, normalize_header(query)), synthesis);
        self
    }

    /// Section synthesis for `query` proposing `subtopics`
    pub fn section(self, query: &str, subtopics: &[&str]) -> Self {
        let synthesis = Synthesis::text(format!("Findings about {}.", query))
            .with_subtopics(subtopics.iter().copied());
        self.respond(PromptKind::Section, query, synthesis)
    }

    pub fn plan(self, query: &str, text: &str) -> Self {
        self.respond(PromptKind::Plan, query, Synthesis::text(text))
    }

    pub fn failing(mut self, kind: PromptKind, query: &str, error: GatewayError) -> Self {
        self.failing.insert((kind, normalize_header(query)), error);
        self
    }

    /// Reviewer replies for `topic`, consumed in order
    pub fn reviews(self, topic: &str, replies: &[&str]) -> Self {
        self.reviews.lock().insert(
            normalize_header(topic),
            replies.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    /// Reply for reviews without a scripted sequence
    pub fn review_default(mut self, reply: &str) -> Self {
        self.review_default = Some(reply.to_string());
        self
    }

    /// Every unscripted section proposes `count` distinct subtopics
    pub fn always_propose(mut self, count: usize) -> Self {
        self.propose = Some(count);
        self
    }

    /// Every successful call reports `usage`
    pub fn report_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Every call takes at least `latency`
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Cancel `token` partway through the `kind` call for `query`. The call
    /// itself still completes normally.
    pub fn cancel_during(mut self, kind: PromptKind, query: &str, token: CancellationToken) -> Self {
        self.cancel_during = Some((kind, normalize_header(query), token));
        self
    }

    /// Most calls that were running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, kind: PromptKind, query: &str) -> Vec<RecordedCall> {
        let key = normalize_header(query);
        self.calls()
            .into_iter()
            .filter(|c| c.kind == kind && normalize_header(&c.query) == key)
            .collect()
    }

    pub fn kinds_called(&self) -> HashSet<PromptKind> {
        self.calls().into_iter().map(|c| c.kind).collect()
    }
}

#[async_trait]
impl SynthesisGateway for ScriptedSynthesis {
    async fn generate(
        &self,
        ctx: &PromptContext,
        excluded_headers: &[String],
    ) -> Result<Synthesis, GatewayError> {
        self.calls.lock().push(RecordedCall {
            kind: ctx.kind,
            query: ctx.query.clone(),
            excluded: excluded_headers.to_vec(),
            material: ctx.material.clone(),
            feedback: ctx.feedback.clone(),
            subtopic_limit: ctx.subtopic_limit,
            source_count: ctx.sources.len(),
        });

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let key = (ctx.kind, normalize_header(&ctx.query));
        if let Some((kind, query, token)) = &self.cancel_during {
            if *kind == key.0 && *query == key.1 {
                tokio::time::sleep(CANCEL_AFTER).await;
                token.cancel();
                tokio::time::sleep(RUN_ON_AFTER_CANCEL).await;
            }
        }

        self.answer(ctx, key).map(|synthesis| match self.usage {
            Some(usage) if synthesis.usage.is_none() => synthesis.with_usage(usage),
            _ => synthesis,
        })
    }
}

impl ScriptedSynthesis {
    fn answer(&self, ctx: &PromptContext, key: (PromptKind, String)) -> Result<Synthesis, GatewayError> {
        if let Some(err) = self.failing.get(&key) {
            return Err(err.clone());
        }
        if let Some(recorded) = self.responses.get(&key) {
            return Ok(recorded.clone());
        }

        match ctx.kind {
            PromptKind::Review => {
                let scripted = self
                    .reviews
                    .lock()
                    .get_mut(&key.1)
                    .and_then(|replies| replies.pop_front());
                let reply = scripted
                    .or_else(|| self.review_default.clone())
                    .unwrap_or_else(|| "APPROVED".to_string());
                Ok(Synthesis::text(reply))
            }
            PromptKind::Plan => Ok(Synthesis::default()),
            _ => {
                let mut text = format!("Notes on {}.", ctx.query);
                if let Some(source) = ctx.sources.first() {
                    text.push_str(&format!(" See {}.", source.origin));
                }
                let mut synthesis = Synthesis::text(text);
                if ctx.kind == PromptKind::Section {
                    if let Some(count) = self.propose {
                        let wanted = count.min(ctx.subtopic_limit);
                        synthesis = synthesis.with_subtopics(
                            (1..=wanted).map(|i| format!("{} aspect {}", ctx.query, i)),
                        );
                    }
                }
                Ok(synthesis)
            }
        }
    }
}
