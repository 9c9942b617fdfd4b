//! Shared helpers for the integration tests.

#![allow(dead_code)]

pub mod mocks;

use ares_research::{
    Gateways, ProgressEvent, ResearchConfig, ResearchEngine, RetryPolicy, SourceGateway,
    SynthesisGateway,
};
use futures::StreamExt;
use mocks::{ScriptedSynthesis, StaticSources};
use std::sync::Arc;
use std::time::Duration;

/// Two attempts with millisecond backoff so failure paths stay fast
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        call_timeout: Duration::from_secs(5),
    }
}

pub fn engine_with(
    sources: Arc<StaticSources>,
    synthesis: Arc<ScriptedSynthesis>,
    config: &ResearchConfig,
) -> ResearchEngine {
    let sources: Arc<dyn SourceGateway> = sources;
    let synthesis: Arc<dyn SynthesisGateway> = synthesis;
    ResearchEngine::new(Gateways::new(sources, synthesis), config).with_retry(fast_retry())
}

pub fn engine(sources: Arc<StaticSources>, synthesis: Arc<ScriptedSynthesis>) -> ResearchEngine {
    engine_with(sources, synthesis, &ResearchConfig::default())
}

/// Close the engine's stream and drain what `events` buffered
pub async fn drain(
    engine: &ResearchEngine,
    events: impl futures::Stream<Item = ProgressEvent>,
) -> Vec<ProgressEvent> {
    engine.progress().close();
    events.collect().await
}
