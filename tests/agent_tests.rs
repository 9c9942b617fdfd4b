//! Multi-agent runs with scripted crews.

mod common;

use ares_research::{
    normalize_header, AgentRole, AgentRoster, AgentSpec, GatewayError, PromptKind, ReportMode,
    ResearchConfig, ResearchError, RunRequest, SectionStatus, TokenUsage,
};
use common::mocks::{ScriptedSynthesis, StaticSources};
use common::{engine, engine_with};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const QUERY: &str = "Grid-scale energy storage";

fn request() -> RunRequest {
    RunRequest::new(QUERY, ReportMode::MultiAgent)
}

fn lean_roster() -> AgentRoster {
    AgentRoster::new(vec![
        AgentSpec::new(AgentRole::Researcher),
        AgentSpec::new(AgentRole::Writer),
    ])
}

#[tokio::test]
async fn test_approved_sections_follow_plan_order() {
    let sources = Arc::new(StaticSources::new());
    let synthesis = Arc::new(ScriptedSynthesis::new().plan(QUERY, "1. Storage\n2. Policy"));
    let engine = engine(sources, synthesis.clone());

    let draft = engine.run(request(), CancellationToken::new()).await.unwrap();

    assert_eq!(draft.headers(), vec!["Storage", "Policy"]);
    assert!(draft.sections().iter().all(|s| s.status == SectionStatus::Complete));
    assert_eq!(synthesis.calls_for(PromptKind::Edit, "Storage").len(), 1);
    assert_eq!(synthesis.calls_for(PromptKind::Analyze, "Policy").len(), 1);
    assert_eq!(synthesis.calls_for(PromptKind::Draft, "Policy").len(), 1);

    // every section cites the document its researcher found
    let locations: Vec<&str> = draft.references().iter().map(|r| r.location.as_str()).collect();
    assert_eq!(
        locations,
        vec!["https://example.com/storage", "https://example.com/policy"]
    );
}

#[tokio::test]
async fn test_crews_steer_away_from_sibling_sections() {
    let sources = Arc::new(StaticSources::new());
    let synthesis = Arc::new(ScriptedSynthesis::new().plan(QUERY, "Storage\nPolicy"));
    let engine = engine(sources, synthesis.clone());

    engine.run(request(), CancellationToken::new()).await.unwrap();

    let research = synthesis.calls_for(PromptKind::Research, "Storage");
    assert_eq!(research.len(), 1);
    let excluded: Vec<String> = research[0].excluded.iter().map(|h| normalize_header(h)).collect();
    assert!(excluded.contains(&"policy".to_string()));
    assert!(!excluded.contains(&"storage".to_string()));
}

#[tokio::test]
async fn test_review_budget_exhaustion_marks_low_confidence() {
    let mut config = ResearchConfig::default();
    config.research.max_review_rounds = 2;
    let sources = Arc::new(StaticSources::new());
    let synthesis = Arc::new(
        ScriptedSynthesis::new()
            .plan(QUERY, "1. Storage")
            .review_default("Needs more data on costs."),
    );
    let engine = engine_with(sources, synthesis.clone(), &config);

    let draft = engine.run(request(), CancellationToken::new()).await.unwrap();

    assert_eq!(draft.headers(), vec!["Storage"]);
    assert_eq!(
        draft.sections()[0].status,
        SectionStatus::LowConfidence { rounds: 2 }
    );
    assert_eq!(draft.low_confidence_count(), 1);

    let drafts = synthesis.calls_for(PromptKind::Draft, "Storage");
    assert_eq!(drafts.len(), 2);
    assert_eq!(drafts[0].feedback, None);
    assert_eq!(drafts[1].feedback.as_deref(), Some("Needs more data on costs."));
    assert_eq!(synthesis.calls_for(PromptKind::Review, "Storage").len(), 2);
    assert!(draft.to_markdown().contains("[Low confidence]"));
}

#[tokio::test]
async fn test_revision_then_approval_is_complete() {
    let sources = Arc::new(StaticSources::new());
    let synthesis = Arc::new(
        ScriptedSynthesis::new()
            .plan(QUERY, "1. Storage")
            .reviews("Storage", &["Cite the cost figures.", "APPROVED"]),
    );
    let engine = engine(sources, synthesis.clone());

    let draft = engine.run(request(), CancellationToken::new()).await.unwrap();

    assert_eq!(draft.sections()[0].status, SectionStatus::Complete);
    let drafts = synthesis.calls_for(PromptKind::Draft, "Storage");
    assert_eq!(drafts.len(), 2);
    // the redraft works from the previous draft
    assert!(drafts[1]
        .material
        .as_deref()
        .unwrap_or_default()
        .starts_with("Notes on Storage."));
}

#[tokio::test]
async fn test_overlapping_planned_topics_are_dropped() {
    let sources = Arc::new(StaticSources::new());
    let synthesis = Arc::new(ScriptedSynthesis::new().plan(QUERY, "1. Storage\n2. storage!\n3. Policy"));
    let engine = engine(sources.clone(), synthesis);

    let draft = engine.run(request(), CancellationToken::new()).await.unwrap();

    assert_eq!(draft.headers(), vec!["Storage", "Policy"]);
    assert_eq!(sources.search_count(), 2);
}

#[tokio::test]
async fn test_planned_sections_capped() {
    let mut config = ResearchConfig::default();
    config.research.max_sections = 2;
    let sources = Arc::new(StaticSources::new());
    let synthesis = Arc::new(ScriptedSynthesis::new().plan(QUERY, "A\nB\nC\nD"));
    let engine = engine_with(sources, synthesis, &config);

    let draft = engine.run(request(), CancellationToken::new()).await.unwrap();
    assert_eq!(draft.headers(), vec!["A", "B"]);
}

#[tokio::test]
async fn test_lean_roster_skips_optional_roles() {
    let sources = Arc::new(StaticSources::new());
    let synthesis = Arc::new(
        ScriptedSynthesis::new()
            .plan(QUERY, "1. Storage")
            .respond(
                PromptKind::Draft,
                "Storage",
                ares_research::Synthesis::text("Pumped hydro leads (https://example.com/storage)."),
            ),
    );
    let engine = engine(sources, synthesis.clone());

    let draft = engine
        .run(request().roster(lean_roster()), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(draft.sections()[0].body, "Pumped hydro leads (https://example.com/storage).");
    assert_eq!(draft.sections()[0].citations.len(), 1);
    let kinds = synthesis.kinds_called();
    assert!(!kinds.contains(&PromptKind::Review));
    assert!(!kinds.contains(&PromptKind::Edit));
    assert!(!kinds.contains(&PromptKind::Analyze));
}

#[tokio::test]
async fn test_failed_researcher_leaves_gap() {
    let sources = Arc::new(
        StaticSources::new().failing("Policy", GatewayError::ContentPolicy("blocked".to_string())),
    );
    let synthesis = Arc::new(ScriptedSynthesis::new().plan(QUERY, "1. Storage\n2. Policy\n3. Markets"));
    let engine = engine(sources, synthesis);

    let draft = engine.run(request(), CancellationToken::new()).await.unwrap();

    assert_eq!(draft.headers(), vec!["Storage", "Policy", "Markets"]);
    assert_eq!(draft.failed_count(), 1);
    match &draft.sections()[1].status {
        SectionStatus::Failed { note } => assert!(note.contains("researcher")),
        other => panic!("expected a gap, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_plan_researches_the_query() {
    let sources = Arc::new(StaticSources::new());
    let synthesis = Arc::new(ScriptedSynthesis::new());
    let engine = engine(sources, synthesis);

    let draft = engine.run(request(), CancellationToken::new()).await.unwrap();
    assert_eq!(draft.headers(), vec![QUERY]);
}

#[tokio::test]
async fn test_roster_without_writer_rejected() {
    let sources = Arc::new(StaticSources::new());
    let synthesis = Arc::new(ScriptedSynthesis::new());
    let engine = engine(sources.clone(), synthesis);

    let roster = AgentRoster::new(vec![AgentSpec::new(AgentRole::Researcher)]);
    let err = engine
        .run(request().roster(roster), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ResearchError::InvalidRequest(_)));
    assert_eq!(sources.search_count(), 0);
}

#[tokio::test]
async fn test_cancelled_before_start_is_empty_and_incomplete() {
    let sources = Arc::new(StaticSources::new());
    let synthesis = Arc::new(ScriptedSynthesis::new().plan(QUERY, "1. Storage"));
    let engine = engine(sources.clone(), synthesis);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let draft = engine.run(request(), cancel).await.unwrap();

    assert!(draft.is_incomplete());
    assert!(draft.sections().is_empty());
    assert_eq!(sources.search_count(), 0);
}

#[tokio::test]
async fn test_draft_finished_after_cancel_is_discarded() {
    let cancel = CancellationToken::new();
    let sources = Arc::new(StaticSources::new());
    let synthesis = Arc::new(
        ScriptedSynthesis::new()
            .plan(QUERY, "1. Storage\n2. Policy")
            .cancel_during(PromptKind::Draft, "Policy", cancel.clone()),
    );
    let engine = engine(sources, synthesis.clone());

    let draft = engine
        .run(request().roster(lean_roster()).concurrency(2), cancel)
        .await
        .unwrap();

    assert!(draft.is_incomplete());
    assert_eq!(draft.headers(), vec!["Storage"]);
    assert_eq!(draft.failed_count(), 0);
    assert_eq!(synthesis.calls_for(PromptKind::Draft, "Policy").len(), 1);
}

#[tokio::test]
async fn test_review_finished_after_cancel_is_discarded() {
    let cancel = CancellationToken::new();
    let sources = Arc::new(StaticSources::new());
    let synthesis = Arc::new(
        ScriptedSynthesis::new()
            .plan(QUERY, "1. Storage\n2. Policy")
            .cancel_during(PromptKind::Review, "Policy", cancel.clone()),
    );
    let engine = engine(sources, synthesis.clone());

    let draft = engine.run(request().concurrency(2), cancel).await.unwrap();

    assert!(draft.is_incomplete());
    assert_eq!(draft.headers(), vec!["Storage"]);
    // the approval never reached the editor
    assert!(synthesis.calls_for(PromptKind::Edit, "Policy").is_empty());
}

#[tokio::test]
async fn test_concurrency_bounds_crews_in_flight() {
    let sources = Arc::new(StaticSources::new());
    let synthesis = Arc::new(
        ScriptedSynthesis::new()
            .plan(QUERY, "A\nB\nC\nD")
            .latency(Duration::from_millis(5)),
    );
    let engine = engine(sources, synthesis.clone());

    let draft = engine
        .run(request().concurrency(2), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(draft.headers(), vec!["A", "B", "C", "D"]);
    assert_eq!(synthesis.peak_in_flight(), 2);
}

#[tokio::test]
async fn test_usage_covers_planning_and_every_role() {
    let per_call = TokenUsage::new(50, 10);
    let sources = Arc::new(StaticSources::new());
    let synthesis = Arc::new(
        ScriptedSynthesis::new()
            .plan(QUERY, "1. Storage")
            .report_usage(per_call),
    );
    let engine = engine(sources, synthesis.clone());

    let draft = engine.run(request(), CancellationToken::new()).await.unwrap();

    // plan, research, analyze, draft, review, edit
    let calls = synthesis.calls().len() as u32;
    assert_eq!(calls, 6);
    assert_eq!(draft.usage(), TokenUsage::new(50 * calls, 10 * calls));
}
