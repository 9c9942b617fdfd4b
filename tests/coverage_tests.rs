//! Concurrent header claims.

use ares_research::{CoverageTracker, ResearchError, TaskId};
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_claims_have_one_winner() {
    let tracker = Arc::new(CoverageTracker::new());
    let spellings = ["Supply Chains", "supply chains", "## Supply chains", "1. SUPPLY-CHAINS"];

    let mut handles = Vec::new();
    for i in 0..32u32 {
        let tracker = tracker.clone();
        let header = spellings[i as usize % spellings.len()];
        handles.push(tokio::spawn(async move {
            tokio::task::yield_now().await;
            tracker.claim(header, TaskId(i)).unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(tracker.len(), 1);
    assert!(tracker.owner_of("supply chains").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_headers_all_claimed() {
    let tracker = Arc::new(CoverageTracker::new());

    let handles: Vec<_> = (0..16u32)
        .map(|i| {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.claim(&format!("Topic {}", i), TaskId(i)).unwrap() })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap());
    }
    assert_eq!(tracker.covered().len(), 16);
}

#[test]
fn test_claims_after_close_are_coordination_errors() {
    let tracker = CoverageTracker::new();
    assert!(tracker.claim("Before", TaskId(1)).unwrap());
    tracker.close();

    let err = tracker.claim("After", TaskId(2)).unwrap_err();
    assert!(matches!(err, ResearchError::Coordination(_)));
    assert!(tracker.is_claimed("before"));
    assert!(!tracker.is_claimed("after"));
}
