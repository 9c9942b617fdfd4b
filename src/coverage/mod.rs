//! Coverage Tracker
//!
//! Run-scoped record of which task owns which section header. Both research
//! modes route every header through [`CoverageTracker::claim`], which is the
//! only place the "no duplicate header in one report" rule is decided.
//!
//! # Normalization
//!
//! [`normalize_header`] is applied to both claims and lookups:
//!
//! 1. leading markdown `#` marks and list enumeration (`1.`, `2)`, `1.2.`) are removed
//! 2. the text is lowercased
//! 3. every character that is not alphanumeric becomes a space
//! 4. runs of whitespace collapse to one space, ends are trimmed
//!
//! So `"## 2. Supply-Chain Risks"` and `"supply chain   risks"` are the same
//! header. Synonyms are not folded.

use crate::types::{ResearchError, Result, TaskId};
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Canonical form of a section header used as the coverage key.
pub fn normalize_header(raw: &str) -> String {
    let mut rest = raw.trim().trim_start_matches('#').trim_start();
    rest = strip_enumeration(rest);

    let folded: String = rest
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip `1.`, `2)`, `1.2.` style prefixes. A bare number ("2024 outlook") is kept.
fn strip_enumeration(text: &str) -> &str {
    let mut rest = text;
    loop {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return rest;
        }
        let after = &rest[digits..];
        match after.chars().next() {
            Some('.') | Some(')') => rest = after[1..].trim_start(),
            _ => return rest,
        }
    }
}

#[derive(Debug, Default)]
struct CoverageState {
    owners: HashMap<String, TaskId>,
    /// (display header, owner) in claim order
    claimed: Vec<(String, TaskId)>,
}

#[derive(Debug, Default)]
pub struct CoverageTracker {
    state: Mutex<CoverageState>,
    closed: AtomicBool,
}

impl CoverageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `header` for `task`.
    ///
    /// Returns `Ok(true)` if `task` now owns the header (re-claiming your own
    /// header is also `true`), `Ok(false)` if another task owns it or it
    /// normalizes to nothing. Fails only once the tracker has been closed.
    pub fn claim(&self, header: &str, task: TaskId) -> Result<bool> {
        self.ensure_open()?;

        let key = normalize_header(header);
        if key.is_empty() {
            return Ok(false);
        }

        let mut state = self.state.lock();
        match state.owners.entry(key) {
            Entry::Occupied(existing) => Ok(*existing.get() == task),
            Entry::Vacant(slot) => {
                slot.insert(task);
                state.claimed.push((header.trim().to_string(), task));
                Ok(true)
            }
        }
    }

    /// Headers owned by any task on `ancestor_path`, in claim order.
    pub fn covered_under(&self, ancestor_path: &[TaskId]) -> Vec<String> {
        let state = self.state.lock();
        state
            .claimed
            .iter()
            .filter(|(_, owner)| ancestor_path.contains(owner))
            .map(|(header, _)| header.clone())
            .collect()
    }

    /// Every claimed header in claim order.
    pub fn covered(&self) -> Vec<String> {
        let state = self.state.lock();
        state.claimed.iter().map(|(h, _)| h.clone()).collect()
    }

    pub fn owner_of(&self, header: &str) -> Option<TaskId> {
        let key = normalize_header(header);
        self.state.lock().owners.get(&key).copied()
    }

    pub fn is_claimed(&self, header: &str) -> bool {
        self.owner_of(header).is_some()
    }

    pub fn len(&self) -> usize {
        self.state.lock().owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse further claims. Called when a run ends or aborts.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ResearchError::Coordination(
                "coverage tracker is closed; header claims are no longer accepted".to_string(),
            ));
        }
        Ok(())
    }
}
