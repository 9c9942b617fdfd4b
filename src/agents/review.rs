use serde::{Deserialize, Serialize};

/// What a reviewer decided about a draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "comments", rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approved,
    Revise(String),
}

impl ReviewVerdict {
    /// Empty text, or a first line starting with `approved`, `approve`,
    /// `lgtm` or `none`, approves. Anything else is a revision request.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let first_line = trimmed
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .trim_start_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();

        let approves = ["approved", "approve", "lgtm", "none"]
            .iter()
            .any(|marker| first_line.starts_with(marker));

        if trimmed.is_empty() || approves {
            ReviewVerdict::Approved
        } else {
            ReviewVerdict::Revise(trimmed.to_string())
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, ReviewVerdict::Approved)
    }
}
