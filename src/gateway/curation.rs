//! Source curation applied to every retrieval result before synthesis.

use crate::report::citations::{host_of, normalize_location};
use crate::types::SourceDocument;
use crate::utils::toml_config::SourcesConfig;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceFilter {
    pub max_sources: usize,
    /// Minimum extracted text length, in characters
    pub min_content_length: usize,
    /// Hosts dropped together with their subdomains
    pub excluded_domains: Vec<String>,
}

impl Default for SourceFilter {
    fn default() -> Self {
        Self::from(&SourcesConfig::default())
    }
}

impl From<&SourcesConfig> for SourceFilter {
    fn from(config: &SourcesConfig) -> Self {
        Self {
            max_sources: config.max_sources_per_task,
            min_content_length: config.min_content_length,
            excluded_domains: config
                .excluded_domains
                .iter()
                .map(|d| d.trim().trim_start_matches("www.").to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }
}

impl SourceFilter {
    /// Filter, dedupe and rank `documents`. Order among equally trusted
    /// documents is the order the gateway returned them in.
    pub fn curate(&self, documents: Vec<SourceDocument>) -> Vec<SourceDocument> {
        let received = documents.len();
        let mut seen = HashSet::new();

        let mut kept: Vec<SourceDocument> = documents
            .into_iter()
            .filter(|doc| doc.text.trim().chars().count() >= self.min_content_length)
            .filter(|doc| !self.is_excluded(&doc.origin))
            .filter(|doc| seen.insert(normalize_location(&doc.origin)))
            .collect();

        kept.sort_by(|a, b| b.trust.total_cmp(&a.trust));
        kept.truncate(self.max_sources);

        tracing::debug!(received, kept = kept.len(), "curated sources");
        kept
    }

    fn is_excluded(&self, origin: &str) -> bool {
        let Some(host) = host_of(origin) else {
            return false;
        };
        self.excluded_domains
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)))
    }
}
