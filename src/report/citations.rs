//! Citation keys and attribution
//!
//! References are deduplicated by [`normalize_location`], and a section's
//! citations are derived from what its body actually mentions so that inline
//! citations and the final reference list always agree.

use crate::types::{CitationReference, SourceDocument};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>()\[\]"'`]+"#).expect("URL_PATTERN regex should compile")
});

/// Dedup key for a URL or document name.
///
/// URLs keep their path and query but lose case in scheme and host, a leading
/// `www.`, any `#fragment` and trailing slashes. Anything else is trimmed and
/// lowercased.
pub fn normalize_location(location: &str) -> String {
    let trimmed = location.trim();
    let Some((scheme, rest)) = trimmed.split_once("://") else {
        return trimmed.to_lowercase();
    };

    let without_fragment = rest.split('#').next().unwrap_or_default();
    let (host, tail) = match without_fragment.find(['/', '?']) {
        Some(idx) => without_fragment.split_at(idx),
        None => (without_fragment, ""),
    };
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let mut normalized = format!("{}://{}{}", scheme.to_lowercase(), host, tail);
    while normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Lowercased host of a URL without `www.` or port. `None` for non-URLs.
pub fn host_of(location: &str) -> Option<String> {
    let (_, rest) = location.trim().split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?.split(':').next()?.to_lowercase();
    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Citations for a section body written from `sources`.
///
/// Sources mentioned in the body are returned in order of first mention. When
/// the body mentions none of them, every source is attributed in the order
/// given. Duplicate locations collapse to their first occurrence.
pub fn cited_sources(body: &str, sources: &[SourceDocument]) -> Vec<CitationReference> {
    let mentioned_urls: Vec<(usize, String)> = URL_PATTERN
        .find_iter(body)
        .map(|m| {
            let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']);
            (m.start(), normalize_location(url))
        })
        .collect();
    let lowered_body = body.to_lowercase();

    let mut mentioned: Vec<(usize, usize)> = sources
        .iter()
        .enumerate()
        .filter_map(|(idx, source)| {
            let key = normalize_location(&source.origin);
            if key.is_empty() {
                return None;
            }
            let position = if source.origin.contains("://") {
                mentioned_urls
                    .iter()
                    .find(|(_, url)| *url == key)
                    .map(|(pos, _)| *pos)
            } else {
                lowered_body.find(&key)
            };
            position.map(|pos| (pos, idx))
        })
        .collect();
    mentioned.sort();

    let chosen: Vec<&SourceDocument> = if mentioned.is_empty() {
        sources.iter().collect()
    } else {
        mentioned.iter().map(|(_, idx)| &sources[*idx]).collect()
    };

    let mut seen = HashSet::new();
    chosen
        .into_iter()
        .filter(|source| seen.insert(normalize_location(&source.origin)))
        .map(SourceDocument::citation)
        .collect()
}
