//! Markdown rendering of a [`ReportDraft`].

use super::ReportDraft;
use crate::types::{CitationReference, Section, SectionStatus};
use std::fmt::Write;

pub(super) fn markdown(draft: &ReportDraft) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Report: {}\n", draft.query().trim());

    if draft.is_incomplete() {
        out.push_str(
            "> **Incomplete report:** the run was cancelled before every planned section finished.\n\n",
        );
    }

    if draft.sections().len() > 1 {
        out.push_str("## Table of Contents\n\n");
        for section in draft.sections() {
            let indent = "  ".repeat(section.depth as usize);
            let _ = writeln!(
                out,
                "{}- [{}](#{})",
                indent,
                section.header,
                anchor(&section.header)
            );
        }
        out.push('\n');
    }

    for section in draft.sections() {
        render_section(&mut out, section);
    }

    if let Some(conclusion) = draft.conclusion() {
        let _ = writeln!(out, "## Conclusion\n\n{}\n", conclusion.trim());
    }

    if !draft.references().is_empty() {
        out.push_str("## References\n\n");
        for (idx, reference) in draft.references().iter().enumerate() {
            let _ = writeln!(out, "{}. {}", idx + 1, link(reference));
        }
    }

    out
}

fn render_section(out: &mut String, section: &Section) {
    let level = (2 + section.depth as usize).min(6);
    let _ = writeln!(out, "{} {}\n", "#".repeat(level), section.header);

    if let SectionStatus::Failed { note } = &section.status {
        let _ = writeln!(out, "> **[Section unavailable]** {}\n", note);
        return;
    }

    if let SectionStatus::LowConfidence { rounds } = section.status {
        let _ = writeln!(
            out,
            "> **[Low confidence]** accepted after {} review round(s) without approval.\n",
            rounds
        );
    }

    let body = section.body.trim();
    if !body.is_empty() {
        let _ = writeln!(out, "{}\n", body);
    }

    if !section.citations.is_empty() {
        let cited: Vec<String> = section.citations.iter().map(link).collect();
        let _ = writeln!(out, "*Sources:* {}\n", cited.join("; "));
    }
}

fn link(reference: &CitationReference) -> String {
    if reference.location.contains("://") {
        format!("[{}]({})", reference.display, reference.location)
    } else if reference.display == reference.location {
        reference.location.clone()
    } else {
        format!("{} ({})", reference.display, reference.location)
    }
}

/// GitHub-style heading anchor
fn anchor(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('-'),
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            _ => None,
        })
        .collect()
}
