//! Research report presentation
//!
//! When a research job cannot synthesize an answer the backend returns a
//! generic skeleton report. The client recognizes that skeleton and builds a
//! more useful report from the structured job data instead.

use crate::types::ResearchSummary;

/// Section markers that together identify the backend's fallback skeleton
const FALLBACK_MARKERS: [&str; 3] = ["# Research Report", "## Key Findings", "### Context"];

/// Snippets containing any of these are scraped page chrome, not findings
const BOILERPLATE_MARKERS: [&str; 3] = ["[About]", "[Press]", "[iframe]"];

/// Snippets must be longer than this to be shown, measured in UTF-16 code
/// units so the cut matches what browser front ends apply
const MIN_SNIPPET_LEN: usize = 50;

/// At most this many snippets appear under Key Findings
const MAX_SNIPPETS: usize = 8;

/// True if `report` is the backend's fallback skeleton
pub fn is_fallback_report(report: &str) -> bool {
    FALLBACK_MARKERS.iter().all(|marker| report.contains(marker))
}

/// The text to show for a completed research job
pub fn present_report(report: &str, summary: Option<&ResearchSummary>) -> String {
    if is_fallback_report(report) {
        tracing::debug!("Fallback research report detected, formatting from job data");
        format_research_report(summary, report)
    } else {
        report.to_string()
    }
}

fn is_useful_snippet(snippet: &str) -> bool {
    snippet.encode_utf16().count() > MIN_SNIPPET_LEN
        && !BOILERPLATE_MARKERS
            .iter()
            .any(|marker| snippet.contains(marker))
}

/// Build a markdown report from structured research data
///
/// Without data the original report is returned unchanged.
pub fn format_research_report(summary: Option<&ResearchSummary>, original: &str) -> String {
    let Some(summary) = summary else {
        return if original.is_empty() {
            "No research data available.".to_string()
        } else {
            original.to_string()
        };
    };

    let query = summary
        .query
        .as_deref()
        .filter(|q| !q.trim().is_empty())
        .unwrap_or("this topic");

    let mut report = format!("# Research Report: {}\n\n", query);

    if !summary.search_queries.is_empty() {
        report.push_str("## Research Approach\n\n");
        report.push_str(&format!(
            "I conducted research over {} iterations using the following search queries:\n\n",
            summary.iterations
        ));
        for search_query in &summary.search_queries {
            report.push_str(&format!("- {}\n", search_query));
        }
        report.push('\n');
    }

    if !summary.contexts.snippets().is_empty() {
        report.push_str("## Key Findings\n\n");
        for snippet in summary
            .contexts
            .snippets()
            .iter()
            .filter(|s| is_useful_snippet(s))
            .take(MAX_SNIPPETS)
        {
            report.push_str(&format!("- {}\n\n", snippet));
        }
    }

    report.push_str("## Summary\n\n");
    report.push_str(&format!(
        "This research on \"{}\" was conducted using {} search queries over {} iterations. ",
        query,
        summary.search_queries.len(),
        summary.iterations
    ));
    report.push_str(&format!(
        "A total of {} relevant information sources were analyzed to compile this report.",
        summary.contexts.len()
    ));

    report
}
