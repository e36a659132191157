//! CLI output formatting for all pipeline stages.
//!
//! # Information-First Display
//!
//! The primary display for every document is its semantic identity, a
//! positional index plus title. Source paths and slugs are secondary context
//! on indented lines, so the output reads as a content inventory while still
//! pointing back at the files that produced it.
//!
//! # Output Format
//!
//! ## Scan
//!
//! ```text
//! Documents
//! 001 Hello World
//!     Source: posts/2023-05-01-hello-world.md
//!     Slug: posts/hello-world
//! 002 Notes (draft)
//!     Source: notes.md
//!     Slug: notes
//! ```
//!
//! ## Progress events
//!
//! ```text
//! Rendered posts/hello-world
//! Rendered notes (draft)
//! Failed posts/broken.md
//!     posts/broken.md:3: unknown shortcode `gallery`
//! ```
//!
//! ## Generate
//!
//! ```text
//! Home → index.html
//! Documents
//! 001 Hello World → posts/hello-world/index.html
//! Tags
//! 001 rust (3 documents) → tags/rust/index.html
//! Series
//! 001 Build a CAD kernel (4 parts) → series/build-a-cad-kernel/index.html
//! Feeds: 2
//!
//! Output: 5 unchanged, 2 written (7 total), 1 removed
//! ```
//!
//! ## Summary
//!
//! ```text
//! Published 1 documents
//! Skipped 2 documents (1 drafts excluded, 1 errors)
//!     broken.md: front matter in broken.md is never closed
//! ```
//!
//! # Architecture
//!
//! Each stage has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use crate::assemble::{BuildSummary, Site};
use crate::generate::GenerateReport;
use crate::scan::Manifest;
use crate::types::BuildEvent;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Format a document header: positional index + title, marking drafts.
///
/// ```text
/// 001 Hello World
/// 002 Notes (draft)
/// ```
fn document_header(index: usize, title: &str, draft: bool) -> String {
    if draft {
        format!("{} {} (draft)", format_index(index), title)
    } else {
        format!("{} {}", format_index(index), title)
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Stage 1: Scan output
// ============================================================================

/// Format the documents discovered by a scan, followed by parse failures.
pub fn format_scan_output(manifest: &Manifest) -> Vec<String> {
    let mut lines = vec!["Documents".to_string()];
    for (i, doc) in manifest.documents.iter().enumerate() {
        lines.push(document_header(i + 1, &doc.title, doc.is_draft()));
        lines.push(format!("{}Source: {}", indent(1), doc.source_path));
        lines.push(format!("{}Slug: {}", indent(1), doc.slug));
    }
    if !manifest.failures.is_empty() {
        lines.push(String::new());
        lines.push("Unreadable".to_string());
        for failure in &manifest.failures {
            lines.push(failure.source_path.clone());
            lines.push(format!("{}{}", indent(1), failure.error));
        }
    }
    lines
}

pub fn print_scan_output(manifest: &Manifest) {
    print_lines(format_scan_output(manifest));
}

// ============================================================================
// Progress events
// ============================================================================

/// Format a single progress event from the parse and render stages.
///
/// Parse events are only interesting when something goes wrong, so they
/// produce no lines.
pub fn format_event(event: &BuildEvent) -> Vec<String> {
    match event {
        BuildEvent::Parsed { .. } => Vec::new(),
        BuildEvent::Rendered { slug, draft: false } => vec![format!("Rendered {}", slug)],
        BuildEvent::Rendered { slug, draft: true } => vec![format!("Rendered {} (draft)", slug)],
        BuildEvent::Failed { source_path, error } => vec![
            format!("Failed {}", source_path),
            format!("{}{}", indent(1), error),
        ],
    }
}

// ============================================================================
// Stage 3: Generate output
// ============================================================================

/// Format generate stage output: each entity with the file it produced.
pub fn format_generate_output(site: &Site, report: &GenerateReport) -> Vec<String> {
    let mut lines = vec!["Home → index.html".to_string()];

    if !site.pages.is_empty() {
        lines.push("Documents".to_string());
        for (i, page) in site.pages.iter().enumerate() {
            let doc = &page.document;
            lines.push(format!(
                "{} → {}/index.html",
                document_header(i + 1, &doc.title, doc.is_draft()),
                doc.slug
            ));
        }
    }

    if !site.tags.is_empty() {
        lines.push("Tags".to_string());
        for (i, tag) in site.tags.values().enumerate() {
            lines.push(format!(
                "{} {} ({} documents) → tags/{}/index.html",
                format_index(i + 1),
                tag.name,
                tag.entries.len(),
                tag.slug
            ));
        }
    }

    if !site.series.is_empty() {
        lines.push("Series".to_string());
        for (i, series) in site.series.values().enumerate() {
            lines.push(format!(
                "{} {} ({} parts) → series/{}/index.html",
                format_index(i + 1),
                series.name,
                series.entries.len(),
                series.slug
            ));
        }
    }

    let feeds = report.outputs.iter().filter(|p| p.ends_with(".xml")).count();
    if feeds > 0 {
        lines.push(format!("Feeds: {}", feeds));
    }

    lines.push(String::new());
    lines.push(format!("Output: {}", report.stats));
    lines
}

pub fn print_generate_output(site: &Site, report: &GenerateReport) {
    print_lines(format_generate_output(site, report));
}

// ============================================================================
// Build summary
// ============================================================================

/// Format the end-of-build counts followed by every per-document error.
pub fn format_summary(summary: &BuildSummary<'_>) -> Vec<String> {
    let mut lines = vec![
        format!("Published {} documents", summary.published),
        format!(
            "Skipped {} documents ({} drafts excluded, {} errors)",
            summary.skipped(),
            summary.drafts,
            summary.failures.len()
        ),
    ];
    for failure in summary.failures {
        lines.push(format!(
            "{}{}: {}",
            indent(1),
            failure.source_path,
            failure.error
        ));
    }
    lines
}

pub fn print_summary(summary: &BuildSummary<'_>) {
    print_lines(format_summary(summary));
}
