//! Document rendering: shortcodes and markdown to HTML.
//!
//! Stage 2 of the build pipeline. Runs after every document has been parsed,
//! because cross references need the full set of documents:
//!
//! 1. **Link table**: [`LinkTable::build`] maps every logical name a document
//!    can be referred to by onto its slug and URL.
//! 2. **Render**: each document is rendered in parallel. Shortcodes are
//!    expanded first, then the markdown is converted with
//!    [pulldown-cmark](https://docs.rs/pulldown-cmark).
//!
//! ## Shortcode Expansion
//!
//! Text expansions (`ref`, `relref`) are spliced into the markdown source so
//! they can serve as link destinations. HTML expansions (`video`, `notice`)
//! are replaced by a placeholder that survives markdown conversion and is
//! swapped for the HTML afterwards. A placeholder standing alone in a
//! paragraph replaces the whole `<p>`.
//!
//! ## Headings
//!
//! Every heading gets a stable `id` derived from its text (`## Getting
//! Started` → `getting-started`), with `-1`, `-2` suffixes for repeats.
//! Explicit `{#custom-id}` attributes are kept. `{{< toc >}}` lists the
//! top-level document headings within the configured level range.

use crate::config::ContentConfig;
use crate::naming;
use crate::shortcode::{
    self, Expansion, Handler, Invocation, Segment, ShortcodeError, ShortcodeRegistry,
    ShortcodeSyntaxError,
};
use crate::types::{BuildEvent, CancelToken, Document, DocumentError, Failure};
use maud::html;
use pulldown_cmark::{CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd, html as md_html};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Marks the end of an author-chosen excerpt.
const MORE_MARKER: &str = "<!--more-->";
const TOC_PLACEHOLDER: &str = "⟦toc⟧";

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("{path}:{line}: unknown shortcode `{name}`")]
    UnknownShortcode {
        path: String,
        name: String,
        line: usize,
    },
    #[error("{path}:{line}: shortcode `{name}`: {source}")]
    Shortcode {
        path: String,
        name: String,
        line: usize,
        source: ShortcodeError,
    },
    #[error("{path}: {source}")]
    ShortcodeSyntax {
        path: String,
        source: ShortcodeSyntaxError,
    },
    #[error("{path}:{line}: cross reference to unknown document `{target}`")]
    CrossReference {
        path: String,
        target: String,
        line: usize,
    },
}

// =============================================================================
// Link table
// =============================================================================

/// A document that can be linked to.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub slug: String,
    pub url: String,
    pub title: String,
}

/// Logical name → document lookup used by `ref` and `relref`.
///
/// A document is reachable by its slug, its source path with and without
/// extension, its bundle directory (`posts/x` for `posts/x/index.md`), and
/// the last segment of its slug when no other document shares it. Lookups
/// ignore leading `/` or `./` and trailing `/`, and fall back to lowercase.
#[derive(Debug, Default)]
pub struct LinkTable {
    targets: Vec<Target>,
    names: HashMap<String, usize>,
}

impl LinkTable {
    pub fn build(documents: &[Document]) -> Self {
        let mut table = Self::default();
        let mut short_names: HashMap<&str, Option<usize>> = HashMap::new();

        for doc in documents {
            let idx = table.targets.len();
            table.targets.push(Target {
                slug: doc.slug.clone(),
                url: doc.url(),
                title: doc.title.clone(),
            });

            let mut keys = vec![doc.slug.clone(), doc.source_path.clone()];
            if let Some((stem, _ext)) = doc.source_path.rsplit_once('.') {
                keys.push(stem.to_string());
                if let Some(dir) = stem
                    .strip_suffix("/index")
                    .or_else(|| stem.strip_suffix("/_index"))
                {
                    keys.push(dir.to_string());
                }
            }
            for key in keys {
                table.names.entry(key).or_insert(idx);
            }

            let last = doc.slug.rsplit('/').next().unwrap_or(&doc.slug);
            short_names
                .entry(last)
                .and_modify(|entry| *entry = None)
                .or_insert(Some(idx));
        }

        for (name, idx) in short_names {
            if let Some(idx) = idx {
                table.names.entry(name.to_string()).or_insert(idx);
            }
        }
        table
    }

    pub fn resolve(&self, name: &str) -> Option<&Target> {
        let name = name.trim();
        let name = name.strip_prefix("./").unwrap_or(name);
        let name = name.trim_matches('/');
        self.names
            .get(name)
            .or_else(|| self.names.get(&name.to_lowercase()))
            .map(|&idx| &self.targets[idx])
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

// =============================================================================
// Renderer
// =============================================================================

/// What a shortcode handler can see of the page being rendered.
pub struct RenderContext<'a> {
    pub document: &'a Document,
    pub links: &'a LinkTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Max characters of an excerpt derived from the first paragraph
    pub excerpt_length: usize,
    pub toc_min_level: u8,
    pub toc_max_level: u8,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from_config(&ContentConfig::default())
    }
}

impl RenderOptions {
    pub fn from_config(config: &ContentConfig) -> Self {
        Self {
            excerpt_length: config.excerpt_length,
            toc_min_level: config.toc_min_level,
            toc_max_level: config.toc_max_level,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Heading {
    pub level: u8,
    pub id: String,
    pub text: String,
}

/// A document together with its rendered body.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub document: Document,
    pub html: String,
    /// Plain-text summary for listings and feeds
    pub excerpt: String,
    /// Top-level headings of the body, in order
    pub toc: Vec<Heading>,
    pub word_count: usize,
}

impl RenderedDocument {
    /// Estimated reading time at 200 words per minute, at least one minute.
    pub fn reading_minutes(&self) -> usize {
        self.word_count.div_ceil(200).max(1)
    }
}

/// Per-document scratch state shared by nested expansions.
#[derive(Debug, Default)]
struct RenderState {
    stash: Vec<String>,
    headings: Vec<Heading>,
    ids: HashSet<String>,
}

impl RenderState {
    /// Keep an HTML fragment aside and return the placeholder standing in for it.
    fn stash(&mut self, html: String) -> String {
        self.stash.push(html);
        placeholder(self.stash.len() - 1)
    }

    fn unique_id(&mut self, base: String) -> String {
        let mut candidate = base.clone();
        let mut n = 0;
        while self.ids.contains(&candidate) {
            n += 1;
            candidate = format!("{base}-{n}");
        }
        self.ids.insert(candidate.clone());
        candidate
    }
}

fn placeholder(index: usize) -> String {
    format!("⟦sc{index}⟧")
}

pub struct Renderer<'a> {
    registry: &'a ShortcodeRegistry,
    links: &'a LinkTable,
    options: &'a RenderOptions,
}

impl<'a> Renderer<'a> {
    pub fn new(
        registry: &'a ShortcodeRegistry,
        links: &'a LinkTable,
        options: &'a RenderOptions,
    ) -> Self {
        Self {
            registry,
            links,
            options,
        }
    }

    pub fn render(&self, document: &Document) -> Result<RenderedDocument, RenderError> {
        let ctx = RenderContext {
            document,
            links: self.links,
        };
        let mut state = RenderState::default();

        let source = self.expand(&document.body, document.body_line, &ctx, &mut state)?;
        let mut html = markdown_to_html(&source, &mut state, true);

        for (idx, fragment) in state.stash.iter().enumerate().rev() {
            html = substitute(&html, &placeholder(idx), fragment);
        }
        let toc: Vec<Heading> = state.headings;
        if html.contains(TOC_PLACEHOLDER) {
            let listed: Vec<&Heading> = toc
                .iter()
                .filter(|h| (self.options.toc_min_level..=self.options.toc_max_level).contains(&h.level))
                .collect();
            html = substitute(&html, TOC_PLACEHOLDER, &toc_markup(&listed));
        }

        let excerpt = match &document.metadata.summary {
            Some(summary) => summary.trim().to_string(),
            None => derive_excerpt(&source, self.options.excerpt_length),
        };
        let word_count = strip_placeholders(&plain_text(&source))
            .split_whitespace()
            .count();

        Ok(RenderedDocument {
            document: document.clone(),
            html,
            excerpt,
            toc,
            word_count,
        })
    }

    /// Expand shortcodes in `body`, returning markdown with placeholders.
    fn expand(
        &self,
        body: &str,
        first_line: usize,
        ctx: &RenderContext<'_>,
        state: &mut RenderState,
    ) -> Result<String, RenderError> {
        let path = &ctx.document.source_path;
        let syntax = |source| RenderError::ShortcodeSyntax {
            path: path.clone(),
            source,
        };

        let segments = shortcode::scan_at(body, first_line).map_err(syntax)?;
        let mut out = String::with_capacity(body.len());

        for segment in segments {
            let inv = match segment {
                Segment::Literal(text) => {
                    out.push_str(text);
                    continue;
                }
                Segment::Shortcode(inv) => inv,
            };
            let handler =
                self.registry
                    .get(&inv.name)
                    .ok_or_else(|| RenderError::UnknownShortcode {
                        path: path.clone(),
                        name: inv.name.clone(),
                        line: inv.line,
                    })?;

            match handler {
                Handler::Inline(inline) => {
                    if inv.inner.is_some() {
                        return Err(syntax(ShortcodeSyntaxError::UnexpectedContent {
                            name: inv.name,
                            line: inv.line,
                        }));
                    }
                    match inline(&inv, ctx).map_err(|e| shortcode_error(path, &inv, e))? {
                        Expansion::Text(text) => out.push_str(&text),
                        Expansion::Html(fragment) => out.push_str(&state.stash(fragment)),
                    }
                }
                Handler::Block(wrap) => {
                    let Some(inner) = inv.inner.as_deref() else {
                        return Err(syntax(ShortcodeSyntaxError::Unclosed {
                            name: inv.name,
                            line: inv.line,
                        }));
                    };
                    let inner_source = self.expand(inner, inv.inner_line, ctx, state)?;
                    let inner_html = markdown_to_html(&inner_source, state, false);
                    let fragment =
                        wrap(&inv, &inner_html, ctx).map_err(|e| shortcode_error(path, &inv, e))?;
                    out.push_str("\n\n");
                    out.push_str(&state.stash(fragment));
                    out.push_str("\n\n");
                }
                Handler::Toc => {
                    if inv.inner.is_some() {
                        return Err(syntax(ShortcodeSyntaxError::UnexpectedContent {
                            name: inv.name,
                            line: inv.line,
                        }));
                    }
                    out.push_str(TOC_PLACEHOLDER);
                }
            }
        }
        Ok(out)
    }
}

fn shortcode_error(path: &str, inv: &Invocation, error: ShortcodeError) -> RenderError {
    match error {
        ShortcodeError::UnresolvedReference(target) => RenderError::CrossReference {
            path: path.to_string(),
            target,
            line: inv.line,
        },
        source => RenderError::Shortcode {
            path: path.to_string(),
            name: inv.name.clone(),
            line: inv.line,
            source,
        },
    }
}

// =============================================================================
// Markdown
// =============================================================================

pub(crate) fn markdown_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Convert markdown to HTML, assigning unique heading ids.
///
/// Headings are recorded for the table of contents only when `collect` is set.
fn markdown_to_html(source: &str, state: &mut RenderState, collect: bool) -> String {
    let mut events: Vec<Event<'_>> = Vec::new();
    let mut pending: Option<(usize, HeadingLevel, Option<CowStr<'_>>)> = None;
    let mut text = String::new();

    for event in Parser::new_ext(source, markdown_options()) {
        match event {
            Event::Start(Tag::Heading {
                level,
                id,
                classes,
                attrs,
            }) => {
                pending = Some((events.len(), level, id.clone()));
                text.clear();
                events.push(Event::Start(Tag::Heading {
                    level,
                    id,
                    classes,
                    attrs,
                }));
            }
            Event::End(TagEnd::Heading(level)) => {
                if let Some((start, _, explicit)) = pending.take() {
                    let title = strip_placeholders(&text).trim().to_string();
                    let base = match explicit {
                        Some(id) => id.to_string(),
                        None => {
                            let id = naming::anchor_id(&title);
                            if id.is_empty() { "section".to_string() } else { id }
                        }
                    };
                    let id = state.unique_id(base);
                    if let Event::Start(Tag::Heading { id: slot, .. }) = &mut events[start] {
                        *slot = Some(CowStr::from(id.clone()));
                    }
                    if collect {
                        state.headings.push(Heading {
                            level: heading_level(level),
                            id,
                            text: title,
                        });
                    }
                }
                events.push(Event::End(TagEnd::Heading(level)));
            }
            event => {
                if pending.is_some()
                    && let Event::Text(t) | Event::Code(t) = &event
                {
                    text.push_str(t);
                }
                events.push(event);
            }
        }
    }

    let mut html = String::with_capacity(source.len() * 3 / 2);
    md_html::push_html(&mut html, events.into_iter());
    html
}

/// Replace `placeholder` with `replacement`, swallowing a paragraph that
/// holds nothing but the placeholder.
fn substitute(html: &str, placeholder: &str, replacement: &str) -> String {
    html.replace(&format!("<p>{placeholder}</p>"), replacement)
        .replace(placeholder, replacement)
}

fn strip_placeholders(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('⟦') {
        out.push_str(&rest[..start]);
        match rest[start..].find('⟧') {
            Some(end) => rest = &rest[start + end + '⟧'.len_utf8()..],
            None => {
                rest = &rest[start..];
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn toc_markup(headings: &[&Heading]) -> String {
    let Some(base) = headings.iter().map(|h| h.level).min() else {
        return String::new();
    };

    let mut out = String::from(r#"<nav class="toc" aria-label="Table of contents">"#);
    let mut depth = 0usize;
    for heading in headings {
        let target = usize::from(heading.level - base + 1).min(depth + 1);
        if depth == 0 {
            out.push_str("<ul>");
            depth = 1;
        } else if target > depth {
            out.push_str("<ul>");
            depth += 1;
        } else {
            out.push_str("</li>");
            while depth > target {
                out.push_str("</ul></li>");
                depth -= 1;
            }
        }
        out.push_str("<li>");
        out.push_str(&html! { a href={ "#" (heading.id) } { (heading.text) } }.into_string());
    }
    out.push_str("</li>");
    while depth > 1 {
        out.push_str("</ul></li>");
        depth -= 1;
    }
    out.push_str("</ul></nav>");
    out
}

// =============================================================================
// Plain text and excerpts
// =============================================================================

/// Plain text of a markdown fragment, blocks separated by blank lines.
fn plain_text(source: &str) -> String {
    let mut out = String::new();
    for event in Parser::new_ext(source, markdown_options()) {
        match event {
            Event::Text(t) | Event::Code(t) => out.push_str(&t),
            Event::SoftBreak | Event::HardBreak => out.push(' '),
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::CodeBlock) => {
                out.push_str("\n\n")
            }
            _ => {}
        }
    }
    out
}

/// Excerpt from the body: everything before `<!--more-->`, or else the first
/// paragraph with visible text, truncated to `max_chars`.
fn derive_excerpt(source: &str, max_chars: usize) -> String {
    if let Some((head, _)) = source.split_once(MORE_MARKER) {
        return collapse_whitespace(&strip_placeholders(&plain_text(head)));
    }

    let mut in_paragraph = false;
    let mut paragraph = String::new();
    for event in Parser::new_ext(source, markdown_options()) {
        match event {
            Event::Start(Tag::Paragraph) => {
                in_paragraph = true;
                paragraph.clear();
            }
            Event::End(TagEnd::Paragraph) => {
                in_paragraph = false;
                let text = collapse_whitespace(&strip_placeholders(&paragraph));
                if !text.is_empty() {
                    return truncate_words(&text, max_chars);
                }
            }
            Event::Text(t) | Event::Code(t) if in_paragraph => paragraph.push_str(&t),
            Event::SoftBreak | Event::HardBreak if in_paragraph => paragraph.push(' '),
            _ => {}
        }
    }
    String::new()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `text` at the last word boundary within `max_chars`, adding `…`.
fn truncate_words(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    let cut = match cut.rfind(' ') {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}…", cut.trim_end_matches([',', ';', ':', '.', ' ']))
}

// =============================================================================
// Stage entry point
// =============================================================================

/// Render every document in parallel.
///
/// Builds the link table from `documents` first, so any parsed document
/// (drafts included) can be referenced. Per-document failures are returned
/// alongside the successes; documents not yet started when `cancel` fires
/// are reported as cancelled.
pub fn render_all(
    documents: Vec<Document>,
    registry: &ShortcodeRegistry,
    options: &RenderOptions,
    cancel: &CancelToken,
    events: Option<&Sender<BuildEvent>>,
) -> (Vec<RenderedDocument>, Vec<Failure>) {
    let links = LinkTable::build(&documents);
    info!(documents = documents.len(), "rendering documents");
    let renderer = Renderer::new(registry, &links, options);

    let results: Vec<Result<RenderedDocument, Failure>> = documents
        .into_par_iter()
        .map(|doc| {
            if cancel.is_cancelled() {
                return Err(Failure {
                    source_path: doc.source_path,
                    slug: Some(doc.slug),
                    error: DocumentError::Cancelled,
                });
            }
            match renderer.render(&doc) {
                Ok(rendered) => {
                    debug!(slug = %doc.slug, words = rendered.word_count, "rendered");
                    if let Some(tx) = events {
                        tx.send(BuildEvent::Rendered {
                            slug: doc.slug.clone(),
                            draft: doc.is_draft(),
                        })
                        .ok();
                    }
                    Ok(rendered)
                }
                Err(e) => {
                    warn!(path = %doc.source_path, error = %e, "render failed");
                    if let Some(tx) = events {
                        tx.send(BuildEvent::Failed {
                            source_path: doc.source_path.clone(),
                            error: e.to_string(),
                        })
                        .ok();
                    }
                    Err(Failure {
                        source_path: doc.source_path,
                        slug: Some(doc.slug),
                        error: e.into(),
                    })
                }
            }
        })
        .collect();

    let mut rendered = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(doc) => rendered.push(doc),
            Err(failure) => failures.push(failure),
        }
    }
    (rendered, failures)
}
