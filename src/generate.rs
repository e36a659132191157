//! HTML site and feed generation.
//!
//! Stage 3 of the build pipeline. Turns the assembled [`Site`] into output
//! files and writes them through the [`cache`] module.
//!
//! ## Generated Pages
//!
//! - **Index page** (`/index.html`): Published documents, newest first
//! - **Document pages** (`/{slug}/index.html`): One per rendered document,
//!   drafts included (with a banner), linking to series neighbors
//! - **Tag pages** (`/tags/`, `/tags/{tag}/`): Overview and per-tag listings
//! - **Series pages** (`/series/`, `/series/{series}/`): Overview and
//!   per-series reading order
//! - **Feeds** (`/index.xml`, `/tags/{tag}/index.xml`): RSS 2.0
//!
//! ## Output Structure
//!
//! ```text
//! dist/
//! ├── index.html
//! ├── index.xml
//! ├── posts/
//! │   └── hello-world/
//! │       └── index.html
//! ├── tags/
//! │   ├── index.html
//! │   └── rust/
//! │       ├── index.html
//! │       └── index.xml
//! └── series/
//!     ├── index.html
//!     └── build-a-cad-kernel/
//!         └── index.html
//! ```
//!
//! ## CSS
//!
//! `static/style.css` is embedded at compile time and inlined into every page.
//!
//! ## HTML Generation
//!
//! Uses [maud](https://maud.lambda.xyz/) for compile-time HTML templating.
//! Templates are type-safe Rust code with automatic XSS escaping. Rendered
//! document bodies are inserted with `PreEscaped`.
//!
//! ## Feeds
//!
//! Built with the [rss](https://docs.rs/rss) crate and validated before they
//! are written. Item links are absolute, built from `site.base_url`. The
//! channel's build date is the newest item's date, so an unchanged site
//! produces an unchanged feed.

use crate::assemble::{SeriesListing, Site, Summary, TagListing};
use crate::cache::{self, OutputFile, WriteStats};
use crate::config::SiteConfig;
use crate::render::RenderedDocument;
use chrono::{DateTime, Utc};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use rss::validation::Validate;
use rss::{CategoryBuilder, ChannelBuilder, GuidBuilder, ItemBuilder};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Feed error in {path}: {message}")]
    Feed { path: String, message: String },
}

/// What a generate run produced.
#[derive(Debug)]
pub struct GenerateReport {
    /// Output paths relative to the output directory, in generation order
    pub outputs: Vec<String>,
    pub stats: WriteStats,
}

const CSS: &str = include_str!("../static/style.css");

/// Render the site and write it to `output_dir`.
pub fn generate(
    site: &Site,
    config: &SiteConfig,
    output_dir: &Path,
    use_cache: bool,
) -> Result<GenerateReport, GenerateError> {
    let files = render_outputs(site, config)?;
    let stats = cache::write_outputs(output_dir, &files, use_cache)?;
    info!(
        output = %output_dir.display(),
        files = files.len(),
        written = stats.written,
        unchanged = stats.unchanged,
        removed = stats.removed,
        "site written"
    );
    Ok(GenerateReport {
        outputs: files.into_iter().map(|f| f.path).collect(),
        stats,
    })
}

/// Render every output file of the site in memory.
pub fn render_outputs(site: &Site, config: &SiteConfig) -> Result<Vec<OutputFile>, GenerateError> {
    let mut files = Vec::new();

    files.push(OutputFile::new(
        "index.html",
        render_index(site, config).into_string(),
    ));
    if config.feed.enabled {
        let feed = render_feed(
            config,
            "index.xml",
            &config.site.title,
            "/",
            &config.site.description,
            &site.index,
            site,
        )?;
        files.push(OutputFile::new("index.xml", feed));
    }

    for page in &site.pages {
        files.push(OutputFile::new(
            format!("{}/index.html", page.document.slug),
            render_document_page(site, page, config).into_string(),
        ));
    }

    files.push(OutputFile::new(
        "tags/index.html",
        render_tags_index(site, config).into_string(),
    ));
    for listing in site.tags.values() {
        let dir = format!("tags/{}", listing.slug);
        files.push(OutputFile::new(
            format!("{dir}/index.html"),
            render_tag_page(listing, config).into_string(),
        ));
        if config.feed.enabled && config.feed.per_tag {
            let path = format!("{dir}/index.xml");
            let feed = render_feed(
                config,
                &path,
                &format!("{}: {}", config.site.title, listing.name),
                &format!("/{dir}/"),
                &format!("Posts tagged “{}”", listing.name),
                &listing.entries,
                site,
            )?;
            files.push(OutputFile::new(path, feed));
        }
    }

    files.push(OutputFile::new(
        "series/index.html",
        render_series_index(site, config).into_string(),
    ));
    for listing in site.series.values() {
        files.push(OutputFile::new(
            format!("series/{}/index.html", listing.slug),
            render_series_page(listing, config).into_string(),
        ));
    }

    Ok(files)
}

// ============================================================================
// HTML Components
// ============================================================================

/// Renders the base HTML document structure
fn base_document(config: &SiteConfig, title: &str, body_class: Option<&str>, content: Markup) -> Markup {
    let full_title = if title == config.site.title {
        title.to_string()
    } else {
        format!("{} · {}", title, config.site.title)
    };
    html! {
        (DOCTYPE)
        html lang=(config.site.language) {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                meta name="description" content=(config.site.description);
                @if let Some(author) = &config.site.author {
                    meta name="author" content=(author);
                }
                title { (full_title) }
                @if config.feed.enabled {
                    link rel="alternate" type="application/rss+xml" title=(config.site.title) href="/index.xml";
                }
                style { (PreEscaped(CSS)) }
            }
            body class=[body_class] {
                (site_header(config))
                main { (content) }
            }
        }
    }
}

/// Renders the site header with title and section navigation
fn site_header(config: &SiteConfig) -> Markup {
    html! {
        header.site-header {
            a.site-title href="/" { (config.site.title) }
            nav.site-nav {
                a href="/" { "Posts" }
                a href="/tags/" { "Tags" }
                a href="/series/" { "Series" }
            }
        }
    }
}

fn date_markup(date: Option<DateTime<Utc>>) -> Markup {
    html! {
        @if let Some(date) = date {
            time datetime=(date.to_rfc3339()) { (date.format("%B %-d, %Y")) }
        }
    }
}

/// Renders a list of document summaries
fn summary_list(entries: &[Summary]) -> Markup {
    html! {
        @if entries.is_empty() {
            p.empty { "Nothing published yet." }
        } @else {
            ul.post-list {
                @for entry in entries {
                    li {
                        a.post-title href=(entry.url) { (entry.title) }
                        (date_markup(entry.date))
                        @if !entry.excerpt.is_empty() {
                            p.excerpt { (entry.excerpt) }
                        }
                    }
                }
            }
        }
    }
}

// ============================================================================
// Pages
// ============================================================================

fn render_index(site: &Site, config: &SiteConfig) -> Markup {
    let content = html! {
        section.index {
            h1 { (config.site.title) }
            @if !config.site.description.is_empty() {
                p.lead { (config.site.description) }
            }
            (summary_list(&site.index))
        }
    };
    base_document(config, &config.site.title, Some("index"), content)
}

fn render_document_page(site: &Site, page: &RenderedDocument, config: &SiteConfig) -> Markup {
    let doc = &page.document;
    let series = site.series_of(page);
    let tags: Vec<&TagListing> = doc
        .metadata
        .tags
        .iter()
        .filter_map(|t| site.tags.get(&crate::naming::listing_key(t)))
        .collect();

    let content = html! {
        article.document {
            header {
                h1 { (doc.title) }
                p.meta {
                    (date_markup(doc.date))
                    span.reading-time { (page.reading_minutes()) " min read" }
                }
                @if doc.is_draft() {
                    p.draft-banner { "Draft: this page is not listed anywhere on the site." }
                }
                @if !tags.is_empty() {
                    ul.tags {
                        @for tag in &tags {
                            li { a href={ "/tags/" (tag.slug) "/" } { (tag.name) } }
                        }
                    }
                }
            }
            div.content {
                (PreEscaped(&page.html))
            }
            @if let Some(series) = series {
                (series_nav(series, &doc.slug))
            }
        }
    };
    base_document(config, &doc.title, Some("document"), content)
}

/// Renders the previous/next links of a series
fn series_nav(series: &SeriesListing, slug: &str) -> Markup {
    let (prev, next) = series.neighbors(slug);
    let position = series
        .entries
        .iter()
        .position(|e| e.slug == slug)
        .map(|i| i + 1)
        .unwrap_or(0);
    html! {
        nav.series-nav aria-label="Series" {
            p {
                "Part " (position) " of " (series.entries.len()) " in "
                a href={ "/series/" (series.slug) "/" } { (series.name) }
            }
            @if let Some(prev) = prev {
                a.prev href=(prev.url) rel="prev" { "← " (prev.title) }
            }
            @if let Some(next) = next {
                a.next href=(next.url) rel="next" { (next.title) " →" }
            }
        }
    }
}

fn render_tags_index(site: &Site, config: &SiteConfig) -> Markup {
    let content = html! {
        section.tags-index {
            h1 { "Tags" }
            @if site.tags.is_empty() {
                p.empty { "No tags yet." }
            } @else {
                ul.tag-cloud {
                    @for listing in site.tags.values() {
                        li {
                            a href={ "/tags/" (listing.slug) "/" } { (listing.name) }
                            " "
                            span.count { "(" (listing.entries.len()) ")" }
                        }
                    }
                }
            }
        }
    };
    base_document(config, "Tags", Some("tags"), content)
}

fn render_tag_page(listing: &TagListing, config: &SiteConfig) -> Markup {
    let title = format!("Tagged “{}”", listing.name);
    let content = html! {
        section.tag {
            h1 { (title) }
            @if config.feed.enabled && config.feed.per_tag {
                p.feed { a href={ "/tags/" (listing.slug) "/index.xml" } { "RSS feed" } }
            }
            (summary_list(&listing.entries))
        }
    };
    base_document(config, &title, Some("tag"), content)
}

fn render_series_index(site: &Site, config: &SiteConfig) -> Markup {
    let content = html! {
        section.series-index {
            h1 { "Series" }
            @if site.series.is_empty() {
                p.empty { "No series yet." }
            } @else {
                ul.series-list {
                    @for listing in site.series.values() {
                        li {
                            a href={ "/series/" (listing.slug) "/" } { (listing.name) }
                            " "
                            span.count { "(" (listing.entries.len()) " parts)" }
                        }
                    }
                }
            }
        }
    };
    base_document(config, "Series", Some("series"), content)
}

fn render_series_page(listing: &SeriesListing, config: &SiteConfig) -> Markup {
    let content = html! {
        section.series {
            h1 { (listing.name) }
            ol.series-entries {
                @for entry in &listing.entries {
                    li {
                        a href=(entry.url) { (entry.title) }
                        (date_markup(entry.date))
                    }
                }
            }
        }
    };
    base_document(config, &listing.name, Some("series"), content)
}

// ============================================================================
// Feeds
// ============================================================================

/// Render an RSS channel for `entries`, newest first, up to `feed.limit`.
fn render_feed(
    config: &SiteConfig,
    path: &str,
    title: &str,
    link: &str,
    description: &str,
    entries: &[Summary],
    site: &Site,
) -> Result<String, GenerateError> {
    let entries = &entries[..entries.len().min(config.feed.limit)];

    let items: Vec<rss::Item> = entries
        .iter()
        .map(|entry| {
            let url = config.absolute_url(&entry.url);
            let categories: Vec<rss::Category> = site
                .page(&entry.slug)
                .map(|p| {
                    p.document
                        .metadata
                        .tags
                        .iter()
                        .map(|t| CategoryBuilder::default().name(t.clone()).build())
                        .collect()
                })
                .unwrap_or_default();
            ItemBuilder::default()
                .title(Some(entry.title.clone()))
                .link(Some(url.clone()))
                .guid(GuidBuilder::default().permalink(true).value(url).build())
                .description((!entry.excerpt.is_empty()).then(|| entry.excerpt.clone()))
                .pub_date(entry.date.map(|d| d.to_rfc2822()))
                .categories(categories)
                .build()
        })
        .collect();

    let last_build = entries.iter().filter_map(|e| e.date).max();
    let channel = ChannelBuilder::default()
        .title(title)
        .link(config.absolute_url(link))
        .description(description)
        .language(Some(config.site.language.clone()))
        .generator(Some(format!("simple-press {}", env!("CARGO_PKG_VERSION"))))
        .last_build_date(last_build.map(|d| d.to_rfc2822()))
        .items(items)
        .build();

    channel.validate().map_err(|e| GenerateError::Feed {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    Ok(channel.to_string())
}
