//! Content discovery and parsing.
//!
//! Stage 1 of the build pipeline. Walks the content root, reads every
//! markdown file and splits it into front matter and body, producing the
//! [`Manifest`] of documents that rendering consumes.
//!
//! ## Directory Structure
//!
//! ```text
//! content/                             # Content root
//! ├── config.toml                      # Site configuration (optional)
//! ├── about.md                         # → /about/
//! ├── posts/
//! │   ├── 2023-05-01-retrospective.md  # → /posts/retrospective/, dated 2023-05-01
//! │   ├── rust-and-wasm.md             # → /posts/rust-and-wasm/
//! │   └── cad-kernel/                  # Page bundle
//! │       └── index.md                 # → /posts/cad-kernel/
//! ├── _templates/                      # `_` prefix: skipped
//! └── .obsidian/                       # hidden: skipped
//! ```
//!
//! ## Fallbacks
//!
//! - **Title**: front matter `title`, then the first level-one heading, then the
//!   slug's last segment with dashes as spaces.
//! - **Date**: front matter `date`, then a `YYYY-MM-DD-` filename prefix.
//!
//! ## Failures
//!
//! Unreadable files, malformed front matter and slug collisions are recorded
//! as per-document [`Failure`]s; scanning continues with the other files.
//! Only a missing content root or a failed directory walk aborts the scan.

use crate::frontmatter;
use crate::naming;
use crate::render::markdown_options;
use crate::types::{BuildEvent, CancelToken, Document, DocumentError, Failure};
use chrono::{DateTime, Utc};
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use rayon::prelude::*;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Content directory not found: {0}")]
    MissingRoot(PathBuf),
}

/// Output of the scan stage.
#[derive(Debug, Default)]
pub struct Manifest {
    /// Successfully parsed documents, in source path order
    pub documents: Vec<Document>,
    pub failures: Vec<Failure>,
}

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

/// Top-level slugs owned by generated listing pages.
const RESERVED_SLUGS: &[&str] = &["tags", "series"];

pub fn scan(
    root: &Path,
    cancel: &CancelToken,
    events: Option<&Sender<BuildEvent>>,
) -> Result<Manifest, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::MissingRoot(root.to_path_buf()));
    }

    let files = collect_sources(root)?;
    info!(root = %root.display(), files = files.len(), "scanning content");

    let results: Vec<Result<Document, Failure>> = files
        .par_iter()
        .map(|rel| {
            let source_path = source_path_string(rel);
            if cancel.is_cancelled() {
                return Err(Failure {
                    source_path,
                    slug: None,
                    error: DocumentError::Cancelled,
                });
            }
            match read_document(root, rel) {
                Ok(doc) => {
                    debug!(path = %doc.source_path, slug = %doc.slug, "parsed");
                    if let Some(tx) = events {
                        tx.send(BuildEvent::Parsed {
                            source_path: doc.source_path.clone(),
                            slug: doc.slug.clone(),
                        })
                        .ok();
                    }
                    Ok(doc)
                }
                Err(error) => {
                    warn!(path = %source_path, error = %error, "parse failed");
                    if let Some(tx) = events {
                        tx.send(BuildEvent::Failed {
                            source_path: source_path.clone(),
                            error: error.to_string(),
                        })
                        .ok();
                    }
                    Err(Failure {
                        source_path,
                        slug: None,
                        error,
                    })
                }
            }
        })
        .collect();

    let mut manifest = Manifest::default();
    let mut owners: HashMap<String, String> = HashMap::new();
    for result in results {
        let doc = match result {
            Ok(doc) => doc,
            Err(failure) => {
                manifest.failures.push(failure);
                continue;
            }
        };
        let error = if is_reserved(&doc.slug) {
            Some(DocumentError::ReservedSlug(doc.slug.clone()))
        } else {
            owners
                .get(&doc.slug)
                .map(|other| DocumentError::DuplicateSlug {
                    slug: doc.slug.clone(),
                    other: other.clone(),
                })
        };
        match error {
            Some(error) => {
                warn!(path = %doc.source_path, error = %error, "document skipped");
                manifest.failures.push(Failure {
                    source_path: doc.source_path,
                    slug: Some(doc.slug),
                    error,
                });
            }
            None => {
                owners.insert(doc.slug.clone(), doc.source_path.clone());
                manifest.documents.push(doc);
            }
        }
    }

    info!(
        documents = manifest.documents.len(),
        failures = manifest.failures.len(),
        "scan complete"
    );
    Ok(manifest)
}

/// Markdown files under `root`, relative to it, in sorted order.
fn collect_sources(root: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped(e.file_name()));

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && is_markdown(entry.path()) {
            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();
            files.push(rel);
        }
    }
    Ok(files)
}

/// Hidden entries and `_`-prefixed entries other than `_index` bundles.
fn is_skipped(name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    name.starts_with('_')
        && Path::new(&*name)
            .file_stem()
            .is_none_or(|stem| stem != "_index")
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .map(|e| {
            MARKDOWN_EXTENSIONS
                .iter()
                .any(|ext| e.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

fn is_reserved(slug: &str) -> bool {
    let top = slug.split('/').next().unwrap_or(slug);
    RESERVED_SLUGS.contains(&top)
}

/// Relative path with `/` separators regardless of platform.
fn source_path_string(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn read_document(root: &Path, rel: &Path) -> Result<Document, DocumentError> {
    let text = fs::read_to_string(root.join(rel))?;
    let (metadata, body, body_line) = frontmatter::parse(rel, &text)?;

    let slug = naming::slug_for_path(rel);
    let title = metadata
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| first_heading(body))
        .unwrap_or_else(|| naming::display_title(&slug));
    let date = metadata.date.or_else(|| filename_date(rel));

    Ok(Document {
        slug,
        source_path: source_path_string(rel),
        title,
        date,
        metadata,
        body: body.to_string(),
        body_line,
    })
}

/// Text of the first level-one heading, ATX or setext, outside code blocks.
fn first_heading(body: &str) -> Option<String> {
    let mut text: Option<String> = None;
    for event in Parser::new_ext(body, markdown_options()) {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) => text = Some(String::new()),
            Event::End(TagEnd::Heading(HeadingLevel::H1)) => {
                let heading = text.take().unwrap_or_default();
                let heading = heading.trim();
                if !heading.is_empty() {
                    return Some(heading.to_string());
                }
            }
            Event::Text(t) | Event::Code(t) => {
                if let Some(buf) = text.as_mut() {
                    buf.push_str(&t);
                }
            }
            _ => {}
        }
    }
    None
}

/// Date from a `YYYY-MM-DD-` prefix on the file stem, or on the directory
/// name for page bundles.
fn filename_date(rel: &Path) -> Option<DateTime<Utc>> {
    let stem = rel.file_stem()?.to_string_lossy();
    let name = if stem == "index" || stem == "_index" {
        rel.parent()?.file_name()?.to_string_lossy()
    } else {
        stem
    };
    let date = naming::parse_entry_name(&name).date?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}
