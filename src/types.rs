//! Shared types used across all pipeline stages.
//!
//! A [`Document`] is created by the scan stage and flows unchanged through
//! rendering into the site snapshot. Per-document failures are captured as
//! [`Failure`] values rather than propagated, so one broken post never stops
//! the batch.

use crate::frontmatter::{Metadata, MetadataError};
use crate::render::RenderError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// One article parsed from a content file.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Unique identifier derived from the source path (`posts/my-post`)
    pub slug: String,
    /// Source path relative to the content root, `/`-separated
    pub source_path: String,
    /// Resolved title: front matter, first `# heading`, or slug fallback
    pub title: String,
    /// Resolved publish date: front matter, filename prefix, or none
    pub date: Option<DateTime<Utc>>,
    pub metadata: Metadata,
    /// Markdown body with the front matter removed
    pub body: String,
    /// 1-based line of the source file on which `body` starts
    pub body_line: usize,
}

impl Document {
    /// Root-relative URL of the document's page.
    pub fn url(&self) -> String {
        format!("/{}/", self.slug)
    }

    pub fn is_draft(&self) -> bool {
        self.metadata.draft
    }
}

/// Why a single document was left out of the build.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("slug `{slug}` is already used by {other}")]
    DuplicateSlug { slug: String, other: String },
    #[error("slug `{0}` collides with a generated listing page")]
    ReservedSlug(String),
    #[error("build cancelled before this document was processed")]
    Cancelled,
}

/// A document that failed to parse or render.
#[derive(Debug)]
pub struct Failure {
    pub source_path: String,
    /// Known once the document got past the scan stage.
    pub slug: Option<String>,
    pub error: DocumentError,
}

impl Failure {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, DocumentError::Cancelled)
    }
}

/// Progress notification sent from worker threads to the CLI printer.
#[derive(Debug, Clone)]
pub enum BuildEvent {
    Parsed { source_path: String, slug: String },
    Rendered { slug: String, draft: bool },
    Failed { source_path: String, error: String },
}

/// Shared flag telling workers to stop picking up new documents.
///
/// Documents already in flight run to completion; anything not yet started
/// is reported as [`DocumentError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
