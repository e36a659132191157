//! Shared test utilities for the simple-press test suite.
//!
//! Provides fixture builders for content trees and in-memory documents, plus
//! lookup helpers that panic with a clear message on miss.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = content_root();
//! write_content(tmp.path(), "posts/hello.md", "---\ntitle: Hello\n---\nBody\n");
//! let manifest = scan(tmp.path(), &CancelToken::new(), None).unwrap();
//!
//! let doc = find_document(&manifest.documents, "posts/hello");
//! assert_eq!(doc.title, "Hello");
//! ```

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use crate::frontmatter::Metadata;
use crate::naming;
use crate::render::RenderedDocument;
use crate::types::Document;

// =========================================================================
// Fixture setup
// =========================================================================

/// An empty content directory.
pub fn content_root() -> TempDir {
    TempDir::new().unwrap()
}

/// Write `text` to `rel` under `root`, creating parent directories.
pub fn write_content(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

/// A parsed document at `{slug}.md` with no front matter.
pub fn document(slug: &str, body: &str) -> Document {
    Document {
        slug: slug.to_string(),
        source_path: format!("{slug}.md"),
        title: naming::display_title(slug),
        date: None,
        metadata: Metadata::default(),
        body: body.to_string(),
        body_line: 1,
    }
}

/// A document wrapped as rendered, with an empty body.
pub fn rendered(document: Document) -> RenderedDocument {
    RenderedDocument {
        document,
        html: String::new(),
        excerpt: String::new(),
        toc: Vec::new(),
        word_count: 0,
    }
}

// =========================================================================
// Lookups (panic with a clear message on miss)
// =========================================================================

/// Find a document by slug. Panics if not found.
pub fn find_document<'a>(documents: &'a [Document], slug: &str) -> &'a Document {
    documents
        .iter()
        .find(|d| d.slug == slug)
        .unwrap_or_else(|| {
            let slugs: Vec<&str> = documents.iter().map(|d| d.slug.as_str()).collect();
            panic!("document '{slug}' not found. Available: {slugs:?}")
        })
}
