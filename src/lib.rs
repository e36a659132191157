//! # Simple Press
//!
//! A minimal static site generator for markdown blogs. Your filesystem is the
//! data source: every markdown file under the content root becomes a document,
//! its path becomes its URL, and front matter supplies title, date, tags and
//! series membership.
//!
//! # Architecture: Staged Pipeline
//!
//! Simple Press processes content through independent stages. Each stage is a
//! function from the previous stage's value to the next, so every stage can be
//! tested without the ones around it:
//!
//! ```text
//! 1. Scan      content/   →  Manifest          (files → parsed documents)
//! 2. Render    Manifest   →  RenderedDocument  (shortcodes + markdown → HTML)
//! 3. Assemble  rendered   →  Site              (index, tags, series)
//! 4. Generate  Site       →  dist/             (HTML pages + RSS feeds)
//! ```
//!
//! Failures are per document. A document with broken front matter, an
//! unknown shortcode or a dangling cross reference is reported and left out;
//! everything else still builds. Only configuration errors, an unreadable
//! content root and output I/O errors stop a build.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Stage 1, walks the content directory and parses every document |
//! | [`render`] | Stage 2, expands shortcodes, resolves cross references, renders markdown |
//! | [`assemble`] | Stage 3, builds the chronological index, tag and series listings |
//! | [`generate`] | Stage 4, renders pages with Maud and feeds with `rss` |
//! | [`cache`] | Atomic output writes and the content-hash output manifest |
//! | [`frontmatter`] | YAML (`---`) and TOML (`+++`) front matter parsing |
//! | [`shortcode`] | Shortcode scanner, registry and built-in handlers |
//! | [`config`] | `config.toml` loading, merging over stock defaults, validation |
//! | [`types`] | Shared types: `Document`, `Failure`, `BuildEvent`, `CancelToken` |
//! | [`naming`] | Slug and title derivation from file names |
//! | [`output`] | CLI output formatting for every stage |
//!
//! # Design Decisions
//!
//! ## Two-Pass Cross References
//!
//! `ref` and `relref` shortcodes may point at any document, including ones
//! rendered later or in parallel. Rendering therefore starts only after every
//! document is parsed: pass one builds a [`render::LinkTable`] of every slug
//! and short name, pass two renders against that immutable table.
//!
//! ## Typed Shortcode Registry
//!
//! Shortcodes dispatch through a [`shortcode::ShortcodeRegistry`] built and
//! validated at startup. Aliases from `config.toml` must point at a known
//! handler, so a typo in configuration fails the build before any document is
//! touched rather than once per document.
//!
//! ## Maud Over Template Engines
//!
//! HTML is generated with [Maud](https://maud.lambda.xyz/), a compile-time HTML
//! macro system, rather than Handlebars or Tera:
//!
//! - **Compile-time checking**: malformed HTML is a build error, not a runtime surprise.
//! - **XSS-safe by default**: all interpolation is auto-escaped.
//! - **Zero runtime files**: no template directory to ship or get out of sync.
//!
//! ## Content-Hash Output Cache
//!
//! Every generated file is hashed and recorded in a manifest inside the output
//! directory. Files whose hash did not change are not rewritten, and files the
//! previous build produced but this one did not are deleted. Writes go through
//! a temporary file and an atomic rename, so an interrupted build never leaves
//! a half-written page behind.

pub mod assemble;
pub mod cache;
pub mod config;
pub mod frontmatter;
pub mod generate;
pub mod naming;
pub mod output;
pub mod render;
pub mod scan;
pub mod shortcode;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
