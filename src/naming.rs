//! Slug derivation for documents, tags and series.
//!
//! Every document's identity is its slug, derived from its path relative to
//! the content root. Each path component is sanitized independently so the
//! directory structure survives into the output URLs:
//!
//! - `posts/Rust and Wasm.md` → `posts/rust-and-wasm`
//! - `posts/cad-kernel/index.md` → `posts/cad-kernel` (page bundle)
//! - `2023-05-01-retrospective.md` → `retrospective`, dated 2023-05-01
//!
//! ## Date Prefixes
//!
//! A `YYYY-MM-DD-` prefix on a file stem is stripped from the slug and kept as
//! a fallback publish date, used when the front matter carries no `date`.

use chrono::NaiveDate;
use std::path::{Component, Path};

const MAX_SLUG_LEN: usize = 80;

/// Stems that stand in for their parent directory.
const BUNDLE_STEMS: &[&str] = &["index", "_index"];

/// Result of parsing a file stem like `2023-05-01-my-first-post`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    /// Date prefix if present (e.g. `2023-05-01`)
    pub date: Option<NaiveDate>,
    /// Name part after the date prefix. For undated entries, the full input.
    pub name: String,
}

/// Split an optional `YYYY-MM-DD-` prefix off a file stem.
///
/// - `"2023-05-01-my-post"` → date=Some(2023-05-01), name="my-post"
/// - `"my-post"` → date=None, name="my-post"
/// - `"2023-13-01-bad"` → date=None, name="2023-13-01-bad" (not a real date)
/// - `"2023-05-01"` → date=Some(2023-05-01), name=""
pub fn parse_entry_name(stem: &str) -> ParsedName {
    if stem.len() >= 10 && stem.is_char_boundary(10) {
        let (prefix, rest) = stem.split_at(10);
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
            && (rest.is_empty() || rest.starts_with('-'))
        {
            return ParsedName {
                date: Some(date),
                name: rest.trim_start_matches('-').to_string(),
            };
        }
    }
    ParsedName {
        date: None,
        name: stem.to_string(),
    }
}

/// Derive a document slug from its path relative to the content root.
///
/// Returns `"index"` for a top-level `index.md`, which would otherwise map to
/// the empty slug and collide with the site index.
pub fn slug_for_path(rel: &Path) -> String {
    let mut parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if let Some(file) = parts.pop() {
        let stem = Path::new(&file)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(file);
        if !BUNDLE_STEMS.contains(&stem.as_str()) || parts.is_empty() {
            let parsed = parse_entry_name(&stem);
            let name = if parsed.name.is_empty() {
                stem
            } else {
                parsed.name
            };
            parts.push(name);
        }
    }

    let slug = parts
        .iter()
        .map(|p| sanitize_slug(p))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    if slug.is_empty() {
        "index".to_string()
    } else {
        slug
    }
}

/// Fallback display title for a slug: last segment with dashes as spaces.
pub fn display_title(slug: &str) -> String {
    slug.rsplit('/').next().unwrap_or(slug).replace('-', " ")
}

/// Sanitize a string for use as a single URL path segment.
///
/// - Lowercases ASCII letters
/// - Replaces anything else that is not alphanumeric or a dash with a dash
/// - Collapses consecutive dashes into one
/// - Strips leading and trailing dashes
/// - Truncates to `MAX_SLUG_LEN` characters (breaks at last dash before limit)
pub fn sanitize_slug(title: &str) -> String {
    let slug: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();

    let collapsed = collapse_dashes(&slug);
    let trimmed = collapsed.trim_matches('-');
    if trimmed.len() <= MAX_SLUG_LEN {
        return trimmed.to_string();
    }

    let cut = &trimmed[..MAX_SLUG_LEN];
    match cut.rfind('-') {
        Some(pos) if pos > 0 => cut[..pos].to_string(),
        _ => cut.to_string(),
    }
}

/// Merge runs of dashes into one.
fn collapse_dashes(s: &str) -> String {
    let mut collapsed = String::with_capacity(s.len());
    let mut prev_dash = false;
    for c in s.chars() {
        if c == '-' {
            if !prev_dash {
                collapsed.push('-');
            }
            prev_dash = true;
        } else {
            collapsed.push(c);
            prev_dash = false;
        }
    }
    collapsed
}

/// Fragment id for a heading.
///
/// Unlike [`sanitize_slug`] this keeps non-ASCII letters and digits, so a
/// heading like `日本語の見出し` keeps a readable anchor. Whitespace becomes
/// a dash and other punctuation is dropped.
pub fn anchor_id(text: &str) -> String {
    let mut id = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            id.extend(c.to_lowercase());
        } else if c == '_' {
            id.push(c);
        } else if c == '-' || c.is_whitespace() {
            id.push('-');
        }
    }
    collapse_dashes(&id).trim_matches('-').to_string()
}

/// Identity of a tag or series name: trimmed, whitespace collapsed,
/// lowercased. `Rust`, `rust` and ` rust ` are one tag; `C` and `C++` are two.
pub fn listing_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// URL path segment for a tag or series name.
///
/// Names with nothing ASCII-sluggable (`日本語`, `++`) get a short stable
/// hash so they still have a page.
pub fn url_segment(name: &str) -> String {
    let slug = sanitize_slug(name);
    if slug.is_empty() {
        let hash = crate::cache::hash_bytes(listing_key(name).as_bytes());
        format!("t-{}", &hash[..8])
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn date_prefix_is_split_off() {
        let p = parse_entry_name("2023-05-01-my-post");
        assert_eq!(p.date, NaiveDate::from_ymd_opt(2023, 5, 1));
        assert_eq!(p.name, "my-post");
    }

    #[test]
    fn undated_name_kept_whole() {
        let p = parse_entry_name("my-post");
        assert_eq!(p.date, None);
        assert_eq!(p.name, "my-post");
    }

    #[test]
    fn invalid_date_prefix_is_not_a_date() {
        let p = parse_entry_name("2023-13-01-bad");
        assert_eq!(p.date, None);
        assert_eq!(p.name, "2023-13-01-bad");
    }

    #[test]
    fn date_only_stem() {
        let p = parse_entry_name("2023-05-01");
        assert!(p.date.is_some());
        assert_eq!(p.name, "");
    }

    #[test]
    fn digits_without_separator_are_not_a_date() {
        let p = parse_entry_name("2023-05-01post");
        assert_eq!(p.date, None);
    }

    #[test]
    fn slug_from_nested_path() {
        assert_eq!(
            slug_for_path(&PathBuf::from("posts/Rust and Wasm.md")),
            "posts/rust-and-wasm"
        );
    }

    #[test]
    fn slug_from_bundle_index() {
        assert_eq!(
            slug_for_path(&PathBuf::from("posts/cad-kernel/index.md")),
            "posts/cad-kernel"
        );
    }

    #[test]
    fn slug_strips_date_prefix() {
        assert_eq!(
            slug_for_path(&PathBuf::from("2023-05-01-retrospective.md")),
            "retrospective"
        );
    }

    #[test]
    fn slug_keeps_date_only_stem() {
        assert_eq!(
            slug_for_path(&PathBuf::from("notes/2023-05-01.md")),
            "notes/2023-05-01"
        );
    }

    #[test]
    fn top_level_index_is_named_index() {
        assert_eq!(slug_for_path(&PathBuf::from("index.md")), "index");
    }

    #[test]
    fn display_title_uses_last_segment() {
        assert_eq!(display_title("posts/my-first-post"), "my first post");
    }

    #[test]
    fn sanitize_replaces_special_chars() {
        assert_eq!(sanitize_slug("Rust/WebAssembly"), "rust-webassembly");
        assert_eq!(sanitize_slug("C++ & Friends"), "c-friends");
    }

    #[test]
    fn sanitize_collapses_and_trims_dashes() {
        assert_eq!(sanitize_slug("--a---b--"), "a-b");
    }

    #[test]
    fn anchor_id_keeps_unicode_letters() {
        assert_eq!(anchor_id("日本語の見出し"), "日本語の見出し");
        assert_eq!(anchor_id("Café Crème"), "café-crème");
        assert_eq!(anchor_id("C++ & Friends"), "c-friends");
        assert_eq!(anchor_id("snake_case id"), "snake_case-id");
        assert_eq!(anchor_id("?!"), "");
    }

    #[test]
    fn listing_key_folds_case_and_spacing() {
        assert_eq!(listing_key("  Rust   Lang "), "rust lang");
        assert_eq!(listing_key("C++"), "c++");
        assert_ne!(listing_key("C++"), listing_key("C"));
    }

    #[test]
    fn url_segment_falls_back_to_hash() {
        assert_eq!(url_segment("Rust Lang"), "rust-lang");
        let segment = url_segment("日本語");
        assert!(segment.starts_with("t-"));
        assert_eq!(segment.len(), 10);
        assert_eq!(segment, url_segment(" 日本語 "));
        assert_ne!(segment, url_segment("中文"));
    }

    #[test]
    fn sanitize_truncates_at_dash() {
        let long = "word-".repeat(30);
        let slug = sanitize_slug(&long);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }
}
