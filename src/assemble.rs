//! Site assembly.
//!
//! Takes every rendered document and every failure and builds the immutable
//! [`Site`] snapshot the generator reads from. Nothing here touches the
//! filesystem and nothing fails: broken documents are carried along as
//! failures for the summary.
//!
//! ## Ordering
//!
//! | Collection | Order |
//! |------------|-------|
//! | Chronological index | date descending, undated last, ties by slug ascending |
//! | Tag listing | same as the index |
//! | Series listing | `series_weight` ascending (missing last), then date ascending, then slug |
//!
//! ## Drafts
//!
//! Documents with `draft = true` keep their page in [`Site::pages`] but are
//! left out of every listing.

use crate::naming;
use crate::render::RenderedDocument;
use crate::types::Failure;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// A document as shown in a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub slug: String,
    pub title: String,
    pub date: Option<DateTime<Utc>>,
    pub excerpt: String,
    pub url: String,
}

impl Summary {
    fn of(page: &RenderedDocument) -> Self {
        Self {
            slug: page.document.slug.clone(),
            title: page.document.title.clone(),
            date: page.document.date,
            excerpt: page.excerpt.clone(),
            url: page.document.url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagListing {
    /// Tag as first written in front matter
    pub name: String,
    pub slug: String,
    pub entries: Vec<Summary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesListing {
    pub name: String,
    pub slug: String,
    pub entries: Vec<Summary>,
}

impl SeriesListing {
    /// Entries before and after `slug` in reading order.
    pub fn neighbors(&self, slug: &str) -> (Option<&Summary>, Option<&Summary>) {
        let Some(pos) = self.entries.iter().position(|e| e.slug == slug) else {
            return (None, None);
        };
        let prev = pos.checked_sub(1).and_then(|i| self.entries.get(i));
        (prev, self.entries.get(pos + 1))
    }
}

/// Immutable result of a build, read by the generator.
#[derive(Debug)]
pub struct Site {
    /// Every rendered document including drafts, sorted by slug
    pub pages: Vec<RenderedDocument>,
    /// Published documents, newest first
    pub index: Vec<Summary>,
    /// Keyed by [`naming::listing_key`] of the tag
    pub tags: BTreeMap<String, TagListing>,
    /// Keyed by [`naming::listing_key`] of the series name
    pub series: BTreeMap<String, SeriesListing>,
    pub failures: Vec<Failure>,
    /// Number of drafts left out of the listings
    pub drafts: usize,
}

impl Site {
    pub fn page(&self, slug: &str) -> Option<&RenderedDocument> {
        self.pages
            .binary_search_by(|p| p.document.slug.as_str().cmp(slug))
            .ok()
            .map(|i| &self.pages[i])
    }

    /// Series the document belongs to, if it is published in one.
    pub fn series_of(&self, page: &RenderedDocument) -> Option<&SeriesListing> {
        let name = page.document.metadata.series.as_deref()?;
        self.series
            .get(&naming::listing_key(name))
            .filter(|listing| listing.entries.iter().any(|e| e.slug == page.document.slug))
    }

    pub fn summary(&self) -> BuildSummary<'_> {
        BuildSummary {
            published: self.index.len(),
            drafts: self.drafts,
            failures: &self.failures,
        }
    }
}

/// Counts printed at the end of a build.
#[derive(Debug, Clone, Copy)]
pub struct BuildSummary<'a> {
    pub published: usize,
    pub drafts: usize,
    pub failures: &'a [Failure],
}

impl BuildSummary<'_> {
    /// Documents that were not published for any reason.
    pub fn skipped(&self) -> usize {
        self.drafts + self.failures.len()
    }
}

impl fmt::Display for BuildSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Published {} documents; skipped {} documents ({} drafts excluded, {} errors)",
            self.published,
            self.skipped(),
            self.drafts,
            self.failures.len()
        )
    }
}

/// Newest first; undated after dated; ties by slug.
fn chronological(a: &Summary, b: &Summary) -> Ordering {
    match (a.date, b.date) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.slug.cmp(&b.slug))
}

/// Weight ascending with missing weights last, then oldest first, then slug.
fn series_order(a: &(Option<i64>, Summary), b: &(Option<i64>, Summary)) -> Ordering {
    let weight = match (a.0, b.0) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    let date = match (a.1.date, b.1.date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    weight.then(date).then_with(|| a.1.slug.cmp(&b.1.slug))
}

/// Give every listing a distinct URL segment, in key order.
///
/// Names that fold to the same slug (`C` and `C++`) keep separate pages; the
/// later key gets a numeric suffix.
fn assign_segments<'a>(names: impl Iterator<Item = (&'a String, &'a mut String)>) {
    let mut used = HashSet::new();
    for (name, slot) in names {
        let base = naming::url_segment(name);
        let mut segment = base.clone();
        let mut n = 2;
        while !used.insert(segment.clone()) {
            segment = format!("{base}-{n}");
            n += 1;
        }
        *slot = segment;
    }
}

pub fn assemble(mut pages: Vec<RenderedDocument>, mut failures: Vec<Failure>) -> Site {
    pages.sort_by(|a, b| a.document.slug.cmp(&b.document.slug));
    failures.sort_by(|a, b| a.source_path.cmp(&b.source_path));

    let mut index = Vec::new();
    let mut tags: BTreeMap<String, TagListing> = BTreeMap::new();
    let mut series: BTreeMap<String, (String, Vec<(Option<i64>, Summary)>)> = BTreeMap::new();
    let mut drafts = 0;

    for page in &pages {
        if page.document.is_draft() {
            drafts += 1;
            continue;
        }
        let summary = Summary::of(page);
        let meta = &page.document.metadata;

        for tag in &meta.tags {
            let key = naming::listing_key(tag);
            if key.is_empty() {
                continue;
            }
            let listing = tags.entry(key).or_insert_with(|| TagListing {
                name: tag.trim().to_string(),
                slug: String::new(),
                entries: Vec::new(),
            });
            // Two spellings of one tag on the same document count once.
            if listing.entries.last().is_none_or(|e| e.slug != summary.slug) {
                listing.entries.push(summary.clone());
            }
        }

        if let Some(name) = meta.series.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            series
                .entry(naming::listing_key(name))
                .or_insert_with(|| (name.to_string(), Vec::new()))
                .1
                .push((meta.series_weight, summary.clone()));
        }

        index.push(summary);
    }

    index.sort_by(chronological);
    for listing in tags.values_mut() {
        listing.entries.sort_by(chronological);
    }
    assign_segments(tags.values_mut().map(|l| (&l.name, &mut l.slug)));

    let mut series: BTreeMap<String, SeriesListing> = series
        .into_iter()
        .map(|(key, (name, mut entries))| {
            entries.sort_by(series_order);
            let listing = SeriesListing {
                name,
                slug: String::new(),
                entries: entries.into_iter().map(|(_, s)| s).collect(),
            };
            (key, listing)
        })
        .collect();
    assign_segments(series.values_mut().map(|l| (&l.name, &mut l.slug)));

    Site {
        pages,
        index,
        tags,
        series,
        failures,
        drafts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{document, rendered};
    use crate::types::DocumentError;
    use chrono::TimeZone;

    fn dated(slug: &str, y: i32, m: u32, d: u32) -> RenderedDocument {
        let mut doc = document(slug, "");
        doc.date = Some(Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap());
        rendered(doc)
    }

    fn slugs(entries: &[Summary]) -> Vec<&str> {
        entries.iter().map(|e| e.slug.as_str()).collect()
    }

    #[test]
    fn index_is_newest_first_with_undated_last() {
        let site = assemble(
            vec![
                rendered(document("undated", "")),
                dated("old", 2020, 1, 1),
                dated("new", 2024, 1, 1),
            ],
            vec![],
        );
        assert_eq!(slugs(&site.index), vec!["new", "old", "undated"]);
    }

    #[test]
    fn identical_dates_sort_by_slug() {
        let site = assemble(
            vec![dated("beta", 2023, 3, 1), dated("alpha", 2023, 3, 1)],
            vec![],
        );
        assert_eq!(slugs(&site.index), vec!["alpha", "beta"]);
    }

    #[test]
    fn drafts_are_paged_but_not_listed() {
        let mut draft = dated("draft", 2024, 1, 1);
        draft.document.metadata.draft = true;
        draft.document.metadata.tags = vec!["rust".into()];
        draft.document.metadata.series = Some("Wasm".into());
        let mut public = dated("public", 2023, 1, 1);
        public.document.metadata.tags = vec!["rust".into()];

        let site = assemble(vec![draft, public], vec![]);
        assert_eq!(slugs(&site.index), vec!["public"]);
        assert_eq!(slugs(&site.tags["rust"].entries), vec!["public"]);
        assert!(site.series.is_empty());
        assert!(site.page("draft").is_some());
        assert_eq!(site.drafts, 1);
    }

    #[test]
    fn tags_are_grouped_by_name_ignoring_case() {
        let mut a = dated("a", 2023, 1, 1);
        a.document.metadata.tags = vec!["Rust".into()];
        let mut b = dated("b", 2024, 1, 1);
        b.document.metadata.tags = vec![" rust ".into(), "wasm".into()];

        let site = assemble(vec![a, b], vec![]);
        let listing = &site.tags["rust"];
        assert_eq!(listing.name, "Rust");
        assert_eq!(listing.slug, "rust");
        assert_eq!(slugs(&listing.entries), vec!["b", "a"]);
        assert_eq!(slugs(&site.tags["wasm"].entries), vec!["b"]);
    }

    #[test]
    fn tags_folding_to_one_slug_stay_separate() {
        let mut a = dated("a", 2023, 1, 1);
        a.document.metadata.tags = vec!["C".into()];
        let mut b = dated("b", 2024, 1, 1);
        b.document.metadata.tags = vec!["C++".into()];

        let site = assemble(vec![a, b], vec![]);
        assert_eq!(site.tags.len(), 2);
        let c = &site.tags["c"];
        let cpp = &site.tags["c++"];
        assert_eq!((c.name.as_str(), c.slug.as_str()), ("C", "c"));
        assert_eq!((cpp.name.as_str(), cpp.slug.as_str()), ("C++", "c-2"));
        assert_eq!(slugs(&c.entries), vec!["a"]);
        assert_eq!(slugs(&cpp.entries), vec!["b"]);
    }

    #[test]
    fn non_ascii_tags_and_series_are_listed() {
        let mut a = dated("a", 2023, 1, 1);
        a.document.metadata.tags = vec!["日本語".into()];
        a.document.metadata.series = Some("入門".into());

        let site = assemble(vec![a], vec![]);
        let tag = &site.tags["日本語"];
        assert_eq!(tag.name, "日本語");
        assert!(tag.slug.starts_with("t-"));
        assert_eq!(slugs(&tag.entries), vec!["a"]);

        let series = site.series_of(site.page("a").unwrap()).unwrap();
        assert_eq!(series.name, "入門");
        assert!(series.slug.starts_with("t-"));
        assert_ne!(series.slug, tag.slug);
    }

    #[test]
    fn series_sorted_by_weight_then_date() {
        let mut entries = Vec::new();
        for (slug, weight, day) in [
            ("c", Some(2), 1),
            ("a", Some(1), 5),
            ("b", Some(2), 3),
            ("d", None, 1),
            ("e", Some(2), 1),
        ] {
            let mut page = dated(slug, 2023, 1, day);
            page.document.metadata.series = Some("Build a CAD kernel".into());
            page.document.metadata.series_weight = weight;
            entries.push(page);
        }

        let site = assemble(entries, vec![]);
        let listing = &site.series["build a cad kernel"];
        assert_eq!(listing.slug, "build-a-cad-kernel");
        assert_eq!(listing.name, "Build a CAD kernel");
        assert_eq!(slugs(&listing.entries), vec!["a", "c", "e", "b", "d"]);
    }

    #[test]
    fn series_neighbors() {
        let mut pages = Vec::new();
        for (slug, weight) in [("one", 1), ("two", 2), ("three", 3)] {
            let mut page = rendered(document(slug, ""));
            page.document.metadata.series = Some("Steps".into());
            page.document.metadata.series_weight = Some(weight);
            pages.push(page);
        }
        let site = assemble(pages, vec![]);
        let listing = site.series_of(site.page("two").unwrap()).unwrap();
        let (prev, next) = listing.neighbors("two");
        assert_eq!(prev.map(|s| s.slug.as_str()), Some("one"));
        assert_eq!(next.map(|s| s.slug.as_str()), Some("three"));
        assert_eq!(listing.neighbors("one").0, None);
    }

    #[test]
    fn summary_counts_published_drafts_and_errors() {
        let mut draft = rendered(document("draft", ""));
        draft.document.metadata.draft = true;
        let failure = Failure {
            source_path: "broken.md".into(),
            slug: None,
            error: DocumentError::Cancelled,
        };

        let site = assemble(vec![draft, rendered(document("ok", ""))], vec![failure]);
        let summary = site.summary();
        assert_eq!(summary.published, 1);
        assert_eq!(summary.drafts, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.skipped(), 2);
        assert_eq!(
            summary.to_string(),
            "Published 1 documents; skipped 2 documents (1 drafts excluded, 1 errors)"
        );
    }
}
