//! End-to-end builds of small content trees through the library API.

use simple_press::assemble::{self, Site};
use simple_press::config::{self, SiteConfig};
use simple_press::frontmatter::MetadataErrorKind;
use simple_press::generate;
use simple_press::render::{self, RenderError, RenderOptions};
use simple_press::scan;
use simple_press::shortcode::ShortcodeRegistry;
use simple_press::types::{CancelToken, DocumentError};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn build_site(source: &Path) -> (SiteConfig, Site) {
    let config = config::load_config(source).unwrap();
    let registry = ShortcodeRegistry::from_config(&config.shortcodes).unwrap();
    let cancel = CancelToken::new();
    let manifest = scan::scan(source, &cancel, None).unwrap();
    let options = RenderOptions::from_config(&config.content);
    let (pages, mut failures) =
        render::render_all(manifest.documents, &registry, &options, &cancel, None);
    failures.extend(manifest.failures);
    (config, assemble::assemble(pages, failures))
}

fn read(dir: &Path, rel: &str) -> String {
    fs::read_to_string(dir.join(rel)).unwrap_or_else(|e| panic!("{rel}: {e}"))
}

#[test]
fn draft_malformed_and_valid_documents() {
    let content = TempDir::new().unwrap();
    let dist = TempDir::new().unwrap();
    write(
        content.path(),
        "valid.md",
        "---\ntitle: Valid\ndate: 2023-05-01\ntags: [rust]\n---\nHello.\n",
    );
    write(
        content.path(),
        "draft.md",
        "---\ntitle: Draft\ndraft: true\ntags: [rust]\n---\nNot yet.\n",
    );
    write(content.path(), "broken.md", "---\ntitle: Broken\n\nNo closing line.\n");

    let (config, site) = build_site(content.path());
    let summary = site.summary();
    assert_eq!(summary.published, 1);
    assert_eq!(summary.drafts, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(
        summary.to_string(),
        "Published 1 documents; skipped 2 documents (1 drafts excluded, 1 errors)"
    );

    let failure = &site.failures[0];
    assert_eq!(failure.source_path, "broken.md");
    match &failure.error {
        DocumentError::Metadata(e) => {
            assert!(matches!(e.kind, MetadataErrorKind::Unterminated(_)))
        }
        other => panic!("expected a metadata error, got {other:?}"),
    }

    generate::generate(&site, &config, dist.path(), true).unwrap();
    let index = read(dist.path(), "index.html");
    assert_eq!(index.matches(r#"class="post-title""#).count(), 1);
    assert!(index.contains("Valid"));
    assert!(!index.contains(">Draft<"));

    // The draft is still viewable at its own URL, but not listed under its tag.
    assert!(read(dist.path(), "draft/index.html").contains("draft-banner"));
    assert!(!read(dist.path(), "tags/rust/index.html").contains("/draft/"));
    assert!(!dist.path().join("broken/index.html").exists());
}

#[test]
fn identical_dates_order_by_slug() {
    let content = TempDir::new().unwrap();
    write(content.path(), "beta.md", "+++\ndate = 2024-01-01\n+++\nB\n");
    write(content.path(), "alpha.md", "+++\ndate = 2024-01-01\n+++\nA\n");

    let (_, site) = build_site(content.path());
    let slugs: Vec<&str> = site.index.iter().map(|s| s.slug.as_str()).collect();
    assert_eq!(slugs, vec!["alpha", "beta"]);
}

#[test]
fn unknown_shortcode_excludes_only_that_document() {
    let content = TempDir::new().unwrap();
    write(content.path(), "good.md", "# Good\n\n{{< notice tip >}}Fine{{< /notice >}}\n");
    write(content.path(), "bad.md", "# Bad\n\nText\n\n{{< gallery dir=\"x\" >}}\n");

    let (_, site) = build_site(content.path());
    assert_eq!(site.pages.len(), 1);
    assert_eq!(site.pages[0].document.slug, "good");
    assert_eq!(site.failures.len(), 1);
    match &site.failures[0].error {
        DocumentError::Render(RenderError::UnknownShortcode { path, name, line }) => {
            assert_eq!(path, "bad.md");
            assert_eq!(name, "gallery");
            assert_eq!(*line, 5);
        }
        other => panic!("expected an unknown shortcode error, got {other:?}"),
    }
}

#[test]
fn dangling_cross_reference_is_reported() {
    let content = TempDir::new().unwrap();
    write(content.path(), "a.md", "See [b]({{< ref \"b\" >}}).\n");
    write(content.path(), "c.md", "See [missing]({{< ref \"missing\" >}}).\n");
    write(content.path(), "b.md", "Back to [a]({{< relref \"a\" >}}).\n");

    let (_, site) = build_site(content.path());
    assert_eq!(site.pages.len(), 2);
    assert!(site.page("a").unwrap().html.contains(r#"href="/b/""#));
    assert!(site.page("b").unwrap().html.contains(r#"href="../a/""#));
    match &site.failures[0].error {
        DocumentError::Render(RenderError::CrossReference { target, .. }) => {
            assert_eq!(target, "missing")
        }
        other => panic!("expected a cross reference error, got {other:?}"),
    }
}

#[test]
fn shortcodes_in_code_fences_pass_through() {
    let content = TempDir::new().unwrap();
    write(
        content.path(),
        "guide.md",
        "# Guide\n\n```markdown\n{{< video \"https://youtu.be/abc\" >}}\n{{< nope >}}\n```\n",
    );

    let (_, site) = build_site(content.path());
    assert!(site.failures.is_empty(), "{:?}", site.failures);
    let html = &site.page("guide").unwrap().html;
    assert!(html.contains("{{&lt; video "));
    assert!(html.contains("https://youtu.be/abc"));
    assert!(html.contains("{{&lt; nope &gt;}}"));
    assert!(!html.contains("iframe"));
}

#[test]
fn shortcodes_in_list_item_fences_pass_through() {
    let content = TempDir::new().unwrap();
    write(
        content.path(),
        "steps.md",
        "# Steps\n\n1. Embed a clip:\n\n    ~~~\n    {{< youtube abc >}}\n    ~~~\n\n2. Or a file:\n\n    ```\n    {{< video \"/clip.mp4\" >}}\n\n    {{< nope >}}\n    ```\n",
    );

    let (_, site) = build_site(content.path());
    assert!(site.failures.is_empty(), "{:?}", site.failures);
    let html = &site.page("steps").unwrap().html;
    assert!(html.contains("{{&lt; youtube abc &gt;}}"));
    assert!(html.contains("{{&lt; nope &gt;}}"));
    assert!(!html.contains("<video"));
}

#[test]
fn config_aliases_reach_the_renderer() {
    let content = TempDir::new().unwrap();
    write(
        content.path(),
        "config.toml",
        "[site]\ntitle = \"Field Notes\"\n\n[shortcodes.aliases]\nyoutube = \"video\"\n",
    );
    write(content.path(), "clip.md", "{{< youtube \"https://youtu.be/abc123\" >}}\n");

    let (config, site) = build_site(content.path());
    assert_eq!(config.site.title, "Field Notes");
    assert!(site.failures.is_empty(), "{:?}", site.failures);
    assert!(site.page("clip").unwrap().html.contains("youtube-nocookie.com/embed/abc123"));
}

#[test]
fn rebuild_skips_unchanged_and_prunes_deleted() {
    let content = TempDir::new().unwrap();
    let dist = TempDir::new().unwrap();
    write(content.path(), "keep.md", "Keep me.\n");
    write(content.path(), "gone.md", "Delete me.\n");

    let (config, site) = build_site(content.path());
    let first = generate::generate(&site, &config, dist.path(), true).unwrap();
    assert_eq!(first.stats.unchanged, 0);
    assert!(dist.path().join("gone/index.html").exists());

    let (config, site) = build_site(content.path());
    let second = generate::generate(&site, &config, dist.path(), true).unwrap();
    assert_eq!(second.stats.written, 0);
    assert_eq!(second.stats.unchanged, first.stats.written);

    fs::remove_file(content.path().join("gone.md")).unwrap();
    let (config, site) = build_site(content.path());
    let third = generate::generate(&site, &config, dist.path(), true).unwrap();
    assert_eq!(third.stats.removed, 1);
    assert!(!dist.path().join("gone").exists());
    assert!(dist.path().join("keep/index.html").exists());

    let forced = generate::generate(&site, &config, dist.path(), false).unwrap();
    assert_eq!(forced.stats.unchanged, 0);
    assert_eq!(forced.stats.written as usize, forced.outputs.len());
}
