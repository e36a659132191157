//! Built-in shortcodes.
//!
//! | Name | Kind | Output |
//! |------|------|--------|
//! | `video <url>` | inline | YouTube/Vimeo `<iframe>`, otherwise `<video controls>` |
//! | `toc` | toc | nested list of the page's headings |
//! | `notice <level>` … `/notice` | block | `<aside class="notice notice-{level}">` |
//! | `ref <name>` | inline | absolute URL of another document |
//! | `relref <name>` | inline | URL of another document relative to this one |
//!
//! `ref` and `relref` expand to text so they can be used as link
//! destinations: `[see part 2]({{< ref "part-2" >}})`.

use super::registry::{Expansion, Handler, ShortcodeError};
use super::Invocation;
use crate::render::RenderContext;
use maud::{PreEscaped, html};

pub(super) const HANDLERS: &[(&str, Handler)] = &[
    ("video", Handler::Inline(video)),
    ("toc", Handler::Toc),
    ("notice", Handler::Block(notice)),
    ("ref", Handler::Inline(absolute_ref)),
    ("relref", Handler::Inline(relative_ref)),
];

// =============================================================================
// video
// =============================================================================

#[derive(Debug, PartialEq)]
enum VideoSource {
    /// Third-party player page, embedded in an iframe
    Player(String),
    /// Direct link to a video file
    File(String),
}

fn video(inv: &Invocation, _ctx: &RenderContext<'_>) -> Result<Expansion, ShortcodeError> {
    let src = inv
        .arg_or_named(0, "src")
        .ok_or(ShortcodeError::MissingArgument("src"))?;
    let title = inv.named("title").unwrap_or("Embedded video");

    let markup = match classify_video(src)? {
        VideoSource::Player(url) => html! {
            div.video-embed {
                iframe src=(url) title=(title) loading="lazy"
                    allow="accelerometer; encrypted-media; gyroscope; picture-in-picture; fullscreen"
                    allowfullscreen {}
            }
        },
        VideoSource::File(url) => html! {
            div.video-embed {
                video controls preload="metadata" src=(url) title=(title) {
                    a href=(url) { "Download the video" }
                }
            }
        },
    };
    Ok(Expansion::Html(markup.into_string()))
}

fn classify_video(src: &str) -> Result<VideoSource, ShortcodeError> {
    let unsupported = || ShortcodeError::InvalidArgument(format!("unsupported video URL `{src}`"));

    if src.starts_with('/') {
        return Ok(VideoSource::File(src.to_string()));
    }
    let rest = src
        .strip_prefix("https://")
        .or_else(|| src.strip_prefix("http://"))
        .ok_or_else(unsupported)?;
    let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
    let host = host
        .trim_start_matches("www.")
        .trim_start_matches("m.")
        .to_ascii_lowercase();

    let player = match host.as_str() {
        "youtube.com" | "youtube-nocookie.com" => youtube_id(path)
            .map(|id| format!("https://www.youtube-nocookie.com/embed/{id}"))
            .ok_or_else(unsupported)?,
        "youtu.be" => media_id(path.split(['?', '#']).next().unwrap_or_default())
            .map(|id| format!("https://www.youtube-nocookie.com/embed/{id}"))
            .ok_or_else(unsupported)?,
        "vimeo.com" | "player.vimeo.com" => vimeo_id(path)
            .map(|id| format!("https://player.vimeo.com/video/{id}"))
            .ok_or_else(unsupported)?,
        _ => return Ok(VideoSource::File(src.to_string())),
    };
    Ok(VideoSource::Player(player))
}

fn youtube_id(path: &str) -> Option<&str> {
    let (path, query) = path.split_once('?').unwrap_or((path, ""));
    if path == "watch" {
        let id = query
            .split('&')
            .find_map(|pair| pair.strip_prefix("v="))?;
        return media_id(id.split('#').next().unwrap_or_default());
    }
    let id = path
        .strip_prefix("embed/")
        .or_else(|| path.strip_prefix("shorts/"))
        .or_else(|| path.strip_prefix("live/"))?;
    media_id(id.split(['/', '#']).next().unwrap_or_default())
}

fn vimeo_id(path: &str) -> Option<&str> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let id = path.strip_prefix("video/").unwrap_or(path);
    let id = id.split('/').next().unwrap_or_default();
    (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit())).then_some(id)
}

fn media_id(id: &str) -> Option<&str> {
    (!id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'))
    .then_some(id)
}

// =============================================================================
// notice
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum NoticeLevel {
    Note,
    Tip,
    Info,
    Error,
}

impl NoticeLevel {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "note" => Some(Self::Note),
            "tip" => Some(Self::Tip),
            "info" => Some(Self::Info),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Tip => "tip",
            Self::Info => "info",
            Self::Error => "error",
        }
    }

    fn default_title(self) -> &'static str {
        match self {
            Self::Note => "Note",
            Self::Tip => "Tip",
            Self::Info => "Info",
            Self::Error => "Error",
        }
    }
}

fn notice(
    inv: &Invocation,
    inner_html: &str,
    _ctx: &RenderContext<'_>,
) -> Result<String, ShortcodeError> {
    let raw = inv
        .arg_or_named(0, "level")
        .ok_or(ShortcodeError::MissingArgument("level"))?;
    let level = NoticeLevel::parse(raw).ok_or_else(|| {
        ShortcodeError::InvalidArgument(format!(
            "unknown notice level `{raw}` (expected note, tip, info or error)"
        ))
    })?;
    let title = inv.named("title").unwrap_or(level.default_title());

    Ok(html! {
        aside class={ "notice notice-" (level.as_str()) } role="note" {
            p.notice-title { (title) }
            div.notice-body { (PreEscaped(inner_html)) }
        }
    }
    .into_string())
}

// =============================================================================
// ref / relref
// =============================================================================

/// Resolve `name` (optionally with a `#fragment`) to the target's URL.
fn resolve_url(inv: &Invocation, ctx: &RenderContext<'_>) -> Result<String, ShortcodeError> {
    let name = inv
        .arg_or_named(0, "path")
        .ok_or(ShortcodeError::MissingArgument("path"))?;
    let (name, fragment) = match name.split_once('#') {
        Some((name, fragment)) => (name, Some(fragment)),
        None => (name, None),
    };

    let url = if name.is_empty() {
        ctx.document.url()
    } else {
        ctx.links
            .resolve(name)
            .map(|target| target.url.clone())
            .ok_or_else(|| ShortcodeError::UnresolvedReference(name.to_string()))?
    };

    Ok(match fragment {
        Some(fragment) => format!("{url}#{fragment}"),
        None => url,
    })
}

fn absolute_ref(inv: &Invocation, ctx: &RenderContext<'_>) -> Result<Expansion, ShortcodeError> {
    resolve_url(inv, ctx).map(Expansion::Text)
}

fn relative_ref(inv: &Invocation, ctx: &RenderContext<'_>) -> Result<Expansion, ShortcodeError> {
    let url = resolve_url(inv, ctx)?;
    Ok(Expansion::Text(relative_url(&ctx.document.url(), &url)))
}

/// Path from page URL `from` to root-relative URL `to`, both directory style.
///
/// - `/posts/a/` → `/posts/b/` = `../b/`
/// - `/posts/a/` → `/posts/a/#x` = `./#x`
fn relative_url(from: &str, to: &str) -> String {
    let (to_path, fragment) = match to.split_once('#') {
        Some((path, fragment)) => (path, format!("#{fragment}")),
        None => (to, String::new()),
    };
    let from: Vec<&str> = from.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = to_path.split('/').filter(|s| !s.is_empty()).collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<&str> = vec![".."; from.len() - common];
    parts.extend(&to[common..]);
    if parts.is_empty() {
        format!("./{fragment}")
    } else {
        format!("{}/{fragment}", parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::LinkTable;
    use crate::test_helpers::document;

    fn invocation(name: &str, args: &[&str]) -> Invocation {
        Invocation {
            name: name.to_string(),
            positional: args.iter().map(|s| s.to_string()).collect(),
            line: 1,
            ..Default::default()
        }
    }

    // =========================================================================
    // video
    // =========================================================================

    #[test]
    fn youtube_watch_url_becomes_nocookie_embed() {
        assert_eq!(
            classify_video("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10").unwrap(),
            VideoSource::Player("https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ".into())
        );
    }

    #[test]
    fn youtube_short_url() {
        assert_eq!(
            classify_video("https://youtu.be/dQw4w9WgXcQ?si=x").unwrap(),
            VideoSource::Player("https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ".into())
        );
    }

    #[test]
    fn vimeo_url_becomes_player() {
        assert_eq!(
            classify_video("https://vimeo.com/76979871").unwrap(),
            VideoSource::Player("https://player.vimeo.com/video/76979871".into())
        );
    }

    #[test]
    fn youtube_url_without_id_is_invalid() {
        assert!(matches!(
            classify_video("https://www.youtube.com/channel/xyz"),
            Err(ShortcodeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn plain_files_use_video_element() {
        assert_eq!(
            classify_video("/media/demo.mp4").unwrap(),
            VideoSource::File("/media/demo.mp4".into())
        );
        assert_eq!(
            classify_video("https://cdn.example.com/demo.webm").unwrap(),
            VideoSource::File("https://cdn.example.com/demo.webm".into())
        );
    }

    #[test]
    fn non_http_scheme_is_invalid() {
        assert!(classify_video("javascript:alert(1)").is_err());
        assert!(classify_video("ftp://example.com/a.mp4").is_err());
    }

    #[test]
    fn video_renders_iframe() {
        let doc = document("posts/a", "");
        let links = LinkTable::build(std::slice::from_ref(&doc));
        let ctx = RenderContext {
            document: &doc,
            links: &links,
        };
        let out = video(&invocation("video", &["https://youtu.be/abc"]), &ctx).unwrap();
        match out {
            Expansion::Html(html) => {
                assert!(html.contains(r#"<iframe src="https://www.youtube-nocookie.com/embed/abc""#));
                assert!(html.contains("allowfullscreen"));
            }
            other => panic!("expected html, got {other:?}"),
        }
    }

    #[test]
    fn video_without_url_is_missing_argument() {
        let doc = document("posts/a", "");
        let links = LinkTable::build(std::slice::from_ref(&doc));
        let ctx = RenderContext {
            document: &doc,
            links: &links,
        };
        assert_eq!(
            video(&invocation("video", &[]), &ctx),
            Err(ShortcodeError::MissingArgument("src"))
        );
    }

    // =========================================================================
    // notice
    // =========================================================================

    #[test]
    fn notice_wraps_inner_html() {
        let doc = document("posts/a", "");
        let links = LinkTable::build(std::slice::from_ref(&doc));
        let ctx = RenderContext {
            document: &doc,
            links: &links,
        };
        let html = notice(&invocation("notice", &["tip"]), "<p>Hi</p>", &ctx).unwrap();
        assert!(html.starts_with(r#"<aside class="notice notice-tip" role="note">"#));
        assert!(html.contains(r#"<p class="notice-title">Tip</p>"#));
        assert!(html.contains(r#"<div class="notice-body"><p>Hi</p></div>"#));
    }

    #[test]
    fn notice_rejects_unknown_level() {
        let doc = document("posts/a", "");
        let links = LinkTable::build(std::slice::from_ref(&doc));
        let ctx = RenderContext {
            document: &doc,
            links: &links,
        };
        let err = notice(&invocation("notice", &["warning"]), "", &ctx).unwrap_err();
        assert!(matches!(err, ShortcodeError::InvalidArgument(_)));
    }

    // =========================================================================
    // ref / relref
    // =========================================================================

    #[test]
    fn ref_resolves_to_absolute_url_with_fragment() {
        let docs = vec![document("posts/a", ""), document("posts/b", "")];
        let links = LinkTable::build(&docs);
        let ctx = RenderContext {
            document: &docs[0],
            links: &links,
        };
        assert_eq!(
            absolute_ref(&invocation("ref", &["b#setup"]), &ctx),
            Ok(Expansion::Text("/posts/b/#setup".into()))
        );
    }

    #[test]
    fn relref_is_relative_to_current_page() {
        let docs = vec![document("posts/a", ""), document("about", "")];
        let links = LinkTable::build(&docs);
        let ctx = RenderContext {
            document: &docs[0],
            links: &links,
        };
        assert_eq!(
            relative_ref(&invocation("relref", &["about"]), &ctx),
            Ok(Expansion::Text("../../about/".into()))
        );
    }

    #[test]
    fn dangling_ref_is_unresolved() {
        let docs = vec![document("posts/a", "")];
        let links = LinkTable::build(&docs);
        let ctx = RenderContext {
            document: &docs[0],
            links: &links,
        };
        assert_eq!(
            absolute_ref(&invocation("ref", &["missing"]), &ctx),
            Err(ShortcodeError::UnresolvedReference("missing".into()))
        );
    }

    #[test]
    fn relative_url_cases() {
        assert_eq!(relative_url("/posts/a/", "/posts/b/"), "../b/");
        assert_eq!(relative_url("/posts/a/", "/posts/a/#x"), "./#x");
        assert_eq!(relative_url("/index/", "/posts/a/"), "../posts/a/");
        assert_eq!(relative_url("/posts/a/", "/posts/a/b/"), "b/");
    }
}
