//! Left-to-right scanner splitting a body into literal text and shortcodes.
//!
//! The scanner knows nothing about which shortcodes exist. It tokenizes
//! `{{< ... >}}` directives, pairs each opening directive with a matching
//! `{{< /name >}}` when one follows, and leaves everything else untouched.
//! Code blocks and inline code spans are skipped wholesale so that shortcode
//! syntax quoted in examples is never interpreted. Their extent comes from the
//! markdown parser itself, so fences nested in list items and block quotes
//! are found exactly where they will be rendered.

use crate::render::markdown_options;
use pulldown_cmark::{Event, Parser, Tag as MarkdownTag};
use std::collections::BTreeMap;
use std::ops::Range;
use thiserror::Error;

const OPEN: &str = "{{<";
const CLOSE: &str = ">}}";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShortcodeSyntaxError {
    #[error("line {line}: shortcode `{name}` needs a closing `/{name}`")]
    Unclosed { name: String, line: usize },
    #[error("line {line}: closing `/{name}` has no matching opening shortcode")]
    UnexpectedClose { name: String, line: usize },
    #[error("line {line}: `{name}` does not take a content region")]
    UnexpectedContent { name: String, line: usize },
    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },
}

/// A single shortcode use, with its arguments and optional content region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    pub name: String,
    pub positional: Vec<String>,
    pub named: BTreeMap<String, String>,
    /// Raw text between the opening and closing directive.
    pub inner: Option<String>,
    /// Line of the opening directive.
    pub line: usize,
    /// Line on which `inner` starts.
    pub inner_line: usize,
    pub self_closing: bool,
}

impl Invocation {
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }

    pub fn named(&self, key: &str) -> Option<&str> {
        self.named.get(key).map(String::as_str)
    }

    /// Keyword argument `key`, falling back to positional `index`.
    pub fn arg_or_named(&self, index: usize, key: &str) -> Option<&str> {
        self.named(key).or_else(|| self.arg(index))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Shortcode(Invocation),
}

#[derive(Debug)]
struct Tag {
    name: String,
    positional: Vec<String>,
    named: BTreeMap<String, String>,
    self_closing: bool,
    line: usize,
    end_line: usize,
    span: Range<usize>,
}

#[derive(Debug)]
enum Token {
    Open(Tag),
    Close {
        name: String,
        line: usize,
        span: Range<usize>,
    },
}

/// Scan a body whose first line is line 1.
pub fn scan(body: &str) -> Result<Vec<Segment<'_>>, ShortcodeSyntaxError> {
    scan_at(body, 1)
}

/// Scan a body, numbering lines from `first_line`.
pub fn scan_at(body: &str, first_line: usize) -> Result<Vec<Segment<'_>>, ShortcodeSyntaxError> {
    let tokens = Lexer::new(body, first_line).run()?;
    pair(body, tokens)
}

fn pair(text: &str, tokens: Vec<Token>) -> Result<Vec<Segment<'_>>, ShortcodeSyntaxError> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    let mut i = 0;

    while i < tokens.len() {
        let tag = match &tokens[i] {
            Token::Close { name, line, .. } => {
                return Err(ShortcodeSyntaxError::UnexpectedClose {
                    name: name.clone(),
                    line: *line,
                });
            }
            Token::Open(tag) => tag,
        };

        if cursor < tag.span.start {
            segments.push(Segment::Literal(&text[cursor..tag.span.start]));
        }

        let mut invocation = Invocation {
            name: tag.name.clone(),
            positional: tag.positional.clone(),
            named: tag.named.clone(),
            inner: None,
            line: tag.line,
            inner_line: tag.end_line,
            self_closing: tag.self_closing,
        };
        cursor = tag.span.end;
        let mut next = i + 1;

        if !tag.self_closing
            && let Some(j) = find_close(&tokens, i)
            && let Token::Close { span, .. } = &tokens[j]
        {
            invocation.inner = Some(text[tag.span.end..span.start].to_string());
            cursor = span.end;
            next = j + 1;
        }

        segments.push(Segment::Shortcode(invocation));
        i = next;
    }

    if cursor < text.len() {
        segments.push(Segment::Literal(&text[cursor..]));
    }
    Ok(segments)
}

/// Index of the `Close` matching the `Open` at `open`, counting nested
/// openings of the same name.
fn find_close(tokens: &[Token], open: usize) -> Option<usize> {
    let Token::Open(tag) = &tokens[open] else {
        return None;
    };
    let mut depth = 0usize;
    for (j, token) in tokens.iter().enumerate().skip(open + 1) {
        match token {
            Token::Open(inner) if inner.name == tag.name && !inner.self_closing => depth += 1,
            Token::Close { name, .. } if *name == tag.name => {
                if depth == 0 {
                    return Some(j);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

struct Lexer<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str, first_line: usize) -> Self {
        Self {
            text,
            pos: 0,
            line: first_line,
            tokens: Vec::new(),
        }
    }

    fn advance_to(&mut self, end: usize) {
        self.line += self.text[self.pos..end].matches('\n').count();
        self.pos = end;
    }

    fn run(mut self) -> Result<Vec<Token>, ShortcodeSyntaxError> {
        let code = code_ranges(self.text);
        let mut next_code = 0;

        while self.pos < self.text.len() {
            while code.get(next_code).is_some_and(|r| r.end <= self.pos) {
                next_code += 1;
            }
            let limit = match code.get(next_code) {
                Some(range) if range.start <= self.pos => {
                    self.advance_to(range.end);
                    continue;
                }
                Some(range) => range.start,
                None => self.text.len(),
            };

            let rest = &self.text[self.pos..limit];
            if rest.starts_with(OPEN) {
                self.directive()?;
            } else {
                let skip = rest
                    .char_indices()
                    .skip(1)
                    .find(|(_, c)| *c == '{')
                    .map(|(i, _)| i)
                    .unwrap_or(rest.len());
                self.advance_to(self.pos + skip);
            }
        }

        Ok(self.tokens)
    }

    fn directive(&mut self) -> Result<(), ShortcodeSyntaxError> {
        let text = self.text;
        let start = self.pos;
        let line = self.line;
        let rest = &text[start + OPEN.len()..];
        let Some(len) = rest.find(CLOSE) else {
            return Err(ShortcodeSyntaxError::Malformed {
                line,
                message: "unterminated shortcode, missing `>}}`".to_string(),
            });
        };
        let content = rest[..len].trim();
        let end = start + OPEN.len() + len + CLOSE.len();
        self.advance_to(end);
        let span = start..end;

        if let Some(name) = content.strip_prefix('/') {
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(ShortcodeSyntaxError::Malformed {
                    line,
                    message: format!("malformed closing shortcode `{content}`"),
                });
            }
            self.tokens.push(Token::Close {
                name: name.to_string(),
                line,
                span,
            });
            return Ok(());
        }

        let (content, self_closing) = match content.strip_suffix('/') {
            Some(head) if head.is_empty() || head.ends_with(char::is_whitespace) => {
                (head.trim_end(), true)
            }
            _ => (content, false),
        };

        let mut args = parse_args(content, line)?.into_iter();
        let name = match args.next() {
            Some(Arg::Bare(name)) => name,
            _ => {
                return Err(ShortcodeSyntaxError::Malformed {
                    line,
                    message: "shortcode name expected after `{{<`".to_string(),
                });
            }
        };

        let mut positional = Vec::new();
        let mut named = BTreeMap::new();
        for arg in args {
            match arg {
                Arg::Bare(value) | Arg::Quoted(value) => positional.push(value),
                Arg::Named(key, value) => {
                    named.insert(key, value);
                }
            }
        }

        self.tokens.push(Token::Open(Tag {
            name,
            positional,
            named,
            self_closing,
            line,
            end_line: self.line,
            span,
        }));
        Ok(())
    }
}

/// Byte ranges of code blocks and inline code spans, in order.
fn code_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = Vec::new();
    for (event, range) in Parser::new_ext(text, markdown_options()).into_offset_iter() {
        let is_code = matches!(
            event,
            Event::Start(MarkdownTag::CodeBlock(_)) | Event::Code(_)
        );
        if is_code && ranges.last().is_none_or(|last| range.start >= last.end) {
            ranges.push(range);
        }
    }
    ranges
}

#[derive(Debug, PartialEq)]
enum Arg {
    Bare(String),
    Quoted(String),
    Named(String, String),
}

fn is_key(word: &str) -> bool {
    !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Split directive content into arguments.
///
/// Arguments are whitespace separated. `"double quotes"` group words and
/// accept `\"` and `\\` escapes. `key=value` and `key="value"` are keyword
/// arguments; an `=` after anything other than a plain key (as in a URL query
/// string) stays part of a bare word.
fn parse_args(src: &str, line: usize) -> Result<Vec<Arg>, ShortcodeSyntaxError> {
    let mut args = Vec::new();
    let mut chars = src.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&c) = chars.peek() else {
            break;
        };

        if c == '"' {
            chars.next();
            args.push(Arg::Quoted(read_quoted(&mut chars, line)?));
            continue;
        }

        let mut word = String::new();
        while let Some(c) = chars.next_if(|c| !c.is_whitespace() && *c != '=') {
            word.push(c);
        }
        if is_key(&word) && chars.next_if_eq(&'=').is_some() {
            let value = if chars.next_if_eq(&'"').is_some() {
                read_quoted(&mut chars, line)?
            } else {
                read_bare(&mut chars)
            };
            args.push(Arg::Named(word, value));
        } else {
            word.push_str(&read_bare(&mut chars));
            args.push(Arg::Bare(word));
        }
    }

    Ok(args)
}

fn read_bare(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut word = String::new();
    while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
        word.push(c);
    }
    word
}

fn read_quoted(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    line: usize,
) -> Result<String, ShortcodeSyntaxError> {
    let mut value = String::new();
    loop {
        match chars.next() {
            None => {
                return Err(ShortcodeSyntaxError::Malformed {
                    line,
                    message: "unterminated quoted argument".to_string(),
                });
            }
            Some('"') => return Ok(value),
            Some('\\') => match chars.next() {
                Some(c @ ('"' | '\\')) => value.push(c),
                Some(c) => {
                    value.push('\\');
                    value.push(c);
                }
                None => value.push('\\'),
            },
            Some(c) => value.push(c),
        }
    }
}
