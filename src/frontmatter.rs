//! Front matter parsing.
//!
//! A document may open with a metadata block in one of two formats:
//!
//! ```text
//! ---                          +++
//! title: Rust on the web       title = "Rust on the web"
//! date: 2023-05-01             date = 2023-05-01
//! tags: [rust, wasm]           tags = ["rust", "wasm"]
//! ---                          +++
//! Body text...                 Body text...
//! ```
//!
//! `---` opens a YAML block and `+++` a TOML block; the same delimiter closes
//! it. A file whose first line is neither is all body with empty metadata.
//!
//! ## Recognized Keys
//!
//! | Key | Type | Default |
//! |-----|------|---------|
//! | `title` | string | first `# heading`, then the slug |
//! | `date` | timestamp | filename date prefix, then none |
//! | `draft` | bool | `false` |
//! | `tags` | list of strings (or one string) | empty |
//! | `series` | string | none |
//! | `series_weight` | integer | none |
//! | `summary` | string | derived excerpt |
//!
//! Every other key is preserved in [`Metadata::raw`] and ignored by the
//! pipeline. [`Metadata::to_front_matter`] writes the full key set back out in
//! the format it was read from.
//!
//! ## Errors
//!
//! Failures carry the file and a 1-based line number in the file's own
//! numbering: the opening delimiter for an unterminated block, the parser's
//! position for syntax errors, and the key's line for type errors.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Front matter block format, identified by its delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Toml,
}

impl Format {
    pub fn delimiter(self) -> &'static str {
        match self {
            Format::Yaml => "---",
            Format::Toml => "+++",
        }
    }

    fn from_delimiter(line: &str) -> Option<Self> {
        match line.trim_end() {
            "---" => Some(Format::Yaml),
            "+++" => Some(Format::Toml),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Yaml => f.write_str("YAML"),
            Format::Toml => f.write_str("TOML"),
        }
    }
}

#[derive(Error, Debug)]
#[error("{}:{}: {}", .path.display(), .line, .kind)]
pub struct MetadataError {
    pub path: PathBuf,
    pub line: usize,
    pub kind: MetadataErrorKind,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetadataErrorKind {
    #[error("unterminated {0} front matter (no closing `{delim}` line)", delim = .0.delimiter())]
    Unterminated(Format),
    #[error("invalid {format} front matter: {message}")]
    Syntax { format: Format, message: String },
    #[error("front matter must be a table of key/value pairs")]
    NotATable,
    #[error("front matter keys must be strings")]
    NonStringKey,
    #[error("`{key}` must be {expected}")]
    WrongType { key: String, expected: &'static str },
    #[error("`date` value {0:?} is not a recognized timestamp")]
    InvalidDate(String),
}

#[derive(Error, Debug)]
pub enum SerializeError {
    #[error("TOML serialization failed: {0}")]
    Toml(#[from] toml::ser::Error),
    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A front matter value, independent of the block format it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// TOML native datetime, kept in its textual form.
    Datetime(String),
    List(Vec<MetaValue>),
    Table(BTreeMap<String, MetaValue>),
}

impl MetaValue {
    fn from_toml(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => MetaValue::String(s),
            toml::Value::Integer(i) => MetaValue::Integer(i),
            toml::Value::Float(f) => MetaValue::Float(f),
            toml::Value::Boolean(b) => MetaValue::Bool(b),
            toml::Value::Datetime(d) => MetaValue::Datetime(d.to_string()),
            toml::Value::Array(items) => {
                MetaValue::List(items.into_iter().map(MetaValue::from_toml).collect())
            }
            toml::Value::Table(table) => MetaValue::Table(
                table
                    .into_iter()
                    .map(|(k, v)| (k, MetaValue::from_toml(v)))
                    .collect(),
            ),
        }
    }

    /// TOML has no null; nulls come back as `None` and are dropped by callers.
    fn to_toml(&self) -> Option<toml::Value> {
        Some(match self {
            MetaValue::Null => return None,
            MetaValue::Bool(b) => toml::Value::Boolean(*b),
            MetaValue::Integer(i) => toml::Value::Integer(*i),
            MetaValue::Float(f) => toml::Value::Float(*f),
            MetaValue::String(s) => toml::Value::String(s.clone()),
            MetaValue::Datetime(s) => match s.parse::<toml::value::Datetime>() {
                Ok(d) => toml::Value::Datetime(d),
                Err(_) => toml::Value::String(s.clone()),
            },
            MetaValue::List(items) => {
                toml::Value::Array(items.iter().filter_map(MetaValue::to_toml).collect())
            }
            MetaValue::Table(table) => toml::Value::Table(
                table
                    .iter()
                    .filter_map(|(k, v)| v.to_toml().map(|v| (k.clone(), v)))
                    .collect(),
            ),
        })
    }

    fn from_yaml(value: serde_yaml::Value) -> Result<Self, MetadataErrorKind> {
        Ok(match value {
            serde_yaml::Value::Null => MetaValue::Null,
            serde_yaml::Value::Bool(b) => MetaValue::Bool(b),
            serde_yaml::Value::Number(n) => match n.as_i64() {
                Some(i) => MetaValue::Integer(i),
                None => MetaValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_yaml::Value::String(s) => MetaValue::String(s),
            serde_yaml::Value::Sequence(items) => MetaValue::List(
                items
                    .into_iter()
                    .map(MetaValue::from_yaml)
                    .collect::<Result<_, _>>()?,
            ),
            serde_yaml::Value::Mapping(map) => MetaValue::Table(yaml_mapping_to_table(map)?),
            serde_yaml::Value::Tagged(tagged) => MetaValue::from_yaml(tagged.value)?,
        })
    }

    fn to_yaml(&self) -> serde_yaml::Value {
        match self {
            MetaValue::Null => serde_yaml::Value::Null,
            MetaValue::Bool(b) => serde_yaml::Value::Bool(*b),
            MetaValue::Integer(i) => serde_yaml::Value::Number((*i).into()),
            MetaValue::Float(f) => serde_yaml::Value::Number((*f).into()),
            MetaValue::String(s) | MetaValue::Datetime(s) => serde_yaml::Value::String(s.clone()),
            MetaValue::List(items) => {
                serde_yaml::Value::Sequence(items.iter().map(MetaValue::to_yaml).collect())
            }
            MetaValue::Table(table) => serde_yaml::Value::Mapping(
                table
                    .iter()
                    .map(|(k, v)| (serde_yaml::Value::String(k.clone()), v.to_yaml()))
                    .collect(),
            ),
        }
    }
}

fn yaml_mapping_to_table(
    map: serde_yaml::Mapping,
) -> Result<BTreeMap<String, MetaValue>, MetadataErrorKind> {
    map.into_iter()
        .map(|(k, v)| {
            let key = match k {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                _ => return Err(MetadataErrorKind::NonStringKey),
            };
            Ok((key, MetaValue::from_yaml(v)?))
        })
        .collect()
}

/// Decoded front matter of one document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metadata {
    pub title: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub draft: bool,
    pub tags: Vec<String>,
    pub series: Option<String>,
    pub series_weight: Option<i64>,
    pub summary: Option<String>,
    /// Every key of the block as written, recognized or not.
    pub raw: BTreeMap<String, MetaValue>,
    /// Format of the block, `None` when the file had no front matter.
    pub format: Option<Format>,
}

const RECOGNIZED_KEYS: &[&str] = &[
    "title",
    "date",
    "draft",
    "tags",
    "series",
    "series_weight",
    "summary",
];

impl Metadata {
    /// Keys the pipeline does not interpret.
    pub fn extra(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.raw
            .iter()
            .filter(|(k, _)| !RECOGNIZED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Serialize all keys back into a delimited front matter block.
    ///
    /// Uses the format the block was read in, TOML for documents that had none.
    pub fn to_front_matter(&self) -> Result<String, SerializeError> {
        let format = self.format.unwrap_or(Format::Toml);
        let text = match format {
            Format::Toml => {
                let table: toml::Table = self
                    .raw
                    .iter()
                    .filter_map(|(k, v)| v.to_toml().map(|v| (k.clone(), v)))
                    .collect();
                toml::to_string(&table)?
            }
            Format::Yaml => {
                if self.raw.is_empty() {
                    String::new()
                } else {
                    let mapping: serde_yaml::Mapping = self
                        .raw
                        .iter()
                        .map(|(k, v)| (serde_yaml::Value::String(k.clone()), v.to_yaml()))
                        .collect();
                    serde_yaml::to_string(&mapping)?
                }
            }
        };
        let delim = format.delimiter();
        Ok(format!("{delim}\n{text}{delim}\n"))
    }
}

/// A front matter block located inside a file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block<'a> {
    pub format: Format,
    pub text: &'a str,
    /// 1-based file line of the block's first content line.
    pub first_line: usize,
}

/// A file split into its optional front matter block and its body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Split<'a> {
    pub block: Option<Block<'a>>,
    pub body: &'a str,
    /// 1-based file line on which the body starts.
    pub body_line: usize,
}

/// Locate the front matter block, without decoding it.
///
/// Fails only for an opening delimiter that is never closed.
pub fn split(text: &str) -> Result<Split<'_>, MetadataErrorKind> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut lines = text.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok(Split {
            block: None,
            body: text,
            body_line: 1,
        });
    };
    let Some(format) = Format::from_delimiter(first) else {
        return Ok(Split {
            block: None,
            body: text,
            body_line: 1,
        });
    };

    let block_start = first.len();
    let mut offset = block_start;
    let mut line_no = 1;
    for line in lines {
        line_no += 1;
        if line.trim_end() == format.delimiter() {
            return Ok(Split {
                block: Some(Block {
                    format,
                    text: &text[block_start..offset],
                    first_line: 2,
                }),
                body: &text[offset + line.len()..],
                body_line: line_no + 1,
            });
        }
        offset += line.len();
    }

    Err(MetadataErrorKind::Unterminated(format))
}

/// Split a document and decode its front matter into [`Metadata`].
///
/// Returns the metadata together with the body text and the file line the
/// body starts on.
pub fn parse<'a>(
    path: &Path,
    text: &'a str,
) -> Result<(Metadata, &'a str, usize), MetadataError> {
    let err = |line: usize, kind: MetadataErrorKind| MetadataError {
        path: path.to_path_buf(),
        line,
        kind,
    };

    let split = split(text).map_err(|kind| err(1, kind))?;
    let Some(block) = split.block else {
        return Ok((Metadata::default(), split.body, split.body_line));
    };

    let raw = decode_block(&block).map_err(|(line, kind)| err(line, kind))?;
    let metadata =
        typed_metadata(raw, block.format).map_err(|(key, kind)| err(key_line(&block, &key), kind))?;

    Ok((metadata, split.body, split.body_line))
}

/// Decode a block into a raw key/value table.
///
/// Errors carry the file line they refer to.
fn decode_block(
    block: &Block<'_>,
) -> Result<BTreeMap<String, MetaValue>, (usize, MetadataErrorKind)> {
    match block.format {
        Format::Toml => {
            let table: toml::Table = toml::from_str(block.text).map_err(|e| {
                let line = e
                    .span()
                    .map(|span| block.first_line + block.text[..span.start].matches('\n').count())
                    .unwrap_or(block.first_line);
                (
                    line,
                    MetadataErrorKind::Syntax {
                        format: Format::Toml,
                        message: e.message().to_string(),
                    },
                )
            })?;
            Ok(table
                .into_iter()
                .map(|(k, v)| (k, MetaValue::from_toml(v)))
                .collect())
        }
        Format::Yaml => {
            let value: serde_yaml::Value = serde_yaml::from_str(block.text).map_err(|e| {
                let line = e
                    .location()
                    .map(|loc| block.first_line + loc.line().saturating_sub(1))
                    .unwrap_or(block.first_line);
                (
                    line,
                    MetadataErrorKind::Syntax {
                        format: Format::Yaml,
                        message: e.to_string(),
                    },
                )
            })?;
            match value {
                serde_yaml::Value::Null => Ok(BTreeMap::new()),
                serde_yaml::Value::Mapping(map) => {
                    yaml_mapping_to_table(map).map_err(|kind| (block.first_line, kind))
                }
                _ => Err((block.first_line, MetadataErrorKind::NotATable)),
            }
        }
    }
}

/// Extract the recognized keys with their expected types.
///
/// Errors carry the offending key so the caller can locate its line.
fn typed_metadata(
    raw: BTreeMap<String, MetaValue>,
    format: Format,
) -> Result<Metadata, (String, MetadataErrorKind)> {
    let wrong = |key: &str, expected: &'static str| {
        (
            key.to_string(),
            MetadataErrorKind::WrongType {
                key: key.to_string(),
                expected,
            },
        )
    };

    let string_field = |key: &str| -> Result<Option<String>, (String, MetadataErrorKind)> {
        match raw.get(key) {
            None | Some(MetaValue::Null) => Ok(None),
            Some(MetaValue::String(s)) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
            Some(_) => Err(wrong(key, "a string")),
        }
    };

    let title = string_field("title")?;
    let summary = string_field("summary")?;

    let series = match raw.get("series") {
        Some(MetaValue::List(items)) => match items.as_slice() {
            [] => None,
            [MetaValue::String(s)] => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            _ => return Err(wrong("series", "a single string")),
        },
        _ => string_field("series").map_err(|_| wrong("series", "a single string"))?,
    };

    let date = match raw.get("date") {
        None | Some(MetaValue::Null) => None,
        Some(MetaValue::String(s)) | Some(MetaValue::Datetime(s)) => match parse_date(s) {
            Some(d) => Some(d),
            None => {
                return Err((
                    "date".to_string(),
                    MetadataErrorKind::InvalidDate(s.clone()),
                ));
            }
        },
        Some(_) => return Err(wrong("date", "a timestamp")),
    };

    let draft = match raw.get("draft") {
        None | Some(MetaValue::Null) => false,
        Some(MetaValue::Bool(b)) => *b,
        Some(_) => return Err(wrong("draft", "a boolean")),
    };

    let series_weight = match raw.get("series_weight") {
        None | Some(MetaValue::Null) => None,
        Some(MetaValue::Integer(i)) => Some(*i),
        Some(_) => return Err(wrong("series_weight", "an integer")),
    };

    let tags = match raw.get("tags") {
        None | Some(MetaValue::Null) => Vec::new(),
        Some(MetaValue::String(s)) => vec![s.clone()],
        Some(MetaValue::List(items)) => items
            .iter()
            .map(|item| match item {
                MetaValue::String(s) => Ok(s.clone()),
                _ => Err(wrong("tags", "a list of strings")),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(wrong("tags", "a list of strings")),
    };

    Ok(Metadata {
        title,
        date,
        draft,
        tags: normalize_tags(tags),
        series,
        series_weight,
        summary,
        raw,
        format: Some(format),
    })
}

/// Trim tags, drop empties and duplicates, keep first-seen order.
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

/// Line of `key` inside a block, falling back to the block's first line.
fn key_line(block: &Block<'_>, key: &str) -> usize {
    block
        .text
        .lines()
        .position(|line| {
            let line = line.trim_start();
            let unquoted = line
                .strip_prefix('"')
                .and_then(|l| l.strip_prefix(key))
                .and_then(|l| l.strip_prefix('"'))
                .or_else(|| line.strip_prefix(key));
            unquoted.is_some_and(|rest| {
                let rest = rest.trim_start();
                rest.starts_with(':') || rest.starts_with('=')
            })
        })
        .map(|idx| block.first_line + idx)
        .unwrap_or(block.first_line)
}

/// Parse a front matter timestamp into UTC.
///
/// Accepts RFC 3339 (with `T` or a space), naive date-times (taken as UTC)
/// and bare dates (midnight UTC).
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f %z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
