//! Site configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! overridden by a user config file in the content root.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [site]
//! title = "My Blog"
//! description = "Notes, essays and tutorials"
//! base_url = "https://example.org/"   # Absolute URL, used for feed links
//! language = "en"
//! # author = "Sam Doe"
//!
//! [content]
//! excerpt_length = 240      # Max characters of a derived excerpt
//! toc_min_level = 2         # Lowest heading level listed by {{< toc >}}
//! toc_max_level = 4         # Highest heading level listed by {{< toc >}}
//!
//! [feed]
//! enabled = true            # Write index.xml
//! limit = 20                # Max items per feed
//! per_tag = true            # Write tags/<tag>/index.xml as well
//!
//! [shortcodes.aliases]
//! youtube = "video"         # Extra names for built-in shortcodes
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! [site]
//! title = "Field Notes"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `config.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Site identity used in page titles and feeds.
    pub site: SiteMeta,
    /// Rendering settings (excerpts, table of contents).
    pub content: ContentConfig,
    /// RSS feed generation.
    pub feed: FeedConfig,
    /// Shortcode registry settings.
    pub shortcodes: ShortcodesConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = &self.site.base_url;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Validation(
                "site.base_url must be an absolute http(s) URL".into(),
            ));
        }
        if self.content.excerpt_length == 0 {
            return Err(ConfigError::Validation(
                "content.excerpt_length must be greater than 0".into(),
            ));
        }
        let (min, max) = (self.content.toc_min_level, self.content.toc_max_level);
        if !(1..=6).contains(&min) || !(1..=6).contains(&max) {
            return Err(ConfigError::Validation(
                "content.toc_min_level and content.toc_max_level must be 1-6".into(),
            ));
        }
        if min > max {
            return Err(ConfigError::Validation(
                "content.toc_min_level must not exceed content.toc_max_level".into(),
            ));
        }
        if self.feed.limit == 0 {
            return Err(ConfigError::Validation(
                "feed.limit must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Absolute URL for a root-relative path like `/posts/hello/`.
    pub fn absolute_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.site.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Site identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteMeta {
    pub title: String,
    pub description: String,
    /// Absolute base URL of the published site.
    pub base_url: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl Default for SiteMeta {
    fn default() -> Self {
        Self {
            title: "My Blog".to_string(),
            description: "Notes, essays and tutorials".to_string(),
            base_url: "https://example.org/".to_string(),
            language: "en".to_string(),
            author: None,
        }
    }
}

/// Rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContentConfig {
    /// Maximum length in characters of an excerpt derived from the body.
    pub excerpt_length: usize,
    /// Lowest heading level included in a table of contents.
    pub toc_min_level: u8,
    /// Highest heading level included in a table of contents.
    pub toc_max_level: u8,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            excerpt_length: 240,
            toc_min_level: 2,
            toc_max_level: 4,
        }
    }
}

/// RSS feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedConfig {
    pub enabled: bool,
    /// Maximum number of items per feed, newest first.
    pub limit: usize,
    /// Also write one feed per tag.
    pub per_tag: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 20,
            per_tag: true,
        }
    }
}

/// Shortcode registry settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShortcodesConfig {
    /// Extra names for registered shortcodes: `alias = "target"`.
    pub aliases: BTreeMap<String, String>,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel parse/render workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(SiteConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = path.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Simple Press Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file at the root of the content directory.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Site identity
# ---------------------------------------------------------------------------
[site]
title = "My Blog"
description = "Notes, essays and tutorials"

# Absolute URL the site is published at. Feed links are built from it.
base_url = "https://example.org/"

language = "en"

# Author shown on pages and in feeds.
# author = "Sam Doe"

# ---------------------------------------------------------------------------
# Rendering
# ---------------------------------------------------------------------------
[content]
# Maximum characters of an excerpt derived from the body. A `summary` key in
# the front matter or a <!--more--> marker in the body takes precedence.
excerpt_length = 240

# Heading levels listed by the {{< toc >}} shortcode.
toc_min_level = 2
toc_max_level = 4

# ---------------------------------------------------------------------------
# Feeds
# ---------------------------------------------------------------------------
[feed]
# Write an RSS feed of published documents to index.xml.
enabled = true

# Maximum number of items per feed, newest first.
limit = 20

# Also write tags/<tag>/index.xml for every tag.
per_tag = true

# ---------------------------------------------------------------------------
# Shortcodes
# ---------------------------------------------------------------------------
# Extra names for built-in shortcodes (video, toc, notice, ref, relref).
# Aliases pointing at unknown shortcodes are rejected at startup.
[shortcodes.aliases]
# youtube = "video"
# admonition = "notice"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel parse/render workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
