//! Name → handler table for shortcodes.
//!
//! The registry is built once before rendering starts and validated up front:
//! names must be non-empty `[a-z0-9_-]`, duplicates are rejected and aliases
//! must point at an existing entry. Rendering then looks names up without
//! ever mutating the table.

use super::Invocation;
use super::builtin;
use crate::config::ShortcodesConfig;
use crate::render::RenderContext;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Expands a shortcode that has no content region.
pub type InlineFn = fn(&Invocation, &RenderContext<'_>) -> Result<Expansion, ShortcodeError>;

/// Expands a shortcode around its already-rendered content region.
pub type BlockFn = fn(&Invocation, &str, &RenderContext<'_>) -> Result<String, ShortcodeError>;

/// How a registered shortcode is expanded.
#[derive(Clone, Copy)]
pub enum Handler {
    Inline(InlineFn),
    /// Requires a closing tag. The content region is rendered as markdown
    /// and handed over as HTML.
    Block(BlockFn),
    /// Replaced by the table of contents once all headings are known.
    Toc,
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Inline(_) => f.write_str("Inline"),
            Handler::Block(_) => f.write_str("Block"),
            Handler::Toc => f.write_str("Toc"),
        }
    }
}

/// Output of an inline shortcode.
#[derive(Debug, Clone, PartialEq)]
pub enum Expansion {
    /// Spliced into the markdown source before conversion.
    Text(String),
    /// Inserted verbatim into the converted HTML.
    Html(String),
}

/// A handler rejected its invocation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShortcodeError {
    #[error("missing required argument `{0}`")]
    MissingArgument(&'static str),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("no document named `{0}`")]
    UnresolvedReference(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("invalid shortcode name `{0}` (use lowercase letters, digits, `-` and `_`)")]
    InvalidName(String),
    #[error("shortcode `{0}` is registered twice")]
    Duplicate(String),
    #[error("shortcode alias `{alias}` points at unknown shortcode `{target}`")]
    UnknownTarget { alias: String, target: String },
}

#[derive(Debug, Clone, Default)]
pub struct ShortcodeRegistry {
    handlers: BTreeMap<String, Handler>,
}

impl ShortcodeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in shortcodes.
    pub fn builtin() -> Self {
        let handlers = builtin::HANDLERS
            .iter()
            .map(|(name, handler)| (name.to_string(), *handler))
            .collect();
        Self { handlers }
    }

    /// Built-ins plus the aliases declared in `[shortcodes.aliases]`.
    pub fn from_config(config: &ShortcodesConfig) -> Result<Self, RegistryError> {
        let mut registry = Self::builtin();
        for (alias, target) in &config.aliases {
            registry.alias(alias, target)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, name: &str, handler: Handler) -> Result<(), RegistryError> {
        if !is_valid_name(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if self.handlers.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.handlers.insert(name.to_string(), handler);
        Ok(())
    }

    /// Make `alias` dispatch to the handler registered as `target`.
    pub fn alias(&mut self, alias: &str, target: &str) -> Result<(), RegistryError> {
        let handler = self
            .get(target)
            .ok_or_else(|| RegistryError::UnknownTarget {
                alias: alias.to_string(),
                target: target.to_string(),
            })?;
        self.register(alias, handler)
    }

    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shout(inv: &Invocation, _ctx: &RenderContext<'_>) -> Result<Expansion, ShortcodeError> {
        Ok(Expansion::Text(inv.arg(0).unwrap_or_default().to_uppercase()))
    }

    #[test]
    fn builtin_registry_has_all_shortcodes() {
        let registry = ShortcodeRegistry::builtin();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["notice", "ref", "relref", "toc", "video"]);
        assert!(matches!(registry.get("notice"), Some(Handler::Block(_))));
        assert!(matches!(registry.get("toc"), Some(Handler::Toc)));
        assert!(registry.get("gallery").is_none());
    }

    #[test]
    fn register_rejects_bad_names() {
        let mut registry = ShortcodeRegistry::new();
        for name in ["", "Shout", "has space", "a.b"] {
            assert_eq!(
                registry.register(name, Handler::Inline(shout)),
                Err(RegistryError::InvalidName(name.to_string()))
            );
        }
        assert!(registry.register("shout_2", Handler::Inline(shout)).is_ok());
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut registry = ShortcodeRegistry::builtin();
        assert_eq!(
            registry.register("video", Handler::Inline(shout)),
            Err(RegistryError::Duplicate("video".to_string()))
        );
    }

    #[test]
    fn alias_shares_target_handler() {
        let mut registry = ShortcodeRegistry::builtin();
        registry.alias("admonition", "notice").unwrap();
        assert!(matches!(registry.get("admonition"), Some(Handler::Block(_))));
    }

    #[test]
    fn from_config_rejects_dangling_alias() {
        let mut config = ShortcodesConfig::default();
        config
            .aliases
            .insert("gallery".to_string(), "carousel".to_string());
        let err = ShortcodeRegistry::from_config(&config).unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownTarget {
                alias: "gallery".to_string(),
                target: "carousel".to_string()
            }
        );
    }

    #[test]
    fn from_config_applies_aliases() {
        let mut config = ShortcodesConfig::default();
        config
            .aliases
            .insert("youtube".to_string(), "video".to_string());
        let registry = ShortcodeRegistry::from_config(&config).unwrap();
        assert!(matches!(registry.get("youtube"), Some(Handler::Inline(_))));
    }
}
