//! Output write manifest for incremental builds.
//!
//! Every build renders the whole site in memory, but most pages come out
//! byte-identical to the previous build. This module writes only the files
//! whose content changed and removes files a previous build produced that the
//! current one no longer does (for example the page of a deleted post).
//!
//! # Design
//!
//! The manifest maps each output path (relative to the output directory,
//! `/`-separated) to the SHA-256 of the content written there. A file is
//! skipped when its new hash matches the recorded one **and** the file still
//! exists on disk. Content hashes rather than mtimes, so a fresh checkout of
//! a cached `dist/` is still recognized.
//!
//! ## Atomic writes
//!
//! Files are written to a temporary file in the destination directory,
//! flushed to disk, and renamed over the destination. A crash or a failed
//! write leaves the previous file intact rather than a truncated one.
//!
//! ## Storage
//!
//! The manifest is a JSON file at `<output_dir>/.simple-press-manifest.json`.
//!
//! ## Bypassing the cache
//!
//! Pass `--no-cache` to `build` to rewrite every file. Stale outputs recorded
//! in the previous manifest are still pruned.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Name of the manifest file within the output directory.
const MANIFEST_FILENAME: &str = ".simple-press-manifest.json";

/// Version of the manifest format. Bump this to invalidate all existing
/// manifests when the format or hash computation changes.
const MANIFEST_VERSION: u32 = 1;

/// One file of the generated site.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFile {
    /// Path relative to the output directory, `/`-separated
    pub path: String,
    pub contents: Vec<u8>,
}

impl OutputFile {
    pub fn new(path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// On-disk record of what the last build wrote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputManifest {
    pub version: u32,
    /// Output path → SHA-256 hex of its contents
    pub files: BTreeMap<String, String>,
}

impl OutputManifest {
    /// Create an empty manifest (first build).
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            files: BTreeMap::new(),
        }
    }

    /// Load from the output directory. Returns an empty manifest if the
    /// file doesn't exist or can't be parsed (version mismatch, corruption).
    pub fn load(output_dir: &Path) -> Self {
        let content = match fs::read_to_string(manifest_path(output_dir)) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(m) if m.version == MANIFEST_VERSION => m,
            _ => Self::empty(),
        }
    }

    /// Save to the output directory.
    pub fn save(&self, output_dir: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(&manifest_path(output_dir), json.as_bytes())
    }
}

/// SHA-256 hash of a byte string, returned as a hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Write `contents` to `path` through a temporary sibling file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Summary of one output write pass.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct WriteStats {
    pub written: u32,
    pub unchanged: u32,
    pub removed: u32,
}

impl WriteStats {
    pub fn total(&self) -> u32 {
        self.written + self.unchanged
    }
}

impl fmt::Display for WriteStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unchanged > 0 {
            write!(
                f,
                "{} unchanged, {} written ({} total)",
                self.unchanged,
                self.written,
                self.total()
            )?;
        } else {
            write!(f, "{} written", self.written)?;
        }
        if self.removed > 0 {
            write!(f, ", {} removed", self.removed)?;
        }
        Ok(())
    }
}

/// Write the site's files into `output_dir`.
///
/// With `use_cache`, files whose content matches the previous manifest are
/// left alone. Outputs the previous build recorded but `files` no longer
/// contains are deleted either way. Any I/O error aborts the pass.
pub fn write_outputs(
    output_dir: &Path,
    files: &[OutputFile],
    use_cache: bool,
) -> io::Result<WriteStats> {
    fs::create_dir_all(output_dir)?;
    let previous = OutputManifest::load(output_dir);
    let mut next = OutputManifest::empty();
    let mut stats = WriteStats::default();

    for file in files {
        if !is_safe_relative(&file.path) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to write outside the output directory: {}", file.path),
            ));
        }
        let hash = hash_bytes(&file.contents);
        let dest = output_dir.join(&file.path);

        if use_cache
            && previous.files.get(&file.path) == Some(&hash)
            && dest.exists()
        {
            stats.unchanged += 1;
        } else {
            write_atomic(&dest, &file.contents)?;
            debug!(path = %file.path, "written");
            stats.written += 1;
        }
        next.files.insert(file.path.clone(), hash);
    }

    for stale in previous.files.keys().filter(|p| !next.files.contains_key(*p)) {
        if !is_safe_relative(stale) {
            warn!(path = %stale, "ignoring unsafe path in output manifest");
            continue;
        }
        let path = output_dir.join(stale);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %stale, "removed stale output");
                stats.removed += 1;
                remove_empty_parents(&path, output_dir);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }

    next.save(output_dir)?;
    Ok(stats)
}

/// Relative path made only of normal components.
fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Remove now-empty directories between `path` and `root`.
fn remove_empty_parents(path: &Path, root: &Path) {
    let mut dir = path.parent();
    while let Some(d) = dir {
        if d == root || !d.starts_with(root) || fs::remove_dir(d).is_err() {
            break;
        }
        dir = d.parent();
    }
}

/// Resolve the manifest path for an output directory.
pub fn manifest_path(output_dir: &Path) -> PathBuf {
    output_dir.join(MANIFEST_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn site(files: &[(&str, &str)]) -> Vec<OutputFile> {
        files
            .iter()
            .map(|(path, contents)| OutputFile::new(*path, *contents))
            .collect()
    }

    // =========================================================================
    // OutputManifest basics
    // =========================================================================

    #[test]
    fn load_missing_manifest_is_empty() {
        let tmp = TempDir::new().unwrap();
        let manifest = OutputManifest::load(tmp.path());
        assert_eq!(manifest, OutputManifest::empty());
    }

    #[test]
    fn load_corrupt_manifest_is_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(manifest_path(tmp.path()), "not json {{{").unwrap();
        assert!(OutputManifest::load(tmp.path()).files.is_empty());
    }

    #[test]
    fn load_other_version_is_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            manifest_path(tmp.path()),
            r#"{"version": 999, "files": {"index.html": "abc"}}"#,
        )
        .unwrap();
        assert!(OutputManifest::load(tmp.path()).files.is_empty());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut manifest = OutputManifest::empty();
        manifest
            .files
            .insert("index.html".into(), hash_bytes(b"<html>"));
        manifest.save(tmp.path()).unwrap();
        assert_eq!(OutputManifest::load(tmp.path()), manifest);
    }

    // =========================================================================
    // Hashing and atomic writes
    // =========================================================================

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn write_atomic_replaces_and_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/page.html");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        let entries: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("page.html")]);
    }

    // =========================================================================
    // write_outputs
    // =========================================================================

    #[test]
    fn first_build_writes_everything() {
        let tmp = TempDir::new().unwrap();
        let stats = write_outputs(
            tmp.path(),
            &site(&[("index.html", "home"), ("posts/a/index.html", "a")]),
            true,
        )
        .unwrap();
        assert_eq!(stats.written, 2);
        assert_eq!(stats.unchanged, 0);
        assert_eq!(
            fs::read_to_string(tmp.path().join("posts/a/index.html")).unwrap(),
            "a"
        );
    }

    #[test]
    fn unchanged_files_are_not_rewritten() {
        let tmp = TempDir::new().unwrap();
        let files = site(&[("index.html", "home"), ("a/index.html", "a")]);
        write_outputs(tmp.path(), &files, true).unwrap();

        let changed = site(&[("index.html", "home v2"), ("a/index.html", "a")]);
        let stats = write_outputs(tmp.path(), &changed, true).unwrap();
        assert_eq!(stats.written, 1);
        assert_eq!(stats.unchanged, 1);
        assert_eq!(
            fs::read_to_string(tmp.path().join("index.html")).unwrap(),
            "home v2"
        );
    }

    #[test]
    fn deleted_file_is_rewritten_even_if_recorded() {
        let tmp = TempDir::new().unwrap();
        let files = site(&[("index.html", "home")]);
        write_outputs(tmp.path(), &files, true).unwrap();
        fs::remove_file(tmp.path().join("index.html")).unwrap();

        let stats = write_outputs(tmp.path(), &files, true).unwrap();
        assert_eq!(stats.written, 1);
        assert!(tmp.path().join("index.html").exists());
    }

    #[test]
    fn no_cache_rewrites_everything() {
        let tmp = TempDir::new().unwrap();
        let files = site(&[("index.html", "home"), ("a/index.html", "a")]);
        write_outputs(tmp.path(), &files, true).unwrap();
        let stats = write_outputs(tmp.path(), &files, false).unwrap();
        assert_eq!(stats.written, 2);
        assert_eq!(stats.unchanged, 0);
    }

    #[test]
    fn stale_outputs_are_pruned() {
        let tmp = TempDir::new().unwrap();
        write_outputs(
            tmp.path(),
            &site(&[("index.html", "home"), ("posts/old/index.html", "old")]),
            true,
        )
        .unwrap();

        let stats = write_outputs(tmp.path(), &site(&[("index.html", "home")]), true).unwrap();
        assert_eq!(stats.removed, 1);
        assert!(!tmp.path().join("posts/old/index.html").exists());
        assert!(!tmp.path().join("posts").exists());
        assert!(!OutputManifest::load(tmp.path())
            .files
            .contains_key("posts/old/index.html"));
    }

    #[test]
    fn unrecorded_files_are_left_alone() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("CNAME"), "example.org").unwrap();
        write_outputs(tmp.path(), &site(&[("index.html", "home")]), true).unwrap();
        assert!(tmp.path().join("CNAME").exists());
    }

    #[test]
    fn unsafe_paths_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = write_outputs(tmp.path(), &site(&[("../escape.html", "x")]), true).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn stats_display() {
        let stats = WriteStats {
            written: 2,
            unchanged: 5,
            removed: 1,
        };
        assert_eq!(stats.to_string(), "5 unchanged, 2 written (7 total), 1 removed");
        assert_eq!(WriteStats::default().to_string(), "0 written");
    }
}
