//! Exclusion rules for the walker: exact paths and glob patterns.
//!
//! A pattern containing `/` is matched against the full traversal path; a
//! pattern without one is matched against the final path component only, so
//! `*.tmp` excludes temp files at any depth.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::core::errors::{DendrError, Result};

#[derive(Debug, Clone)]
struct GlobPattern {
    raw: String,
    compiled: Regex,
    basename_only: bool,
}

/// Decides which paths the walker leaves out, subtrees included.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    paths: HashSet<PathBuf>,
    patterns: Vec<GlobPattern>,
}

impl ExclusionFilter {
    pub fn new(excluded_paths: &[PathBuf], patterns: &[String]) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(|raw| {
                Ok(GlobPattern {
                    raw: raw.clone(),
                    compiled: glob_to_regex(raw)?,
                    basename_only: !raw.contains('/'),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            paths: excluded_paths.iter().cloned().collect(),
            patterns: compiled,
        })
    }

    /// Nothing excluded.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.patterns.is_empty()
    }

    /// Whether `path` (as the walker renders it) should be skipped.
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.is_empty() {
            return false;
        }
        if self.paths.contains(path) {
            return true;
        }
        let full = normalize_path_for_matching(path);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        self.patterns.iter().any(|p| {
            if p.basename_only {
                p.compiled.is_match(&name)
            } else {
                p.compiled.is_match(&full)
            }
        })
    }

    /// The source patterns, in configuration order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.raw.as_str())
    }
}

/// Check that a glob pattern compiles.
pub fn validate_glob_pattern(pattern: &str) -> Result<()> {
    if pattern.trim().is_empty() {
        return Err(DendrError::InvalidConfig {
            details: "exclude pattern must not be empty".to_string(),
        });
    }
    glob_to_regex(pattern).map(|_| ())
}

/// Convert a glob to an anchored regex.
///
/// - `**` matches across separators (`**/` also matches nothing)
/// - `*` matches anything except `/`
/// - `?` matches one character except `/`
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let normalized = pattern.replace('\\', "/");
    let mut regex_str = String::with_capacity(pattern.len() * 2);
    regex_str.push('^');

    let chars: Vec<char> = normalized.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    regex_str.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    regex_str.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                regex_str.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                regex_str.push_str("[^/]");
                i += 1;
            }
            c => {
                let mut buf = [0u8; 4];
                regex_str.push_str(&regex::escape(c.encode_utf8(&mut buf)));
                i += 1;
            }
        }
    }
    regex_str.push('$');

    Regex::new(&regex_str).map_err(|err| DendrError::InvalidConfig {
        details: format!("invalid glob pattern {pattern:?}: {err}"),
    })
}

fn normalize_path_for_matching(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
