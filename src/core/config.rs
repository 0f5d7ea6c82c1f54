//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{DendrError, Result};
use crate::snapshot::codec::DecodePolicy;

/// Full dendr configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub scanner: ScannerConfig,
    pub compare: CompareConfig,
    pub logging: LoggingConfig,
    /// Path this config was loaded from (not serialized back).
    #[serde(skip)]
    pub config_file: PathBuf,
}

/// Traversal policy for the sorted walker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScannerConfig {
    pub follow_symlinks: bool,
    pub cross_devices: bool,
    pub max_depth: usize,
    pub excluded_paths: Vec<PathBuf>,
    /// Glob patterns (`*`, `**`, `?`) matched against full paths.
    pub exclude_patterns: Vec<String>,
}

/// Comparison and snapshot decoding knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompareConfig {
    pub decode_policy: DecodePolicy,
    /// Mtimes within this many nanoseconds compare equal. 0 = exact.
    pub mtime_tolerance_ns: u64,
}

/// JSONL run-event log destinations. No primary path disables the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub jsonl_log: Option<PathBuf>,
    pub fallback_path: Option<PathBuf>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            cross_devices: false,
            max_depth: 256,
            excluded_paths: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            decode_policy: DecodePolicy::Lenient,
            mtime_tolerance_ns: 0,
        }
    }
}

impl Config {
    /// Default configuration path: `~/.config/dendr/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!("[DDR-CONFIG] WARNING: HOME not set, falling back to /tmp for config");
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        home_dir.join(".config").join("dendr").join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| DendrError::Io {
                path: path_buf.clone(),
                source,
            })?;
            toml::from_str::<Self>(&raw)?
        } else if is_explicit_path {
            return Err(DendrError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // scanner
        if let Some(raw) = lookup("DENDR_SCANNER_FOLLOW_SYMLINKS") {
            self.scanner.follow_symlinks = parse_env_bool("DENDR_SCANNER_FOLLOW_SYMLINKS", &raw)?;
        }
        if let Some(raw) = lookup("DENDR_SCANNER_CROSS_DEVICES") {
            self.scanner.cross_devices = parse_env_bool("DENDR_SCANNER_CROSS_DEVICES", &raw)?;
        }
        if let Some(raw) = lookup("DENDR_SCANNER_MAX_DEPTH") {
            self.scanner.max_depth = parse_env_usize("DENDR_SCANNER_MAX_DEPTH", &raw)?;
        }

        // compare
        if let Some(raw) = lookup("DENDR_COMPARE_DECODE_POLICY") {
            self.compare.decode_policy =
                raw.parse::<DecodePolicy>()
                    .map_err(|details| DendrError::ConfigParse {
                        context: "env",
                        details: format!("DENDR_COMPARE_DECODE_POLICY={raw:?}: {details}"),
                    })?;
        }
        if let Some(raw) = lookup("DENDR_COMPARE_MTIME_TOLERANCE_NS") {
            self.compare.mtime_tolerance_ns =
                parse_env_u64("DENDR_COMPARE_MTIME_TOLERANCE_NS", &raw)?;
        }

        // logging
        if let Some(raw) = lookup("DENDR_LOGGING_JSONL_LOG") {
            self.logging.jsonl_log = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("DENDR_LOGGING_FALLBACK_PATH") {
            self.logging.fallback_path = Some(PathBuf::from(raw));
        }

        Ok(())
    }

    /// Strip trailing slashes so excluded paths compare equal to walker paths.
    fn normalize_paths(&mut self) {
        for path in &mut self.scanner.excluded_paths {
            let s = path.to_string_lossy();
            if s.len() > 1
                && let Some(stripped) = s.strip_suffix('/')
            {
                *path = PathBuf::from(stripped);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.scanner.max_depth == 0 {
            return Err(DendrError::InvalidConfig {
                details: "scanner.max_depth must be >= 1".to_string(),
            });
        }

        for pattern in &self.scanner.exclude_patterns {
            crate::scanner::filter::validate_glob_pattern(pattern)?;
        }

        if let (Some(primary), Some(fallback)) =
            (&self.logging.jsonl_log, &self.logging.fallback_path)
            && primary == fallback
        {
            return Err(DendrError::InvalidConfig {
                details: "logging.fallback_path must differ from logging.jsonl_log".to_string(),
            });
        }

        // i64 nanoseconds covers ~292 years; anything wider cannot be represented.
        if i64::try_from(self.compare.mtime_tolerance_ns).is_err() {
            return Err(DendrError::InvalidConfig {
                details: format!(
                    "compare.mtime_tolerance_ns too large: {}",
                    self.compare.mtime_tolerance_ns
                ),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>().map_err(|error| DendrError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn parse_env_usize(name: &str, raw: &str) -> Result<usize> {
    raw.parse::<usize>().map_err(|error| DendrError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    raw.parse::<bool>().map_err(|error| DendrError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
