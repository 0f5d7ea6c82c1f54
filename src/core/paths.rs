//! Snapshot locations and path resolution helpers.

use std::env;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Reserved name that stands for stdin (past snapshot) or stdout (next snapshot).
pub const STDIO_SENTINEL: &str = "-";

/// Suffix of the conventional snapshot file name.
pub const INVENTORY_SUFFIX: &str = ".inventory";

/// Where a snapshot is read from or written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotLocation {
    /// Process stdin for the past snapshot, stdout for the next one.
    Stdio,
    /// A named file.
    File(PathBuf),
}

impl SnapshotLocation {
    /// Parse a user-supplied name, honoring the `-` sentinel.
    pub fn parse(raw: &str) -> Self {
        if raw == STDIO_SENTINEL {
            Self::Stdio
        } else {
            Self::File(PathBuf::from(raw))
        }
    }

    /// The backing file, if any.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Stdio => None,
            Self::File(path) => Some(path),
        }
    }

    /// Whether two locations name the same file on disk.
    ///
    /// Stdio never aliases: stdin and stdout are distinct streams.
    pub fn aliases(&self, other: &Self) -> bool {
        match (self.as_path(), other.as_path()) {
            (Some(a), Some(b)) => resolve_absolute_path(a) == resolve_absolute_path(b),
            _ => false,
        }
    }
}

impl fmt::Display for SnapshotLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => f.write_str(STDIO_SENTINEL),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Conventional snapshot file name for a tree name: `NAME.inventory`.
pub fn inventory_file_name_for(name: &str) -> String {
    format!("{name}{INVENTORY_SUFFIX}")
}

/// Resolve a path to an absolute, normalized path.
///
/// Uses `fs::canonicalize` when the path exists, otherwise makes the path
/// absolute relative to CWD and resolves `..`/`.` syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}
