//! Project-root resolution and path sandboxing (spec §4.A).
//!
//! Resolution precedence: explicit argument > `WORKSPACE_FOLDER_PATHS` editor
//! hint > `SPECFORGE_PROJECT_ROOT` (absolute and existing) > `PWD` (existing) >
//! current directory. Each candidate then ascends toward a repository marker.
//! Once resolved, [`SandboxRoot::validate`] rejects any path that would escape
//! the root.

use camino::{Utf8Path, Utf8PathBuf};
use std::env;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Filesystem markers that identify a repository/project root.
const ROOT_MARKERS: &[&str] = &[".git", "pyproject.toml", "package.json", "Cargo.toml", "go.mod"];

/// Bound on how many parent directories the marker walk may climb.
const MAX_WALK_DEPTH: usize = 64;

/// Well-known directories a sandbox root must never equal or be nested under.
const SYSTEM_DIRS: &[&str] = &[
    "/", "/usr", "/usr/bin", "/usr/lib", "/bin", "/sbin", "/etc", "/var", "/sys", "/proc", "/dev",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("project root does not exist: {path}")]
    RootNotFound { path: String },
    #[error("project root is not a directory: {path}")]
    RootNotDirectory { path: String },
    #[error("project root is a system directory: {path}")]
    RootIsSystemDirectory { path: String },
    #[error("project root is too shallow: {path}")]
    RootTooShallow { path: String },
    #[error("failed to canonicalize '{path}': {reason}")]
    CanonicalizationFailed { path: String, reason: String },
    #[error("path contains parent directory traversal: {path}")]
    ParentTraversal { path: String },
    #[error("path escapes project root: {path} resolves outside {root}")]
    EscapeAttempt { path: String, root: String },
}

/// A validated project root. All paths joined through it are guaranteed to
/// stay within it.
#[derive(Debug, Clone)]
pub struct SandboxRoot {
    root: PathBuf,
}

impl SandboxRoot {
    /// Canonicalize and validate `root` as a sandbox root (the secondary
    /// guard of §4.A: reject shallow roots and well-known system directories).
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let root_path = root.as_ref();

        if !root_path.exists() {
            return Err(SandboxError::RootNotFound {
                path: root_path.display().to_string(),
            });
        }
        if !root_path.is_dir() {
            return Err(SandboxError::RootNotDirectory {
                path: root_path.display().to_string(),
            });
        }

        let canonical = root_path
            .canonicalize()
            .map_err(|e| SandboxError::CanonicalizationFailed {
                path: root_path.display().to_string(),
                reason: e.to_string(),
            })?;

        if canonical.components().count() <= 2 {
            return Err(SandboxError::RootTooShallow {
                path: canonical.display().to_string(),
            });
        }

        for sys_dir in SYSTEM_DIRS {
            let sys_path = Path::new(sys_dir);
            if canonical == sys_path || canonical.starts_with(sys_path) && *sys_dir != "/" {
                return Err(SandboxError::RootIsSystemDirectory {
                    path: canonical.display().to_string(),
                });
            }
        }
        if canonical == Path::new("/") {
            return Err(SandboxError::RootIsSystemDirectory {
                path: canonical.display().to_string(),
            });
        }

        Ok(Self { root: canonical })
    }

    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn as_utf8_path(&self) -> &Utf8Path {
        Utf8Path::from_path(&self.root).unwrap_or_else(|| Utf8Path::new("."))
    }

    /// Validate an arbitrary (possibly absolute) path against this root,
    /// returning its canonical form. No `..` components are permitted; the
    /// result, once canonicalized, must lie at or under the root.
    pub fn validate(&self, candidate: impl AsRef<Path>) -> Result<Utf8PathBuf, SandboxError> {
        let candidate = candidate.as_ref();

        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(SandboxError::ParentTraversal {
                path: candidate.display().to_string(),
            });
        }

        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        let canonical = if joined.exists() {
            joined
                .canonicalize()
                .map_err(|e| SandboxError::CanonicalizationFailed {
                    path: joined.display().to_string(),
                    reason: e.to_string(),
                })?
        } else {
            joined
        };

        if canonical != self.root && !canonical.starts_with(&self.root) {
            return Err(SandboxError::EscapeAttempt {
                path: candidate.display().to_string(),
                root: self.root.display().to_string(),
            });
        }

        Ok(Utf8PathBuf::from_path_buf(canonical).unwrap_or_else(|_| self.as_utf8_path().to_owned()))
    }

    /// Join a relative path without requiring it to exist yet (used when
    /// creating new specification directories).
    pub fn join(&self, rel: impl AsRef<Path>) -> Result<Utf8PathBuf, SandboxError> {
        let rel = rel.as_ref();
        if rel.is_absolute() || rel.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(SandboxError::ParentTraversal {
                path: rel.display().to_string(),
            });
        }
        let joined = self.root.join(rel);
        Ok(Utf8PathBuf::from_path_buf(joined).unwrap_or_else(|_| self.as_utf8_path().to_owned()))
    }
}

/// Resolve the project root per §4.A's precedence list.
///
/// `explicit` takes priority over everything. Each environment-derived
/// candidate is then walked upward (bounded at [`MAX_WALK_DEPTH`]) looking
/// for a repository marker; if none is found the candidate itself is used.
pub fn resolve_project_root(explicit: Option<&Path>) -> Result<SandboxRoot, SandboxError> {
    let candidate = explicit
        .map(PathBuf::from)
        .or_else(workspace_folder_paths_hint)
        .or_else(specforge_project_root_env)
        .or_else(pwd_env)
        .unwrap_or_else(|| PathBuf::from("."));

    let walked = walk_to_marker(&candidate);
    SandboxRoot::new(walked)
}

fn workspace_folder_paths_hint() -> Option<PathBuf> {
    let raw = env::var("WORKSPACE_FOLDER_PATHS").ok()?;
    first_existing_from_hint(&raw)
}

/// `WORKSPACE_FOLDER_PATHS` may hold a single path, a JSON array of paths, or
/// a platform path-list (`:` on Unix, `;` on Windows). The first existing
/// directory wins.
fn first_existing_from_hint(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('[') {
        if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(trimmed) {
            for item in items {
                if let Some(s) = item.as_str() {
                    let p = PathBuf::from(s);
                    if p.is_dir() {
                        return Some(p);
                    }
                }
            }
            return None;
        }
    }

    for sep in [':', ';'] {
        if trimmed.contains(sep) {
            for part in trimmed.split(sep) {
                let p = PathBuf::from(part.trim());
                if p.is_dir() {
                    return Some(p);
                }
            }
            return None;
        }
    }

    let p = PathBuf::from(trimmed);
    p.is_dir().then_some(p)
}

fn specforge_project_root_env() -> Option<PathBuf> {
    let raw = env::var("SPECFORGE_PROJECT_ROOT").ok()?;
    let p = PathBuf::from(raw);
    (p.is_absolute() && p.exists()).then_some(p)
}

fn pwd_env() -> Option<PathBuf> {
    let raw = env::var("PWD").ok()?;
    let p = PathBuf::from(raw);
    p.exists().then_some(p)
}

fn walk_to_marker(start: &Path) -> PathBuf {
    let mut current = start.to_path_buf();
    for _ in 0..MAX_WALK_DEPTH {
        if ROOT_MARKERS.iter().any(|m| current.join(m).exists()) {
            return current;
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
    start.to_path_buf()
}

/// Ensure a directory (and its parents) exist, tolerating benign races.
pub fn ensure_dir_all<P: AsRef<Path>>(p: P) -> std::io::Result<()> {
    match std::fs::create_dir_all(&p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rejects_nonexistent_root() {
        let err = SandboxRoot::new("/no/such/path/at/all").unwrap_err();
        assert!(matches!(err, SandboxError::RootNotFound { .. }));
    }

    #[test]
    fn rejects_shallow_root() {
        // "/tmp" itself canonicalizes to 2 components on most systems; use "/"
        let err = SandboxRoot::new("/").unwrap_err();
        assert!(matches!(
            err,
            SandboxError::RootTooShallow { .. } | SandboxError::RootIsSystemDirectory { .. }
        ));
    }

    #[test]
    fn validate_accepts_descendant_path() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let root = SandboxRoot::new(dir.path()).unwrap();
        let validated = root.validate("sub").unwrap();
        assert!(validated.as_str().ends_with("sub"));
    }

    #[test]
    fn validate_rejects_parent_traversal() {
        let dir = TempDir::new().unwrap();
        let root = SandboxRoot::new(dir.path()).unwrap();
        let err = root.validate("../escape").unwrap_err();
        assert!(matches!(err, SandboxError::ParentTraversal { .. }));
    }

    #[test]
    fn validate_rejects_absolute_escape() {
        let dir = TempDir::new().unwrap();
        let root = SandboxRoot::new(dir.path()).unwrap();
        let err = root.validate("/etc/passwd").unwrap_err();
        assert!(matches!(err, SandboxError::EscapeAttempt { .. }));
    }

    #[test]
    fn join_builds_nonexistent_path_under_root() {
        let dir = TempDir::new().unwrap();
        let root = SandboxRoot::new(dir.path()).unwrap();
        let joined = root.join("new-spec/spec.json").unwrap();
        assert!(joined.as_str().contains("new-spec"));
    }

    #[test]
    fn workspace_folder_paths_parses_json_array() {
        let dir = TempDir::new().unwrap();
        let raw = format!("[\"/no/such/dir\", \"{}\"]", dir.path().display());
        let resolved = first_existing_from_hint(&raw).unwrap();
        assert_eq!(resolved, dir.path());
    }

    #[test]
    fn workspace_folder_paths_parses_delimiter_list() {
        let dir = TempDir::new().unwrap();
        let raw = format!("/no/such/dir:{}", dir.path().display());
        let resolved = first_existing_from_hint(&raw).unwrap();
        assert_eq!(resolved, dir.path());
    }

    #[test]
    fn walk_to_marker_finds_cargo_toml_ancestor() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        let found = walk_to_marker(&nested);
        assert_eq!(found, dir.path());
    }
}
