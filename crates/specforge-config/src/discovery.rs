//! Walks upward from a starting directory looking for `.specforge/config.toml`,
//! stopping at the filesystem root or at a repository-root marker if no
//! config file was found by then.

use camino::{Utf8Path, Utf8PathBuf};

const REPO_MARKERS: &[&str] = &[".git", ".hg", ".svn"];
const CONFIG_RELATIVE_PATH: &str = ".specforge/config.toml";

/// Find `.specforge/config.toml` by walking from `start_dir` toward the
/// filesystem root, never looking past the first repository-root marker.
#[must_use]
pub fn discover_config_file_from(start_dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let mut current = start_dir.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_RELATIVE_PATH);
        if candidate.is_file() {
            return Some(candidate);
        }
        if REPO_MARKERS.iter().any(|m| current.join(m).exists()) {
            return None;
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn utf8(p: &std::path::Path) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(p.to_path_buf()).unwrap()
    }

    #[test]
    fn finds_config_in_ancestor() {
        let dir = TempDir::new().unwrap();
        let cfg_dir = dir.path().join(".specforge");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(cfg_dir.join("config.toml"), "").unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        let found = discover_config_file_from(&utf8(&nested)).unwrap();
        assert!(found.as_str().ends_with(".specforge/config.toml"));
    }

    #[test]
    fn stops_at_repo_marker_without_config() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let nested = dir.path().join("a");
        std::fs::create_dir_all(&nested).unwrap();
        assert!(discover_config_file_from(&utf8(&nested)).is_none());
    }

    #[test]
    fn returns_none_when_absent() {
        let dir = TempDir::new().unwrap();
        assert!(discover_config_file_from(&utf8(dir.path())).is_none());
    }
}
