//! Resolves the `.specifications/`-style storage subdirectory from the
//! `SPECFORGE_BASE_DIR` / `SPECFORGED_BASE_DIR` environment variables.

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::ConfigError;

const DEFAULT_BASE_DIR_NAME: &str = ".specifications";

/// Resolve the directory specifications are stored under.
///
/// Exactly one of `SPECFORGE_BASE_DIR` / `SPECFORGED_BASE_DIR` may be set; a
/// relative value names a subdirectory of `project_root`, an absolute value
/// overrides the root entirely. If neither is set, `<project_root>/.specifications`
/// is used.
pub fn resolve_base_dir(project_root: &Utf8Path) -> Result<Utf8PathBuf, ConfigError> {
    let primary = std::env::var("SPECFORGE_BASE_DIR").ok();
    let legacy = std::env::var("SPECFORGED_BASE_DIR").ok();

    let chosen = match (primary, legacy) {
        (Some(_), Some(_)) => return Err(ConfigError::AmbiguousBaseDir),
        (Some(v), None) | (None, Some(v)) => v,
        (None, None) => return Ok(project_root.join(DEFAULT_BASE_DIR_NAME)),
    };

    let candidate = Utf8Path::new(&chosen);
    if candidate.is_absolute() {
        Ok(candidate.to_path_buf())
    } else {
        Ok(project_root.join(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        std::env::remove_var("SPECFORGE_BASE_DIR");
        std::env::remove_var("SPECFORGED_BASE_DIR");
    }

    #[test]
    fn defaults_to_dot_specifications() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let root = Utf8Path::new("/project");
        let resolved = resolve_base_dir(root).unwrap();
        assert_eq!(resolved, Utf8Path::new("/project/.specifications"));
    }

    #[test]
    fn relative_override_is_joined_to_root() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("SPECFORGE_BASE_DIR", "specs");
        let resolved = resolve_base_dir(Utf8Path::new("/project")).unwrap();
        assert_eq!(resolved, Utf8Path::new("/project/specs"));
        clear_env();
    }

    #[test]
    fn absolute_override_replaces_root() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("SPECFORGED_BASE_DIR", "/elsewhere/specs");
        let resolved = resolve_base_dir(Utf8Path::new("/project")).unwrap();
        assert_eq!(resolved, Utf8Path::new("/elsewhere/specs"));
        clear_env();
    }

    #[test]
    fn both_set_is_ambiguous() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("SPECFORGE_BASE_DIR", "a");
        std::env::set_var("SPECFORGED_BASE_DIR", "b");
        let err = resolve_base_dir(Utf8Path::new("/project")).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousBaseDir));
        clear_env();
    }
}
