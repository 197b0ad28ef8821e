//! Project-root discovery, base-directory resolution, and tunable processor
//! knobs for specforge.

pub mod base_dir;
pub mod discovery;
pub mod error;
pub mod tuning;

pub use error::ConfigError;
pub use tuning::TuningConfig;

use camino::Utf8PathBuf;

/// Fully-resolved runtime configuration: where the project lives, where
/// specifications are stored, and how the processor should be tuned.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_root: Utf8PathBuf,
    pub base_dir: Utf8PathBuf,
    pub tuning: TuningConfig,
}

impl Config {
    /// Resolve the full configuration: project root (§4.A precedence),
    /// base-directory (§9 ambiguity check), and tuning knobs from an
    /// optional `.specforge/config.toml` discovered by walking up from the
    /// resolved project root.
    pub fn resolve(explicit_root: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let sandbox_root = specforge_util::resolve_project_root(explicit_root)?;
        let project_root = sandbox_root.as_utf8_path().to_path_buf();

        let base_dir = base_dir::resolve_base_dir(&project_root)?;

        let config_file = discovery::discover_config_file_from(&project_root);
        let tuning = TuningConfig::load(config_file.as_deref())?;

        Ok(Self {
            project_root,
            base_dir,
            tuning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolve_uses_explicit_root_and_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        let config = Config::resolve(Some(dir.path())).unwrap();
        assert_eq!(
            config.base_dir,
            config.project_root.join(".specifications")
        );
        assert_eq!(config.tuning.batch_capacity, 50);
    }
}
