use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("both SPECFORGE_BASE_DIR and SPECFORGED_BASE_DIR are set; specforge cannot infer which takes precedence")]
    AmbiguousBaseDir,

    #[error("project root resolution failed: {0}")]
    ProjectRoot(#[from] specforge_util::SandboxError),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
