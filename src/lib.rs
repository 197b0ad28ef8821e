//! `specforge` library root: re-exports the pieces the CLI binary wires
//! together. The actual processor lives in `specforge-processor`; this
//! crate's own surface is the `cli` module.

pub mod cli;

pub use specforge_config::Config;
pub use specforge_processor::{Reactor, SyncState};
pub use specforge_util::ExitCode;
