//! Specification domain model, markdown rendering, and on-disk persistence.
//!
//! This crate owns the "Specification Store" component: it reads and writes
//! `spec.json` plus three rendered markdown companions per specification,
//! under a sandboxed base directory.

pub mod markdown;
pub mod model;
pub mod numbering;
pub mod phase;
pub mod plan;
pub mod slug;
pub mod store;

pub use model::{DesignDocument, EarsRequirement, Phase, SpecStatus, Specification, Task, TaskStatus, UserStory};
pub use plan::generate_implementation_plan;
pub use slug::derive_slug;
pub use store::SpecificationStore;
