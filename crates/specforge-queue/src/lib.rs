//! Operation, queue, result, and conflict types shared across the specforge
//! processor. No component here touches disk directly; persistence is layered
//! on top via `specforge-util`.

pub mod conflict;
pub mod operation;
pub mod queue;
pub mod result;

pub use conflict::{Conflict, ConflictType};
pub use operation::{normalize_params, Operation, OperationStatus, OperationType};
pub use queue::OperationQueue;
pub use result::{append_result, OperationResult, MAX_RETAINED_RESULTS};
