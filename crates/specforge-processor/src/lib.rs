//! Async tick-based reactor that drains the specforge operation queue:
//! selection, idempotency, conflict resolution, batching, dispatch, retry,
//! and periodic background optimization.

pub mod backoff;
pub mod handlers;
pub mod optimizer;
pub mod reactor;
pub mod sync_state;

pub use handlers::{dispatch, HandlerOutcome};
pub use reactor::{Reactor, TickReport, QUEUE_FILE, RESULTS_FILE, STOP_GRACE_SECS};
pub use sync_state::SyncState;
