//! Task supervision: spawning the node's long-running components, watching
//! for failures, propagating cancellation and aggregating readiness.

pub mod manager;
pub mod readiness;
pub mod shutdown;

pub use manager::{FailedTaskError, TaskExecutor, TaskManager};
pub use readiness::{Readiness, ReadySignal};
pub use shutdown::{ShutdownGuard, ShutdownSignal};
