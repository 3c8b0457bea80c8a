//! Gateway runtime: the stream service plus the process-wide task and
//! idempotency stores.

pub mod idempotency;
pub mod stream;
pub mod tasks;

pub use idempotency::{Acquired, IdempotencyStore};
pub use stream::{ResumeOptions, StreamOptions, StreamService};
pub use tasks::TaskRegistry;
