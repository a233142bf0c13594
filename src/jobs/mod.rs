mod job;
mod lifecycle;
mod store;

pub use job::{Job, JobStatus, JobUpdate};
pub use lifecycle::{JobLifecycle, LifecycleError};
pub use store::{FileJobStore, InMemoryJobStore, JobStore, StoreError};
