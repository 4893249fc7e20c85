//! Cooperative job scheduling for request processing.

pub mod queue;

pub use queue::{JobCoro, JobQueue, JobStats, JobType};
