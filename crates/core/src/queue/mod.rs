//! Job queue scheduler.
//!
//! The queue manager admits queued jobs into the executor pool up to its
//! capacity and reconciles each result against the live store:
//! - **Canceled** jobs are released without committing anything
//! - **Stale** results (the generation moved on) are requeued
//! - Everything else is committed as done, warning or error

mod manager;
mod types;

pub use manager::QueueManager;
pub use types::QueueStatus;
