//! Periodic cleanup of stale ticket data.
//!
//! Each run:
//! 1. Deletes PGT IOUs that were never correlated and are older than two days
//! 2. Drops expired local sessions and their single sign-out mappings

mod worker;

pub use worker::{RetentionError, RetentionRunResult, run_retention, start_retention_worker};
