//! Shared database repository tests
//!
//! Each repository has a test module containing shared test functions that
//! take `&dyn XxxRepo`, plus a backend-specific module per implementation:
//!
//! - **Memory**: always compiled
//! - **SQLite**: in-memory databases with the real migrations
//! - **PostgreSQL**: testcontainers, marked `#[ignore]`
//!
//! # Running tests
//!
//! ```bash
//! cargo test                       # memory + SQLite
//! cargo test -- --ignored          # PostgreSQL (requires Docker)
//! ```

mod session_tickets;
mod tickets;
