//! Storage layer for the Poros registry: the agent directory and the
//! orchestration audit log.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode
//! initialization, embedded SQL migrations, and the store functions the
//! registry and orchestrator call. Every table is created through
//! versioned migrations owned by this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: the registry is a single-node service; WAL
//!   gives concurrent readers with one writer, which matches the
//!   read-mostly directory access pattern.
//! - **`r2d2` pool**: bounded connection reuse; callers run store functions
//!   under `spawn_blocking` and never hold a connection across an await.
//! - **Embedded migrations**: SQL ships inside the binary via
//!   `include_str!` and cannot drift from the code that depends on it.
//! - **Cards stored verbatim**: the submitted AgentCard JSON is kept
//!   byte-preserving in its own column so signatures stay verifiable;
//!   filterable fields are denormalized alongside it.

mod error;
mod migrations;
mod pool;

pub mod agents;
pub mod logs;

pub use error::StoreError;
pub use migrations::run_migrations;
pub use pool::{open_pool, DbPool, DbSettings};
