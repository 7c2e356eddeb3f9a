//! Storage abstraction for kadro.
//!
//! Backend crates (e.g., kadro-store-memory) implement the [`Store`] trait so
//! the tenant core doesn't depend on any specific database engine or schema
//! details. Tenants are the unit of billing and data isolation; they are
//! never hard-deleted, only moved through the lifecycle state machine.

use thiserror::Error;

mod store;
mod types;

pub use store::Store;
pub use types::*;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    /// Optimistic version check failed; the caller saw a stale row.
    #[error("conflict")]
    Conflict,
    #[error("backend error: {0}")]
    Backend(String),
}
