//! `db` crate — pure persistence layer.
//!
//! Provides a connection pool, typed row structs, and repository functions
//! for workflow storage, run history, and credentials. No business logic
//! lives here; the engine never touches this crate — callers look up
//! workflows, hand the engine a [`PgCredentialStore`], and append the
//! finished run record themselves.

pub mod error;
pub mod pool;
pub mod models;
pub mod repository;
pub mod credentials;

pub use credentials::PgCredentialStore;
pub use error::DbError;
pub use pool::DbPool;
