//! # Schemaguard
//!
//! Schema change verification for versioned SQL migration folders.
//!
//! Given a folder of `<version>-<date>.sql` files and a live MySQL or
//! PostgreSQL connection, schemaguard works out which structural changes are
//! already in place, reports the missing ones and can re-run them.
//!
//! See the [`schema`] module for the verification engine.

pub mod config;
pub mod connection;
pub mod executor;
pub mod metrics;
pub mod schema;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::SchemaConfig;
pub use connection::{connect, ConnectionError, PostgresExecutor};
pub use executor::{DbError, SchemaExecutor};
pub use schema::{
    ChangeItem, ChangeSet, CheckStatus, Dialect, ErrorCollector, LogCollector, QueryType,
    SchemaError, SchemaStatus, StatusSummary,
};
