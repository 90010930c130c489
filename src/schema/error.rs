//! Schema verification errors and the error-collection sink

use crate::executor::DbError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or running a change set
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The connection reported a server type no dialect handles
    #[error("Unsupported database server type: {0}")]
    UnsupportedServerType(String),

    /// A check or fix statement failed on the server
    #[error("{context}: {source}")]
    Database {
        context: String,
        #[source]
        source: DbError,
    },

    /// A migration file could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SchemaError {
    pub(crate) fn database(context: impl Into<String>, source: DbError) -> Self {
        SchemaError::Database {
            context: context.into(),
            source,
        }
    }
}

/// Receives non-fatal failures from check and fix passes
///
/// `context` names the operation and statement source, e.g.
/// `check 4.1.0-2021-11-28.sql`. Collectors must not panic; a failing item
/// never aborts the pass.
pub trait ErrorCollector {
    fn collect(&self, context: &str, error: &SchemaError);
}

impl<F> ErrorCollector for F
where
    F: Fn(&str, &SchemaError),
{
    fn collect(&self, context: &str, error: &SchemaError) {
        self(context, error)
    }
}

/// Default collector: writes to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCollector;

impl ErrorCollector for LogCollector {
    fn collect(&self, context: &str, error: &SchemaError) {
        log::warn!("{context}: {error}");
    }
}
