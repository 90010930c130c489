//! Supported database dialects

use crate::schema::SchemaError;
use serde::Serialize;
use std::fmt;

/// Database engine family a change set is verified against
///
/// The set is closed: every dialect carries its own classification rules
/// (see [`crate::schema::rules`]) and quoting conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// MySQL and MariaDB
    Mysql,
    /// PostgreSQL
    Postgresql,
}

impl Dialect {
    /// Map a connection's reported server type to a dialect
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::UnsupportedServerType` for anything else; there is
    /// no sensible default dialect.
    pub fn from_server_type(server_type: &str) -> Result<Self, SchemaError> {
        match server_type.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::Mysql),
            "postgresql" | "postgres" | "pgsql" => Ok(Dialect::Postgresql),
            _ => Err(SchemaError::UnsupportedServerType(server_type.to_string())),
        }
    }

    /// Name of the per-dialect migration subfolder
    #[must_use]
    pub fn folder_name(self) -> &'static str {
        match self {
            Dialect::Mysql => "mysql",
            Dialect::Postgresql => "postgresql",
        }
    }

    /// Quote an identifier (table, column, index name)
    #[must_use]
    pub fn quote_name(self, name: &str) -> String {
        match self {
            Dialect::Mysql => format!("`{}`", name.replace('`', "``")),
            Dialect::Postgresql => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Quote a string literal
    #[must_use]
    pub fn quote(self, value: &str) -> String {
        match self {
            Dialect::Mysql => format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'")),
            Dialect::Postgresql => format!("'{}'", value.replace('\'', "''")),
        }
    }

    /// Strip this dialect's identifier quotes from a name as written in a statement
    #[must_use]
    pub fn unquote_name(self, name: &str) -> String {
        let quote = match self {
            Dialect::Mysql => '`',
            Dialect::Postgresql => '"',
        };
        name.trim_end_matches(';').replace(quote, "")
    }

    /// Storage types a declared column type may have ended up as on the server
    ///
    /// A utf8mb4 conversion widens MySQL text columns by one size class, so a
    /// check must accept either the declared type or the next wider one.
    #[must_use]
    pub fn accepted_types(self, declared: &str, utf8mb4: bool) -> Vec<String> {
        let upper = declared.trim_end_matches(';').to_ascii_uppercase();
        if self == Dialect::Mysql && utf8mb4 {
            let widened = match upper.as_str() {
                "TINYTEXT" => Some("TEXT"),
                "TEXT" => Some("MEDIUMTEXT"),
                "MEDIUMTEXT" => Some("LONGTEXT"),
                _ => None,
            };
            if let Some(widened) = widened {
                return vec![upper, widened.to_string()];
            }
        }
        vec![upper]
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}
