//! Migration file discovery and statement splitting

use crate::schema::SchemaError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// `<version>-<YYYY-MM-DD>.sql`, e.g. `4.1.0-2021-11-28.sql` or `5.0.0-beta1-2023-05-02.sql`
static FILE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<version>\d+(?:\.\d+)*(?:-[A-Za-z][A-Za-z0-9.]*)?)-(?P<date>\d{4}-\d{2}-\d{2})\.sql$")
        .expect("migration file name pattern is valid")
});

/// A discovered migration file
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationFile {
    /// Path to the migration file
    pub path: PathBuf,

    /// File name without `.sql`, e.g. `4.1.0-2021-11-28`
    pub schema_version: String,

    /// Statements in file order
    pub statements: Vec<String>,
}

impl MigrationFile {
    /// Read and split one migration file
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::Io` if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let content = fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            schema_version: schema_version(path),
            statements: split_sql(&content),
        })
    }

    /// File name for diagnostics, e.g. `4.1.0-2021-11-28.sql`
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// File name without `.sql`, e.g. `4.1.0-2021-11-28`
#[must_use]
pub fn schema_version(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Whether a file name follows the `<version>-<date>.sql` convention
#[must_use]
pub fn is_migration_file_name(name: &str) -> bool {
    !name.starts_with('.') && !name.ends_with('~') && FILE_NAME.is_match(name)
}

/// Paths of all migration files in `folder`, in ascending file name order
///
/// A missing or unreadable folder yields an empty list: a fresh install has
/// no migration history yet.
#[must_use]
pub fn migration_paths(folder: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("no migration files in {}: {}", folder.display(), e);
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_migration_file_name)
        })
        .collect();

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    paths
}

/// Discover and split all migration files in `folder`
///
/// Files that vanish or cannot be read between listing and reading are
/// skipped with a warning; they contribute no statements.
#[must_use]
pub fn discover_migrations(folder: &Path) -> Vec<MigrationFile> {
    load_migrations(&migration_paths(folder))
}

/// Read and split the given migration files, skipping unreadable ones with a warning
#[must_use]
pub fn load_migrations(paths: &[PathBuf]) -> Vec<MigrationFile> {
    paths
        .iter()
        .filter_map(|path| match MigrationFile::load(path) {
            Ok(file) => Some(file),
            Err(e) => {
                log::warn!("skipping migration file: {e}");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
enum Scan {
    Code,
    Quoted(char),
    Dollar,
    LineComment,
    BlockComment,
}

/// Split SQL text into statements
///
/// A `;` ends a statement only outside quoted text (`'…'`, `"…"`, `` `…` ``,
/// `$$…$$`). Line comments (`--`, `#` but not `#__`) and block comments are
/// dropped; MySQL `/*! … */` and `/*+ … */` hints are kept. Every statement
/// keeps its terminating `;`, one is added to a trailing unterminated
/// statement, and blank statements are discarded.
#[must_use]
pub fn split_sql(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = Scan::Code;
    let mut i = 0;

    let at = |i: usize, s: &str| s.chars().enumerate().all(|(k, c)| chars.get(i + k) == Some(&c));

    while i < chars.len() {
        let c = chars[i];
        match state {
            Scan::Code => {
                if at(i, "--") || (c == '#' && !at(i, "#__")) {
                    state = Scan::LineComment;
                } else if at(i, "/*") && !at(i, "/*!") && !at(i, "/*+") {
                    state = Scan::BlockComment;
                    i += 1;
                } else if at(i, "$$") {
                    current.push_str("$$");
                    state = Scan::Dollar;
                    i += 1;
                } else if c == ';' {
                    current.push(';');
                    push_statement(&mut statements, &current);
                    current.clear();
                } else {
                    if c == '\'' || c == '"' || c == '`' {
                        state = Scan::Quoted(c);
                    }
                    current.push(c);
                }
            }
            Scan::Quoted(quote) => {
                current.push(c);
                if c == '\\' {
                    if let Some(&next) = chars.get(i + 1) {
                        current.push(next);
                        i += 1;
                    }
                } else if c == quote {
                    state = Scan::Code;
                }
            }
            Scan::Dollar => {
                if at(i, "$$") {
                    current.push_str("$$");
                    state = Scan::Code;
                    i += 1;
                } else {
                    current.push(c);
                }
            }
            Scan::LineComment => {
                if c == '\n' {
                    current.push('\n');
                    state = Scan::Code;
                }
            }
            Scan::BlockComment => {
                if at(i, "*/") {
                    state = Scan::Code;
                    i += 1;
                }
            }
        }
        i += 1;
    }

    let trailing = current.trim();
    if !trailing.is_empty() {
        push_statement(&mut statements, &format!("{trailing};"));
    }

    statements
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let statement = raw.trim();
    if !statement.trim_end_matches(';').trim().is_empty() {
        statements.push(statement.to_string());
    }
}
