//! Scripted in-memory executor for tests.
//!
//! `MockExecutor` answers `query_row_count` from a table keyed by the exact
//! SQL text (unscripted queries return `default_rows`), fails queries or
//! statements on request and records every executed statement.

use crate::executor::{DbError, SchemaExecutor};
use std::cell::RefCell;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MockExecutor {
    server_type: String,
    prefix: String,
    utf8mb4: bool,
    default_rows: usize,
    row_counts: RefCell<HashMap<String, usize>>,
    rows_after: RefCell<HashMap<String, (String, usize)>>,
    failing_queries: RefCell<Vec<String>>,
    failing_statements: RefCell<Vec<String>>,
    queries: RefCell<Vec<String>>,
    executed: RefCell<Vec<String>>,
}

impl MockExecutor {
    pub fn new(server_type: &str, prefix: &str) -> Self {
        Self {
            server_type: server_type.to_string(),
            prefix: prefix.to_string(),
            ..Self::default()
        }
    }

    /// MySQL executor with utf8mb4 support
    pub fn mysql(prefix: &str) -> Self {
        Self::new("mysql", prefix).with_utf8mb4(true)
    }

    pub fn postgresql(prefix: &str) -> Self {
        Self::new("postgresql", prefix)
    }

    #[must_use]
    pub fn with_utf8mb4(mut self, supported: bool) -> Self {
        self.utf8mb4 = supported;
        self
    }

    /// Row count returned for queries without a scripted answer
    #[must_use]
    pub fn with_default_rows(mut self, rows: usize) -> Self {
        self.default_rows = rows;
        self
    }

    pub fn set_rows(&self, sql: &str, rows: usize) {
        self.row_counts.borrow_mut().insert(sql.to_string(), rows);
    }

    /// Once `statement` has executed, `query` returns `rows`
    pub fn set_rows_after(&self, statement: &str, query: &str, rows: usize) {
        self.rows_after
            .borrow_mut()
            .insert(statement.to_string(), (query.to_string(), rows));
    }

    pub fn fail_query(&self, sql: &str) {
        self.failing_queries.borrow_mut().push(sql.to_string());
    }

    pub fn fail_statement(&self, sql: &str) {
        self.failing_statements.borrow_mut().push(sql.to_string());
    }

    /// Read queries issued so far, in order
    pub fn queries(&self) -> Vec<String> {
        self.queries.borrow().clone()
    }

    /// Statements executed so far, in order
    pub fn executed(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }
}

impl SchemaExecutor for MockExecutor {
    fn server_type(&self) -> &str {
        &self.server_type
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn has_utf8mb4_support(&self) -> bool {
        self.utf8mb4
    }

    fn execute(&self, sql: &str) -> Result<u64, DbError> {
        if self.failing_statements.borrow().iter().any(|s| s == sql) {
            return Err(DbError::Query(format!("statement rejected: {sql}")));
        }
        self.executed.borrow_mut().push(sql.to_string());
        if let Some((query, rows)) = self.rows_after.borrow().get(sql) {
            self.set_rows(query, *rows);
        }
        Ok(0)
    }

    fn query_row_count(&self, sql: &str) -> Result<usize, DbError> {
        self.queries.borrow_mut().push(sql.to_string());
        if self.failing_queries.borrow().iter().any(|s| s == sql) {
            return Err(DbError::Query(format!("query rejected: {sql}")));
        }
        Ok(self
            .row_counts
            .borrow()
            .get(sql)
            .copied()
            .unwrap_or(self.default_rows))
    }
}
