//! Change items: one verifiable schema fact per migration statement

use crate::executor::SchemaExecutor;
use crate::schema::rules::{classify, RuleContext};
use crate::schema::{Dialect, ErrorCollector, SchemaError};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use std::time::Instant;

/// Statements whose character set clauses are downgraded on servers without utf8mb4
static TABLE_DDL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:ALTER|CREATE)\s+TABLE\s").expect("table DDL pattern is valid")
});

/// Quoted text is matched first so `utf8mb4` inside it is kept as written
static UTF8MB4_OUTSIDE_QUOTES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?P<quoted>`[^`]*`|"[^"]*"|'[^']*')|utf8mb4"#)
        .expect("utf8mb4 pattern is valid")
});

/// Shape of schema change a statement performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    CreateTable,
    RenameTable,
    AddColumn,
    DropColumn,
    RenameColumn,
    ChangeColumnType,
    AddIndex,
    DropIndex,
    RenameIndex,
    #[serde(rename = "UTF8_CONVERSION_UTF8MB4")]
    Utf8ConversionUtf8mb4,
    Unrecognized,
}

impl QueryType {
    /// Stable name used by message templates, e.g. `ADD_COLUMN`
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QueryType::CreateTable => "CREATE_TABLE",
            QueryType::RenameTable => "RENAME_TABLE",
            QueryType::AddColumn => "ADD_COLUMN",
            QueryType::DropColumn => "DROP_COLUMN",
            QueryType::RenameColumn => "RENAME_COLUMN",
            QueryType::ChangeColumnType => "CHANGE_COLUMN_TYPE",
            QueryType::AddIndex => "ADD_INDEX",
            QueryType::DropIndex => "DROP_INDEX",
            QueryType::RenameIndex => "RENAME_INDEX",
            QueryType::Utf8ConversionUtf8mb4 => "UTF8_CONVERSION_UTF8MB4",
            QueryType::Unrecognized => "UNRECOGNIZED",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verification state of a change item
///
/// Serializes as its integer code: `0` unchecked, `1` ok, `-1` skipped, `-2` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CheckStatus {
    #[default]
    Unchecked,
    Ok,
    Skipped,
    Error,
}

impl CheckStatus {
    #[must_use]
    pub fn code(self) -> i8 {
        match self {
            CheckStatus::Unchecked => 0,
            CheckStatus::Ok => 1,
            CheckStatus::Skipped => -1,
            CheckStatus::Error => -2,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Unchecked => "unchecked",
            CheckStatus::Ok => "ok",
            CheckStatus::Skipped => "skipped",
            CheckStatus::Error => "error",
        }
    }
}

impl Serialize for CheckStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.code())
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One migration statement and what it takes to prove it has been applied
///
/// Classification happens once, at construction. An item whose statement
/// could not be turned into a check query starts (and stays) `Skipped`.
///
/// # Examples
///
/// ```
/// use schemaguard::schema::{ChangeItem, CheckStatus, Dialect, QueryType};
/// use schemaguard::{DbError, SchemaExecutor};
///
/// struct Offline;
///
/// impl SchemaExecutor for Offline {
///     fn server_type(&self) -> &str { "mysql" }
///     fn prefix(&self) -> &str { "jos_" }
///     fn execute(&self, _: &str) -> Result<u64, DbError> { Ok(0) }
///     fn query_row_count(&self, _: &str) -> Result<usize, DbError> { Ok(0) }
/// }
///
/// let db = Offline;
/// let item = ChangeItem::with_dialect(
///     Dialect::Mysql,
///     &db,
///     "4.1.0-2021-11-28.sql",
///     "ALTER TABLE `#__foo` ADD COLUMN `bar` text;",
/// );
///
/// assert_eq!(item.query_type(), QueryType::AddColumn);
/// assert_eq!(item.check_query(), Some("SHOW COLUMNS IN `jos_foo` WHERE field = 'bar'"));
/// assert_eq!(item.check_status(), CheckStatus::Unchecked);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeItem {
    dialect: Dialect,
    source_file: String,
    update_statement: String,
    query_type: QueryType,
    check_query: Option<String>,
    expected_rows: usize,
    message_elements: Vec<String>,
    check_status: CheckStatus,
    rerun_status: CheckStatus,
}

impl ChangeItem {
    /// Classify a statement for the dialect the executor reports
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::UnsupportedServerType` if the executor's server
    /// type maps to no dialect.
    pub fn new(
        db: &dyn SchemaExecutor,
        source_file: impl Into<String>,
        update_statement: impl Into<String>,
    ) -> Result<Self, SchemaError> {
        let dialect = Dialect::from_server_type(db.server_type())?;
        Ok(Self::with_dialect(dialect, db, source_file, update_statement))
    }

    /// Classify a statement for a known dialect
    ///
    /// The executor supplies the table prefix and the utf8mb4 capability; no
    /// query is run.
    pub fn with_dialect(
        dialect: Dialect,
        db: &dyn SchemaExecutor,
        source_file: impl Into<String>,
        update_statement: impl Into<String>,
    ) -> Self {
        let update_statement = update_statement.into();
        let ctx = RuleContext {
            dialect,
            prefix: db.prefix(),
            utf8mb4: db.has_utf8mb4_support(),
        };

        let mut item = Self {
            dialect,
            source_file: source_file.into(),
            update_statement: String::new(),
            query_type: QueryType::Unrecognized,
            check_query: None,
            expected_rows: 1,
            message_elements: Vec::new(),
            check_status: CheckStatus::Skipped,
            rerun_status: CheckStatus::Unchecked,
        };

        if let Some(found) = classify(&ctx, &update_statement) {
            item.query_type = found.query_type;
            item.expected_rows = found.expected_rows;
            item.message_elements = found.message_elements;
            if found.check_query.is_some() {
                item.check_status = CheckStatus::Unchecked;
            }
            item.check_query = found.check_query;
        }
        item.update_statement = update_statement;
        item
    }

    /// An item that only verifies state and has no statement to run
    pub(crate) fn verification_only(
        dialect: Dialect,
        query_type: QueryType,
        check_query: String,
        expected_rows: usize,
    ) -> Self {
        Self {
            dialect,
            source_file: String::new(),
            update_statement: String::new(),
            query_type,
            check_query: Some(check_query),
            expected_rows,
            message_elements: Vec::new(),
            check_status: CheckStatus::Unchecked,
            rerun_status: CheckStatus::Unchecked,
        }
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Migration file the statement came from; empty for synthetic items
    #[must_use]
    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    #[must_use]
    pub fn update_statement(&self) -> &str {
        &self.update_statement
    }

    #[must_use]
    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    #[must_use]
    pub fn check_query(&self) -> Option<&str> {
        self.check_query.as_deref()
    }

    /// Rows the check query returns once the change is in place
    #[must_use]
    pub fn expected_rows(&self) -> usize {
        self.expected_rows
    }

    /// Quoted names and types for diagnostic messages
    #[must_use]
    pub fn message_elements(&self) -> &[String] {
        &self.message_elements
    }

    #[must_use]
    pub fn check_status(&self) -> CheckStatus {
        self.check_status
    }

    /// Outcome of the most recent `fix`
    #[must_use]
    pub fn rerun_status(&self) -> CheckStatus {
        self.rerun_status
    }

    /// Whether a check query could be built for the statement
    #[must_use]
    pub fn is_verifiable(&self) -> bool {
        self.check_query.as_deref().is_some_and(|q| !q.is_empty())
    }

    /// Run the check query and record the result
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::Database` if the check query fails; the item is
    /// left in `CheckStatus::Error`.
    pub fn try_check(&mut self, db: &dyn SchemaExecutor) -> Result<CheckStatus, SchemaError> {
        let Some(query) = self.check_query.as_deref().filter(|q| !q.is_empty()) else {
            self.check_status = CheckStatus::Skipped;
            return Ok(CheckStatus::Skipped);
        };

        let started = Instant::now();
        let result = db.query_row_count(query);

        let status = match &result {
            Ok(rows) if *rows == self.expected_rows => CheckStatus::Ok,
            _ => CheckStatus::Error,
        };
        self.check_status = status;

        #[cfg(feature = "metrics")]
        crate::metrics::METRICS.record_check(status.as_str(), started.elapsed());

        match result {
            Ok(rows) => {
                log::debug!(
                    "{} {} in {}: {} row(s), expected {} ({:?})",
                    status,
                    self.query_type,
                    self.source_file,
                    rows,
                    self.expected_rows,
                    started.elapsed()
                );
                Ok(status)
            }
            Err(e) => Err(SchemaError::database(self.describe("check"), e)),
        }
    }

    /// Run the check query, reporting failures to `collector`
    pub fn check(
        &mut self,
        db: &dyn SchemaExecutor,
        collector: &dyn ErrorCollector,
    ) -> CheckStatus {
        match self.try_check(db) {
            Ok(status) => status,
            Err(e) => {
                collector.collect("check", &e);
                self.check_status
            }
        }
    }

    /// Run the update statement and re-check
    ///
    /// Items already `Ok` are left alone. Items without a check query, or
    /// without a statement to run, are never executed and report
    /// `Skipped` as their rerun status. If the statement fails the rerun
    /// status is `Error` and the check status keeps its previous value.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::Database` if the update statement or the
    /// follow-up check fails.
    pub fn try_fix(&mut self, db: &dyn SchemaExecutor) -> Result<CheckStatus, SchemaError> {
        if self.check_status == CheckStatus::Ok {
            return Ok(CheckStatus::Ok);
        }
        if !self.is_verifiable() || self.update_statement.trim().is_empty() {
            self.rerun_status = CheckStatus::Skipped;
            self.record_fix();
            return Ok(CheckStatus::Skipped);
        }

        let statement = self.fix_statement(db.has_utf8mb4_support());
        if let Err(e) = db.execute(&statement) {
            self.rerun_status = CheckStatus::Error;
            self.record_fix();
            return Err(SchemaError::database(self.describe("fix"), e));
        }

        let rerun = self.try_check(db);
        self.rerun_status = match &rerun {
            Ok(status) => *status,
            Err(_) => CheckStatus::Error,
        };
        self.record_fix();
        rerun
    }

    /// Run the update statement and re-check, reporting failures to `collector`
    pub fn fix(&mut self, db: &dyn SchemaExecutor, collector: &dyn ErrorCollector) -> CheckStatus {
        match self.try_fix(db) {
            Ok(status) => status,
            Err(e) => {
                collector.collect("fix", &e);
                self.rerun_status
            }
        }
    }

    /// The statement `fix` executes
    ///
    /// On MySQL servers without utf8mb4 support, `utf8mb4` outside quoted
    /// text in `CREATE TABLE`/`ALTER TABLE` statements becomes `utf8`.
    #[must_use]
    pub fn fix_statement(&self, utf8mb4: bool) -> Cow<'_, str> {
        if self.dialect == Dialect::Mysql
            && !utf8mb4
            && TABLE_DDL.is_match(&self.update_statement)
        {
            UTF8MB4_OUTSIDE_QUOTES.replace_all(&self.update_statement, |c: &Captures<'_>| {
                c.name("quoted").map_or_else(|| "utf8".to_string(), |m| m.as_str().to_string())
            })
        } else {
            Cow::Borrowed(&self.update_statement)
        }
    }

    fn describe(&self, operation: &str) -> String {
        if self.source_file.is_empty() {
            format!("{operation} {}", self.query_type)
        } else {
            format!("{operation} {} in {}", self.query_type, self.source_file)
        }
    }

    fn record_fix(&self) {
        log::debug!("fix {} in {}: {}", self.query_type, self.source_file, self.rerun_status);
        #[cfg(feature = "metrics")]
        crate::metrics::METRICS.record_fix(self.rerun_status.as_str());
    }

    #[cfg(test)]
    pub(crate) fn set_check_status(&mut self, status: CheckStatus) {
        self.check_status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LogCollector;
    use crate::test_helpers::MockExecutor;
    use std::cell::RefCell;

    fn mysql_item(utf8mb4: bool, sql: &str) -> ChangeItem {
        let db = MockExecutor::mysql("jos_").with_utf8mb4(utf8mb4);
        ChangeItem::new(&db, "4.1.0-2021-11-28.sql", sql).unwrap()
    }

    fn pg_item(sql: &str) -> ChangeItem {
        let db = MockExecutor::postgresql("jos_");
        ChangeItem::new(&db, "4.1.0-2021-11-28.sql", sql).unwrap()
    }

    #[test]
    fn test_mysql_statement_fixtures() {
        let cases: &[(&str, bool, QueryType, &str, usize, &[&str])] = &[
            (
                "ALTER TABLE `#__foo` ADD COLUMN `bar` text",
                true,
                QueryType::AddColumn,
                "SHOW COLUMNS IN `jos_foo` WHERE field = 'bar'",
                1,
                &["'jos_foo'", "'bar'"],
            ),
            (
                "ALTER TABLE #__foo ADD COLUMN bar text",
                true,
                QueryType::AddColumn,
                "SHOW COLUMNS IN `jos_foo` WHERE field = 'bar'",
                1,
                &["'jos_foo'", "'bar'"],
            ),
            (
                "ALTER TABLE `#__foo` ADD INDEX `idx_bar`(`bar`)",
                true,
                QueryType::AddIndex,
                "SHOW INDEXES IN `jos_foo` WHERE Key_name = 'idx_bar'",
                1,
                &["'jos_foo'", "'idx_bar'"],
            ),
            (
                "ALTER TABLE `#__foo` ADD UNIQUE INDEX `idx_bar` (`bar`)",
                true,
                QueryType::AddIndex,
                "SHOW INDEXES IN `jos_foo` WHERE Key_name = 'idx_bar'",
                1,
                &["'jos_foo'", "'idx_bar'"],
            ),
            (
                "ALTER TABLE `#__foo` ADD UNIQUE KEY `idx_bar`(`bar`)",
                true,
                QueryType::AddIndex,
                "SHOW INDEXES IN `jos_foo` WHERE Key_name = 'idx_bar'",
                1,
                &["'jos_foo'", "'idx_bar'"],
            ),
            (
                "ALTER TABLE `#__foo` CHANGE `bar` `bar_new` mediumtext",
                false,
                QueryType::ChangeColumnType,
                "SHOW COLUMNS IN `jos_foo` WHERE field = 'bar_new' AND UPPER(type) = 'MEDIUMTEXT'",
                1,
                &["'jos_foo'", "'bar_new'", "mediumtext"],
            ),
            (
                "ALTER TABLE `#__foo` CHANGE `bar` `bar_new` mediumtext",
                true,
                QueryType::ChangeColumnType,
                "SHOW COLUMNS IN `jos_foo` WHERE field = 'bar_new' AND UPPER(type) IN ('MEDIUMTEXT','LONGTEXT')",
                1,
                &["'jos_foo'", "'bar_new'", "mediumtext"],
            ),
            (
                "ALTER TABLE `#__foo` CHANGE `bar` `bar_new` text",
                true,
                QueryType::ChangeColumnType,
                "SHOW COLUMNS IN `jos_foo` WHERE field = 'bar_new' AND UPPER(type) IN ('TEXT','MEDIUMTEXT')",
                1,
                &["'jos_foo'", "'bar_new'", "text"],
            ),
            (
                "ALTER TABLE `#__foo` MODIFY `bar` tinytext",
                true,
                QueryType::ChangeColumnType,
                "SHOW COLUMNS IN `jos_foo` WHERE field = 'bar' AND UPPER(type) IN ('TINYTEXT','TEXT')",
                1,
                &["'jos_foo'", "'bar'", "tinytext"],
            ),
            (
                "ALTER TABLE `#__foo` MODIFY `bar` tinytext",
                false,
                QueryType::ChangeColumnType,
                "SHOW COLUMNS IN `jos_foo` WHERE field = 'bar' AND UPPER(type) = 'TINYTEXT'",
                1,
                &["'jos_foo'", "'bar'", "tinytext"],
            ),
            (
                "ALTER TABLE `#__foo` DROP COLUMN `bar`",
                true,
                QueryType::DropColumn,
                "SHOW COLUMNS IN `jos_foo` WHERE Field = 'bar'",
                0,
                &["'jos_foo'", "'bar'"],
            ),
            (
                "ALTER TABLE `#__foo` DROP INDEX `idx_bar`",
                true,
                QueryType::DropIndex,
                "SHOW INDEXES IN `jos_foo` WHERE Key_name = 'idx_bar'",
                0,
                &["'jos_foo'", "'idx_bar'"],
            ),
            (
                "ALTER TABLE `#__foo` DROP KEY `idx_bar`",
                true,
                QueryType::DropIndex,
                "SHOW INDEXES IN `jos_foo` WHERE Key_name = 'idx_bar'",
                0,
                &["'jos_foo'", "'idx_bar'"],
            ),
            (
                "RENAME TABLE `#__foo` TO `#__bar`",
                true,
                QueryType::RenameTable,
                "SHOW TABLES LIKE 'jos_bar'",
                1,
                &["'jos_bar'"],
            ),
            (
                "ALTER TABLE `#__foo` RENAME COLUMN `bar` TO `baz`",
                true,
                QueryType::RenameColumn,
                "SHOW COLUMNS IN `jos_foo` WHERE field = 'baz'",
                1,
                &["'jos_foo'", "'baz'"],
            ),
            (
                "ALTER TABLE `#__foo` ADD INDEX `idx_bar` (`bar`)",
                true,
                QueryType::AddIndex,
                "SHOW INDEXES IN `jos_foo` WHERE Key_name = 'idx_bar'",
                1,
                &["'jos_foo'", "'idx_bar'"],
            ),
            (
                "ALTER TABLE `#__foo` ADD KEY `idx_bar` (`bar`)",
                true,
                QueryType::AddIndex,
                "SHOW INDEXES IN `jos_foo` WHERE Key_name = 'idx_bar'",
                1,
                &["'jos_foo'", "'idx_bar'"],
            ),
            (
                "ALTER TABLE `#__foo` ADD KEY `idx_bar`(`bar`)",
                true,
                QueryType::AddIndex,
                "SHOW INDEXES IN `jos_foo` WHERE Key_name = 'idx_bar'",
                1,
                &["'jos_foo'", "'idx_bar'"],
            ),
            (
                "ALTER TABLE `#__foo` ADD UNIQUE `idx_bar` (`bar`)",
                true,
                QueryType::AddIndex,
                "SHOW INDEXES IN `jos_foo` WHERE Key_name = 'idx_bar'",
                1,
                &["'jos_foo'", "'idx_bar'"],
            ),
            (
                "ALTER TABLE `#__foo` ADD UNIQUE `idx_bar`(`bar`)",
                true,
                QueryType::AddIndex,
                "SHOW INDEXES IN `jos_foo` WHERE Key_name = 'idx_bar'",
                1,
                &["'jos_foo'", "'idx_bar'"],
            ),
            (
                "ALTER TABLE `#__foo` ADD UNIQUE INDEX `idx_bar`(`bar`)",
                true,
                QueryType::AddIndex,
                "SHOW INDEXES IN `jos_foo` WHERE Key_name = 'idx_bar'",
                1,
                &["'jos_foo'", "'idx_bar'"],
            ),
            (
                "ALTER TABLE `#__foo` ADD UNIQUE KEY `idx_bar` (`bar`)",
                true,
                QueryType::AddIndex,
                "SHOW INDEXES IN `jos_foo` WHERE Key_name = 'idx_bar'",
                1,
                &["'jos_foo'", "'idx_bar'"],
            ),
            (
                "ALTER TABLE `#__foo` CHANGE `bar` `bar_new` text",
                false,
                QueryType::ChangeColumnType,
                "SHOW COLUMNS IN `jos_foo` WHERE field = 'bar_new' AND UPPER(type) = 'TEXT'",
                1,
                &["'jos_foo'", "'bar_new'", "text"],
            ),
            (
                "ALTER TABLE `#__foo` CHANGE `bar` `bar_new` tinytext",
                false,
                QueryType::ChangeColumnType,
                "SHOW COLUMNS IN `jos_foo` WHERE field = 'bar_new' AND UPPER(type) = 'TINYTEXT'",
                1,
                &["'jos_foo'", "'bar_new'", "tinytext"],
            ),
            (
                "ALTER TABLE `#__foo` CHANGE `bar` `bar_new` tinytext",
                true,
                QueryType::ChangeColumnType,
                "SHOW COLUMNS IN `jos_foo` WHERE field = 'bar_new' AND UPPER(type) IN ('TINYTEXT','TEXT')",
                1,
                &["'jos_foo'", "'bar_new'", "tinytext"],
            ),
            (
                "ALTER TABLE `#__foo` MODIFY `bar` mediumtext",
                false,
                QueryType::ChangeColumnType,
                "SHOW COLUMNS IN `jos_foo` WHERE field = 'bar' AND UPPER(type) = 'MEDIUMTEXT'",
                1,
                &["'jos_foo'", "'bar'", "mediumtext"],
            ),
            (
                "ALTER TABLE `#__foo` MODIFY `bar` mediumtext",
                true,
                QueryType::ChangeColumnType,
                "SHOW COLUMNS IN `jos_foo` WHERE field = 'bar' AND UPPER(type) IN ('MEDIUMTEXT','LONGTEXT')",
                1,
                &["'jos_foo'", "'bar'", "mediumtext"],
            ),
            (
                "ALTER TABLE `#__foo` MODIFY `bar` text",
                false,
                QueryType::ChangeColumnType,
                "SHOW COLUMNS IN `jos_foo` WHERE field = 'bar' AND UPPER(type) = 'TEXT'",
                1,
                &["'jos_foo'", "'bar'", "text"],
            ),
            (
                "ALTER TABLE `#__foo` MODIFY `bar` text",
                true,
                QueryType::ChangeColumnType,
                "SHOW COLUMNS IN `jos_foo` WHERE field = 'bar' AND UPPER(type) IN ('TEXT','MEDIUMTEXT')",
                1,
                &["'jos_foo'", "'bar'", "text"],
            ),
            (
                "DROP INDEX `idx_bar` ON `#__foo`",
                true,
                QueryType::DropIndex,
                "SHOW INDEXES IN `jos_foo` WHERE Key_name = 'idx_bar'",
                0,
                &["'jos_foo'", "'idx_bar'"],
            ),
            (
                "RENAME TABLE #__foo TO #__bar",
                true,
                QueryType::RenameTable,
                "SHOW TABLES LIKE 'jos_bar'",
                1,
                &["'jos_bar'"],
            ),
        ];

        for (sql, utf8mb4, query_type, check_query, expected_rows, elements) in cases {
            let item = mysql_item(*utf8mb4, sql);
            assert_eq!(item.query_type(), *query_type, "{sql}");
            assert_eq!(item.check_query(), Some(*check_query), "{sql}");
            assert_eq!(item.expected_rows(), *expected_rows, "{sql}");
            assert_eq!(item.message_elements(), *elements, "{sql}");
            assert_eq!(item.check_status(), CheckStatus::Unchecked, "{sql}");
        }
    }

    #[test]
    fn test_mysql_create_table_forms() {
        for sql in [
            "CREATE TABLE `#__foo` (`bar` text) ENGINE=InnoDB",
            "CREATE TABLE #__foo (`bar` text) ENGINE=InnoDB",
            "CREATE TABLE IF NOT EXISTS `#__foo` (`bar` text)",
            "CREATE TABLE IF NOT EXISTS `#__foo` (\n  `bar` text\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;",
        ] {
            let item = mysql_item(true, sql);
            assert_eq!(item.query_type(), QueryType::CreateTable, "{sql}");
            assert_eq!(item.check_query(), Some("SHOW TABLES LIKE 'jos_foo'"), "{sql}");
            assert_eq!(item.message_elements(), ["'jos_foo'"]);
        }
    }

    #[test]
    fn test_pg_statement_fixtures() {
        let cases: &[(&str, QueryType, &str, usize)] = &[
            (
                "CREATE TABLE \"#__foo\" (\"bar\" text)",
                QueryType::CreateTable,
                "SELECT table_name FROM information_schema.tables WHERE table_name='jos_foo'",
                1,
            ),
            (
                "CREATE TABLE IF NOT EXISTS \"#__foo\" (\n  \"id\" serial NOT NULL,\n  PRIMARY KEY (\"id\")\n);",
                QueryType::CreateTable,
                "SELECT table_name FROM information_schema.tables WHERE table_name='jos_foo'",
                1,
            ),
            (
                "ALTER TABLE \"#__foo\" RENAME TO \"#__bar\"",
                QueryType::RenameTable,
                "SELECT table_name FROM information_schema.tables WHERE table_name='jos_bar'",
                1,
            ),
            (
                "ALTER TABLE \"#__foo\" ADD COLUMN \"bar\" text",
                QueryType::AddColumn,
                "SELECT column_name FROM information_schema.columns WHERE table_name='jos_foo' AND column_name='bar'",
                1,
            ),
            (
                "ALTER TABLE \"#__foo\" ADD COLUMN IF NOT EXISTS \"bar\" integer DEFAULT 0 NOT NULL",
                QueryType::AddColumn,
                "SELECT column_name FROM information_schema.columns WHERE table_name='jos_foo' AND column_name='bar'",
                1,
            ),
            (
                "ALTER TABLE \"#__foo\" DROP COLUMN \"bar\"",
                QueryType::DropColumn,
                "SELECT column_name FROM information_schema.columns WHERE table_name='jos_foo' AND column_name='bar'",
                0,
            ),
            (
                "ALTER TABLE \"#__foo\" DROP COLUMN IF EXISTS \"bar\" CASCADE",
                QueryType::DropColumn,
                "SELECT column_name FROM information_schema.columns WHERE table_name='jos_foo' AND column_name='bar'",
                0,
            ),
            (
                "ALTER TABLE \"#__foo\" RENAME COLUMN \"bar\" TO \"baz\"",
                QueryType::RenameColumn,
                "SELECT column_name FROM information_schema.columns WHERE table_name='jos_foo' AND column_name='baz'",
                1,
            ),
            (
                "CREATE INDEX \"#__foo_idx_bar\" ON \"#__foo\" (\"bar\")",
                QueryType::AddIndex,
                "SELECT * FROM pg_indexes WHERE indexname='jos_foo_idx_bar' AND tablename='jos_foo'",
                1,
            ),
            (
                "DROP INDEX IF EXISTS \"#__foo_idx_bar\"",
                QueryType::DropIndex,
                "SELECT * FROM pg_indexes WHERE indexname='jos_foo_idx_bar'",
                0,
            ),
        ];

        for (sql, query_type, check_query, expected_rows) in cases {
            let item = pg_item(sql);
            assert_eq!(item.query_type(), *query_type, "{sql}");
            assert_eq!(item.check_query(), Some(*check_query), "{sql}");
            assert_eq!(item.expected_rows(), *expected_rows, "{sql}");
        }
    }

    #[test]
    fn test_unrecognized_statements_are_skipped() {
        let db = MockExecutor::mysql("jos_");
        for sql in ["WHATEVER", "", "INSERT INTO `#__foo` (`bar`) VALUES ('baz');"] {
            let mut item = ChangeItem::new(&db, "", sql).unwrap();
            assert_eq!(item.query_type(), QueryType::Unrecognized);
            assert_eq!(item.check_query(), None);
            assert_eq!(item.expected_rows(), 1);
            assert!(item.message_elements().is_empty());
            assert_eq!(item.check_status(), CheckStatus::Skipped);
            assert_eq!(item.check(&db, &LogCollector), CheckStatus::Skipped);
        }
        assert!(db.queries().is_empty());
    }

    #[test]
    fn test_unsupported_server_type() {
        let db = MockExecutor::new("oracle", "jos_");
        let err = ChangeItem::new(&db, "", "ALTER TABLE #__foo ADD COLUMN bar text").unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedServerType(ref s) if s == "oracle"));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let sql = "ALTER TABLE `#__foo` CHANGE `bar` `bar_new` varchar(255) NOT NULL DEFAULT ''";
        assert_eq!(mysql_item(true, sql), mysql_item(true, sql));
    }

    #[test]
    fn test_check_row_count_semantics() {
        let cases = [
            ("ALTER TABLE #__foo ADD COLUMN bar text", 1, CheckStatus::Ok),
            ("ALTER TABLE #__foo ADD COLUMN bar text", 0, CheckStatus::Error),
            ("ALTER TABLE #__foo DROP COLUMN bar", 0, CheckStatus::Ok),
            ("ALTER TABLE #__foo DROP COLUMN bar", 1, CheckStatus::Error),
        ];
        for (sql, rows, expected) in cases {
            let db = MockExecutor::mysql("jos_").with_default_rows(rows);
            let mut item = ChangeItem::new(&db, "x.sql", sql).unwrap();
            assert_eq!(item.check(&db, &LogCollector), expected, "{sql} with {rows} row(s)");
            assert_eq!(item.check_status(), expected);
        }
    }

    #[test]
    fn test_check_failure_is_collected() {
        let db = MockExecutor::mysql("jos_");
        db.fail_query("SHOW COLUMNS IN `jos_foo` WHERE field = 'bar'");
        let mut item =
            ChangeItem::new(&db, "4.1.0-2021-11-28.sql", "ALTER TABLE #__foo ADD COLUMN bar text")
                .unwrap();

        let seen = RefCell::new(Vec::new());
        let collector = |context: &str, error: &SchemaError| {
            seen.borrow_mut().push(format!("{context}: {error}"));
        };

        assert_eq!(item.check(&db, &collector), CheckStatus::Error);
        let seen = seen.into_inner();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("check: check ADD_COLUMN in 4.1.0-2021-11-28.sql"));
    }

    #[test]
    fn test_fix_then_recheck_ok() {
        let db = MockExecutor::postgresql("jos_").with_default_rows(1);
        let mut item = pg_item("ALTER TABLE \"#__foo\" ADD COLUMN \"bar\" text;");

        assert_eq!(item.fix(&db, &LogCollector), CheckStatus::Ok);
        assert_eq!(item.check_status(), CheckStatus::Ok);
        assert_eq!(item.rerun_status(), CheckStatus::Ok);
        assert_eq!(db.executed(), ["ALTER TABLE \"#__foo\" ADD COLUMN \"bar\" text;"]);
    }

    #[test]
    fn test_fix_failure_keeps_check_status() {
        let sql = "ALTER TABLE \"#__foo\" ADD COLUMN \"bar\" text;";
        let db = MockExecutor::postgresql("jos_");
        db.fail_statement(sql);
        let mut item = pg_item(sql);
        assert_eq!(item.check(&db, &LogCollector), CheckStatus::Error);
        let queries_before = db.queries().len();

        let errors = RefCell::new(0);
        let collector = |_: &str, _: &SchemaError| *errors.borrow_mut() += 1;
        assert_eq!(item.fix(&db, &collector), CheckStatus::Error);

        assert_eq!(item.rerun_status(), CheckStatus::Error);
        assert_eq!(item.check_status(), CheckStatus::Error);
        assert_eq!(*errors.borrow(), 1);
        // no recheck after a failed statement
        assert_eq!(db.queries().len(), queries_before);
    }

    #[test]
    fn test_fix_leaves_ok_items_alone() {
        let db = MockExecutor::postgresql("jos_").with_default_rows(1);
        let mut item = pg_item("ALTER TABLE \"#__foo\" ADD COLUMN \"bar\" text;");
        assert_eq!(item.check(&db, &LogCollector), CheckStatus::Ok);

        assert_eq!(item.fix(&db, &LogCollector), CheckStatus::Ok);
        assert!(db.executed().is_empty());
        assert_eq!(item.rerun_status(), CheckStatus::Unchecked);
    }

    #[test]
    fn test_fix_never_runs_unverifiable_statements() {
        let db = MockExecutor::mysql("jos_");
        let sql = "UPDATE `#__utf8_conversion` SET `converted` = 0;";
        let mut item = ChangeItem::new(&db, "x.sql", sql).unwrap();
        assert_eq!(item.query_type(), QueryType::Utf8ConversionUtf8mb4);
        assert_eq!(item.check_status(), CheckStatus::Skipped);

        assert_eq!(item.fix(&db, &LogCollector), CheckStatus::Skipped);
        assert_eq!(item.rerun_status(), CheckStatus::Skipped);
        assert_eq!(item.check_status(), CheckStatus::Skipped);
        assert!(db.executed().is_empty());
    }

    #[test]
    fn test_fix_downgrades_utf8mb4_without_support() {
        let sql = "CREATE TABLE IF NOT EXISTS `#__foo` (`bar` varchar(10) DEFAULT 'utf8mb4') DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;";

        let db = MockExecutor::mysql("jos_").with_utf8mb4(false).with_default_rows(1);
        let mut item = ChangeItem::new(&db, "x.sql", sql).unwrap();
        assert_eq!(item.fix(&db, &LogCollector), CheckStatus::Ok);
        assert_eq!(
            db.executed(),
            ["CREATE TABLE IF NOT EXISTS `#__foo` (`bar` varchar(10) DEFAULT 'utf8mb4') DEFAULT CHARSET=utf8 COLLATE=utf8_unicode_ci;"]
        );

        let item = mysql_item(true, sql);
        assert_eq!(item.fix_statement(true), sql);
        let pg = pg_item("CREATE TABLE \"#__foo\" (\"bar\" text);");
        assert_eq!(pg.fix_statement(false), "CREATE TABLE \"#__foo\" (\"bar\" text);");
    }

    #[test]
    fn test_serialization() {
        let item = mysql_item(true, "ALTER TABLE `#__foo` DROP COLUMN `bar`");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["query_type"], "DROP_COLUMN");
        assert_eq!(json["check_status"], 0);
        assert_eq!(json["expected_rows"], 0);
        assert_eq!(json["dialect"], "mysql");
        assert_eq!(serde_json::to_value(CheckStatus::Error).unwrap(), -2);
        assert_eq!(
            serde_json::to_value(QueryType::Utf8ConversionUtf8mb4).unwrap(),
            "UTF8_CONVERSION_UTF8MB4"
        );
    }
}
