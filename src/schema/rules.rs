//! Statement classification rules
//!
//! Each dialect owns an ordered table of `(QueryType, pattern, extractor)`
//! rules. A statement is normalized (whitespace runs collapsed, trailing `;`
//! removed) and matched against the table top to bottom; the first rule whose
//! pattern matches *and* whose extractor accepts the captures wins. Order
//! matters: `ALTER TABLE t RENAME TO u` must be seen as a table rename before
//! the column rules get a look at it, and `ADD INDEX` must be turned away by
//! the `ADD [COLUMN]` extractor before the index rule sees it.

use crate::schema::{Dialect, QueryType};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Table, column or index name, optionally quoted with backticks or double quotes
const IDENT: &str = r#"(?:`[^`]+`|"[^"]+"|[^\s(),;`"=]+)"#;

/// MySQL column type as written, e.g. `mediumtext` or `varchar(255)`
const MYSQL_TYPE: &str = r"[A-Za-z][A-Za-z0-9_]*(?: ?\([^)]*\))?";

const PG_ALTER_TABLE: &str = "ALTER TABLE (?:IF EXISTS )?(?:ONLY )?(?P<table><id>)";

/// Words that follow `ADD`/`DROP` in clauses that are not column clauses
const NOT_A_COLUMN: &[&str] = &[
    "CHECK", "CONSTRAINT", "EXCLUDE", "FOREIGN", "FULLTEXT", "INDEX", "KEY", "PRIMARY", "SPATIAL",
    "UNIQUE",
];

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

static PG_TYPE_ACTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:SET DATA )?TYPE (?P<type>.+?)(?: COLLATE \S+)?(?: USING .*)?$")
        .expect("type action pattern is valid")
});

/// Name substitution and quoting for one statement
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub dialect: Dialect,
    /// Replaces the `#__` placeholder
    pub prefix: &'a str,
    /// Live server capability, drives text type widening
    pub utf8mb4: bool,
}

impl RuleContext<'_> {
    /// Unquoted name with the table prefix applied
    fn name(&self, raw: &str) -> String {
        self.dialect.unquote_name(raw).replace("#__", self.prefix)
    }

    /// Name as a string literal, e.g. `'jos_foo'`
    fn literal(&self, raw: &str) -> String {
        self.dialect.quote(&self.name(raw))
    }

    /// Name as a quoted identifier, e.g. `` `jos_foo` ``
    fn ident(&self, raw: &str) -> String {
        self.dialect.quote_name(&self.name(raw))
    }

    fn quote(&self, value: &str) -> String {
        self.dialect.quote(value)
    }
}

/// Outcome of classifying one statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub query_type: QueryType,
    /// `None` when the statement shape is known but cannot be verified
    pub check_query: Option<String>,
    pub expected_rows: usize,
    pub message_elements: Vec<String>,
}

struct Check {
    query: Option<String>,
    expected_rows: usize,
    message_elements: Vec<String>,
}

impl Check {
    fn expect(expected_rows: usize, query: String, message_elements: Vec<String>) -> Option<Self> {
        Some(Self {
            query: Some(query),
            expected_rows,
            message_elements,
        })
    }

    fn unverifiable() -> Option<Self> {
        Some(Self {
            query: None,
            expected_rows: 1,
            message_elements: Vec::new(),
        })
    }
}

type Extractor = fn(&Captures<'_>, &RuleContext<'_>) -> Option<Check>;

/// One entry of a dialect's classification table
pub struct Rule {
    pub query_type: QueryType,
    pattern: Regex,
    extract: Extractor,
}

impl Rule {
    fn new(query_type: QueryType, template: &str, extract: Extractor) -> Self {
        let pattern = format!("(?i)^{}", template.replace("<id>", IDENT));
        Self {
            query_type,
            pattern: Regex::new(&pattern).expect("classification pattern is valid"),
            extract,
        }
    }

    /// The compiled pattern, for auditing rule order
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

static MYSQL_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    use QueryType::*;
    vec![
        Rule::new(RenameTable, r"RENAME TABLE (?P<table><id>) TO (?P<new><id>)(?:,.*)?$", |c, ctx| {
            mysql_table_exists(ctx, &c["new"])
        }),
        Rule::new(
            RenameTable,
            r"ALTER TABLE (?P<table><id>) RENAME (?:TO |AS )?(?P<new><id>)$",
            |c, ctx| mysql_table_exists(ctx, &c["new"]),
        ),
        Rule::new(CreateTable, r"CREATE TABLE (?:IF NOT EXISTS )?(?P<table><id>) ?\(", |c, ctx| {
            mysql_table_exists(ctx, &c["table"])
        }),
        Rule::new(
            AddColumn,
            r"ALTER TABLE (?P<table><id>) ADD (?:COLUMN )?(?:IF NOT EXISTS )?(?P<column><id>) (?P<rest>.+)$",
            |c, ctx| {
                is_column_name(&c["column"])?;
                mysql_column_exists(ctx, &c["table"], &c["column"], "field", 1)
            },
        ),
        Rule::new(
            DropColumn,
            r"ALTER TABLE (?P<table><id>) DROP (?:COLUMN )?(?:IF EXISTS )?(?P<column><id>)(?:,.*)?$",
            |c, ctx| {
                is_column_name(&c["column"])?;
                mysql_column_exists(ctx, &c["table"], &c["column"], "Field", 0)
            },
        ),
        Rule::new(
            RenameColumn,
            r"ALTER TABLE (?P<table><id>) RENAME COLUMN (?P<old><id>) TO (?P<new><id>)$",
            |c, ctx| mysql_column_exists(ctx, &c["table"], &c["new"], "field", 1),
        ),
        Rule::new(
            ChangeColumnType,
            &format!(r"ALTER TABLE (?P<table><id>) MODIFY (?:COLUMN )?(?P<column><id>) (?P<type>{MYSQL_TYPE})(?: (?P<rest>.*))?$"),
            mysql_change_column_type,
        ),
        Rule::new(
            ChangeColumnType,
            &format!(r"ALTER TABLE (?P<table><id>) CHANGE (?:COLUMN )?(?P<old><id>) (?P<column><id>) (?P<type>{MYSQL_TYPE})(?: (?P<rest>.*))?$"),
            mysql_change_column_type,
        ),
        Rule::new(
            AddIndex,
            r"ALTER TABLE (?P<table><id>) ADD (?:(?:UNIQUE|FULLTEXT|SPATIAL)(?: INDEX| KEY)?|INDEX|KEY) (?:IF NOT EXISTS )?(?P<index><id>) ?\(",
            |c, ctx| mysql_index_exists(ctx, &c["table"], &c["index"], 1),
        ),
        Rule::new(
            AddIndex,
            r"CREATE (?:UNIQUE |FULLTEXT |SPATIAL )?INDEX (?P<index><id>) ON (?P<table><id>) ?\(",
            |c, ctx| mysql_index_exists(ctx, &c["table"], &c["index"], 1),
        ),
        Rule::new(
            DropIndex,
            r"ALTER TABLE (?P<table><id>) DROP (?:INDEX|KEY) (?:IF EXISTS )?(?P<index><id>)$",
            |c, ctx| mysql_index_exists(ctx, &c["table"], &c["index"], 0),
        ),
        Rule::new(DropIndex, r"DROP INDEX (?P<index><id>) ON (?P<table><id>)$", |c, ctx| {
            mysql_index_exists(ctx, &c["table"], &c["index"], 0)
        }),
        Rule::new(
            RenameIndex,
            r"ALTER TABLE (?P<table><id>) RENAME (?:INDEX|KEY) (?P<old><id>) TO (?P<new><id>)$",
            |c, ctx| mysql_index_exists(ctx, &c["table"], &c["new"], 1),
        ),
        Rule::new(
            Utf8ConversionUtf8mb4,
            r"UPDATE (?P<table><id>) SET (?P<column><id>) ?=",
            |c, ctx| {
                let table = ctx.dialect.unquote_name(&c["table"]);
                let column = ctx.dialect.unquote_name(&c["column"]);
                let marker = table.eq_ignore_ascii_case("#__utf8_conversion");
                let flag = column.eq_ignore_ascii_case("converted");
                if marker && flag {
                    Check::unverifiable()
                } else {
                    None
                }
            },
        ),
    ]
});

static POSTGRESQL_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    use QueryType::*;
    vec![
        Rule::new(
            RenameTable,
            &format!(r"{PG_ALTER_TABLE} RENAME TO (?P<new><id>)$"),
            |c, ctx| pg_table_exists(ctx, &c["new"]),
        ),
        Rule::new(CreateTable, r"CREATE TABLE (?:IF NOT EXISTS )?(?P<table><id>) ?\(", |c, ctx| {
            pg_table_exists(ctx, &c["table"])
        }),
        Rule::new(
            AddColumn,
            &format!(r"{PG_ALTER_TABLE} ADD (?:COLUMN )?(?:IF NOT EXISTS )?(?P<column><id>) (?P<rest>.+)$"),
            |c, ctx| {
                is_column_name(&c["column"])?;
                pg_column_exists(ctx, &c["table"], &c["column"], 1)
            },
        ),
        Rule::new(
            DropColumn,
            &format!(r"{PG_ALTER_TABLE} DROP (?:COLUMN )?(?:IF EXISTS )?(?P<column><id>)(?: CASCADE| RESTRICT)?(?:,.*)?$"),
            |c, ctx| {
                is_column_name(&c["column"])?;
                pg_column_exists(ctx, &c["table"], &c["column"], 0)
            },
        ),
        Rule::new(
            RenameColumn,
            &format!(r"{PG_ALTER_TABLE} RENAME (?:COLUMN )?(?P<old><id>) TO (?P<new><id>)$"),
            |c, ctx| {
                is_column_name(&c["old"])?;
                pg_column_exists(ctx, &c["table"], &c["new"], 1)
            },
        ),
        Rule::new(
            ChangeColumnType,
            &format!(r"{PG_ALTER_TABLE} ALTER (?:COLUMN )?(?P<column><id>) (?P<action>.+)$"),
            pg_alter_column,
        ),
        Rule::new(
            AddIndex,
            r"CREATE (?:UNIQUE )?INDEX (?:CONCURRENTLY )?(?:IF NOT EXISTS )?(?P<index><id>) ON (?:ONLY )?(?P<table><id>)",
            |c, ctx| pg_index_exists(ctx, &c["index"], Some(&c["table"]), 1),
        ),
        Rule::new(
            AddIndex,
            &format!(r"{PG_ALTER_TABLE} ADD CONSTRAINT (?P<index><id>) (?:UNIQUE|PRIMARY KEY)\b"),
            |c, ctx| pg_index_exists(ctx, &c["index"], Some(&c["table"]), 1),
        ),
        Rule::new(
            DropIndex,
            r"DROP INDEX (?:CONCURRENTLY )?(?:IF EXISTS )?(?P<index><id>)(?: CASCADE| RESTRICT)?$",
            |c, ctx| pg_index_exists(ctx, &c["index"], None, 0),
        ),
        Rule::new(
            DropIndex,
            &format!(r"{PG_ALTER_TABLE} DROP CONSTRAINT (?:IF EXISTS )?(?P<index><id>)(?: CASCADE| RESTRICT)?$"),
            |c, ctx| pg_constraint_exists(ctx, &c["table"], &c["index"], 0),
        ),
        Rule::new(
            RenameIndex,
            r"ALTER INDEX (?:IF EXISTS )?(?P<old><id>) RENAME TO (?P<new><id>)$",
            |c, ctx| pg_index_exists(ctx, &c["new"], None, 1),
        ),
    ]
});

/// The ordered rule table for a dialect
#[must_use]
pub fn rules(dialect: Dialect) -> &'static [Rule] {
    match dialect {
        Dialect::Mysql => &MYSQL_RULES,
        Dialect::Postgresql => &POSTGRESQL_RULES,
    }
}

/// Classify one statement; `None` means no rule recognized it
#[must_use]
pub fn classify(ctx: &RuleContext<'_>, statement: &str) -> Option<Classification> {
    let normalized = normalize(statement);
    if normalized.is_empty() {
        return None;
    }

    rules(ctx.dialect).iter().find_map(|rule| {
        let captures = rule.pattern.captures(&normalized)?;
        let check = (rule.extract)(&captures, ctx)?;
        Some(Classification {
            query_type: rule.query_type,
            check_query: check.query,
            expected_rows: check.expected_rows,
            message_elements: check.message_elements,
        })
    })
}

/// Collapse whitespace (including newlines) and drop trailing `;`
fn normalize(statement: &str) -> String {
    let collapsed = WHITESPACE.replace_all(statement.trim(), " ");
    collapsed.trim_end_matches(|c: char| c == ';' || c.is_whitespace()).to_string()
}

/// Rejects clause keywords (`INDEX`, `CONSTRAINT`, ...) captured where a column name was expected
fn is_column_name(raw: &str) -> Option<()> {
    let quoted = raw.starts_with('`') || raw.starts_with('"');
    if !quoted && NOT_A_COLUMN.iter().any(|kw| raw.eq_ignore_ascii_case(kw)) {
        None
    } else {
        Some(())
    }
}

/// Whitespace-separated words, keeping `'quoted text'` together
fn words(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = None;
    let mut quoted = false;
    for (i, c) in text.char_indices() {
        if c == '\'' {
            quoted = !quoted;
            start.get_or_insert(i);
        } else if c.is_whitespace() && !quoted {
            if let Some(s) = start.take() {
                out.push(&text[s..i]);
            }
        } else {
            start.get_or_insert(i);
        }
    }
    if let Some(s) = start {
        out.push(&text[s..]);
    }
    out
}

/// Text up to the first comma outside parentheses and quotes
fn first_clause(text: &str) -> &str {
    let mut depth = 0i32;
    let mut quoted = false;
    for (i, c) in text.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth -= 1,
            ',' if !quoted && depth == 0 => return text[..i].trim_end(),
            _ => {}
        }
    }
    text.trim()
}

fn mysql_table_exists(ctx: &RuleContext<'_>, table: &str) -> Option<Check> {
    let table = ctx.literal(table);
    Check::expect(1, format!("SHOW TABLES LIKE {table}"), vec![table])
}

fn mysql_column_exists(
    ctx: &RuleContext<'_>,
    table: &str,
    column: &str,
    field: &str,
    expected_rows: usize,
) -> Option<Check> {
    let query = format!(
        "SHOW COLUMNS IN {} WHERE {} = {}",
        ctx.ident(table),
        field,
        ctx.literal(column)
    );
    Check::expect(expected_rows, query, vec![ctx.literal(table), ctx.literal(column)])
}

fn mysql_index_exists(
    ctx: &RuleContext<'_>,
    table: &str,
    index: &str,
    expected_rows: usize,
) -> Option<Check> {
    let query = format!(
        "SHOW INDEXES IN {} WHERE Key_name = {}",
        ctx.ident(table),
        ctx.literal(index)
    );
    Check::expect(expected_rows, query, vec![ctx.literal(table), ctx.literal(index)])
}

fn mysql_change_column_type(c: &Captures<'_>, ctx: &RuleContext<'_>) -> Option<Check> {
    let table = &c["table"];
    let column = &c["column"];
    let modifiers = words(c.name("rest").map_or("", |m| m.as_str()));
    let declared: String = c["type"].split_whitespace().collect();

    // `integer unsigned` is reported back by the server as `int(10) unsigned`
    let column_type = match modifiers.first() {
        Some(next) if next.to_ascii_lowercase().starts_with("unsigned") => {
            if declared.eq_ignore_ascii_case("integer") {
                "int(10) unsigned".to_string()
            } else {
                format!("{declared} unsigned")
            }
        }
        _ => declared,
    };

    let accepted: Vec<String> = ctx
        .dialect
        .accepted_types(&column_type, ctx.utf8mb4)
        .iter()
        .map(|t| ctx.quote(t))
        .collect();
    let type_check = match accepted.as_slice() {
        [only] => format!("UPPER(type) = {only}"),
        many => format!("UPPER(type) IN ({})", many.join(",")),
    };

    let mut query = format!(
        "SHOW COLUMNS IN {} WHERE field = {} AND {}",
        ctx.ident(table),
        ctx.literal(column),
        type_check
    );
    if let Some(default_check) = mysql_default_check(ctx, &modifiers, &column_type) {
        query.push_str(" AND ");
        query.push_str(&default_check);
    }
    if let Some(null_check) = mysql_null_check(ctx, &modifiers) {
        query.push_str(" AND ");
        query.push_str(&null_check);
    }

    Check::expect(1, query, vec![ctx.literal(table), ctx.literal(column), column_type])
}

fn mysql_default_check(
    ctx: &RuleContext<'_>,
    modifiers: &[&str],
    column_type: &str,
) -> Option<String> {
    // Text and blob columns cannot carry a default
    let lower = column_type.to_ascii_lowercase();
    if lower.ends_with("text") || lower.ends_with("blob") {
        return None;
    }
    let index = modifiers.iter().position(|w| w.eq_ignore_ascii_case("default"))?;
    let value = modifiers.get(index + 1)?;
    let column = ctx.dialect.quote_name("default");
    if value.eq_ignore_ascii_case("null") {
        Some(format!("{column} IS NULL"))
    } else if value.starts_with('\'') || value.parse::<f64>().is_ok() {
        Some(format!("{column} = {value}"))
    } else {
        // `CURRENT_TIMESTAMP` and friends are reported back as text
        Some(format!("{column} = {}", ctx.quote(value)))
    }
}

fn mysql_null_check(ctx: &RuleContext<'_>, modifiers: &[&str]) -> Option<String> {
    let index = modifiers.iter().position(|w| w.eq_ignore_ascii_case("null"))?;
    let column = ctx.dialect.quote_name("null");
    let not_null = index > 0 && modifiers[index - 1].eq_ignore_ascii_case("not");
    Some(format!("{column} = {}", ctx.quote(if not_null { "NO" } else { "YES" })))
}

fn pg_table_exists(ctx: &RuleContext<'_>, table: &str) -> Option<Check> {
    let table = ctx.literal(table);
    Check::expect(
        1,
        format!("SELECT table_name FROM information_schema.tables WHERE table_name={table}"),
        vec![table],
    )
}

fn pg_column_exists(
    ctx: &RuleContext<'_>,
    table: &str,
    column: &str,
    expected_rows: usize,
) -> Option<Check> {
    let query = format!(
        "SELECT column_name FROM information_schema.columns WHERE table_name={} AND column_name={}",
        ctx.literal(table),
        ctx.literal(column)
    );
    Check::expect(expected_rows, query, vec![ctx.literal(table), ctx.literal(column)])
}

fn pg_index_exists(
    ctx: &RuleContext<'_>,
    index: &str,
    table: Option<&str>,
    expected_rows: usize,
) -> Option<Check> {
    let mut query = format!("SELECT * FROM pg_indexes WHERE indexname={}", ctx.literal(index));
    let mut elements = Vec::with_capacity(2);
    if let Some(table) = table {
        query.push_str(&format!(" AND tablename={}", ctx.literal(table)));
        elements.push(ctx.literal(table));
    }
    elements.push(ctx.literal(index));
    Check::expect(expected_rows, query, elements)
}

/// Any constraint kind, foreign keys and checks included
fn pg_constraint_exists(
    ctx: &RuleContext<'_>,
    table: &str,
    constraint: &str,
    expected_rows: usize,
) -> Option<Check> {
    let query = format!(
        "SELECT constraint_name FROM information_schema.table_constraints WHERE table_name={} AND constraint_name={}",
        ctx.literal(table),
        ctx.literal(constraint)
    );
    Check::expect(expected_rows, query, vec![ctx.literal(table), ctx.literal(constraint)])
}

fn pg_alter_column(c: &Captures<'_>, ctx: &RuleContext<'_>) -> Option<Check> {
    let table = &c["table"];
    let column = &c["column"];
    let action = first_clause(&c["action"]);
    let base = format!(
        "SELECT column_name, data_type FROM information_schema.columns WHERE table_name={} AND column_name={}",
        ctx.literal(table),
        ctx.literal(column)
    );
    let elements = |detail: String| vec![ctx.literal(table), ctx.literal(column), detail];

    if let Some(type_action) = PG_TYPE_ACTION.captures(action) {
        let declared = type_action["type"].trim();
        let (data_type, length) = pg_data_type(declared);
        let mut query = format!("{base} AND data_type={}", ctx.quote(&data_type));
        if let Some(length) = length {
            query.push_str(&format!(" AND character_maximum_length = {length}"));
        }
        return Check::expect(1, query, elements(declared.to_string()));
    }

    let upper = action.to_ascii_uppercase();
    match upper.as_str() {
        "SET NOT NULL" => Check::expect(
            1,
            format!("{base} AND is_nullable={}", ctx.quote("NO")),
            elements("NOT NULL".to_string()),
        ),
        "DROP NOT NULL" => Check::expect(
            0,
            format!("{base} AND is_nullable={}", ctx.quote("NO")),
            elements("NULL".to_string()),
        ),
        "DROP DEFAULT" => Check::expect(
            0,
            format!("{base} AND column_default IS NOT NULL"),
            elements("NOT DEFAULT".to_string()),
        ),
        _ if upper.starts_with("SET DEFAULT ") => {
            let value = strip_cast(action["SET DEFAULT ".len()..].trim());
            if value.eq_ignore_ascii_case("null") {
                return Check::expect(
                    1,
                    format!("{base} AND column_default IS NULL"),
                    elements("DEFAULT NULL".to_string()),
                );
            }
            let quoted = ctx.quote(value);
            let cast = ctx.quote("::");
            let query = format!(
                "{base} AND (CASE (position({cast} in column_default)) WHEN 0 THEN column_default = {quoted} \
                 ELSE substring(column_default, 1, (position({cast} in column_default) -1)) = {quoted} END)"
            );
            Check::expect(1, query, elements(format!("DEFAULT {value}")))
        }
        _ => None,
    }
}

/// Value without a trailing `::type` cast, e.g. `'0'::integer` becomes `'0'`
fn strip_cast(value: &str) -> &str {
    let mut quoted = false;
    let mut cast = None;
    for (i, c) in value.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            ':' if !quoted && value[i..].starts_with("::") && cast.is_none() => cast = Some(i),
            _ => {}
        }
    }
    cast.map_or(value, |i| value[..i].trim_end())
}

/// `information_schema.columns.data_type` name for a declared type, plus its length if checked
fn pg_data_type(declared: &str) -> (String, Option<u32>) {
    let lower = declared.to_ascii_lowercase();
    let (base, args) = match lower.find('(') {
        Some(pos) => (lower[..pos].trim(), Some(lower[pos + 1..].trim_end_matches(')'))),
        None => (lower.trim(), None),
    };
    let data_type = match base {
        "varchar" | "character varying" => "character varying",
        "char" | "character" | "bpchar" => "character",
        "int" | "int4" => "integer",
        "int2" => "smallint",
        "int8" => "bigint",
        "bool" => "boolean",
        "timestamp" => "timestamp without time zone",
        "timestamptz" => "timestamp with time zone",
        other => other,
    };
    let length = match data_type {
        "character varying" | "character" => args.and_then(|a| a.trim().parse().ok()),
        _ => None,
    };
    (data_type.to_string(), length)
}
