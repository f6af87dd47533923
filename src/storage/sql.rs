//! SQL construction shared by the SQL backends.
//!
//! This module provides:
//! - Per-dialect DDL for the entries table and its ordering index
//! - Table name validation (names are interpolated, never bound)
//! - Translation of a filter set into a parameterized `WHERE` clause
//!
//! The translation mirrors [`crate::models::Filter::matches`] exactly: each
//! filter becomes a parenthesized OR of one comparison per value, filters
//! are joined with AND, and a filter without values becomes a false literal.

use super::codec::encode_json;
use crate::models::Filter;
use crate::{Error, Result};
use serde_json::Value;

/// Default table name for audit entries.
pub const DEFAULT_TABLE: &str = "audit_logs";

/// Ordering shared by every paginated query.
pub const ORDER_BY: &str = "ORDER BY occurred_at DESC, seq DESC";

/// SQL dialect of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `SQLite` (`?N` placeholders).
    Sqlite,
    /// PostgreSQL (`$N` placeholders).
    Postgres,
}

impl Dialect {
    /// Returns the placeholder for the 1-based parameter `index`.
    #[must_use]
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Sqlite => format!("?{index}"),
            Self::Postgres => format!("${index}"),
        }
    }

    /// Returns the statements creating the table and its indexes.
    #[must_use]
    pub fn create_table(self, table: &str) -> Vec<String> {
        let columns = match self {
            Self::Sqlite => {
                "seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id BLOB NOT NULL UNIQUE,
                type TEXT NOT NULL,
                level INTEGER NOT NULL,
                occurred_at INTEGER NOT NULL,
                user_id TEXT,
                object_id TEXT,
                content_type TEXT,
                data TEXT"
            },
            Self::Postgres => {
                "seq BIGSERIAL PRIMARY KEY,
                id BYTEA NOT NULL UNIQUE,
                type TEXT NOT NULL,
                level BIGINT NOT NULL,
                occurred_at BIGINT NOT NULL,
                user_id TEXT,
                object_id TEXT,
                content_type TEXT,
                data TEXT"
            },
        };
        vec![
            format!("CREATE TABLE IF NOT EXISTS {table} ({columns})"),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_occurred_at ON {table} (occurred_at DESC, seq DESC)"
            ),
            format!("CREATE INDEX IF NOT EXISTS idx_{table}_type ON {table} (type)"),
        ]
    }
}

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    /// Binary value.
    Blob(Vec<u8>),
    /// Text value.
    Text(String),
    /// Integer value.
    Int(i64),
}

/// A `WHERE` clause with its bound parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhereClause {
    /// Clause text including the leading ` WHERE `, or empty.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<SqlParam>,
}

impl WhereClause {
    /// Returns the next free 1-based placeholder index.
    #[must_use]
    pub fn next_index(&self) -> usize {
        self.params.len() + 1
    }
}

/// Validates a table name before it is interpolated into SQL.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] unless the name is a non-empty ASCII
/// identifier of letters, digits, and underscores not starting with a digit.
pub fn validate_table_name(name: &str) -> Result<()> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.len() <= 63
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("invalid table name '{name}'")))
    }
}

/// Builds the `WHERE` clause for a filter set.
///
/// Placeholders are numbered from 1. An empty filter set yields an empty clause.
///
/// # Errors
///
/// Returns [`Error::Decode`] if a JSON filter value cannot be encoded.
pub fn build_where(filters: &[Filter], dialect: Dialect) -> Result<WhereClause> {
    let mut clause = WhereClause::default();
    let mut conditions = Vec::with_capacity(filters.len());

    for filter in filters {
        let mut alternatives = Vec::with_capacity(filter.len());
        let mut bind = |column: &str, op: &str, param: SqlParam, clause: &mut WhereClause| {
            let placeholder = dialect.placeholder(clause.next_index());
            clause.params.push(param);
            format!("{column} {op} {placeholder}")
        };

        match filter {
            Filter::Id(ids) => {
                for id in ids {
                    let p = SqlParam::Blob(id.as_bytes().to_vec());
                    alternatives.push(bind("id", "=", p, &mut clause));
                }
            },
            Filter::Type(types) => {
                for t in types {
                    alternatives.push(bind("type", "=", SqlParam::Text(t.clone()), &mut clause));
                }
            },
            Filter::UserId(values) => {
                for v in values {
                    alternatives.push(json_equals("user_id", v, &mut bind, &mut clause)?);
                }
            },
            Filter::ObjectId(values) => {
                for v in values {
                    alternatives.push(json_equals("object_id", v, &mut bind, &mut clause)?);
                }
            },
            Filter::ContentType(cts) => {
                for ct in cts {
                    let p = SqlParam::Text(ct.key());
                    alternatives.push(bind("content_type", "=", p, &mut clause));
                }
            },
            Filter::Level(levels) => {
                for l in levels {
                    alternatives.push(bind("level", "=", SqlParam::Int(l.as_i64()), &mut clause));
                }
            },
            Filter::LevelGreaterThan(levels) => {
                for l in levels {
                    alternatives.push(bind("level", ">", SqlParam::Int(l.as_i64()), &mut clause));
                }
            },
            Filter::LevelLessThan(levels) => {
                for l in levels {
                    alternatives.push(bind("level", "<", SqlParam::Int(l.as_i64()), &mut clause));
                }
            },
            Filter::Timestamp(instants) => {
                for t in instants {
                    let p = SqlParam::Int(t.timestamp_micros());
                    alternatives.push(bind("occurred_at", "=", p, &mut clause));
                }
            },
            Filter::TimestampBefore(instants) => {
                for t in instants {
                    let p = SqlParam::Int(t.timestamp_micros());
                    alternatives.push(bind("occurred_at", "<", p, &mut clause));
                }
            },
            Filter::TimestampAfter(instants) => {
                for t in instants {
                    let p = SqlParam::Int(t.timestamp_micros());
                    alternatives.push(bind("occurred_at", ">", p, &mut clause));
                }
            },
            Filter::Data(payloads) => {
                for payload in payloads {
                    let p = SqlParam::Text(encode_json("data", payload)?);
                    alternatives.push(bind("data", "=", p, &mut clause));
                }
            },
        }

        conditions.push(if alternatives.is_empty() {
            "1 = 0".to_string()
        } else {
            format!("({})", alternatives.join(" OR "))
        });
    }

    if !conditions.is_empty() {
        clause.sql = format!(" WHERE {}", conditions.join(" AND "));
    }
    Ok(clause)
}

/// Equality on a JSON-encoded nullable column; `null` means the column is `NULL`.
fn json_equals(
    column: &'static str,
    value: &Value,
    bind: &mut impl FnMut(&str, &str, SqlParam, &mut WhereClause) -> String,
    clause: &mut WhereClause,
) -> Result<String> {
    if value.is_null() {
        return Ok(format!("{column} IS NULL"));
    }
    let encoded = encode_json(column, value)?;
    Ok(bind(column, "=", SqlParam::Text(encoded), clause))
}

/// Converts a page size or offset to a SQL integer, saturating.
#[must_use]
pub fn to_sql_int(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
