//! SQL values, parameterized fragments, and result rows.
//!
//! Statements are always emitted as SQL text plus an ordered list of bind
//! values; request data never lands in the SQL text itself.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::model::Id;

/// A bind value or result cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(Value),
}

impl From<&Id> for SqlValue {
    fn from(id: &Id) -> Self {
        match id {
            Id::Long(v) => SqlValue::Long(*v),
            Id::Text(v) => SqlValue::Text(v.clone()),
            Id::Uuid(v) => SqlValue::Uuid(*v),
        }
    }
}

impl SqlValue {
    /// Back-convert a cell into an identifier, when it holds one.
    pub fn as_id(&self) -> Option<Id> {
        match self {
            SqlValue::Long(v) => Some(Id::Long(*v)),
            SqlValue::Text(v) => Some(Id::Text(v.clone())),
            SqlValue::Uuid(v) => Some(Id::Uuid(*v)),
            _ => None,
        }
    }
}

/// A piece of SQL text with its bind values, concatenable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>) -> Self {
        SqlFragment {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        SqlFragment {
            sql: sql.into(),
            params,
        }
    }

    /// A single `?` placeholder binding one value.
    pub fn bind(value: SqlValue) -> Self {
        SqlFragment {
            sql: "?".to_string(),
            params: vec![value],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    pub fn append(&mut self, other: SqlFragment) {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
    }

    /// AND-combine with another fragment; either side may be empty.
    pub fn and(mut self, other: SqlFragment) -> SqlFragment {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        self.sql = format!("({}) AND ({})", self.sql, other.sql);
        self.params.extend(other.params);
        self
    }
}

/// A complete emitted statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl From<SqlFragment> for SqlStatement {
    fn from(fragment: SqlFragment) -> Self {
        SqlStatement {
            sql: fragment.sql,
            params: fragment.params,
        }
    }
}

/// One result row, keyed by output column alias.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(pub HashMap<String, SqlValue>);

impl Row {
    pub fn new() -> Self {
        Row(HashMap::new())
    }

    pub fn set(mut self, column: impl Into<String>, value: SqlValue) -> Self {
        self.0.insert(column.into(), value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.0.get(column)
    }
}
