use chrono::NaiveDate;
use sqlx::MySql;
use sqlx::mysql::MySqlArguments;
use sqlx::query::{QueryAs, QueryScalar};

/// ===============================
/// SQL bindable filter value
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    U64(u64),
    String(String),
    Date(NaiveDate),
}

/// ===============================
/// Dynamic WHERE clause builder
/// ===============================
/// Column names are always static strings, only values are bound.
#[derive(Debug, Default)]
pub struct QueryFilter {
    conditions: Vec<&'static str>,
    values: Vec<SqlValue>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `condition` (with one `?`) when `value` is present.
    pub fn push<V: Into<SqlValue>>(&mut self, condition: &'static str, value: Option<V>) -> &mut Self {
        if let Some(v) = value {
            self.conditions.push(condition);
            self.values.push(v.into());
        }
        self
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn bind_as<'q, O>(
        &self,
        mut query: QueryAs<'q, MySql, O, MySqlArguments>,
    ) -> QueryAs<'q, MySql, O, MySqlArguments> {
        for value in &self.values {
            query = match value.clone() {
                SqlValue::U64(v) => query.bind(v),
                SqlValue::String(v) => query.bind(v),
                SqlValue::Date(v) => query.bind(v),
            };
        }
        query
    }

    pub fn bind_scalar<'q, O>(
        &self,
        mut query: QueryScalar<'q, MySql, O, MySqlArguments>,
    ) -> QueryScalar<'q, MySql, O, MySqlArguments> {
        for value in &self.values {
            query = match value.clone() {
                SqlValue::U64(v) => query.bind(v),
                SqlValue::String(v) => query.bind(v),
                SqlValue::Date(v) => query.bind(v),
            };
        }
        query
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::U64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}
