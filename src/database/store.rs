//! Relational store collaborator: positional-parameter queries plus
//! explicit begin/commit/rollback on a single connection checkout.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use sqlx::mysql::{MySqlArguments, MySqlPool, MySqlRow};
use rust_decimal::Decimal;
use sqlx::{Column, MySql, Row as _, TypeInfo};
use thiserror::Error;

/// One result row keyed by column name.
pub type Row = Map<String, Value>;

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Unknown database: {0}")]
    UnknownDatabase(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// A statement with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self { sql: sql.into(), params }
    }
}

#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Autocommitted statement; returns rows affected.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError>;

    async fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError>;

    async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, StoreError> {
        Ok(self.query_all(sql, params).await?.into_iter().next())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Open transaction. Dropping it without `commit` rolls back.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// [`RelationalStore`] over a sqlx MySQL pool.
#[derive(Clone)]
pub struct MySqlStore {
    name: String,
    pool: MySqlPool,
    slow_query_threshold: Option<Duration>,
}

impl MySqlStore {
    pub fn new(name: impl Into<String>, pool: MySqlPool) -> Self {
        Self {
            name: name.into(),
            pool,
            slow_query_threshold: None,
        }
    }

    pub fn slow_query_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    fn observe(&self, sql: &str, started: Instant) {
        if let Some(threshold) = self.slow_query_threshold {
            let elapsed = started.elapsed();
            if elapsed > threshold {
                tracing::warn!("Slow query on {} ({:?}): {}", self.name, elapsed, sql);
            }
        }
    }
}

#[async_trait]
impl RelationalStore for MySqlStore {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError> {
        tracing::debug!("execute on {}: {} params={:?}", self.name, sql, params);
        let started = Instant::now();
        let result = bind_all(sqlx::query(sql), params).execute(&self.pool).await?;
        self.observe(sql, started);
        Ok(result.rows_affected())
    }

    async fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        tracing::debug!("query on {}: {} params={:?}", self.name, sql, params);
        let started = Instant::now();
        let rows = bind_all(sqlx::query(sql), params).fetch_all(&self.pool).await?;
        self.observe(sql, started);
        rows.iter().map(row_to_map).collect()
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlTransaction { tx }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

pub struct MySqlTransaction {
    tx: sqlx::Transaction<'static, MySql>,
}

#[async_trait]
impl StoreTransaction for MySqlTransaction {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, StoreError> {
        tracing::debug!("execute in transaction: {} params={:?}", sql, params);
        let result = bind_all(sqlx::query(sql), params).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn bind_all<'q>(
    mut q: sqlx::query::Query<'q, MySql, MySqlArguments>,
    params: &[Value],
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    for p in params {
        q = bind_param(q, p);
    }
    q
}

fn bind_param<'q>(
    q: sqlx::query::Query<'q, MySql, MySqlArguments>,
    v: &Value,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(u) = n.as_u64() {
                q.bind(u)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s.clone()),
        // Compound values travel as JSON text
        Value::Array(_) | Value::Object(_) => q.bind(v.to_string()),
    }
}

fn row_to_map(row: &MySqlRow) -> Result<Row, StoreError> {
    let mut map = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), decode_column(row, i)?);
    }
    Ok(map)
}

fn decode_column(row: &MySqlRow, i: usize) -> Result<Value, StoreError> {
    if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
        return Ok(v.map(Value::from).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(i) {
        return Ok(v.map(Value::from).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
        return Ok(v
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<Decimal>, _>(i) {
        return Ok(v.map(decimal_to_value).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(i) {
        return Ok(v
            .map(|dt| Value::String(dt.format(DATETIME_FORMAT).to_string()))
            .unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<NaiveDate>, _>(i) {
        return Ok(v
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(i) {
        return Ok(v.map(Value::String).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<Value>, _>(i) {
        return Ok(v.unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
        return Ok(v.map(Value::Bool).unwrap_or(Value::Null));
    }

    let column = &row.columns()[i];
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(i) {
        return match v {
            Some(bytes) => bytes_to_value(column.name(), bytes),
            None => Ok(Value::Null),
        };
    }
    Err(StoreError::QueryError(format!(
        "column {} has unsupported type {}",
        column.name(),
        column.type_info().name()
    )))
}

/// DECIMAL keeps its full precision as text.
fn decimal_to_value(d: Decimal) -> Value {
    Value::String(d.to_string())
}

/// Textual BLOBs decode as strings; anything else cannot be represented in a row.
fn bytes_to_value(column: &str, bytes: Vec<u8>) -> Result<Value, StoreError> {
    String::from_utf8(bytes)
        .map(Value::String)
        .map_err(|_| StoreError::QueryError(format!("column {} holds binary data", column)))
}
