//! Descriptor-driven row mapping over the SQLite pool.
//!
//! A [`Descriptor`] lists the fields a query returns, in column order, with
//! the semantic type of each. Rows are decoded into untyped [`Record`]s and
//! then into caller types through [`FromRecord`].
//!
//! ```text
//! let posts: Vec<Post> = query_many(
//!     &pool,
//!     &Post::descriptor(&categories),
//!     "SELECT postId, title, posted, categories FROM posts WHERE userId = ?1",
//!     &[Param::from(user_id)],
//! ).await?;
//! ```

use std::fmt;
use std::sync::Arc;

use futures_util::TryStreamExt;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::types::chrono::NaiveDateTime;
use sqlx::{Row, SqlitePool, TypeInfo, ValueRef};
use thiserror::Error;
use tracing::{debug, warn};

/// Text layout SQLite uses for `CURRENT_TIMESTAMP`.
const SQLITE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("descriptor declares {expected} fields but the query returned {found} columns")]
    DescriptorMismatch { expected: usize, found: usize },

    #[error("query returned more than one row")]
    TooManyRows,

    #[error("field `{field}`: {reason}")]
    Decode { field: String, reason: String },

    #[error("unique constraint failed on {target}")]
    Conflict { target: String },

    #[error("statement rolled back by guard")]
    Aborted,
}

impl MapperError {
    fn decode(field: &str, reason: impl fmt::Display) -> Self {
        Self::Decode {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    /// The violated target (e.g. `users.email`) when this is a conflict.
    pub fn conflict_target(&self) -> Option<&str> {
        match self {
            Self::Conflict { target } => Some(target),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Text,
    /// Epoch seconds; stored either as an integer or as SQLite timestamp text.
    Timestamp,
}

/// Turns the raw text of a denormalized column into nested records.
pub type Expansion = Arc<dyn Fn(&str) -> Vec<Record> + Send + Sync>;

#[derive(Clone)]
struct Field {
    name: &'static str,
    ty: FieldType,
    expansion: Option<Expansion>,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("expandable", &self.expansion.is_some())
            .finish()
    }
}

/// Ordered field list matching a query's columns one for one.
#[derive(Debug, Clone, Default)]
pub struct Descriptor {
    fields: Vec<Field>,
}

impl Descriptor {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, name: &'static str, ty: FieldType, expansion: Option<Expansion>) -> Self {
        self.fields.push(Field {
            name,
            ty,
            expansion,
        });
        self
    }

    pub fn integer(self, name: &'static str) -> Self {
        self.push(name, FieldType::Integer, None)
    }

    pub fn text(self, name: &'static str) -> Self {
        self.push(name, FieldType::Text, None)
    }

    pub fn timestamp(self, name: &'static str) -> Self {
        self.push(name, FieldType::Timestamp, None)
    }

    /// A text column whose value is replaced by `expand(raw)`.
    pub fn expand<F>(self, name: &'static str, expand: F) -> Self
    where
        F: Fn(&str) -> Vec<Record> + Send + Sync + 'static,
    {
        self.with_expansion(name, Arc::new(expand))
    }

    pub fn with_expansion(self, name: &'static str, expansion: Expansion) -> Self {
        self.push(name, FieldType::Text, Some(expansion))
    }

    fn decode_row(&self, row: &SqliteRow) -> Result<Record, MapperError> {
        if row.len() != self.fields.len() {
            return Err(MapperError::DescriptorMismatch {
                expected: self.fields.len(),
                found: row.len(),
            });
        }

        let mut record = Record::with_capacity(self.fields.len());
        for (index, field) in self.fields.iter().enumerate() {
            let value = match &field.expansion {
                Some(expand) => {
                    let raw = decode_text(row, index, field.name)?.unwrap_or_default();
                    Value::Expanded(expand(&raw))
                }
                None => decode_scalar(row, index, field)?,
            };
            record.push(field.name, value);
        }
        Ok(record)
    }
}

fn decode_scalar(row: &SqliteRow, index: usize, field: &Field) -> Result<Value, MapperError> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let stored = raw.type_info().name().to_string();

    match field.ty {
        FieldType::Integer => row
            .try_get::<i64, _>(index)
            .map(Value::Integer)
            .map_err(|e| MapperError::decode(field.name, e)),

        FieldType::Text => Ok(decode_text(row, index, field.name)?
            .map(Value::Text)
            .unwrap_or(Value::Null)),

        FieldType::Timestamp if stored == "INTEGER" => row
            .try_get::<i64, _>(index)
            .map(Value::Timestamp)
            .map_err(|e| MapperError::decode(field.name, e)),

        FieldType::Timestamp => {
            let text: String = row
                .try_get(index)
                .map_err(|e| MapperError::decode(field.name, e))?;
            parse_timestamp(&text)
                .map(Value::Timestamp)
                .ok_or_else(|| MapperError::decode(field.name, format!("not a timestamp: {}", text)))
        }
    }
}

/// Text view of a column, rendering numeric storage as its decimal form.
fn decode_text(row: &SqliteRow, index: usize, name: &str) -> Result<Option<String>, MapperError> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(None);
    }

    let text = match raw.type_info().name() {
        "INTEGER" => row.try_get::<i64, _>(index).map(|v| v.to_string()),
        "REAL" => row.try_get::<f64, _>(index).map(|v| v.to_string()),
        _ => row.try_get::<String, _>(index),
    };
    text.map(Some).map_err(|e| MapperError::decode(name, e))
}

/// Parse SQLite's `YYYY-MM-DD HH:MM:SS` text as UTC epoch seconds.
pub fn parse_timestamp(text: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(text.trim(), SQLITE_TIMESTAMP)
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

// ---------------------------------------------------------------------------
// Values and records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Text(String),
    Timestamp(i64),
    Null,
    Expanded(Vec<Record>),
}

/// One decoded row, fields in descriptor order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(&'static str, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_capacity(n: usize) -> Self {
        Self {
            fields: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, name: &'static str, value: Value) {
        self.fields.push((name, value));
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    /// Move a field's value out, leaving `Null` behind.
    pub fn take(&mut self, name: &str) -> Result<Value, MapperError> {
        self.fields
            .iter_mut()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| std::mem::replace(value, Value::Null))
            .ok_or_else(|| MapperError::decode(name, "no such field"))
    }

    pub fn take_i64(&mut self, name: &str) -> Result<i64, MapperError> {
        match self.take(name)? {
            Value::Integer(v) | Value::Timestamp(v) => Ok(v),
            other => Err(MapperError::decode(name, format!("expected integer, got {:?}", other))),
        }
    }

    pub fn take_string(&mut self, name: &str) -> Result<String, MapperError> {
        match self.take(name)? {
            Value::Text(v) => Ok(v),
            other => Err(MapperError::decode(name, format!("expected text, got {:?}", other))),
        }
    }

    pub fn take_opt_string(&mut self, name: &str) -> Result<Option<String>, MapperError> {
        match self.take(name)? {
            Value::Null => Ok(None),
            Value::Text(v) => Ok(Some(v)),
            other => Err(MapperError::decode(name, format!("expected text, got {:?}", other))),
        }
    }

    pub fn take_records(&mut self, name: &str) -> Result<Vec<Record>, MapperError> {
        match self.take(name)? {
            Value::Expanded(records) => Ok(records),
            other => Err(MapperError::decode(
                name,
                format!("expected expanded records, got {:?}", other),
            )),
        }
    }

    /// Expanded field decoded into caller types.
    pub fn take_expanded<T: FromRecord>(&mut self, name: &str) -> Result<Vec<T>, MapperError> {
        self.take_records(name)?
            .into_iter()
            .map(T::from_record)
            .collect()
    }
}

/// Construction of a caller type from a decoded row.
pub trait FromRecord: Sized {
    fn from_record(record: Record) -> Result<Self, MapperError>;
}

impl FromRecord for Record {
    fn from_record(record: Record) -> Result<Self, MapperError> {
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Positional statement parameter, bound to `?1`, `?2`, ... in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Integer(i64),
    Text(String),
    Null,
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[Param],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            Param::Integer(v) => query.bind(*v),
            Param::Text(v) => query.bind(v.clone()),
            Param::Null => query.bind(Option::<i64>::None),
        };
    }
    query
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Every row of `sql`, mapped through `descriptor`.
pub async fn query_many<T: FromRecord>(
    pool: &SqlitePool,
    descriptor: &Descriptor,
    sql: &str,
    params: &[Param],
) -> Result<Vec<T>, MapperError> {
    let rows = bind_all(sqlx::query(sql), params).fetch_all(pool).await?;
    debug!("query_many returned {} rows", rows.len());

    rows.iter()
        .map(|row| descriptor.decode_row(row).and_then(T::from_record))
        .collect()
}

/// The single row of `sql`, `None` when there is none.
pub async fn query_one<T: FromRecord>(
    pool: &SqlitePool,
    descriptor: &Descriptor,
    sql: &str,
    params: &[Param],
) -> Result<Option<T>, MapperError> {
    let mut rows = bind_all(sqlx::query(sql), params).fetch(pool);

    let Some(first) = rows.try_next().await? else {
        return Ok(None);
    };
    if rows.try_next().await?.is_some() {
        warn!("query_one matched several rows: {}", sql);
        return Err(MapperError::TooManyRows);
    }

    descriptor.decode_row(&first).and_then(T::from_record).map(Some)
}

/// What a committed statement changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executed {
    pub rows_affected: u64,
    pub last_insert_id: i64,
}

/// Run `sql` in its own transaction.
///
/// A failing statement is rolled back and its error returned, a unique
/// violation surfacing as [`MapperError::Conflict`]. Otherwise the
/// transaction is rolled back with [`MapperError::Aborted`] when `abort`
/// holds, and committed when it does not.
pub async fn exec_with_guard(
    pool: &SqlitePool,
    sql: &str,
    params: &[Param],
    abort: bool,
) -> Result<Executed, MapperError> {
    let mut done = exec_all_with_guard(pool, &[(sql, params)], abort).await?;
    done.pop().ok_or(MapperError::Aborted)
}

/// [`exec_with_guard`] over several statements sharing one transaction.
///
/// Statements run in order; the first failure rolls all of them back.
pub async fn exec_all_with_guard(
    pool: &SqlitePool,
    statements: &[(&str, &[Param])],
    abort: bool,
) -> Result<Vec<Executed>, MapperError> {
    let mut tx = pool.begin().await?;
    let mut done = Vec::with_capacity(statements.len());

    for (sql, params) in statements {
        match bind_all(sqlx::query(sql), params).execute(&mut *tx).await {
            Ok(result) => done.push(Executed {
                rows_affected: result.rows_affected(),
                last_insert_id: result.last_insert_rowid(),
            }),
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback after failed statement also failed: {}", rollback);
                }
                return Err(classify(e));
            }
        }
    }

    if abort {
        tx.rollback().await?;
        debug!("Guard aborted {} statement(s)", statements.len());
        return Err(MapperError::Aborted);
    }

    tx.commit().await?;
    Ok(done)
}

/// Does `sql` return at least one row?
pub async fn exists(pool: &SqlitePool, sql: &str, params: &[Param]) -> Result<bool, MapperError> {
    let row = bind_all(sqlx::query(sql), params)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

fn classify(err: sqlx::Error) -> MapperError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            let target = conflict_target(db.message());
            warn!("Unique constraint violated on {}", target);
            MapperError::Conflict { target }
        }
        _ => MapperError::Storage(err),
    }
}

/// `"UNIQUE constraint failed: users.email"` -> `"users.email"`.
fn conflict_target(message: &str) -> String {
    message
        .rsplit_once(": ")
        .map(|(_, target)| target)
        .unwrap_or(message)
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}
