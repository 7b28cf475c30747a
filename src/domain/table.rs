//! In-memory tabular model
//!
//! A `Table` is an ordered list of named, typed columns of equal length. Rows
//! are addressed by position. The relational operations the load pipeline
//! needs live here:
//! - column projection
//! - exact-duplicate row removal
//! - surrogate key assignment
//! - stable multi-column sort
//! - single-key inner join

use crate::domain::error::{AppError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    Boolean,
    Int64,
    Float64,
    Utf8,
    /// May also hold `Value::Str` for entries that failed to parse
    DateTime,
    Binary,
}

impl DType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, DType::Int64 | DType::Float64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Boolean => write!(f, "bool"),
            DType::Int64 => write!(f, "int64"),
            DType::Float64 => write!(f, "float64"),
            DType::Utf8 => write!(f, "string"),
            DType::DateTime => write!(f, "datetime"),
            DType::Binary => write!(f, "binary"),
        }
    }
}

/// A single cell
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    DateTime(NaiveDateTime),
    Bytes(Vec<u8>),
}

impl Value {
    /// `Null` and `NaN` both count as missing
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Str(_) => 3,
            Value::DateTime(_) => 4,
            Value::Bytes(_) => 5,
        }
    }

    /// Ascending sort order with missing values last
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }

        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.kind_rank().cmp(&other.kind_rank()),
            },
        }
    }
}

fn float_bits(f: f64) -> u64 {
    if f.is_nan() {
        f64::NAN.to_bits()
    } else if f == 0.0 {
        0.0f64.to_bits()
    } else {
        f.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if self.is_null() || other.is_null() {
            return self.is_null() && other.is_null();
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => float_bits(*a) == float_bits(*b),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if self.is_null() {
            state.write_u8(0);
            return;
        }
        match self {
            Value::Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Value::Int(i) => {
                state.write_u8(2);
                i.hash(state);
            }
            Value::Float(f) => {
                state.write_u8(3);
                float_bits(*f).hash(state);
            }
            Value::Str(s) => {
                state.write_u8(4);
                s.hash(state);
            }
            Value::DateTime(dt) => {
                state.write_u8(5);
                dt.hash(state);
            }
            Value::Bytes(b) => {
                state.write_u8(6);
                b.hash(state);
            }
            Value::Null => {}
        }
    }
}

/// Parse a date or date-time in one of the accepted layouts
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

/// A named, typed column
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub dtype: DType,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: DType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            dtype,
            values,
        }
    }

    pub fn boolean(name: impl Into<String>, values: Vec<Option<bool>>) -> Self {
        let values = values.into_iter().map(|v| v.map_or(Value::Null, Value::Bool)).collect();
        Self::new(name, DType::Boolean, values)
    }

    pub fn int64(name: impl Into<String>, values: Vec<Option<i64>>) -> Self {
        let values = values.into_iter().map(|v| v.map_or(Value::Null, Value::Int)).collect();
        Self::new(name, DType::Int64, values)
    }

    pub fn float64(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        let values = values.into_iter().map(|v| v.map_or(Value::Null, Value::Float)).collect();
        Self::new(name, DType::Float64, values)
    }

    pub fn utf8(name: impl Into<String>, values: Vec<Option<&str>>) -> Self {
        let values = values
            .into_iter()
            .map(|v| v.map_or(Value::Null, |s| Value::Str(s.to_string())))
            .collect();
        Self::new(name, DType::Utf8, values)
    }

    /// Date column from raw text; unparsable entries are kept as strings
    pub fn datetime_from_strs(name: impl Into<String>, values: Vec<Option<&str>>) -> Self {
        let values = values
            .into_iter()
            .map(|v| match v {
                None => Value::Null,
                Some(raw) => parse_datetime(raw)
                    .map(Value::DateTime)
                    .unwrap_or_else(|| Value::Str(raw.to_string())),
            })
            .collect();
        Self::new(name, DType::DateTime, values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    fn take(&self, positions: &[usize]) -> Column {
        Column {
            name: self.name.clone(),
            dtype: self.dtype,
            values: positions.iter().map(|&i| self.values[i].clone()).collect(),
        }
    }
}

/// Ordered collection of equal-length columns
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let expected = first.len();
            if let Some(ragged) = columns.iter().find(|c| c.len() != expected) {
                return Err(AppError::SchemaError(format!(
                    "Column '{}' has {} rows, expected {}",
                    ragged.name,
                    ragged.len(),
                    expected
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn row(&self, index: usize) -> Vec<&Value> {
        self.columns.iter().map(|c| &c.values[index]).collect()
    }

    /// Select columns by name, in the given order
    pub fn project(&self, names: &[String]) -> Result<Table> {
        let columns = names
            .iter()
            .map(|name| {
                self.column(name).cloned().ok_or_else(|| {
                    AppError::SchemaError(format!(
                        "Column '{}' not found (available: {})",
                        name,
                        self.column_names().join(", ")
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Table { columns })
    }

    /// Keep the first occurrence of every distinct row
    pub fn drop_duplicates(&self) -> Table {
        let mut seen: HashSet<Vec<&Value>> = HashSet::new();
        let keep: Vec<usize> = (0..self.row_count())
            .filter(|&i| seen.insert(self.row(i)))
            .collect();
        self.take_rows(&keep)
    }

    /// Prepend an `Int64` column numbering rows `1..=N` in current order
    pub fn with_surrogate_key(&self, name: &str) -> Table {
        let ids = (1..=self.row_count() as i64).map(Value::Int).collect();
        let mut columns = vec![Column::new(name, DType::Int64, ids)];
        columns.extend(self.columns.iter().filter(|c| c.name != name).cloned());
        Table { columns }
    }

    /// Stable ascending sort, nulls last
    pub fn sort_by(&self, keys: &[String]) -> Result<Table> {
        let key_columns = keys
            .iter()
            .map(|key| {
                self.column(key).ok_or_else(|| {
                    AppError::SchemaError(format!("Sort column '{}' not found", key))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut order: Vec<usize> = (0..self.row_count()).collect();
        order.sort_by(|&a, &b| {
            key_columns
                .iter()
                .map(|col| col.values[a].sort_cmp(&col.values[b]))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        Ok(self.take_rows(&order))
    }

    /// Equality inner join on a single column present on both sides.
    ///
    /// Rows follow left order, then right order within one left row.
    /// Non-key columns present on both sides get `_x` / `_y` suffixes.
    pub fn inner_join(&self, right: &Table, key: &str) -> Result<Table> {
        let left_key = self.column(key).ok_or_else(|| {
            AppError::MergeError(format!("Join key '{}' not found in left table", key))
        })?;
        let right_key = right.column(key).ok_or_else(|| {
            AppError::MergeError(format!("Join key '{}' not found in right table", key))
        })?;
        let promote = numeric_promotion(left_key.dtype, right_key.dtype, key)?;

        let mut right_index: HashMap<Value, Vec<usize>> = HashMap::new();
        for (pos, value) in right_key.values.iter().enumerate() {
            right_index.entry(join_value(value, promote)).or_default().push(pos);
        }

        let mut left_rows = Vec::new();
        let mut right_rows = Vec::new();
        for (pos, value) in left_key.values.iter().enumerate() {
            if let Some(matches) = right_index.get(&join_value(value, promote)) {
                for &right_pos in matches {
                    left_rows.push(pos);
                    right_rows.push(right_pos);
                }
            }
        }

        let left_names: HashSet<&str> = self.column_names().into_iter().collect();
        let right_names: HashSet<&str> = right.column_names().into_iter().collect();

        let mut columns = Vec::with_capacity(self.columns.len() + right.columns.len());
        for col in &self.columns {
            let mut out = col.take(&left_rows);
            if col.name != key && right_names.contains(col.name.as_str()) {
                out.name = format!("{}_x", col.name);
            }
            columns.push(out);
        }
        for col in right.columns.iter().filter(|c| c.name != key) {
            let mut out = col.take(&right_rows);
            if left_names.contains(col.name.as_str()) {
                out.name = format!("{}_y", col.name);
            }
            columns.push(out);
        }

        Ok(Table { columns })
    }

    fn take_rows(&self, positions: &[usize]) -> Table {
        Table {
            columns: self.columns.iter().map(|c| c.take(positions)).collect(),
        }
    }
}

fn numeric_promotion(left: DType, right: DType, key: &str) -> Result<bool> {
    if left == right {
        return Ok(false);
    }
    if left.is_numeric() && right.is_numeric() {
        return Ok(true);
    }
    Err(AppError::MergeError(format!(
        "Cannot join on '{}': left column is {} but right column is {}",
        key, left, right
    )))
}

fn join_value(value: &Value, promote: bool) -> Value {
    match value {
        Value::Int(i) if promote => Value::Float(*i as f64),
        other => other.clone(),
    }
}
