use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::timestamp::Timestamp;

/// A single typed field of a decoded row
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(String),
    Null,
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Int(v) => u64::try_from(*v).ok(),
            Self::UInt(v) => Some(*v),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// The declared type of a text field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Int,
    UInt,
    Float,
    Bool,
    Text,
}

impl Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Text => "text",
        };
        write!(f, "{name}")
    }
}

impl FieldType {
    /// Parse a text field into a value of this type. Empty fields are Null.
    pub fn parse(&self, field: &str) -> Option<Value> {
        if field.is_empty() {
            return Some(Value::Null);
        }
        match self {
            Self::Int => field.parse().ok().map(Value::Int),
            Self::UInt => field.parse().ok().map(Value::UInt),
            Self::Float => field.parse().ok().map(Value::Float),
            Self::Bool => parse_bool(field).map(Value::Bool),
            Self::Text => Some(Value::Text(field.to_string())),
        }
    }

    /// Parse a text field without a declared type: int, then float, then bool, then text.
    pub fn infer(field: &str) -> Value {
        if field.is_empty() {
            return Value::Null;
        }
        if let Ok(v) = field.parse::<i64>() {
            return Value::Int(v);
        }
        if let Ok(v) = field.parse::<f64>() {
            return Value::Float(v);
        }
        if let Some(v) = parse_bool(field) {
            return Value::Bool(v);
        }
        Value::Text(field.to_string())
    }
}

fn parse_bool(field: &str) -> Option<bool> {
    match field {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

/// One decoded record: the authoritative timestamp and one value per column
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub time: Timestamp,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(time: Timestamp, values: Vec<Value>) -> Self {
        Self { time, values }
    }
}

/// StreamTable is the reconstructed, timestamp-indexed table of one stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl StreamTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn times(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.rows.iter().map(|r| r.time)
    }

    /// True when no row precedes its predecessor
    pub fn is_monotonic(&self) -> bool {
        self.rows.windows(2).all(|w| w[0].time <= w[1].time)
    }

    /// Stable sort by timestamp. Never done implicitly by the engine.
    pub fn sort_by_time(&mut self) {
        self.rows.sort_by_key(|r| r.time);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate over the values of one column
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r.values[idx]))
    }
}
