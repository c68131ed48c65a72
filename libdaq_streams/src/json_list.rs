use super::decoder::{DecodedChunk, JsonListConfig, PayloadDecoder};
use super::error::{DecodeError, LineError};
use super::locator::ChunkRef;
use super::stream_table::{Row, Value};
use super::timestamp::Timestamp;

/// The record field holding the row time, in seconds
const SECONDS_KEY: &str = "seconds";

/// Convert a JSON value to a table value. Arrays and objects are kept as compact JSON text.
pub(crate) fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                Value::Int(v)
            } else if let Some(v) = n.as_u64() {
                Value::UInt(v)
            } else {
                n.as_f64().map(Value::Float).unwrap_or(Value::Null)
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

/// JsonListDecoder reads chunks holding one JSON object per line.
///
/// Every object carries its time in `seconds`. With declared columns, each column is
/// the field of that name inside the object under `root_key`; otherwise the whole
/// `root_key` value is the single column.
#[derive(Debug, Clone)]
pub struct JsonListDecoder {
    config: JsonListConfig,
    columns: Vec<String>,
}

impl JsonListDecoder {
    pub fn new(config: JsonListConfig, columns: Vec<String>) -> Self {
        Self { config, columns }
    }

    fn output_columns(&self) -> Vec<String> {
        if self.columns.is_empty() {
            vec![self.config.root_key.clone()]
        } else {
            self.columns.clone()
        }
    }

    fn parse_line(&self, line: &str) -> Result<Row, LineError> {
        let record: serde_json::Value =
            serde_json::from_str(line).map_err(|e| LineError::Read(e.to_string()))?;
        let object = record
            .as_object()
            .ok_or_else(|| LineError::Read(String::from("record is not a JSON object")))?;

        let time = match object.get(SECONDS_KEY) {
            Some(serde_json::Value::Number(n)) => Timestamp::parse_seconds(&n.to_string())
                .map_err(|_| LineError::BadTimestamp(n.to_string()))?,
            Some(serde_json::Value::String(s)) => {
                Timestamp::parse_seconds(s).map_err(|_| LineError::BadTimestamp(s.clone()))?
            }
            Some(other) => return Err(LineError::BadTimestamp(other.to_string())),
            None => return Err(LineError::MissingTimestamp),
        };

        let root = object
            .get(&self.config.root_key)
            .ok_or_else(|| LineError::MissingField(self.config.root_key.clone()))?;
        if self.columns.is_empty() {
            return Ok(Row::new(time, vec![json_to_value(root)]));
        }

        let mut values = Vec::with_capacity(self.columns.len());
        for column in self.columns.iter() {
            let field = root
                .get(column)
                .ok_or_else(|| LineError::MissingField(format!("{}.{column}", self.config.root_key)))?;
            values.push(json_to_value(field));
        }
        Ok(Row::new(time, values))
    }
}

impl PayloadDecoder for JsonListDecoder {
    fn decode(&self, bytes: &[u8], chunk: &ChunkRef) -> DecodedChunk {
        let mut decoded = DecodedChunk {
            columns: self.output_columns(),
            ..DecodedChunk::default()
        };
        let text = String::from_utf8_lossy(bytes);
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match self.parse_line(line) {
                Ok(row) => decoded.rows.push(row),
                Err(source) => decoded.errors.push(DecodeError::Line {
                    line: idx as u64 + 1,
                    source,
                }),
            }
        }
        log::debug!(
            "Read {} records from {}",
            decoded.rows.len(),
            chunk.path.display()
        );
        decoded
    }
}
