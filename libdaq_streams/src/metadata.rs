use super::decoder::{DecodedChunk, PayloadDecoder};
use super::error::{DecodeError, LineError};
use super::json_list::json_to_value;
use super::locator::ChunkRef;
use super::stream_table::{Row, Value};

const WORKFLOW_KEY: &str = "Workflow";
const COMMIT_KEY: &str = "Commit";

/// MetadataDecoder reads the metadata file written once at the start of each epoch.
///
/// The file is a YAML (or JSON) mapping. It must name the `Workflow` that was run and
/// may name its `Commit`; every other entry is kept as JSON text in the `metadata`
/// column. The single row is timed at the epoch start.
#[derive(Debug, Clone, Default)]
pub struct MetadataDecoder;

impl MetadataDecoder {
    pub fn columns() -> Vec<String> {
        ["workflow", "commit", "metadata"]
            .iter()
            .map(|c| c.to_string())
            .collect()
    }

    fn parse(bytes: &[u8]) -> Result<Vec<Value>, LineError> {
        let document: serde_json::Value =
            serde_yaml::from_slice(bytes).map_err(|e| LineError::Read(e.to_string()))?;
        let mut entries = match document {
            serde_json::Value::Object(map) => map,
            _ => return Err(LineError::Read(String::from("metadata is not a mapping"))),
        };
        let workflow = entries
            .remove(WORKFLOW_KEY)
            .ok_or_else(|| LineError::MissingField(WORKFLOW_KEY.to_string()))?;
        let commit = entries
            .remove(COMMIT_KEY)
            .map(|c| json_to_value(&c))
            .unwrap_or(Value::Null);
        let rest = serde_json::to_string(&entries).map_err(|e| LineError::Read(e.to_string()))?;
        Ok(vec![json_to_value(&workflow), commit, Value::Text(rest)])
    }
}

impl PayloadDecoder for MetadataDecoder {
    fn decode(&self, bytes: &[u8], chunk: &ChunkRef) -> DecodedChunk {
        let mut decoded = DecodedChunk {
            columns: Self::columns(),
            ..DecodedChunk::default()
        };
        match Self::parse(bytes) {
            Ok(values) => decoded.rows.push(Row::new(chunk.chunk_start, values)),
            Err(source) => decoded.errors.push(DecodeError::Line { line: 1, source }),
        }
        decoded
    }
}
