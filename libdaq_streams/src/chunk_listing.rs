use super::decoder::{DecodedChunk, PayloadDecoder};
use super::locator::ChunkRef;
use super::stream_table::{Row, Value};

/// ChunkDecoder lists the chunk files of a stream without reading them: one row per
/// chunk, at its chunk start, holding the file path and epoch.
#[derive(Debug, Clone, Default)]
pub struct ChunkDecoder;

impl ChunkDecoder {
    pub fn columns() -> Vec<String> {
        vec![String::from("path"), String::from("epoch")]
    }
}

impl PayloadDecoder for ChunkDecoder {
    fn decode(&self, _bytes: &[u8], chunk: &ChunkRef) -> DecodedChunk {
        let values = vec![
            Value::Text(chunk.path.to_string_lossy().to_string()),
            Value::Text(chunk.epoch.clone()),
        ];
        DecodedChunk {
            columns: Self::columns(),
            rows: vec![Row::new(chunk.chunk_start, values)],
            errors: vec![],
        }
    }

    fn reads_contents(&self) -> bool {
        false
    }
}
