use super::decoder::{BinaryConfig, BitmaskMode, DecodedChunk, PayloadDecoder};
use super::error::{DecodeError, FrameError, SchemaError};
use super::frame::{FrameHeader, FrameReader, PayloadType};
use super::locator::ChunkRef;
use super::stream_table::{Row, Value};
use super::timestamp::Timestamp;

const EVENT_COLUMN: &str = "event";
const DIGITAL_COLUMN: &str = "state";

/// BinaryDecoder extracts one register from a chunk of device frames.
///
/// A chunk file may multiplex several registers (and devices); frames that do not
/// match the configured filters are skipped without error.
#[derive(Debug, Clone)]
pub struct BinaryDecoder {
    config: BinaryConfig,
    columns: Vec<String>,
}

impl BinaryDecoder {
    pub fn new(path: &str, config: BinaryConfig, columns: Vec<String>) -> Result<Self, SchemaError> {
        if config.bitmask.is_some() {
            if matches!(config.payload, PayloadType::F32 | PayloadType::F64) {
                return Err(SchemaError::BadDecoder {
                    path: path.to_string(),
                    reason: format!(
                        "bitmask decoding needs an integer payload, not {:?}",
                        config.payload
                    ),
                });
            }
            if matches!(config.bitmask, Some(BitmaskMode::Event { .. })) && columns.len() > 1 {
                return Err(SchemaError::BadDecoder {
                    path: path.to_string(),
                    reason: String::from("bitmask events produce a single column"),
                });
            }
        }
        Ok(Self { config, columns })
    }

    fn accepts(&self, header: &FrameHeader) -> bool {
        header.register_id == self.config.register
            && self.config.device_id.is_none_or(|id| id == header.device_id)
            && self
                .config
                .message_type
                .is_none_or(|kind| kind == header.message_type)
    }

    /// Decode every accepted frame into its timestamp and payload elements
    fn read_frames(&self, bytes: &[u8], errors: &mut Vec<DecodeError>) -> Vec<(usize, Row)> {
        let mut rows = Vec::new();
        for result in FrameReader::new(bytes) {
            let frame = match result {
                Ok(frame) => frame,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            if !self.accepts(&frame.header) {
                continue;
            }
            match self.config.payload.decode(frame.payload) {
                Ok(values) => rows.push((frame.offset, Row::new(frame.header.timestamp, values))),
                Err(source) => errors.push(DecodeError::Frame {
                    offset: frame.offset,
                    source,
                }),
            }
        }
        rows
    }

    fn decode_plain(&self, frames: Vec<(usize, Row)>, decoded: &mut DecodedChunk) {
        let mut columns = if self.columns.is_empty() {
            None
        } else {
            Some(self.columns.clone())
        };
        for (offset, row) in frames {
            let names = columns
                .get_or_insert_with(|| (0..row.values.len()).map(|i| i.to_string()).collect());
            if names.len() != row.values.len() {
                decoded.errors.push(DecodeError::Frame {
                    offset,
                    source: FrameError::ColumnCount {
                        expected: names.len(),
                        found: row.values.len(),
                    },
                });
                continue;
            }
            decoded.rows.push(row);
        }
        decoded.columns = columns.unwrap_or_default();
    }

    fn decode_bitmask(
        &self,
        mode: &BitmaskMode,
        frames: Vec<(usize, Row)>,
        decoded: &mut DecodedChunk,
    ) {
        let mut states: Vec<(usize, Timestamp, Vec<u64>)> = Vec::with_capacity(frames.len());
        for (offset, row) in frames {
            match bit_states(&row.values) {
                Ok(bits) => states.push((offset, row.time, bits)),
                Err(source) => decoded.errors.push(DecodeError::Frame { offset, source }),
            }
        }

        match mode {
            BitmaskMode::Event { value, tag } => {
                decoded.columns = vec![self.bitmask_column(EVENT_COLUMN)];
                for (offset, time, bits) in states {
                    if bits.len() != 1 {
                        decoded.errors.push(DecodeError::Frame {
                            offset,
                            source: FrameError::BitmaskElements { found: bits.len() },
                        });
                        continue;
                    }
                    if bits[0] & value == *value {
                        decoded
                            .rows
                            .push(Row::new(time, vec![Value::Text(tag.clone())]));
                    }
                }
            }
            BitmaskMode::Digital { mask } => {
                let mut columns = if self.columns.is_empty() {
                    None
                } else {
                    Some(self.columns.clone())
                };
                // Changes are detected on the masked integers, not on their truth value
                let mut previous: Option<Vec<u64>> = None;
                for (offset, time, bits) in states {
                    let names = columns.get_or_insert_with(|| match bits.len() {
                        1 => vec![String::from(DIGITAL_COLUMN)],
                        n => (0..n).map(|i| i.to_string()).collect(),
                    });
                    if names.len() != bits.len() {
                        decoded.errors.push(DecodeError::Frame {
                            offset,
                            source: FrameError::ColumnCount {
                                expected: names.len(),
                                found: bits.len(),
                            },
                        });
                        continue;
                    }
                    let masked: Vec<u64> = bits.iter().map(|b| b & mask).collect();
                    if previous.as_ref() != Some(&masked) {
                        let levels = masked.iter().map(|m| Value::Bool(*m != 0)).collect();
                        decoded.rows.push(Row::new(time, levels));
                    }
                    previous = Some(masked);
                }
                decoded.columns = columns.unwrap_or_else(|| vec![String::from(DIGITAL_COLUMN)]);
            }
        }
    }

    fn bitmask_column(&self, default: &str) -> String {
        self.columns
            .first()
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }
}

/// Reinterpret integer payload elements as bit states
fn bit_states(values: &[Value]) -> Result<Vec<u64>, FrameError> {
    values
        .iter()
        .map(|value| match value {
            Value::UInt(v) => Ok(*v),
            Value::Int(v) => u64::try_from(*v).map_err(|_| FrameError::NegativeBitmask(*v)),
            other => Err(FrameError::Read(format!("{other} is not an integer bit state"))),
        })
        .collect()
}

impl PayloadDecoder for BinaryDecoder {
    fn decode(&self, bytes: &[u8], chunk: &ChunkRef) -> DecodedChunk {
        let mut decoded = DecodedChunk::default();
        let frames = self.read_frames(bytes, &mut decoded.errors);
        match &self.config.bitmask {
            Some(mode) => self.decode_bitmask(mode, frames, &mut decoded),
            None => self.decode_plain(frames, &mut decoded),
        }
        log::debug!(
            "Decoded {} rows from {} ({} errors)",
            decoded.rows.len(),
            chunk.path.display(),
            decoded.errors.len()
        );
        decoded
    }
}
