use super::decoder::{DecodedChunk, PayloadDecoder, VideoIndexConfig};
use super::locator::ChunkRef;
use super::stream_table::{FieldType, Row, Value};
use super::text_decoder::{read_text_rows, TextLayout};

const INDEX_TYPES: [FieldType; 2] = [FieldType::UInt, FieldType::UInt];

/// VideoIndexDecoder reads the frame index written next to each video chunk.
///
/// Index lines are `time,hw_counter,hw_timestamp`, one per captured frame. Each row
/// points at its frame by number within the frame store, which has the index's stem
/// and the configured video extension. Frame contents are never read.
#[derive(Debug, Clone)]
pub struct VideoIndexDecoder {
    config: VideoIndexConfig,
    index_columns: Vec<String>,
}

impl VideoIndexDecoder {
    pub fn new(config: VideoIndexConfig) -> Self {
        Self {
            config,
            index_columns: vec![String::from("hw_counter"), String::from("hw_timestamp")],
        }
    }

    pub fn columns() -> Vec<String> {
        ["hw_counter", "hw_timestamp", "frame", "path", "epoch"]
            .iter()
            .map(|c| c.to_string())
            .collect()
    }
}

impl PayloadDecoder for VideoIndexDecoder {
    fn decode(&self, bytes: &[u8], chunk: &ChunkRef) -> DecodedChunk {
        let layout = TextLayout {
            delimiter: b',',
            header: true,
            types: &INDEX_TYPES,
            columns: &self.index_columns,
        };
        let text = read_text_rows(bytes, &layout);

        let frame_store = chunk.path.with_extension(&self.config.video_extension);
        let frame_store = frame_store.to_string_lossy().to_string();
        let rows = text
            .rows
            .into_iter()
            .map(|(frame, mut row)| {
                row.values.push(Value::UInt(frame as u64));
                row.values.push(Value::Text(frame_store.clone()));
                row.values.push(Value::Text(chunk.epoch.clone()));
                row
            })
            .collect::<Vec<Row>>();

        log::debug!(
            "Indexed {} frames of {}",
            rows.len(),
            frame_store
        );
        DecodedChunk {
            columns: Self::columns(),
            rows,
            errors: text.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeError, LineError};
    use crate::stream_id::StreamId;
    use crate::timestamp::Timestamp;
    use std::path::PathBuf;

    #[test]
    fn test_frame_rows() {
        let chunk = ChunkRef {
            id: StreamId::new("CameraTop", "200"),
            chunk_start: Timestamp::from_nanos(0),
            epoch: String::from("2022-06-13T11-00-00"),
            path: PathBuf::from("/data/2022-06-13T11-00-00/CameraTop/CameraTop_200_2022-06-13T12-00-00.csv"),
        };
        let index = "time,hw_counter,hw_timestamp\n10.00,100,5000\n10.02,101,x\n10.04,102,5040\n";
        let decoded = VideoIndexDecoder::new(VideoIndexConfig::default()).decode(index.as_bytes(), &chunk);

        assert_eq!(decoded.columns, VideoIndexDecoder::columns());
        assert_eq!(decoded.rows.len(), 2);
        assert!(matches!(
            decoded.errors[0],
            DecodeError::Line {
                line: 3,
                source: LineError::BadField { .. }
            }
        ));
        assert_eq!(
            decoded.rows[1].values,
            vec![
                Value::UInt(102),
                Value::UInt(5040),
                Value::UInt(2),
                Value::Text(String::from(
                    "/data/2022-06-13T11-00-00/CameraTop/CameraTop_200_2022-06-13T12-00-00.avi"
                )),
                Value::Text(String::from("2022-06-13T11-00-00")),
            ]
        );
        assert_eq!(decoded.rows[0].time, Timestamp::from_nanos(10_000_000_000));
    }
}
