use csv::{ReaderBuilder, StringRecord, Trim};

use super::decoder::{DecodedChunk, DelimitedConfig, PayloadDecoder};
use super::error::{DecodeError, LineError, SchemaError};
use super::locator::ChunkRef;
use super::stream_table::{FieldType, Row};
use super::timestamp::Timestamp;

/// Rows read from a delimited chunk, each tagged with its record number within the chunk
#[derive(Debug, Default)]
pub(crate) struct TextRows {
    pub columns: Vec<String>,
    pub rows: Vec<(usize, Row)>,
    pub errors: Vec<DecodeError>,
}

/// Layout of a delimited chunk: the timestamp comes first, then one field per column
#[derive(Debug, Clone)]
pub(crate) struct TextLayout<'a> {
    pub delimiter: u8,
    pub header: bool,
    pub types: &'a [FieldType],
    pub columns: &'a [String],
}

fn line_of(record: &StringRecord, fallback: u64) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(fallback)
}

fn parse_record(
    record: &StringRecord,
    columns: &[String],
    types: &[FieldType],
) -> Result<Row, LineError> {
    let time_field = record.get(0).ok_or(LineError::MissingTimestamp)?;
    if time_field.is_empty() {
        return Err(LineError::MissingTimestamp);
    }
    let time = Timestamp::parse_seconds(time_field)
        .map_err(|_| LineError::BadTimestamp(time_field.to_string()))?;

    let found = record.len() - 1;
    if found != columns.len() {
        return Err(LineError::FieldCount {
            expected: columns.len(),
            found,
        });
    }

    let mut values = Vec::with_capacity(found);
    for (idx, field) in record.iter().skip(1).enumerate() {
        let value = match types.get(idx) {
            Some(kind) => kind.parse(field).ok_or_else(|| LineError::BadField {
                column: columns[idx].clone(),
                value: field.to_string(),
                kind: kind.to_string(),
            })?,
            None => FieldType::infer(field),
        };
        values.push(value);
    }
    Ok(Row::new(time, values))
}

/// Read every record of a delimited chunk.
///
/// Malformed lines are recorded with their 1-based line number and skipped; reading
/// continues with the next line.
pub(crate) fn read_text_rows(bytes: &[u8], layout: &TextLayout) -> TextRows {
    let mut result = TextRows::default();
    let mut reader = ReaderBuilder::new()
        .delimiter(layout.delimiter)
        .has_headers(layout.header)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let mut columns: Option<Vec<String>> = if layout.columns.is_empty() {
        None
    } else {
        Some(layout.columns.to_vec())
    };
    if layout.header {
        match reader.headers() {
            Ok(headers) => {
                if columns.is_none() && !headers.is_empty() {
                    columns = Some(headers.iter().skip(1).map(|h| h.to_string()).collect());
                }
            }
            Err(e) => {
                result.errors.push(DecodeError::Line {
                    line: 1,
                    source: LineError::Read(e.to_string()),
                });
                return result;
            }
        }
    }

    if let Some(names) = &columns {
        if !layout.types.is_empty() && layout.types.len() != names.len() {
            result.errors.push(DecodeError::Line {
                line: 1,
                source: LineError::FieldCount {
                    expected: layout.types.len(),
                    found: names.len(),
                },
            });
            return result;
        }
    }

    let mut last_line: u64 = if layout.header { 1 } else { 0 };
    for (ordinal, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(last_line + 1);
                last_line = line;
                result.errors.push(DecodeError::Line {
                    line,
                    source: LineError::Read(e.to_string()),
                });
                continue;
            }
        };
        let line = line_of(&record, last_line + 1);
        last_line = line;

        let names = columns.get_or_insert_with(|| {
            (0..record.len().saturating_sub(1))
                .map(|i| i.to_string())
                .collect()
        });
        match parse_record(&record, names, layout.types) {
            Ok(row) => result.rows.push((ordinal, row)),
            Err(source) => result.errors.push(DecodeError::Line { line, source }),
        }
    }
    result.columns = columns.unwrap_or_default();
    result
}

/// DelimitedDecoder reads text chunks of `time,field,field,...` lines.
///
/// The time is a decimal count of seconds since the reference epoch. Fields are typed
/// by the stream's declared types, or inferred per field when none are declared.
#[derive(Debug, Clone)]
pub struct DelimitedDecoder {
    config: DelimitedConfig,
    columns: Vec<String>,
}

impl DelimitedDecoder {
    pub fn new(
        path: &str,
        config: DelimitedConfig,
        columns: Vec<String>,
    ) -> Result<Self, SchemaError> {
        if !config.delimiter.is_ascii() {
            return Err(SchemaError::BadDecoder {
                path: path.to_string(),
                reason: format!("delimiter {:?} is not a single byte", config.delimiter),
            });
        }
        if !config.types.is_empty() && !columns.is_empty() && config.types.len() != columns.len()
        {
            return Err(SchemaError::BadDecoder {
                path: path.to_string(),
                reason: format!(
                    "{} types declared for {} columns",
                    config.types.len(),
                    columns.len()
                ),
            });
        }
        if !config.header && columns.is_empty() && !config.types.is_empty() {
            return Err(SchemaError::BadDecoder {
                path: path.to_string(),
                reason: String::from("types need named columns when the chunks have no header"),
            });
        }
        Ok(Self { config, columns })
    }
}

impl PayloadDecoder for DelimitedDecoder {
    fn decode(&self, bytes: &[u8], chunk: &ChunkRef) -> DecodedChunk {
        let layout = TextLayout {
            delimiter: self.config.delimiter as u8,
            header: self.config.header,
            types: &self.config.types,
            columns: &self.columns,
        };
        let text = read_text_rows(bytes, &layout);
        log::debug!(
            "Decoded {} lines from {} ({} errors)",
            text.rows.len(),
            chunk.path.display(),
            text.errors.len()
        );
        DecodedChunk {
            columns: text.columns,
            rows: text.rows.into_iter().map(|(_, row)| row).collect(),
            errors: text.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_id::StreamId;
    use crate::stream_table::Value;
    use std::path::PathBuf;

    fn chunk() -> ChunkRef {
        ChunkRef {
            id: StreamId::new("Patch2", "State"),
            chunk_start: Timestamp::from_nanos(0),
            epoch: String::from("2022-06-13T11-00-00"),
            path: PathBuf::from("Patch2_State_2022-06-13T12-00-00.csv"),
        }
    }

    fn decoder(config: DelimitedConfig, columns: &[&str]) -> DelimitedDecoder {
        DelimitedDecoder::new(
            "Patch2.State",
            config,
            columns.iter().map(|c| c.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_header_names_columns() {
        let text = "time,threshold,d1,delta\n3.5,12.5,4,0.25\n4.0, 13.0 ,5,0.5\n";
        let decoded = decoder(DelimitedConfig::default(), &[]).decode(text.as_bytes(), &chunk());
        assert!(decoded.errors.is_empty());
        assert_eq!(decoded.columns, vec!["threshold", "d1", "delta"]);
        assert_eq!(decoded.rows.len(), 2);
        assert_eq!(decoded.rows[0].time, Timestamp::from_nanos(3_500_000_000));
        assert_eq!(
            decoded.rows[1].values,
            vec![Value::Float(13.0), Value::Int(5), Value::Float(0.5)]
        );
    }

    #[test]
    fn test_malformed_lines_are_reported() {
        let text = "time,event\n1.0,Enter\nabc,Exit\n2.0,Exit,extra\n3.0,Enter\n";
        let decoded = decoder(DelimitedConfig::default(), &[]).decode(text.as_bytes(), &chunk());
        assert_eq!(decoded.rows.len(), 2);
        assert_eq!(
            decoded.errors,
            vec![
                DecodeError::Line {
                    line: 3,
                    source: LineError::BadTimestamp(String::from("abc"))
                },
                DecodeError::Line {
                    line: 4,
                    source: LineError::FieldCount {
                        expected: 1,
                        found: 2
                    }
                },
            ]
        );
    }

    #[test]
    fn test_declared_types() {
        let config = DelimitedConfig {
            delimiter: ';',
            header: false,
            types: vec![FieldType::UInt, FieldType::Text],
        };
        let text = "10;7;Start\n11;-1;Stop\n12;;Stop\n";
        let decoded = decoder(config, &["count", "label"]).decode(text.as_bytes(), &chunk());
        assert_eq!(decoded.columns, vec!["count", "label"]);
        assert_eq!(decoded.rows.len(), 2);
        assert_eq!(decoded.rows[1].values[0], Value::Null);
        assert!(matches!(
            &decoded.errors[0],
            DecodeError::Line { line: 2, source: LineError::BadField { column, .. } } if column == "count"
        ));
    }

    #[test]
    fn test_headerless_default_names_and_empty() {
        let config = DelimitedConfig {
            header: false,
            ..DelimitedConfig::default()
        };
        let decoded = decoder(config.clone(), &[]).decode(b"1.0,a,\"b,c\"\n", &chunk());
        assert_eq!(decoded.columns, vec!["0", "1"]);
        assert_eq!(
            decoded.rows[0].values,
            vec![Value::Text(String::from("a")), Value::Text(String::from("b,c"))]
        );

        let decoded = decoder(config, &[]).decode(b"", &chunk());
        assert!(decoded.rows.is_empty() && decoded.errors.is_empty());
    }

    #[test]
    fn test_bad_config() {
        let config = DelimitedConfig {
            delimiter: 'é',
            ..DelimitedConfig::default()
        };
        assert!(DelimitedDecoder::new("Patch2.State", config, vec![]).is_err());

        let config = DelimitedConfig {
            types: vec![FieldType::Int],
            ..DelimitedConfig::default()
        };
        assert!(DelimitedDecoder::new(
            "Patch2.State",
            config,
            vec![String::from("a"), String::from("b")]
        )
        .is_err());
    }

    #[test]
    fn test_record_ordinals() {
        let layout = TextLayout {
            delimiter: b',',
            header: true,
            types: &[],
            columns: &[],
        };
        let text = "time,x\n1,1\nbad,2\n3,3\n";
        let rows = read_text_rows(text.as_bytes(), &layout);
        let ordinals: Vec<usize> = rows.rows.iter().map(|(o, _)| *o).collect();
        assert_eq!(ordinals, vec![0, 2]);
    }
}
