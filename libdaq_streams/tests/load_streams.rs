mod common;

use common::{at_minute, encode_frame, encoder_frame, Corpus, EPOCH};
use libdaq_streams::aggregator::StreamLoader;
use libdaq_streams::config::LoadConfig;
use libdaq_streams::decoder::{DecodedChunk, DecoderConfig, DecoderRegistry, PayloadDecoder};
use libdaq_streams::error::{DecodeError, FrameError, LoadError, StreamError};
use libdaq_streams::frame::PayloadType;
use libdaq_streams::join::asof_join;
use libdaq_streams::locator::ChunkRef;
use libdaq_streams::schema::{Group, Schema, SchemaBuilder, StreamDefinition};
use libdaq_streams::stream_id::StreamId;
use libdaq_streams::stream_table::{Row, Value};
use libdaq_streams::time_filter::filter;
use libdaq_streams::timestamp::{Inclusive, TimeRange, Timestamp};
use libdaq_streams::worker_status::{LoadStatus, StreamState};

fn encoder_schema() -> Schema {
    SchemaBuilder::new()
        .group(
            "Patch1",
            Group::device("Patch1").stream(
                "Encoder",
                StreamDefinition::binary(90, PayloadType::I16).with_columns(&["angle", "intensity"]),
            ),
        )
        .group(
            "Patch2",
            Group::device("Patch2").stream(
                "Encoder",
                StreamDefinition::binary(90, PayloadType::I16).with_columns(&["angle", "intensity"]),
            ),
        )
        .build()
        .unwrap()
}

fn minutes(times: impl Iterator<Item = Timestamp>) -> Vec<i64> {
    times
        .map(|t| (t.as_nanos() - at_minute(0).as_nanos()) / 60_000_000_000)
        .collect()
}

#[test]
fn test_range_is_exact_over_chunks() {
    let corpus = Corpus::new();
    for hour in 0..3 {
        corpus.write_encoder_hour("Patch1", hour, 10);
    }
    let loader = StreamLoader::new(LoadConfig::default()).unwrap();
    let range = TimeRange::new(Some(at_minute(30)), Some(at_minute(130)));
    let result = loader
        .load(&corpus.roots(), &encoder_schema(), &["Patch1.Encoder"], &range)
        .unwrap();

    let stream = result.get("Patch1.Encoder").unwrap();
    assert!(stream.is_ok(), "{:?}", stream.errors);
    assert!(stream.warnings.is_empty());
    assert_eq!(stream.chunks, 3);
    assert_eq!(stream.table.columns, vec!["angle", "intensity"]);
    assert_eq!(
        minutes(stream.table.times()),
        vec![30, 40, 50, 60, 70, 80, 90, 100, 110, 120]
    );
    assert!(result.get("Patch2.Encoder").is_none());
}

#[test]
fn test_rows_written_after_the_hour_turns() {
    let corpus = Corpus::new();
    let id = StreamId::new("Patch1", "90");
    let half_past = at_minute(0).saturating_add(30_000_000_000);
    // The 11:00 chunk was still being written 30 seconds into the next hour
    let mut previous = encoder_frame(at_minute(-10), 1, 1);
    previous.extend(encoder_frame(half_past, 2, 2));
    corpus.write_chunk(EPOCH, &id, at_minute(-60), "bin", &previous);
    corpus.write_chunk(EPOCH, &id, at_minute(0), "bin", &encoder_frame(at_minute(10), 3, 3));

    let loader = StreamLoader::new(LoadConfig::default()).unwrap();
    let range = TimeRange::new(Some(at_minute(0)), Some(at_minute(60)));
    let ranged = loader
        .load(&corpus.roots(), &encoder_schema(), &["Patch1.Encoder"], &range)
        .unwrap();
    let stream = ranged.get("Patch1.Encoder").unwrap();
    assert!(stream.is_ok(), "{:?}", stream.errors);
    assert_eq!(stream.chunks, 2);
    let times: Vec<Timestamp> = stream.table.times().collect();
    assert_eq!(times, vec![half_past, at_minute(10)]);

    // Loading a range gives the same rows as cutting the whole stream to it
    let mut everything = loader
        .load(&corpus.roots(), &encoder_schema(), &["Patch1.Encoder"], &TimeRange::unbounded())
        .unwrap()
        .into_tables();
    let whole = everything.remove("Patch1.Encoder").unwrap();
    assert_eq!(whole.len(), 3);
    let mut ranged = ranged.into_tables();
    assert_eq!(ranged.remove("Patch1.Encoder").unwrap(), filter(whole, &range));
}

#[test]
fn test_range_inclusive_is_honoured() {
    let corpus = Corpus::new();
    let mut bytes = encoder_frame(at_minute(10), 1, 1);
    bytes.extend(encoder_frame(at_minute(20), 2, 2));
    corpus.write_chunk(EPOCH, &StreamId::new("Patch1", "90"), at_minute(0), "bin", &bytes);

    let load = |config: LoadConfig, range: &TimeRange| -> Vec<i64> {
        let loader = StreamLoader::new(config).unwrap();
        let result = loader
            .load(&corpus.roots(), &encoder_schema(), &["Patch1.Encoder"], range)
            .unwrap();
        minutes(result.table("Patch1.Encoder").unwrap().times())
    };
    let unset = TimeRange::new(Some(at_minute(10)), Some(at_minute(20)));
    let both = unset.with_inclusive(Inclusive::Both);

    assert_eq!(load(LoadConfig::default(), &both), vec![10, 20]);
    assert_eq!(load(LoadConfig::default(), &unset), vec![10]);
    let right = LoadConfig {
        inclusive: Inclusive::Right,
        ..LoadConfig::default()
    };
    assert_eq!(load(right.clone(), &unset), vec![20]);
    // The configuration only fills in ranges that do not say
    assert_eq!(load(right, &both), vec![10, 20]);
}

#[test]
fn test_unbounded_load_of_whole_schema() {
    let corpus = Corpus::new();
    corpus.write_encoder_hour("Patch1", 0, 30);
    corpus.write_encoder_hour("Patch2", 1, 30);
    let loader = StreamLoader::new(LoadConfig::default()).unwrap();
    let result = loader
        .load(&corpus.roots(), &encoder_schema(), &[], &TimeRange::unbounded())
        .unwrap();
    assert!(!result.has_errors());
    let paths: Vec<&String> = result.streams.keys().collect();
    assert_eq!(paths, vec!["Patch1.Encoder", "Patch2.Encoder"]);
    assert_eq!(
        minutes(result.table("Patch2.Encoder").unwrap().times()),
        vec![60, 90]
    );
}

#[test]
fn test_boundary_duplicates_appear_once() {
    let corpus = Corpus::new();
    let id = StreamId::new("Patch1", "90");
    let mut first = encoder_frame(at_minute(50), 1, 1);
    first.extend(encoder_frame(at_minute(59), 2, 2));
    // The next chunk repeats the last row written to the previous one
    let mut second = encoder_frame(at_minute(59), 2, 2);
    second.extend(encoder_frame(at_minute(61), 3, 3));
    corpus.write_chunk(EPOCH, &id, at_minute(0), "bin", &first);
    corpus.write_chunk(EPOCH, &id, at_minute(60), "bin", &second);

    let loader = StreamLoader::new(LoadConfig::default()).unwrap();
    let result = loader
        .load(&corpus.roots(), &encoder_schema(), &["Patch1"], &TimeRange::unbounded())
        .unwrap();
    let stream = result.get("Patch1.Encoder").unwrap();
    assert_eq!(minutes(stream.table.times()), vec![50, 59, 61]);
    assert_eq!(stream.duplicates_removed, 1);
    assert!(stream.warnings.is_empty());
}

#[test]
fn test_corrupt_frame_is_isolated() {
    let corpus = Corpus::new();
    let id = StreamId::new("Patch1", "90");
    let mut bytes = encoder_frame(at_minute(1), 1, 1);
    let mut bad = encoder_frame(at_minute(2), 2, 2);
    let last = bad.len() - 1;
    bad[last] = bad[last].wrapping_add(1);
    let bad_offset = bytes.len();
    bytes.extend(bad);
    bytes.extend(encoder_frame(at_minute(3), 3, 3));
    let chunk_path = corpus.write_chunk(EPOCH, &id, at_minute(0), "bin", &bytes);
    corpus.write_encoder_hour("Patch2", 0, 20);

    let loader = StreamLoader::new(LoadConfig::default()).unwrap();
    let result = loader
        .load(&corpus.roots(), &encoder_schema(), &[], &TimeRange::unbounded())
        .unwrap();

    let stream = result.get("Patch1.Encoder").unwrap();
    assert_eq!(minutes(stream.table.times()), vec![1, 3]);
    assert_eq!(stream.errors.len(), 1);
    match &stream.errors[0] {
        StreamError::Decode {
            stream,
            path,
            source: DecodeError::Frame { offset, source },
        } => {
            assert_eq!(stream, "Patch1.Encoder");
            assert_eq!(path, &chunk_path);
            assert_eq!(*offset, bad_offset);
            assert!(matches!(source, FrameError::ChecksumMismatch { .. }));
        }
        other => panic!("Expected a frame decode error, got {other:?}"),
    }
    assert!(result.get("Patch2.Encoder").unwrap().is_ok());

    assert!(matches!(
        result.into_tables_strict(),
        Err(LoadError::StreamFailed { stream, .. }) if stream == "Patch1.Encoder"
    ));

    let strict = StreamLoader::new(LoadConfig {
        all_or_nothing: true,
        ..LoadConfig::default()
    })
    .unwrap();
    assert!(strict
        .load(&corpus.roots(), &encoder_schema(), &[], &TimeRange::unbounded())
        .is_err());
}

#[test]
fn test_truncated_chunk_keeps_leading_frames() {
    let corpus = Corpus::new();
    let id = StreamId::new("Patch1", "90");
    let mut bytes = encoder_frame(at_minute(1), 1, 1);
    bytes.extend(encoder_frame(at_minute(2), 2, 2));
    let full = bytes.len();
    bytes.extend(&encoder_frame(at_minute(3), 3, 3)[..8]);
    corpus.write_chunk(EPOCH, &id, at_minute(0), "bin", &bytes);

    let loader = StreamLoader::new(LoadConfig::default()).unwrap();
    let result = loader
        .load(&corpus.roots(), &encoder_schema(), &["Patch1.Encoder"], &TimeRange::unbounded())
        .unwrap();
    let stream = result.get("Patch1.Encoder").unwrap();
    assert_eq!(minutes(stream.table.times()), vec![1, 2]);
    assert!(matches!(
        &stream.errors[..],
        [StreamError::Decode { source: DecodeError::Desync { offset, dropped: 8, .. }, .. }] if *offset == full
    ));
}

#[test]
fn test_missing_stream_and_empty_range() {
    let corpus = Corpus::new();
    corpus.write_encoder_hour("Patch1", 0, 10);
    let loader = StreamLoader::new(LoadConfig::default()).unwrap();

    let far = TimeRange::new(Some(at_minute(-600)), Some(at_minute(-300)));
    let result = loader
        .load(&corpus.roots(), &encoder_schema(), &[], &far)
        .unwrap();

    let present = result.get("Patch1.Encoder").unwrap();
    assert!(present.is_ok());
    assert!(present.table.is_empty());
    assert_eq!(present.table.columns, vec!["angle", "intensity"]);

    let missing = result.get("Patch2.Encoder").unwrap();
    assert!(missing.table.is_empty());
    assert!(matches!(
        &missing.errors[..],
        [StreamError::NotFound(e)] if e.device == "Patch2" && e.stream == "90"
    ));
}

#[test]
fn test_unknown_selection() {
    let corpus = Corpus::new();
    let loader = StreamLoader::new(LoadConfig::default()).unwrap();
    let result = loader.load(
        &corpus.roots(),
        &encoder_schema(),
        &["Patch1.Encoder.angle"],
        &TimeRange::unbounded(),
    );
    assert!(matches!(result, Err(LoadError::UnknownPath(_))));
}

#[test]
fn test_loads_are_deterministic() {
    let corpus = Corpus::new();
    for hour in 0..4 {
        corpus.write_encoder_hour("Patch1", hour, 7);
        corpus.write_encoder_hour("Patch2", hour, 11);
    }
    let loader = StreamLoader::new(LoadConfig {
        n_threads: 3,
        ..LoadConfig::default()
    })
    .unwrap();
    let range = TimeRange::new(Some(at_minute(45)), Some(at_minute(200)));
    let first = loader
        .load(&corpus.roots(), &encoder_schema(), &[], &range)
        .unwrap()
        .into_tables_strict()
        .unwrap();
    let second = loader
        .load(&corpus.roots(), &encoder_schema(), &[], &range)
        .unwrap()
        .into_tables_strict()
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

#[test]
fn test_progress_is_reported_per_stream() {
    let corpus = Corpus::new();
    corpus.write_encoder_hour("Patch1", 0, 10);
    let loader = StreamLoader::new(LoadConfig {
        n_threads: 2,
        ..LoadConfig::default()
    })
    .unwrap();
    let (tx, rx) = std::sync::mpsc::channel::<LoadStatus>();
    loader
        .load_with_progress(
            &corpus.roots(),
            &encoder_schema(),
            &[],
            &TimeRange::unbounded(),
            Some(&tx),
        )
        .unwrap();
    drop(tx);
    let mut statuses: Vec<LoadStatus> = rx.iter().collect();
    statuses.sort_by(|a, b| a.stream.cmp(&b.stream));
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].state, StreamState::Loaded);
    assert_eq!(statuses[1].state, StreamState::Failed);
    assert!(statuses.iter().all(|s| s.progress == 1.0));
}

#[test]
fn test_text_and_video_streams_from_yaml() {
    let corpus = Corpus::new();
    let state = "time,threshold,d1,delta\n3737966400.5,12.5,4,0.25\n3737966460.5,13.0,5,0.5\n";
    let chunk_start = Timestamp::parse_chunk_time("2022-06-13T12-00-00").unwrap();
    corpus.write_chunk(
        EPOCH,
        &StreamId::new("Patch2", "State"),
        chunk_start,
        "csv",
        state.as_bytes(),
    );
    let video = "time,hw_counter,hw_timestamp\n3737966400.00,10,1000\n3737966400.02,11,1020\n";
    let index_path = corpus.write_chunk(
        EPOCH,
        &StreamId::new("CameraTop", "200"),
        chunk_start,
        "csv",
        video.as_bytes(),
    );

    let yaml = r#"
Patch2:
  device: Patch2
  streams:
    State:
      stream: State
      decoder: { kind: delimited }
CameraTop:
  device: CameraTop
  streams:
    Video:
      stream: "200"
      decoder: { kind: video_index }
"#;
    let schema = Schema::from_yaml(yaml).unwrap();
    let loader = StreamLoader::new(LoadConfig::default()).unwrap();
    let result = loader
        .load(&corpus.roots(), &schema, &[], &TimeRange::unbounded())
        .unwrap();
    assert!(!result.has_errors());

    let state = result.table("Patch2.State").unwrap();
    assert_eq!(state.columns, vec!["threshold", "d1", "delta"]);
    assert_eq!(state.rows[0].time, chunk_start.saturating_add(500_000_000));
    assert_eq!(
        state.rows[1].values,
        vec![Value::Float(13.0), Value::Int(5), Value::Float(0.5)]
    );

    let video = result.table("CameraTop.Video").unwrap();
    assert_eq!(
        video.columns,
        vec!["hw_counter", "hw_timestamp", "frame", "path", "epoch"]
    );
    assert_eq!(video.len(), 2);
    assert_eq!(
        video.rows[1].values,
        vec![
            Value::UInt(11),
            Value::UInt(1020),
            Value::UInt(1),
            Value::Text(index_path.with_extension("avi").to_string_lossy().to_string()),
            Value::Text(String::from(EPOCH)),
        ]
    );
}

struct CounterDecoder;

impl PayloadDecoder for CounterDecoder {
    fn decode(&self, bytes: &[u8], chunk: &ChunkRef) -> DecodedChunk {
        DecodedChunk {
            columns: vec![String::from("bytes")],
            rows: vec![Row::new(chunk.chunk_start, vec![Value::UInt(bytes.len() as u64)])],
            errors: vec![],
        }
    }
}

#[test]
fn test_custom_decoder_registry() {
    let corpus = Corpus::new();
    let id = StreamId::new("Sensor", "Raw");
    corpus.write_chunk(EPOCH, &id, at_minute(0), "dat", &[0u8; 12]);

    let schema = SchemaBuilder::new()
        .group(
            "Sensor",
            Group::device("Sensor").stream(
                "Raw",
                StreamDefinition::new(
                    "Raw",
                    DecoderConfig::Custom {
                        name: String::from("counter"),
                        params: serde_yaml::Value::Null,
                    },
                )
                .with_extension("dat"),
            ),
        )
        .build()
        .unwrap();

    let loader = StreamLoader::new(LoadConfig::default()).unwrap();
    let result = loader
        .load(&corpus.roots(), &schema, &[], &TimeRange::unbounded())
        .unwrap();
    assert!(matches!(
        &result.get("Sensor.Raw").unwrap().errors[..],
        [StreamError::Decoder(_)]
    ));

    let mut registry = DecoderRegistry::new();
    registry.register("counter", |_, _| Ok(Box::new(CounterDecoder)));
    let loader = loader.with_registry(registry);
    let result = loader
        .load(&corpus.roots(), &schema, &[], &TimeRange::unbounded())
        .unwrap();
    let table = result.table("Sensor.Raw").unwrap();
    assert_eq!(table.rows[0].values, vec![Value::UInt(12)]);
}

#[test]
fn test_join_loaded_streams() {
    let corpus = Corpus::new();
    let mut encoder = Vec::new();
    for minute in [10, 20, 30] {
        encoder.extend(encoder_frame(at_minute(minute), minute as i16, 0));
    }
    corpus.write_chunk(EPOCH, &StreamId::new("Patch1", "90"), at_minute(0), "bin", &encoder);
    let mut beam = encode_frame(1, 3, 32, at_minute(5), &[0x22]);
    beam.extend(encode_frame(1, 3, 32, at_minute(15), &[0x22]));
    corpus.write_chunk(EPOCH, &StreamId::new("Patch1", "32"), at_minute(0), "bin", &beam);

    let yaml = r#"
Patch1:
  device: Patch1
  streams:
    Encoder:
      stream: "90"
      columns: [angle, intensity]
      decoder: { kind: binary, register: 90, payload: i16 }
    BeamBreak:
      stream: "32"
      decoder:
        kind: binary
        register: 32
        payload: u8
        bitmask: { mode: event, value: 0x22, tag: PelletDetected }
"#;
    let schema = Schema::from_yaml(yaml).unwrap();
    let loader = StreamLoader::new(LoadConfig::default()).unwrap();
    let tables = loader
        .load(&corpus.roots(), &schema, &[], &TimeRange::unbounded())
        .unwrap()
        .into_tables_strict()
        .unwrap();

    let joined = asof_join(
        ("Encoder", &tables["Patch1.Encoder"]),
        &[("BeamBreak", &tables["Patch1.BeamBreak"])],
    );
    assert_eq!(
        joined.table.columns,
        vec!["Encoder.angle", "Encoder.intensity", "BeamBreak.event"]
    );
    let events: Vec<&Value> = joined.table.column("BeamBreak.event").unwrap().collect();
    assert_eq!(
        events,
        vec![
            &Value::Text(String::from("PelletDetected")),
            &Value::Null,
            &Value::Null
        ]
    );
    assert_eq!(joined.notices[0].dropped, 1);
}

#[test]
fn test_epoch_streams_from_yaml() {
    let corpus = Corpus::new();
    let second_epoch = "2022-06-14T09-00-00";
    corpus.write_epoch_file(
        EPOCH,
        "Metadata.yml",
        b"Workflow: Experiment0.2.bonsai\nCommit: 3e7f2d1\nDevices:\n  Patch1: { Radius: 4 }\n",
    );
    corpus.write_epoch_file(second_epoch, "Metadata.yml", b"Workflow: Experiment0.3.bonsai\n");
    let pose = "{\"seconds\": 3737966400.5, \"value\": {\"x\": 1.5, \"y\": 2}}\n";
    corpus.write_chunk(
        EPOCH,
        &StreamId::new("CameraTop", "Pose"),
        at_minute(0),
        "jsonl",
        pose.as_bytes(),
    );
    let video = corpus.write_chunk(
        EPOCH,
        &StreamId::new("CameraTop", "200"),
        at_minute(0),
        "avi",
        &[0u8; 64],
    );

    let yaml = r#"
Metadata:
  stream: Metadata
  decoder: { kind: metadata }
CameraTop:
  device: CameraTop
  streams:
    Pose:
      stream: Pose
      columns: [x, y]
      decoder: { kind: json_list }
    Files:
      stream: "200"
      extension: avi
      decoder: { kind: chunk }
"#;
    let schema = Schema::from_yaml(yaml).unwrap();
    let loader = StreamLoader::new(LoadConfig::default()).unwrap();
    let result = loader
        .load(&corpus.roots(), &schema, &[], &TimeRange::unbounded())
        .unwrap();
    assert!(!result.has_errors());

    let metadata = result.table("Metadata").unwrap();
    assert_eq!(metadata.columns, vec!["workflow", "commit", "metadata"]);
    let times: Vec<Timestamp> = metadata.times().collect();
    assert_eq!(
        times,
        vec![
            Timestamp::parse_chunk_time(EPOCH).unwrap(),
            Timestamp::parse_chunk_time(second_epoch).unwrap()
        ]
    );
    assert_eq!(
        metadata.rows[0].values,
        vec![
            Value::Text(String::from("Experiment0.2.bonsai")),
            Value::Text(String::from("3e7f2d1")),
            Value::Text(String::from("{\"Devices\":{\"Patch1\":{\"Radius\":4}}}")),
        ]
    );
    assert_eq!(metadata.rows[1].values[1], Value::Null);

    let pose = result.table("CameraTop.Pose").unwrap();
    assert_eq!(pose.columns, vec!["x", "y"]);
    assert_eq!(pose.rows[0].time, at_minute(0).saturating_add(500_000_000));
    assert_eq!(pose.rows[0].values, vec![Value::Float(1.5), Value::Int(2)]);

    let files = result.table("CameraTop.Files").unwrap();
    assert_eq!(files.columns, vec!["path", "epoch"]);
    assert_eq!(
        files.rows,
        vec![Row::new(
            at_minute(0),
            vec![
                Value::Text(video.to_string_lossy().to_string()),
                Value::Text(String::from(EPOCH)),
            ]
        )]
    );

    // Restricting the epochs searched
    let loader = StreamLoader::new(LoadConfig {
        epoch: Some(String::from("2022-06-14*")),
        ..LoadConfig::default()
    })
    .unwrap();
    let result = loader
        .load(&corpus.roots(), &schema, &[], &TimeRange::unbounded())
        .unwrap();
    let metadata = result.table("Metadata").unwrap();
    assert_eq!(metadata.len(), 1);
    assert_eq!(
        metadata.rows[0].values[0],
        Value::Text(String::from("Experiment0.3.bonsai"))
    );
    assert!(matches!(
        &result.get("CameraTop.Pose").unwrap().errors[..],
        [StreamError::NotFound(_)]
    ));
}
