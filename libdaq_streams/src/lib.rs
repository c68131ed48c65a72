//! # libdaq_streams
//!
//! libdaq_streams reconstructs the data of an acquisition system from its raw chunk
//! files. Each acquisition device writes its registers and logs to files that are cut
//! every hour; libdaq_streams finds the chunks of a stream over a time range, decodes
//! them, stitches them into a single time series and filters it to the requested range.
//! Which streams exist, and how each is decoded, is declared in a schema.
//!
//! ## Usage
//!
//! ```no_run
//! use libdaq_streams::aggregator::StreamLoader;
//! use libdaq_streams::config::LoadConfig;
//! use libdaq_streams::schema::Schema;
//! use libdaq_streams::timestamp::{TimeRange, Timestamp};
//! use std::path::{Path, PathBuf};
//!
//! let schema = Schema::read_schema_file(Path::new("schema.yml")).unwrap();
//! let config = LoadConfig::read_config_file(Path::new("load.yml")).unwrap();
//! let loader = StreamLoader::new(config).unwrap();
//! let range = TimeRange::new(
//!     Some(Timestamp::parse_chunk_time("2022-06-13T12-00-00").unwrap()),
//!     Some(Timestamp::parse_chunk_time("2022-06-13T14-00-00").unwrap()),
//! );
//! let result = loader
//!     .load(&[PathBuf::from("/data/raw")], &schema, &["Patch2"], &range)
//!     .unwrap();
//! for (path, stream) in result.streams.iter() {
//!     println!("{path}: {} rows, {} errors", stream.table.len(), stream.errors.len());
//! }
//! ```
//!
//! Streams load independently. A stream whose chunks are missing or corrupt carries its
//! errors in its own result; the others are unaffected. Set `all_or_nothing` in the
//! configuration (or use `LoadResult::into_tables_strict`) to fail on any stream error.
//!
//! ## Data Layout
//!
//! Chunk files are found by walking each data root recursively. The expected layout is
//!
//! ```text
//! <root>/<epoch>/<device>/<device>_<stream>_<YYYY-MM-DDTHH-MM-SS>.<ext>
//! ```
//!
//! where the time in the name is the start of the hour the chunk covers. It is only used
//! to pick and order chunks; the timestamps decoded from the data are authoritative.
//! Several roots may be given; when two roots hold the same chunk, the first root wins.
//! Files written once per epoch are named without a time (`<root>/<epoch>/<stream>.<ext>`)
//! and take their chunk time from the epoch directory. Links to directories are not
//! followed.
//!
//! ## Schema Format
//!
//! A schema is a YAML mapping of names to nodes. A node with a `decoder` key is a
//! stream; any other node is a group, which may name the `device` its streams belong to.
//! Streams are addressed by their dotted path (e.g. `Patch2.Encoder`).
//!
//! ```yml
//! Patch2:
//!   device: Patch2
//!   streams:
//!     Encoder:
//!       stream: "90"
//!       columns: [angle, intensity]
//!       decoder: { kind: binary, register: 90, payload: i16 }
//!     BeamBreak:
//!       stream: "32"
//!       decoder:
//!         kind: binary
//!         register: 32
//!         payload: u8
//!         bitmask: { mode: event, value: 0x22, tag: PelletDetected }
//!     State:
//!       stream: State
//!       decoder: { kind: delimited }
//! CameraTop:
//!   device: CameraTop
//!   streams:
//!     Video:
//!       stream: "200"
//!       decoder: { kind: video_index, video_extension: avi }
//! ```
//!
//! The decoder kinds are
//!
//! * `binary`: device register frames
//! * `delimited`: text lines of `time,field,...`
//! * `video_index`: the frame index of a video chunk
//! * `json_list`: one JSON object per line, timed by its `seconds` field, with the values
//!   under `root_key` (default `value`)
//! * `metadata`: the `<epoch>/<stream>.yml` file written at the start of each epoch,
//!   read into `workflow`, `commit` and `metadata` columns; it belongs to no device
//! * `chunk`: one `path`, `epoch` row per chunk file, without reading the files
//! * `custom`: resolved through a `DecoderRegistry` supplied to the loader
//!
//! ## Binary Frame Format
//!
//! Binary chunks are a sequence of little endian frames:
//!
//! ```text
//! device_id(u16) message_type(u8) payload_length(u16) register(u8)
//! seconds(u32) ticks(u16) payload(payload_length) checksum(u8)
//! ```
//!
//! Times are seconds since 1904-01-01 plus ticks of 32 us. The checksum is the sum of all
//! preceding frame bytes modulo 256. A frame failing its checksum is skipped and
//! reported; a frame header that cannot be trusted ends decoding of that chunk, and the
//! dropped bytes are reported.
//!
//! ## Configuration
//!
//! The YAML format of a load configuration file is as follows:
//!
//! ```yml
//! ordering_tolerance: 0.0
//! n_threads: 1
//! all_or_nothing: false
//! inclusive: left
//! epoch: "2022-06-*"
//! ```
//!
//! `ordering_tolerance` is in seconds. `inclusive` is one of `left`, `right`, `both`,
//! `neither` and selects which bounds of the requested range are inclusive when the
//! `TimeRange` passed to `load` does not set them itself. `epoch`, when present, limits
//! the search to epoch directories matching the pattern, where `*` matches any run of
//! characters and `?` any single character.
//!
//! ## Logging
//!
//! libdaq_streams logs through the `log` facade and never installs a logger itself.
pub mod aggregator;
pub mod binary_decoder;
pub mod chunk_listing;
pub mod config;
pub mod constants;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod join;
pub mod json_list;
pub mod locator;
pub mod metadata;
pub mod schema;
pub mod stitcher;
pub mod stream_id;
pub mod stream_table;
pub mod text_decoder;
pub mod time_filter;
pub mod timestamp;
pub mod video_index;
pub mod worker_status;
