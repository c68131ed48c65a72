use std::path::PathBuf;
use thiserror::Error;

use super::constants::FRAME_HEADER_SIZE;
use super::timestamp::Timestamp;

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("Could not parse a timestamp in seconds from {0:?}")]
    Invalid(String),
    #[error("Timestamp is outside of the representable range")]
    OutOfRange,
    #[error("Could not parse chunk time {text:?}: {source}")]
    ChunkTime {
        text: String,
        source: time::error::Parse,
    },
    #[error("Could not format chunk time: {0}")]
    Format(#[from] time::error::Format),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("Checksum mismatch; computed {computed:#04x} but frame carries {found:#04x}")]
    ChecksumMismatch { computed: u8, found: u8 },
    #[error("Unknown message type {0:#04x} found in frame header")]
    UnknownMessageType(u8),
    #[error("Frame needs {needed} bytes but only {available} remain in the chunk")]
    Truncated { needed: usize, available: usize },
    #[error("Chunk ends inside a frame header; {0} bytes remain, expected at least {size}", size=FRAME_HEADER_SIZE)]
    TruncatedHeader(usize),
    #[error("Payload of {length} bytes is not a multiple of the {element} byte element size")]
    PayloadSize { length: usize, element: usize },
    #[error("Payload holds {found} elements but the stream declares {expected} columns")]
    ColumnCount { expected: usize, found: usize },
    #[error("Bitmask events need a single element payload, frame holds {found}")]
    BitmaskElements { found: usize },
    #[error("Negative value {0} cannot be masked as a bit state")]
    NegativeBitmask(i64),
    #[error("Frame could not be read: {0}")]
    Read(String),
}

impl From<std::io::Error> for FrameError {
    fn from(value: std::io::Error) -> Self {
        Self::Read(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LineError {
    #[error("Line has no timestamp field")]
    MissingTimestamp,
    #[error("Could not parse timestamp {0:?}")]
    BadTimestamp(String),
    #[error("Line has {found} fields but {expected} were expected")]
    FieldCount { expected: usize, found: usize },
    #[error("Could not parse {value:?} in column {column} as {kind}")]
    BadField {
        column: String,
        value: String,
        kind: String,
    },
    #[error("Record has no field {0:?}")]
    MissingField(String),
    #[error("Line could not be read: {0}")]
    Read(String),
}

/// An integrity failure localized to the smallest recoverable unit of a chunk.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Malformed frame at byte offset {offset}: {source}")]
    Frame { offset: usize, source: FrameError },
    #[error("Lost frame synchronization at byte offset {offset}, dropped remaining {dropped} bytes: {source}")]
    Desync {
        offset: usize,
        dropped: usize,
        source: FrameError,
    },
    #[error("Malformed line {line}: {source}")]
    Line { line: u64, source: LineError },
}

impl DecodeError {
    /// Did this error end decoding of the chunk?
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Desync { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("No chunk files found for device {device} stream {stream} (*.{extension}) under {roots:?}")]
pub struct NotFoundError {
    pub device: String,
    pub stream: String,
    pub extension: String,
    pub roots: Vec<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("{0}")]
    NotFound(#[from] NotFoundError),
    #[error("ChunkLocator failed to walk {path:?}: {source}")]
    IOError {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Schema node name {0:?} is invalid; names must be non-empty and contain no '.'")]
    InvalidName(String),
    #[error("Schema group {group:?} declares {name:?} more than once")]
    DuplicateName { group: String, name: String },
    #[error("Stream {0} has no device; declare one on the stream or an enclosing group")]
    MissingDevice(String),
    #[error("Schema does not define any streams")]
    Empty,
    #[error("Stream {path} has an invalid decoder configuration: {reason}")]
    BadDecoder { path: String, reason: String },
    #[error("No decoder registered under the custom kind {0:?}")]
    UnknownDecoder(String),
    #[error("Failed to load schema as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Schema failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Schema failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config requests {0} threads; at least 1 is required")]
    BadThreadCount(usize),
    #[error("Config ordering tolerance {0} must be a finite, non-negative number of seconds")]
    BadTolerance(f64),
}

/// A failure scoped to a single stream. Sibling streams are unaffected.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("{0}")]
    NotFound(#[from] NotFoundError),
    #[error("Stream failed reading {path:?}: {source}")]
    IOError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Stream {stream} failed to decode part of {path:?}: {source}")]
    Decode {
        stream: String,
        path: PathBuf,
        source: DecodeError,
    },
    #[error("Chunk {path:?} has columns {found:?} but the stream has columns {expected:?}; chunk skipped")]
    ColumnMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("Stream could not build its decoder: {0}")]
    Decoder(#[from] SchemaError),
}

impl From<LocatorError> for StreamError {
    fn from(value: LocatorError) -> Self {
        match value {
            LocatorError::NotFound(e) => Self::NotFound(e),
            LocatorError::IOError { path, source } => Self::IOError { path, source },
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Requested stream path {0:?} is not in the schema")]
    UnknownPath(String),
    #[error("Stream {stream} failed and all-or-nothing loading was requested: {source}")]
    StreamFailed { stream: String, source: StreamError },
    #[error("Load failed due to Schema error: {0}")]
    SchemaError(#[from] SchemaError),
    #[error("Load failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
}

/// Non-fatal: a row precedes its predecessor by more than the configured tolerance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalOrderingWarning {
    /// Position of the offending row in the stitched table
    pub row: usize,
    pub previous: Timestamp,
    pub current: Timestamp,
    /// True when the two rows came from different chunks
    pub at_chunk_boundary: bool,
}

impl std::fmt::Display for TemporalOrderingWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "row {} at {} precedes previous row at {}{}",
            self.row,
            self.current,
            self.previous,
            if self.at_chunk_boundary {
                " (chunk boundary)"
            } else {
                ""
            }
        )
    }
}

/// Reported when an as-of join drops secondary rows that have no primary match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAlignmentNotice {
    pub stream: String,
    /// Rows before the first primary timestamp
    pub dropped: usize,
    /// Rows superseded by a later row matched to the same primary row
    pub collapsed: usize,
}
