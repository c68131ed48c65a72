// Device clock
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;
/// One tick of the device sub-second counter is 32 microseconds
pub const TICK_NANOS: i64 = 32_000;

// Acquisition chunking
/// The duration of each acquisition chunk, in whole hours
pub const CHUNK_DURATION_HOURS: i64 = 1;
pub const NANOS_PER_HOUR: i64 = 3_600 * NANOS_PER_SECOND;

// Binary frame layout (all little endian)
pub const DEVICE_ID_SIZE: usize = 2;
pub const MESSAGE_TYPE_SIZE: usize = 1;
pub const PAYLOAD_LENGTH_SIZE: usize = 2;
pub const REGISTER_ID_SIZE: usize = 1;
pub const TIMESTAMP_SIZE: usize = 6;
pub const CHECKSUM_SIZE: usize = 1;
pub const FRAME_HEADER_SIZE: usize =
    DEVICE_ID_SIZE + MESSAGE_TYPE_SIZE + PAYLOAD_LENGTH_SIZE + REGISTER_ID_SIZE + TIMESTAMP_SIZE;

// Message types
pub const MESSAGE_TYPE_READ: u8 = 1;
pub const MESSAGE_TYPE_WRITE: u8 = 2;
pub const MESSAGE_TYPE_EVENT: u8 = 3;
pub const MESSAGE_ERROR_FLAG: u8 = 0x08;

// File naming
pub const DEFAULT_BINARY_EXTENSION: &str = "bin";
pub const DEFAULT_TEXT_EXTENSION: &str = "csv";
pub const DEFAULT_VIDEO_EXTENSION: &str = "avi";
pub const DEFAULT_JSON_LIST_EXTENSION: &str = "jsonl";
pub const DEFAULT_METADATA_EXTENSION: &str = "yml";
