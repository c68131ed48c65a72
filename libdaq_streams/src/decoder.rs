use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::binary_decoder::BinaryDecoder;
use super::chunk_listing::ChunkDecoder;
use super::constants::{
    DEFAULT_BINARY_EXTENSION, DEFAULT_JSON_LIST_EXTENSION, DEFAULT_METADATA_EXTENSION,
    DEFAULT_TEXT_EXTENSION, DEFAULT_VIDEO_EXTENSION,
};
use super::error::{DecodeError, SchemaError};
use super::frame::{MessageType, PayloadType};
use super::json_list::JsonListDecoder;
use super::locator::ChunkRef;
use super::metadata::MetadataDecoder;
use super::schema::StreamDefinition;
use super::stream_table::{FieldType, Row};
use super::text_decoder::DelimitedDecoder;
use super::video_index::VideoIndexDecoder;

/// Everything decoded from one chunk: the rows that survived and an error for each
/// unit (frame or line) that did not.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedChunk {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub errors: Vec<DecodeError>,
}

/// A decoder turns the bytes of one chunk file into typed rows.
///
/// Implementations must never drop malformed data without recording a [DecodeError].
pub trait PayloadDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], chunk: &ChunkRef) -> DecodedChunk;

    /// Whether the chunk's bytes are needed; when false, `decode` receives no bytes
    fn reads_contents(&self) -> bool {
        true
    }
}

/// Post-processing of a single integer register value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BitmaskMode {
    /// Keep rows where all bits of `value` are set, tagging them with `tag`
    Event { value: u64, tag: String },
    /// Keep rows where the masked state changes, as a boolean
    Digital { mask: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryConfig {
    pub register: u8,
    pub payload: PayloadType,
    #[serde(default)]
    pub device_id: Option<u16>,
    #[serde(default)]
    pub message_type: Option<MessageType>,
    #[serde(default)]
    pub bitmask: Option<BitmaskMode>,
}

impl BinaryConfig {
    pub fn new(register: u8, payload: PayloadType) -> Self {
        Self {
            register,
            payload,
            device_id: None,
            message_type: None,
            bitmask: None,
        }
    }
}

fn default_delimiter() -> char {
    ','
}

fn default_header() -> bool {
    true
}

fn default_video_extension() -> String {
    String::from(DEFAULT_VIDEO_EXTENSION)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelimitedConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_header")]
    pub header: bool,
    #[serde(default)]
    pub types: Vec<FieldType>,
}

impl Default for DelimitedConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            header: default_header(),
            types: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoIndexConfig {
    #[serde(default = "default_video_extension")]
    pub video_extension: String,
}

impl Default for VideoIndexConfig {
    fn default() -> Self {
        Self {
            video_extension: default_video_extension(),
        }
    }
}

fn default_root_key() -> String {
    String::from("value")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonListConfig {
    /// The record field holding the values
    #[serde(default = "default_root_key")]
    pub root_key: String,
}

impl Default for JsonListConfig {
    fn default() -> Self {
        Self {
            root_key: default_root_key(),
        }
    }
}

/// How a stream's chunks are decoded. The `kind` field selects the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecoderConfig {
    Binary(BinaryConfig),
    Delimited(DelimitedConfig),
    VideoIndex(VideoIndexConfig),
    JsonList(JsonListConfig),
    /// The metadata file of each epoch; the stream belongs to no device
    Metadata,
    /// List chunk files instead of decoding them
    Chunk,
    Custom {
        name: String,
        #[serde(default)]
        params: serde_yaml::Value,
    },
}

impl DecoderConfig {
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Binary(_) => "binary",
            Self::Delimited(_) => "delimited",
            Self::VideoIndex(_) => "video_index",
            Self::JsonList(_) => "json_list",
            Self::Metadata => "metadata",
            Self::Chunk => "chunk",
            Self::Custom { name, .. } => name,
        }
    }

    /// The chunk file extension used when a stream does not declare one
    pub fn default_extension(&self) -> &str {
        match self {
            Self::Binary(_) | Self::Chunk | Self::Custom { .. } => DEFAULT_BINARY_EXTENSION,
            Self::Delimited(_) | Self::VideoIndex(_) => DEFAULT_TEXT_EXTENSION,
            Self::JsonList(_) => DEFAULT_JSON_LIST_EXTENSION,
            Self::Metadata => DEFAULT_METADATA_EXTENSION,
        }
    }
}

/// Builds a custom decoder from its YAML parameters and the stream's column names
pub type DecoderFactory = dyn Fn(&serde_yaml::Value, &[String]) -> Result<Box<dyn PayloadDecoder>, SchemaError>
    + Send
    + Sync;

/// DecoderRegistry resolves stream definitions to decoders.
///
/// The built-in kinds are always available. Custom kinds must be registered by the
/// caller before loading; there is no process-wide registry.
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    custom: FxHashMap<String, Arc<DecoderFactory>>,
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.custom.keys().collect();
        names.sort();
        f.debug_struct("DecoderRegistry")
            .field("custom", &names)
            .finish()
    }
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `kind: custom` streams with the given name
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&serde_yaml::Value, &[String]) -> Result<Box<dyn PayloadDecoder>, SchemaError>
            + Send
            + Sync
            + 'static,
    {
        self.custom.insert(name.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.custom.contains_key(name)
    }

    /// Build the decoder for a stream definition
    pub fn build(
        &self,
        path: &str,
        definition: &StreamDefinition,
    ) -> Result<Box<dyn PayloadDecoder>, SchemaError> {
        let columns = definition.columns.clone();
        match &definition.decoder {
            DecoderConfig::Binary(config) => {
                Ok(Box::new(BinaryDecoder::new(path, config.clone(), columns)?))
            }
            DecoderConfig::Delimited(config) => {
                Ok(Box::new(DelimitedDecoder::new(path, config.clone(), columns)?))
            }
            DecoderConfig::VideoIndex(config) => {
                Ok(Box::new(VideoIndexDecoder::new(config.clone())))
            }
            DecoderConfig::JsonList(config) => {
                Ok(Box::new(JsonListDecoder::new(config.clone(), columns)))
            }
            DecoderConfig::Metadata => Ok(Box::new(MetadataDecoder)),
            DecoderConfig::Chunk => Ok(Box::new(ChunkDecoder)),
            DecoderConfig::Custom { name, params } => match self.custom.get(name) {
                Some(factory) => factory(params, &columns),
                None => Err(SchemaError::UnknownDecoder(name.clone())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_yaml() {
        let yaml = "kind: binary\nregister: 90\npayload: i16\n";
        let config: DecoderConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config,
            DecoderConfig::Binary(BinaryConfig::new(90, PayloadType::I16))
        );
        assert_eq!(config.default_extension(), "bin");

        let yaml = "kind: binary\nregister: 32\npayload: u8\nbitmask: { mode: event, value: 0x22, tag: PelletDetected }\n";
        let config: DecoderConfig = serde_yaml::from_str(yaml).unwrap();
        match config {
            DecoderConfig::Binary(b) => assert_eq!(
                b.bitmask,
                Some(BitmaskMode::Event {
                    value: 0x22,
                    tag: String::from("PelletDetected")
                })
            ),
            other => panic!("Expected binary config, got {other:?}"),
        }

        let config: DecoderConfig = serde_yaml::from_str("kind: delimited\n").unwrap();
        assert_eq!(config, DecoderConfig::Delimited(DelimitedConfig::default()));

        let config: DecoderConfig = serde_yaml::from_str("kind: video_index\n").unwrap();
        assert_eq!(
            config,
            DecoderConfig::VideoIndex(VideoIndexConfig::default())
        );
        assert_eq!(config.kind_name(), "video_index");

        let config: DecoderConfig = serde_yaml::from_str("kind: json_list\n").unwrap();
        assert_eq!(config, DecoderConfig::JsonList(JsonListConfig::default()));
        assert_eq!(config.default_extension(), "jsonl");

        let config: DecoderConfig = serde_yaml::from_str("kind: metadata\n").unwrap();
        assert_eq!(config, DecoderConfig::Metadata);
        assert_eq!(config.default_extension(), "yml");

        let config: DecoderConfig = serde_yaml::from_str("kind: chunk\n").unwrap();
        assert_eq!(config, DecoderConfig::Chunk);
    }

    struct NullDecoder;

    impl PayloadDecoder for NullDecoder {
        fn decode(&self, _bytes: &[u8], _chunk: &ChunkRef) -> DecodedChunk {
            DecodedChunk::default()
        }
    }

    #[test]
    fn test_custom_registry() {
        let definition = StreamDefinition::new(
            "Pose",
            DecoderConfig::Custom {
                name: String::from("pose"),
                params: serde_yaml::Value::Null,
            },
        );
        let mut registry = DecoderRegistry::new();
        assert!(matches!(
            registry.build("CameraTop.Pose", &definition),
            Err(SchemaError::UnknownDecoder(_))
        ));

        registry.register("pose", |_, _| Ok(Box::new(NullDecoder)));
        assert!(registry.contains("pose"));
        assert!(registry.build("CameraTop.Pose", &definition).is_ok());
    }
}
