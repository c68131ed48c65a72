use serde::{Deserialize, Serialize};
use std::path::Path;

use super::decoder::{
    DecoderConfig, DecoderRegistry, DelimitedConfig, JsonListConfig, VideoIndexConfig,
};
use super::error::SchemaError;
use super::frame::PayloadType;
use super::stream_id::StreamId;

/// Declares one stream: which chunk files hold it and how to decode them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamDefinition {
    /// Overrides the device inherited from enclosing groups
    #[serde(default)]
    pub device: Option<String>,
    /// The stream part of chunk file names (usually the register number)
    pub stream: String,
    #[serde(default)]
    pub extension: Option<String>,
    /// Column names; when empty the decoder names columns itself
    #[serde(default)]
    pub columns: Vec<String>,
    pub decoder: DecoderConfig,
}

impl StreamDefinition {
    pub fn new(stream: &str, decoder: DecoderConfig) -> Self {
        Self {
            device: None,
            stream: stream.to_string(),
            extension: None,
            columns: vec![],
            decoder,
        }
    }

    /// A binary register stream, stored under the register number
    pub fn binary(register: u8, payload: PayloadType) -> Self {
        Self::new(
            &register.to_string(),
            DecoderConfig::Binary(super::decoder::BinaryConfig::new(register, payload)),
        )
    }

    pub fn delimited(stream: &str) -> Self {
        Self::new(stream, DecoderConfig::Delimited(DelimitedConfig::default()))
    }

    pub fn video_index(stream: &str) -> Self {
        Self::new(stream, DecoderConfig::VideoIndex(VideoIndexConfig::default()))
    }

    pub fn json_list(stream: &str) -> Self {
        Self::new(stream, DecoderConfig::JsonList(JsonListConfig::default()))
    }

    /// The per-epoch metadata file, `<epoch>/Metadata.yml`
    pub fn metadata() -> Self {
        Self::new("Metadata", DecoderConfig::Metadata)
    }

    /// A listing of the chunk files of `stream`
    pub fn chunk(stream: &str, extension: &str) -> Self {
        Self::new(stream, DecoderConfig::Chunk).with_extension(extension)
    }

    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_device(mut self, device: &str) -> Self {
        self.device = Some(device.to_string());
        self
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = Some(extension.to_string());
        self
    }

    /// The chunk file extension, falling back to the decoder's default
    pub fn extension(&self) -> &str {
        self.extension
            .as_deref()
            .unwrap_or_else(|| self.decoder.default_extension())
    }
}

/// An ordered set of named nodes, optionally bound to a device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Group {
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default, with = "ordered")]
    pub streams: Vec<(String, SchemaNode)>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// A group whose streams belong to the named device
    pub fn device(name: &str) -> Self {
        Self {
            device: Some(name.to_string()),
            streams: vec![],
        }
    }

    pub fn stream(mut self, name: &str, definition: StreamDefinition) -> Self {
        self.streams
            .push((name.to_string(), SchemaNode::Stream(definition)));
        self
    }

    pub fn group(mut self, name: &str, group: Group) -> Self {
        self.streams.push((name.to_string(), SchemaNode::Group(group)));
        self
    }

    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.streams
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, node)| node)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaNode {
    Stream(StreamDefinition),
    Group(Group),
}

/// A leaf of the schema with its dotted path and resolved device
#[derive(Debug, Clone, PartialEq)]
pub struct LeafStream {
    pub path: String,
    pub id: StreamId,
    pub definition: StreamDefinition,
}

/// Schema is the immutable, validated tree of stream declarations.
///
/// It is built once (with [SchemaBuilder] or from YAML) and then only read; the
/// loader shares it by reference across worker threads.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    root: SchemaNode,
    leaves: Vec<LeafStream>,
}

impl Schema {
    /// Validate a tree and resolve its leaves
    pub fn new(root: Group) -> Result<Self, SchemaError> {
        let mut leaves = Vec::new();
        collect_leaves(&root, "", root.device.as_deref(), &mut leaves)?;
        if leaves.is_empty() {
            return Err(SchemaError::Empty);
        }
        // Catch bad built-in decoder parameters before any load starts
        let builtins = DecoderRegistry::new();
        for leaf in leaves.iter() {
            if !matches!(leaf.definition.decoder, DecoderConfig::Custom { .. }) {
                builtins.build(&leaf.path, &leaf.definition)?;
            }
        }
        Ok(Self {
            root: SchemaNode::Group(root),
            leaves,
        })
    }

    /// Parse a schema from YAML: a mapping of names to groups or streams
    pub fn from_yaml(yaml: &str) -> Result<Self, SchemaError> {
        let root: TopLevel = serde_yaml::from_str(yaml)?;
        Self::new(Group {
            device: None,
            streams: root.0,
        })
    }

    /// Read a schema YAML file
    pub fn read_schema_file(schema_path: &Path) -> Result<Self, SchemaError> {
        if !schema_path.exists() {
            return Err(SchemaError::BadFilePath(schema_path.to_path_buf()));
        }
        let yaml_str = std::fs::read_to_string(schema_path)?;
        Self::from_yaml(&yaml_str)
    }

    /// Look up a node by dotted path. The empty path is the root.
    pub fn get(&self, path: &str) -> Option<&SchemaNode> {
        if path.is_empty() {
            return Some(&self.root);
        }
        let mut node = &self.root;
        for name in path.split('.') {
            node = match node {
                SchemaNode::Group(group) => group.get(name)?,
                SchemaNode::Stream(_) => return None,
            };
        }
        Some(node)
    }

    pub fn leaves(&self) -> &[LeafStream] {
        &self.leaves
    }

    pub fn leaf(&self, path: &str) -> Option<&LeafStream> {
        self.leaves.iter().find(|l| l.path == path)
    }

    pub fn leaf_paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.leaves.iter().map(|l| l.path.as_str())
    }

    /// Every leaf at or below `path`, in declaration order. None if the path is unknown.
    pub fn leaves_under(&self, path: &str) -> Option<Vec<&LeafStream>> {
        self.get(path)?;
        if path.is_empty() {
            return Some(self.leaves.iter().collect());
        }
        let prefix = format!("{path}.");
        Some(
            self.leaves
                .iter()
                .filter(|l| l.path == path || l.path.starts_with(&prefix))
                .collect(),
        )
    }
}

fn collect_leaves(
    group: &Group,
    prefix: &str,
    device: Option<&str>,
    leaves: &mut Vec<LeafStream>,
) -> Result<(), SchemaError> {
    let mut seen: Vec<&str> = Vec::with_capacity(group.streams.len());
    for (name, node) in group.streams.iter() {
        if name.is_empty() || name.contains('.') {
            return Err(SchemaError::InvalidName(name.clone()));
        }
        if seen.contains(&name.as_str()) {
            return Err(SchemaError::DuplicateName {
                group: prefix.to_string(),
                name: name.clone(),
            });
        }
        seen.push(name);

        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        match node {
            SchemaNode::Group(child) => {
                let child_device = child.device.as_deref().or(device);
                collect_leaves(child, &path, child_device, leaves)?;
            }
            SchemaNode::Stream(definition) => {
                let resolved = match definition.decoder {
                    DecoderConfig::Metadata => "",
                    _ => definition
                        .device
                        .as_deref()
                        .or(device)
                        .ok_or_else(|| SchemaError::MissingDevice(path.clone()))?,
                };
                leaves.push(LeafStream {
                    id: StreamId::new(resolved, &definition.stream),
                    path,
                    definition: definition.clone(),
                });
            }
        }
    }
    Ok(())
}

/// The root of a schema file is an ordered mapping without a device
#[derive(Deserialize)]
struct TopLevel(#[serde(with = "ordered")] Vec<(String, SchemaNode)>);

/// Schema builder for assembling a tree in code
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    root: Group,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(mut self, name: &str, group: Group) -> Self {
        self.root = self.root.group(name, group);
        self
    }

    pub fn stream(mut self, name: &str, definition: StreamDefinition) -> Self {
        self.root = self.root.stream(name, definition);
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        Schema::new(self.root)
    }
}

/// (De)serialize name/node pairs as a YAML mapping, keeping declaration order
mod ordered {
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    use super::SchemaNode;

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S: Serializer>(
        entries: &Vec<(String, SchemaNode)>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (name, node) in entries.iter() {
            map.serialize_entry(name, node)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, SchemaNode)>, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Vec<(String, SchemaNode)>;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a mapping of names to streams or groups")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((name, node)) = access.next_entry::<String, SchemaNode>()? {
                    entries.push((name, node));
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}
