use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::mpsc::Sender;

use super::chunk_listing::ChunkDecoder;
use super::config::LoadConfig;
use super::decoder::{DecoderConfig, DecoderRegistry};
use super::error::{LoadError, StreamError, TemporalOrderingWarning};
use super::locator::locate;
use super::metadata::MetadataDecoder;
use super::schema::{LeafStream, Schema};
use super::stitcher::Stitcher;
use super::stream_table::StreamTable;
use super::time_filter::filter;
use super::timestamp::TimeRange;
use super::video_index::VideoIndexDecoder;
use super::worker_status::{LoadStatus, StreamState};

/// Everything produced for one stream: the table and any diagnostics
#[derive(Debug, Default)]
pub struct StreamResult {
    pub table: StreamTable,
    pub errors: Vec<StreamError>,
    pub warnings: Vec<TemporalOrderingWarning>,
    pub duplicates_removed: usize,
    /// Number of chunk files read
    pub chunks: usize,
}

impl StreamResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn state(&self) -> StreamState {
        if self.is_ok() {
            StreamState::Loaded
        } else if self.table.is_empty() {
            StreamState::Failed
        } else {
            StreamState::Partial
        }
    }
}

/// The result of a load, keyed by dotted stream path
#[derive(Debug, Default)]
pub struct LoadResult {
    pub streams: BTreeMap<String, StreamResult>,
}

impl LoadResult {
    pub fn get(&self, path: &str) -> Option<&StreamResult> {
        self.streams.get(path)
    }

    pub fn table(&self, path: &str) -> Option<&StreamTable> {
        self.streams.get(path).map(|s| &s.table)
    }

    pub fn has_errors(&self) -> bool {
        self.streams.values().any(|s| !s.is_ok())
    }

    fn first_failure(&mut self) -> Option<LoadError> {
        let (stream, result) = self.streams.iter_mut().find(|(_, s)| !s.is_ok())?;
        Some(LoadError::StreamFailed {
            stream: stream.clone(),
            source: result.errors.remove(0),
        })
    }

    /// Take the tables, ignoring diagnostics
    pub fn into_tables(self) -> BTreeMap<String, StreamTable> {
        self.streams
            .into_iter()
            .map(|(path, result)| (path, result.table))
            .collect()
    }

    /// Take the tables, failing if any stream reported an error
    pub fn into_tables_strict(mut self) -> Result<BTreeMap<String, StreamTable>, LoadError> {
        match self.first_failure() {
            Some(e) => Err(e),
            None => Ok(self.into_tables()),
        }
    }
}

/// Divide the streams into a set of subsets (per thread/worker)
pub fn create_subsets<'a>(
    leaves: &[&'a LeafStream],
    n_threads: usize,
) -> Vec<Vec<&'a LeafStream>> {
    let n_subsets = n_threads.clamp(1, leaves.len().max(1));
    let mut subsets: Vec<Vec<&LeafStream>> = vec![Vec::new(); n_subsets];

    for (idx, leaf) in leaves.iter().enumerate() {
        subsets[idx % n_subsets].push(*leaf)
    }

    subsets
}

/// StreamLoader reconstructs the streams of a schema from raw chunk files.
///
/// Each selected stream runs through the same pipeline: locate its chunks, decode each
/// chunk, stitch the chunks into one table and cut the table to the requested range.
/// Streams are independent. A stream that fails reports its errors in its own
/// [StreamResult] and the other streams load normally, unless the configuration asks
/// for all-or-nothing loading.
#[derive(Debug, Clone, Default)]
pub struct StreamLoader {
    config: LoadConfig,
    registry: DecoderRegistry,
}

impl StreamLoader {
    pub fn new(config: LoadConfig) -> Result<Self, LoadError> {
        config.validate()?;
        Ok(Self {
            config,
            registry: DecoderRegistry::new(),
        })
    }

    /// Use the given registry to resolve custom decoders
    pub fn with_registry(mut self, registry: DecoderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Load the selected streams. An empty selection loads the whole schema.
    pub fn load(
        &self,
        roots: &[PathBuf],
        schema: &Schema,
        selection: &[&str],
        range: &TimeRange,
    ) -> Result<LoadResult, LoadError> {
        self.load_with_progress(roots, schema, selection, range, None)
    }

    /// Load the selected streams, reporting each finished stream on `tx`
    pub fn load_with_progress(
        &self,
        roots: &[PathBuf],
        schema: &Schema,
        selection: &[&str],
        range: &TimeRange,
        tx: Option<&Sender<LoadStatus>>,
    ) -> Result<LoadResult, LoadError> {
        let leaves = resolve_selection(schema, selection)?;
        let range = range.or_inclusive(self.config.inclusive);
        let subsets = create_subsets(&leaves, self.config.n_threads);
        log::info!(
            "Loading {} streams on {} workers",
            leaves.len(),
            subsets.len()
        );

        let mut result = LoadResult::default();
        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(subsets.len());
            for (worker_id, subset) in subsets.into_iter().enumerate() {
                let worker_tx = tx.cloned();
                let range = &range;
                handles.push(scope.spawn(move || {
                    self.load_subset(roots, subset, range, worker_tx, worker_id)
                }));
            }
            for handle in handles {
                match handle.join() {
                    Ok(streams) => result.streams.extend(streams),
                    Err(e) => std::panic::resume_unwind(e),
                }
            }
        });

        if self.config.all_or_nothing {
            if let Some(e) = result.first_failure() {
                return Err(e);
            }
        }
        Ok(result)
    }

    fn load_subset(
        &self,
        roots: &[PathBuf],
        subset: Vec<&LeafStream>,
        range: &TimeRange,
        tx: Option<Sender<LoadStatus>>,
        worker_id: usize,
    ) -> Vec<(String, StreamResult)> {
        let total = subset.len();
        let mut streams = Vec::with_capacity(total);
        for (idx, leaf) in subset.into_iter().enumerate() {
            let result = self.load_stream(roots, leaf, range);
            if let Some(tx) = tx.as_ref() {
                let status = LoadStatus::new(
                    (idx + 1) as f32 / total as f32,
                    &leaf.path,
                    worker_id,
                    result.state(),
                );
                if tx.send(status).is_err() {
                    log::debug!("Progress receiver is gone; worker {worker_id} continues");
                }
            }
            streams.push((leaf.path.clone(), result));
        }
        streams
    }

    /// Run the full pipeline for a single stream
    pub fn load_stream(
        &self,
        roots: &[PathBuf],
        leaf: &LeafStream,
        range: &TimeRange,
    ) -> StreamResult {
        let mut result = StreamResult::default();
        let definition = &leaf.definition;
        let decoder = match self.registry.build(&leaf.path, definition) {
            Ok(d) => d,
            Err(e) => {
                log::error!("Could not build decoder for {}: {e}", leaf.path);
                result.errors.push(e.into());
                return result;
            }
        };

        let epoch = self.config.epoch.as_deref();
        let chunks = match locate(roots, &leaf.id, definition.extension(), range, epoch) {
            Ok(chunks) => chunks,
            Err(e) => {
                log::warn!("{} could not be located: {e}", leaf.path);
                result.errors.push(e.into());
                return result;
            }
        };
        log::info!("Processing {} with {} chunks...", leaf.path, chunks.len());

        let mut stitcher = Stitcher::new(self.config.tolerance_nanos());
        let mut total_bytes: u64 = 0;
        for chunk in chunks.iter() {
            let bytes = if !decoder.reads_contents() {
                Vec::new()
            } else {
                match std::fs::read(&chunk.path) {
                    Ok(b) => b,
                    Err(source) => {
                        log::error!("Could not read chunk {}: {source}", chunk.path.display());
                        result.errors.push(StreamError::IOError {
                            path: chunk.path.clone(),
                            source,
                        });
                        continue;
                    }
                }
            };
            total_bytes += bytes.len() as u64;
            result.chunks += 1;

            let decoded = decoder.decode(&bytes, chunk);
            for error in decoded.errors {
                if error.is_fatal() {
                    log::error!("{} in {}: {error}", leaf.path, chunk.path.display());
                } else {
                    log::warn!("{} in {}: {error}", leaf.path, chunk.path.display());
                }
                result.errors.push(StreamError::Decode {
                    stream: leaf.path.clone(),
                    path: chunk.path.clone(),
                    source: error,
                });
            }
            stitcher.push(
                &chunk.path,
                StreamTable::with_rows(decoded.columns, decoded.rows),
            );
        }

        let stitched = stitcher.finish();
        for warning in stitched.warnings.iter() {
            log::warn!("{} is out of order: {warning}", leaf.path);
        }
        if stitched.duplicates_removed > 0 {
            log::info!(
                "Removed {} duplicate rows at chunk boundaries of {}",
                stitched.duplicates_removed,
                leaf.path
            );
        }
        result.errors.extend(stitched.rejected);
        result.warnings = stitched.warnings;
        result.duplicates_removed = stitched.duplicates_removed;
        result.table = filter(stitched.table, range);
        if result.table.columns.is_empty() {
            result.table.columns = declared_columns(leaf);
        }

        log::info!(
            "Finished {}: {} rows from {} of data.",
            leaf.path,
            result.table.len(),
            human_bytes::human_bytes(total_bytes as f64)
        );
        result
    }
}

/// Column names known without decoding any data, used for empty tables
fn declared_columns(leaf: &LeafStream) -> Vec<String> {
    match &leaf.definition.decoder {
        DecoderConfig::VideoIndex(_) => VideoIndexDecoder::columns(),
        DecoderConfig::Metadata => MetadataDecoder::columns(),
        DecoderConfig::Chunk => ChunkDecoder::columns(),
        _ => leaf.definition.columns.clone(),
    }
}

/// Expand selected paths to leaves, in schema order and without repeats
fn resolve_selection<'a>(
    schema: &'a Schema,
    selection: &[&str],
) -> Result<Vec<&'a LeafStream>, LoadError> {
    if selection.is_empty() {
        return Ok(schema.leaves().iter().collect());
    }
    let mut leaves: Vec<&LeafStream> = Vec::new();
    for path in selection.iter() {
        let under = schema
            .leaves_under(path)
            .ok_or_else(|| LoadError::UnknownPath(path.to_string()))?;
        for leaf in under {
            if !leaves.iter().any(|l| l.path == leaf.path) {
                leaves.push(leaf);
            }
        }
    }
    Ok(leaves)
}
