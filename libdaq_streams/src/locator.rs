use fxhash::FxHashSet;
use std::path::{Component, Path, PathBuf};

use super::constants::{CHUNK_DURATION_HOURS, NANOS_PER_HOUR};
use super::error::{LocatorError, NotFoundError};
use super::stream_id::{FileMatch, StreamId};
use super::timestamp::{TimeRange, Timestamp};

/// A reference to one raw chunk file.
///
/// The chunk start comes from the file name and only orders chunks; row timestamps
/// decoded from the file are authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRef {
    pub id: StreamId,
    pub chunk_start: Timestamp,
    /// The first directory below the root holding this chunk
    pub epoch: String,
    pub path: PathBuf,
}

impl ChunkRef {
    fn order_key(&self) -> (Timestamp, &str, &Path) {
        (self.chunk_start, &self.epoch, &self.path)
    }
}

/// Match a name against a pattern where `*` matches any run of characters and `?`
/// matches exactly one
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    // Position of the last `*` seen and the name position it was tried against
    let mut star: Option<(usize, usize)> = None;
    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, n));
                p += 1;
            }
            Some(c) if *c == '?' || *c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match star {
                Some((star_p, star_n)) => {
                    p = star_p + 1;
                    n = star_n + 1;
                    star = Some((star_p, star_n + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

/// Collect every file below `dir`. Symbolic links to files are kept, symbolic links
/// to directories are never descended into.
///
/// When `epoch` is given, only the directories directly below `dir` whose names match
/// it are walked, and files directly below `dir` are ignored.
fn walk_files(dir: &Path, epoch: Option<&str>, files: &mut Vec<PathBuf>) -> Result<(), LocatorError> {
    let io_error = |source: std::io::Error| LocatorError::IOError {
        path: dir.to_path_buf(),
        source,
    };
    for entry in dir.read_dir().map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        let kind = entry.file_type().map_err(io_error)?;
        let item_path = entry.path();
        if kind.is_dir() {
            let name = entry.file_name();
            if epoch.is_none_or(|pattern| wildcard_match(pattern, &name.to_string_lossy())) {
                walk_files(&item_path, None, files)?;
            }
        } else if epoch.is_some() {
            continue;
        } else if kind.is_file() {
            files.push(item_path);
        } else if kind.is_symlink() {
            if item_path.is_file() {
                files.push(item_path);
            } else {
                log::debug!("Not following link {}", item_path.display());
            }
        }
    }
    Ok(())
}

fn epoch_of(root: &Path, path: &Path) -> String {
    let relative = match path.strip_prefix(root) {
        Ok(r) => r,
        Err(_) => return String::new(),
    };
    let mut components = relative.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(epoch)), Some(_)) => epoch.to_string_lossy().to_string(),
        _ => String::new(),
    }
}

/// Find every chunk of a stream under a single root
fn chunks_in_root(
    root: &Path,
    id: &StreamId,
    extension: &str,
    epoch: Option<&str>,
) -> Result<Vec<ChunkRef>, LocatorError> {
    let mut files = Vec::new();
    walk_files(root, epoch, &mut files)?;

    let mut chunks = Vec::new();
    for path in files {
        match id.match_file(&path, extension) {
            FileMatch::Other => (),
            FileMatch::BadChunkTime(e) => {
                log::warn!("Skipping {} as its chunk time is unreadable: {e}", path.display());
            }
            FileMatch::Chunk(chunk_start) => chunks.push(ChunkRef {
                id: id.clone(),
                chunk_start,
                epoch: epoch_of(root, &path),
                path,
            }),
        }
    }
    Ok(chunks)
}

/// Locate the chunks of a stream that may hold rows in `range`.
///
/// Roots are searched in priority order; when several roots hold a chunk with the same
/// epoch and chunk start, the first root's copy is used. Chunks are returned ordered by
/// chunk start, then epoch, then path. When `epoch` is given, only epoch directories
/// whose names match the wildcard pattern are searched.
///
/// The last chunk starting at or before the range start is included, since it may run
/// into the range. When the range start falls within the first hour of that chunk, the
/// adjacent chunk before it is included too, since a device may keep writing to a chunk
/// for a while after the hour turns.
///
/// Returns a NotFoundError if no chunk of the stream exists at all. Chunks that exist
/// but fall outside the range yield an empty list.
pub fn locate(
    roots: &[PathBuf],
    id: &StreamId,
    extension: &str,
    range: &TimeRange,
    epoch: Option<&str>,
) -> Result<Vec<ChunkRef>, LocatorError> {
    let mut found: Vec<ChunkRef> = Vec::new();
    let mut seen: FxHashSet<(String, Timestamp)> = FxHashSet::default();
    for root in roots.iter() {
        if !root.is_dir() {
            log::warn!("Data root {} is not a directory, skipping", root.display());
            continue;
        }
        let chunks = chunks_in_root(root, id, extension, epoch)?;
        let mut root_keys = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let key = (chunk.epoch.clone(), chunk.chunk_start);
            if seen.contains(&key) {
                log::debug!(
                    "Chunk {} is shadowed by a higher priority root",
                    chunk.path.display()
                );
                continue;
            }
            root_keys.push(key);
            found.push(chunk);
        }
        seen.extend(root_keys);
    }

    if found.is_empty() {
        return Err(NotFoundError {
            device: id.device.clone(),
            stream: id.stream.clone(),
            extension: extension.to_string(),
            roots: roots.to_vec(),
        }
        .into());
    }

    let lower = range.start.map(|start| lookback_start(&found, start));
    let n_found = found.len();
    let mut chunks: Vec<ChunkRef> = found
        .into_iter()
        .filter(|c| lower.is_none_or(|l| c.chunk_start >= l))
        .filter(|c| match range.end {
            Some(end) if range.includes_end() => c.chunk_start <= end,
            Some(end) => c.chunk_start < end,
            None => true,
        })
        .collect();
    chunks.sort_by(|a, b| a.order_key().cmp(&b.order_key()));

    log::debug!(
        "Located {} of {} chunks for {id} (*.{extension})",
        chunks.len(),
        n_found
    );
    Ok(chunks)
}

/// The earliest chunk start that may hold rows at or after `start`
fn lookback_start(chunks: &[ChunkRef], start: Timestamp) -> Timestamp {
    let chunk_nanos = NANOS_PER_HOUR * CHUNK_DURATION_HOURS;
    let mut before: Vec<Timestamp> = chunks
        .iter()
        .map(|c| c.chunk_start)
        .filter(|c| *c <= start)
        .collect();
    before.sort_unstable();
    before.dedup();
    let anchor = match before.pop() {
        Some(anchor) => anchor,
        None => return start,
    };
    match before.pop() {
        Some(previous)
            if start < anchor.saturating_add(chunk_nanos)
                && anchor.as_nanos() - previous.as_nanos() <= chunk_nanos =>
        {
            previous
        }
        _ => anchor,
    }
}
