use std::fmt::Display;
use std::path::Path;

use super::error::TimestampError;
use super::timestamp::Timestamp;

/// StreamId is the (device, stream) pair that names a set of chunk files on disk.
///
/// Chunk files follow `<device>_<stream>_<chunk time>.<extension>`, where the chunk
/// time is written as `YYYY-MM-DDTHH-MM-SS`. The stream part is usually a register
/// number (`Patch2_90_...`) but may be any name without a trailing chunk time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId {
    pub device: String,
    pub stream: String,
}

/// Outcome of testing a file name against a StreamId
#[derive(Debug)]
pub enum FileMatch {
    /// The file does not belong to this stream
    Other,
    /// The file belongs to this stream and starts at the given chunk time
    Chunk(Timestamp),
    /// The file name matches the stream but its chunk time is unreadable
    BadChunkTime(TimestampError),
}

impl StreamId {
    pub fn new(device: &str, stream: &str) -> Self {
        Self {
            device: device.to_string(),
            stream: stream.to_string(),
        }
    }

    /// The part of a chunk file stem that precedes the chunk time. Streams that belong
    /// to no device are named by the stream alone.
    pub fn file_prefix(&self) -> String {
        if self.device.is_empty() {
            self.stream.clone()
        } else {
            format!("{}_{}", self.device, self.stream)
        }
    }

    /// Construct the file name of the chunk starting at `chunk_start`
    pub fn chunk_file_name(
        &self,
        chunk_start: &Timestamp,
        extension: &str,
    ) -> Result<String, TimestampError> {
        Ok(format!(
            "{}_{}.{}",
            self.file_prefix(),
            chunk_start.format_chunk_time()?,
            extension
        ))
    }

    /// Test whether the file at `path` is a chunk of this stream
    pub fn match_file(&self, path: &Path, extension: &str) -> FileMatch {
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            return FileMatch::Other;
        }
        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s,
            None => return FileMatch::Other,
        };
        let file_prefix = self.file_prefix();
        let chunk_str = if stem == file_prefix {
            // Files written once per epoch carry no time; the epoch directory does
            match path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
            {
                Some(dir) => dir,
                None => return FileMatch::Other,
            }
        } else {
            match stem.rsplit_once('_') {
                Some((prefix, chunk_str)) if prefix == file_prefix => chunk_str,
                _ => return FileMatch::Other,
            }
        };
        match Timestamp::parse_chunk_time(chunk_str) {
            Ok(ts) => FileMatch::Chunk(ts),
            Err(e) => FileMatch::BadChunkTime(e),
        }
    }
}

impl Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file_prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_match_file() {
        let id = StreamId::new("Patch2", "90");
        let good = PathBuf::from("2022-06-13T13-14-25/Patch2/Patch2_90_2022-06-13T12-00-00.bin");
        match id.match_file(&good, "bin") {
            FileMatch::Chunk(ts) => {
                assert_eq!(ts, Timestamp::parse_chunk_time("2022-06-13T12-00-00").unwrap())
            }
            other => panic!("Expected chunk, got {other:?}"),
        }

        // Wrong register, wrong extension, and a longer stream name sharing the prefix
        let other_register = PathBuf::from("Patch2/Patch2_900_2022-06-13T12-00-00.bin");
        let other_ext = PathBuf::from("Patch2/Patch2_90_2022-06-13T12-00-00.csv");
        let nested = PathBuf::from("Patch2/Patch2_90_State_2022-06-13T12-00-00.bin");
        assert!(matches!(id.match_file(&other_register, "bin"), FileMatch::Other));
        assert!(matches!(id.match_file(&other_ext, "bin"), FileMatch::Other));
        assert!(matches!(id.match_file(&nested, "bin"), FileMatch::Other));

        let bad_time = PathBuf::from("Patch2/Patch2_90_yesterday.bin");
        assert!(matches!(
            id.match_file(&bad_time, "bin"),
            FileMatch::BadChunkTime(_)
        ));
    }

    #[test]
    fn test_chunk_file_name() {
        let id = StreamId::new("CameraTop", "200");
        let ts = Timestamp::parse_chunk_time("2022-06-13T12-00-00").unwrap();
        let name = id.chunk_file_name(&ts, "csv").unwrap();
        assert_eq!(name, "CameraTop_200_2022-06-13T12-00-00.csv");
        assert!(matches!(
            id.match_file(Path::new(&name), "csv"),
            FileMatch::Chunk(t) if t == ts
        ));
    }

    #[test]
    fn test_match_epoch_file() {
        let id = StreamId::new("", "Metadata");
        assert_eq!(id.file_prefix(), "Metadata");
        let path = PathBuf::from("/data/2022-06-13T11-00-00/Metadata.yml");
        assert!(matches!(
            id.match_file(&path, "yml"),
            FileMatch::Chunk(t) if t == Timestamp::parse_chunk_time("2022-06-13T11-00-00").unwrap()
        ));
        assert!(matches!(
            id.match_file(Path::new("/data/scratch/Metadata.yml"), "yml"),
            FileMatch::BadChunkTime(_)
        ));
        assert!(matches!(
            id.match_file(Path::new("/data/2022-06-13T11-00-00/Metadata.json"), "yml"),
            FileMatch::Other
        ));
    }
}
