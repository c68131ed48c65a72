#![allow(dead_code)]

use libdaq_streams::frame::checksum;
use libdaq_streams::stream_id::StreamId;
use libdaq_streams::timestamp::Timestamp;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use time::macros::datetime;

pub const EPOCH: &str = "2022-06-13T11-00-00";

pub fn init_logging() {
    // Several tests share the process; only the first init succeeds
    let _ = simplelog::TestLogger::init(simplelog::LevelFilter::Debug, simplelog::Config::default());
}

/// Noon of the first acquisition day plus a number of minutes
pub fn at_minute(minutes: i64) -> Timestamp {
    let base = Timestamp::from_datetime(datetime!(2022-06-13 12:00)).unwrap();
    base.saturating_add(minutes * 60 * 1_000_000_000)
}

/// Encode a frame the way the acquisition devices write them
pub fn encode_frame(
    device_id: u16,
    message_type: u8,
    register_id: u8,
    time: Timestamp,
    payload: &[u8],
) -> Vec<u8> {
    let nanos = time.as_nanos();
    let seconds = (nanos / 1_000_000_000) as u32;
    let ticks = ((nanos % 1_000_000_000) / 32_000) as u16;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&device_id.to_le_bytes());
    bytes.push(message_type);
    bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    bytes.push(register_id);
    bytes.extend_from_slice(&seconds.to_le_bytes());
    bytes.extend_from_slice(&ticks.to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes.push(checksum(&bytes));
    bytes
}

/// An encoder event frame: two i16 elements (angle, intensity) on register 90
pub fn encoder_frame(time: Timestamp, angle: i16, intensity: i16) -> Vec<u8> {
    let mut payload = angle.to_le_bytes().to_vec();
    payload.extend_from_slice(&intensity.to_le_bytes());
    encode_frame(1, 3, 90, time, &payload)
}

/// A synthetic acquisition corpus in a temporary directory
pub struct Corpus {
    dir: TempDir,
}

impl Corpus {
    pub fn new() -> Self {
        init_logging();
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn roots(&self) -> Vec<PathBuf> {
        vec![self.root()]
    }

    /// Write a chunk file under `<root>/<epoch>/<device>/` and return its path
    pub fn write_chunk(
        &self,
        epoch: &str,
        id: &StreamId,
        chunk_start: Timestamp,
        extension: &str,
        bytes: &[u8],
    ) -> PathBuf {
        let dir = self.dir.path().join(epoch).join(&id.device);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(id.chunk_file_name(&chunk_start, extension).unwrap());
        std::fs::write(&path, bytes).unwrap();
        path
    }

    /// Write one hourly encoder chunk holding a frame every `step` minutes
    pub fn write_encoder_hour(&self, device: &str, hour: i64, step: i64) -> PathBuf {
        let mut bytes = Vec::new();
        let mut minute = hour * 60;
        while minute < (hour + 1) * 60 {
            bytes.extend(encoder_frame(at_minute(minute), minute as i16, 0));
            minute += step;
        }
        self.write_chunk(
            EPOCH,
            &StreamId::new(device, "90"),
            at_minute(hour * 60),
            "bin",
            &bytes,
        )
    }

    /// Write a file directly under an epoch directory, as written once per epoch
    pub fn write_epoch_file(&self, epoch: &str, name: &str, bytes: &[u8]) -> PathBuf {
        let dir = self.dir.path().join(epoch);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(Path::new(relative))
    }
}
