use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use super::constants::*;
use super::error::{DecodeError, FrameError};
use super::stream_table::Value;
use super::timestamp::Timestamp;

/// The kind of device message carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Read,
    Write,
    Event,
}

impl MessageType {
    /// Split a raw message type byte into the type and its error flag
    pub fn from_byte(byte: u8) -> Option<(Self, bool)> {
        let is_error = byte & MESSAGE_ERROR_FLAG != 0;
        let kind = match byte & !MESSAGE_ERROR_FLAG {
            MESSAGE_TYPE_READ => Self::Read,
            MESSAGE_TYPE_WRITE => Self::Write,
            MESSAGE_TYPE_EVENT => Self::Event,
            _ => return None,
        };
        Some((kind, is_error))
    }
}

/// The element type of a register payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl PayloadType {
    pub fn element_size(&self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    /// Decode a payload into one value per element
    pub fn decode(&self, payload: &[u8]) -> Result<Vec<Value>, FrameError> {
        let element = self.element_size();
        if payload.len() % element != 0 {
            return Err(FrameError::PayloadSize {
                length: payload.len(),
                element,
            });
        }
        let count = payload.len() / element;
        let mut cursor = Cursor::new(payload);
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let value = match self {
                Self::U8 => Value::UInt(cursor.read_u8()? as u64),
                Self::I8 => Value::Int(cursor.read_i8()? as i64),
                Self::U16 => Value::UInt(cursor.read_u16::<LittleEndian>()? as u64),
                Self::I16 => Value::Int(cursor.read_i16::<LittleEndian>()? as i64),
                Self::U32 => Value::UInt(cursor.read_u32::<LittleEndian>()? as u64),
                Self::I32 => Value::Int(cursor.read_i32::<LittleEndian>()? as i64),
                Self::U64 => Value::UInt(cursor.read_u64::<LittleEndian>()?),
                Self::I64 => Value::Int(cursor.read_i64::<LittleEndian>()?),
                Self::F32 => Value::Float(cursor.read_f32::<LittleEndian>()? as f64),
                Self::F64 => Value::Float(cursor.read_f64::<LittleEndian>()?),
            };
            values.push(value);
        }
        Ok(values)
    }
}

/// Sum of bytes modulo 256
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameHeader {
    pub device_id: u16,
    pub message_type: MessageType,
    pub is_error: bool,
    pub payload_length: u16,
    pub register_id: u8,
    pub timestamp: Timestamp,
}

impl FrameHeader {
    /// Parse a header from exactly [FRAME_HEADER_SIZE] bytes
    fn read(bytes: &[u8]) -> Result<Self, FrameError> {
        let mut cursor = Cursor::new(bytes);
        let device_id = cursor.read_u16::<LittleEndian>()?;
        let type_byte = cursor.read_u8()?;
        let payload_length = cursor.read_u16::<LittleEndian>()?;
        let register_id = cursor.read_u8()?;
        let seconds = cursor.read_u32::<LittleEndian>()?;
        let ticks = cursor.read_u16::<LittleEndian>()?;
        let (message_type, is_error) =
            MessageType::from_byte(type_byte).ok_or(FrameError::UnknownMessageType(type_byte))?;
        Ok(Self {
            device_id,
            message_type,
            is_error,
            payload_length,
            register_id,
            timestamp: Timestamp::from_device_time(seconds, ticks),
        })
    }

    /// Total size of the frame this header announces, checksum included
    pub fn frame_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload_length as usize + CHECKSUM_SIZE
    }
}

/// One checksum-valid frame, borrowing its payload from the chunk buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<'a> {
    pub offset: usize,
    pub header: FrameHeader,
    pub payload: &'a [u8],
}

/// FrameReader walks a chunk buffer frame by frame.
///
/// A checksum failure only costs the frame it occurs in: the announced length is used
/// to step to the next frame boundary. A header that cannot be trusted (unknown message
/// type, or a length running past the end of the buffer) ends the walk, since there is
/// no way to find the next boundary.
#[derive(Debug)]
pub struct FrameReader<'a> {
    buffer: &'a [u8],
    offset: usize,
    is_ended: bool,
}

impl<'a> FrameReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            offset: 0,
            is_ended: false,
        }
    }

    /// Current byte offset into the buffer
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn desync(&mut self, source: FrameError) -> DecodeError {
        let error = DecodeError::Desync {
            offset: self.offset,
            dropped: self.buffer.len() - self.offset,
            source,
        };
        self.is_ended = true;
        self.offset = self.buffer.len();
        error
    }
}

impl<'a> Iterator for FrameReader<'a> {
    type Item = Result<Frame<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_ended || self.offset >= self.buffer.len() {
            return None;
        }

        let remaining = self.buffer.len() - self.offset;
        if remaining < FRAME_HEADER_SIZE {
            return Some(Err(self.desync(FrameError::TruncatedHeader(remaining))));
        }

        let header_bytes = &self.buffer[self.offset..(self.offset + FRAME_HEADER_SIZE)];
        let header = match FrameHeader::read(header_bytes) {
            Ok(h) => h,
            Err(e) => return Some(Err(self.desync(e))),
        };

        let frame_size = header.frame_size();
        if frame_size > remaining {
            return Some(Err(self.desync(FrameError::Truncated {
                needed: frame_size,
                available: remaining,
            })));
        }

        let offset = self.offset;
        let body_end = offset + FRAME_HEADER_SIZE + header.payload_length as usize;
        let computed = checksum(&self.buffer[offset..body_end]);
        let found = self.buffer[body_end];
        self.offset += frame_size;

        if computed != found {
            return Some(Err(DecodeError::Frame {
                offset,
                source: FrameError::ChecksumMismatch { computed, found },
            }));
        }

        Some(Ok(Frame {
            offset,
            header,
            payload: &self.buffer[(offset + FRAME_HEADER_SIZE)..body_end],
        }))
    }
}
