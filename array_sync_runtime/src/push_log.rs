//! Append-only push log — binary protobuf frames.
//!
//! Storage format: length-prefixed protobuf frames.
//!   [4-byte LE length][protobuf bytes][4-byte LE length][protobuf bytes]...
//!
//! Rules:
//!   - Strict append only: no mutation, no deletion, no reordering
//!   - fsync after every write unless disabled in `SyncConfig`
//!   - Sequence strictly increasing from 1 (validated on append)
//!   - Frame length bounded by `SyncConfig::max_frame_len`, both ways

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use prost::Message;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::proto_bridge::{proto_to_record, record_to_proto};
use crate::proto_types::ProtoPushRecord;
use crate::push::PushRecord;

/// Append-only record log backed by a binary file.
pub struct PushLog {
    path: PathBuf,
    config: SyncConfig,
    last_sequence: u64,
}

impl PushLog {
    /// Open or create a log at the given path.
    /// Reads existing frames to determine the last sequence number.
    pub fn open(path: &Path, config: SyncConfig) -> Result<Self, SyncError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let last_sequence = if path.exists() {
            let frames = read_all_frames(path, config.max_frame_len)?;
            frames.last().map(|f| f.sequence).unwrap_or(0)
        } else {
            0
        };
        debug!(path = %path.display(), last_sequence, "opened push log");

        Ok(Self {
            path: path.to_path_buf(),
            config,
            last_sequence,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sequence of the last appended frame, 0 for an empty log.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Append one record. Its sequence must be `last_sequence() + 1`.
    pub fn append(&mut self, record: &PushRecord) -> Result<(), SyncError> {
        let expected = self.last_sequence + 1;
        if record.sequence != expected {
            return Err(SyncError::SequenceViolation {
                expected,
                actual: record.sequence,
            });
        }

        let buf = record_to_proto(record).encode_to_vec();
        let limit = self.config.max_frame_len.min(u32::MAX as usize);
        if buf.is_empty() || buf.len() > limit {
            return Err(SyncError::FrameTooLarge {
                len: buf.len(),
                limit: self.config.max_frame_len,
            });
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let frame_start = file.metadata()?.len();
        if let Err(e) = write_frame(&mut file, &buf, self.config.fsync) {
            // Cut any partial frame so the next append starts on a boundary.
            if let Err(trim) = file.set_len(frame_start) {
                warn!(path = %self.path.display(), error = %trim, "failed to trim partial frame");
            }
            return Err(e.into());
        }

        self.last_sequence = record.sequence;
        Ok(())
    }

    /// Load and decode every record, in sequence order.
    pub fn load_all(&self) -> Result<Vec<PushRecord>, SyncError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_all_frames(&self.path, self.config.max_frame_len)?
            .iter()
            .map(proto_to_record)
            .collect()
    }
}

fn write_frame(file: &mut File, frame: &[u8], fsync: bool) -> io::Result<()> {
    {
        let mut writer = BufWriter::new(&mut *file);
        writer.write_all(&(frame.len() as u32).to_le_bytes())?;
        writer.write_all(frame)?;
        writer.flush()?;
    }
    if fsync {
        file.sync_all()?;
    }
    Ok(())
}

/// Fill `buf` with the next length prefix. `false` means a clean end of
/// file; a partial prefix is a torn tail.
fn read_prefix(reader: &mut impl Read, buf: &mut [u8; 4]) -> Result<bool, SyncError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 => Ok(false),
        4 => Ok(true),
        n => Err(SyncError::Decode(format!(
            "truncated length prefix: {} of 4 bytes",
            n
        ))),
    }
}

/// Read all frames from a file, validating frame integrity and order.
fn read_all_frames(path: &Path, max_frame_len: usize) -> Result<Vec<ProtoPushRecord>, SyncError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut frames: Vec<ProtoPushRecord> = Vec::new();
    let mut len_buf = [0u8; 4];

    loop {
        if !read_prefix(&mut reader, &mut len_buf)? {
            break;
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len == 0 {
            return Err(SyncError::Decode("zero-length frame".to_string()));
        }
        if len > max_frame_len {
            return Err(SyncError::FrameTooLarge {
                len,
                limit: max_frame_len,
            });
        }

        let mut frame = vec![0u8; len];
        reader
            .read_exact(&mut frame)
            .map_err(|e| SyncError::Decode(format!("truncated frame: {}", e)))?;

        let record = ProtoPushRecord::decode(frame.as_slice())
            .map_err(|e| SyncError::Decode(format!("protobuf decode error: {}", e)))?;

        let expected = frames.last().map(|f| f.sequence).unwrap_or(0) + 1;
        if record.sequence != expected {
            return Err(SyncError::SequenceViolation {
                expected,
                actual: record.sequence,
            });
        }
        frames.push(record);
    }

    Ok(frames)
}
