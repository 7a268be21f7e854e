//! Append-only record log.
//!
//! Every graph mutation is appended here as a length-prefixed bincode frame
//! before it is considered durable. Reopening a store replays the log from
//! the start; a truncated final frame (crash between frames) is tolerated
//! and dropped, which is exactly the coalescer's contract: a crash loses
//! only the uncommitted tail. A frame that fails to decode anywhere else is
//! corruption and fails the open.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::graph::EdgeType;
use tracegraph_core::value::PropValue;
use tracegraph_core::{EdgeId, Error, Result, StepId};

/// One logged graph mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LogRecord {
    /// Node creation with its initial property set
    CreateNode {
        /// Node id
        id: StepId,
        /// Initial properties
        props: Vec<(String, PropValue)>,
    },
    /// Edge creation with its initial property set
    CreateEdge {
        /// Edge id assigned at creation time
        id: EdgeId,
        /// Source node
        source: StepId,
        /// Target node
        target: StepId,
        /// Relationship type
        edge_type: EdgeType,
        /// Initial properties
        props: Vec<(String, PropValue)>,
    },
    /// Edge deletion
    DeleteEdge {
        /// Edge id
        id: EdgeId,
    },
    /// Node property write
    SetNodeProp {
        /// Node id
        id: StepId,
        /// Property key
        key: String,
        /// Property value
        value: PropValue,
    },
    /// Node property removal
    RemoveNodeProp {
        /// Node id
        id: StepId,
        /// Property key
        key: String,
    },
    /// Edge property write
    SetEdgeProp {
        /// Edge id
        id: EdgeId,
        /// Property key
        key: String,
        /// Property value
        value: PropValue,
    },
    /// Edge property removal
    RemoveEdgeProp {
        /// Edge id
        id: EdgeId,
        /// Property key
        key: String,
    },
}

/// Buffered, append-only log writer.
pub struct LogWriter {
    file: BufWriter<File>,
}

impl LogWriter {
    /// Create a fresh log, truncating anything at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file: BufWriter::new(file),
        })
    }

    /// Open an existing log for appending after `valid_len` bytes.
    ///
    /// Anything past `valid_len` is a truncated tail from an unclean stop
    /// and is cut off before the writer is positioned.
    pub fn open_append(path: &Path, valid_len: u64) -> Result<Self> {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(valid_len)?;
        let mut file = file;
        file.seek(SeekFrom::End(0))?;
        Ok(Self {
            file: BufWriter::new(file),
        })
    }

    /// Append one record frame.
    pub fn append(&mut self, record: &LogRecord) -> Result<()> {
        let payload = bincode::serialize(record)?;
        self.file.write_u32::<LittleEndian>(payload.len() as u32)?;
        self.file.write_all(&payload)?;
        Ok(())
    }

    /// Flush buffered frames and fsync. This is the durability point.
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }
}

/// Replay a log from disk.
///
/// Returns the decoded records and the byte length of the valid portion
/// (everything before a truncated final frame, if one exists).
pub fn replay(path: &Path) -> Result<(Vec<LogRecord>, u64)> {
    let file = File::open(path)?;
    let total_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut records = Vec::new();
    let mut valid_len: u64 = 0;

    loop {
        let frame_len = match reader.read_u32::<LittleEndian>() {
            Ok(len) => len as usize,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        let mut payload = vec![0u8; frame_len];
        match reader.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                warn!(
                    valid_len,
                    total_len, "truncated frame at log tail, dropping uncommitted mutations"
                );
                break;
            }
            Err(e) => return Err(e.into()),
        }
        let record: LogRecord = bincode::deserialize(&payload).map_err(|e| {
            Error::Storage(format!("corrupt log record at byte {valid_len}: {e}"))
        })?;
        records.push(record);
        valid_len += 4 + frame_len as u64;
    }

    Ok((records, valid_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_records() -> Vec<LogRecord> {
        vec![
            LogRecord::CreateNode {
                id: 0,
                props: vec![("_tg_actor".into(), PropValue::Text("A".into()))],
            },
            LogRecord::CreateNode { id: 1, props: vec![] },
            LogRecord::CreateEdge {
                id: EdgeId(0),
                source: 0,
                target: 1,
                edge_type: EdgeType::Fsm,
                props: vec![("_tg_tokens".into(), PropValue::Int(3))],
            },
            LogRecord::SetNodeProp {
                id: 1,
                key: "weight".into(),
                value: PropValue::Float(0.5),
            },
            LogRecord::DeleteEdge { id: EdgeId(0) },
        ]
    }

    #[test]
    fn test_write_replay_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.log");

        let records = sample_records();
        let mut writer = LogWriter::create(&path).unwrap();
        for r in &records {
            writer.append(r).unwrap();
        }
        writer.sync().unwrap();
        drop(writer);

        let (replayed, valid_len) = replay(&path).unwrap();
        assert_eq!(replayed, records);
        assert_eq!(valid_len, fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn test_truncated_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.log");

        let records = sample_records();
        let mut writer = LogWriter::create(&path).unwrap();
        for r in &records {
            writer.append(r).unwrap();
        }
        writer.sync().unwrap();
        drop(writer);

        // Chop the last frame in half.
        let full_len = fs::metadata(&path).unwrap().len();
        let f = OpenOptions::new().write(true).open(&path).unwrap();
        f.set_len(full_len - 3).unwrap();
        drop(f);

        let (replayed, valid_len) = replay(&path).unwrap();
        assert_eq!(replayed.len(), records.len() - 1);
        assert!(valid_len < full_len - 3);

        // Appending after the valid prefix produces a clean log again.
        let mut writer = LogWriter::open_append(&path, valid_len).unwrap();
        writer.append(records.last().unwrap()).unwrap();
        writer.sync().unwrap();
        drop(writer);

        let (replayed, _) = replay(&path).unwrap();
        assert_eq!(replayed, records);
    }

    #[test]
    fn test_empty_log_replays_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.log");
        LogWriter::create(&path).unwrap().sync().unwrap();
        let (records, valid_len) = replay(&path).unwrap();
        assert!(records.is_empty());
        assert_eq!(valid_len, 0);
    }
}
