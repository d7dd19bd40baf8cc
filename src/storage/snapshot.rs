//! Snapshot files - durable checkpoints of the result cache and history.
//!
//! Each collection lives in its own file so a damaged history never costs the
//! cache (and vice versa). Writes go to a temp file that is atomically renamed
//! over the previous snapshot; reads go through a memory map.
//!
//! # File Format
//! ```text
//! Header (one JSON line, space padded to a fixed width):
//!   magic: "TRCR"
//!   version: 1
//!   kind: "cache" | "history"
//!   entries: u64
//!   payload_len: u64
//!   written_at: u64 (ms since epoch)
//!
//! Payload (bincode, payload_len bytes):
//!   cache:   HashMap<"<region>:<x>:<z>", ResultRecord>
//!   history: Vec<ResultRecord>
//! ```

use memmap2::Mmap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, TracerError};
use crate::types::now_ms;

const MAGIC: &str = "TRCR";
const VERSION: u32 = 1;
const HEADER_WIDTH: usize = 200;

/// Metadata line at the start of every snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: String,
    pub version: u32,
    pub kind: String,
    pub entries: u64,
    pub payload_len: u64,
    pub written_at: u64,
}

/// One snapshot file holding a single serialized collection.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
    kind: &'static str,
}

impl SnapshotFile {
    pub fn new<P: AsRef<Path>>(path: P, kind: &'static str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            kind,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Atomically replaces the snapshot with `payload`.
    pub fn write<T: Serialize>(&self, payload: &T, entries: usize) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let body = bincode::serialize(payload)?;
        let header = SnapshotHeader {
            magic: MAGIC.to_string(),
            version: VERSION,
            kind: self.kind.to_string(),
            entries: entries as u64,
            payload_len: body.len() as u64,
            written_at: now_ms(),
        };
        let header_json = serde_json::to_string(&header)?;
        if header_json.len() >= HEADER_WIDTH {
            return Err(TracerError::Snapshot(format!(
                "Header too large ({} bytes)",
                header_json.len()
            )));
        }
        let header_line = format!("{:<width$}\n", header_json, width = HEADER_WIDTH - 1);

        let tmp_path = self.path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(header_line.as_bytes())?;
        file.write_all(&body)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Reads only the header. `None` when the file does not exist.
    pub fn read_header(&self) -> Result<Option<SnapshotHeader>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mmap = self.map()?;
        let (header, _) = self.parse_header(&mmap)?;
        Ok(Some(header))
    }

    /// Reads the payload. `None` when the file does not exist.
    pub fn read<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mmap = self.map()?;
        let (header, body_start) = self.parse_header(&mmap)?;

        let body_end = body_start
            .checked_add(header.payload_len as usize)
            .filter(|end| *end <= mmap.len())
            .ok_or_else(|| {
                TracerError::Snapshot(format!(
                    "Truncated {} snapshot: expected {} payload bytes",
                    self.kind, header.payload_len
                ))
            })?;

        let payload = bincode::deserialize(&mmap[body_start..body_end])?;
        Ok(Some(payload))
    }

    fn map(&self) -> Result<Mmap> {
        let file = File::open(&self.path)?;
        if file.metadata()?.len() == 0 {
            return Err(TracerError::Snapshot(format!(
                "{} is empty",
                self.path.display()
            )));
        }
        // The file is only ever replaced by rename, never written in place.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(mmap)
    }

    fn parse_header(&self, mmap: &Mmap) -> Result<(SnapshotHeader, usize)> {
        let newline_pos = mmap
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| TracerError::Snapshot("No header line found".to_string()))?;

        let header_str = std::str::from_utf8(&mmap[..newline_pos])
            .map_err(|e| TracerError::Snapshot(format!("Invalid UTF-8 in header: {}", e)))?
            .trim();

        let header: SnapshotHeader = serde_json::from_str(header_str)?;

        if header.magic != MAGIC {
            return Err(TracerError::Snapshot("Invalid magic number".to_string()));
        }
        if header.version != VERSION {
            return Err(TracerError::Snapshot(format!(
                "Unsupported version: {}",
                header.version
            )));
        }
        if header.kind != self.kind {
            return Err(TracerError::Snapshot(format!(
                "Expected a {} snapshot, found {}",
                self.kind, header.kind
            )));
        }

        Ok((header, newline_pos + 1))
    }
}
