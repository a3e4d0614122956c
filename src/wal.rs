use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{EventId, EventRecord};

/// One saved event record. Later entries for the same event supersede earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub event_id: EventId,
    pub record: EventRecord,
}

/// Write one entry as `[len][bincode][crc32]`.
fn encode_entry(writer: &mut impl Write, entry: &LogEntry) -> io::Result<()> {
    let payload =
        bincode::serialize(entry).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes. `Ok(false)` means the log ended (or was
/// cut short) before the buffer filled.
fn read_frame_part(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Append-only log of event records.
///
/// Format per entry: `[u32: len][bincode: LogEntry][u32: crc32]`. A torn or
/// corrupt tail (crash mid-write) ends replay at the last good entry.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the log at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Encode one entry into the write buffer. Nothing is durable until
    /// `flush_sync`.
    pub fn append_buffered(&mut self, entry: &LogEntry) -> io::Result<()> {
        encode_entry(&mut self.writer, entry)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush the buffer and fsync the file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    /// Append one entry and fsync.
    #[cfg(test)]
    pub fn append(&mut self, entry: &LogEntry) -> io::Result<()> {
        self.append_buffered(entry)?;
        self.flush_sync()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write `entries` to the temp file next to the log and fsync it. The
    /// live log is untouched, so a failure here loses nothing.
    pub fn write_compact_file(path: &Path, entries: &[LogEntry]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path.with_extension("wal.tmp"))?);
        for entry in entries {
            encode_entry(&mut writer, entry)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the temp file over the log and reopen for appending.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(self.path.with_extension("wal.tmp"), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Both compaction phases back to back.
    #[cfg(test)]
    pub fn compact(&mut self, entries: &[LogEntry]) -> io::Result<()> {
        Self::write_compact_file(&self.path, entries)?;
        self.swap_compact_file()
    }

    /// Read every valid entry from disk, in write order.
    pub fn replay(path: &Path) -> io::Result<Vec<LogEntry>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();

        loop {
            let mut len_buf = [0u8; 4];
            if !read_frame_part(&mut reader, &mut len_buf)? {
                break;
            }
            let mut payload = vec![0u8; u32::from_le_bytes(len_buf) as usize];
            if !read_frame_part(&mut reader, &mut payload)? {
                break;
            }
            let mut crc_buf = [0u8; 4];
            if !read_frame_part(&mut reader, &mut crc_buf)? {
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                tracing::warn!("{}: checksum mismatch, ignoring log tail", path.display());
                break;
            }
            match bincode::deserialize::<LogEntry>(&payload) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!("{}: undecodable entry ({e}), ignoring log tail", path.display());
                    break;
                }
            }
        }

        Ok(entries)
    }
}
