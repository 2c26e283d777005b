//! Append-only record log.

use crate::error::{Result, StoreError};
use crate::types::{Hash, RecordId, Timestamp};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Magic bytes for a log frame.
const LOG_MAGIC: &[u8; 4] = b"REC\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// Frame header size: magic + version + op + body length.
const FRAME_HEADER_SIZE: u64 = 4 + 1 + 1 + 4;

/// Trailing checksum size.
const FRAME_CHECKSUM_SIZE: u64 = 4;

/// Upper bound for a single frame body.
const MAX_BODY_SIZE: u32 = 64 * 1024 * 1024;

const OP_PUT: u8 = 0;
const OP_DELETE: u8 = 1;

/// A record as persisted in the log. The image lives in blob storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: RecordId,
    pub title: String,
    pub description: String,
    pub image: Hash,
    pub updated_at: Timestamp,
}

/// One mutation of the `items` object store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogEntry {
    Put(StoredRecord),
    Delete(RecordId),
}

/// Append-only log of put/delete frames.
pub struct RecordLog {
    file: RwLock<File>,

    /// Offset of the end of the last complete frame.
    file_size: RwLock<u64>,
}

impl RecordLog {
    /// Open or create a record log.
    ///
    /// A torn frame at the tail (from a crash mid-append) is truncated away.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let on_disk = file.metadata()?.len();
        let valid_end = Self::scan_valid_end(&mut file, on_disk)?;
        if valid_end < on_disk {
            tracing::warn!(
                path = %path.display(),
                on_disk,
                valid_end,
                "truncating torn frame at end of record log"
            );
            file.set_len(valid_end)?;
            file.sync_all()?;
        }

        Ok(Self {
            file: RwLock::new(file),
            file_size: RwLock::new(valid_end),
        })
    }

    /// Append an entry and sync it, returning the offset of its frame.
    pub fn append(&self, entry: &LogEntry) -> Result<u64> {
        let mut file = self.file.write();

        let (op, body) = encode_entry(entry);

        let offset = *self.file_size.read();
        file.seek(SeekFrom::Start(offset))?;

        file.write_all(LOG_MAGIC)?;
        file.write_all(&[LOG_VERSION])?;
        file.write_all(&[op])?;
        file.write_all(&(body.len() as u32).to_le_bytes())?;
        file.write_all(&body)?;
        file.write_all(&crc32fast::hash(&body).to_le_bytes())?;

        file.sync_all()?;
        *self.file_size.write() = file.stream_position()?;

        Ok(offset)
    }

    /// Force sync the log file to disk.
    pub fn sync(&self) -> Result<()> {
        self.file.write().sync_all()?;
        Ok(())
    }

    /// Read the entry whose frame starts at `offset`.
    pub fn read_at(&self, offset: u64) -> Result<LogEntry> {
        self.read_frame(offset).map(|(entry, _)| entry)
    }

    /// Iterate all entries from a given offset, in write order.
    pub fn iter_from(&self, offset: u64) -> LogIterator<'_> {
        LogIterator {
            log: self,
            offset,
            end: *self.file_size.read(),
        }
    }

    /// Current size of the log in bytes.
    pub fn size(&self) -> u64 {
        *self.file_size.read()
    }

    /// Read one frame, returning the entry and the offset of the next frame.
    fn read_frame(&self, offset: u64) -> Result<(LogEntry, u64)> {
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;

        let (op, body) = read_raw_frame(&mut *file)?;
        let next = offset + FRAME_HEADER_SIZE + body.len() as u64 + FRAME_CHECKSUM_SIZE;

        Ok((decode_entry(op, &body)?, next))
    }

    /// Walk frames from the start and return the end offset of the last
    /// complete one. Only an incomplete frame at the tail is tolerated;
    /// a checksum failure in a complete frame is corruption.
    fn scan_valid_end(file: &mut File, on_disk: u64) -> Result<u64> {
        file.seek(SeekFrom::Start(0))?;
        let mut offset = 0u64;

        while offset < on_disk {
            match read_raw_frame(file) {
                Ok((_, body)) => {
                    offset += FRAME_HEADER_SIZE + body.len() as u64 + FRAME_CHECKSUM_SIZE;
                }
                Err(StoreError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
        }

        Ok(offset)
    }
}

/// Iterator over entries in the log.
pub struct LogIterator<'a> {
    log: &'a RecordLog,
    offset: u64,
    end: u64,
}

impl<'a> Iterator for LogIterator<'a> {
    type Item = Result<(u64, LogEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.end {
            return None;
        }

        let current = self.offset;
        match self.log.read_frame(current) {
            Ok((entry, next)) => {
                self.offset = next;
                Some(Ok((current, entry)))
            }
            Err(e) => {
                self.offset = self.end; // Stop iteration on error
                Some(Err(e))
            }
        }
    }
}

fn read_raw_frame(reader: &mut impl Read) -> Result<(u8, Vec<u8>)> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != LOG_MAGIC {
        return Err(StoreError::InvalidFormat("Invalid record magic".into()));
    }

    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != LOG_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported log version: {}",
            version[0]
        )));
    }

    let mut op = [0u8; 1];
    reader.read_exact(&mut op)?;

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes);
    if len > MAX_BODY_SIZE {
        return Err(StoreError::Corruption(format!("frame body too large: {len}")));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body)?;

    let mut checksum_bytes = [0u8; 4];
    reader.read_exact(&mut checksum_bytes)?;
    let stored_checksum = u32::from_le_bytes(checksum_bytes);
    let computed_checksum = crc32fast::hash(&body);

    if stored_checksum != computed_checksum {
        return Err(StoreError::ChecksumMismatch {
            expected: stored_checksum,
            got: computed_checksum,
        });
    }

    Ok((op[0], body))
}

fn encode_entry(entry: &LogEntry) -> (u8, Vec<u8>) {
    match entry {
        LogEntry::Put(record) => {
            let mut body = Vec::with_capacity(
                8 + 8 + 4 + record.title.len() + 4 + record.description.len() + 32,
            );
            body.extend_from_slice(&record.id.0.to_le_bytes());
            body.extend_from_slice(&record.updated_at.0.to_le_bytes());
            put_str(&mut body, &record.title);
            put_str(&mut body, &record.description);
            body.extend_from_slice(&record.image.0);
            (OP_PUT, body)
        }
        LogEntry::Delete(id) => (OP_DELETE, id.0.to_le_bytes().to_vec()),
    }
}

fn decode_entry(op: u8, body: &[u8]) -> Result<LogEntry> {
    let mut cursor = body;
    let entry = match op {
        OP_PUT => {
            let id = RecordId(u64::from_le_bytes(take_array(&mut cursor)?));
            let updated_at = Timestamp(i64::from_le_bytes(take_array(&mut cursor)?));
            let title = take_str(&mut cursor)?;
            let description = take_str(&mut cursor)?;
            let image = Hash(take_array(&mut cursor)?);
            LogEntry::Put(StoredRecord {
                id,
                title,
                description,
                image,
                updated_at,
            })
        }
        OP_DELETE => LogEntry::Delete(RecordId(u64::from_le_bytes(take_array(&mut cursor)?))),
        other => {
            return Err(StoreError::InvalidFormat(format!("Unknown log op: {other}")));
        }
    };

    if !cursor.is_empty() {
        return Err(StoreError::Corruption(format!(
            "{} trailing bytes in log frame",
            cursor.len()
        )));
    }

    Ok(entry)
}

fn put_str(body: &mut Vec<u8>, s: &str) {
    body.extend_from_slice(&(s.len() as u32).to_le_bytes());
    body.extend_from_slice(s.as_bytes());
}

fn take_array<const N: usize>(cursor: &mut &[u8]) -> Result<[u8; N]> {
    if cursor.len() < N {
        return Err(StoreError::Corruption("log frame body truncated".into()));
    }
    let (head, rest) = cursor.split_at(N);
    *cursor = rest;
    let mut out = [0u8; N];
    out.copy_from_slice(head);
    Ok(out)
}

fn take_str(cursor: &mut &[u8]) -> Result<String> {
    let len = u32::from_le_bytes(take_array(cursor)?) as usize;
    if cursor.len() < len {
        return Err(StoreError::Corruption("log frame string truncated".into()));
    }
    let (head, rest) = cursor.split_at(len);
    *cursor = rest;
    String::from_utf8(head.to_vec())
        .map_err(|e| StoreError::Deserialization(format!("invalid utf-8 in log frame: {e}")))
}
