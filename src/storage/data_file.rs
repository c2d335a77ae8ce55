//! Data file
//!
//! Byte-addressable store of all values, framed by the record codec.
//!
//! The file handle is shared with the background writer through a mutex;
//! every access locks, seeks and performs one read or write, so the cursor
//! position never leaks between users. `len` is the logical end of file: it
//! already counts appends that were reserved but may not have landed yet.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ChestError, Result};

use super::free_list::FreeBlock;
use super::record::{self, RecordHeader, PREFIX_SIZE};

/// Data file handle shared between the caller and the writer thread
pub type SharedFile = Arc<Mutex<File>>;

/// Result of the open-time scan
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Free markers found, in file order
    pub free: Vec<FreeBlock>,

    /// Offsets of live records, in file order
    pub live: Vec<u64>,

    /// Offset where a torn record was cut off, if any
    pub truncated_at: Option<u64>,
}

/// The value store
pub struct DataFile {
    path: PathBuf,
    file: SharedFile,

    /// Logical length, including reserved appends
    len: u64,

    /// Read-ahead buffer, owned per instance
    read_buf: Vec<u8>,
}

impl DataFile {
    /// Open or create the data file
    pub fn open(path: &Path, read_buffer_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
            len,
            read_buf: vec![0u8; read_buffer_size.max(PREFIX_SIZE as usize)],
        })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Reserve room for a live record at the end of the file.
    ///
    /// The bytes are written later (by the writer thread or `write_record_at`).
    pub fn reserve_append(&mut self, payload_len: u32) -> u64 {
        let offset = self.len;
        self.len += PREFIX_SIZE + payload_len as u64;
        offset
    }

    /// Append a live record and return the offset of its prefix
    pub fn append_record(&mut self, payload: &[u8]) -> Result<u64> {
        let len = record::checked_len(payload.len())?;
        let offset = self.reserve_append(len);
        self.write_record_at(offset, payload)?;
        Ok(offset)
    }

    /// Overwrite a record in place. The caller guarantees room for
    /// `PREFIX_SIZE + payload.len()` bytes at `offset`.
    pub fn write_record_at(&mut self, offset: u64, payload: &[u8]) -> Result<()> {
        record::checked_len(payload.len())?;
        let mut file = self.file.lock();
        write_framed(&mut file, offset, payload)?;
        Ok(())
    }

    /// Write the free marker for `block`; surrounding bytes are untouched
    pub fn mark_free(&mut self, block: FreeBlock) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(block.offset))?;
        file.write_all(&record::encode_free(block.size))?;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read the prefix at `offset`
    pub fn read_header_at(&mut self, offset: u64) -> Result<RecordHeader> {
        self.check_bounds(offset)?;
        let mut prefix = [0u8; 4];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut prefix)?;
        Ok(record::decode(prefix))
    }

    /// Read the payload of the live record at `offset`.
    ///
    /// One read fills the read-ahead buffer; payloads that do not fit get a
    /// second read for the remainder.
    pub fn read_record_at(&mut self, offset: u64) -> Result<Vec<u8>> {
        self.check_bounds(offset)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let filled = read_up_to(&mut *file, &mut self.read_buf)?;
        if filled < PREFIX_SIZE as usize {
            return Err(ChestError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("record prefix at offset {} is cut short", offset),
            )));
        }

        let prefix: [u8; 4] = self.read_buf[..PREFIX_SIZE as usize]
            .try_into()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "read buffer too small"))?;
        let len = match record::decode(prefix) {
            RecordHeader::Live(len) => len as usize,
            RecordHeader::Free(_) => {
                return Err(ChestError::IndexCorrupt(format!(
                    "offset {} points at a free block, not a live record",
                    offset
                )))
            }
        };

        let start = PREFIX_SIZE as usize;
        let buffered = (filled - start).min(len);
        let mut payload = Vec::with_capacity(len);
        payload.extend_from_slice(&self.read_buf[start..start + buffered]);

        if buffered < len {
            payload.resize(len, 0);
            file.read_exact(&mut payload[buffered..])?;
        }

        Ok(payload)
    }

    // =========================================================================
    // Startup Scan
    // =========================================================================

    /// Walk every record from offset 0 to end of file.
    ///
    /// A record whose declared span runs past the end of the file (a torn
    /// append) is cut off by truncating the file at its prefix.
    pub fn scan(&mut self) -> Result<ScanReport> {
        let mut report = ScanReport::default();
        let mut file = self.file.lock();
        let file_len = file.metadata()?.len();

        {
            file.seek(SeekFrom::Start(0))?;
            let mut reader = BufReader::new(&mut *file);
            let mut pos = 0u64;
            let mut prefix = [0u8; 4];

            while pos < file_len {
                if file_len - pos < PREFIX_SIZE {
                    report.truncated_at = Some(pos);
                    break;
                }
                reader.read_exact(&mut prefix)?;
                let header = record::decode(prefix);

                if pos + header.span() > file_len {
                    report.truncated_at = Some(pos);
                    break;
                }

                match header {
                    RecordHeader::Free(size) => report.free.push(FreeBlock::new(pos, size)),
                    RecordHeader::Live(_) => report.live.push(pos),
                }

                reader.seek_relative(header.size() as i64)?;
                pos += header.span();
            }
        }

        if let Some(cut) = report.truncated_at {
            tracing::warn!(
                path = %self.path.display(),
                offset = cut,
                dropped = file_len - cut,
                "Truncating torn record at end of data file"
            );
            file.set_len(cut)?;
            self.len = cut;
        } else {
            self.len = file_len;
        }

        Ok(report)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Flush file contents to disk
    pub fn sync(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }

    /// Handle for the writer thread
    pub fn shared(&self) -> SharedFile {
        Arc::clone(&self.file)
    }

    /// Logical length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_bounds(&self, offset: u64) -> Result<()> {
        if offset + PREFIX_SIZE > self.len {
            return Err(ChestError::IndexCorrupt(format!(
                "offset {} is outside the data file ({} bytes)",
                offset, self.len
            )));
        }
        Ok(())
    }
}

/// Write a live record (prefix + payload) at `offset` with a single write
fn write_framed(file: &mut File, offset: u64, payload: &[u8]) -> io::Result<usize> {
    let mut buf = Vec::with_capacity(PREFIX_SIZE as usize + payload.len());
    buf.extend_from_slice(&record::encode_live(payload.len() as u32));
    buf.extend_from_slice(payload);
    write_all_at(file, offset, &buf)
}

/// Write already-framed bytes at `offset`
pub(crate) fn write_all_at(file: &mut File, offset: u64, buf: &[u8]) -> io::Result<usize> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(buf)?;
    Ok(buf.len())
}

/// Fill as much of `buf` as the file allows; stops early only at end of file
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
