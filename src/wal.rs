//! Write-ahead log of ledger events.
//!
//! Entry format: `[u32 len][bincode Event][u32 crc32]`, little-endian, where
//! `len` counts the payload only. The file holds nothing but whole,
//! acknowledged batches: a batch that fails to write or sync is cut back off
//! before its callers hear about it, and a torn tail found on open is
//! truncated before anything new is appended behind it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::model::Event;

/// Largest payload accepted in either direction. Rooms and bookings are small;
/// a bigger length prefix can only be garbage.
const MAX_ENTRY_LEN: usize = 1 << 20;

/// Byte storage under the log. `File` in production.
pub trait LogFile: Write + Send {
    /// Make everything written so far durable.
    fn sync(&mut self) -> io::Result<()>;
    /// Cut the storage back to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

fn encode_entry(out: &mut Vec<u8>, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_ENTRY_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("WAL entry of {} bytes exceeds {MAX_ENTRY_LEN}", payload.len()),
        ));
    }
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(())
}

/// `Ok(false)` when the reader ends before `buf` is full.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Decode entries up to the first torn or corrupt one.
/// Returns the events and the byte length of that valid prefix.
fn decode_entries(mut reader: impl Read) -> io::Result<(Vec<Event>, u64)> {
    let mut events = Vec::new();
    let mut valid_len = 0u64;
    loop {
        let mut len_buf = [0u8; 4];
        if !read_full(&mut reader, &mut len_buf)? {
            break;
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_ENTRY_LEN {
            break;
        }

        let mut payload = vec![0u8; len];
        let mut crc_buf = [0u8; 4];
        if !read_full(&mut reader, &mut payload)? || !read_full(&mut reader, &mut crc_buf)? {
            break;
        }
        if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
            break;
        }
        let Ok(event) = bincode::deserialize::<Event>(&payload) else {
            break;
        };
        events.push(event);
        valid_len += (len + 8) as u64;
    }
    Ok((events, valid_len))
}

fn write_synced(file: &mut impl LogFile, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes)?;
    file.flush()?;
    file.sync()
}

pub struct Wal<F: LogFile = File> {
    file: F,
    path: PathBuf,
    /// Length of the synced, whole-entry prefix. Failed batches roll back to it.
    durable_len: u64,
    appends_since_compact: u64,
    /// A failed batch could not be cut back off; refuse appends until compaction.
    poisoned: bool,
}

impl Wal<File> {
    /// Open (or create) the log at `path` and recover its events.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let (events, valid_len) = decode_entries(BufReader::new(&file))?;

        let file_len = file.metadata()?.len();
        if file_len > valid_len {
            warn!(
                "WAL {}: discarding {} bytes of torn or corrupt tail",
                path.display(),
                file_len - valid_len
            );
            file.truncate(valid_len)?;
            file.sync()?;
        }
        Ok((Self::with_file(file, path.to_path_buf(), valid_len), events))
    }

    /// Replace the log with exactly `events`: temp file, fsync, rename, reopen.
    /// Clears a poisoned log.
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        let mut bytes = Vec::new();
        for event in events {
            encode_entry(&mut bytes, event)?;
        }
        let tmp_path = self.path.with_extension("wal.tmp");
        let mut tmp = File::create(&tmp_path)?;
        write_synced(&mut tmp, &bytes)?;

        fs::rename(&tmp_path, &self.path)?;
        // Past the rename the old handle points at an unlinked file.
        match OpenOptions::new().append(true).open(&self.path) {
            Ok(file) => {
                self.file = file;
                self.poisoned = false;
            }
            Err(e) => {
                self.poisoned = true;
                return Err(e);
            }
        }

        self.durable_len = bytes.len() as u64;
        self.appends_since_compact = 0;
        sync_parent_dir(&self.path);
        Ok(())
    }
}

impl<F: LogFile> Wal<F> {
    fn with_file(file: F, path: PathBuf, durable_len: u64) -> Self {
        Self {
            file,
            path,
            durable_len,
            appends_since_compact: 0,
            poisoned: false,
        }
    }

    /// Write `events` as one batch under a single sync.
    ///
    /// All or nothing: on any failure the file is cut back to its length
    /// before the batch, so no entry of a failed batch survives a restart.
    pub fn append_batch<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a Event>,
    ) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other(
                "WAL holds an unrolled failed batch; refusing appends until compaction",
            ));
        }
        let mut bytes = Vec::new();
        let mut count = 0u64;
        for event in events {
            encode_entry(&mut bytes, event)?;
            count += 1;
        }
        if bytes.is_empty() {
            return Ok(());
        }

        match write_synced(&mut self.file, &bytes) {
            Ok(()) => {
                self.durable_len += bytes.len() as u64;
                self.appends_since_compact += count;
                Ok(())
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    fn rollback(&mut self) {
        let len = self.durable_len;
        if let Err(e) = self.file.truncate(len).and_then(|()| self.file.sync()) {
            error!(
                "WAL {}: could not roll back failed batch to {len} bytes: {e}",
                self.path.display()
            );
            self.poisoned = true;
        }
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }
}

fn sync_parent_dir(path: &Path) {
    let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) else {
        return;
    };
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        warn!("could not sync WAL directory {}: {e}", dir.display());
    }
}
