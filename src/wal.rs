use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Write one record: `[u32 len][bincode Event][u32 crc32]`, little endian.
/// Returns the number of bytes written.
fn write_record(writer: &mut impl Write, event: &Event) -> io::Result<u64> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "record too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(8 + u64::from(len))
}

/// Fill `buf` completely, or report a clean end of log with `Ok(false)`.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Read the next intact record. `None` at end of log, on a torn tail, or at
/// the first record whose checksum or payload does not verify.
fn read_record(reader: &mut impl Read) -> io::Result<Option<Event>> {
    let mut word = [0u8; 4];
    if !read_full(reader, &mut word)? {
        return Ok(None);
    }
    let mut payload = vec![0u8; u32::from_le_bytes(word) as usize];
    if !read_full(reader, &mut payload)? || !read_full(reader, &mut word)? {
        return Ok(None);
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload).ok())
}

/// Replace the writer without flushing whatever the old one still buffers.
fn discard_writer(slot: &mut BufWriter<File>, file: File) {
    let stale = std::mem::replace(slot, BufWriter::new(file));
    let _ = stale.into_parts();
}

/// Append-only log of committed reservation events.
///
/// Replaying the log from the start rebuilds the committed set. A crash
/// mid-append leaves a torn last record, which replay drops. A failed append
/// is cut back off the file, so an event the caller saw rejected never
/// resurfaces on replay.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    /// File length up to the last record that was written and synced.
    synced_len: u64,
    /// Set after a failed append until the file is cut back to `synced_len`.
    needs_rollback: bool,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let synced_len = file.metadata()?.len();
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            synced_len,
            needs_rollback: false,
            appends_since_compact: 0,
        })
    }

    /// Write one event and fsync it. On error the log is rolled back to its
    /// last synced length before returning.
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        if self.needs_rollback {
            self.rollback()?;
        }
        match self.write_synced(event) {
            Ok(written) => {
                self.synced_len += written;
                self.appends_since_compact += 1;
                Ok(())
            }
            Err(e) => {
                self.needs_rollback = true;
                if let Err(rollback) = self.rollback() {
                    tracing::error!("WAL rollback to {} bytes failed: {rollback}", self.synced_len);
                }
                Err(e)
            }
        }
    }

    fn write_synced(&mut self, event: &Event) -> io::Result<u64> {
        let written = write_record(&mut self.writer, event)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(written)
    }

    /// Drop buffered bytes and truncate the file to `synced_len`.
    fn rollback(&mut self) -> io::Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        discard_writer(&mut self.writer, file);
        let file = self.writer.get_ref();
        file.set_len(self.synced_len)?;
        file.sync_all()?;
        self.needs_rollback = false;
        Ok(())
    }

    /// Make sure the file holds exactly the synced records. Called on close.
    pub fn sync(&mut self) -> io::Result<()> {
        if self.needs_rollback {
            return self.rollback();
        }
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    fn compact_tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write `events` to the side file and fsync it. Does not touch the live log.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_tmp_path(path))?);
        for event in events {
            write_record(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the side file over the live log and reopen for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_tmp_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.synced_len = file.metadata()?.len();
        discard_writer(&mut self.writer, file);
        self.needs_rollback = false;
        self.appends_since_compact = 0;
        Ok(())
    }

    /// All intact events in log order. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        while let Some(event) = read_record(&mut reader)? {
            events.push(event);
        }
        Ok(events)
    }
}
