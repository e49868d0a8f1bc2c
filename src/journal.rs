use crate::error::{Error, Result};
use crate::event::Record;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

pub(crate) const JOURNAL_FILE: &str = "journal.jsonl";
pub(crate) const ARCHIVE_FILE: &str = "archive.jsonl.zst";

const SCAN_CHUNK: u64 = 8192;
const ARCHIVE_LEVEL: i32 = 3;

/// Compute the xxh64 hash of a raw journal line (without trailing newline),
/// hex-encoded.
pub fn line_hash(line: &[u8]) -> String {
    format!("{:016x}", xxhash_rust::xxh64::xxh64(line, 0))
}

/// Whether a writer takes the exclusive journal lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    #[default]
    Exclusive,
    /// No locking. Only for setups that serialize writers some other way.
    None,
}

/// Where an appended record landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    pub offset: u64,
    pub next_offset: u64,
    pub hash: String,
}

/// Result of [`JournalReader::wait_for_append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// The journal size differs from the awaited offset; carries the new size.
    Changed(u64),
    Timeout,
}

/// Write side of the journal. Holds the lock for its whole lifetime.
#[derive(Debug)]
pub struct Journal {
    file: File,
    reader: JournalReader,
}

impl Journal {
    /// Open or create the journal in `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// [`Error::Locked`] if another writer holds the lock.
    pub fn open(dir: impl AsRef<Path>, lock: LockMode) -> Result<Self> {
        let reader = JournalReader::new(dir);
        fs::create_dir_all(&reader.dir)?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&reader.journal_path)?;

        if lock == LockMode::Exclusive {
            if let Err(e) = file.try_lock_exclusive() {
                if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                    return Err(Error::Locked(reader.journal_path.clone()));
                }
                return Err(e.into());
            }
        }

        Ok(Journal { file, reader })
    }

    /// Append a record as one line and sync it to disk.
    ///
    /// A failed write is cut off again, and so is any unterminated tail found
    /// before writing, so every record starts on a line of its own.
    pub fn append(&mut self, record: &Record) -> Result<Appended> {
        let mut line = serde_json::to_string(record)?;
        let hash = line_hash(line.as_bytes());
        line.push('\n');

        let offset = self.discard_torn_tail()?;
        let written = self
            .file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.sync_data());
        if let Err(e) = written {
            if let Err(undo) = self.file.set_len(offset) {
                log::warn!(
                    "failed to cut partial record off {}: {undo}",
                    self.reader.journal_path.display()
                );
            }
            return Err(e.into());
        }
        Ok(Appended {
            offset,
            next_offset: offset + line.len() as u64,
            hash,
        })
    }

    /// Move the active journal into the compressed archive and truncate it.
    ///
    /// Complete lines go into a new zstd frame at the end of the archive,
    /// which is created on first rotation. A trailing partial line is
    /// dropped. Returns `false` if there was nothing to rotate.
    pub fn rotate(&mut self) -> Result<bool> {
        let bytes = fs::read(&self.reader.journal_path)?;
        let complete = match bytes.iter().rposition(|&b| b == b'\n') {
            Some(last_newline) => &bytes[..=last_newline],
            None => &[][..],
        };
        if complete.is_empty() {
            return Ok(false);
        }

        let archive = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.reader.archive_path)?;
        let mut encoder = zstd::Encoder::new(archive, ARCHIVE_LEVEL)?;
        encoder.write_all(complete)?;
        encoder.finish()?.sync_data()?;

        // Truncating keeps the descriptor, and with it the lock.
        self.file.set_len(0)?;
        self.file.sync_all()?;
        Ok(true)
    }

    /// Cut the journal back to `len` bytes, dropping an incomplete record
    /// left by a crash so the next append starts on a fresh line.
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn reader(&self) -> &JournalReader {
        &self.reader
    }

    /// End of the journal once bytes after its last newline are removed.
    fn discard_torn_tail(&mut self) -> Result<u64> {
        let len = self.file.seek(SeekFrom::End(0))?;
        if len == 0 {
            return Ok(0);
        }

        let mut last = [0u8; 1];
        self.file.seek(SeekFrom::Start(len - 1))?;
        self.file.read_exact(&mut last)?;
        if last[0] == b'\n' {
            return Ok(len);
        }

        let start = line_start(&mut self.file, len)?;
        log::warn!(
            "discarding {} bytes of torn record at the end of {}",
            len - start,
            self.reader.journal_path.display()
        );
        self.file.set_len(start)?;
        Ok(start)
    }
}

/// Read side of the journal. Cheap to clone; never takes the lock.
#[derive(Debug, Clone)]
pub struct JournalReader {
    dir: PathBuf,
    journal_path: PathBuf,
    archive_path: PathBuf,
}

impl JournalReader {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        JournalReader {
            journal_path: dir.join(JOURNAL_FILE),
            archive_path: dir.join(ARCHIVE_FILE),
            dir,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Current size of the active journal; 0 if it does not exist yet.
    pub fn active_size(&self) -> Result<u64> {
        match fs::metadata(&self.journal_path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Read records from the active journal starting at byte `offset`.
    ///
    /// Yields `(record, next_offset, line_hash)`. Empty lines are skipped; a
    /// trailing line without newline (crash mid-append) ends the iteration.
    pub fn read_from(
        &self,
        offset: u64,
    ) -> Result<impl Iterator<Item = Result<(Record, u64, String)>> + use<>> {
        let (lines, file_len): (Box<dyn BufRead>, u64) = match File::open(&self.journal_path) {
            Ok(mut file) => {
                let file_len = file.metadata()?.len();
                file.seek(SeekFrom::Start(offset.min(file_len)))?;
                (Box::new(BufReader::new(file)), file_len)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => (Box::new(io::empty()), 0),
            Err(e) => return Err(e.into()),
        };

        Ok(RecordLines {
            lines: lines.lines(),
            pos: offset,
            limit: Some(file_len),
        })
    }

    /// Read every archived record, oldest first, across all frames.
    ///
    /// Yields `(record, line_hash)`; nothing if no rotation happened yet.
    pub fn read_archive(&self) -> Result<impl Iterator<Item = Result<(Record, String)>> + use<>> {
        let archived = match File::open(&self.archive_path) {
            Ok(file) => Some(RecordLines {
                lines: BufReader::new(zstd::Decoder::new(file)?).lines(),
                pos: 0,
                limit: None,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(archived
            .into_iter()
            .flatten()
            .map(|item| item.map(|(record, _, hash)| (record, hash))))
    }

    /// Read the whole history: the archive, then the active journal.
    ///
    /// Yields `(record, line_hash)`.
    pub fn read_full(&self) -> Result<Box<dyn Iterator<Item = Result<(Record, String)>>>> {
        let active = self
            .read_from(0)?
            .map(|item| item.map(|(record, _, hash)| (record, hash)));
        Ok(Box::new(self.read_archive()?.chain(active)))
    }

    /// Hash of the line that ends right before byte `offset`.
    ///
    /// `offset` must point just past a newline. Returns `None` for offset 0
    /// or an offset beyond the end of the journal.
    pub fn read_line_hash_before(&self, offset: u64) -> Result<Option<String>> {
        if offset == 0 {
            return Ok(None);
        }

        let mut file = File::open(&self.journal_path)?;
        if offset > file.metadata()?.len() {
            return Ok(None);
        }

        let newline_pos = offset - 1;
        let start = line_start(&mut file, newline_pos)?;
        let mut line = vec![0u8; (newline_pos - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut line)?;
        Ok(Some(line_hash(&line)))
    }

    /// Block until the active journal's size differs from `offset`, or the
    /// timeout elapses.
    ///
    /// Returns immediately if it already differs. A rotation (which shrinks
    /// the journal) also counts as a change.
    pub fn wait_for_append(&self, offset: u64, timeout: Duration) -> Result<WaitResult> {
        let size = self.active_size()?;
        if size != offset {
            return Ok(WaitResult::Changed(size));
        }

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            let _ = tx.send(event);
        })?;
        notify::Watcher::watch(&mut watcher, &self.dir, notify::RecursiveMode::NonRecursive)?;

        let deadline = Instant::now() + timeout;
        loop {
            // The append may have landed between the first check and the watch.
            let size = self.active_size()?;
            if size != offset {
                return Ok(WaitResult::Changed(size));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(WaitResult::Timeout);
            }
            match rx.recv_timeout(remaining) {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(mpsc::RecvTimeoutError::Timeout) => return Ok(WaitResult::Timeout),
                Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(WaitResult::Timeout),
            }
        }
    }
}

/// Offset just past the last newline before `end`, or 0 if there is none.
fn line_start(file: &mut File, end: u64) -> io::Result<u64> {
    let mut scan_end = end;
    while scan_end > 0 {
        let scan_start = scan_end.saturating_sub(SCAN_CHUNK);
        let mut buf = vec![0u8; (scan_end - scan_start) as usize];
        file.seek(SeekFrom::Start(scan_start))?;
        file.read_exact(&mut buf)?;
        if let Some(pos) = buf.iter().rposition(|&b| b == b'\n') {
            return Ok(scan_start + pos as u64 + 1);
        }
        scan_end = scan_start;
    }
    Ok(0)
}

struct RecordLines<I> {
    lines: I,
    pos: u64,
    /// Size of the file being read; a line reaching it has no newline.
    limit: Option<u64>,
}

impl<I: Iterator<Item = io::Result<String>>> Iterator for RecordLines<I> {
    type Item = Result<(Record, u64, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };

            let line_len = line.len() as u64;
            if self.limit.is_some_and(|limit| self.pos + line_len >= limit) {
                return None;
            }

            let next_pos = self.pos + line_len + 1;
            self.pos = next_pos;
            if line.is_empty() {
                continue;
            }

            let hash = line_hash(line.as_bytes());
            return Some(
                serde_json::from_str::<Record>(&line)
                    .map(|record| (record, next_pos, hash))
                    .map_err(Error::from),
            );
        }
    }
}
