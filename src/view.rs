use crate::error::Result;
use crate::event::Record;
use crate::journal::{Appended, JournalReader};
use crate::snapshot::{self, Snapshot, SNAPSHOT_FILE};
use crate::state::{reduce, RegistryState};
use std::path::{Path, PathBuf};

/// The folded registry state plus its position in the journal.
///
/// Loads and verifies the snapshot on first refresh, then folds only the
/// records appended since. Records whose `seq` was already folded are
/// skipped, so replaying an archive that overlaps the active journal
/// (crash during rotation) is harmless. A jump in `seq` means the writer
/// rotated records this view never saw; they are read back from the archive.
pub struct RegistryView {
    snapshot_path: PathBuf,
    state: RegistryState,
    offset: u64,
    hash: String,
    loaded: bool,
    needs_full_replay: bool,
    /// Readers never write the snapshot; only the writer owns it.
    persist: bool,
    unsaved: u64,
}

impl std::fmt::Debug for RegistryView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryView")
            .field("snapshot_path", &self.snapshot_path)
            .field("offset", &self.offset)
            .field("last_seq", &self.state.last_seq)
            .field("unsaved", &self.unsaved)
            .finish()
    }
}

enum SnapshotValidity {
    Valid,
    OffsetBeyondEof,
    HashMismatch,
}

impl RegistryView {
    pub(crate) fn new(dir: &Path, persist: bool) -> Self {
        RegistryView {
            snapshot_path: dir.join(SNAPSHOT_FILE),
            state: RegistryState::default(),
            offset: 0,
            hash: String::new(),
            loaded: false,
            needs_full_replay: false,
            persist,
            unsaved: 0,
        }
    }

    /// Bring the state up to date with the journal.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the journal or saving the snapshot fails.
    /// The state stays at the last record folded successfully.
    pub fn refresh(&mut self, reader: &JournalReader) -> Result<&RegistryState> {
        if !self.loaded {
            self.load(reader)?;
        } else if self.offset > 0 && !matches!(self.verify(reader)?, SnapshotValidity::Valid) {
            // The journal was rotated (and maybe appended to) since the last
            // refresh. Everything already folded is skipped by seq.
            log::debug!("journal rotated since offset {}, replaying archive", self.offset);
            self.offset = 0;
            self.hash.clear();
            self.needs_full_replay = true;
        }

        let mut folded = 0u64;

        if self.needs_full_replay {
            self.needs_full_replay = false;
            for item in reader.read_archive()? {
                let (record, _) = item?;
                if self.fold(&record) {
                    folded += 1;
                }
            }
            self.offset = 0;
            self.hash.clear();
        }

        for item in reader.read_from(self.offset)? {
            let (record, next_offset, hash) = item?;
            if record.seq > self.state.last_seq + 1 {
                // Records went into the archive before this view saw them.
                folded += self.catch_up(reader, record.seq)?;
            }
            if self.fold(&record) {
                folded += 1;
            }
            self.offset = next_offset;
            self.hash = hash;
        }

        if folded > 0 {
            self.unsaved += folded;
            self.checkpoint()?;
        }

        Ok(&self.state)
    }

    /// Discard the snapshot and fold the whole history again.
    pub fn rebuild(&mut self, reader: &JournalReader) -> Result<&RegistryState> {
        if self.persist {
            snapshot::delete(&self.snapshot_path)?;
        }
        self.reset();
        self.loaded = true;
        self.refresh(reader)
    }

    /// Current in-memory state. No I/O.
    pub fn state(&self) -> &RegistryState {
        &self.state
    }

    /// Byte offset into the active journal just past the last folded record.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Records folded since the snapshot was last written.
    pub fn unsaved(&self) -> u64 {
        self.unsaved
    }

    /// Write the snapshot now. No-op for read-only views.
    pub fn checkpoint(&mut self) -> Result<()> {
        if !self.persist {
            return Ok(());
        }
        snapshot::save(
            &self.snapshot_path,
            &Snapshot::new(&self.state, self.offset, self.hash.clone(), self.state.last_seq),
        )?;
        self.unsaved = 0;
        Ok(())
    }

    /// Accept a state the writer already folded for the record it appended.
    pub(crate) fn advance(&mut self, state: RegistryState, appended: Appended) {
        self.state = state;
        self.offset = appended.next_offset;
        self.hash = appended.hash;
        self.unsaved += 1;
    }

    /// The active journal was truncated into the archive.
    pub(crate) fn reset_offset(&mut self) -> Result<()> {
        self.offset = 0;
        self.hash.clear();
        self.unsaved = self.unsaved.max(1);
        self.checkpoint()
    }

    /// Fold archived records missing before `seq`.
    fn catch_up(&mut self, reader: &JournalReader, seq: u64) -> Result<u64> {
        log::debug!(
            "journal skips from seq {} to {seq}, replaying archive",
            self.state.last_seq
        );
        let mut folded = 0;
        for item in reader.read_archive()? {
            let (record, _) = item?;
            if record.seq >= seq {
                break;
            }
            if self.fold(&record) {
                folded += 1;
            }
        }
        if self.state.last_seq + 1 != seq {
            log::warn!(
                "records {} to {} are missing from {}",
                self.state.last_seq + 1,
                seq - 1,
                reader.archive_path().display()
            );
        }
        Ok(folded)
    }

    fn fold(&mut self, record: &Record) -> bool {
        if record.seq <= self.state.last_seq {
            return false;
        }
        self.state = reduce(std::mem::take(&mut self.state), record);
        true
    }

    fn reset(&mut self) {
        self.state = RegistryState::default();
        self.offset = 0;
        self.hash.clear();
        self.needs_full_replay = true;
    }

    fn load(&mut self, reader: &JournalReader) -> Result<()> {
        self.loaded = true;
        match snapshot::load::<RegistryState>(&self.snapshot_path)? {
            Some(snap) => {
                self.state = snap.state;
                self.offset = snap.offset;
                self.hash = snap.hash;
            }
            None => {
                self.needs_full_replay = true;
                return Ok(());
            }
        }

        match self.verify(reader)? {
            SnapshotValidity::Valid => {}
            SnapshotValidity::OffsetBeyondEof => {
                log::warn!(
                    "snapshot offset {} is beyond the end of {}, rebuilding",
                    self.offset,
                    reader.journal_path().display()
                );
                self.reset();
            }
            SnapshotValidity::HashMismatch => {
                log::warn!(
                    "snapshot does not match {}, rebuilding",
                    reader.journal_path().display()
                );
                self.reset();
            }
        }
        Ok(())
    }

    fn verify(&self, reader: &JournalReader) -> Result<SnapshotValidity> {
        if self.offset == 0 {
            return Ok(SnapshotValidity::Valid);
        }
        if self.offset > reader.active_size()? {
            return Ok(SnapshotValidity::OffsetBeyondEof);
        }
        match reader.read_line_hash_before(self.offset)? {
            Some(hash) if hash == self.hash => Ok(SnapshotValidity::Valid),
            Some(_) => Ok(SnapshotValidity::HashMismatch),
            None => Ok(SnapshotValidity::Valid),
        }
    }
}
