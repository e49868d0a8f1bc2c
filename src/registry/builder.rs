use super::Registry;
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::journal::{Journal, LockMode};
use crate::view::RegistryView;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_SNAPSHOT_EVERY: u64 = 64;

/// Options for opening a [`Registry`].
///
/// # Examples
///
/// ```
/// use seminarfold::Registry;
///
/// let dir = tempfile::tempdir()?;
/// let registry = Registry::builder(dir.path())
///     .max_journal_size(1 << 20)
///     .snapshot_every(16)
///     .actor("admin")
///     .open()?;
/// assert_eq!(registry.state().last_seq, 0);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct RegistryBuilder {
    dir: PathBuf,
    lock: LockMode,
    max_journal_size: Option<u64>,
    snapshot_every: u64,
    clock: Arc<dyn Clock>,
    actor: Option<String>,
}

impl RegistryBuilder {
    pub(crate) fn new(dir: impl AsRef<Path>) -> Self {
        RegistryBuilder {
            dir: dir.as_ref().to_path_buf(),
            lock: LockMode::Exclusive,
            max_journal_size: None,
            snapshot_every: DEFAULT_SNAPSHOT_EVERY,
            clock: Arc::new(SystemClock),
            actor: None,
        }
    }

    pub fn lock_mode(mut self, lock: LockMode) -> Self {
        self.lock = lock;
        self
    }

    /// Rotate the journal into the archive once it reaches `bytes`.
    pub fn max_journal_size(mut self, bytes: u64) -> Self {
        self.max_journal_size = Some(bytes);
        self
    }

    /// Write the snapshot after this many commits. Values below 1 count as 1.
    pub fn snapshot_every(mut self, records: u64) -> Self {
        self.snapshot_every = records.max(1);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attribute every record to `actor` until changed with
    /// [`Registry::set_actor`].
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Lock the journal and fold it into memory.
    pub fn open(self) -> Result<Registry> {
        let mut journal = Journal::open(&self.dir, self.lock)?;
        let mut view = RegistryView::new(&self.dir, true);
        view.refresh(journal.reader())?;

        let size = journal.reader().active_size()?;
        if size > view.offset() {
            log::warn!(
                "discarding {} bytes of incomplete record at the end of {}",
                size - view.offset(),
                journal.reader().journal_path().display()
            );
            journal.truncate(view.offset())?;
        }

        log::info!(
            "opened registry {} at seq {}",
            self.dir.display(),
            view.state().last_seq
        );

        Ok(Registry {
            journal,
            view,
            clock: self.clock,
            actor: self.actor,
            max_journal_size: self.max_journal_size,
            snapshot_every: self.snapshot_every,
        })
    }
}
