//! The writer: owns the journal lock and runs every command.

mod builder;
mod directory;
mod programs;

pub use builder::RegistryBuilder;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::event::Record;
use crate::journal::{Journal, JournalReader};
use crate::reader::RegistryReader;
use crate::reconcile::Transaction;
use crate::state::RegistryState;
use crate::view::RegistryView;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

/// A seminar's registration data, opened for writing.
///
/// Every command validates against the current state, stages its changes
/// together with the reconciliation they trigger, and commits them as one
/// journal record. A failed command writes nothing.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use seminarfold::{BlockDraft, MandatoryType, PaymentStatus, Registry};
///
/// let dir = tempfile::tempdir()?;
/// let mut registry = Registry::open(dir.path())?;
///
/// let role = registry.create_role("attendee", true)?;
/// let subevent = registry.create_subevent("weekend")?;
/// let user = registry.create_user("Jana Nováková")?;
/// registry.set_user_roles(user, [role])?;
/// registry.set_user_approved(user, true)?;
/// registry.apply_for_subevent(user, subevent, PaymentStatus::Paid)?;
///
/// let block = registry.create_block(
///     BlockDraft::new("Opening", subevent).with_mandatory(MandatoryType::AutoRegistered),
/// )?;
/// let program = registry.create_program(block, None, Utc.with_ymd_and_hms(2020, 1, 1, 8, 0, 0).unwrap())?;
///
/// assert!(registry.state().find_application(user, program).is_some());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Registry {
    journal: Journal,
    view: RegistryView,
    clock: Arc<dyn Clock>,
    actor: Option<String>,
    max_journal_size: Option<u64>,
    snapshot_every: u64,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("dir", &self.journal.reader().dir())
            .field("view", &self.view)
            .field("actor", &self.actor)
            .field("max_journal_size", &self.max_journal_size)
            .finish()
    }
}

impl Registry {
    /// Open or create a registry in `dir` with default options.
    ///
    /// # Errors
    ///
    /// [`Error::Locked`] if another writer has the registry open.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::builder(dir).open()
    }

    pub fn builder(dir: impl AsRef<Path>) -> RegistryBuilder {
        RegistryBuilder::new(dir)
    }

    /// The current state. No I/O.
    pub fn state(&self) -> &RegistryState {
        self.view.state()
    }

    pub fn dir(&self) -> &Path {
        self.journal.reader().dir()
    }

    pub fn journal_reader(&self) -> &JournalReader {
        self.journal.reader()
    }

    /// Open a read-only follower of this registry.
    pub fn reader(&self) -> RegistryReader {
        RegistryReader::from_journal(self.journal.reader().clone())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Attribute subsequent records to `actor`.
    pub fn set_actor(&mut self, actor: Option<String>) {
        self.actor = actor;
    }

    /// Write the snapshot now.
    pub fn checkpoint(&mut self) -> Result<()> {
        self.view.checkpoint()
    }

    /// Compress the active journal into the archive and start a new one.
    pub fn rotate(&mut self) -> Result<()> {
        if self.journal.rotate()? {
            // The journal is already empty; a stale snapshot is detected and
            // rebuilt on the next open.
            if let Err(e) = self.view.reset_offset() {
                log::warn!("failed to write snapshot after rotation: {e}");
            }
            log::info!(
                "rotated journal of {} at seq {}",
                self.dir().display(),
                self.state().last_seq
            );
        }
        Ok(())
    }

    /// Drop the snapshot and fold the whole history again.
    pub fn rebuild(&mut self) -> Result<()> {
        let reader = self.journal.reader().clone();
        self.view.rebuild(&reader)?;
        Ok(())
    }

    fn begin(&self) -> Transaction {
        Transaction::new(self.view.state().clone())
    }

    fn commit(&mut self, tx: Transaction) -> Result<()> {
        if tx.is_empty() {
            return Ok(());
        }

        let seq = tx.seq();
        let (mut state, events) = tx.into_parts();
        let mut record = Record::new(seq, self.clock.now(), events);
        if let Some(actor) = &self.actor {
            record = record.with_actor(actor.clone());
        }

        let appended = self.journal.append(&record)?;
        log::debug!("committed record {seq} ({} events)", record.events.len());

        state.last_seq = seq;
        self.view.advance(state, appended);

        // The record is durable; snapshot and rotation are best-effort now.
        if self.view.unsaved() >= self.snapshot_every {
            if let Err(e) = self.view.checkpoint() {
                log::warn!("failed to write snapshot after seq {seq}: {e}");
            }
        }
        if let Some(max) = self.max_journal_size {
            if let Err(e) = self.rotate_if_larger(max) {
                log::warn!("failed to rotate journal after seq {seq}: {e}");
            }
        }
        Ok(())
    }

    fn rotate_if_larger(&mut self, max: u64) -> Result<()> {
        if self.journal.reader().active_size()? >= max {
            self.rotate()?;
        }
        Ok(())
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        if self.view.unsaved() > 0 {
            if let Err(e) = self.view.checkpoint() {
                log::warn!("failed to write snapshot on close: {e}");
            }
        }
    }
}

fn require_name(kind: &'static str, name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid(kind, "name must not be empty"));
    }
    Ok(name.to_string())
}
