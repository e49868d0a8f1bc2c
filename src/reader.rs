use crate::error::Result;
use crate::journal::{JournalReader, WaitResult};
use crate::state::RegistryState;
use crate::view::RegistryView;
use std::path::Path;
use std::time::Duration;

/// A read-only follower of a registry directory.
///
/// Takes no lock and never writes, so any number of readers can run next to
/// the single [`Registry`](crate::Registry) writer, in this process or
/// another one.
///
/// ```no_run
/// use seminarfold::{RegistryReader, WaitResult};
/// use std::time::Duration;
///
/// let mut reader = RegistryReader::open("/var/lib/seminar")?;
/// loop {
///     let state = reader.refresh()?;
///     println!("{} programs scheduled", state.programs.len());
///     if reader.wait_for_change(Duration::from_secs(30))? == WaitResult::Timeout {
///         break;
///     }
/// }
/// # Ok::<(), seminarfold::Error>(())
/// ```
#[derive(Debug)]
pub struct RegistryReader {
    journal: JournalReader,
    view: RegistryView,
}

impl RegistryReader {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let mut reader = Self::from_journal(JournalReader::new(dir));
        reader.refresh()?;
        Ok(reader)
    }

    pub(crate) fn from_journal(journal: JournalReader) -> Self {
        let view = RegistryView::new(journal.dir(), false);
        RegistryReader { journal, view }
    }

    /// Fold whatever the writer committed since the last refresh.
    pub fn refresh(&mut self) -> Result<&RegistryState> {
        self.view.refresh(&self.journal)
    }

    /// The state as of the last refresh. No I/O.
    pub fn state(&self) -> &RegistryState {
        self.view.state()
    }

    /// Block until the writer commits or rotates, or `timeout` elapses.
    /// Call [`refresh`](Self::refresh) afterwards to see the change.
    pub fn wait_for_change(&self, timeout: Duration) -> Result<WaitResult> {
        self.journal.wait_for_append(self.view.offset(), timeout)
    }
}
