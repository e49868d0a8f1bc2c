pub mod clock;
mod eligibility;
mod error;
mod event;
mod journal;
mod model;
mod queries;
mod reader;
mod reconcile;
mod registry;
pub mod settings;
pub mod snapshot;
mod state;
mod view;

pub use error::{Error, Result};
pub use event::{Record, RegistryEvent};
pub use journal::{line_hash, Appended, JournalReader, LockMode, WaitResult};
pub use model::{
    Block, BlockDraft, BlockId, Category, CategoryId, MandatoryType, PaymentStatus, Program,
    ProgramApplication, ProgramId, Registration, Role, RoleId, Subevent, SubeventId, User, UserId,
};
pub use reader::RegistryReader;
pub use registry::{Registry, RegistryBuilder};
pub use snapshot::Snapshot;
pub use state::{reduce, RegistryState};
pub use view::RegistryView;
