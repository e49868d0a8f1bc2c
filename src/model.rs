//! Entities of the registration domain.
//!
//! Every entity is plain owned data. Entities reference each other by id;
//! the [`RegistryState`](crate::RegistryState) owns them all and resolves
//! the references.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, " #{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Identifies a [`Role`].
    RoleId,
    "role"
);
entity_id!(
    /// Identifies a [`User`].
    UserId,
    "user"
);
entity_id!(
    /// Identifies a [`Subevent`].
    SubeventId,
    "subevent"
);
entity_id!(
    /// Identifies a [`Category`].
    CategoryId,
    "category"
);
entity_id!(
    /// Identifies a [`Block`].
    BlockId,
    "block"
);
entity_id!(
    /// Identifies a [`Program`].
    ProgramId,
    "program"
);

/// A role a user can hold.
///
/// `choose_programs` is the single permission the registry evaluates: only
/// users holding at least one role with it may register to programs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub choose_programs: bool,
}

/// A registrable part of the event. Blocks belong to exactly one subevent,
/// and a user only sees programs of subevents they applied for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subevent {
    pub id: SubeventId,
    pub name: String,
}

/// Payment state of a user's application for a subevent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Paid, or free of charge.
    Paid,
    WaitingForPayment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub approved: bool,
    #[serde(default)]
    pub roles: BTreeSet<RoleId>,
    /// Subevents the user applied for, with the payment state of each.
    #[serde(default)]
    pub subevents: BTreeMap<SubeventId, PaymentStatus>,
}

impl User {
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        User {
            id,
            display_name: display_name.into(),
            approved: false,
            roles: BTreeSet::new(),
            subevents: BTreeMap::new(),
        }
    }
}

/// Groups blocks and restricts them to users holding one of the
/// registerable roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub registerable_roles: BTreeSet<RoleId>,
}

/// How users end up registered to the programs of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MandatoryType {
    /// Users register if they want to.
    #[default]
    Voluntary,
    /// Users are expected to register to one program of the block.
    Mandatory,
    /// Every allowed user is registered by the registry itself.
    AutoRegistered,
}

/// A program template: what is taught, for whom and for how many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    pub subevent: SubeventId,
    pub category: Option<CategoryId>,
    #[serde(default)]
    pub lectors: BTreeSet<UserId>,
    /// Length of every program of the block, in minutes.
    pub duration: u32,
    /// Maximum number of regular attendees per program. `None` is unbounded.
    pub capacity: Option<u32>,
    pub alternates_allowed: bool,
    pub mandatory: MandatoryType,
    #[serde(default)]
    pub perex: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tools: String,
}

/// The editable part of a [`Block`], used to create and update blocks.
///
/// # Examples
///
/// ```
/// use seminarfold::{BlockDraft, MandatoryType, SubeventId};
///
/// let draft = BlockDraft::new("Knots", SubeventId(1))
///     .with_duration(90)
///     .with_capacity(12)
///     .with_alternates(true);
/// assert_eq!(draft.capacity, Some(12));
/// assert_eq!(draft.mandatory, MandatoryType::Voluntary);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDraft {
    pub name: String,
    pub subevent: SubeventId,
    pub category: Option<CategoryId>,
    pub lectors: BTreeSet<UserId>,
    pub duration: u32,
    pub capacity: Option<u32>,
    pub alternates_allowed: bool,
    pub mandatory: MandatoryType,
    pub perex: String,
    pub description: String,
    pub tools: String,
}

impl BlockDraft {
    /// A voluntary, unbounded, hour-long block without category.
    pub fn new(name: impl Into<String>, subevent: SubeventId) -> Self {
        BlockDraft {
            name: name.into(),
            subevent,
            category: None,
            lectors: BTreeSet::new(),
            duration: 60,
            capacity: None,
            alternates_allowed: false,
            mandatory: MandatoryType::Voluntary,
            perex: String::new(),
            description: String::new(),
            tools: String::new(),
        }
    }

    pub fn with_category(mut self, category: CategoryId) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_lector(mut self, lector: UserId) -> Self {
        self.lectors.insert(lector);
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration = minutes;
        self
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_alternates(mut self, allowed: bool) -> Self {
        self.alternates_allowed = allowed;
        self
    }

    pub fn with_mandatory(mut self, mandatory: MandatoryType) -> Self {
        self.mandatory = mandatory;
        self
    }

    pub fn with_texts(
        mut self,
        perex: impl Into<String>,
        description: impl Into<String>,
        tools: impl Into<String>,
    ) -> Self {
        self.perex = perex.into();
        self.description = description.into();
        self.tools = tools.into();
        self
    }

    pub(crate) fn into_block(self, id: BlockId) -> Block {
        Block {
            id,
            name: self.name,
            subevent: self.subevent,
            category: self.category,
            lectors: self.lectors,
            duration: self.duration,
            capacity: self.capacity,
            alternates_allowed: self.alternates_allowed,
            mandatory: self.mandatory,
            perex: self.perex,
            description: self.description,
            tools: self.tools,
        }
    }
}

impl From<&Block> for BlockDraft {
    fn from(block: &Block) -> Self {
        BlockDraft {
            name: block.name.clone(),
            subevent: block.subevent,
            category: block.category,
            lectors: block.lectors.clone(),
            duration: block.duration,
            capacity: block.capacity,
            alternates_allowed: block.alternates_allowed,
            mandatory: block.mandatory,
            perex: block.perex.clone(),
            description: block.description.clone(),
            tools: block.tools.clone(),
        }
    }
}

/// A scheduled run of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub block: BlockId,
    pub room: Option<String>,
    pub start: DateTime<Utc>,
}

impl Program {
    /// End of the program given its block's duration.
    pub fn end(&self, block: &Block) -> DateTime<Utc> {
        self.start + Duration::minutes(i64::from(block.duration))
    }
}

/// A user's registration to a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramApplication {
    pub user: UserId,
    pub program: ProgramId,
    /// Waitlisted: registered after the program was full.
    pub alternate: bool,
    /// Sequence number of the journal record that created the application.
    /// Alternates are promoted in this order.
    pub created_seq: u64,
}

/// How a [`register_program`](crate::Registry::register_program) call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Attendee,
    Alternate,
}
