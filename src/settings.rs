//! Seminar-wide settings that drive program registration.
//!
//! Settings are journaled like every other change; use
//! [`Registry::update_settings`](crate::Registry::update_settings) to
//! modify them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// When users may register to and leave programs themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramRegistrationType {
    #[default]
    NotAllowed,
    Allowed,
    /// Allowed between `register_programs_from` and `register_programs_to`.
    /// A missing bound is open.
    AllowedFromTo,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub seminar_name: String,
    #[serde(default)]
    pub register_programs_type: ProgramRegistrationType,
    #[serde(default)]
    pub register_programs_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub register_programs_to: Option<DateTime<Utc>>,
    /// When unset, only paid subevent applications make their programs
    /// accessible.
    #[serde(default)]
    pub allowed_register_programs_before_payment: bool,
}

impl Settings {
    /// Is program registration open at `now`?
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use seminarfold::settings::{ProgramRegistrationType, Settings};
    ///
    /// let settings = Settings {
    ///     register_programs_type: ProgramRegistrationType::AllowedFromTo,
    ///     register_programs_from: Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()),
    ///     register_programs_to: None,
    ///     ..Settings::default()
    /// };
    /// assert!(settings.is_allowed_register_programs(Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap()));
    /// assert!(!settings.is_allowed_register_programs(Utc.with_ymd_and_hms(2019, 6, 1, 0, 0, 0).unwrap()));
    /// ```
    pub fn is_allowed_register_programs(&self, now: DateTime<Utc>) -> bool {
        match self.register_programs_type {
            ProgramRegistrationType::NotAllowed => false,
            ProgramRegistrationType::Allowed => true,
            ProgramRegistrationType::AllowedFromTo => {
                self.register_programs_from.is_none_or(|from| from <= now)
                    && self.register_programs_to.is_none_or(|to| to >= now)
            }
        }
    }
}
