#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Offense description presets.
//!
//! Austin PD reports carry a free-text `highest_offense_description` column.
//! The presets here name the subsets of that column that are forecast on
//! their own (all crime, violent crime, murder).

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Offense descriptions counted as violent crime.
pub const VIOLENT_OFFENSES: &[&str] = &[
    "AGG ASSAULT",
    "AGG ROBBERY/DEADLY WEAPON",
    "CAPITAL MURDER",
    "MURDER",
    "RAPE",
];

/// Offense descriptions counted as murder.
pub const MURDER_OFFENSES: &[&str] = &["MURDER", "CAPITAL MURDER"];

/// A named subset of offense descriptions.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OffensePreset {
    /// Every reported incident, regardless of offense.
    #[default]
    All,
    /// Aggravated assault, aggravated robbery, murder and rape.
    Violent,
    /// Murder and capital murder.
    Murder,
}

impl OffensePreset {
    /// All presets, in menu order.
    pub const ALL: &[Self] = &[Self::All, Self::Violent, Self::Murder];

    /// Returns the offense descriptions in this preset, or `None` when the
    /// preset accepts every offense.
    #[must_use]
    pub const fn descriptions(self) -> Option<&'static [&'static str]> {
        match self {
            Self::All => None,
            Self::Violent => Some(VIOLENT_OFFENSES),
            Self::Murder => Some(MURDER_OFFENSES),
        }
    }

    /// Returns `true` if an incident with this offense description belongs
    /// to the preset. Comparison ignores ASCII case and surrounding
    /// whitespace.
    #[must_use]
    pub fn matches(self, description: &str) -> bool {
        let description = description.trim();
        self.descriptions().is_none_or(|known| {
            known
                .iter()
                .any(|offense| offense.eq_ignore_ascii_case(description))
        })
    }

    /// Human-readable label for menus and log lines.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::All => "All crime",
            Self::Violent => "Violent crime",
            Self::Murder => "Murder",
        }
    }
}
