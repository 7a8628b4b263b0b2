// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Record linking between tables.
//!
//! A __link configuration__ is a named rule that says how rows of a source
//! table relate to rows of a target table. Rows relate when the value of the
//! source match field equals the value of the target match field. Every
//! source row that relates to exactly one target row gets a reference to that
//! target row written into its reference field.
//!
//! # Ambiguity
//!
//! When a source value equals the match value of more than one target row,
//! the source row is __ambiguous__. Ambiguous rows are reported, never
//! written. Picking one of the candidates would silently link the wrong row
//! half of the time, and nobody would notice until much later.
//!
//! # Flow Of A Run
//!
//! 1. [`loader`] reads every link configuration from the configuration table.
//! 2. [`runner`] walks them in order. Inactive ones are skipped.
//! 3. For each active one, the source and target tables are fetched in full,
//!    joined by [`matcher`], and every unambiguous match is written back.
//! 4. Outcomes are collected into a [`report::RunReport`].

pub mod loader;
pub mod matcher;
pub mod report;
pub mod runner;

use crate::table::TableId;

use serde::Serialize;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// A named rule describing how to link rows between two tables.
///
/// Read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkConfig {
    /// Identifier of configuration, unique within a run.
    pub name: String,

    /// Table whose rows receive references.
    pub source_table_id: TableId,

    /// Table whose rows are referenced.
    pub target_table_id: TableId,

    /// Inactive configurations are skipped entirely.
    pub active: bool,

    /// Field of source table compared against target table.
    pub source_match_field: String,

    /// Field of target table compared against source table.
    pub target_match_field: String,

    /// Field of source table that receives the reference.
    pub source_reference_field: String,

    /// What to write into the reference field.
    pub reference_mode: ReferenceMode,
}

/// What a reference field receives for a matched target row.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceMode {
    /// Identifier of the matched target row.
    #[default]
    RowId,

    /// Value of the primary field of the matched target row.
    PrimaryField,
}

impl FromStr for ReferenceMode {
    type Err = UnknownReferenceMode;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let normalized = data
            .trim()
            .to_lowercase()
            .replace(['-', '_'], " ");

        match normalized.as_str() {
            "row id" | "id" => Ok(Self::RowId),
            "primary field" | "primary" => Ok(Self::PrimaryField),
            _ => Err(UnknownReferenceMode(data.into())),
        }
    }
}

impl Display for ReferenceMode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::RowId => fmt.write_str("row id"),
            Self::PrimaryField => fmt.write_str("primary field"),
        }
    }
}

/// Reference mode cannot be recognized.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown reference mode {0:?}, expected \"row id\" or \"primary field\"")]
pub struct UnknownReferenceMode(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case("row id", ReferenceMode::RowId; "words")]
    #[test_case("Row-ID", ReferenceMode::RowId; "kebab case")]
    #[test_case("id", ReferenceMode::RowId; "short")]
    #[test_case(" primary field ", ReferenceMode::PrimaryField; "padded")]
    #[test_case("primary_field", ReferenceMode::PrimaryField; "snake case")]
    #[test]
    fn parse_reference_mode(data: &str, expect: ReferenceMode) -> Result<(), UnknownReferenceMode> {
        assert_eq!(data.parse::<ReferenceMode>()?, expect);
        Ok(())
    }

    #[test]
    fn parse_unknown_reference_mode() {
        assert_eq!(
            "whatever".parse::<ReferenceMode>(),
            Err(UnknownReferenceMode("whatever".into()))
        );
    }
}
