// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Row matching.
//!
//! Joins source rows to target rows by comparing one field on each side.
//!
//! # Normalization
//!
//! Values are normalized into a [`MatchKey`] before comparison:
//!
//! - Text is trimmed. Case matters unless [`MatchOptions::ignore_case`] is set.
//! - Numbers, and text written as a plain decimal number, compare by exact
//!   decimal value. Thus, `"10"`, `" 10.0 "`, and `10` are all the same key,
//!   but `"9007199254740993"` and `"9007199254740992"` stay apart even though
//!   both round to the same `f64`.
//! - Booleans only equal booleans.
//! - Null and blank text produce no key at all. Rows without a key are never
//!   indexed, and are always unmatched, so two empty values never match each
//!   other.

use crate::table::{FieldValue, Row, RowId};

use serde::Serialize;
use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
};
use tracing::debug;

/// Outcome of matching a single source row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchResult {
    /// Exactly one target row shares the match value.
    Matched(RowId),

    /// No target row shares the match value, or the source value is blank.
    Unmatched,

    /// More than one target row shares the match value.
    Ambiguous(Vec<RowId>),
}

/// Knobs for value comparison.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    /// Compare text without regard to case.
    pub ignore_case: bool,
}

/// Normalized value used for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchKey {
    Text(String),
    Number(Decimal),
    Bool(bool),
}

impl MatchKey {
    /// Normalize field value into match key.
    ///
    /// Returns `None` for blank values.
    pub fn normalize(value: &FieldValue, options: MatchOptions) -> Option<Self> {
        match value {
            FieldValue::Null => None,
            FieldValue::Bool(value) => Some(Self::Bool(*value)),
            FieldValue::Number(value) => Self::number(*value),
            FieldValue::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return None;
                }

                if let Some(number) = Decimal::parse(text) {
                    return Some(Self::Number(number));
                }

                if options.ignore_case {
                    Some(Self::Text(text.to_lowercase()))
                } else {
                    Some(Self::Text(text.to_owned()))
                }
            }
        }
    }

    fn number(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }

        // INVARIANT: Display of a finite f64 is its shortest round-trip decimal
        // form and never uses exponent notation.
        Decimal::parse(&value.to_string()).map(Self::Number)
    }
}

/// Exact decimal number `digits * 10^exponent`.
///
/// Kept in canonical form, so two decimals are equal exactly when their values
/// are: `digits` has no leading or trailing zeros, and zero has no digits and
/// no sign.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    negative: bool,
    digits: String,
    exponent: i64,
}

impl Decimal {
    /// Parse plain decimal notation, e.g., `-12.50` or `1.5e3`.
    ///
    /// Returns `None` for anything else, including `inf` and `NaN`.
    pub fn parse(text: &str) -> Option<Self> {
        let (negative, rest) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };

        let (mantissa, exponent) = match rest.split_once(['e', 'E']) {
            Some((mantissa, exponent)) => (mantissa, exponent.parse::<i64>().ok()?),
            None => (rest, 0),
        };
        let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return None;
        }

        let digits = format!("{whole}{fraction}");
        let digits = digits.trim_start_matches('0');
        let significant = digits.trim_end_matches('0');
        if significant.is_empty() {
            return Some(Self::zero());
        }

        let exponent = exponent
            .checked_sub(i64::try_from(fraction.len()).ok()?)?
            .checked_add(i64::try_from(digits.len() - significant.len()).ok()?)?;

        Some(Self {
            negative,
            digits: significant.into(),
            exponent,
        })
    }

    fn zero() -> Self {
        Self {
            negative: false,
            digits: String::new(),
            exponent: 0,
        }
    }
}

/// Index of target rows by normalized match value.
#[derive(Debug, Default)]
pub struct TargetIndex {
    entries: HashMap<MatchKey, Vec<RowId>>,
}

impl TargetIndex {
    /// Index target rows by value of target field.
    ///
    /// Rows whose value is blank are left out. Identifiers of rows sharing a
    /// key keep the order of `rows`.
    pub fn build<'r>(
        rows: impl IntoIterator<Item = &'r Row>,
        field: &str,
        options: MatchOptions,
    ) -> Self {
        let mut entries: HashMap<MatchKey, Vec<RowId>> = HashMap::new();
        for row in rows {
            match row.get(field).and_then(|value| MatchKey::normalize(value, options)) {
                Some(key) => entries.entry(key).or_default().push(row.id),
                None => debug!("target row {} has blank {field:?}, not indexed", row.id),
            }
        }

        Self { entries }
    }

    /// Determine match result for a source value.
    pub fn lookup(&self, value: &FieldValue, options: MatchOptions) -> MatchResult {
        let Some(key) = MatchKey::normalize(value, options) else {
            return MatchResult::Unmatched;
        };

        match self.entries.get(&key).map(Vec::as_slice) {
            None | Some([]) => MatchResult::Unmatched,
            Some([target]) => MatchResult::Matched(*target),
            Some(targets) => MatchResult::Ambiguous(targets.to_vec()),
        }
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Match every source row against target rows.
///
/// Results keep the order of `source`, so matching the same input twice
/// yields the same output.
///
/// # Errors
///
/// - Return [`MatchError::MissingField`] if a source row lacks
///   `source_field`, or a target row lacks `target_field`.
pub fn match_rows(
    source: &[Row],
    target: &[Row],
    source_field: &str,
    target_field: &str,
    options: MatchOptions,
) -> Result<Vec<(RowId, MatchResult)>> {
    require_field(source, source_field, Side::Source)?;
    require_field(target, target_field, Side::Target)?;

    let index = TargetIndex::build(target, target_field, options);
    debug!(
        "indexed {} distinct {target_field:?} value(s) from {} target row(s)",
        index.len(),
        target.len()
    );

    Ok(source
        .iter()
        .map(|row| {
            let result = row
                .get(source_field)
                .map(|value| index.lookup(value, options))
                .unwrap_or(MatchResult::Unmatched);
            (row.id, result)
        })
        .collect())
}

/// Ensure every row carries a field.
///
/// # Errors
///
/// - Return [`MatchError::MissingField`] for the first row lacking `field`.
pub fn require_field(rows: &[Row], field: &str, side: Side) -> Result<()> {
    match rows.iter().find(|row| row.get(field).is_none()) {
        Some(row) => Err(MatchError::MissingField {
            side,
            row: row.id,
            field: field.into(),
        }),
        None => Ok(()),
    }
}

/// Which table of a link configuration a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

impl Display for Side {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Source => fmt.write_str("source"),
            Self::Target => fmt.write_str("target"),
        }
    }
}

/// Matching error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// Row does not have a field the link configuration names.
    #[error("{side} row {row} has no field {field:?}")]
    MissingField {
        side: Side,
        row: RowId,
        field: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = MatchError> = std::result::Result<T, E>;
