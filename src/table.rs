// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote table representation.
//!
//! Record linking happens between __tables__ owned by a remote no-code
//! database. A table is a flat list of __rows__, where each row carries an
//! identifier assigned by the remote side and a mapping of field names to
//! field values.
//!
//! # Field Values
//!
//! The remote side knows many field types: text, numbers, booleans, dates,
//! single select options, link row lists, and so on. Record linking only needs
//! to compare and copy values, so every value is folded into one of four
//! variants of [`FieldValue`] when it enters the crate. How that folding is
//! done is up to the [`TableBackend`] that talked to the remote side.
//!
//! # Backends
//!
//! A [`TableBackend`] is the raw transport: list one page of rows, patch one
//! field of one row, ask for the primary field of a table. It makes exactly one
//! attempt per call. Retries, timeouts, and pagination are layered on top by
//! [`TableClient`](crate::table::client::TableClient).
//!
//! # See Also
//!
//! 1. [`client`](crate::table::client)
//! 2. [`baserow`](crate::table::baserow)

pub mod baserow;
pub mod client;

#[cfg(test)]
pub(crate) mod memory;

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    future::Future,
    time::Duration,
};

/// Identifier of a remote table.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct TableId(u64);

impl TableId {
    /// Construct new table identifier.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw numeric identifier.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for TableId {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}", self.0)
    }
}

/// Identifier of a row inside a remote table.
///
/// Owned by the remote table, and never changes during a run.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct RowId(u64);

impl RowId {
    /// Construct new row identifier.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw numeric identifier.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for RowId {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}", self.0)
    }
}

/// Value of a single field.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Check if value carries nothing worth matching or keeping.
    ///
    /// Null and whitespace-only text are blank. Numbers and booleans never are.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.trim().is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Null => fmt.write_str(""),
            Self::Bool(value) => write!(fmt, "{value}"),
            Self::Number(value) => write!(fmt, "{value}"),
            Self::Text(value) => fmt.write_str(value),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.into())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A row fetched from a remote table.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Row {
    pub id: RowId,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Row {
    /// Construct new row without any fields.
    pub fn new(id: RowId) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    /// Attach field to row.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Lookup value of target field.
    ///
    /// Returns `None` if the row does not have the field at all, which is not
    /// the same as having it set to [`FieldValue::Null`].
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }
}

/// Value written into a reference field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reference {
    /// Point at a row by its identifier.
    RowId(RowId),

    /// Copy a plain value, e.g., the primary field of the referenced row.
    Value(FieldValue),
}

impl Display for Reference {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::RowId(id) => write!(fmt, "row {id}"),
            Self::Value(value) => write!(fmt, "{value:?}"),
        }
    }
}

/// One page of rows.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RowPage {
    pub rows: Vec<Row>,

    /// Remote side reported more pages after this one.
    pub has_more: bool,
}

/// Raw access to remote tables.
///
/// Each call is exactly one request. Page numbers start at 1.
pub trait TableBackend: Send + Sync {
    /// List one page of rows of a table.
    fn list_rows(
        &self,
        table: TableId,
        page: u32,
        size: u32,
    ) -> impl Future<Output = Result<RowPage, TransportError>> + Send;

    /// Overwrite one field of one row.
    fn update_row_field(
        &self,
        table: TableId,
        row: RowId,
        field: &str,
        reference: &Reference,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Name of the primary field of a table.
    fn primary_field(
        &self,
        table: TableId,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;
}

/// Failure of a single backend call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Remote side answered with a non-success status.
    #[error("remote responded with status {status}: {body}")]
    Status { status: u16, body: String },

    /// Call did not complete in time.
    #[error("request timed out after {after:?}")]
    Timeout { after: Duration },

    /// Request could not be sent or its response could not be read.
    #[error(transparent)]
    Network(#[from] reqwest::Error),

    /// Remote side answered with a payload we do not understand.
    #[error("unexpected response payload: {0}")]
    Malformed(String),

    /// Backend could not be set up.
    #[error("failed to set up table backend: {0}")]
    Setup(String),
}

impl TransportError {
    /// Check if error is worth another attempt.
    ///
    /// Server errors, rate limiting, timeouts, and connection trouble are
    /// transient. Everything the remote side rejected on purpose is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Timeout { .. } => true,
            Self::Network(error) => {
                error.is_timeout() || error.is_connect() || error.is_request()
            }
            Self::Malformed(_) | Self::Setup(_) => false,
        }
    }
}
