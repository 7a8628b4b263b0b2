// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Link configuration loading.
//!
//! Link configurations live in a regular Baserow table, one configuration per
//! row, so that the people who own the data can also own the linking rules.
//!
//! # Configuration Table Layout
//!
//! | Column                         | Required | Meaning                              |
//! |--------------------------------|----------|--------------------------------------|
//! | `Name`                         | no       | Unique name, defaults to `link-<id>` |
//! | `Active`                       | yes      | Boolean, inactive rows are skipped   |
//! | `Source Table ID`              | yes      | Table receiving references           |
//! | `Target Table ID`              | yes      | Table being referenced               |
//! | `Source Table Match Field`     | yes      | Source field to compare              |
//! | `Target Table Match Field`     | yes      | Target field to compare              |
//! | `Source Table Reference Field` | yes      | Source field to write                |
//! | `Reference Value`              | no       | `row id` (default) or `primary field`|
//!
//! Configurations come back in row order of the configuration table, which
//! is also the order they are processed in.
//!
//! # Bad Rows
//!
//! `Active` is read first. A row switched off is taken as a draft, and none of
//! its other columns are looked at. An active row that does not describe a
//! valid link configuration becomes a [`ConfigEntry::Malformed`] entry, so one
//! bad row never keeps the other rows from running. Only an unreadable
//! configuration table fails the load as a whole.

use crate::{
    link::{LinkConfig, ReferenceMode},
    table::{
        client::{TableClient, TableError},
        FieldValue, Row, RowId, TableBackend, TableId,
    },
};

use futures::TryStreamExt;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

pub const NAME_COLUMN: &str = "Name";
pub const ACTIVE_COLUMN: &str = "Active";
pub const SOURCE_TABLE_COLUMN: &str = "Source Table ID";
pub const TARGET_TABLE_COLUMN: &str = "Target Table ID";
pub const SOURCE_MATCH_COLUMN: &str = "Source Table Match Field";
pub const TARGET_MATCH_COLUMN: &str = "Target Table Match Field";
pub const SOURCE_REFERENCE_COLUMN: &str = "Source Table Reference Field";
pub const REFERENCE_VALUE_COLUMN: &str = "Reference Value";

/// Loads link configurations from the configuration table.
#[derive(Debug)]
pub struct ConfigLoader<'c, B>
where
    B: TableBackend,
{
    client: &'c TableClient<B>,
    table: TableId,
}

impl<'c, B> ConfigLoader<'c, B>
where
    B: TableBackend,
{
    /// Construct new configuration loader.
    pub fn new(client: &'c TableClient<B>, table: TableId) -> Self {
        Self { client, table }
    }

    /// Load every configuration row in table order.
    ///
    /// # Errors
    ///
    /// - Return [`LoadError::Unavailable`] if configuration table cannot be
    ///   read.
    #[instrument(skip(self), fields(table = %self.table), level = "debug")]
    pub async fn load_configs(&self) -> Result<Vec<ConfigEntry>> {
        let rows: Vec<Row> = self
            .client
            .fetch_all_rows(self.table)
            .try_collect()
            .await
            .map_err(|source| LoadError::Unavailable {
                table: self.table,
                source,
            })?;

        let entries = parse_entries(&rows);
        for entry in &entries {
            if let ConfigEntry::Malformed { row, name, error } = entry {
                warn!("configuration row {row} ({name:?}) is malformed: {error}");
            }
        }
        info!(
            "loaded {} link configuration(s) from table {}",
            entries.len(),
            self.table
        );

        Ok(entries)
    }
}

/// One row of the configuration table.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigEntry {
    /// Active row describing a valid link configuration.
    Ready(LinkConfig),

    /// Row switched off.
    Inactive { name: String },

    /// Row that should run but does not describe a valid link configuration.
    Malformed {
        row: RowId,
        name: String,
        error: ColumnError,
    },
}

impl ConfigEntry {
    /// Name of configuration, unique among rows that run.
    pub fn name(&self) -> &str {
        match self {
            Self::Ready(config) => &config.name,
            Self::Inactive { name } | Self::Malformed { name, .. } => name,
        }
    }
}

impl From<LinkConfig> for ConfigEntry {
    fn from(config: LinkConfig) -> Self {
        if config.active {
            Self::Ready(config)
        } else {
            Self::Inactive { name: config.name }
        }
    }
}

/// Parse configuration rows.
///
/// An active row reusing the name of an earlier row is malformed.
pub fn parse_entries(rows: &[Row]) -> Vec<ConfigEntry> {
    let mut names = HashSet::new();
    rows.iter()
        .map(|row| {
            let entry = parse_entry(row);
            let fresh = names.insert(entry.name().to_owned());
            match entry {
                ConfigEntry::Ready(config) if !fresh => ConfigEntry::Malformed {
                    row: row.id,
                    error: ColumnError::DuplicateName(config.name.clone()),
                    name: config.name,
                },
                entry => entry,
            }
        })
        .collect()
}

/// Parse one configuration row, looking at `Active` before anything else.
pub fn parse_entry(row: &Row) -> ConfigEntry {
    let name = row_name(row);
    match active(row, ACTIVE_COLUMN) {
        Ok(false) => ConfigEntry::Inactive { name },
        Ok(true) => match parse_columns(row) {
            Ok(config) => ConfigEntry::Ready(config),
            Err(error) => ConfigEntry::Malformed {
                row: row.id,
                name,
                error,
            },
        },
        Err(error) => ConfigEntry::Malformed {
            row: row.id,
            name,
            error,
        },
    }
}

/// Parse every column of one configuration row, active or not.
///
/// # Errors
///
/// - Return [`LoadError::Malformed`] if a required column is absent, or a
///   column holds a value of the wrong kind.
pub fn parse_config(row: &Row) -> Result<LinkConfig> {
    parse_columns(row).map_err(|source| LoadError::Malformed {
        row: row.id,
        source,
    })
}

fn row_name(row: &Row) -> String {
    match row.get(NAME_COLUMN) {
        Some(value) if !value.is_blank() => value.to_string().trim().to_owned(),
        _ => format!("link-{}", row.id),
    }
}

fn parse_columns(row: &Row) -> Result<LinkConfig, ColumnError> {
    let name = row_name(row);

    let reference_mode = match row.get(REFERENCE_VALUE_COLUMN) {
        Some(FieldValue::Text(text)) if !text.trim().is_empty() => text.parse::<ReferenceMode>()?,
        Some(value) if !value.is_blank() => {
            return Err(ColumnError::NotText {
                column: REFERENCE_VALUE_COLUMN,
                value: value.clone(),
            })
        }
        _ => ReferenceMode::default(),
    };

    Ok(LinkConfig {
        name,
        source_table_id: table_id(row, SOURCE_TABLE_COLUMN)?,
        target_table_id: table_id(row, TARGET_TABLE_COLUMN)?,
        active: active(row, ACTIVE_COLUMN)?,
        source_match_field: field_name(row, SOURCE_MATCH_COLUMN)?,
        target_match_field: field_name(row, TARGET_MATCH_COLUMN)?,
        source_reference_field: field_name(row, SOURCE_REFERENCE_COLUMN)?,
        reference_mode,
    })
}

fn column<'r>(row: &'r Row, column: &'static str) -> Result<&'r FieldValue, ColumnError> {
    row.get(column).ok_or(ColumnError::Missing(column))
}

fn table_id(row: &Row, name: &'static str) -> Result<TableId, ColumnError> {
    let value = column(row, name)?;
    let id = match value {
        FieldValue::Number(number) if *number >= 0.0 && number.fract() == 0.0 => {
            Some(*number as u64)
        }
        FieldValue::Text(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };

    id.map(TableId::new).ok_or_else(|| ColumnError::NotInteger {
        column: name,
        value: value.clone(),
    })
}

fn active(row: &Row, name: &'static str) -> Result<bool, ColumnError> {
    let value = column(row, name)?;
    let active = match value {
        FieldValue::Null => Some(false),
        FieldValue::Bool(flag) => Some(*flag),
        FieldValue::Number(number) if *number == 1.0 => Some(true),
        FieldValue::Number(number) if *number == 0.0 => Some(false),
        FieldValue::Text(text) => match text.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" | "" => Some(false),
            _ => None,
        },
        FieldValue::Number(_) => None,
    };

    active.ok_or_else(|| ColumnError::NotBoolean {
        column: name,
        value: value.clone(),
    })
}

fn field_name(row: &Row, name: &'static str) -> Result<String, ColumnError> {
    match column(row, name)? {
        FieldValue::Text(text) if !text.trim().is_empty() => Ok(text.trim().to_owned()),
        FieldValue::Null | FieldValue::Text(_) => Err(ColumnError::Empty(name)),
        value => Err(ColumnError::NotText {
            column: name,
            value: value.clone(),
        }),
    }
}

/// Configuration loading error types.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Configuration table cannot be read.
    #[error("configuration table {table} is unavailable")]
    Unavailable {
        table: TableId,
        #[source]
        source: TableError,
    },

    /// Configuration row does not describe a valid link configuration.
    #[error("configuration row {row} is malformed")]
    Malformed {
        row: RowId,
        #[source]
        source: ColumnError,
    },
}

/// Problems with a single column of a configuration row.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ColumnError {
    /// Required column does not exist.
    #[error("missing column {0:?}")]
    Missing(&'static str),

    /// Required column has no value.
    #[error("column {0:?} is empty")]
    Empty(&'static str),

    /// Column should hold a non-negative integer.
    #[error("column {column:?} should be a table id, found {value:?}")]
    NotInteger {
        column: &'static str,
        value: FieldValue,
    },

    /// Column should hold something boolean-coercible.
    #[error("column {column:?} should be a boolean, found {value:?}")]
    NotBoolean {
        column: &'static str,
        value: FieldValue,
    },

    /// Column should hold text.
    #[error("column {column:?} should be text, found {value:?}")]
    NotText {
        column: &'static str,
        value: FieldValue,
    },

    /// Reference value column holds an unknown mode.
    #[error(transparent)]
    ReferenceMode(#[from] crate::link::UnknownReferenceMode),

    /// Another row already uses this name.
    #[error("name {0:?} is used by more than one configuration")]
    DuplicateName(String),
}

/// Friendly result alias :3
pub type Result<T, E = LoadError> = std::result::Result<T, E>;
