// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! In-memory table backend for tests.
//!
//! Keeps tables in a map, records every write, and can be told to fail or
//! hang the next few calls against a table or row.

use crate::table::{FieldValue, Reference, Row, RowId, RowPage, TableBackend, TableId, TransportError};

use std::{
    collections::{HashMap, VecDeque},
    future::pending,
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub(crate) struct MemoryBackend {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<TableId, MemoryTable>,
    list_failures: HashMap<TableId, VecDeque<TransportError>>,
    write_failures: HashMap<RowId, VecDeque<TransportError>>,
    list_hangs: HashMap<TableId, usize>,
    write_hangs: HashMap<RowId, usize>,
    list_calls: HashMap<TableId, usize>,
    write_calls: HashMap<RowId, usize>,
    writes: Vec<RecordedWrite>,
    cancel_on_write: Option<CancellationToken>,
}

#[derive(Debug, Default)]
struct MemoryTable {
    primary: String,
    rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordedWrite {
    pub(crate) table: TableId,
    pub(crate) row: RowId,
    pub(crate) field: String,
    pub(crate) reference: Reference,
}

impl MemoryBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_table(self, table: TableId, primary: &str, rows: Vec<Row>) -> Self {
        self.state.lock().unwrap().tables.insert(
            table,
            MemoryTable {
                primary: primary.into(),
                rows,
            },
        );
        self
    }

    pub(crate) fn fail_list(&self, table: TableId, errors: impl IntoIterator<Item = TransportError>) {
        self.state
            .lock()
            .unwrap()
            .list_failures
            .entry(table)
            .or_default()
            .extend(errors);
    }

    pub(crate) fn fail_write(&self, row: RowId, errors: impl IntoIterator<Item = TransportError>) {
        self.state
            .lock()
            .unwrap()
            .write_failures
            .entry(row)
            .or_default()
            .extend(errors);
    }

    /// Make the next `count` list calls against `table` never complete.
    pub(crate) fn hang_list(&self, table: TableId, count: usize) {
        *self.state.lock().unwrap().list_hangs.entry(table).or_default() += count;
    }

    /// Make the next `count` write calls against `row` never complete.
    pub(crate) fn hang_write(&self, row: RowId, count: usize) {
        *self.state.lock().unwrap().write_hangs.entry(row).or_default() += count;
    }

    /// Cancel `token` once any write goes through.
    pub(crate) fn cancel_on_write(&self, token: CancellationToken) {
        self.state.lock().unwrap().cancel_on_write = Some(token);
    }

    pub(crate) fn write_calls(&self, row: RowId) -> usize {
        self.state
            .lock()
            .unwrap()
            .write_calls
            .get(&row)
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn list_calls(&self, table: TableId) -> usize {
        self.state
            .lock()
            .unwrap()
            .list_calls
            .get(&table)
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn writes(&self) -> Vec<RecordedWrite> {
        self.state.lock().unwrap().writes.clone()
    }

    pub(crate) fn rows(&self, table: TableId) -> Vec<Row> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(&table)
            .map(|table| table.rows.clone())
            .unwrap_or_default()
    }
}

fn take_hang<K>(hangs: &mut HashMap<K, usize>, key: K) -> bool
where
    K: std::hash::Hash + Eq,
{
    match hangs.get_mut(&key) {
        Some(count) if *count > 0 => {
            *count -= 1;
            true
        }
        _ => false,
    }
}

fn status(status: u16, body: &str) -> TransportError {
    TransportError::Status {
        status,
        body: body.into(),
    }
}

impl TableBackend for MemoryBackend {
    async fn list_rows(
        &self,
        table: TableId,
        page: u32,
        size: u32,
    ) -> Result<RowPage, TransportError> {
        let hang = take_hang(&mut self.state.lock().unwrap().list_hangs, table);
        if hang {
            pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        *state.list_calls.entry(table).or_default() += 1;
        if let Some(error) = state.list_failures.get_mut(&table).and_then(VecDeque::pop_front) {
            return Err(error);
        }

        let table = state
            .tables
            .get(&table)
            .ok_or_else(|| status(404, "table does not exist"))?;
        let skip = (page.saturating_sub(1) as usize) * size as usize;
        let rows = table
            .rows
            .iter()
            .skip(skip)
            .take(size as usize)
            .cloned()
            .collect::<Vec<_>>();
        let has_more = skip + rows.len() < table.rows.len();

        Ok(RowPage { rows, has_more })
    }

    async fn update_row_field(
        &self,
        table: TableId,
        row: RowId,
        field: &str,
        reference: &Reference,
    ) -> Result<(), TransportError> {
        let hang = take_hang(&mut self.state.lock().unwrap().write_hangs, row);
        if hang {
            pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        *state.write_calls.entry(row).or_default() += 1;
        if let Some(error) = state.write_failures.get_mut(&row).and_then(VecDeque::pop_front) {
            return Err(error);
        }

        let target = state
            .tables
            .get_mut(&table)
            .ok_or_else(|| status(404, "table does not exist"))?
            .rows
            .iter_mut()
            .find(|candidate| candidate.id == row)
            .ok_or_else(|| status(404, "row does not exist"))?;
        let slot = target
            .fields
            .get_mut(field)
            .ok_or_else(|| status(400, "field does not exist"))?;
        *slot = match reference {
            Reference::RowId(id) => FieldValue::Number(id.get() as f64),
            Reference::Value(value) => value.clone(),
        };

        state.writes.push(RecordedWrite {
            table,
            row,
            field: field.into(),
            reference: reference.clone(),
        });
        if let Some(token) = &state.cancel_on_write {
            token.cancel();
        }

        Ok(())
    }

    async fn primary_field(&self, table: TableId) -> Result<String, TransportError> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(&table)
            .map(|table| table.primary.clone())
            .ok_or_else(|| status(404, "table does not exist"))
    }
}
