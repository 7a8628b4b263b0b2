// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Resilient table access.
//!
//! Wraps a [`TableBackend`] with the things a single request does not give
//! us: transparent pagination, a timeout on every call, and a bounded retry
//! policy with exponential backoff for transient failures.
//!
//! # Retry Semantics
//!
//! Only transient failures are retried, see
//! [`TransportError::is_transient`]. A call is attempted at most
//! `max_retries + 1` times. The delay before retry `n` is
//! `initial_backoff * multiplier^(n - 1)`, capped at `max_backoff`.
//!
//! Rejections by the remote side (4xx) are never retried. When a fetch is
//! rejected, it usually means the table or field named by a link
//! configuration does not exist, so it surfaces as
//! [`TableError::TableRejected`]. When a write is rejected, or a write keeps
//! failing after every retry, it surfaces as [`TableError::WriteRejected`].

use crate::{
    config::ClientSettings,
    table::{Reference, Row, RowId, TableBackend, TableId, TransportError},
};

use futures::{
    stream::{self, Stream},
    TryStreamExt,
};
use std::{future::Future, time::Duration};
use tracing::{debug, instrument, warn};

/// Bounded retry policy with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries, not counting the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_backoff: Duration,

    /// Upper bound for any single delay.
    pub max_backoff: Duration,

    /// Growth factor applied to the delay after each retry.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Construct retry policy that never waits between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Construct retry policy that never retries.
    pub fn none() -> Self {
        Self::immediate(0)
    }

    /// Delay to wait before retry number `retry` (1-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        // INVARIANT: Cap exponent so large retry counts cannot overflow.
        let exponent = retry.saturating_sub(1).min(30) as i32;
        let delay = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let delay = delay.min(self.max_backoff.as_millis() as f64).max(0.0);

        Duration::from_millis(delay as u64)
    }
}

/// Table access with pagination, timeouts, and retries.
#[derive(Debug)]
pub struct TableClient<B>
where
    B: TableBackend,
{
    backend: B,
    retry: RetryPolicy,
    timeout: Duration,
    page_size: u32,
}

impl<B> TableClient<B>
where
    B: TableBackend,
{
    /// Construct new table client.
    ///
    /// A page size of zero is bumped to one.
    pub fn new(backend: B, retry: RetryPolicy, timeout: Duration, page_size: u32) -> Self {
        Self {
            backend,
            retry,
            timeout,
            page_size: page_size.max(1),
        }
    }

    /// Construct new table client from client settings.
    pub fn from_settings(backend: B, settings: &ClientSettings) -> Self {
        Self::new(
            backend,
            settings.retry_policy(),
            settings.request_timeout(),
            settings.page_size,
        )
    }

    /// Access underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Lazily fetch every row of a table.
    ///
    /// Pages are requested one at a time as the stream is polled. If any page
    /// fails after all retries, the stream yields that error and ends. There is
    /// no resuming halfway through.
    ///
    /// # Errors
    ///
    /// - Yield [`TableError::FetchFailed`] if a page keeps failing
    ///   transiently.
    /// - Yield [`TableError::TableRejected`] if the remote side rejects the
    ///   request.
    pub fn fetch_all_rows(&self, table: TableId) -> impl Stream<Item = Result<Row>> + Send + '_ {
        stream::try_unfold(Some(1_u32), move |page| async move {
            let Some(page) = page else {
                return Ok(None);
            };

            debug!("fetch page {page} of table {table}");
            let fetched = self
                .attempt(|| self.backend.list_rows(table, page, self.page_size))
                .await
                .map_err(|(source, attempts)| fetch_error(table, source, attempts))?;

            // INVARIANT: An empty page ends pagination, even if the remote
            // side claims there is more.
            let next = (fetched.has_more && !fetched.rows.is_empty()).then_some(page + 1);
            let rows = stream::iter(fetched.rows.into_iter().map(Ok::<Row, TableError>));

            Ok(Some((rows, next)))
        })
        .try_flatten()
    }

    /// Overwrite one field of one row.
    ///
    /// # Errors
    ///
    /// - Return [`TableError::WriteRejected`] if the remote side rejects the
    ///   write, or if the write keeps failing transiently.
    #[instrument(skip(self, reference), level = "debug")]
    pub async fn update_field(
        &self,
        table: TableId,
        row: RowId,
        field: &str,
        reference: &Reference,
    ) -> Result<()> {
        self.attempt(|| self.backend.update_row_field(table, row, field, reference))
            .await
            .map_err(|(source, attempts)| TableError::WriteRejected {
                table,
                row,
                field: field.into(),
                attempts,
                source,
            })
    }

    /// Determine primary field name of a table.
    ///
    /// # Errors
    ///
    /// - Return [`TableError::FetchFailed`] if the lookup keeps failing
    ///   transiently.
    /// - Return [`TableError::TableRejected`] if the remote side rejects the
    ///   lookup.
    #[instrument(skip(self), level = "debug")]
    pub async fn primary_field(&self, table: TableId) -> Result<String> {
        self.attempt(|| self.backend.primary_field(table))
            .await
            .map_err(|(source, attempts)| fetch_error(table, source, attempts))
    }

    /// Drive one backend call through timeout and retry policy.
    ///
    /// On failure, returns the last error along with the number of attempts
    /// that were made.
    async fn attempt<T, F, Fut>(&self, mut call: F) -> Result<T, (TransportError, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome = match tokio::time::timeout(self.timeout, call()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(TransportError::Timeout {
                    after: self.timeout,
                }),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempts <= self.retry.max_retries => {
                    let delay = self.retry.delay_for_retry(attempts);
                    warn!("attempt {attempts} failed, retry in {delay:?}: {error}");
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err((error, attempts)),
            }
        }
    }
}

fn fetch_error(table: TableId, source: TransportError, attempts: u32) -> TableError {
    if source.is_transient() {
        TableError::FetchFailed {
            table,
            attempts,
            source,
        }
    } else {
        TableError::TableRejected { table, source }
    }
}

/// Table access error types.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// Reading from table kept failing after every retry.
    #[error("failed to fetch from table {table} after {attempts} attempt(s)")]
    FetchFailed {
        table: TableId,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// Remote side refused to serve table, e.g., unknown table identifier.
    #[error("table {table} rejected the request")]
    TableRejected {
        table: TableId,
        #[source]
        source: TransportError,
    },

    /// Remote side refused the write, or it kept failing after every retry.
    #[error("write to field {field:?} of row {row} in table {table} failed after {attempts} attempt(s)")]
    WriteRejected {
        table: TableId,
        row: RowId,
        field: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },
}

/// Friendly result alias :3
pub type Result<T, E = TableError> = std::result::Result<T, E>;
