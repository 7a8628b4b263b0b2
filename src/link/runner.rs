// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Run orchestration.
//!
//! The [`LinkRunner`] walks link configurations in order, one at a time. For
//! each active configuration it goes through these phases:
//!
//! 1. __loading rows__: fetch source and target tables concurrently, along
//!    with the primary field of the target table when it is needed.
//! 2. __matching__: join source rows to target rows.
//! 3. __writing__: write a reference into every matched source row, with a
//!    bounded number of writes in flight.
//!
//! A configuration that fails in any phase is recorded as failed in the
//! [`RunReport`], and the runner moves on to the next one.
//!
//! # Cancellation
//!
//! Cancellation is only checked between configurations. Writes already in
//! flight for the current configuration are allowed to finish, and every
//! configuration that never started is reported as cancelled.

use crate::{
    config::Settings,
    link::{
        loader::{ConfigEntry, LoadError},
        matcher::{match_rows, require_field, MatchError, MatchOptions, MatchResult, Side},
        report::{ConfigOutcome, FailureKind, LinkPhase, LinkStatus, RunReport},
        LinkConfig, ReferenceMode,
    },
    table::{
        client::{TableClient, TableError},
        Reference, Row, RowId, TableBackend,
    },
};

use futures::{stream, StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Knobs of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Writes in flight at once during write-back.
    pub write_concurrency: usize,

    /// Do everything except the writes.
    pub dry_run: bool,

    /// Leave source rows alone whose reference field is already filled.
    pub skip_linked: bool,

    /// How match values are compared.
    pub match_options: MatchOptions,

    /// Draw a progress bar during write-back.
    pub show_progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            write_concurrency: 4,
            dry_run: false,
            skip_linked: false,
            match_options: MatchOptions::default(),
            show_progress: false,
        }
    }
}

impl RunOptions {
    /// Construct run options from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            write_concurrency: settings.client.write_concurrency,
            skip_linked: settings.link.skip_linked,
            match_options: MatchOptions {
                ignore_case: settings.link.ignore_case,
            },
            ..Default::default()
        }
    }
}

/// Runs link configurations against a table client.
#[derive(Debug)]
pub struct LinkRunner<'c, B>
where
    B: TableBackend,
{
    client: &'c TableClient<B>,
    options: RunOptions,
    cancel: CancellationToken,
}

impl<'c, B> LinkRunner<'c, B>
where
    B: TableBackend,
{
    /// Construct new link runner.
    pub fn new(client: &'c TableClient<B>, options: RunOptions) -> Self {
        Self {
            client,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop starting new configurations once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every link configuration in order.
    ///
    /// Never fails as a whole. Failures of individual configurations end up
    /// in the returned report.
    pub async fn run(&self, configs: &[LinkConfig]) -> RunReport {
        let entries = configs
            .iter()
            .cloned()
            .map(ConfigEntry::from)
            .collect::<Vec<_>>();
        self.run_entries(&entries).await
    }

    /// Run every loaded configuration row in order.
    ///
    /// Malformed rows are reported as failed without touching any table.
    pub async fn run_entries(&self, entries: &[ConfigEntry]) -> RunReport {
        let mut report = RunReport::default();
        for entry in entries {
            if self.cancel.is_cancelled() {
                info!("run cancelled, skip {:?}", entry.name());
                report
                    .outcomes
                    .push(ConfigOutcome::new(entry.name(), LinkStatus::Cancelled));
                continue;
            }

            let outcome = match entry {
                ConfigEntry::Ready(config) => self.run_config(config).await,
                ConfigEntry::Inactive { name } => {
                    info!("link configuration {name:?} is inactive, skip it");
                    ConfigOutcome::new(name, LinkStatus::Skipped)
                }
                ConfigEntry::Malformed { row, name, error } => {
                    let error = LoadError::Malformed {
                        row: *row,
                        source: error.clone(),
                    };
                    ConfigOutcome::new(
                        name,
                        LinkStatus::failed(
                            LinkPhase::Pending,
                            FailureKind::ConfigMalformed,
                            &error,
                        ),
                    )
                }
            };
            report.outcomes.push(outcome);
        }

        report
    }

    /// Run one active link configuration.
    #[instrument(skip_all, fields(config = %config.name), level = "debug")]
    pub async fn run_config(&self, config: &LinkConfig) -> ConfigOutcome {
        let mut outcome = ConfigOutcome::new(&config.name, LinkStatus::Done);
        if let Err(error) = self.link(config, &mut outcome).await {
            outcome.status = LinkStatus::failed(error.phase(), error.kind(), &error);
        }

        // INVARIANT: Failed rows are reported in row order regardless of the
        // order in which writes finished.
        outcome.failed_rows.sort();
        outcome
    }

    async fn link(&self, config: &LinkConfig, outcome: &mut ConfigOutcome) -> Result<()> {
        info!(
            "link table {} to table {} on {:?} = {:?}",
            config.source_table_id,
            config.target_table_id,
            config.source_match_field,
            config.target_match_field
        );

        debug!("phase: {}", LinkPhase::LoadingRows);
        let (source, target): (Vec<Row>, Vec<Row>) = futures::try_join!(
            self.client
                .fetch_all_rows(config.source_table_id)
                .try_collect(),
            self.client
                .fetch_all_rows(config.target_table_id)
                .try_collect(),
        )?;
        outcome.counts.source_rows = source.len();
        outcome.counts.target_rows = target.len();

        let primary = match config.reference_mode {
            ReferenceMode::RowId => None,
            ReferenceMode::PrimaryField => {
                Some(self.client.primary_field(config.target_table_id).await?)
            }
        };

        debug!("phase: {}", LinkPhase::Matching);
        require_field(&source, &config.source_reference_field, Side::Source)?;
        let pending: Vec<Row> = if self.options.skip_linked {
            let (linked, pending): (Vec<Row>, Vec<Row>) = source.into_iter().partition(|row| {
                row.get(&config.source_reference_field)
                    .is_some_and(|value| !value.is_blank())
            });
            outcome.counts.already_linked = linked.len();
            pending
        } else {
            source
        };

        let results = match_rows(
            &pending,
            &target,
            &config.source_match_field,
            &config.target_match_field,
            self.options.match_options,
        )?;

        let targets: HashMap<RowId, &Row> = target.iter().map(|row| (row.id, row)).collect();
        let mut writes = Vec::new();
        let mut first_failure = None;
        for (row, result) in results {
            match result {
                MatchResult::Matched(target_row) => {
                    outcome.counts.matched += 1;
                    let reference = match primary.as_deref() {
                        None => Some(Reference::RowId(target_row)),
                        Some(field) => targets
                            .get(&target_row)
                            .and_then(|target| target.get(field))
                            .filter(|value| !value.is_blank())
                            .map(|value| Reference::Value(value.clone())),
                    };

                    match reference {
                        Some(reference) => writes.push((row, reference)),
                        None => {
                            let message = format!(
                                "target row {target_row} has no value in its primary field"
                            );
                            warn!("cannot link source row {row}: {message}");
                            outcome.counts.errors += 1;
                            outcome.failed_rows.push(row);
                            first_failure.get_or_insert(message);
                        }
                    }
                }
                MatchResult::Unmatched => {
                    debug!("source row {row} has no match");
                    outcome.counts.unmatched += 1;
                }
                MatchResult::Ambiguous(candidates) => {
                    warn!(
                        "source row {row} matches {} target rows, leave it alone",
                        candidates.len()
                    );
                    outcome.counts.ambiguous += 1;
                    outcome.ambiguous_rows.push(row);
                }
            }
        }

        if self.options.dry_run {
            for (row, reference) in &writes {
                info!(
                    "dry run: would write {reference} into {:?} of source row {row}",
                    config.source_reference_field
                );
            }
            outcome.counts.pending_writes = writes.len();
        } else {
            debug!("phase: {}", LinkPhase::Writing);
            for (row, result) in self.write_back(config, &writes).await {
                match result {
                    Ok(()) => outcome.counts.written += 1,
                    Err(error) => {
                        warn!("{error}");
                        outcome.counts.errors += 1;
                        outcome.failed_rows.push(row);
                        first_failure.get_or_insert_with(|| error.to_string());
                    }
                }
            }
        }

        match first_failure {
            Some(first) => Err(LinkError::Incomplete {
                errors: outcome.counts.errors,
                first,
            }),
            None => Ok(()),
        }
    }

    /// Attempt every write, a bounded number at a time.
    async fn write_back(
        &self,
        config: &LinkConfig,
        writes: &[(RowId, Reference)],
    ) -> Vec<(RowId, Result<(), TableError>)> {
        let bar = self.progress_bar(config, writes.len());
        let results = stream::iter(writes)
            .map(|(row, reference)| async move {
                let result = self
                    .client
                    .update_field(
                        config.source_table_id,
                        *row,
                        &config.source_reference_field,
                        reference,
                    )
                    .await;
                (*row, result)
            })
            .buffer_unordered(self.options.write_concurrency.max(1))
            .inspect(|_| bar.inc(1))
            .collect()
            .await;
        bar.finish_and_clear();

        results
    }

    fn progress_bar(&self, config: &LinkConfig, len: usize) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<30}  [{wide_bar:.yellow/blue}] {pos}/{len}",
        ) {
            bar.set_style(style.progress_chars("-Cco."));
        }
        bar.set_message(config.name.clone());
        bar
    }
}

/// Link configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Rows or table metadata could not be loaded.
    #[error(transparent)]
    Load(#[from] TableError),

    /// Tables do not carry the fields the configuration names.
    #[error(transparent)]
    Mismatch(#[from] MatchError),

    /// Some matched rows could not be linked.
    #[error("{errors} matched row(s) could not be linked, first failure: {first}")]
    Incomplete { errors: usize, first: String },
}

impl LinkError {
    /// Phase in which error occurred.
    pub fn phase(&self) -> LinkPhase {
        match self {
            Self::Load(_) => LinkPhase::LoadingRows,
            Self::Mismatch(_) => LinkPhase::Matching,
            Self::Incomplete { .. } => LinkPhase::Writing,
        }
    }

    /// Category of error.
    ///
    /// A table the remote side refuses to serve at all is treated as a
    /// mistake in the configuration.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Load(TableError::TableRejected { .. }) => FailureKind::ConfigMalformed,
            Self::Load(_) => FailureKind::FetchFailed,
            Self::Mismatch(_) => FailureKind::ConfigMalformed,
            Self::Incomplete { .. } => FailureKind::WriteRejected,
        }
    }
}

/// Friendly result alias :3
type Result<T, E = LinkError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        link::loader::ColumnError,
        table::{
            client::RetryPolicy,
            memory::{MemoryBackend, RecordedWrite},
            FieldValue, TableId, TransportError,
        },
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const PEOPLE: TableId = TableId::new(1);
    const ACCOUNTS: TableId = TableId::new(2);

    fn config(name: &str) -> LinkConfig {
        LinkConfig {
            name: name.into(),
            source_table_id: PEOPLE,
            target_table_id: ACCOUNTS,
            active: true,
            source_match_field: "email".into(),
            target_match_field: "email".into(),
            source_reference_field: "account".into(),
            reference_mode: ReferenceMode::RowId,
        }
    }

    fn person(id: u64, email: &str) -> Row {
        Row::new(RowId::new(id))
            .with("email", email)
            .with("account", FieldValue::Null)
    }

    fn account(id: u64, email: &str, name: &str) -> Row {
        Row::new(RowId::new(id))
            .with("email", email)
            .with("name", name)
    }

    fn client(backend: MemoryBackend) -> TableClient<MemoryBackend> {
        TableClient::new(backend, RetryPolicy::immediate(3), Duration::from_secs(5), 100)
    }

    fn write(row: u64, reference: Reference) -> RecordedWrite {
        RecordedWrite {
            table: PEOPLE,
            row: RowId::new(row),
            field: "account".into(),
            reference,
        }
    }

    #[tokio::test]
    async fn link_unique_match() {
        let client = client(
            MemoryBackend::new()
                .with_table(PEOPLE, "email", vec![person(1, "a@x.com")])
                .with_table(ACCOUNTS, "name", vec![account(10, "a@x.com", "Alpha")]),
        );
        let report = LinkRunner::new(&client, RunOptions::default())
            .run(&[config("people")])
            .await;

        assert_eq!(
            client.backend().writes(),
            vec![write(1, Reference::RowId(RowId::new(10)))]
        );
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.status, LinkStatus::Done);
        assert_eq!(outcome.counts.matched, 1);
        assert_eq!(outcome.counts.written, 1);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn ambiguous_match_is_reported_not_written() {
        let client = client(
            MemoryBackend::new()
                .with_table(PEOPLE, "email", vec![person(1, "a@x.com"), person(2, "b@x.com")])
                .with_table(
                    ACCOUNTS,
                    "name",
                    vec![
                        account(10, "a@x.com", "Alpha"),
                        account(11, "a@x.com", "Alpha Two"),
                    ],
                ),
        );
        let report = LinkRunner::new(&client, RunOptions::default())
            .run(&[config("people")])
            .await;

        assert_eq!(client.backend().writes(), vec![]);
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.status, LinkStatus::Done);
        assert_eq!(outcome.counts.ambiguous, 1);
        assert_eq!(outcome.counts.unmatched, 1);
        assert_eq!(outcome.ambiguous_rows, vec![RowId::new(1)]);
    }

    #[tokio::test]
    async fn inactive_config_makes_no_calls() {
        let client = client(
            MemoryBackend::new()
                .with_table(PEOPLE, "email", vec![person(1, "a@x.com")])
                .with_table(ACCOUNTS, "name", vec![account(10, "a@x.com", "Alpha")]),
        );
        let mut inactive = config("people");
        inactive.active = false;
        let report = LinkRunner::new(&client, RunOptions::default())
            .run(&[inactive])
            .await;

        assert_eq!(client.backend().writes(), vec![]);
        assert_eq!(client.backend().list_calls(PEOPLE), 0);
        assert_eq!(report.outcomes[0].status, LinkStatus::Skipped);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn failed_config_does_not_block_others() {
        let client = client(
            MemoryBackend::new()
                .with_table(PEOPLE, "email", vec![person(1, "a@x.com")])
                .with_table(ACCOUNTS, "name", vec![account(10, "a@x.com", "Alpha")]),
        );
        let mut broken = config("broken");
        broken.target_table_id = TableId::new(99);
        let report = LinkRunner::new(&client, RunOptions::default())
            .run(&[broken, config("people")])
            .await;

        assert!(matches!(
            report.outcomes[0].status,
            LinkStatus::Failed {
                phase: LinkPhase::LoadingRows,
                kind: FailureKind::ConfigMalformed,
                ..
            }
        ));
        assert_eq!(report.outcomes[1].status, LinkStatus::Done);
        assert_eq!(
            client.backend().writes(),
            vec![write(1, Reference::RowId(RowId::new(10)))]
        );
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn fetch_exhaustion_fails_config() {
        let client = client(
            MemoryBackend::new()
                .with_table(PEOPLE, "email", vec![person(1, "a@x.com")])
                .with_table(ACCOUNTS, "name", vec![account(10, "a@x.com", "Alpha")]),
        );
        client.backend().fail_list(
            ACCOUNTS,
            (0..4).map(|_| TransportError::Status {
                status: 503,
                body: "busy".into(),
            }),
        );
        let report = LinkRunner::new(&client, RunOptions::default())
            .run(&[config("people")])
            .await;

        assert!(matches!(
            report.outcomes[0].status,
            LinkStatus::Failed {
                phase: LinkPhase::LoadingRows,
                kind: FailureKind::FetchFailed,
                ..
            }
        ));
        assert_eq!(client.backend().writes(), vec![]);
    }

    #[tokio::test]
    async fn missing_match_field_fails_in_matching() {
        let client = client(
            MemoryBackend::new()
                .with_table(PEOPLE, "email", vec![person(1, "a@x.com")])
                .with_table(ACCOUNTS, "name", vec![account(10, "a@x.com", "Alpha")]),
        );
        let mut typo = config("people");
        typo.target_match_field = "e-mail".into();
        let report = LinkRunner::new(&client, RunOptions::default())
            .run(&[typo])
            .await;

        assert!(matches!(
            report.outcomes[0].status,
            LinkStatus::Failed {
                phase: LinkPhase::Matching,
                kind: FailureKind::ConfigMalformed,
                ..
            }
        ));
        assert_eq!(client.backend().writes(), vec![]);
    }

    #[tokio::test]
    async fn rejected_write_fails_config_after_pass() {
        let client = client(
            MemoryBackend::new()
                .with_table(PEOPLE, "email", vec![person(1, "a@x.com"), person(2, "b@x.com")])
                .with_table(
                    ACCOUNTS,
                    "name",
                    vec![account(10, "a@x.com", "Alpha"), account(11, "b@x.com", "Beta")],
                ),
        );
        client.backend().fail_write(
            RowId::new(1),
            [TransportError::Status {
                status: 400,
                body: "nope".into(),
            }],
        );
        let report = LinkRunner::new(&client, RunOptions::default())
            .run(&[config("people")])
            .await;

        assert_eq!(
            client.backend().writes(),
            vec![write(2, Reference::RowId(RowId::new(11)))]
        );
        let outcome = &report.outcomes[0];
        assert!(matches!(
            outcome.status,
            LinkStatus::Failed {
                phase: LinkPhase::Writing,
                kind: FailureKind::WriteRejected,
                ..
            }
        ));
        assert_eq!(outcome.counts.written, 1);
        assert_eq!(outcome.counts.errors, 1);
        assert_eq!(outcome.failed_rows, vec![RowId::new(1)]);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let client = client(
            MemoryBackend::new()
                .with_table(PEOPLE, "email", vec![person(1, "a@x.com")])
                .with_table(ACCOUNTS, "name", vec![account(10, "a@x.com", "Alpha")]),
        );
        let options = RunOptions {
            dry_run: true,
            ..Default::default()
        };
        let report = LinkRunner::new(&client, options)
            .run(&[config("people")])
            .await;

        assert_eq!(client.backend().writes(), vec![]);
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.status, LinkStatus::Done);
        assert_eq!(outcome.counts.written, 0);
        assert_eq!(outcome.counts.pending_writes, 1);
    }

    #[tokio::test]
    async fn skip_linked_leaves_filled_rows_alone() {
        let linked = person(2, "b@x.com").with("account", 11.0);
        let client = client(
            MemoryBackend::new()
                .with_table(PEOPLE, "email", vec![person(1, "a@x.com"), linked])
                .with_table(
                    ACCOUNTS,
                    "name",
                    vec![account(10, "a@x.com", "Alpha"), account(12, "b@x.com", "Beta")],
                ),
        );
        let options = RunOptions {
            skip_linked: true,
            ..Default::default()
        };
        let report = LinkRunner::new(&client, options)
            .run(&[config("people")])
            .await;

        assert_eq!(
            client.backend().writes(),
            vec![write(1, Reference::RowId(RowId::new(10)))]
        );
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.counts.source_rows, 2);
        assert_eq!(outcome.counts.already_linked, 1);
        assert_eq!(outcome.counts.matched, 1);
    }

    #[tokio::test]
    async fn primary_field_mode_writes_primary_value() {
        let client = client(
            MemoryBackend::new()
                .with_table(PEOPLE, "email", vec![person(1, "a@x.com"), person(2, "b@x.com")])
                .with_table(
                    ACCOUNTS,
                    "name",
                    vec![account(10, "a@x.com", "Alpha"), account(11, "b@x.com", "  ")],
                ),
        );
        let mut by_name = config("people");
        by_name.reference_mode = ReferenceMode::PrimaryField;
        let report = LinkRunner::new(&client, RunOptions::default())
            .run(&[by_name])
            .await;

        assert_eq!(
            client.backend().writes(),
            vec![write(1, Reference::Value("Alpha".into()))]
        );
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.counts.matched, 2);
        assert_eq!(outcome.counts.written, 1);
        assert_eq!(outcome.counts.errors, 1);
        assert_eq!(outcome.failed_rows, vec![RowId::new(2)]);
        assert!(matches!(outcome.status, LinkStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_at_config_boundary() {
        let client = client(
            MemoryBackend::new()
                .with_table(PEOPLE, "email", vec![person(1, "a@x.com")])
                .with_table(ACCOUNTS, "name", vec![account(10, "a@x.com", "Alpha")]),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = LinkRunner::new(&client, RunOptions::default())
            .with_cancellation(cancel)
            .run(&[config("first"), config("second")])
            .await;

        assert_eq!(client.backend().writes(), vec![]);
        assert_eq!(report.outcomes[0].status, LinkStatus::Cancelled);
        assert_eq!(report.outcomes[1].status, LinkStatus::Cancelled);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn cancellation_during_config_lets_it_finish() {
        let client = client(
            MemoryBackend::new()
                .with_table(PEOPLE, "email", vec![person(1, "a@x.com"), person(2, "b@x.com")])
                .with_table(
                    ACCOUNTS,
                    "name",
                    vec![account(10, "a@x.com", "Alpha"), account(11, "b@x.com", "Beta")],
                ),
        );
        let cancel = CancellationToken::new();
        client.backend().cancel_on_write(cancel.clone());
        let options = RunOptions {
            write_concurrency: 1,
            ..Default::default()
        };
        let report = LinkRunner::new(&client, options)
            .with_cancellation(cancel)
            .run(&[config("first"), config("second")])
            .await;

        let first = &report.outcomes[0];
        assert_eq!(first.status, LinkStatus::Done);
        assert_eq!(first.counts.written, 2);
        assert_eq!(report.outcomes[1].status, LinkStatus::Cancelled);
        assert_eq!(client.backend().writes().len(), 2);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn malformed_entry_fails_without_blocking_others() {
        let client = client(
            MemoryBackend::new()
                .with_table(PEOPLE, "email", vec![person(1, "a@x.com")])
                .with_table(ACCOUNTS, "name", vec![account(10, "a@x.com", "Alpha")]),
        );
        let entries = vec![
            ConfigEntry::Malformed {
                row: RowId::new(5),
                name: "broken".into(),
                error: ColumnError::Missing("Source Table ID"),
            },
            ConfigEntry::Inactive {
                name: "draft".into(),
            },
            ConfigEntry::Ready(config("people")),
        ];
        let report = LinkRunner::new(&client, RunOptions::default())
            .run_entries(&entries)
            .await;

        assert_eq!(
            report.outcomes[0].status,
            LinkStatus::Failed {
                phase: LinkPhase::Pending,
                kind: FailureKind::ConfigMalformed,
                error: "configuration row 5 is malformed: missing column \"Source Table ID\"".into(),
            }
        );
        assert_eq!(report.outcomes[1].status, LinkStatus::Skipped);
        assert_eq!(report.outcomes[2].status, LinkStatus::Done);
        assert_eq!(
            client.backend().writes(),
            vec![write(1, Reference::RowId(RowId::new(10)))]
        );
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn rerun_makes_same_writes() {
        let client = client(
            MemoryBackend::new()
                .with_table(PEOPLE, "email", vec![person(1, "a@x.com"), person(2, "b@x.com")])
                .with_table(
                    ACCOUNTS,
                    "name",
                    vec![account(10, "a@x.com", "Alpha"), account(11, "b@x.com", "Beta")],
                ),
        );
        let runner = LinkRunner::new(&client, RunOptions::default());
        let first = runner.run(&[config("people")]).await;
        let after_first = client.backend().rows(PEOPLE);
        let second = runner.run(&[config("people")]).await;

        assert_eq!(first, second);
        assert_eq!(client.backend().rows(PEOPLE), after_first);
        assert_eq!(client.backend().writes().len(), 4);
    }
}
