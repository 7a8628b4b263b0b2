// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Run reports.
//!
//! A run report lists the outcome of every link configuration of a run, along
//! with per-configuration counts. Operators use it to spot failures and to
//! resolve ambiguous rows by hand, so ambiguous source rows are listed by
//! identifier rather than just counted.

use crate::table::RowId;

use serde::Serialize;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};
use tracing::{error, info, warn};

/// Phase a link configuration is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkPhase {
    Pending,
    LoadingRows,
    Matching,
    Writing,
}

impl Display for LinkPhase {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Pending => fmt.write_str("pending"),
            Self::LoadingRows => fmt.write_str("loading rows"),
            Self::Matching => fmt.write_str("matching"),
            Self::Writing => fmt.write_str("writing"),
        }
    }
}

/// Category of failure, for operators and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Configuration does not fit the tables it names.
    ConfigMalformed,

    /// Rows could not be fetched after every retry.
    FetchFailed,

    /// Writes were rejected or kept failing.
    WriteRejected,
}

/// Final status of a link configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum LinkStatus {
    /// Every phase completed.
    Done,

    /// Configuration is inactive.
    Skipped,

    /// Run was cancelled before configuration started.
    Cancelled,

    /// Configuration stopped in some phase.
    Failed {
        phase: LinkPhase,
        kind: FailureKind,
        error: String,
    },
}

impl LinkStatus {
    /// Construct failed status, flattening the error chain into one line.
    pub fn failed(phase: LinkPhase, kind: FailureKind, error: &(dyn Error + 'static)) -> Self {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        Self::Failed {
            phase,
            kind,
            error: message,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Counters of one link configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkCounts {
    pub source_rows: usize,
    pub target_rows: usize,
    /// Source rows left alone because their reference was already filled.
    pub already_linked: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub ambiguous: usize,
    pub written: usize,
    /// Writes a dry run would have made.
    pub pending_writes: usize,
    pub errors: usize,
}

impl LinkCounts {
    fn absorb(&mut self, other: &Self) {
        self.source_rows += other.source_rows;
        self.target_rows += other.target_rows;
        self.already_linked += other.already_linked;
        self.matched += other.matched;
        self.unmatched += other.unmatched;
        self.ambiguous += other.ambiguous;
        self.written += other.written;
        self.pending_writes += other.pending_writes;
        self.errors += other.errors;
    }
}

/// Outcome of one link configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigOutcome {
    pub name: String,
    #[serde(flatten)]
    pub status: LinkStatus,
    pub counts: LinkCounts,
    /// Source rows matching more than one target row.
    pub ambiguous_rows: Vec<RowId>,
    /// Source rows whose write did not go through.
    pub failed_rows: Vec<RowId>,
}

impl ConfigOutcome {
    /// Construct new outcome with zeroed counts.
    pub fn new(name: impl Into<String>, status: LinkStatus) -> Self {
        Self {
            name: name.into(),
            status,
            counts: LinkCounts::default(),
            ambiguous_rows: Vec::new(),
            failed_rows: Vec::new(),
        }
    }

    fn log(&self) {
        let counts = &self.counts;
        match &self.status {
            LinkStatus::Failed { phase, kind, error } => error!(
                config = %self.name,
                status = self.status.label(),
                %phase,
                ?kind,
                matched = counts.matched,
                unmatched = counts.unmatched,
                ambiguous = counts.ambiguous,
                written = counts.written,
                errors = counts.errors,
                "link failed: {error}"
            ),
            status => info!(
                config = %self.name,
                status = status.label(),
                source_rows = counts.source_rows,
                target_rows = counts.target_rows,
                already_linked = counts.already_linked,
                matched = counts.matched,
                unmatched = counts.unmatched,
                ambiguous = counts.ambiguous,
                written = counts.written,
                pending_writes = counts.pending_writes,
                errors = counts.errors,
                "link report"
            ),
        }

        if !self.ambiguous_rows.is_empty() {
            warn!(
                config = %self.name,
                "ambiguous source rows need manual linking: {}",
                join_ids(&self.ambiguous_rows)
            );
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<ConfigOutcome>,
}

impl RunReport {
    /// Check if every configuration that should have run is done.
    ///
    /// Skipped configurations do not count against success. Failed and
    /// cancelled ones do.
    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|outcome| matches!(outcome.status, LinkStatus::Done | LinkStatus::Skipped))
    }

    /// Sum of counts over every configuration.
    pub fn totals(&self) -> LinkCounts {
        let mut totals = LinkCounts::default();
        for outcome in &self.outcomes {
            totals.absorb(&outcome.counts);
        }
        totals
    }

    /// Number of configurations whose status passes `wanted`.
    fn count_status(&self, wanted: fn(&LinkStatus) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| wanted(&outcome.status))
            .count()
    }

    /// Emit report to the log, one line per configuration plus a summary.
    pub fn log(&self) {
        for outcome in &self.outcomes {
            outcome.log();
        }

        let totals = self.totals();
        info!(
            done = self.count_status(|status| matches!(status, LinkStatus::Done)),
            skipped = self.count_status(|status| matches!(status, LinkStatus::Skipped)),
            failed = self.count_status(|status| matches!(status, LinkStatus::Failed { .. })),
            cancelled = self.count_status(|status| matches!(status, LinkStatus::Cancelled)),
            matched = totals.matched,
            unmatched = totals.unmatched,
            ambiguous = totals.ambiguous,
            written = totals.written,
            errors = totals.errors,
            "run finished"
        );
    }
}

fn join_ids(ids: &[RowId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
