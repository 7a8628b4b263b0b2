// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Link records between Baserow tables.
//!
//! record-linker reads a set of __link configurations__ from a configuration
//! table, then, for each active one, joins a source table to a target table on
//! a match field and writes a reference to the matched target row into every
//! source row that matched exactly one target row.
//!
//! # Layout
//!
//! - [`config`]: settings layered from file and environment.
//! - [`table`]: remote table access, with retries and pagination.
//! - [`link`]: configuration loading, matching, and the run itself.
//! - [`path`]: default file locations.

pub mod config;
pub mod link;
pub mod path;
pub mod table;
