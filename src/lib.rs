// SPDX-FileCopyrightText: 2025 Snapkeep Contributors
// SPDX-License-Identifier: MIT

//! Snapshot lifecycle planning for btrfs backups.
//!
//! Snapkeep keeps a set of source subvolumes replicated into backup targets
//! by planning three operations over snapshot directory names: create,
//! replicate, prune. The library splits cleanly into a pure planning core
//! and a thin execution rim:
//!
//! - [`snapshot`] parses directory names into chronological identities and
//!   scans locations into ordered populations.
//! - [`plan`] computes what to send ([`plan::replicate`]) and what to delete
//!   ([`plan::retain`]) without touching disk, clock, or processes.
//! - [`exec`] renders planned operations into btrfs command shapes and
//!   applies them, for real or as a logged rehearsal.
//! - [`config`] declares the backup pairs and retention thresholds driving
//!   it all.
//!
//! Nothing here retries, recovers, or remembers: every run re-scans the
//! filesystem, plans from scratch, and hands each operation to an executor
//! exactly once. State lives in the snapshot names on disk.

pub mod config;
pub mod exec;
pub mod path;
pub mod plan;
pub mod snapshot;

pub use config::{BackupPair, Config, ConfigError, GlobalSettings, Location};
pub use snapshot::Snapshot;
