// SPDX-FileCopyrightText: 2025 Snapkeep Contributors
// SPDX-License-Identifier: MIT

//! Pure planning over scanned snapshot populations.
//!
//! Planners never touch the filesystem, never spawn processes, and never read
//! the clock on their own. They take already-scanned snapshot sequences
//! (see [`crate::snapshot::scan`]) plus whatever thresholds apply, and hand
//! back a value describing what an executor should do. Because of this, every
//! plan can be computed, inspected, and logged in full before anything
//! irreversible happens, which is what makes dry runs trustworthy.
//!
//! Two planners exist:
//!
//! - [`replicate`] decides what must be sent to bring a target location up to
//!   date with a source location, chaining incremental transfers.
//! - [`retain`] decides what a dual-threshold retention policy deletes from
//!   one location.
//!
//! Each planner traces its decision, including the "nothing to do" outcomes,
//! so an audit of a dry run never has to guess why an operation was skipped.

pub mod replicate;
pub mod retain;
