// SPDX-FileCopyrightText: 2025 Snapkeep Contributors
// SPDX-License-Identifier: MIT

//! Retention planning.
//!
//! A retention policy has two independent dials: a count floor and an age
//! ceiling. The newest `count` snapshots are untouchable no matter how old
//! they are. Everything older than that protected band is deleted only once
//! it has also aged past `days`. Recent-but-unprotected snapshots therefore
//! survive on age alone, and a location never empties out entirely while its
//! count floor is above zero.
//!
//! The clock is a parameter, not an ambient read. One `now` is taken per
//! planning call and every snapshot in the batch is judged against the same
//! cutoff, so a plan computed at second boundaries cannot contradict itself.

use crate::snapshot::Snapshot;

use chrono::{Duration, NaiveDateTime};
use tracing::info;

/// Dual-threshold retention policy for one location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    days: i64,
    count: usize,
}

impl RetentionPolicy {
    /// Build a policy from raw configuration numbers.
    ///
    /// Negative thresholds read as zero rather than erroring out; retention
    /// numbers are validated for sense by the configuration layer, and a
    /// nonsense value must still never crash a purge run.
    pub fn new(days: i64, count: i64) -> Self {
        Self {
            days: days.max(0),
            count: count.max(0) as usize,
        }
    }

    /// Maximum age in days for snapshots beyond the protected count.
    pub fn days(&self) -> i64 {
        self.days
    }

    /// Minimum number of most-recent snapshots to always keep.
    pub fn count(&self) -> usize {
        self.count
    }
}

/// Snapshots one location should delete under its policy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetentionDecision {
    expired: Vec<Snapshot>,
}

impl RetentionDecision {
    /// Expired snapshots, newest first.
    ///
    /// No deletion order is mandated here; executors usually walk the set
    /// oldest first so an interrupted purge leaves the newest history intact.
    pub fn expired(&self) -> &[Snapshot] {
        &self.expired
    }

    /// Nothing qualified for deletion.
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty()
    }
}

/// Select the snapshots `policy` deletes from one scanned location.
///
/// The input arrives oldest first from a scan, so it is re-sorted newest
/// first here. The first `count` entries are unconditionally protected; the
/// rest expire when strictly older than `now - days`.
///
/// Each location carries its own thresholds, so callers run this once per
/// location with that location's policy; decisions never coordinate across
/// locations.
pub fn plan(
    snapshots: &[Snapshot],
    policy: &RetentionPolicy,
    now: NaiveDateTime,
) -> RetentionDecision {
    let mut ordered: Vec<&Snapshot> = snapshots.iter().collect();
    ordered.sort_unstable_by(|a, b| b.cmp(a));

    if ordered.len() <= policy.count() {
        info!(
            "all {} snapshot(s) protected by retention count {}",
            ordered.len(),
            policy.count()
        );
        return RetentionDecision::default();
    }

    // INVARIANT: One cutoff for the whole batch.
    let cutoff = now - Duration::days(policy.days());
    let expired: Vec<Snapshot> = ordered[policy.count()..]
        .iter()
        .filter(|snapshot| snapshot.timestamp() < cutoff)
        .map(|&snapshot| snapshot.clone())
        .collect();

    if expired.is_empty() {
        info!("nothing old enough to delete");
    } else {
        info!(
            "{} of {} snapshot(s) expired under {} day(s), keep {}",
            expired.len(),
            ordered.len(),
            policy.days(),
            policy.count()
        );
    }

    RetentionDecision { expired }
}
