// SPDX-FileCopyrightText: 2025 Snapkeep Contributors
// SPDX-License-Identifier: MIT

//! Incremental replication planning.
//!
//! Given the snapshot populations of a source and a target location, work out
//! the ordered sequence of sends that brings the target up to date. Sends are
//! chained: each snapshot is transferred as a delta against the one sent
//! immediately before it, so only the first snapshot of a divergent run costs
//! a full transfer.

use crate::snapshot::Snapshot;

use std::collections::HashSet;
use tracing::{debug, info};

/// One send: a snapshot and the parent to delta against, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicationStep {
    /// Snapshot to transfer.
    pub snapshot: Snapshot,

    /// Parent for an incremental transfer. [`None`] means a full transfer.
    pub parent: Option<Snapshot>,
}

/// Ordered sends that bring a target up to date with a source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicationPlan {
    steps: Vec<ReplicationStep>,
}

impl ReplicationPlan {
    /// Steps in transfer order.
    pub fn steps(&self) -> &[ReplicationStep] {
        &self.steps
    }

    /// An empty plan means the target is already current.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Plan the sends that bring `target` up to date with `source`.
///
/// Both inputs are scans, so both arrive in ascending timestamp order.
/// Presence at the target is judged by name alone. Candidates keep their
/// source order, and each candidate after the first is paired with the
/// candidate sent right before it.
///
/// The first candidate is always a full transfer, even when the target
/// already holds an older common snapshot that could have served as a parent.
/// Accepting one full transfer at the start of a divergent run keeps the
/// command shape predictable; callers that cannot afford it should prune the
/// target less aggressively instead.
pub fn plan(source: &[Snapshot], target: &[Snapshot]) -> ReplicationPlan {
    let held: HashSet<&str> = target.iter().map(Snapshot::name).collect();

    let mut steps = Vec::new();
    let mut previous: Option<&Snapshot> = None;
    for snapshot in source {
        if held.contains(snapshot.name()) {
            debug!("{snapshot} already held by target");
            continue;
        }

        steps.push(ReplicationStep {
            snapshot: snapshot.clone(),
            parent: previous.cloned(),
        });
        previous = Some(snapshot);
    }

    if steps.is_empty() {
        info!("target already holds every source snapshot");
    } else {
        info!("{} snapshot(s) missing from target", steps.len());
    }

    ReplicationPlan { steps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snapshots(names: &[&str]) -> Vec<Snapshot> {
        names
            .iter()
            .map(|name| Snapshot::from_name(*name).unwrap())
            .collect()
    }

    fn named_steps(plan: &ReplicationPlan) -> Vec<(String, Option<String>)> {
        plan.steps()
            .iter()
            .map(|step| {
                (
                    step.snapshot.name().to_owned(),
                    step.parent.as_ref().map(|parent| parent.name().to_owned()),
                )
            })
            .collect()
    }

    #[test]
    fn empty_target_chains_from_full_transfer() {
        let source = snapshots(&["2025-08-16T10:00:00", "2025-08-16T11:00:00"]);
        let target = snapshots(&[]);

        let result = named_steps(&plan(&source, &target));
        let expect = vec![
            ("2025-08-16T10:00:00".to_owned(), None),
            (
                "2025-08-16T11:00:00".to_owned(),
                Some("2025-08-16T10:00:00".to_owned()),
            ),
        ];

        assert_eq!(result, expect);
    }

    #[test]
    fn identical_populations_plan_nothing() {
        let source = snapshots(&["2025-08-16T10:00:00"]);
        let target = snapshots(&["2025-08-16T10:00:00"]);

        let result = plan(&source, &target);

        assert!(result.is_empty());
    }

    #[test]
    fn divergent_suffix_restarts_with_full_transfer() {
        let source = snapshots(&[
            "2025-08-16T10:00:00",
            "2025-08-16T11:00:00",
            "2025-08-16T12:00:00",
        ]);
        let target = snapshots(&["2025-08-16T10:00:00"]);

        let result = named_steps(&plan(&source, &target));
        // First divergent snapshot is a full transfer, not a delta against
        // the common 10:00 snapshot the target already holds.
        let expect = vec![
            ("2025-08-16T11:00:00".to_owned(), None),
            (
                "2025-08-16T12:00:00".to_owned(),
                Some("2025-08-16T11:00:00".to_owned()),
            ),
        ];

        assert_eq!(result, expect);
    }

    #[test]
    fn target_extras_do_not_disturb_the_chain() {
        let source = snapshots(&["2025-08-16T10:00:00", "2025-08-16T12:00:00"]);
        let target = snapshots(&["2025-08-16T11:00:00"]);

        let result = named_steps(&plan(&source, &target));
        let expect = vec![
            ("2025-08-16T10:00:00".to_owned(), None),
            (
                "2025-08-16T12:00:00".to_owned(),
                Some("2025-08-16T10:00:00".to_owned()),
            ),
        ];

        assert_eq!(result, expect);
    }
}
