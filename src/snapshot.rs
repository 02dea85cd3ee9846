// SPDX-FileCopyrightText: 2025 Snapkeep Contributors
// SPDX-License-Identifier: MIT

//! Snapshot identity and discovery.
//!
//! A __snapshot__ is a named, timestamped, read-only point-in-time capture of
//! a subvolume. Snapkeep never inspects snapshot contents. The directory name
//! alone carries the snapshot's full identity, which makes names the wire
//! format shared between the creation path and the scanning path.
//!
//! # Naming Contract
//!
//! A directory is a snapshot if and only if its entire name matches:
//!
//! ```text
//! ^(\d{4}-\d{2}-\d{2}(?:T\d{2}:\d{2}:\d{2})?)(?:-(.+))?$
//! ```
//!
//! and the timestamp portion survives calendar validation. The date-only form
//! is the legacy spelling and is read as midnight of that date. Anything
//! after the timestamp's trailing dash is a free-text suffix with no meaning
//! beyond round-tripping the original name.
//!
//! Names double as the comparison key between two locations: two snapshots
//! are the same snapshot exactly when their names are equal, no matter where
//! they were scanned from. Chronological order comes from the parsed
//! timestamp, with lexicographic name order breaking ties so that repeated
//! scans of the same population always agree.
//!
//! # See Also
//!
//! 1. [btrfs subvolume snapshots](https://btrfs.readthedocs.io/en/latest/Subvolumes.html)

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use regex::Regex;
use std::{
    cmp::Ordering,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_dir,
    hash::{Hash, Hasher},
    path::Path,
    sync::LazyLock,
};
use tracing::{debug, warn};

/// Anchored pattern for snapshot directory names.
static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2}(?:T\d{2}:\d{2}:\d{2})?)(?:-(.+))?$").unwrap()
});

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// One point-in-time capture, identified by its directory name.
///
/// Fields stay private so the name and the timestamp can never drift apart:
/// every snapshot is built either by parsing an existing name through
/// [`Snapshot::from_name`], or by stamping a fresh name through
/// [`Snapshot::generate`].
///
/// # Invariant
///
/// - Equality and hashing use the name alone.
/// - Ordering uses the timestamp, then the name for equal timestamps.
#[derive(Clone, Debug)]
pub struct Snapshot {
    name: String,
    timestamp: NaiveDateTime,
    suffix: Option<String>,
}

impl Snapshot {
    /// Parse a directory name into a snapshot.
    ///
    /// Returns [`None`] for any name that does not match the naming contract,
    /// including names that match the pattern but name an impossible calendar
    /// date. "Not a snapshot" is an answer, not a failure, so callers skip
    /// such entries instead of erroring out of a scan.
    pub fn from_name(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        let fields = NAME_PATTERN.captures(&name)?;

        let stamp = fields.get(1)?.as_str();
        let timestamp = if stamp.contains('T') {
            NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?
        } else {
            // Legacy date-only form reads as midnight.
            NaiveDate::parse_from_str(stamp, DATE_FORMAT)
                .ok()?
                .and_hms_opt(0, 0, 0)?
        };
        let suffix = fields.get(2).map(|found| found.as_str().to_owned());

        Some(Self {
            name,
            timestamp,
            suffix,
        })
    }

    /// Stamp a fresh snapshot name from a wall-clock reading.
    ///
    /// An empty suffix is treated the same as no suffix, since a trailing
    /// dash with nothing after it would not parse back.
    pub fn generate(now: NaiveDateTime, suffix: Option<&str>) -> Self {
        // INVARIANT: Names carry whole seconds only. Drop sub-second
        // precision so the generated name parses back to an equal timestamp.
        let timestamp = now.with_nanosecond(0).unwrap_or(now);
        let suffix = suffix
            .filter(|text| !text.is_empty())
            .map(str::to_owned);
        let stamp = timestamp.format(TIMESTAMP_FORMAT);
        let name = match &suffix {
            Some(suffix) => format!("{stamp}-{suffix}"),
            None => stamp.to_string(),
        };

        Self {
            name,
            timestamp,
            suffix,
        }
    }

    /// Exact directory name of the snapshot.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calendar timestamp parsed out of the name.
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Free-text label carried after the timestamp, if any.
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }
}

impl Display for Snapshot {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.name)
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Snapshot {}

impl Hash for Snapshot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Ord for Snapshot {
    fn cmp(&self, other: &Self) -> Ordering {
        // INVARIANT: Equal timestamps fall back to lexicographic name order.
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for Snapshot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Scan a location for snapshots, oldest first.
///
/// Only immediate child directories are candidates. Entries whose names fail
/// the naming contract are silently skipped. A missing location, or any
/// enumeration failure, yields an empty result after a warning; a location
/// that cannot be read looks the same as a location holding no snapshots yet.
pub fn scan(location: impl AsRef<Path>) -> Vec<Snapshot> {
    let location = location.as_ref();
    let entries = match read_dir(location) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("cannot scan snapshots in {}: {err}", location.display());
            return Vec::new();
        }
    };

    let mut snapshots = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("unreadable entry in {}: {err}", location.display());
                continue;
            }
        };

        let is_dir = entry
            .file_type()
            .map(|kind| kind.is_dir())
            .unwrap_or(false);
        if !is_dir {
            continue;
        }

        match Snapshot::from_name(entry.file_name().to_string_lossy()) {
            Some(snapshot) => snapshots.push(snapshot),
            None => debug!("skipping non-snapshot entry {:?}", entry.file_name()),
        }
    }

    snapshots.sort_unstable();
    snapshots
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;
    use std::fs::{create_dir, write};

    fn at(date: (i32, u32, u32), time: (u32, u32, u32)) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(time.0, time.1, time.2)
            .unwrap()
    }

    #[test_case("2025-08-16T10:30:00", (2025, 8, 16), (10, 30, 0), None; "full timestamp")]
    #[test_case("2025-08-16", (2025, 8, 16), (0, 0, 0), None; "legacy date reads as midnight")]
    #[test_case("2025-08-16T10:30:00-weekly", (2025, 8, 16), (10, 30, 0), Some("weekly"); "timestamp with suffix")]
    #[test_case("2025-08-16-pre-upgrade", (2025, 8, 16), (0, 0, 0), Some("pre-upgrade"); "suffix keeps inner dashes")]
    #[test]
    fn from_name_accepts(name: &str, date: (i32, u32, u32), time: (u32, u32, u32), suffix: Option<&str>) {
        let snapshot = Snapshot::from_name(name).unwrap();

        assert_eq!(snapshot.name(), name);
        assert_eq!(snapshot.timestamp(), at(date, time));
        assert_eq!(snapshot.suffix(), suffix);
    }

    #[test_case("not-a-date"; "free text")]
    #[test_case("2025-13-40"; "impossible calendar date")]
    #[test_case("2025-08-16Txx:00:00"; "non-numeric time")]
    #[test_case("2025-08-16T10:30"; "truncated time")]
    #[test_case("x2025-08-16"; "leading junk")]
    #[test_case("2025-08-16T10:30:00-"; "dangling suffix dash")]
    #[test_case("20250816"; "undelimited date")]
    #[test]
    fn from_name_rejects(name: &str) {
        assert_eq!(Snapshot::from_name(name), None);
    }

    #[test_case("2025-08-16T10:30:00"; "bare timestamp")]
    #[test_case("2025-08-16T10:30:00-weekly"; "suffixed timestamp")]
    #[test_case("2025-08-16"; "legacy date")]
    #[test]
    fn accepted_names_round_trip(name: &str) {
        let parsed = Snapshot::from_name(name).unwrap();
        let regenerated = Snapshot::generate(parsed.timestamp(), parsed.suffix());
        let reparsed = Snapshot::from_name(regenerated.name()).unwrap();

        assert_eq!(reparsed.timestamp(), parsed.timestamp());
        assert_eq!(reparsed.suffix(), parsed.suffix());
    }

    #[test]
    fn generate_ignores_empty_suffix() {
        let snapshot = Snapshot::generate(at((2025, 8, 16), (10, 30, 0)), Some(""));

        assert_eq!(snapshot.name(), "2025-08-16T10:30:00");
        assert_eq!(snapshot.suffix(), None);
    }

    #[test]
    fn equality_by_name_ordering_by_timestamp() {
        let early = Snapshot::from_name("2025-08-16T10:00:00").unwrap();
        let late = Snapshot::from_name("2025-08-16T11:00:00").unwrap();
        let alias = Snapshot::from_name("2025-08-16T10:00:00").unwrap();

        assert_eq!(early, alias);
        assert!(early < late);

        // Equal timestamps order by name.
        let plain = Snapshot::from_name("2025-08-16T10:00:00").unwrap();
        let tagged = Snapshot::from_name("2025-08-16T10:00:00-weekly").unwrap();
        assert!(plain < tagged);
    }

    #[sealed_test]
    fn scan_orders_snapshots_and_skips_strangers() {
        create_dir("2025-08-16T11:00:00").unwrap();
        create_dir("2025-08-16T10:00:00").unwrap();
        create_dir("not-a-snap").unwrap();
        // Snapshot-shaped name on a plain file must not count.
        write("2025-08-16T09:00:00", "").unwrap();

        let result: Vec<_> = scan(".").iter().map(|s| s.name().to_owned()).collect();
        let expect = vec![
            "2025-08-16T10:00:00".to_owned(),
            "2025-08-16T11:00:00".to_owned(),
        ];

        assert_eq!(result, expect);
    }

    #[sealed_test]
    fn scan_missing_location_is_empty() {
        let result = scan("no/such/place");

        assert_eq!(result, Vec::new());
    }
}
