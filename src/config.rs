// SPDX-FileCopyrightText: 2025 Snapkeep Contributors
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the configuration file that Snapkeep uses to
//! simplify the process of serialization and deserialization. File I/O is
//! left to the caller to figure out.
//!
//! # General Layout
//!
//! A configuration is composed of two basic parts: global settings and a
//! listing of backup pairs. The global section holds defaults that apply to
//! every run, currently just the standing dry-run switch. Each backup pair
//! names a source location whose snapshots are replicated into a target
//! location, along with two independent retention policies, one per side.
//! The planners only ever see one location and its two retention numbers at
//! a time; the pairing exists for the operator's benefit.
//!
//! Location fields go through shell expansion at parse time, so `~` and
//! environment variables are resolved once, up front, before any path
//! reaches a scanner or an executor.

use crate::plan::retain::RetentionPolicy;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Complete configuration for one snapkeep invocation.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Settings that apply to every run.
    #[serde(default)]
    pub global: GlobalSettings,

    /// Backup pair listing.
    #[serde(default, rename = "pair")]
    pub pairs: Vec<BackupPair>,
}

impl Config {
    /// Look up a backup pair by name.
    pub fn pair(&self, name: impl AsRef<str>) -> Option<&BackupPair> {
        self.pairs.iter().find(|pair| pair.name == name.as_ref())
    }

    /// Resolve a pair selection to concrete pairs.
    ///
    /// [`None`] selects every configured pair. Asking for a name that is not
    /// configured is a hard error, unlike a location that merely fails to
    /// scan: a misspelled pair name means the operator is not running what
    /// they think they are running.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::UnknownPair`] if no pair carries the requested
    ///   name.
    pub fn select(&self, name: Option<&str>) -> Result<Vec<&BackupPair>> {
        match name {
            Some(name) => self
                .pair(name)
                .map(|pair| vec![pair])
                .ok_or_else(|| ConfigError::UnknownPair {
                    name: name.to_owned(),
                }),
            None => Ok(self.pairs.iter().collect()),
        }
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: Config = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every location field.
        for pair in &mut config.pairs {
            pair.source = expand(&pair.source)?;
            pair.target = expand(&pair.target)?;
        }

        Ok(config)
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand(location: &Location) -> Result<Location> {
    Ok(Location::new(
        shellexpand::full(location.to_string().as_str())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Settings that apply to every run.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct GlobalSettings {
    /// Treat every run as a dry run, regardless of CLI flags.
    #[serde(default)]
    pub dry_run: bool,
}

/// One source/target association with its retention thresholds.
///
/// Retention numbers are plain integers straight from the file. Conversion
/// into a [`RetentionPolicy`] clamps negatives to zero, so a nonsensical
/// value cannot crash a purge run.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct BackupPair {
    /// Name used to select this pair from the command line.
    pub name: String,

    /// Subvolume whose child directories are the snapshot population.
    pub source: Location,

    /// Location replicated snapshots land in.
    pub target: Location,

    /// Maximum age in days for unprotected source snapshots.
    pub retention_days: i64,

    /// Minimum number of most-recent source snapshots to always keep.
    pub retention_count: i64,

    /// Maximum age in days for unprotected target snapshots.
    pub target_retention_days: i64,

    /// Minimum number of most-recent target snapshots to always keep.
    pub target_retention_count: i64,
}

impl BackupPair {
    /// Retention policy governing the source location.
    pub fn source_retention(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.retention_days, self.retention_count)
    }

    /// Retention policy governing the target location.
    pub fn target_retention(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.target_retention_days, self.target_retention_count)
    }
}

/// Directory path acting as a snapshot location.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Location(PathBuf);

impl Location {
    /// Construct new location.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Treat location as [`Path`] slice.
    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }

    /// Path of a named snapshot inside this location.
    pub fn snapshot_path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.0.join(name)
    }
}

impl Display for Location {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_path().to_string_lossy().as_ref())
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Requested backup pair is not configured.
    #[error("no backup pair named {name:?} in configuration")]
    UnknownPair { name: String },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    fn home_pair() -> BackupPair {
        BackupPair {
            name: "home".into(),
            source: Location::new("/home/.snapshots"),
            target: Location::new("/mnt/backup/home"),
            retention_days: 30,
            retention_count: 5,
            target_retention_days: 90,
            target_retention_count: 10,
        }
    }

    #[sealed_test(env = [("POOL", "/mnt/backup")])]
    fn deserialize_config() -> anyhow::Result<()> {
        let result: Config = r#"
            [global]
            dry_run = false

            [[pair]]
            name = "home"
            source = "/home/.snapshots"
            target = "$POOL/home"
            retention_days = 30
            retention_count = 5
            target_retention_days = 90
            target_retention_count = 10
        "#
        .parse()?;

        let expect = Config {
            global: GlobalSettings { dry_run: false },
            pairs: vec![home_pair()],
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn serialize_config() {
        let result = Config {
            global: GlobalSettings { dry_run: true },
            pairs: vec![home_pair()],
        }
        .to_string();

        let expect = indoc! {r#"
            [global]
            dry_run = true

            [[pair]]
            name = "home"
            source = "/home/.snapshots"
            target = "/mnt/backup/home"
            retention_days = 30
            retention_count = 5
            target_retention_days = 90
            target_retention_count = 10
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn missing_global_section_defaults() -> anyhow::Result<()> {
        let result: Config = r#"
            [[pair]]
            name = "home"
            source = "/home/.snapshots"
            target = "/mnt/backup/home"
            retention_days = 30
            retention_count = 5
            target_retention_days = 90
            target_retention_count = 10
        "#
        .parse()?;

        assert_eq!(result.global, GlobalSettings::default());

        Ok(())
    }

    #[test]
    fn select_named_pair() -> anyhow::Result<()> {
        let config = Config {
            global: GlobalSettings::default(),
            pairs: vec![home_pair()],
        };

        let result = config.select(Some("home"))?;

        assert_eq!(result, vec![&home_pair()]);

        Ok(())
    }

    #[test]
    fn select_unknown_pair_is_an_error() {
        let config = Config {
            global: GlobalSettings::default(),
            pairs: vec![home_pair()],
        };

        let result = config.select(Some("root"));

        assert!(matches!(
            result,
            Err(ConfigError::UnknownPair { name }) if name == "root"
        ));
    }

    #[test]
    fn retention_policies_split_per_location() {
        let pair = home_pair();

        assert_eq!(pair.source_retention(), RetentionPolicy::new(30, 5));
        assert_eq!(pair.target_retention(), RetentionPolicy::new(90, 10));
    }
}
