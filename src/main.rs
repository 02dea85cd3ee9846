// SPDX-FileCopyrightText: 2025 Snapkeep Contributors
// SPDX-License-Identifier: MIT

use snapkeep::{
    config::{BackupPair, Config, Location},
    exec::{BtrfsExecutor, DryRunExecutor, Executor, Operation},
    path::default_config_path,
    plan::{
        replicate,
        retain::{self, RetentionPolicy},
    },
    snapshot::{self, Snapshot},
};

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use inquire::Confirm;
use std::{
    fs,
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "snapkeep [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, value_name = "path", global = true)]
    config: Option<PathBuf>,

    /// Report planned commands without executing them.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config_path = match &self.config {
            Some(path) => path.clone(),
            None => default_config_path()?,
        };

        match self.command {
            Command::Init(opts) => run_init(&config_path, opts),
            Command::Snapshot(opts) => run_snapshot(&load_config(&config_path)?, self.dry_run, opts),
            Command::Backup(opts) => run_backup(&load_config(&config_path)?, self.dry_run, opts),
            Command::Purge(opts) => run_purge(&load_config(&config_path)?, self.dry_run, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Write a starter configuration file.
    #[command(override_usage = "snapkeep init [options]")]
    Init(InitOptions),

    /// Create a read-only snapshot of each selected source.
    #[command(override_usage = "snapkeep snapshot [options] <--pair <name>|--all>")]
    Snapshot(SnapshotOptions),

    /// Replicate missing snapshots from source to target.
    #[command(override_usage = "snapkeep backup [options] <--pair <name>|--all>")]
    Backup(BackupOptions),

    /// Delete snapshots that fall out of retention.
    #[command(override_usage = "snapkeep purge [options] <--pair <name>|--all>")]
    Purge(PurgeOptions),
}

#[derive(Parser, Clone, Debug)]
struct InitOptions {
    /// Overwrite an existing configuration file.
    #[arg(long)]
    pub force: bool,
}

/// Pair selection shared by every lifecycle command.
#[derive(Args, Clone, Debug)]
#[group(required = true, multiple = false)]
struct SelectOptions {
    /// Operate on one configured backup pair.
    #[arg(short, long, value_name = "name")]
    pub pair: Option<String>,

    /// Operate on every configured backup pair.
    #[arg(short, long)]
    pub all: bool,
}

#[derive(Parser, Clone, Debug)]
struct SnapshotOptions {
    #[command(flatten)]
    pub select: SelectOptions,

    /// Free-text label appended to the generated snapshot name.
    #[arg(short, long, value_name = "label")]
    pub suffix: Option<String>,
}

#[derive(Parser, Clone, Debug)]
struct BackupOptions {
    #[command(flatten)]
    pub select: SelectOptions,
}

#[derive(Parser, Clone, Debug)]
struct PurgeOptions {
    #[command(flatten)]
    pub select: SelectOptions,

    /// Skip the confirmation prompt before deleting.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

fn main() {
    let cli = Cli::parse();

    let layer = fmt::layer().compact();
    let fallback = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap();
    tracing_subscriber::registry().with(layer).with(filter).init();

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn load_config(config_path: &Path) -> Result<Config> {
    let data = fs::read_to_string(config_path)
        .with_context(|| format!("cannot read configuration at {}", config_path.display()))?;
    let config: Config = data.parse()?;
    info!(
        "loaded {} backup pair(s) from {}",
        config.pairs.len(),
        config_path.display()
    );

    Ok(config)
}

/// Pick the executor honoring the dry-run contract.
///
/// Either the CLI flag or the standing switch in the configuration file puts
/// the whole run into rehearsal mode.
fn executor_for(config: &Config, dry_run: bool) -> (Box<dyn Executor>, bool) {
    if dry_run || config.global.dry_run {
        (Box::new(DryRunExecutor), true)
    } else {
        (Box::new(BtrfsExecutor), false)
    }
}

fn run_init(config_path: &Path, opts: InitOptions) -> Result<()> {
    if config_path.exists() && !opts.force {
        bail!(
            "configuration already exists at {}; pass --force to overwrite",
            config_path.display()
        );
    }

    let mut starter = Config::default();
    starter.pairs.push(BackupPair {
        name: "example".into(),
        source: Location::new("<put path to source subvolume here>"),
        target: Location::new("<put path to backup target here>"),
        retention_days: 30,
        retention_count: 5,
        target_retention_days: 90,
        target_retention_count: 10,
    });

    if let Some(parent) = config_path.parent() {
        mkdirp::mkdirp(parent)
            .with_context(|| format!("cannot create directory {}", parent.display()))?;
    }
    fs::write(config_path, starter.to_string())
        .with_context(|| format!("cannot write configuration at {}", config_path.display()))?;
    info!("wrote starter configuration to {}", config_path.display());

    Ok(())
}

fn run_snapshot(config: &Config, dry_run: bool, opts: SnapshotOptions) -> Result<()> {
    let (executor, _) = executor_for(config, dry_run);
    // One clock reading stamps every pair in the run.
    let now = Local::now().naive_local();

    for pair in config.select(opts.select.pair.as_deref())? {
        let snapshot = Snapshot::generate(now, opts.suffix.as_deref());
        info!("pair '{}': new snapshot {snapshot}", pair.name);

        executor.apply(&Operation::Snapshot {
            subvolume: pair.source.as_path().to_path_buf(),
            destination: pair.source.snapshot_path(snapshot.name()),
        })?;
    }

    Ok(())
}

fn run_backup(config: &Config, dry_run: bool, opts: BackupOptions) -> Result<()> {
    let (executor, _) = executor_for(config, dry_run);

    for pair in config.select(opts.select.pair.as_deref())? {
        info!("processing backup for pair '{}'", pair.name);
        info!("source: {} -> target: {}", pair.source, pair.target);

        let source = snapshot::scan(pair.source.as_path());
        let target = snapshot::scan(pair.target.as_path());
        if source.is_empty() {
            info!("no snapshots found in source {}", pair.source);
            continue;
        }

        let plan = replicate::plan(&source, &target);
        if plan.is_empty() {
            info!("backup is up to date for pair '{}'", pair.name);
            continue;
        }

        for step in plan.steps() {
            executor.apply(&Operation::Send {
                snapshot: pair.source.snapshot_path(step.snapshot.name()),
                parent: step
                    .parent
                    .as_ref()
                    .map(|parent| pair.source.snapshot_path(parent.name())),
                target: pair.target.as_path().to_path_buf(),
            })?;
        }
    }

    Ok(())
}

fn run_purge(config: &Config, dry_run: bool, opts: PurgeOptions) -> Result<()> {
    let (executor, dry_run) = executor_for(config, dry_run);
    let now = Local::now().naive_local();

    for pair in config.select(opts.select.pair.as_deref())? {
        info!("processing purge for pair '{}'", pair.name);
        purge_location(
            &pair.source,
            &pair.source_retention(),
            now,
            executor.as_ref(),
            dry_run || opts.yes,
        )?;
        purge_location(
            &pair.target,
            &pair.target_retention(),
            now,
            executor.as_ref(),
            dry_run || opts.yes,
        )?;
    }

    Ok(())
}

/// Purge one location under its own policy.
///
/// Each location carries independent thresholds, so source and target are
/// handled as separate calls that know nothing of each other.
fn purge_location(
    location: &Location,
    policy: &RetentionPolicy,
    now: NaiveDateTime,
    executor: &dyn Executor,
    skip_confirmation: bool,
) -> Result<()> {
    info!(
        "retention policy for {location}: {} day(s), keep {}",
        policy.days(),
        policy.count()
    );

    let snapshots = snapshot::scan(location.as_path());
    let decision = retain::plan(&snapshots, policy, now);
    if decision.is_empty() {
        return Ok(());
    }

    if !skip_confirmation {
        let proceed = Confirm::new(&format!(
            "delete {} snapshot(s) from {}?",
            decision.expired().len(),
            location
        ))
        .with_default(false)
        .prompt()?;
        if !proceed {
            info!("leaving {location} untouched");
            return Ok(());
        }
    }

    // Delete oldest first so an interrupted purge keeps the newest history.
    for snapshot in decision.expired().iter().rev() {
        executor.apply(&Operation::Delete {
            snapshot: location.snapshot_path(snapshot.name()),
        })?;
    }

    Ok(())
}
