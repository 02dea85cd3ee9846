// SPDX-FileCopyrightText: 2025 Snapkeep Contributors
// SPDX-License-Identifier: MIT

//! Operation execution.
//!
//! Planners produce values; something still has to run `btrfs`. An
//! [`Operation`] is the bridge: a structured description of exactly one
//! privileged command, rendered through [`Display`] into the same command
//! shape an administrator would type by hand. Executors consume operations
//! behind the [`Executor`] seam, so the rest of the tool neither knows nor
//! cares whether a run is real or a rehearsal.
//!
//! Every apply is traced with the rendered command, real or not. A dry run
//! therefore produces a complete, copy-pasteable audit of what a wet run
//! would have done.

use std::{
    ffi::OsString,
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    process::{Command, Output, Stdio},
};
use tracing::info;

const BTRFS: &str = "btrfs";

/// One privileged filesystem operation.
///
/// Paths arrive fully resolved; an operation never recomputes or expands
/// them. [`Display`] renders the exact command shape, which doubles as the
/// stable interface for log scraping and for humans replaying a dry run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Create a read-only snapshot of a subvolume.
    Snapshot {
        subvolume: PathBuf,
        destination: PathBuf,
    },

    /// Transfer a snapshot into a target location, as a delta against
    /// `parent` when one is given, in full otherwise.
    Send {
        snapshot: PathBuf,
        parent: Option<PathBuf>,
        target: PathBuf,
    },

    /// Delete a snapshot subvolume.
    Delete { snapshot: PathBuf },
}

impl Display for Operation {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Snapshot {
                subvolume,
                destination,
            } => write!(
                fmt,
                "btrfs subvolume snapshot -r {} {}",
                subvolume.display(),
                destination.display()
            ),
            Self::Send {
                snapshot,
                parent: Some(parent),
                target,
            } => write!(
                fmt,
                "btrfs send -p {} {} | btrfs receive {}/",
                parent.display(),
                snapshot.display(),
                target.display()
            ),
            Self::Send {
                snapshot,
                parent: None,
                target,
            } => write!(
                fmt,
                "btrfs send {} | btrfs receive {}/",
                snapshot.display(),
                target.display()
            ),
            Self::Delete { snapshot } => {
                write!(fmt, "btrfs subvolume delete {}", snapshot.display())
            }
        }
    }
}

/// What became of one applied operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Operation was reported without running anything.
    Skipped,

    /// Operation ran to completion; combined process output, newline-chomped.
    Completed { output: String },
}

/// Layer of indirection for operation execution.
pub trait Executor {
    /// Apply one operation.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::Syscall`] if the external process cannot be
    ///   spawned or waited on.
    /// - Return [`ExecError::CommandFailed`] if it exits unsuccessfully.
    fn apply(&self, operation: &Operation) -> Result<Outcome>;
}

/// Executor that reports instead of running.
///
/// Honors the dry-run contract: every operation is logged in its rendered
/// command shape and nothing on disk changes.
#[derive(Clone, Copy, Debug, Default)]
pub struct DryRunExecutor;

impl Executor for DryRunExecutor {
    fn apply(&self, operation: &Operation) -> Result<Outcome> {
        info!("[dry-run] would execute: {operation}");

        Ok(Outcome::Skipped)
    }
}

/// Executor that invokes the btrfs binary.
#[derive(Clone, Copy, Debug, Default)]
pub struct BtrfsExecutor;

impl Executor for BtrfsExecutor {
    fn apply(&self, operation: &Operation) -> Result<Outcome> {
        info!("executing: {operation}");
        let output = match operation {
            Operation::Snapshot {
                subvolume,
                destination,
            } => run_single(
                operation,
                vec![
                    "subvolume".into(),
                    "snapshot".into(),
                    "-r".into(),
                    subvolume.as_os_str().into(),
                    destination.as_os_str().into(),
                ],
            )?,
            Operation::Send {
                snapshot,
                parent,
                target,
            } => {
                let mut send_args: Vec<OsString> = vec!["send".into()];
                if let Some(parent) = parent {
                    send_args.push("-p".into());
                    send_args.push(parent.as_os_str().into());
                }
                send_args.push(snapshot.as_os_str().into());

                run_pipeline(
                    operation,
                    send_args,
                    vec!["receive".into(), target.as_os_str().into()],
                )?
            }
            Operation::Delete { snapshot } => run_single(
                operation,
                vec![
                    "subvolume".into(),
                    "delete".into(),
                    snapshot.as_os_str().into(),
                ],
            )?,
        };

        if !output.is_empty() {
            info!("{output}");
        }

        Ok(Outcome::Completed { output })
    }
}

fn run_single(operation: &Operation, args: Vec<OsString>) -> Result<String> {
    let output = Command::new(BTRFS).args(&args).output()?;
    let message = gather(&output);

    if !output.status.success() {
        return Err(ExecError::CommandFailed {
            command: operation.to_string(),
            output: message,
        });
    }

    Ok(message)
}

fn run_pipeline(
    operation: &Operation,
    send_args: Vec<OsString>,
    receive_args: Vec<OsString>,
) -> Result<String> {
    let mut send = Command::new(BTRFS)
        .args(&send_args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let Some(stream) = send.stdout.take() else {
        return Err(ExecError::Syscall(std::io::Error::other(
            "send stream was not piped",
        )));
    };

    let receive = Command::new(BTRFS)
        .args(&receive_args)
        .stdin(Stdio::from(stream))
        .output()?;
    let send = send.wait_with_output()?;

    let mut message = gather(&send);
    let rest = gather(&receive);
    if !message.is_empty() && !rest.is_empty() {
        message.push('\n');
    }
    message.push_str(&rest);

    if !send.status.success() || !receive.status.success() {
        return Err(ExecError::CommandFailed {
            command: operation.to_string(),
            output: message,
        });
    }

    Ok(message)
}

fn gather(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(output.stdout.as_slice());
    let stderr = String::from_utf8_lossy(output.stderr.as_slice());
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message)
}

/// Operation execution error types.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// External process cannot be spawned or waited on.
    #[error(transparent)]
    Syscall(#[from] std::io::Error),

    /// External command ran but exited unsuccessfully.
    #[error("command `{command}` failed:\n{output}")]
    CommandFailed { command: String, output: String },
}

/// Friendly result alias :3
pub type Result<T, E = ExecError> = std::result::Result<T, E>;
