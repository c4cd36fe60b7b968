// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Running control-plane CLIs (`docker`, `kubectl`).

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::BackendError;

/// Run `program args...`, optionally feeding `stdin`, and return its stdout.
///
/// A non-zero exit whose stderr matches one of `not_found_markers` becomes
/// [`BackendError::ResourceNotFound`]; any other non-zero exit becomes
/// [`BackendError::Command`].
pub(crate) async fn run(
    program: &str,
    args: &[String],
    stdin: Option<&[u8]>,
    not_found_markers: &[&str],
) -> Result<String, BackendError> {
    debug!(program, args = ?args, "Running control-plane command");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BackendError::Spawn(format!("{program} not found on PATH"))
        } else {
            BackendError::Io(e)
        }
    })?;

    if let Some(input) = stdin
        && let Some(mut pipe) = child.stdin.take()
    {
        pipe.write_all(input).await?;
        pipe.shutdown().await?;
    }

    let output = child.wait_with_output().await?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        return Ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if not_found_markers.iter().any(|m| stderr.contains(m)) {
        return Err(BackendError::ResourceNotFound(stderr));
    }
    Err(BackendError::Command {
        program: program.to_string(),
        status: output.status.to_string(),
        stderr,
    })
}
