//! Subprocess execution with live output streaming.
//!
//! Test runners and git commands are spawned through [`run_streaming`], which
//! tees stdout and stderr into one buffer and the console sink at the same
//! time, or [`run_captured`] for short queries whose output is parsed.

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::cancel::CancelToken;
use crate::error::ProcessError;
use crate::output::ConsoleSink;

/// Exit status and combined output of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    /// Stdout and stderr interleaved in arrival order.
    pub output: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Renders `program args...` as a shell-quoted command line.
pub fn format_command(program: &str, args: &[String]) -> String {
    shell_words::join(std::iter::once(program).chain(args.iter().map(String::as_str)))
}

/// `exit status N` (or `signal: N`) for a non-zero exit.
pub fn describe_exit(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exit status {code}"),
        (None, Some(signal)) => format!("signal: {signal}"),
        (None, None) => status.to_string(),
    }
}

enum Outcome {
    Finished(io::Result<()>, io::Result<ExitStatus>),
    Cancelled,
    TimedOut(Duration),
}

/// Runs `program` in `dir`, streaming its output through `sink`.
///
/// A non-zero exit is not an error; inspect [`CommandOutput::status`].
/// Cancellation or an expired `timeout` kills the child.
pub async fn run_streaming(
    dir: &Path,
    program: &str,
    args: &[String],
    sink: &dyn ConsoleSink,
    cancel: &CancelToken,
    timeout: Option<Duration>,
) -> Result<CommandOutput, ProcessError> {
    let command_line = format_command(program, args);
    sink.command_line(&command_line);
    debug!(dir = %dir.display(), command = %command_line, "Running command");

    if cancel.is_cancelled() {
        return Err(ProcessError::Cancelled);
    }

    let mut child = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let buffer = Mutex::new(Vec::new());

    let outcome = {
        let run = async {
            let (out, err) = tokio::join!(
                tee(stdout, &buffer, sink),
                tee(stderr, &buffer, sink)
            );
            let status = child.wait().await;
            (out.and(err), status)
        };
        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            (streamed, status) = run => Outcome::Finished(streamed, status),
            _ = cancel.cancelled() => Outcome::Cancelled,
            _ = deadline => Outcome::TimedOut(timeout.unwrap_or_default()),
        }
    };

    let (streamed, status) = match outcome {
        Outcome::Finished(streamed, status) => (streamed, status),
        Outcome::Cancelled => {
            warn!(command = %command_line, "Command cancelled, killing process");
            kill(&mut child).await;
            return Err(ProcessError::Cancelled);
        }
        Outcome::TimedOut(limit) => {
            warn!(command = %command_line, timeout = ?limit, "Command timed out, killing process");
            kill(&mut child).await;
            return Err(ProcessError::TimedOut(limit));
        }
    };

    let status = status.map_err(|source| ProcessError::Stream {
        program: program.to_string(),
        source,
    })?;
    streamed.map_err(|source| ProcessError::Stream {
        program: program.to_string(),
        source,
    })?;

    let output = buffer.into_inner().unwrap_or_else(PoisonError::into_inner);
    debug!(command = %command_line, status = %status, bytes = output.len(), "Command finished");
    Ok(CommandOutput { status, output })
}

/// Runs a short query and returns its stdout. A non-zero exit is an error
/// carrying the trimmed stderr.
pub async fn run_captured(dir: &Path, program: &str, args: &[String]) -> Result<Vec<u8>, ProcessError> {
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stderr = if stderr.is_empty() {
            describe_exit(&output.status)
        } else {
            stderr
        };
        return Err(ProcessError::Failed {
            command: format_command(program, args),
            stderr,
        });
    }
    Ok(output.stdout)
}

async fn kill(child: &mut tokio::process::Child) {
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Failed to kill child process");
    }
}

/// Copies `reader` into `buffer` and `sink` chunk by chunk. The buffer lock
/// is held while forwarding so both observe the same byte order.
async fn tee<R>(reader: Option<R>, buffer: &Mutex<Vec<u8>>, sink: &dyn ConsoleSink) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(());
    };
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        let mut guard = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        guard.extend_from_slice(&chunk[..n]);
        sink.command_output(&chunk[..n]);
    }
}
