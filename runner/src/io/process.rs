//! Process-exec collaborator: run argv with a timeout and bounded output.

use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::error::ApplyError;

/// Captured result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when killed by a signal or timeout.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.code == Some(0)
    }
}

/// Runs external commands. Tests substitute scripted runners.
pub trait ProcessRunner {
    fn run(&self, argv: &[String]) -> Result<ProcessOutput>;
}

/// Run `argv` and turn a non-zero exit into an [`ApplyError`].
pub fn run_checked<R: ProcessRunner + ?Sized>(
    runner: &R,
    argv: &[String],
) -> Result<ProcessOutput> {
    let output = runner.run(argv)?;
    if output.timed_out {
        return Err(ApplyError::CommandTimedOut {
            command: argv.join(" "),
        }
        .into());
    }
    if output.code != Some(0) {
        return Err(ApplyError::CommandFailed {
            command: argv.join(" "),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        }
        .into());
    }
    Ok(output)
}

/// Spawns real child processes.
///
/// Stdout and stderr are drained on their own threads while the child runs,
/// so a chatty command cannot block on a full pipe. Only the first
/// `output_limit_bytes` of each stream are kept.
#[derive(Debug, Clone)]
pub struct SystemProcessRunner {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, argv: &[String]) -> Result<ProcessOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("empty command line"))?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        self.spawn_and_wait(cmd)
            .with_context(|| format!("run `{}`", argv.join(" ")))
    }
}

impl SystemProcessRunner {
    #[instrument(skip_all, fields(program = ?cmd.get_program()))]
    fn spawn_and_wait(&self, mut cmd: Command) -> Result<ProcessOutput> {
        let mut child = cmd.spawn().context("spawn command")?;
        let stdout = child.stdout.take().context("stdout was not piped")?;
        let stderr = child.stderr.take().context("stderr was not piped")?;
        let limit = self.output_limit_bytes as u64;
        let stdout = thread::spawn(move || capture(stdout, limit));
        let stderr = thread::spawn(move || capture(stderr, limit));

        let waited = child.wait_timeout(self.timeout).context("wait for command")?;
        let (status, timed_out) = match waited {
            Some(status) => (status, false),
            None => {
                warn!(timeout_secs = self.timeout.as_secs(), "command timed out, killing");
                child.kill().context("kill command")?;
                (child.wait().context("wait for killed command")?, true)
            }
        };

        let stdout = stdout
            .join()
            .map_err(|_| anyhow!("stdout reader panicked"))??;
        let stderr = stderr
            .join()
            .map_err(|_| anyhow!("stderr reader panicked"))??;
        debug!(code = ?status.code(), timed_out, "command finished");
        Ok(ProcessOutput {
            code: status.code(),
            stdout,
            stderr,
            timed_out,
        })
    }
}

/// Keep the first `limit` bytes of `stream` and discard the rest.
fn capture<R: Read>(mut stream: R, limit: u64) -> Result<String> {
    let mut kept = Vec::new();
    (&mut stream)
        .take(limit)
        .read_to_end(&mut kept)
        .context("read output")?;
    io::copy(&mut stream, &mut io::sink()).context("drain output")?;
    Ok(String::from_utf8_lossy(&kept).into_owned())
}
