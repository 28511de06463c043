//! Individual Step Execution
//!
//! Runs one fully expanded command through the host shell and relays its
//! output line by line while it runs. Reading both pipes, waiting for exit
//! and polling for operator interrupts all happen in a `select!` loop; no
//! helper threads are involved.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use super::interrupt::{Interrupt, Interrupts};
use super::report::{Reporter, Stream};

/// How often the interrupt flags are checked while a step runs.
const INTERRUPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long output is still relayed once the shell itself has exited.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Time a terminated step gets to exit before it is killed outright.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// How a step's process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Exit code, `None` when killed by a signal
    Exited(Option<i32>),
    /// Stopped by the operator
    Interrupted(Interrupt),
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Exited(Some(0)))
    }
}

/// Builds the host shell invocation for a command string.
fn shell_command(command_text: &str) -> Command {
    #[cfg(unix)]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_text);
        // Own process group, so terminal Ctrl-C reaches only the runner and
        // termination can take the whole pipeline down.
        cmd.process_group(0);
        cmd
    }

    #[cfg(not(unix))]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command_text);
        cmd
    }
}

/// Executes a command and streams its output to `reporter`.
///
/// Returns once the shell has exited, or as soon as an interrupt is observed
/// (the process is terminated first). The exit status alone decides the
/// outcome: an interrupt that arrives after exit is left for the caller.
///
/// # Errors
///
/// Fails only if the shell cannot be spawned or its pipes fail; a non-zero
/// exit is reported through [`StepOutcome::Exited`].
pub async fn run_command(
    command_text: &str,
    working_dir: Option<&Path>,
    reporter: &mut dyn Reporter,
    interrupts: &Interrupts,
) -> io::Result<StepOutcome> {
    let mut cmd = shell_command(command_text);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
        debug!("Executing in directory: {}", dir.display());
    }

    let mut child = cmd.spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child stderr not captured"))?;

    let mut stdout = BufReader::new(stdout).split(b'\n');
    let mut stderr = BufReader::new(stderr).split(b'\n');
    let mut stdout_open = true;
    let mut stderr_open = true;
    let start = tokio::time::Instant::now() + INTERRUPT_POLL_INTERVAL;
    let mut ticker = tokio::time::interval_at(start, INTERRUPT_POLL_INTERVAL);

    let status = loop {
        tokio::select! {
            biased;

            status = child.wait() => break status?,
            segment = stdout.next_segment(), if stdout_open => match segment? {
                Some(bytes) => reporter.output(Stream::Stdout, &decode_line(&bytes)),
                None => stdout_open = false,
            },
            segment = stderr.next_segment(), if stderr_open => match segment? {
                Some(bytes) => reporter.output(Stream::Stderr, &decode_line(&bytes)),
                None => stderr_open = false,
            },
            _ = ticker.tick() => {
                if let Some(interrupt) = interrupts.poll() {
                    terminate(&mut child).await;
                    return Ok(StepOutcome::Interrupted(interrupt));
                }
            }
        }
    };

    // Relay what is still buffered. A background job that inherited the
    // pipes can keep them open indefinitely, so this is bounded.
    let drain = async {
        loop {
            tokio::select! {
                segment = stdout.next_segment(), if stdout_open => match segment? {
                    Some(bytes) => reporter.output(Stream::Stdout, &decode_line(&bytes)),
                    None => stdout_open = false,
                },
                segment = stderr.next_segment(), if stderr_open => match segment? {
                    Some(bytes) => reporter.output(Stream::Stderr, &decode_line(&bytes)),
                    None => stderr_open = false,
                },
                else => break,
            }
        }
        Ok::<(), io::Error>(())
    };
    match tokio::time::timeout(DRAIN_TIMEOUT, drain).await {
        Ok(drained) => drained?,
        Err(_) => debug!("Output pipes still held open after exit, not waiting for them"),
    }

    Ok(StepOutcome::Exited(status.code()))
}

/// Asks the step's process group to stop, then kills it after a grace period.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let group = Pid::from_raw(pid as i32);
            if let Err(e) = killpg(group, Signal::SIGTERM) {
                debug!("SIGTERM to process group {} failed: {}", pid, e);
            }
            if tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_ok() {
                return;
            }
            let _ = killpg(group, Signal::SIGKILL);
        }
    }

    if let Err(e) = child.kill().await {
        warn!("Failed to kill step process: {}", e);
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let line = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(line).into_owned()
}
