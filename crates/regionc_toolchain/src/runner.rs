use std::io::{self, Read};
use std::process::Command;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use duct::ReaderHandle;

use regionc_utils::Stopwatch;
use tracing::{debug, warn};

use crate::invocation::{ToolInvocation, ToolOutput, ToolStatus};

/// Runs external tools. Swapped for a fake in tests.
pub trait ProcessRunner: Send + Sync {
    /// Runs the invocation to completion or until its timeout.
    ///
    /// An `Err` means the process could not be started or observed; a tool
    /// that ran and failed is reported through [`ToolOutput::status`].
    fn run(&self, invocation: &ToolInvocation) -> io::Result<ToolOutput>;
}

/// Spawns real processes through `duct`, with stderr merged into stdout.
#[derive(Debug, Clone)]
pub struct DuctRunner {
    poll_interval: Duration,
    /// How long to wait for output after the tool is gone
    output_grace: Duration,
}

impl Default for DuctRunner {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            output_grace: Duration::from_secs(1),
        }
    }
}

impl DuctRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Reads everything the child writes, keeping at most `limit` bytes.
/// Past the limit the buffer is dropped and the rest is drained unread.
fn drain_bounded(mut reader: impl Read, limit: usize) -> io::Result<(Vec<u8>, bool)> {
    let mut captured = Vec::new();
    let mut trimmed = false;
    let mut chunk = [0_u8; 8192];
    loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        if trimmed {
            continue;
        }
        if captured.len() + read > limit {
            trimmed = true;
            captured = Vec::new();
        } else {
            captured.extend_from_slice(&chunk[..read]);
        }
    }
    Ok((captured, trimmed))
}

impl ProcessRunner for DuctRunner {
    fn run(&self, invocation: &ToolInvocation) -> io::Result<ToolOutput> {
        let mut expression = duct::cmd(&invocation.program, &invocation.args)
            .stderr_to_stdout()
            .unchecked()
            .before_spawn(|command| {
                own_process_group(command);
                Ok(())
            });
        if let Some(dir) = &invocation.working_dir {
            expression = expression.dir(dir);
        }

        debug!(command = %invocation, "running tool");
        let stopwatch = Stopwatch::start_new();
        let handle = Arc::new(expression.reader()?);

        // the reader is detached: a surviving grandchild can hold the pipe
        // open long after the tool itself is gone
        let (sender, captured) = mpsc::channel();
        let limit = invocation.max_output_bytes;
        let reader = Arc::clone(&handle);
        thread::spawn(move || {
            let _ = sender.send(drain_bounded(&*reader, limit));
        });

        let status = loop {
            let finished = match handle.try_wait() {
                Ok(finished) => finished,
                Err(err) => {
                    kill_tool(&handle);
                    return Err(err);
                }
            };
            if let Some(output) = finished {
                break match output.status.code() {
                    Some(code) => ToolStatus::Exited(code),
                    None => ToolStatus::Signaled,
                };
            }
            if stopwatch.has_exceeded(invocation.timeout) {
                warn!(
                    command = %invocation,
                    timeout = ?invocation.timeout,
                    "tool timed out, killing it"
                );
                kill_tool(&handle);
                break ToolStatus::TimedOut;
            }
            thread::sleep(self.poll_interval);
        };

        let (bytes, trimmed) = match (captured.recv_timeout(self.output_grace), status) {
            (Ok(Ok(captured)), _) => captured,
            // a killed child may surface as a read error; nothing to salvage
            (Ok(Err(_)), ToolStatus::TimedOut) => (Vec::new(), false),
            (Ok(Err(err)), _) => return Err(err),
            (Err(_), _) => {
                warn!(command = %invocation, "tool output still open after exit, discarding it");
                (Vec::new(), false)
            }
        };
        Ok(ToolOutput {
            status,
            output: String::from_utf8_lossy(&bytes).into_owned(),
            trimmed,
            duration: stopwatch.elapsed(),
        })
    }
}

#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

/// Kills the tool and everything it started.
fn kill_tool(handle: &ReaderHandle) {
    kill_process_groups(&handle.pids());
    if let Err(err) = handle.kill() {
        debug!(error = %err, "kill after timeout failed");
    }
}

#[cfg(unix)]
fn kill_process_groups(pids: &[u32]) {
    for &pid in pids {
        let Ok(group) = libc::pid_t::try_from(pid) else {
            continue;
        };
        // SAFETY: plain syscall; each tool leads the group created at spawn
        unsafe {
            libc::kill(-group, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_groups(_pids: &[u32]) {}
