use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::error::{MediaFfmpegError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs `command` to completion and returns its stdout.
///
/// The child is polled rather than waited on so a raised `cancel` flag kills
/// it promptly. Stdout and stderr are drained on helper threads; large raw
/// frames would otherwise fill the pipe and stall the child.
pub(crate) fn run_cancellable(
    mut command: Command,
    command_line: String,
    cancel: &AtomicBool,
) -> Result<Vec<u8>> {
    if cancel.load(Ordering::Acquire) {
        return Err(MediaFfmpegError::Cancelled { command: command_line });
    }

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command.spawn().map_err(|source| MediaFfmpegError::Io {
        context: "spawn media command",
        source,
    })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if cancel.load(Ordering::Acquire) {
                    // Readers are left detached; a grandchild may still hold the pipes.
                    kill(&mut child, &command_line);
                    drop((stdout, stderr));
                    return Err(MediaFfmpegError::Cancelled { command: command_line });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(source) => {
                kill(&mut child, &command_line);
                return Err(MediaFfmpegError::Io {
                    context: "wait for media command",
                    source,
                });
            }
        }
    };

    let stdout = join_drain(stdout)?;
    let stderr = join_drain(stderr)?;
    if !status.success() {
        return Err(MediaFfmpegError::CommandFailed {
            command: command_line,
            status,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        });
    }

    Ok(stdout)
}

fn drain<R>(pipe: Option<R>) -> Option<JoinHandle<std::io::Result<Vec<u8>>>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            pipe.read_to_end(&mut buffer)?;
            Ok(buffer)
        })
    })
}

fn join_drain(handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<Vec<u8>> {
    let Some(handle) = handle else {
        return Ok(Vec::new());
    };
    match handle.join() {
        Ok(result) => result.map_err(|source| MediaFfmpegError::Io {
            context: "read media command output",
            source,
        }),
        Err(_) => Err(MediaFfmpegError::Io {
            context: "read media command output",
            source: std::io::Error::other("pipe reader panicked"),
        }),
    }
}

fn kill(child: &mut Child, command_line: &str) {
    debug!(command = %command_line, pid = child.id(), "killing media command");
    let _ = child.kill();
    let _ = child.wait();
}
