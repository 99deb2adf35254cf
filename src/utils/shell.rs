use std::env;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use colored::Colorize;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::errors::ProviError;

/// Value returned by a streaming line callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineHandled {
    Continue,
    /// Stop consuming output and terminate the child early.
    Stop,
}

/// Executes:
/// ```shell
/// {cmd} {args}
/// ```
/// and fails on any non-zero exit status.
pub fn exec(cmd: &str, args: &[&str]) -> Result<(), ProviError> {
    let child = Command::new(cmd).args(args).spawn();

    match child {
        Ok(mut result) => match result.wait() {
            // Spawned but may still fail
            Ok(r) => match r.code() {
                Some(0) => Ok(()),
                Some(code) => Err(ProviError::CmdFailed {
                    error: None,
                    context: format!(
                        "command {cmd} exited with non-zero status {code}"
                    ),
                }),
                None => Err(ProviError::CmdFailed {
                    error: None,
                    context: format!("command {cmd} terminated by signal"),
                }),
            },
            Err(err) => Err(ProviError::CmdFailed {
                error: Some(err),
                context: format!("command {cmd} failed to run"),
            }),
        },

        // Failed to spawn
        Err(err) => Err(ProviError::CmdFailed {
            error: Some(err),
            context: format!("command {cmd} failed to spawn"),
        }),
    }
}

/// Like [`exec`], but captures and returns stdout.
pub fn exec_capture(cmd: &str, args: &[&str]) -> Result<String, ProviError> {
    let output =
        Command::new(cmd)
            .args(args)
            .output()
            .map_err(|err| ProviError::CmdFailed {
                error: Some(err),
                context: format!("command {cmd} failed to spawn"),
            })?;

    if !output.status.success() {
        return Err(ProviError::CmdFailed {
            error: None,
            context: format!(
                "command {cmd} exited with non-zero status {:?}",
                output.status.code()
            ),
        });
    }

    String::from_utf8(output.stdout).map_err(|err| {
        ProviError::Bug(format!("{cmd} output not utf-8: {err}"))
    })
}

/// Like [`exec`], but pipes `input` to the child's stdin.
pub fn exec_stdin(
    cmd: &str,
    args: &[&str],
    input: &str,
) -> Result<(), ProviError> {
    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::piped())
        .spawn()
        .map_err(|err| ProviError::CmdFailed {
            error: Some(err),
            context: format!("command {cmd} failed to spawn"),
        })?;

    // Scoped so stdin is closed before waiting
    {
        let stdin = child.stdin.as_mut().ok_or_else(|| {
            ProviError::Bug(format!("no stdin handle for {cmd}"))
        })?;

        stdin
            .write_all(input.as_bytes())
            .map_err(|err| ProviError::CmdFailed {
                error: Some(err),
                context: format!("failed writing stdin of {cmd}"),
            })?;
    }

    let status = child.wait().map_err(|err| ProviError::CmdFailed {
        error: Some(err),
        context: format!("command {cmd} failed to run"),
    })?;

    if !status.success() {
        return Err(ProviError::CmdFailed {
            error: None,
            context: format!(
                "command {cmd} exited with non-zero status {:?}",
                status.code()
            ),
        });
    }

    Ok(())
}

/// Runs `cmd`, streaming each stdout line to `on_line`. The callback
/// may return [`LineHandled::Stop`] to terminate the child early, in
/// which case the early exit is not an error.
///
/// Long-running external tools (unsquashfs, dpkg) report progress on
/// stdout; stderr is passed through untouched.
pub fn exec_streamed<F>(
    cmd: &str,
    args: &[&str],
    mut on_line: F,
) -> Result<(), ProviError>
where
    F: FnMut(&str) -> LineHandled,
{
    let mut child = Command::new(cmd)
        .args(args)
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|err| ProviError::CmdFailed {
            error: Some(err),
            context: format!("command {cmd} failed to spawn"),
        })?;

    let stdout = child.stdout.take().ok_or_else(|| {
        ProviError::Bug(format!("no stdout handle for {cmd}"))
    })?;

    let reader = BufReader::new(stdout);
    for line in reader.lines() {
        let line = line.map_err(|err| ProviError::CmdFailed {
            error: Some(err),
            context: format!("failed reading output of {cmd}"),
        })?;

        if on_line(&line) == LineHandled::Stop {
            terminate(&mut child, cmd);
            return Ok(());
        }
    }

    let status = child.wait().map_err(|err| ProviError::CmdFailed {
        error: Some(err),
        context: format!("command {cmd} failed to run"),
    })?;

    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(ProviError::CmdFailed {
            error: None,
            context: format!(
                "command {cmd} exited with non-zero status {code}"
            ),
        }),
        None => Err(ProviError::CmdFailed {
            error: None,
            context: format!("command {cmd} terminated by signal"),
        }),
    }
}

// SIGTERM, bounded wait, SIGKILL, bounded wait. A child that survives
// both is left for the kernel to reap; we log and move on rather than
// hang the installer.
fn terminate(child: &mut Child, cmd: &str) {
    let pid = Pid::from_raw(child.id() as i32);
    let _ = signal::kill(pid, Signal::SIGTERM);

    if reaped(child, 50) {
        return;
    }

    let _ = signal::kill(pid, Signal::SIGKILL);
    if reaped(child, 20) {
        return;
    }

    eprintln!(
        "{}",
        format!("WARN: process {cmd} ({pid}) survived SIGKILL, not waiting")
            .yellow()
    );
}

fn reaped(child: &mut Child, attempts: u32) -> bool {
    for _ in 0..attempts {
        if let Ok(Some(_)) = child.try_wait() {
            return true;
        }
        thread::sleep(Duration::from_millis(100));
    }

    false
}

/// Executes `cmd` inside the chroot at `location`:
/// ```shell
/// chroot {location} {cmd} {args}
/// ```
pub fn chroot(
    location: &str,
    cmd: &str,
    args: &[&str],
) -> Result<(), ProviError> {
    let mut full = vec![location, cmd];
    full.extend(args);

    exec("chroot", &full)
}

pub fn in_path(program: &str) -> bool {
    if let Ok(path) = env::var("PATH") {
        for p in path.split(':') {
            let p_str = format!("{}/{}", p, program);
            if fs::metadata(p_str).is_ok() {
                return true;
            }
        }
    }

    false
}
