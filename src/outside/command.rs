use std::{
    io,
    process::{Child, Command, Output, Stdio},
    time::{Duration, Instant},
};

use bitflags::bitflags;
use tracing::{debug, trace, warn};

use crate::result::{err_msg, Result};

pub const FFPROBE: &str = "ffprobe";
pub const FFXXX_DEFAULT_ARGS: [&str; 3] = ["-hide_banner", "-loglevel", "error"];

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

bitflags! {
    pub struct Capture: u8 {
        const STDIN = 0b0000001;
        const STDOUT = 0b0000010;
        const STDERR = 0b0000100;
    }
}

/// Run a command, returning its raw output handle.
///
/// IO handles will be captured only if the caller required it or if the log level is Debug.
/// In that last case, `stdout` and `stderr` will be logged.
///
/// With a deadline, the child is polled until it exits; once the deadline
/// fires it is asked to terminate. Termination is best-effort: the output
/// collected afterwards goes through the caller's classification as usual.
///
/// The function returns an error only if the command failed to execute.
/// If the program runs but returns a non-0 status code, it will not trigger an error.
pub fn run_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
    capture: Capture,
    timeout: Option<Duration>,
) -> io::Result<Output> {
    let is_debug = tracing::enabled!(tracing::Level::DEBUG);
    let get_io = |capture| {
        if capture {
            Stdio::piped()
        } else {
            Stdio::null()
        }
    };

    let mut cmd = Command::new(program);
    let cmd = f(&mut cmd)
        .stdin(get_io(capture.contains(Capture::STDIN)))
        .stdout(get_io(is_debug || capture.contains(Capture::STDOUT)))
        .stderr(get_io(is_debug || capture.contains(Capture::STDERR)));

    debug!("Executing command: {cmd:?}");
    let res = match timeout {
        None => cmd.output()?,
        Some(limit) => wait_with_deadline(cmd.spawn()?, limit)?,
    };

    if is_debug {
        debug!("status: {}", res.status);
        debug!("stdout: {} bytes long", res.stdout.len());
        trace!("stdout: {:?}", String::from_utf8_lossy(&res.stdout));
        debug!("stderr: {} bytes long", res.stderr.len());
        trace!("stderr: {:?}", String::from_utf8_lossy(&res.stderr));
    }

    Ok(res)
}

/// Poll the child until it exits or the deadline fires.
fn wait_with_deadline(mut child: Child, limit: Duration) -> io::Result<Output> {
    let deadline = Instant::now() + limit;

    loop {
        match child.try_wait()? {
            Some(_) => return child.wait_with_output(),
            None if Instant::now() >= deadline => {
                warn!(
                    "Process still running after {}s, requesting termination",
                    limit.as_secs()
                );
                // The process is asked to stop, not guaranteed to stop instantly
                let _ = child.kill();
                return child.wait_with_output();
            }
            None => std::thread::sleep(WAIT_POLL_INTERVAL),
        }
    }
}

/// Run the command and verify that it has returned a success status code.
pub fn assert_success_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
) -> Result<()> {
    let res = run_command(program, f, Capture::empty(), None)?;
    if res.status.success() {
        Ok(())
    } else {
        Err(err_msg("Command did run but was not successful"))
    }
}
