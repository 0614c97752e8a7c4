//! Bounded invocation of an external sampling tool.
//!
//! macOS has no public API for per-core clocks on Apple Silicon; the only
//! practical source is the privileged `powermetrics` sampler. Spawning it
//! must never hang a poll, so the child runs under a hard wall-clock
//! timeout and is killed and reaped on every failure path.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use regex::Regex;
use tracing::debug;

/// How often the child is polled for exit while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run `command`, capturing stdout, for at most `timeout`.
///
/// On timeout the child is killed and reaped before returning an error, so
/// a hung sampler never outlives the poll that spawned it. A non-zero exit
/// is also an error; callers treat any error as "no data" and fall through
/// to their next strategy.
pub fn capture_with_timeout(command: &mut Command, timeout: Duration) -> Result<String> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to spawn sampler")?;

    // Drain stdout on a separate thread: the child can fill the pipe and
    // block before exiting if nobody reads it.
    let mut stdout = child
        .stdout
        .take()
        .context("sampler stdout was not captured")?;
    let reader = thread::spawn(move || {
        let mut buf = String::new();
        let _ = stdout.read_to_string(&mut buf);
        buf
    });

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait().context("failed to poll sampler")? {
            Some(status) => {
                let output = reader.join().unwrap_or_default();
                if !status.success() {
                    bail!("sampler exited with {status}");
                }
                return Ok(output);
            }
            None => {
                if Instant::now() >= deadline {
                    kill_and_reap(&mut child);
                    // Killing closes the pipe, so the reader unblocks.
                    let _ = reader.join();
                    bail!("sampler timed out after {:?}", timeout);
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

fn kill_and_reap(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!("failed to kill timed-out sampler: {err}");
    }
    let _ = child.wait();
}

/// Extract `(core id, MHz)` pairs from sampler text output.
///
/// Matches lines of the form `CPU 0 frequency: 1273 MHz`, the format
/// emitted by `powermetrics --samplers cpu_power`. Anything else is
/// ignored; malformed output simply yields no readings.
pub fn parse_core_frequency_lines(output: &str) -> Vec<(usize, f64)> {
    // Unwrap is fine: the pattern is a literal and covered by tests.
    let re = Regex::new(r"(?i)CPU\s+(\d+)\s+frequency:\s+(\d+)\s+MHz").unwrap();

    re.captures_iter(output)
        .filter_map(|caps| {
            let id = caps[1].parse::<usize>().ok()?;
            let mhz = caps[2].parse::<f64>().ok()?;
            Some((id, mhz))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_per_core_lines() {
        let output = "\
Machine model: Mac14,10
CPU 0 frequency: 1273 MHz
CPU 1 frequency: 1310 MHz
cpu 2 frequency: 988 MHz
GPU HW active frequency: 444 MHz
";
        let readings = parse_core_frequency_lines(output);
        assert_eq!(readings, vec![(0, 1273.0), (1, 1310.0), (2, 988.0)]);
    }

    #[test]
    fn malformed_output_yields_nothing() {
        assert!(parse_core_frequency_lines("").is_empty());
        assert!(parse_core_frequency_lines("no frequencies here").is_empty());
        assert!(parse_core_frequency_lines("CPU x frequency: y MHz").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn captures_output_of_quick_command() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo CPU 0 frequency: 1200 MHz"]);
        let out = capture_with_timeout(&mut cmd, Duration::from_secs(5)).unwrap();
        assert_eq!(parse_core_frequency_lines(&out), vec![(0, 1200.0)]);
    }

    #[cfg(unix)]
    #[test]
    fn hung_command_is_killed_at_deadline() {
        let start = Instant::now();
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let result = capture_with_timeout(&mut cmd, Duration::from_millis(200));
        assert!(result.is_err());
        // Killed at the deadline, not after the child's 30s sleep.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_an_error() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 3"]);
        assert!(capture_with_timeout(&mut cmd, Duration::from_secs(5)).is_err());
    }
}
