//! Bounded, time-limited execution of helper commands.
//!
//! Engines and package managers can be chatty or hang. Output is captured
//! up to a fixed size per stream and the child is killed once the
//! wall-clock limit passes.

use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A full command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Working directory.
    pub cwd: PathBuf,
    /// Executable.
    pub program: PathBuf,
    /// Arguments.
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Builds a spec for `program` run in `cwd`.
    #[must_use]
    pub fn new(cwd: &Path, program: &Path) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            program: program.to_path_buf(),
            args: Vec::new(),
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(' ') || arg.contains('\t') {
                write!(formatter, " \"{}\"", arg.replace('"', "\\\""))?;
            } else {
                write!(formatter, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Options controlling one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Kill the process once this much time has passed.
    pub timeout: Duration,
    /// Maximum bytes captured per stream.
    pub max_bytes: usize,
    /// Text written to the child's stdin, which is then closed.
    pub stdin: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_bytes: 16 * 1024 * 1024,
            stdin: None,
        }
    }
}

/// Captured result of a run.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit status.
    pub status: ExitStatus,
    /// Captured stdout, lossily decoded.
    pub stdout: String,
    /// Captured stderr, lossily decoded.
    pub stderr: String,
    /// Set when either stream exceeded `max_bytes`.
    pub truncated: bool,
    /// Set when the process was killed for exceeding the timeout.
    pub timed_out: bool,
}

/// Runs `spec`, capturing at most `options.max_bytes` of each stream.
///
/// # Errors
///
/// Returns an error if the process cannot be spawned or waited on.
pub fn run_command(spec: &CommandSpec, options: RunOptions) -> io::Result<CommandOutput> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .stdin(if options.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn()?;

    let stdin_handle = match (child.stdin.take(), options.stdin) {
        (Some(mut stdin), Some(input)) => Some(thread::spawn(move || {
            // A child that exits early closes the pipe; that is not our error.
            let _ = stdin.write_all(input.as_bytes());
        })),
        _ => None,
    };
    let Some(stdout) = child.stdout.take() else {
        return Err(io::Error::other("child stdout was not captured"));
    };
    let Some(stderr) = child.stderr.take() else {
        return Err(io::Error::other("child stderr was not captured"));
    };

    let max_bytes = options.max_bytes;
    let stdout_handle = thread::spawn(move || read_bounded(stdout, max_bytes));
    let stderr_handle = thread::spawn(move || read_bounded(stderr, max_bytes));

    let (status, timed_out) = wait_with_timeout(&mut child, options.timeout)?;

    if let Some(handle) = stdin_handle {
        let _ = handle.join();
    }
    let (stdout_bytes, stdout_truncated) = join_reader(stdout_handle, "stdout")??;
    let (stderr_bytes, stderr_truncated) = join_reader(stderr_handle, "stderr")??;

    Ok(CommandOutput {
        status,
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        truncated: stdout_truncated || stderr_truncated,
        timed_out,
    })
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> io::Result<(ExitStatus, bool)> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            return child.wait().map(|status| (status, true));
        }
        thread::sleep(POLL_INTERVAL.min(timeout.saturating_sub(start.elapsed())));
    }
}

fn join_reader(
    handle: thread::JoinHandle<io::Result<(Vec<u8>, bool)>>,
    stream: &'static str,
) -> io::Result<io::Result<(Vec<u8>, bool)>> {
    handle
        .join()
        .map_err(|_| io::Error::other(format!("{stream} reader thread panicked")))
}

fn read_bounded(mut reader: impl Read, max_bytes: usize) -> io::Result<(Vec<u8>, bool)> {
    let mut out = Vec::new();
    let mut truncated = false;
    let mut buf = [0_u8; 8 * 1024];

    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        let remaining = max_bytes.saturating_sub(out.len());
        let stored = remaining.min(read);
        out.extend_from_slice(buf.get(..stored).unwrap_or_default());
        if stored < read {
            truncated = true;
        }
    }

    Ok((out, truncated))
}
