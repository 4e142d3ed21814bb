use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    /// Displayed as the bare word so callers can classify it by message.
    #[error("Timeout")]
    Timeout { command: String, after: Duration },
    #[error("{message}")]
    Failed { command: String, code: Option<i32>, message: String },
}

impl ProcessError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessError::Timeout { .. })
    }
}

/// Captured result of a successful command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// A `sh -c` invocation with a wall-clock budget.
///
/// The child runs in its own process group, and the whole group is killed
/// once the budget expires; there is no other cancellation.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    script: String,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    timeout: Duration,
    stream: bool,
}

impl ShellCommand {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            cwd: None,
            env: Vec::new(),
            timeout: Duration::from_secs(120),
            stream: false,
        }
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Echo output to the terminal as it arrives. It is still captured, so
    /// failures carry the same message either way.
    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn run(&self) -> Result<CommandOutput, ProcessError> {
        debug!(command = %self.script, cwd = ?self.cwd, "running command");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&self.script).stdin(Stdio::null());
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        // Own process group, so a timeout can take down everything the script
        // started.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd
            .spawn()
            .map_err(|source| ProcessError::Spawn { command: self.script.clone(), source })?;
        let stdout = child.stdout.take().map(|pipe| drain(pipe, self.stream.then(io::stdout)));
        let stderr = child.stderr.take().map(|pipe| drain(pipe, self.stream.then(io::stderr)));

        let status = self.wait_with_deadline(&mut child)?;
        let stdout = collect(stdout);
        let stderr = collect(stderr);

        if status.success() {
            return Ok(CommandOutput { status, stdout, stderr });
        }

        let message = if !stderr.trim().is_empty() {
            stderr
        } else if !stdout.trim().is_empty() {
            stdout
        } else {
            format!("`{}` exited with {}", self.script, status)
        };
        Err(ProcessError::Failed { command: self.script.clone(), code: status.code(), message })
    }

    fn wait_with_deadline(&self, child: &mut Child) -> Result<ExitStatus, ProcessError> {
        let started = Instant::now();
        loop {
            let polled = child
                .try_wait()
                .map_err(|source| ProcessError::Spawn { command: self.script.clone(), source })?;
            if let Some(status) = polled {
                return Ok(status);
            }
            if started.elapsed() >= self.timeout {
                kill_group(child);
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProcessError::Timeout {
                    command: self.script.clone(),
                    after: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: plain syscall on a group id we created; no memory is shared.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pgid, error = %io::Error::last_os_error(), "failed to kill process group");
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

/// Read `pipe` to the end, copying each chunk to `echo` when set.
fn drain<R, W>(mut pipe: R, mut echo: Option<W>) -> JoinHandle<Vec<u8>>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    if let Some(out) = echo.as_mut() {
                        let _ = out.write_all(&chunk[..n]);
                        let _ = out.flush();
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
