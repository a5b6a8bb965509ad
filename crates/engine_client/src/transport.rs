//! Backend call primitives the command channel sits on.

use std::{ffi::OsStr, process::Stdio, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStderr, ChildStdin, ChildStdout, Command},
    sync::Mutex,
};
use tracing::{debug, warn};

use crate::hooks::UiHooks;

/// The engine's single string-command entry point.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Runs `command` with its encoded argument string and returns the raw
    /// response. An `Err` carries the engine's exception message.
    async fn call(&self, command: &str, arg: &str) -> Result<String>;

    /// Gives the backend the UI callbacks it may invoke mid-call.
    ///
    /// Only in-process bindings can call back into the UI. The default
    /// ignores the hooks; the channel still uses them itself for errors and
    /// the startup version warning.
    fn install_hooks(&self, _hooks: Arc<dyn UiHooks>) {}
}

/// Adapts a blocking in-process binding; each call completes immediately.
pub struct SyncBackend<F> {
    call: F,
}

impl<F> SyncBackend<F>
where
    F: Fn(&str, &str) -> Result<String> + Send + Sync,
{
    pub fn new(call: F) -> Self {
        Self { call }
    }
}

#[async_trait]
impl<F> Backend for SyncBackend<F>
where
    F: Fn(&str, &str) -> Result<String> + Send + Sync,
{
    async fn call(&self, command: &str, arg: &str) -> Result<String> {
        (self.call)(command, arg)
    }
}

const EXCEPTION_PREFIX: &str = "Exception: ";

/// Engine running as a child process in batch mode.
///
/// Each request is one stdin line `<command> <arg>`. The engine echoes
/// `<command>=>` on stdout and completes the line with the response. When the
/// command throws, the message goes to stderr as `Exception: <message>` and
/// the echo stays unterminated until a later response completes the line.
///
/// Batch mode has no callback path, so engine-initiated message boxes and
/// busy-cursor changes never reach the installed [`UiHooks`].
pub struct ProcessBackend {
    io: Mutex<ProcessIo>,
}

struct ProcessIo {
    // held so the engine is killed when the backend is dropped
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr: BufReader<ChildStderr>,
    stdout_buf: Vec<u8>,
    stderr_buf: Vec<u8>,
    unterminated_echoes: Vec<String>,
}

impl ProcessBackend {
    pub fn spawn(program: impl AsRef<OsStr>, args: &[String]) -> Result<Self> {
        let program = program.as_ref();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start engine '{}'", program.to_string_lossy()))?;

        let stdin = child.stdin.take().context("engine stdin was not captured")?;
        let stdout = child.stdout.take().context("engine stdout was not captured")?;
        let stderr = child.stderr.take().context("engine stderr was not captured")?;
        debug!(program = %program.to_string_lossy(), "engine process started");

        Ok(Self {
            io: Mutex::new(ProcessIo {
                _child: child,
                stdin,
                stdout: BufReader::new(stdout),
                stderr: BufReader::new(stderr),
                stdout_buf: Vec::new(),
                stderr_buf: Vec::new(),
                unterminated_echoes: Vec::new(),
            }),
        })
    }
}

#[async_trait]
impl Backend for ProcessBackend {
    async fn call(&self, command: &str, arg: &str) -> Result<String> {
        if !command.starts_with('/') {
            bail!("command '{command}' does not start with '/'");
        }
        let mut io = self.io.lock().await;
        let line = if arg.is_empty() {
            format!("{command}\n")
        } else {
            format!("{command} {arg}\n")
        };
        io.stdin
            .write_all(line.as_bytes())
            .await
            .context("engine process is not accepting commands")?;
        io.stdin.flush().await.context("failed to flush engine stdin")?;
        io.await_response(command).await
    }
}

impl ProcessIo {
    async fn await_response(&mut self, command: &str) -> Result<String> {
        let echo = format!("{command}=>");
        loop {
            let Self {
                stdout,
                stderr,
                stdout_buf,
                stderr_buf,
                unterminated_echoes,
                ..
            } = &mut *self;
            tokio::select! {
                read = stdout.read_until(b'\n', stdout_buf) => {
                    if read.context("failed to read engine output")? == 0 {
                        bail!("engine process closed its output");
                    }
                    let raw = std::mem::take(stdout_buf);
                    let line = String::from_utf8_lossy(&raw);
                    let mut text = line.trim_end_matches(['\r', '\n']);
                    for stale in unterminated_echoes.drain(..) {
                        text = text.strip_prefix(stale.as_str()).unwrap_or(text);
                    }
                    match text.strip_prefix(echo.as_str()) {
                        Some(response) => return Ok(response.to_string()),
                        None => warn!(command, "ignoring engine output: {text}"),
                    }
                }
                read = stderr.read_until(b'\n', stderr_buf) => {
                    if read.context("failed to read engine diagnostics")? == 0 {
                        bail!("engine process closed its error stream");
                    }
                    let raw = std::mem::take(stderr_buf);
                    let line = String::from_utf8_lossy(&raw);
                    let text = line.trim_end_matches(['\r', '\n']);
                    match text.strip_prefix(EXCEPTION_PREFIX) {
                        Some(message) => {
                            unterminated_echoes.push(echo);
                            return Err(anyhow!(message.to_string()));
                        }
                        None => warn!(command, "engine diagnostic: {text}"),
                    }
                }
            }
        }
    }
}
