use std::{
    collections::HashMap,
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::{hooks::UiHooks, transport::Backend};

/// Fake engine that records every call and answers from a script.
#[derive(Default)]
pub(crate) struct RecordingBackend {
    calls: Mutex<Vec<String>>,
    responses: Mutex<HashMap<String, Result<String, String>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    hooks: Mutex<Option<Arc<dyn UiHooks>>>,
}

impl RecordingBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, command: &str, raw: &str) {
        self.responses
            .lock()
            .expect("responses lock")
            .insert(command.to_string(), Ok(raw.to_string()));
    }

    pub(crate) fn fail(&self, command: &str, message: &str) {
        self.responses
            .lock()
            .expect("responses lock")
            .insert(command.to_string(), Err(message.to_string()));
    }

    /// Calls in wire form, `<command> <arg>` or just `<command>`.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn calls_ending_with(&self, suffix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.split(' ').next().is_some_and(|cmd| cmd.ends_with(suffix)))
            .collect()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn installed_hooks(&self) -> Option<Arc<dyn UiHooks>> {
        self.hooks.lock().expect("hooks lock").clone()
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    async fn call(&self, command: &str, arg: &str) -> Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().expect("calls lock").push(if arg.is_empty() {
            command.to_string()
        } else {
            format!("{command} {arg}")
        });

        // give any would-be concurrent caller a chance to overlap
        tokio::task::yield_now().await;

        let scripted = self
            .responses
            .lock()
            .expect("responses lock")
            .get(command)
            .cloned();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match scripted {
            Some(Ok(raw)) => Ok(raw),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok("null".to_string()),
        }
    }

    fn install_hooks(&self, hooks: Arc<dyn UiHooks>) {
        *self.hooks.lock().expect("hooks lock") = Some(hooks);
    }
}

/// Hooks that remember what the UI was asked to show.
#[derive(Default)]
pub(crate) struct RecordingHooks {
    pub(crate) errors: Mutex<Vec<String>>,
    pub(crate) messages: Mutex<Vec<String>>,
    pub(crate) busy: Mutex<Vec<bool>>,
}

impl RecordingHooks {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.errors.lock().expect("errors lock").clone()
    }
}

impl UiHooks for RecordingHooks {
    fn message_box(&self, message: &str, _buttons: &[String]) -> usize {
        self.messages
            .lock()
            .expect("messages lock")
            .push(message.to_string());
        1
    }

    fn busy_cursor(&self, busy: bool) {
        self.busy.lock().expect("busy lock").push(busy);
    }

    fn present_error(&self, message: &str) {
        self.errors
            .lock()
            .expect("errors lock")
            .push(message.to_string());
    }
}

/// In-memory sink for log output produced while a test runs.
#[derive(Clone, Default)]
pub(crate) struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub(crate) fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log lock")).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Routes this thread's log events into a [`LogCapture`] until the guard
/// drops.
pub(crate) fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();
    (capture, tracing::subscriber::set_default(subscriber))
}
