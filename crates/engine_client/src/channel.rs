//! The only component that talks to the engine backend.

use std::{collections::BTreeMap, str::FromStr, sync::Arc};

use serde::Deserialize;
use serde_json::{Map, Value};
use shared::{domain::Address, protocol::Command, wire};
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::{error::ChannelError, hooks::UiHooks, transport::Backend};

/// Bulk tabular import: its failures are reported inline, not in a dialog.
/// The returned text is `<sentinel>: <engine message>`.
pub const IMPORT_COMMAND: &str = "/minsky/canvas/item/importFromCSV";
pub const IMPORT_ERROR_SENTINEL: &str = "Import CSV error";

pub const VERSION_MISMATCH: &str = "Mismatch of front end and back end versions";

/// How the channel reacts to failed calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Log, show the error through the UI hooks and resolve with a fallback
    /// value.
    #[default]
    Present,
    /// Return the error to the caller. Used under test harnesses so failures
    /// surface in assertions.
    Propagate,
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "propagate" => Ok(Self::Propagate),
            other => Err(format!("unknown error policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Command suffixes too chatty to log at info level.
    pub quiet_commands: Vec<String>,
    /// Commands whose failures skip the dialog and resolve to
    /// `<sentinel>: <message>`.
    pub recoverable_commands: BTreeMap<String, String>,
    pub error_policy: ErrorPolicy,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            quiet_commands: vec!["mouseMove".into(), "requestRedraw".into()],
            recoverable_commands: BTreeMap::from([(
                IMPORT_COMMAND.to_string(),
                IMPORT_ERROR_SENTINEL.to_string(),
            )]),
            error_policy: ErrorPolicy::Present,
        }
    }
}

pub struct CommandChannel {
    backend: Option<Arc<dyn Backend>>,
    hooks: Arc<dyn UiHooks>,
    options: ChannelOptions,
    session: Mutex<()>,
}

impl CommandChannel {
    pub fn new(backend: Arc<dyn Backend>, hooks: Arc<dyn UiHooks>, options: ChannelOptions) -> Self {
        backend.install_hooks(hooks.clone());
        Self {
            backend: Some(backend),
            hooks,
            options,
            session: Mutex::new(()),
        }
    }

    /// A channel whose backend never came up; every send fails soft.
    pub fn unavailable(hooks: Arc<dyn UiHooks>, options: ChannelOptions) -> Self {
        Self {
            backend: None,
            hooks,
            options,
            session: Mutex::new(()),
        }
    }

    /// Builds the channel from the outcome of backend initialization.
    pub fn from_startup(
        startup: anyhow::Result<Arc<dyn Backend>>,
        hooks: Arc<dyn UiHooks>,
        options: ChannelOptions,
    ) -> Self {
        match startup {
            Ok(backend) => Self::new(backend, hooks, options),
            Err(err) => {
                error!("engine backend failed to initialize: {err:#}");
                Self::unavailable(hooks, options)
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn hooks(&self) -> &Arc<dyn UiHooks> {
        &self.hooks
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    /// Sends `command` and decodes the engine's reply.
    pub async fn send(&self, command: &Command) -> Result<Value, ChannelError> {
        let path = command.path();
        if path.is_root() {
            error!("engine called without any command");
            return self.fail_soft(ChannelError::EmptyCommand);
        }
        let path = path.to_string();
        let arg = command.encoded_args();

        let Some(backend) = &self.backend else {
            error!(command = %path, "engine channel not ready");
            return self.fail_soft(ChannelError::Unavailable);
        };

        let response = {
            let _session = self.session.lock().await;
            backend.call(&path, &arg).await
        };

        let err = match response {
            Ok(raw) => match wire::decode(&raw) {
                Ok(value) => {
                    if self.is_quiet(&path) {
                        trace!(command = %path, args = %arg, response = %raw, "engine call");
                    } else {
                        info!(command = %path, args = %arg, response = %raw, "engine call");
                    }
                    return Ok(value);
                }
                Err(source) => ChannelError::Malformed {
                    command: path.clone(),
                    source,
                },
            },
            Err(err) => ChannelError::Backend {
                command: path.clone(),
                message: err.to_string(),
            },
        };

        error!(command = %path, args = %arg, "engine call failed: {}", err.message());
        if self.options.error_policy == ErrorPolicy::Propagate {
            return Err(err);
        }
        let message = err.message();
        if let Some(sentinel) = self.options.recoverable_commands.get(&path) {
            return Ok(Value::String(format!("{sentinel}: {message}")));
        }
        if !message.is_empty() {
            self.hooks.present_error(&message);
        }
        Ok(Value::String(message))
    }

    /// Compares the engine's reported version with `expected`.
    ///
    /// A mismatch is logged and shown through the hooks as a warning, but
    /// startup carries on. Returns whether the versions agree; an unavailable
    /// channel never agrees and shows nothing.
    pub async fn check_version(&self, expected: &str) -> Result<bool, ChannelError> {
        if !self.is_available() {
            return self.fail_soft(ChannelError::Unavailable).map(|_| false);
        }
        let command = Command::bare(
            Address::root().field("minsky").field("minskyVersion"),
            vec![],
        );
        let reported = self.send(&command).await?;
        if reported.as_str() == Some(expected) {
            debug!(version = expected, "engine version matches");
            return Ok(true);
        }
        warn!(expected, reported = %wire::encode(&reported), "{VERSION_MISMATCH}");
        self.hooks.message_box(VERSION_MISMATCH, &["OK".to_string()]);
        Ok(false)
    }

    fn fail_soft(&self, err: ChannelError) -> Result<Value, ChannelError> {
        match self.options.error_policy {
            ErrorPolicy::Present => Ok(Value::Object(Map::new())),
            ErrorPolicy::Propagate => Err(err),
        }
    }

    fn is_quiet(&self, path: &str) -> bool {
        self.options
            .quiet_commands
            .iter()
            .any(|suffix| path.ends_with(suffix.as_str()))
    }
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
