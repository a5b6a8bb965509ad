use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use shared::domain::RenderTarget;

use crate::channel::{ChannelOptions, ErrorPolicy};

pub const DEFAULT_CONFIG_FILE: &str = "engine.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub engine_program: Option<PathBuf>,
    pub engine_args: Vec<String>,
    pub initial_target: String,
    pub frontend_driven_rendering: bool,
    pub error_policy: ErrorPolicy,
    pub quiet_commands: Vec<String>,
    pub recoverable_commands: BTreeMap<String, String>,
    /// Engine version the front end was built against; checked at startup
    /// when set.
    pub expected_engine_version: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let channel = ChannelOptions::default();
        Self {
            engine_program: None,
            engine_args: vec!["-batch".into()],
            initial_target: "/minsky/canvas".into(),
            frontend_driven_rendering: true,
            error_policy: channel.error_policy,
            quiet_commands: channel.quiet_commands,
            recoverable_commands: channel.recoverable_commands,
            expected_engine_version: None,
        }
    }
}

/// Keys accepted in `engine.toml`; anything omitted keeps its default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    engine_program: Option<PathBuf>,
    engine_args: Option<Vec<String>>,
    initial_target: Option<String>,
    frontend_driven_rendering: Option<bool>,
    error_policy: Option<ErrorPolicy>,
    quiet_commands: Option<Vec<String>>,
    recoverable_commands: Option<BTreeMap<String, String>>,
    expected_engine_version: Option<String>,
}

impl Settings {
    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            quiet_commands: self.quiet_commands.clone(),
            recoverable_commands: self.recoverable_commands.clone(),
            error_policy: self.error_policy,
        }
    }

    pub fn initial_target(&self) -> Result<RenderTarget> {
        RenderTarget::try_from(self.initial_target.clone())
            .with_context(|| format!("invalid initial target '{}'", self.initial_target))
    }

    fn apply_file(&mut self, file: FileSettings) {
        if let Some(v) = file.engine_program {
            self.engine_program = Some(v);
        }
        if let Some(v) = file.engine_args {
            self.engine_args = v;
        }
        if let Some(v) = file.initial_target {
            self.initial_target = v;
        }
        if let Some(v) = file.frontend_driven_rendering {
            self.frontend_driven_rendering = v;
        }
        if let Some(v) = file.error_policy {
            self.error_policy = v;
        }
        if let Some(v) = file.quiet_commands {
            self.quiet_commands = v;
        }
        if let Some(v) = file.recoverable_commands {
            self.recoverable_commands = v;
        }
        if let Some(v) = file.expected_engine_version {
            self.expected_engine_version = Some(v);
        }
    }

    /// Overlays environment variables read through `var`.
    ///
    /// List values are whitespace separated. Unparseable values are rejected.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = var("ENGINE_PROGRAM") {
            self.engine_program = Some(v.into());
        }
        if let Some(v) = var("APP__ENGINE_PROGRAM") {
            self.engine_program = Some(v.into());
        }
        if let Some(v) = var("APP__ENGINE_ARGS") {
            self.engine_args = split_list(&v);
        }
        if let Some(v) = var("APP__INITIAL_TARGET") {
            self.initial_target = v;
        }
        if let Some(v) = var("APP__FRONTEND_DRIVEN_RENDERING") {
            self.frontend_driven_rendering = v
                .trim()
                .parse()
                .with_context(|| format!("APP__FRONTEND_DRIVEN_RENDERING='{v}' is not a bool"))?;
        }
        if let Some(v) = var("APP__ERROR_POLICY") {
            self.error_policy = v.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(v) = var("APP__QUIET_COMMANDS") {
            self.quiet_commands = split_list(&v);
        }
        if let Some(v) = var("APP__EXPECTED_ENGINE_VERSION") {
            let v = v.trim();
            self.expected_engine_version = (!v.is_empty()).then(|| v.to_string());
        }
        Ok(())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Defaults, then the config file, then the process environment.
///
/// An explicit `config_path` must exist; the default `engine.toml` is optional.
pub fn load_settings(config_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match config_path {
        Some(path) => (path, true),
        None => (Path::new(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(path) {
        Ok(raw) => {
            let file: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("failed to parse config '{}'", path.display()))?;
            settings.apply_file(file);
        }
        Err(err) if err.kind() == ErrorKind::NotFound && !required => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read config '{}'", path.display()))
        }
    }

    settings.apply_env(|key| std::env::var(key).ok())?;
    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
