use crate::command::Command;
use crate::io_adapters::Streams;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid environment: {0}")]
    Env(String),
}

/// Commands listed under one context name.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ContextConfig {
    #[serde(default)]
    pub commands: Vec<String>,
}

/// Startup settings that can live in a file.
///
/// ```toml
/// disabled = ["clear"]
///
/// [env]
/// ps1 = "%(me)s$ "
///
/// [command_contexts."*"]
/// commands = ["help", "quit"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub disabled: Vec<String>,
    pub env: Map<String, Value>,
    pub command_contexts: Option<HashMap<String, ContextConfig>>,
}

impl ShellConfig {
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content, path)?;
        info!("Loaded config from: {}", path.display());
        Ok(config)
    }
}

/// Everything [`Corporal::new`](crate::Corporal::new) needs to start a session.
///
/// `commands` are merged over the built-ins, so a command registered under a
/// built-in name replaces it. Names in `disabled` are dropped from both.
/// Without `command_contexts` every command is visible everywhere; with them,
/// the enabled built-ins are still added to the `"*"` context.
pub struct CorporalOptions {
    pub commands: BTreeMap<String, Arc<dyn Command>>,
    pub disabled: Vec<String>,
    pub env: Map<String, Value>,
    pub command_contexts: Option<HashMap<String, Vec<String>>>,
    pub streams: Streams,
}

impl CorporalOptions {
    pub fn new() -> Self {
        Self {
            commands: BTreeMap::new(),
            disabled: Vec::new(),
            env: Map::new(),
            command_contexts: None,
            streams: Streams::default(),
        }
    }

    pub fn command(mut self, name: impl Into<String>, command: impl Command + 'static) -> Self {
        self.commands.insert(name.into(), Arc::new(command));
        self
    }

    pub fn disable(mut self, name: impl Into<String>) -> Self {
        self.disabled.push(name.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Merge a JSON object into the environment.
    pub fn env_json(mut self, json: &str) -> Result<Self, ConfigError> {
        match serde_json::from_str(json) {
            Ok(Value::Object(vars)) => {
                self.env.extend(vars);
                Ok(self)
            }
            Ok(_) => Err(ConfigError::Env("expected a JSON object".to_string())),
            Err(e) => Err(ConfigError::Env(e.to_string())),
        }
    }

    /// Add `names` to the context called `name`.
    pub fn context<I, S>(mut self, name: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command_contexts
            .get_or_insert_with(HashMap::new)
            .entry(name.into())
            .or_default()
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn streams(mut self, streams: Streams) -> Self {
        self.streams = streams;
        self
    }

    /// Layer a file config under what was set programmatically: environment
    /// values already present win, disabled lists and contexts are merged.
    pub fn apply_config(mut self, config: ShellConfig) -> Self {
        for (key, value) in config.env {
            self.env.entry(key).or_insert(value);
        }
        for name in config.disabled {
            if !self.disabled.contains(&name) {
                self.disabled.push(name);
            }
        }
        if let Some(contexts) = config.command_contexts {
            for (name, ctx) in contexts {
                self = self.context(name, ctx.commands);
            }
        }
        self
    }
}

impl Default for CorporalOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CorporalOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorporalOptions")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .field("disabled", &self.disabled)
            .field("env", &self.env)
            .field("command_contexts", &self.command_contexts)
            .finish_non_exhaustive()
    }
}
