use crate::command::Command;
use crate::error::ValidationError;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Name of the context a session starts in.
pub const DEFAULT_CONTEXT: &str = "";
/// Name of the context whose commands are visible in every context.
pub const WILDCARD_CONTEXT: &str = "*";

/// Every registered command plus the contexts that decide which of them the
/// user can currently reach.
///
/// A command is visible in context `C` iff its name is listed in `C` or in
/// [`WILDCARD_CONTEXT`]. Names listed in a context but never registered are
/// ignored.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Arc<dyn Command>>,
    contexts: HashMap<String, Vec<String>>,
    current: String,
}

impl CommandRegistry {
    pub fn new(contexts: HashMap<String, Vec<String>>) -> Self {
        Self {
            commands: BTreeMap::new(),
            contexts,
            current: DEFAULT_CONTEXT.to_string(),
        }
    }

    /// Add a command to the set of all commands.
    ///
    /// Fails when the command has an empty description or no invoke action.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        command: Arc<dyn Command>,
    ) -> Result<(), ValidationError> {
        let name = name.into();
        if command.description().trim().is_empty() {
            return Err(ValidationError::MissingDescription(name));
        }
        if !command.has_invoke() {
            return Err(ValidationError::MissingInvoke(name));
        }
        debug!(command = %name, "registered command");
        self.commands.insert(name, command);
        Ok(())
    }

    pub fn context(&self) -> &str {
        &self.current
    }

    /// Switch the active context. Unknown names are accepted and simply
    /// leave only wildcard commands visible.
    pub fn set_context(&mut self, name: impl Into<String>) {
        self.current = name.into();
        debug!(context = %self.current, "switched command context");
    }

    pub fn contexts(&self) -> &HashMap<String, Vec<String>> {
        &self.contexts
    }

    /// All registered commands, regardless of context.
    pub fn all(&self) -> &BTreeMap<String, Arc<dyn Command>> {
        &self.commands
    }

    /// A registered command, regardless of context.
    pub fn get_any(&self, name: &str) -> Option<&Arc<dyn Command>> {
        self.commands.get(name)
    }

    /// Commands reachable in the current context, ordered by name.
    pub fn visible(&self) -> BTreeMap<&str, &Arc<dyn Command>> {
        [self.current.as_str(), WILDCARD_CONTEXT]
            .into_iter()
            .filter_map(|ctx| self.contexts.get(ctx))
            .flatten()
            .filter_map(|name| {
                self.commands
                    .get_key_value(name)
                    .map(|(name, command)| (name.as_str(), command))
            })
            .collect()
    }

    pub fn visible_names(&self) -> Vec<String> {
        self.visible().into_keys().map(str::to_string).collect()
    }

    /// A command reachable in the current context.
    ///
    /// A registered command hidden by the current context is not found.
    pub fn lookup(&self, name: &str) -> Option<&Arc<dyn Command>> {
        let listed = |ctx: &str| {
            self.contexts
                .get(ctx)
                .is_some_and(|names| names.iter().any(|n| n == name))
        };
        if listed(&self.current) || listed(WILDCARD_CONTEXT) {
            self.commands.get(name)
        } else {
            None
        }
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .field("contexts", &self.contexts)
            .field("current", &self.current)
            .finish()
    }
}
