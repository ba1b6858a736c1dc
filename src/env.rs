use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::warn;

/// Environment variable holding the primary prompt template.
pub const PS1: &str = "ps1";
/// Environment variable holding the continuation prompt template.
pub const PS2: &str = "ps2";
/// Environment variable holding per-command settings, keyed by command name.
pub const COMMAND_SETTINGS: &str = "corporal_command_settings";

const DEFAULT_PROMPT: &str = "> ";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%%|%\(([^)]+)\)([sdj])").expect("placeholder pattern is valid")
});

/// Session-level variable store.
///
/// Values are JSON-like so commands can keep strings, numbers and nested
/// settings side by side. A fresh environment always contains [`PS1`],
/// [`PS2`] and [`COMMAND_SETTINGS`]; values supplied by the caller win over
/// those defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    vars: Map<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::with_vars(Map::new())
    }

    /// Build an environment from caller-provided variables, seeding the defaults.
    pub fn with_vars(mut vars: Map<String, Value>) -> Self {
        vars.entry(COMMAND_SETTINGS)
            .or_insert_with(|| Value::Object(Map::new()));
        vars.entry(PS1)
            .or_insert_with(|| Value::String(DEFAULT_PROMPT.to_string()));
        vars.entry(PS2)
            .or_insert_with(|| Value::String(DEFAULT_PROMPT.to_string()));
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Get a variable only when it holds a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.vars.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.vars.remove(key)
    }

    /// All variables.
    pub fn vars(&self) -> &Map<String, Value> {
        &self.vars
    }

    /// The settings block configured for `command`, if any.
    pub fn command_settings(&self, command: &str) -> Option<&Value> {
        self.vars.get(COMMAND_SETTINGS)?.get(command)
    }

    /// The settings block for `command`, created as an empty object when missing.
    pub fn command_settings_mut(&mut self, command: &str) -> &mut Map<String, Value> {
        let all = ensure_object(
            self.vars
                .entry(COMMAND_SETTINGS)
                .or_insert_with(|| Value::Object(Map::new())),
        );
        ensure_object(
            all.entry(command)
                .or_insert_with(|| Value::Object(Map::new())),
        )
    }

    /// Interpolate a `%(name)s` style template against the variables.
    ///
    /// Dotted names address nested values (`%(user.name)s`), `%(n)j` renders the
    /// value as JSON and `%%` is a literal percent sign. Unknown names render as
    /// an empty string.
    pub fn render(&self, template: &str) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| {
                let Some(name) = caps.get(1) else {
                    return "%".to_string();
                };
                let Some(value) = self.lookup_path(name.as_str()) else {
                    warn!(variable = name.as_str(), "prompt references an unknown variable");
                    return String::new();
                };
                match (&caps[2], value) {
                    ("j", value) => value.to_string(),
                    (_, Value::String(s)) => s.clone(),
                    (_, Value::Null) => String::new(),
                    (_, value) => value.to_string(),
                }
            })
            .into_owned()
    }

    fn lookup_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = self.vars.get(parts.next()?)?;
        parts.try_fold(first, |value, part| value.get(part))
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env_from(value: Value) -> Environment {
        match value {
            Value::Object(map) => Environment::with_vars(map),
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_env_seeds_defaults() {
        let env = Environment::new();
        assert_eq!(env.get_str(PS1), Some("> "));
        assert_eq!(env.get_str(PS2), Some("> "));
        assert_eq!(env.get(COMMAND_SETTINGS), Some(&json!({})));
    }

    #[test]
    fn test_env_keeps_caller_values() {
        let env = env_from(json!({"ps1": "$ ", "me": "unknown"}));
        assert_eq!(env.get_str(PS1), Some("$ "));
        assert_eq!(env.get_str(PS2), Some("> "));
        assert_eq!(env.get_str("me"), Some("unknown"));
    }

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = Environment::new();
        assert_eq!(env.get("SOME_RANDOM_VAR_12345"), None);

        env.set("KEY", "VALUE");
        env.set("COUNT", 3);

        assert_eq!(env.get_str("KEY"), Some("VALUE"));
        assert_eq!(env.get("COUNT"), Some(&json!(3)));
        assert_eq!(env.get_str("COUNT"), None);
    }

    #[test]
    fn test_command_settings_created_on_demand() {
        let mut env = Environment::new();
        assert!(env.command_settings("help").is_none());

        env.command_settings_mut("help")
            .insert("hide".into(), json!(["clear"]));

        assert_eq!(env.command_settings("help"), Some(&json!({"hide": ["clear"]})));
    }

    #[test]
    fn test_command_settings_replaces_non_object() {
        let mut env = env_from(json!({"corporal_command_settings": "oops"}));
        env.command_settings_mut("help");
        assert_eq!(env.get(COMMAND_SETTINGS), Some(&json!({"help": {}})));
    }

    #[test]
    fn test_render_interpolates_variables() {
        let env = env_from(json!({
            "me": "branden",
            "count": 2,
            "user": {"shell": "corporal"},
        }));
        assert_eq!(env.render("%(me)s$ "), "branden$ ");
        assert_eq!(env.render("[%(count)d] "), "[2] ");
        assert_eq!(env.render("%(user.shell)s> "), "corporal> ");
        assert_eq!(env.render("100%% %(user)j"), "100% {\"shell\":\"corporal\"}");
    }

    #[test]
    fn test_render_unknown_variable_is_empty() {
        let env = Environment::new();
        assert_eq!(env.render("%(nobody)s> "), "> ");
        assert_eq!(env.render("plain"), "plain");
    }
}
