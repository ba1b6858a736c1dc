use crate::command::{Command, CommandResult};
use crate::env::Environment;
use crate::session::Session;
use argh::{EarlyExit, FromArgs};
use async_trait::async_trait;
use serde_json::Value;
use std::io::Write;
use std::marker::PhantomData;
use std::sync::Arc;

pub const CLEAR: &str = "clear";
pub const HELP: &str = "help";
pub const QUIT: &str = "quit";

/// Names of the commands every session starts with.
pub const BUILTIN_NAMES: [&str; 3] = [CLEAR, HELP, QUIT];

/// Built-in commands known to the shell at compile time.
///
/// Arguments are parsed with [`argh`]; `--help` and malformed arguments print
/// the generated usage instead of running the command.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "help".
    fn name() -> &'static str;

    fn description() -> &'static str;

    fn help() -> Option<&'static str> {
        None
    }

    fn init(_session: &mut Session) -> anyhow::Result<()> {
        Ok(())
    }

    fn autocomplete(_session: &Session, _args: &[String]) -> Vec<String> {
        Vec::new()
    }

    fn execute(self, session: &mut Session) -> CommandResult;
}

/// Adapts a [`BuiltinCommand`] type to the object-safe [`Command`] trait.
pub(crate) struct Builtin<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Default for Builtin<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<T: BuiltinCommand + 'static> Command for Builtin<T> {
    fn description(&self) -> &str {
        T::description()
    }

    fn help(&self) -> Option<&str> {
        T::help()
    }

    async fn init(&self, session: &mut Session) -> anyhow::Result<()> {
        T::init(session)
    }

    async fn invoke(&self, session: &mut Session, args: Vec<String>) -> CommandResult {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match T::from_args(&[T::name()], &args) {
            Ok(cmd) => cmd.execute(session),
            Err(EarlyExit { output, status }) => {
                let out = match status {
                    Ok(()) => session.stdout(),
                    Err(()) => session.stderr(),
                };
                out.write_all(output.as_bytes())?;
                Ok(())
            }
        }
    }

    fn autocomplete(&self, session: &Session, args: &[String]) -> Vec<String> {
        T::autocomplete(session, args)
    }
}

/// The built-in commands, minus the ones listed in `disabled`.
pub(crate) fn builtins(disabled: &[String]) -> Vec<(&'static str, Arc<dyn Command>)> {
    let all: [(&'static str, Arc<dyn Command>); 3] = [
        (CLEAR, Arc::new(Builtin::<Clear>::default())),
        (HELP, Arc::new(Builtin::<Help>::default())),
        (QUIT, Arc::new(Builtin::<Quit>::default())),
    ];
    all.into_iter()
        .filter(|(name, _)| !disabled.iter().any(|d| d == name))
        .collect()
}

#[derive(FromArgs)]
/// Clear the terminal window.
pub struct Clear {
    #[argh(positional, greedy)]
    /// ignored
    pub rest: Vec<String>,
}

impl BuiltinCommand for Clear {
    fn name() -> &'static str {
        CLEAR
    }

    fn description() -> &'static str {
        "Clear the terminal window."
    }

    fn execute(self, session: &mut Session) -> CommandResult {
        write!(session.stdout(), "\u{1B}[2J\u{1B}[0;0f")?;
        session.stdout().flush()?;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Quit the interactive shell.
pub struct Quit {
    #[argh(positional, greedy)]
    /// ignored
    pub rest: Vec<String>,
}

impl BuiltinCommand for Quit {
    fn name() -> &'static str {
        QUIT
    }

    fn description() -> &'static str {
        "Quit the interactive shell."
    }

    fn execute(self, session: &mut Session) -> CommandResult {
        session.quit();
        Ok(())
    }
}

/// Show a dialog of all available commands.
///
/// Reads `corporal_command_settings.help.hide`, a list of command names left
/// out of the listing. Hidden commands can still be described explicitly with
/// `help <command>`.
#[derive(FromArgs)]
pub struct Help {
    #[argh(positional)]
    /// the command to describe
    pub command: Option<String>,

    #[argh(switch, hidden_help)]
    /// write the output to the error stream
    pub stderr: bool,
}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        HELP
    }

    fn description() -> &'static str {
        "Show a dialog of all available commands."
    }

    fn help() -> Option<&'static str> {
        Some("Usage: help [<command>]")
    }

    fn init(session: &mut Session) -> anyhow::Result<()> {
        let settings = session.env_mut().command_settings_mut(HELP);
        if !settings.get("hide").is_some_and(Value::is_array) {
            settings.insert("hide".to_string(), Value::Array(Vec::new()));
        }
        Ok(())
    }

    fn autocomplete(session: &Session, args: &[String]) -> Vec<String> {
        match args {
            [partial] => session
                .commands()
                .visible_names()
                .into_iter()
                .filter(|name| name.starts_with(partial.as_str()))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn execute(self, session: &mut Session) -> CommandResult {
        let text = match &self.command {
            Some(name) => match session.commands().lookup(name) {
                Some(command) => describe(command.as_ref()),
                None => {
                    // An unknown name is always reported on stderr.
                    writeln!(session.stderr(), "No command found with name: \"{name}\"")?;
                    return Ok(());
                }
            },
            None => listing(session),
        };
        let out = if self.stderr {
            session.stderr()
        } else {
            session.stdout()
        };
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

fn describe(command: &dyn Command) -> String {
    let mut text = format!("\n{}\n\n", command.description());
    if let Some(help) = command.help() {
        text.push_str(help);
        text.push_str("\n\n");
    }
    text
}

fn listing(session: &Session) -> String {
    let hidden = hidden_commands(session.env());
    let visible = session.commands().visible();
    let shown: Vec<_> = visible
        .iter()
        .filter(|(name, _)| !hidden.contains(name))
        .collect();
    let width = shown
        .iter()
        .map(|(name, _)| name.chars().count())
        .max()
        .unwrap_or(0);

    let mut text = String::from("List of available commands:\n\n");
    for (name, command) in shown {
        let summary = command.description().lines().next().unwrap_or_default();
        text.push_str(&format!("{name:<width$}:  {summary}\n"));
    }
    text.push('\n');
    text
}

fn hidden_commands(env: &Environment) -> Vec<&str> {
    env.command_settings(HELP)
        .and_then(|settings| settings.get("hide"))
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}
