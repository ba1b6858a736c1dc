use crate::env::{Environment, PS1, PS2};
use crate::handler::ErrorHandlers;
use crate::io_adapters::Streams;
use crate::registry::CommandRegistry;
use std::io::{BufRead, Write};
use std::sync::Arc;

/// Which prompt template to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// `ps1`, shown before each new command.
    Primary,
    /// `ps2`, shown while a quoted argument is still open.
    Continuation,
}

/// Everything a command can touch while it runs.
///
/// A session is owned by one [`Corporal`](crate::Corporal); commands borrow it
/// for the duration of a single invocation.
pub struct Session {
    env: Environment,
    commands: CommandRegistry,
    error_handlers: Arc<ErrorHandlers>,
    stdout: Box<dyn Write + Send>,
    stderr: Box<dyn Write + Send>,
    stdin: Box<dyn BufRead + Send>,
    quit: bool,
}

impl Session {
    pub fn new(env: Environment, commands: CommandRegistry, streams: Streams) -> Self {
        let Streams {
            stdout,
            stderr,
            stdin,
        } = streams;
        Self {
            env,
            commands,
            error_handlers: Arc::new(ErrorHandlers::new()),
            stdout,
            stderr,
            stdin,
            quit: false,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Mutable registry access, e.g. to switch the command context.
    pub fn commands_mut(&mut self) -> &mut CommandRegistry {
        &mut self.commands
    }

    /// Ask the command loop to stop once the current command completes.
    ///
    /// There is no way to take this back.
    pub fn quit(&mut self) {
        self.quit = true;
    }

    pub fn has_quit(&self) -> bool {
        self.quit
    }

    pub fn stdout(&mut self) -> &mut (dyn Write + Send) {
        &mut *self.stdout
    }

    pub fn stderr(&mut self) -> &mut (dyn Write + Send) {
        &mut *self.stderr
    }

    pub fn stdin(&mut self) -> &mut (dyn BufRead + Send) {
        &mut *self.stdin
    }

    pub fn error_handlers(&self) -> &Arc<ErrorHandlers> {
        &self.error_handlers
    }

    pub(crate) fn error_handlers_mut(&mut self) -> &mut ErrorHandlers {
        Arc::make_mut(&mut self.error_handlers)
    }

    /// Render `ps1` or `ps2` against the current environment.
    pub fn render_prompt(&self, prompt: Prompt) -> String {
        let key = match prompt {
            Prompt::Primary => PS1,
            Prompt::Continuation => PS2,
        };
        self.env
            .get_str(key)
            .map(|template| self.env.render(template))
            .unwrap_or_default()
    }
}
