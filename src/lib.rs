//! Building blocks for interactive command shells.
//!
//! A consumer registers named [`Command`]s, optionally grouped into contexts,
//! and hands control to a [`Corporal`], which reads lines, splits them into
//! arguments and invokes the matching command. Commands see the world only
//! through the [`Session`]: a JSON-valued [`Environment`], the command
//! registry and the session's streams.
//!
//! Failures are [`CommandError`]s tagged with an [`ErrorKind`]. They are routed
//! to handlers registered with [`Corporal::on_command_error`] and
//! [`Corporal::on_command_error_matching`]; a failure no handler claims ends
//! the session.
//!
//! `clear`, `help` and `quit` are available out of the box and can be
//! disabled or replaced.

mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
pub mod handler;
pub mod input;
mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod registry;
pub mod session;

pub use builtin::BUILTIN_NAMES;
pub use command::{
    Command, CommandResult, EXIT_FAILURE, EXIT_FATAL, EXIT_SUCCESS, ExitCode, FnCommand,
};
pub use config::{ConfigError, CorporalOptions, ShellConfig};
pub use env::Environment;
pub use error::{CommandError, CorporalError, ErrorKind, ValidationError};
pub use handler::{CodeMatcher, Next};
pub use input::{EditorSource, LineSource, ReadLine, SessionInput};
/// The shell driver. See [`Corporal`] for the high-level API.
pub use interpreter::{Corporal, Flow};
pub use io_adapters::{MemReader, MemWriter, Streams};
pub use registry::CommandRegistry;
pub use session::{Prompt, Session};
