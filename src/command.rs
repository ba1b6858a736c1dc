use crate::error::{CommandError, ErrorKind};
use crate::session::Session;
use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// The session ended normally.
pub const EXIT_SUCCESS: ExitCode = 0;
/// Generic failure (I/O, bad configuration, unreadable input).
pub const EXIT_FAILURE: ExitCode = 1;
/// A command definition was malformed, failed to initialize, or failed
/// without any error handler claiming the error.
pub const EXIT_FATAL: ExitCode = 8;

/// Result of a single command invocation.
pub type CommandResult = Result<(), CommandError>;

/// A named unit of behavior that can be invoked from the command loop.
///
/// Every command has a one-line description and an `invoke` action; the
/// remaining hooks are optional. Commands only interact with the outside
/// world through the [`Session`] they are handed.
#[async_trait]
pub trait Command: Send + Sync {
    /// One-line summary shown in the help listing. Must not be empty.
    fn description(&self) -> &str;

    /// Optional multi-line usage text shown by `help <command>`.
    fn help(&self) -> Option<&str> {
        None
    }

    /// Whether this command can actually be invoked.
    ///
    /// Implementations of this trait always can; definitions assembled at
    /// runtime (see [`FnCommand`]) may be missing their action and are
    /// rejected when registered.
    fn has_invoke(&self) -> bool {
        true
    }

    /// One-time setup run before the command loop starts.
    async fn init(&self, _session: &mut Session) -> anyhow::Result<()> {
        Ok(())
    }

    /// Run the command with the arguments that followed its name.
    async fn invoke(&self, session: &mut Session, args: Vec<String>) -> CommandResult;

    /// Completion candidates for the last (possibly empty) argument.
    fn autocomplete(&self, _session: &Session, _args: &[String]) -> Vec<String> {
        Vec::new()
    }
}

type InvokeFn =
    Arc<dyn for<'a> Fn(&'a mut Session, Vec<String>) -> BoxFuture<'a, CommandResult> + Send + Sync>;
type InitFn =
    Arc<dyn for<'a> Fn(&'a mut Session) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync>;
type AutocompleteFn = Arc<dyn Fn(&Session, &[String]) -> Vec<String> + Send + Sync>;

/// A command assembled from closures.
///
/// ```
/// use corporal::FnCommand;
/// use std::io::Write;
///
/// let greet = FnCommand::new("Give a greeting to the current user.")
///     .invoke(|session, _args| {
///         let me = session.env().get_str("me").unwrap_or("stranger").to_string();
///         writeln!(session.stdout(), "Hello, {me}")?;
///         Ok(())
///     });
/// ```
#[derive(Clone, Default)]
pub struct FnCommand {
    description: String,
    help: Option<String>,
    invoke: Option<InvokeFn>,
    init: Option<InitFn>,
    autocomplete: Option<AutocompleteFn>,
}

impl FnCommand {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Use a synchronous closure as the command action.
    pub fn invoke<F>(self, f: F) -> Self
    where
        F: Fn(&mut Session, Vec<String>) -> CommandResult + Send + Sync + 'static,
    {
        self.invoke_async(move |session, args| {
            let result = f(session, args);
            async move { result }.boxed()
        })
    }

    /// Use an asynchronous closure as the command action.
    ///
    /// The returned future may borrow the session:
    /// `.invoke_async(|session, args| async move { ... }.boxed())`.
    pub fn invoke_async<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Session, Vec<String>) -> BoxFuture<'a, CommandResult>
            + Send
            + Sync
            + 'static,
    {
        self.invoke = Some(Arc::new(f));
        self
    }

    pub fn init<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Session) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(f));
        self
    }

    pub fn autocomplete<F>(mut self, f: F) -> Self
    where
        F: Fn(&Session, &[String]) -> Vec<String> + Send + Sync + 'static,
    {
        self.autocomplete = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for FnCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCommand")
            .field("description", &self.description)
            .field("help", &self.help)
            .field("has_invoke", &self.invoke.is_some())
            .field("has_init", &self.init.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Command for FnCommand {
    fn description(&self) -> &str {
        &self.description
    }

    fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    fn has_invoke(&self) -> bool {
        self.invoke.is_some()
    }

    async fn init(&self, session: &mut Session) -> anyhow::Result<()> {
        match &self.init {
            Some(init) => init(session).await,
            None => Ok(()),
        }
    }

    async fn invoke(&self, session: &mut Session, args: Vec<String>) -> CommandResult {
        match &self.invoke {
            Some(invoke) => invoke(session, args).await,
            None => Err(CommandError::new(
                ErrorKind::ERROR,
                "command has no invoke function",
            )),
        }
    }

    fn autocomplete(&self, session: &Session, args: &[String]) -> Vec<String> {
        match &self.autocomplete {
            Some(autocomplete) => autocomplete(session, args),
            None => Vec::new(),
        }
    }
}
