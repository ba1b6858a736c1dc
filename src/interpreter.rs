use crate::builtin::{HELP, builtins};
use crate::command::Command;
use crate::config::CorporalOptions;
use crate::env::Environment;
use crate::error::{CommandError, CorporalError, ErrorKind};
use crate::handler::{CodeMatcher, Next};
use crate::input::{LineSource, ReadLine};
use crate::lexer::split_into_tokens;
use crate::registry::{CommandRegistry, WILDCARD_CONTEXT};
use crate::session::{Prompt, Session};
use futures_util::FutureExt;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What the loop does after a line has been dealt with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminate,
}

/// A single command call, as resolved from a line or from [`Corporal::exec`].
#[derive(Debug)]
struct Invocation {
    name: String,
    args: Vec<String>,
}

/// An invocation together with how it ended.
struct Completed {
    invocation: Invocation,
    outcome: Result<(), CommandError>,
}

/// Result of collecting one logical line.
enum Collected {
    Tokens(Vec<String>),
    Interrupted,
    Eof,
}

/// An interactive command shell.
///
/// Owns the [`Session`] and drives the read, dispatch and invoke cycle. Failed
/// invocations are routed to the error handlers registered with
/// [`on_command_error`](Self::on_command_error); a failure nobody handles ends
/// the loop with [`CorporalError::Unhandled`].
///
/// A command that panics fails with an error of kind [`ErrorKind::PANIC`].
/// The panic still goes through the process panic hook first, so the default
/// hook prints its `panicked at` message to the real stderr even when a
/// handler recovers. Install a quieter hook with [`std::panic::set_hook`] if
/// that output is unwanted.
///
/// ```no_run
/// use corporal::{Corporal, CorporalOptions, FnCommand, SessionInput};
/// use std::io::Write;
///
/// # async fn demo() -> Result<(), corporal::CorporalError> {
/// let options = CorporalOptions::new().command(
///     "greet",
///     FnCommand::new("Say hello.").invoke(|session, _| {
///         writeln!(session.stdout(), "Hello")?;
///         Ok(())
///     }),
/// );
/// let mut shell = Corporal::new(options).await?;
/// shell.run(&mut SessionInput).await?;
/// # Ok(())
/// # }
/// ```
pub struct Corporal {
    session: Session,
}

impl Corporal {
    /// Validate and register every command, then run each `init` once in
    /// name order.
    pub async fn new(options: CorporalOptions) -> Result<Self, CorporalError> {
        let CorporalOptions {
            commands,
            disabled,
            env,
            command_contexts,
            streams,
        } = options;

        let mut all: BTreeMap<String, Arc<dyn Command>> = builtins(&disabled)
            .into_iter()
            .map(|(name, command)| (name.to_string(), command))
            .collect();
        let builtin_names: Vec<String> = all.keys().cloned().collect();
        for (name, command) in commands {
            if disabled.contains(&name) {
                debug!(command = %name, "skipping disabled command");
                continue;
            }
            all.insert(name, command);
        }

        let contexts: HashMap<String, Vec<String>> = match command_contexts {
            None => HashMap::from([(WILDCARD_CONTEXT.to_string(), all.keys().cloned().collect())]),
            Some(mut contexts) => {
                let wildcard = contexts.entry(WILDCARD_CONTEXT.to_string()).or_default();
                for name in builtin_names {
                    if !wildcard.contains(&name) {
                        wildcard.push(name);
                    }
                }
                contexts
            }
        };

        let mut registry = CommandRegistry::new(contexts);
        for (name, command) in &all {
            registry.register(name.clone(), Arc::clone(command)).inspect_err(|e| {
                error!("{e}");
            })?;
        }

        let mut session = Session::new(Environment::with_vars(env), registry, streams);
        for (name, command) in all {
            debug!(command = %name, "initializing command");
            if let Err(source) = command.init(&mut session).await {
                error!(command = %name, error = %source, "command failed to initialize");
                return Err(CorporalError::Init { name, source });
            }
        }
        info!(
            commands = session.commands().all().len(),
            "shell initialized"
        );

        Ok(Self { session })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Handle failures of `kind` (or any kind descending from it) that were
    /// not claimed by a code-specific handler.
    pub fn on_command_error<F>(&mut self, kind: ErrorKind, handler: F) -> &mut Self
    where
        F: Fn(&CommandError, &mut Session) -> Next + Send + Sync + 'static,
    {
        self.session.error_handlers_mut().on(kind, handler);
        self
    }

    /// Handle failures of `kind` whose code satisfies `matcher`.
    pub fn on_command_error_matching<F>(
        &mut self,
        kind: ErrorKind,
        matcher: impl Into<CodeMatcher>,
        handler: F,
    ) -> &mut Self
    where
        F: Fn(&CommandError, &mut Session) -> Next + Send + Sync + 'static,
    {
        self.session
            .error_handlers_mut()
            .on_matching(kind, matcher, handler);
        self
    }

    /// Invoke a command by name, as if it had been typed.
    pub async fn exec(&mut self, name: &str, args: Vec<String>) -> Result<Flow, CorporalError> {
        let invocation = Invocation {
            name: name.to_string(),
            args,
        };
        let Some(command) = self.session.commands().lookup(&invocation.name).cloned() else {
            self.report_unknown(&invocation.name).await?;
            return Ok(Flow::Continue);
        };
        let completed = self.invoke(command, invocation).await;
        self.settle(completed)
    }

    /// Tokenize and run a complete line.
    ///
    /// Blank and comment lines do nothing. A line with an unclosed quote is a
    /// [`CorporalError::Parse`]; the interactive loop asks for more input
    /// instead.
    pub async fn exec_line(&mut self, line: &str) -> Result<Flow, CorporalError> {
        if is_blank_or_comment(line) {
            return Ok(Flow::Continue);
        }
        let tokens = split_into_tokens(line)?;
        self.dispatch(tokens).await
    }

    /// Read and run lines from `input` until a command quits, a handler stops
    /// the loop, or input ends.
    pub async fn run(&mut self, input: &mut dyn LineSource) -> Result<(), CorporalError> {
        info!("starting command loop");
        loop {
            input.set_completions(self.session.commands().visible_names());
            let tokens = match self.read_command(input)? {
                Collected::Tokens(tokens) => tokens,
                Collected::Interrupted => {
                    debug!("input interrupted");
                    continue;
                }
                Collected::Eof => {
                    debug!("end of input");
                    break;
                }
            };
            if self.dispatch(tokens).await? == Flow::Terminate {
                break;
            }
        }
        info!("command loop finished");
        Ok(())
    }

    /// Completion candidates for the last word of `line`.
    ///
    /// The first word completes from visible command names; later words are
    /// completed by the command named by the first word.
    pub fn complete(&self, line: &str) -> Vec<String> {
        let mut words = split_into_tokens(line)
            .unwrap_or_else(|_| line.split_whitespace().map(str::to_string).collect());
        if words.is_empty() || line.ends_with(char::is_whitespace) {
            words.push(String::new());
        }
        match words.split_first() {
            Some((partial, [])) => self
                .session
                .commands()
                .visible_names()
                .into_iter()
                .filter(|name| name.starts_with(partial.as_str()))
                .collect(),
            Some((name, args)) => self
                .session
                .commands()
                .lookup(name)
                .map(|command| command.autocomplete(&self.session, args))
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }

    fn read_command(&mut self, input: &mut dyn LineSource) -> Result<Collected, CorporalError> {
        let prompt = self.session.render_prompt(Prompt::Primary);
        let mut line = match input.read_line(&prompt, &mut self.session)? {
            ReadLine::Line(line) => line,
            ReadLine::Interrupted => return Ok(Collected::Interrupted),
            ReadLine::Eof => return Ok(Collected::Eof),
        };
        if is_blank_or_comment(&line) {
            return Ok(Collected::Tokens(Vec::new()));
        }

        loop {
            match split_into_tokens(&line) {
                Ok(tokens) => {
                    input.add_history(&line);
                    return Ok(Collected::Tokens(tokens));
                }
                Err(unclosed) => {
                    debug!(reason = %unclosed, "line continues");
                    let prompt = self.session.render_prompt(Prompt::Continuation);
                    match input.read_line(&prompt, &mut self.session)? {
                        ReadLine::Line(next) => {
                            line.push('\n');
                            line.push_str(&next);
                        }
                        ReadLine::Interrupted => return Ok(Collected::Interrupted),
                        ReadLine::Eof => {
                            warn!(reason = %unclosed, "input ended inside an open line");
                            return Ok(Collected::Eof);
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(&mut self, tokens: Vec<String>) -> Result<Flow, CorporalError> {
        let mut tokens = tokens.into_iter().filter(|token| !token.is_empty());
        let Some(name) = tokens.next() else {
            return Ok(Flow::Continue);
        };
        self.exec(&name, tokens.collect()).await
    }

    async fn invoke(&mut self, command: Arc<dyn Command>, invocation: Invocation) -> Completed {
        debug!(command = %invocation.name, args = ?invocation.args, "invoking command");
        let outcome = AssertUnwindSafe(command.invoke(&mut self.session, invocation.args.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(CommandError::from_panic(payload)));
        Completed {
            invocation,
            outcome,
        }
    }

    fn settle(&mut self, completed: Completed) -> Result<Flow, CorporalError> {
        let Completed {
            invocation,
            outcome,
        } = completed;
        let err = match outcome {
            Ok(()) => return Ok(self.next_flow()),
            Err(err) => err,
        };

        let handlers = Arc::clone(self.session.error_handlers());
        let Some(resolution) = handlers.resolve(&err) else {
            error!(command = %invocation.name, error = %err, "unhandled command error");
            return Err(CorporalError::Unhandled {
                command: invocation.name,
                error: err,
            });
        };
        debug!(
            command = %invocation.name,
            kind = %resolution.kind,
            bucket = ?resolution.bucket,
            "handling command error"
        );
        match (resolution.handler)(&err, &mut self.session) {
            Next::Continue => Ok(self.next_flow()),
            Next::Stop => Ok(Flow::Terminate),
        }
    }

    fn next_flow(&self) -> Flow {
        if self.session.has_quit() {
            Flow::Terminate
        } else {
            Flow::Continue
        }
    }

    async fn report_unknown(&mut self, name: &str) -> Result<(), CorporalError> {
        debug!(command = %name, "command not found");
        let stderr = self.session.stderr();
        writeln!(stderr, "Invalid command: {name}")?;
        writeln!(stderr)?;
        if let Some(help) = self.session.commands().get_any(HELP).cloned() {
            if let Err(e) = help.invoke(&mut self.session, vec!["--stderr".into()]).await {
                warn!(error = %e, "failed to list commands");
            }
        }
        Ok(())
    }
}

fn is_blank_or_comment(line: &str) -> bool {
    let line = line.trim_start();
    line.is_empty() || line.starts_with('#')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FnCommand;
    use crate::input::SessionInput;
    use crate::io_adapters::{MemWriter, Streams};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const TYPE_A: ErrorKind = ErrorKind::from_static("TypeAError");

    fn recorder(log: &Arc<Mutex<Vec<String>>>, description: &str) -> FnCommand {
        let log = Arc::clone(log);
        FnCommand::new(description).invoke(move |_, args| {
            log.lock().unwrap().push(args.join(","));
            Ok(())
        })
    }

    async fn shell(options: CorporalOptions, input: &str) -> (Corporal, MemWriter, MemWriter) {
        let (streams, stdout, stderr) = Streams::in_memory(input);
        let shell = Corporal::new(options.streams(streams)).await.unwrap();
        (shell, stdout, stderr)
    }

    #[tokio::test]
    async fn test_builtins_visible_without_contexts() {
        let (shell, _, _) = shell(CorporalOptions::new(), "").await;
        assert_eq!(
            shell.session().commands().visible_names(),
            vec!["clear", "help", "quit"]
        );
    }

    #[tokio::test]
    async fn test_disabled_builtin_is_not_registered() {
        let (shell, _, _) = shell(CorporalOptions::new().disable("clear"), "").await;
        assert!(shell.session().commands().get_any("clear").is_none());
        assert_eq!(
            shell.session().commands().visible_names(),
            vec!["help", "quit"]
        );
    }

    #[tokio::test]
    async fn test_builtins_join_wildcard_context() {
        let options = CorporalOptions::new()
            .command("a", FnCommand::new("a").invoke(|_, _| Ok(())))
            .context("", ["a"]);
        let (mut shell, _, _) = shell(options, "").await;
        assert_eq!(
            shell.session().commands().visible_names(),
            vec!["a", "clear", "help", "quit"]
        );
        shell.session_mut().commands_mut().set_context("other");
        assert_eq!(
            shell.session().commands().visible_names(),
            vec!["clear", "help", "quit"]
        );
    }

    #[tokio::test]
    async fn test_exec_line_passes_tokens() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let options = CorporalOptions::new().command("rec", recorder(&log, "Record."));
        let (mut shell, _, _) = shell(options, "").await;

        let flow = shell.exec_line(r#"rec one "two three" '' four"#).await.unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(*log.lock().unwrap(), vec!["one,two three,four"]);

        assert_eq!(shell.exec_line("   # rec nope").await.unwrap(), Flow::Continue);
        assert_eq!(shell.exec_line("").await.unwrap(), Flow::Continue);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exec_line_reports_unclosed_quote() {
        let (mut shell, _, _) = shell(CorporalOptions::new(), "").await;
        let err = shell.exec_line(r#"help "oops"#).await.unwrap_err();
        assert!(matches!(err, CorporalError::Parse(_)));
    }

    #[tokio::test]
    async fn test_quit_terminates() {
        let (mut shell, _, _) = shell(CorporalOptions::new(), "").await;
        assert_eq!(shell.exec("quit", vec![]).await.unwrap(), Flow::Terminate);
    }

    #[tokio::test]
    async fn test_unknown_command_lists_help_on_stderr() {
        let (mut shell, stdout, stderr) = shell(CorporalOptions::new(), "").await;
        let flow = shell.exec("bleh", vec![]).await.unwrap();

        assert_eq!(flow, Flow::Continue);
        assert!(stdout.contents().is_empty());
        let err = stderr.contents();
        assert!(err.starts_with("Invalid command: bleh\n\nList of available commands:\n"));
        assert!(err.contains("quit:  Quit the interactive shell."));
    }

    #[tokio::test]
    async fn test_unhandled_error_is_fatal() {
        let options = CorporalOptions::new().command(
            "fail",
            FnCommand::new("Fail.").invoke(|_, _| Err(CommandError::new(TYPE_A, "boom"))),
        );
        let (mut shell, _, _) = shell(options, "").await;
        let err = shell.exec("fail", vec![]).await.unwrap_err();
        assert_eq!(err.exit_code(), crate::command::EXIT_FATAL);
        assert!(matches!(err, CorporalError::Unhandled { ref command, .. } if command == "fail"));
    }

    #[tokio::test]
    async fn test_handler_decides_flow() {
        let options = CorporalOptions::new().command(
            "fail",
            FnCommand::new("Fail.").invoke(|_, args| {
                Err(CommandError::new(TYPE_A, "boom").with_code(args.join("")))
            }),
        );
        let (mut shell, _, stderr) = shell(options, "").await;
        shell
            .on_command_error_matching(TYPE_A, "stop", |_, _| Next::Stop)
            .on_command_error(TYPE_A, |err, session| {
                let _ = writeln!(session.stderr(), "handled {}", err.message());
                Next::Continue
            });

        assert_eq!(
            shell.exec("fail", vec!["go".into()]).await.unwrap(),
            Flow::Continue
        );
        assert_eq!(stderr.contents(), "handled boom\n");
        assert_eq!(
            shell.exec("fail", vec!["stop".into()]).await.unwrap(),
            Flow::Terminate
        );
    }

    #[tokio::test]
    async fn test_panic_is_routed_like_an_error() {
        let options = CorporalOptions::new().command(
            "explode",
            FnCommand::new("Explode.").invoke(|_, _| panic!("kaboom")),
        );
        let (mut shell, _, _) = shell(options, "").await;
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        shell.on_command_error(ErrorKind::ERROR, move |err, _| {
            *sink.lock().unwrap() = Some((err.kind().clone(), err.message().to_string()));
            Next::Continue
        });

        assert_eq!(shell.exec("explode", vec![]).await.unwrap(), Flow::Continue);
        assert_eq!(
            *seen.lock().unwrap(),
            Some((ErrorKind::PANIC, "kaboom".to_string()))
        );
    }

    #[tokio::test]
    async fn test_init_runs_in_name_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let tracked = |name: &'static str| {
            let order = Arc::clone(&order);
            FnCommand::new(name).invoke(|_, _| Ok(())).init(move |session| {
                order.lock().unwrap().push(name);
                session.env_mut().set(name, true);
                async { Ok(()) }.boxed()
            })
        };
        let options = CorporalOptions::new()
            .command("zeta", tracked("zeta"))
            .command("alpha", tracked("alpha"));
        let (shell, _, _) = shell(options, "").await;

        assert_eq!(*order.lock().unwrap(), vec!["alpha", "zeta"]);
        assert_eq!(shell.session().env().get("zeta"), Some(&json!(true)));
        assert_eq!(
            shell.session().env().command_settings(HELP),
            Some(&json!({"hide": []}))
        );
    }

    #[tokio::test]
    async fn test_init_failure_is_fatal() {
        let options = CorporalOptions::new().command(
            "broken",
            FnCommand::new("Broken.")
                .invoke(|_, _| Ok(()))
                .init(|_| async { Err(anyhow::anyhow!("no database")) }.boxed()),
        );
        let (streams, _, _) = Streams::in_memory("");
        let err = Corporal::new(options.streams(streams)).await.err().unwrap();
        assert!(matches!(err, CorporalError::Init { ref name, .. } if name == "broken"));
        assert_eq!(err.exit_code(), crate::command::EXIT_FATAL);
    }

    #[tokio::test]
    async fn test_run_reads_continuation_lines() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let options = CorporalOptions::new()
            .command("rec", recorder(&log, "Record."))
            .env("ps1", "$ ")
            .env("ps2", "... ");
        let (mut shell, stdout, _) = shell(options, "rec \"a\nb\" c\nquit\nrec never\n").await;

        shell.run(&mut SessionInput).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a\nb,c"]);
        assert_eq!(stdout.contents(), "$ ... $ ");
    }

    #[tokio::test]
    async fn test_run_stops_at_end_of_input() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let options = CorporalOptions::new().command("rec", recorder(&log, "Record."));
        let (mut shell, _, _) = shell(options, "rec 1\n\n# comment\nrec 2").await;

        shell.run(&mut SessionInput).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["1", "2"]);
    }

    /// Replays a fixed sequence of reads, then reports end of input.
    #[derive(Default)]
    struct Scripted {
        reads: VecDeque<ReadLine>,
        prompts: Vec<String>,
        history: Vec<String>,
    }

    impl Scripted {
        fn new(reads: impl IntoIterator<Item = ReadLine>) -> Self {
            Self {
                reads: reads.into_iter().collect(),
                ..Self::default()
            }
        }
    }

    impl LineSource for Scripted {
        fn read_line(&mut self, prompt: &str, _: &mut Session) -> Result<ReadLine, CorporalError> {
            self.prompts.push(prompt.to_string());
            Ok(self.reads.pop_front().unwrap_or(ReadLine::Eof))
        }

        fn add_history(&mut self, line: &str) {
            self.history.push(line.to_string());
        }
    }

    fn line(text: &str) -> ReadLine {
        ReadLine::Line(text.to_string())
    }

    #[tokio::test]
    async fn test_interrupt_discards_partial_input() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let options = CorporalOptions::new()
            .command("rec", recorder(&log, "Record."))
            .env("ps2", "... ");
        let (mut shell, _, _) = shell(options, "").await;
        let mut input = Scripted::new([
            ReadLine::Interrupted,
            line("rec \"open"),
            ReadLine::Interrupted,
            line("rec ok"),
        ]);

        shell.run(&mut input).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["ok"]);
        assert_eq!(input.prompts, vec!["> ", "> ", "... ", "> ", "> "]);
        assert_eq!(input.history, vec!["rec ok"]);
    }

    #[tokio::test]
    async fn test_end_of_input_inside_open_quote() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let options = CorporalOptions::new()
            .command("rec", recorder(&log, "Record."))
            .env("ps2", "... ");
        let (mut shell, _, _) = shell(options, "").await;
        let mut input = Scripted::new([line("rec 'still"), line("open")]);

        shell.run(&mut input).await.unwrap();
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(input.prompts, vec!["> ", "... ", "... "]);
        assert!(input.history.is_empty());
    }

    #[tokio::test]
    async fn test_complete_names_and_arguments() {
        let options = CorporalOptions::new()
            .command("command1", FnCommand::new("c1").invoke(|_, _| Ok(())))
            .command(
                "pick",
                FnCommand::new("Pick a fruit.")
                    .invoke(|_, _| Ok(()))
                    .autocomplete(|_, args| {
                        let last = args.last().map(String::as_str).unwrap_or_default();
                        ["apple", "apricot", "banana"]
                            .into_iter()
                            .filter(|fruit| fruit.starts_with(last))
                            .map(str::to_string)
                            .collect()
                    }),
            );
        let (shell, _, _) = shell(options, "").await;

        assert_eq!(shell.complete("c"), vec!["clear", "command1"]);
        assert_eq!(shell.complete("pick ap"), vec!["apple", "apricot"]);
        assert_eq!(shell.complete("pick "), vec!["apple", "apricot", "banana"]);
        assert_eq!(shell.complete("help qu"), vec!["quit"]);
        assert!(shell.complete("nope x").is_empty());
    }
}
