use crate::error::CorporalError;
use crate::session::Session;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One attempt at reading a physical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLine {
    /// A line without its trailing newline.
    Line(String),
    /// The user pressed Ctrl-C; whatever was collected so far is dropped.
    Interrupted,
    /// No more input will arrive.
    Eof,
}

/// Where the command loop gets its lines from.
pub trait LineSource {
    /// Show `prompt` and read one line.
    fn read_line(&mut self, prompt: &str, session: &mut Session) -> Result<ReadLine, CorporalError>;

    /// Remember a complete logical line.
    fn add_history(&mut self, _line: &str) {}

    /// Names offered when completing the first word of a line.
    fn set_completions(&mut self, _names: Vec<String>) {}
}

/// Reads from the session's own input stream, writing prompts to its output.
///
/// Used when input is not a terminal, and in tests.
#[derive(Debug, Default)]
pub struct SessionInput;

impl LineSource for SessionInput {
    fn read_line(&mut self, prompt: &str, session: &mut Session) -> Result<ReadLine, CorporalError> {
        let out = session.stdout();
        out.write_all(prompt.as_bytes())?;
        out.flush()?;

        let mut line = String::new();
        if session.stdin().read_line(&mut line)? == 0 {
            return Ok(ReadLine::Eof);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(ReadLine::Line(line))
    }
}

/// Completes the first word of the line from a list of command names.
#[derive(Debug, Default)]
pub struct CommandCompleter {
    names: Vec<String>,
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let before = &line[..pos];
        if before.contains(char::is_whitespace) {
            return Ok((pos, Vec::new()));
        }
        let candidates = self
            .names
            .iter()
            .filter(|name| name.starts_with(before))
            .map(|name| Pair {
                display: name.clone(),
                replacement: format!("{name} "),
            })
            .collect();
        Ok((0, candidates))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Highlighter for CommandCompleter {}

impl Validator for CommandCompleter {}

impl Helper for CommandCompleter {}

/// Interactive terminal input through rustyline, with history and
/// command-name completion.
pub struct EditorSource {
    editor: Editor<CommandCompleter, DefaultHistory>,
    history: Option<PathBuf>,
}

impl EditorSource {
    pub fn new() -> Result<Self, CorporalError> {
        let mut editor = Editor::new()?;
        editor.set_helper(Some(CommandCompleter::default()));
        Ok(Self {
            editor,
            history: None,
        })
    }

    /// Load history from `path` and append every new entry to it.
    ///
    /// A missing file is not an error; it is created on the first save.
    pub fn with_history(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if path.exists() {
            if let Err(e) = self.editor.load_history(path) {
                warn!(path = %path.display(), error = %e, "failed to load history");
            }
        }
        self.history = Some(path.to_path_buf());
        self
    }
}

impl LineSource for EditorSource {
    fn read_line(&mut self, prompt: &str, _session: &mut Session) -> Result<ReadLine, CorporalError> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(ReadLine::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(ReadLine::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadLine::Eof),
            Err(e) => Err(e.into()),
        }
    }

    fn add_history(&mut self, line: &str) {
        if let Err(e) = self.editor.add_history_entry(line) {
            warn!(error = %e, "failed to add history entry");
            return;
        }
        if let Some(path) = &self.history {
            if let Err(e) = self.editor.save_history(path) {
                warn!(path = %path.display(), error = %e, "failed to save history");
            }
        }
    }

    fn set_completions(&mut self, names: Vec<String>) {
        if let Some(helper) = self.editor.helper_mut() {
            helper.names = names;
        }
    }
}
