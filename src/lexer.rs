//! Splitting of a raw command line into argument tokens.

use thiserror::Error;

/// The input ended before a quote or escape was closed.
///
/// The command loop treats both variants as "not yet closed" and asks for a
/// continuation line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LexingError {
    /// A closing quote (single or double) was not found.
    #[error("unterminated {0} quote")]
    UnfinishedQuote(char),
    /// The input ended right after a backslash.
    #[error("trailing escape character")]
    UnfinishedEscape,
}

/// Where to go back to once an escaped character has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume {
    Start,
    Word,
    DoubleQuote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    /// Between tokens.
    Start,
    /// Inside an unquoted part of a token.
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
    Escaping(Resume),
}

struct LexingFSM<'a> {
    input: std::str::Chars<'a>,
    state: LexingState,
    buffer: String,
    tokens: Vec<String>,
}

impl<'a> LexingFSM<'a> {
    fn new(line: &'a str) -> Self {
        LexingFSM {
            input: line.chars(),
            state: LexingState::Start,
            buffer: String::new(),
            tokens: Vec::new(),
        }
    }

    fn make_tokens(mut self) -> Result<Vec<String>, LexingError> {
        while let Some(ch) = self.input.next() {
            match self.state {
                LexingState::Start => self.handle_start(ch),
                LexingState::ReadingWord => self.handle_word(ch),
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch),
                LexingState::Escaping(resume) => self.handle_escape(ch, resume),
            }
        }

        match self.state {
            LexingState::ReadingSingleQuote => Err(LexingError::UnfinishedQuote('\'')),
            LexingState::ReadingDoubleQuote => Err(LexingError::UnfinishedQuote('"')),
            LexingState::Escaping(_) => Err(LexingError::UnfinishedEscape),
            LexingState::ReadingWord => {
                self.finish_token();
                Ok(self.tokens)
            }
            LexingState::Start => Ok(self.tokens),
        }
    }

    fn handle_start(&mut self, ch: char) {
        match ch {
            c if c.is_whitespace() => {}
            '\'' => self.state = LexingState::ReadingSingleQuote,
            '"' => self.state = LexingState::ReadingDoubleQuote,
            '\\' => self.state = LexingState::Escaping(Resume::Start),
            c => {
                self.buffer.push(c);
                self.state = LexingState::ReadingWord;
            }
        }
    }

    fn handle_word(&mut self, ch: char) {
        match ch {
            c if c.is_whitespace() => {
                self.finish_token();
                self.state = LexingState::Start;
            }
            '\'' => self.state = LexingState::ReadingSingleQuote,
            '"' => self.state = LexingState::ReadingDoubleQuote,
            '\\' => self.state = LexingState::Escaping(Resume::Word),
            c => self.buffer.push(c),
        }
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::ReadingWord,
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) {
        match ch {
            '"' => self.state = LexingState::ReadingWord,
            '\\' => self.state = LexingState::Escaping(Resume::DoubleQuote),
            c => self.buffer.push(c),
        }
    }

    fn handle_escape(&mut self, ch: char, resume: Resume) {
        // An escaped newline joins the two lines.
        if ch != '\n' {
            self.buffer.push(ch);
        }
        self.state = match resume {
            Resume::Start if ch == '\n' => LexingState::Start,
            Resume::Start | Resume::Word => LexingState::ReadingWord,
            Resume::DoubleQuote => LexingState::ReadingDoubleQuote,
        };
    }

    fn finish_token(&mut self) {
        self.tokens.push(std::mem::take(&mut self.buffer));
    }
}

/// Split `line` into argument tokens.
///
/// Tokens are separated by unquoted, unescaped whitespace. Single quotes keep
/// everything literally; double quotes keep everything except `\` escapes; a
/// backslash outside single quotes takes the next character verbatim, and a
/// backslash before a newline removes the newline. A quoted empty string is an
/// empty token.
///
/// Returns a [`LexingError`] when the line ends inside a quote or right after a
/// backslash, so that the caller can append the next line and try again.
pub fn split_into_tokens(line: &str) -> Result<Vec<String>, LexingError> {
    LexingFSM::new(line).make_tokens()
}
