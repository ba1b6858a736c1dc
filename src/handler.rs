//! Resolution of command errors to registered handlers.
//!
//! Handlers are grouped by [`ErrorKind`] in the order the kinds were first
//! registered. For a given error, the first group whose kind the error belongs
//! to is chosen, and groups registered later are never consulted. Inside the
//! chosen group the error code is matched in strict priority order:
//!
//! 1. exact string matchers,
//! 2. regex pattern matchers,
//! 3. predicate matchers,
//! 4. handlers registered without a matcher (catch-all).
//!
//! Within each bucket the first registered handler wins. The catch-all bucket
//! applies whenever nothing above matched, whether or not the error has a code.

use crate::error::{CommandError, ErrorKind};
use crate::session::Session;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// What the command loop does after a handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Prompt for the next command.
    Continue,
    /// End the command loop.
    Stop,
}

pub type ErrorHandlerFn = Arc<dyn Fn(&CommandError, &mut Session) -> Next + Send + Sync>;
pub type CodePredicate = Arc<dyn Fn(Option<&str>) -> bool + Send + Sync>;

/// Secondary selector applied to an error's code.
#[derive(Clone)]
pub enum CodeMatcher {
    Exact(String),
    Pattern(Regex),
    Predicate(CodePredicate),
}

impl CodeMatcher {
    pub fn exact(code: impl Into<String>) -> Self {
        Self::Exact(code.into())
    }

    pub fn pattern(pattern: Regex) -> Self {
        Self::Pattern(pattern)
    }

    /// Match with an arbitrary test. The predicate also sees errors without a code.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(Option<&str>) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }
}

impl From<&str> for CodeMatcher {
    fn from(code: &str) -> Self {
        Self::exact(code)
    }
}

impl From<String> for CodeMatcher {
    fn from(code: String) -> Self {
        Self::Exact(code)
    }
}

impl From<Regex> for CodeMatcher {
    fn from(pattern: Regex) -> Self {
        Self::Pattern(pattern)
    }
}

impl fmt::Debug for CodeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(code) => f.debug_tuple("Exact").field(code).finish(),
            Self::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// The priority bucket a handler was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Exact,
    Pattern,
    Predicate,
    CatchAll,
}

/// The handler selected for an error.
#[derive(Clone)]
pub struct Resolution {
    pub kind: ErrorKind,
    pub bucket: Bucket,
    /// Registration index of the handler within its bucket.
    pub index: usize,
    pub handler: ErrorHandlerFn,
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("kind", &self.kind)
            .field("bucket", &self.bucket)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct KindGroup {
    kind: ErrorKind,
    exact: Vec<(String, ErrorHandlerFn)>,
    pattern: Vec<(Regex, ErrorHandlerFn)>,
    predicate: Vec<(CodePredicate, ErrorHandlerFn)>,
    catch_all: Vec<ErrorHandlerFn>,
}

impl KindGroup {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            exact: Vec::new(),
            pattern: Vec::new(),
            predicate: Vec::new(),
            catch_all: Vec::new(),
        }
    }

    fn resolve(&self, code: Option<&str>) -> Option<(Bucket, usize, &ErrorHandlerFn)> {
        if let Some(code) = code {
            let exact = self.exact.iter().position(|(expected, _)| expected == code);
            if let Some(index) = exact {
                return Some((Bucket::Exact, index, &self.exact[index].1));
            }

            let pattern = self.pattern.iter().position(|(re, _)| re.is_match(code));
            if let Some(index) = pattern {
                return Some((Bucket::Pattern, index, &self.pattern[index].1));
            }
        }

        let predicate = self.predicate.iter().position(|(test, _)| test(code));
        if let Some(index) = predicate {
            return Some((Bucket::Predicate, index, &self.predicate[index].1));
        }

        self.catch_all
            .first()
            .map(|handler| (Bucket::CatchAll, 0, handler))
    }
}

/// Ordered chain of error handlers.
#[derive(Clone, Default)]
pub struct ErrorHandlers {
    groups: Vec<KindGroup>,
}

impl ErrorHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Register `handler` for errors of `kind`, optionally narrowed by a code matcher.
    pub fn register(
        &mut self,
        kind: ErrorKind,
        matcher: Option<CodeMatcher>,
        handler: ErrorHandlerFn,
    ) {
        let index = match self.groups.iter().position(|g| g.kind == kind) {
            Some(index) => index,
            None => {
                self.groups.push(KindGroup::new(kind));
                self.groups.len() - 1
            }
        };
        let group = &mut self.groups[index];
        debug!(kind = %group.kind, ?matcher, "registered command error handler");
        match matcher {
            Some(CodeMatcher::Exact(code)) => group.exact.push((code, handler)),
            Some(CodeMatcher::Pattern(re)) => group.pattern.push((re, handler)),
            Some(CodeMatcher::Predicate(test)) => group.predicate.push((test, handler)),
            None => group.catch_all.push(handler),
        }
    }

    /// Register a catch-all handler for `kind`.
    pub fn on<F>(&mut self, kind: ErrorKind, handler: F)
    where
        F: Fn(&CommandError, &mut Session) -> Next + Send + Sync + 'static,
    {
        self.register(kind, None, Arc::new(handler));
    }

    /// Register a handler for `kind` that only applies when `matcher` accepts the code.
    pub fn on_matching<F>(&mut self, kind: ErrorKind, matcher: impl Into<CodeMatcher>, handler: F)
    where
        F: Fn(&CommandError, &mut Session) -> Next + Send + Sync + 'static,
    {
        self.register(kind, Some(matcher.into()), Arc::new(handler));
    }

    /// Select the single handler responsible for `err`, if any.
    pub fn resolve(&self, err: &CommandError) -> Option<Resolution> {
        let group = self.groups.iter().find(|g| err.is_kind(&g.kind))?;
        let (bucket, index, handler) = group.resolve(err.code())?;
        debug!(
            error_kind = %err.kind(),
            group = %group.kind,
            ?bucket,
            index,
            "resolved command error handler"
        );
        Some(Resolution {
            kind: group.kind.clone(),
            bucket,
            index,
            handler: Arc::clone(handler),
        })
    }
}

impl fmt::Debug for ErrorHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.groups.iter().map(|g| {
                (
                    &g.kind,
                    g.exact.len(),
                    g.pattern.len(),
                    g.predicate.len(),
                    g.catch_all.len(),
                )
            }))
            .finish()
    }
}
