//! Diagnostic context stack
//!
//! Every problem found while decoding is reported with the location it was
//! found at, e.g. `table orders : page 3 : tuple 12: column 4 overruns the
//! tuple`. Scopes are pushed on the way down (table, page, tuple, column) and
//! popped on the way back; after a failed tuple the stack is truncated back to
//! the tuple scope so later reports still point at the right place.

use crate::{sift_error, sift_info, sift_warn};
use serde::Serialize;
use std::fmt;

/// Category of a reported problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticKind {
    /// Decoded field count disagrees with a layout
    StructuralMismatch,
    /// A read would run past the end of a buffer
    BoundsViolation,
    /// A page header or slot fails a sanity check
    InvariantViolation,
    /// A relation's column schema has a hole
    SchemaGap,
    /// A type id or external value could not be looked up
    UnknownType,
    /// A tuple could not be decoded at all
    DecodeException,
}

impl DiagnosticKind {
    fn level(self) -> log::Level {
        match self {
            DiagnosticKind::SchemaGap => log::Level::Error,
            DiagnosticKind::UnknownType => log::Level::Info,
            _ => log::Level::Warn,
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::StructuralMismatch => "structural mismatch",
            DiagnosticKind::BoundsViolation => "bounds violation",
            DiagnosticKind::InvariantViolation => "invariant violation",
            DiagnosticKind::SchemaGap => "schema gap",
            DiagnosticKind::UnknownType => "unknown type",
            DiagnosticKind::DecodeException => "decode failure",
        };
        f.write_str(name)
    }
}

/// Nesting level of a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scope {
    /// A relation scan
    Table,
    /// One block of a relation
    Page,
    /// One tuple of a page
    Tuple,
    /// One column of a tuple
    Column,
}

impl Scope {
    fn prefix(self) -> &'static str {
        match self {
            Scope::Table => "table",
            Scope::Page => "page",
            Scope::Tuple => "tuple",
            Scope::Column => "column",
        }
    }
}

/// One reported problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Category
    pub kind: DiagnosticKind,
    /// Joined scope stack at report time
    pub location: String,
    /// Description of the problem
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.is_empty() {
            write!(f, "{}: {}", self.kind, self.message)
        } else {
            write!(f, "{}: {}: {}", self.location, self.kind, self.message)
        }
    }
}

/// Scope stack plus the diagnostics reported so far
#[derive(Debug, Clone)]
pub struct DiagnosticContext {
    stack: Vec<(Scope, String)>,
    separator: String,
    collect: bool,
    reported: Vec<Diagnostic>,
}

impl Default for DiagnosticContext {
    fn default() -> Self {
        Self::new(" : ", true)
    }
}

impl DiagnosticContext {
    /// Empty context joining scopes with `separator`
    pub fn new<S: Into<String>>(separator: S, collect: bool) -> Self {
        Self {
            stack: Vec::new(),
            separator: separator.into(),
            collect,
            reported: Vec::new(),
        }
    }

    /// Enter a scope
    pub fn push<L: fmt::Display>(&mut self, scope: Scope, label: L) {
        self.stack.push((scope, label.to_string()));
    }

    /// Leave the innermost scope
    pub fn pop(&mut self) {
        self.stack.pop();
    }

    /// Pop every scope nested deeper than the innermost `scope`
    ///
    /// The innermost `scope` entry itself stays on the stack. When no such
    /// entry exists the stack is left untouched.
    pub fn truncate_to(&mut self, scope: Scope) {
        if let Some(pos) = self.stack.iter().rposition(|(s, _)| *s == scope) {
            self.stack.truncate(pos + 1);
        }
    }

    /// Pop scopes until at most `depth` remain
    pub fn unwind_to(&mut self, depth: usize) {
        self.stack.truncate(depth);
    }

    /// Current nesting depth
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Current location, e.g. `table orders : page 3 : tuple 12`
    pub fn location(&self) -> String {
        self.stack
            .iter()
            .map(|(scope, label)| format!("{} {label}", scope.prefix()))
            .collect::<Vec<_>>()
            .join(&self.separator)
    }

    /// Report a problem at the current location
    pub fn report<M: Into<String>>(&mut self, kind: DiagnosticKind, message: M) {
        let diagnostic = Diagnostic {
            kind,
            location: self.location(),
            message: message.into(),
        };
        match kind.level() {
            log::Level::Error => sift_error!("{diagnostic}"),
            log::Level::Info => sift_info!("{diagnostic}"),
            _ => sift_warn!("{diagnostic}"),
        }
        if self.collect {
            self.reported.push(diagnostic);
        }
    }

    /// Diagnostics collected so far
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.reported
    }

    /// Number of collected diagnostics of one kind
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.reported.iter().filter(|d| d.kind == kind).count()
    }

    /// Drain the collected diagnostics
    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.reported)
    }
}
