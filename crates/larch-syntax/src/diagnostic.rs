//! Diagnostics collected during scanning and parsing.
//!
//! The scanner and parser never abort: problems are accumulated as
//! diagnostics and returned alongside a best-effort result. The library does
//! not render them; each diagnostic carries enough structure (severity,
//! summary, detail, source ranges) for a caller to present however it likes.

use std::fmt;

use crate::Span;

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The problem prevents the affected construct from being understood.
    Error,
    /// The problem deserves attention but does not block progress.
    Warning,
}

/// A single problem found in source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// How severe the problem is.
    pub severity: Severity,
    /// A terse, one-line description of the general problem.
    pub summary: String,
    /// A longer description of the specific problem and what might fix it.
    pub detail: String,
    /// The tight range covering exactly the problematic construct.
    pub subject: Option<Span>,
    /// An optional wider range worth showing around `subject`. When set,
    /// `subject` is always set too and falls inside it.
    pub context: Option<Span>,
}

impl Diagnostic {
    /// Create an error diagnostic with the given summary.
    pub fn error(summary: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            summary: summary.into(),
            detail: String::new(),
            subject: None,
            context: None,
        }
    }

    /// Create a warning diagnostic with the given summary.
    pub fn warning(summary: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: String::new(),
            subject: None,
            context: None,
        }
    }

    /// Attach a detail message.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Attach the subject range.
    pub fn with_subject(mut self, span: Span) -> Self {
        self.subject = Some(span);
        self
    }

    /// Attach the context range.
    pub fn with_context(mut self, span: Span) -> Self {
        self.context = Some(span);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.subject {
            Some(span) => write!(f, "{}: {}", span, self.summary)?,
            None => write!(f, "{}", self.summary)?,
        }
        if !self.detail.is_empty() {
            write!(f, "; {}", self.detail)?;
        }
        Ok(())
    }
}

/// An ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// An empty collection.
    pub fn new() -> Self {
        Diagnostics(Vec::new())
    }

    /// Add one diagnostic.
    pub fn push(&mut self, diag: Diagnostic) {
        self.0.push(diag);
    }

    /// Add every diagnostic from another collection.
    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    /// Whether any diagnostic has [`Severity::Error`].
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of diagnostics collected.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the diagnostics in the order they were found.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// The diagnostics as a slice.
    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.0
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// A compact rendering for embedding in plain error messages: the first
// problem, then a count of the rest.
impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.len() {
            0 => write!(f, "no diagnostics"),
            1 => write!(f, "{}", self.0[0]),
            n => write!(f, "{}, and {} other diagnostic(s)", self.0[0], n - 1),
        }
    }
}
