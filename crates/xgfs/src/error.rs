use std::fmt;

use thiserror::Error;

/// Byte range inside the offending input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Location-aware failure report for a single input record.
///
/// `line` is 1-based. `text` holds the raw line so a caller can render the
/// report without re-reading the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    pub message: String,
    pub line: Option<usize>,
    pub text: Option<String>,
    pub span: Option<SourceSpan>,
}

impl ParseDiagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            text: None,
            span: None,
        }
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn at_line(mut self, line: usize, text: &str) -> Self {
        self.line = Some(line);
        self.text = Some(text.to_string());
        self
    }
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {}", line, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Error)]
pub enum XgfsError {
    #[error("format violation: {0}")]
    Format(ParseDiagnostic),

    #[error("identity conflict: {0}")]
    IdentityConflict(ParseDiagnostic),

    #[error("weight policy violation: {0}")]
    WeightPolicy(ParseDiagnostic),

    #[error("invalid artifact: {0}")]
    Codec(String),

    #[error("limit exceeded: {0}")]
    Limit(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl XgfsError {
    pub fn format(message: impl Into<String>) -> Self {
        XgfsError::Format(ParseDiagnostic::new(message))
    }

    pub fn identity(message: impl Into<String>) -> Self {
        XgfsError::IdentityConflict(ParseDiagnostic::new(message))
    }

    pub fn weight(message: impl Into<String>) -> Self {
        XgfsError::WeightPolicy(ParseDiagnostic::new(message))
    }

    pub fn diagnostic(&self) -> Option<&ParseDiagnostic> {
        match self {
            XgfsError::Format(d) | XgfsError::IdentityConflict(d) | XgfsError::WeightPolicy(d) => {
                Some(d)
            }
            _ => None,
        }
    }

    /// Attach line context to a record-level error. Errors that already carry
    /// a line, and non-record errors, pass through untouched.
    pub(crate) fn at_line(self, line: usize, text: &str) -> Self {
        let attach = |d: ParseDiagnostic| {
            if d.line.is_some() {
                d
            } else {
                d.at_line(line, text)
            }
        };
        match self {
            XgfsError::Format(d) => XgfsError::Format(attach(d)),
            XgfsError::IdentityConflict(d) => XgfsError::IdentityConflict(attach(d)),
            XgfsError::WeightPolicy(d) => XgfsError::WeightPolicy(attach(d)),
            other => other,
        }
    }

    pub(crate) fn with_span(self, span: SourceSpan) -> Self {
        let attach = |d: ParseDiagnostic| if d.span.is_some() { d } else { d.with_span(span) };
        match self {
            XgfsError::Format(d) => XgfsError::Format(attach(d)),
            XgfsError::IdentityConflict(d) => XgfsError::IdentityConflict(attach(d)),
            XgfsError::WeightPolicy(d) => XgfsError::WeightPolicy(attach(d)),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, XgfsError>;
