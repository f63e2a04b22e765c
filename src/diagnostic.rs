use serde::{Deserialize, Serialize};

/// Source position reported by the front end.
///
/// `line` and `col` are 1-based, as produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub fn new(line: u32, col: u32) -> Self {
        Span { line, col }
    }
}

/// Category of the construct a diagnostic was raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticSource {
    Unknown,
    Declaration,
    Statement,
    Expression,
}

impl std::fmt::Display for DiagnosticSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DiagnosticSource::Unknown => "unknown",
            DiagnosticSource::Declaration => "declaration",
            DiagnosticSource::Statement => "statement",
            DiagnosticSource::Expression => "expression",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub source: DiagnosticSource,
    pub message: String,
    pub span: Option<Span>,
}

impl std::fmt::Display for Diagnostic {
    /// Formats as `line:col: <source> error: message`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(span) = self.span {
            write!(f, "{}:{}: ", span.line, span.col)?;
        }
        write!(f, "{} error: {}", self.source, self.message)
    }
}

/// How recoverable faults are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorPolicy {
    /// Record the diagnostic and keep generating.
    #[default]
    Accumulate,
    /// Turn the first diagnostic into a run-terminating error.
    FailFast,
}

/// Errors that end a compilation run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("{0}")]
    Fault(Diagnostic),

    #[error("too many errors ({0}), giving up")]
    TooManyErrors(usize),

    /// The driver broke the call contract; never caused by user input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CompileError {
    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }
}

/// Accumulates diagnostics for one compilation run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    policy: ErrorPolicy,
    limit: Option<usize>,
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(policy: ErrorPolicy, limit: Option<usize>) -> Self {
        Self {
            policy,
            limit,
            items: Vec::new(),
        }
    }

    /// Record a fault. Returns an error when the policy or the limit says the
    /// run must stop.
    pub fn report(
        &mut self,
        source: DiagnosticSource,
        message: impl Into<String>,
        span: Option<Span>,
    ) -> Result<(), CompileError> {
        let diagnostic = Diagnostic {
            source,
            message: message.into(),
            span,
        };
        log::warn!("{}", diagnostic);

        if self.policy == ErrorPolicy::FailFast {
            return Err(CompileError::Fault(diagnostic));
        }

        self.items.push(diagnostic);

        match self.limit {
            Some(limit) if self.items.len() > limit => {
                Err(CompileError::TooManyErrors(self.items.len()))
            }
            _ => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}
