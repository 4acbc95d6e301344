use serde::Serialize;

use super::span::{LineMap, Span};

/// A compilation error with source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileError {
    pub message: String,
    pub span: Span,
    pub kind: ErrorKind,
    /// `[trigger,name]` of the enclosing script, when the error has one.
    pub script: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Lexical,
    Syntax,
    Semantic,
    Codegen,
}

impl CompileError {
    pub fn lexical(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Lexical, message, span)
    }

    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Syntax, message, span)
    }

    pub fn semantic(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Semantic, message, span)
    }

    pub fn codegen(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Codegen, message, span)
    }

    fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind,
            script: None,
        }
    }

    /// Attribute the error to a script.
    pub fn in_script(mut self, script: Option<String>) -> Self {
        self.script = script;
        self
    }

    /// Format the error with source context.
    pub fn format_with_source(&self, source: &str) -> String {
        let (line, col) = LineMap::new(source).position(self.span.start);
        let kind = match self.kind {
            ErrorKind::Lexical => "lexical",
            ErrorKind::Syntax => "syntax",
            ErrorKind::Semantic => "semantic",
            ErrorKind::Codegen => "codegen",
        };
        match &self.script {
            Some(script) => format!("[{kind}] line {line}:{col}: {script}: {}", self.message),
            None => format!("[{kind}] line {line}:{col}: {}", self.message),
        }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CompileError {}

/// Sink every compiler stage reports its errors into.
pub trait ErrorReporter {
    fn report(&mut self, error: CompileError);

    /// Once true, stages stop at their next recovery point.
    fn halted(&self) -> bool {
        false
    }
}

/// Accumulates every error; never halts.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    errors: Vec<CompileError>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take(&mut self) -> Vec<CompileError> {
        std::mem::take(&mut self.errors)
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&mut self, error: CompileError) {
        self.errors.push(error);
    }
}

/// Keeps the first error and halts the running stage.
#[derive(Debug, Default)]
pub struct FailFastReporter {
    first: Option<CompileError>,
}

impl FailFastReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Err` with the first reported error, if any.
    pub fn into_result(self) -> Result<(), CompileError> {
        match self.first {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl ErrorReporter for FailFastReporter {
    fn report(&mut self, error: CompileError) {
        if self.first.is_none() {
            self.first = Some(error);
        }
    }

    fn halted(&self) -> bool {
        self.first.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn format_includes_kind_and_position() {
        let source = "[proc,a]\n$x = 1;";
        let error = CompileError::semantic("Undefined local variable $x", Span::new(9, 11))
            .in_script(Some("[proc,a]".into()));
        assert_eq!(
            error.format_with_source(source),
            "[semantic] line 2:1: [proc,a]: Undefined local variable $x"
        );
    }

    #[test]
    fn collecting_reporter_keeps_everything() {
        let mut reporter = CollectingReporter::new();
        reporter.report(CompileError::lexical("a", Span::default()));
        reporter.report(CompileError::syntax("b", Span::default()));
        assert!(!reporter.halted());
        assert_eq!(reporter.errors().len(), 2);
        assert_eq!(reporter.take().len(), 2);
        assert!(!reporter.has_errors());
    }

    #[test]
    fn fail_fast_keeps_first_and_halts() {
        let mut reporter = FailFastReporter::new();
        assert!(!reporter.halted());
        reporter.report(CompileError::syntax("first", Span::default()));
        reporter.report(CompileError::syntax("second", Span::default()));
        assert!(reporter.halted());
        let error = reporter.into_result().unwrap_err();
        assert_eq!(error.message, "first");
    }
}
