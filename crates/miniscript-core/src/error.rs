use std::fmt;

/// Failure kinds raised by the compiler and the TAC machine.
///
/// Script code cannot catch these; they unwind to `run_until_done`, which
/// annotates them with the offending source line and reports through the
/// host's error sink.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MsError {
    #[error("Compiler Error: {0}")]
    Compiler(String),

    /// Catch-all for conditions the machine cannot classify more precisely
    /// (bad opcode operands, call-protocol violations, and the like).
    #[error("Runtime Error: {0}")]
    Runtime(String),

    #[error("Type Error: {0}")]
    Type(String),

    /// Map lookup missed after a full `__isa` walk.
    #[error("Key Not Found: {0}")]
    Key(String),

    /// List/string index outside `[-n, n-1]`.
    #[error("Index Error: {0}")]
    Index(String),

    /// A result blew past the string/list size cap, or an `__isa` chain
    /// ran longer than the hop limit.
    #[error("Limit Exceeded: {0}")]
    LimitExceeded(String),

    #[error("Undefined Identifier: '{0}' is unknown in this context")]
    Undefined(String),

    #[error("{inner} [line {line}]")]
    AtLine { inner: Box<MsError>, line: Location },
}

/// 1-based source line; the only location information the engine tracks.
pub type Location = usize;

impl MsError {
    pub fn compiler(msg: impl Into<String>) -> Self {
        MsError::Compiler(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        MsError::Runtime(msg.into())
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        MsError::Type(msg.into())
    }

    pub fn key_error(key: impl fmt::Display) -> Self {
        MsError::Key(format!("'{key}' not found in map"))
    }

    pub fn index_error(kind: &str, index: f64, count: usize) -> Self {
        MsError::Index(format!("{kind} index {index} out of range (count {count})"))
    }

    pub fn limit(msg: impl Into<String>) -> Self {
        MsError::LimitExceeded(msg.into())
    }

    pub fn undefined(name: impl Into<String>) -> Self {
        MsError::Undefined(name.into())
    }

    /// Annotate with a source line. A no-op if a line is already attached,
    /// so the innermost annotation wins as the error unwinds.
    pub fn with_line(self, line: Location) -> Self {
        match self {
            MsError::AtLine { .. } => self,
            other if line > 0 => MsError::AtLine {
                inner: Box::new(other),
                line,
            },
            other => other,
        }
    }

    /// Strip any line annotation, yielding the underlying failure.
    pub fn inner(&self) -> &MsError {
        match self {
            MsError::AtLine { inner, .. } => inner.inner(),
            other => other,
        }
    }

    pub fn line(&self) -> Option<Location> {
        match self {
            MsError::AtLine { line, .. } => Some(*line),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_annotation_is_sticky() {
        let err = MsError::type_error("can't add a map to a number")
            .with_line(3)
            .with_line(9);
        assert_eq!(err.line(), Some(3));
        assert!(matches!(err.inner(), MsError::Type(_)));
    }

    #[test]
    fn display_includes_kind_and_line() {
        let err = MsError::key_error("speak").with_line(12);
        assert_eq!(
            err.to_string(),
            "Key Not Found: 'speak' not found in map [line 12]"
        );
    }

    #[test]
    fn zero_line_is_not_attached() {
        let err = MsError::runtime("boom").with_line(0);
        assert_eq!(err.line(), None);
    }
}
