//! Block execution results

use crate::error::{Result, ScriptError};
use std::fmt;

/// Outcome of one block; faults never travel past a block as anything else
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Success(Option<String>),
    Error(ScriptError),
}

impl ExecutionResult {
    pub fn success() -> Self {
        ExecutionResult::Success(None)
    }

    pub fn success_with(message: impl Into<String>) -> Self {
        ExecutionResult::Success(Some(message.into()))
    }

    /// Condition evaluated false, nothing happened
    pub fn skipped() -> Self {
        Self::success_with("skipped")
    }

    pub fn error(err: ScriptError) -> Self {
        ExecutionResult::Error(err)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success(_))
    }

    pub fn is_error(&self) -> bool {
        !self.is_success()
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ExecutionResult::Success(Some(m)) if m == "skipped")
    }

    pub fn message(&self) -> Option<String> {
        match self {
            ExecutionResult::Success(message) => message.clone(),
            ExecutionResult::Error(err) => Some(err.to_string()),
        }
    }

    pub fn as_error(&self) -> Option<&ScriptError> {
        match self {
            ExecutionResult::Error(err) => Some(err),
            ExecutionResult::Success(_) => None,
        }
    }
}

impl From<Result<String>> for ExecutionResult {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(message) => ExecutionResult::success_with(message),
            Err(err) => ExecutionResult::Error(err),
        }
    }
}

impl From<Result<()>> for ExecutionResult {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => ExecutionResult::success(),
            Err(err) => ExecutionResult::Error(err),
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionResult::Success(Some(message)) => write!(f, "ok: {}", message),
            ExecutionResult::Success(None) => f.write_str("ok"),
            ExecutionResult::Error(err) => write!(f, "error: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let ok: ExecutionResult = Ok::<_, ScriptError>("set x".to_string()).into();
        assert_eq!(ok, ExecutionResult::success_with("set x"));

        let err: ExecutionResult = Err::<(), _>(ScriptError::Effect("boom".into())).into();
        assert!(err.is_error());
        assert_eq!(err.message().as_deref(), Some("Effect error: boom"));
    }

    #[test]
    fn test_skipped() {
        assert!(ExecutionResult::skipped().is_skipped());
        assert!(ExecutionResult::skipped().is_success());
        assert!(!ExecutionResult::success().is_skipped());
        assert_eq!(ExecutionResult::success().to_string(), "ok");
    }
}
