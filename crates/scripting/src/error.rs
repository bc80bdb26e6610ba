//! Error types for the scripting crate

use housing_core::HousingError;

/// Script-specific error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    /// A block failed validation; the whole script load is rejected
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown or unparseable operation kind or function name
    #[error("Operation error: {0}")]
    Operation(String),

    /// Malformed condition string (evaluated permissively as true)
    #[error("Condition error: {0}")]
    Condition(String),

    /// Recursion/loop guard tripped; aborts the whole run
    #[error("Depth exceeded: entering depth {depth} (max {max})")]
    DepthExceeded { depth: usize, max: usize },

    /// An effect call failed or panicked
    #[error("Effect error: {0}")]
    Effect(String),

    /// Write to the read-only SYSTEM scope
    #[error("Scope violation: {0}")]
    ScopeViolation(String),

    /// Run requested for a script that has not been loaded
    #[error("Script not loaded: {0}")]
    NotLoaded(String),
}

impl ScriptError {
    /// Whether this error ends the run instead of being handled per block
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScriptError::Validation(_) | ScriptError::DepthExceeded { .. } | ScriptError::NotLoaded(_)
        )
    }
}

impl From<ScriptError> for HousingError {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::Effect(message) => HousingError::Effect(message),
            other => HousingError::Script(other.to_string()),
        }
    }
}

/// Result type for scripting operations
pub type Result<T> = std::result::Result<T, ScriptError>;
