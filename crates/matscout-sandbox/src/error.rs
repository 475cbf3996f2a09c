//! Errors raised while parsing or running a fragment.
//!
//! Display strings mimic the Python exception names the model is used to
//! seeing, since they are fed back verbatim as observations.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SandboxError {
    #[error("SyntaxError: {message} (line {line})")]
    Syntax { line: usize, message: String },

    #[error("NameError: name '{0}' is not defined")]
    Name(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("ValueError: {0}")]
    Value(String),

    #[error("IndexError: {0}")]
    Index(String),

    #[error("KeyError: {0}")]
    Key(String),

    #[error("AttributeError: {0}")]
    Attribute(String),

    #[error("OverflowError: {0}")]
    Overflow(String),

    #[error("ZeroDivisionError: division by zero")]
    ZeroDivision,

    #[error("ImportError: import of '{module}' is not allowed. Authorized imports are: {allowed:?}")]
    Import { module: String, allowed: Vec<String> },

    /// A call to a name that is neither a builtin nor a host function.
    #[error("unknown tool '{0}'")]
    Forbidden(String),

    #[error("InterpreterError: operation budget of {0} exceeded")]
    Budget(u64),

    /// A host function refused the call (bad arguments, unknown tool).
    #[error("{0}")]
    Host(String),
}
