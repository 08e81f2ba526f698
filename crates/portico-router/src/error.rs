//! Route registration errors.

use thiserror::Error;

/// Errors raised while building the route table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// The pattern was empty.
    #[error("route pattern must not be empty")]
    EmptyPattern,

    /// The pattern does not start with `/`.
    #[error("route pattern '{0}' must start with '/'")]
    MissingLeadingSlash(String),

    /// A parameter segment has an empty or non-identifier name.
    #[error("route pattern '{pattern}' has invalid parameter name '{name}'")]
    InvalidParamName {
        /// The offending pattern.
        pattern: String,
        /// The rejected name.
        name: String,
    },

    /// The same parameter name appears twice.
    #[error("route pattern '{pattern}' declares parameter '{name}' more than once")]
    DuplicateParam {
        /// The offending pattern.
        pattern: String,
        /// The repeated name.
        name: String,
    },

    /// The generated expression failed to compile.
    #[error("route pattern '{pattern}' failed to compile: {reason}")]
    Compile {
        /// The offending pattern.
        pattern: String,
        /// Compiler message.
        reason: String,
    },
}
