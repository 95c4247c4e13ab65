//! Error types for template parsing and execution

use thiserror::Error;

/// Template error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    /// Syntax error during parsing
    #[error("Syntax error in template {name}: {message}")]
    Syntax { name: String, message: String },

    /// {{else}} or {{end}} without an open block, or a block left open
    #[error("Structure error in template {name}: {message}")]
    Structure { name: String, message: String },

    /// Call to a function that is not registered
    #[error("Function {0} is not defined")]
    UnknownFunction(String),

    /// Wrong number of arguments for a function
    #[error("Wrong number of arguments for {func}: expected {expected}, got {got}")]
    ArgCount {
        func: String,
        expected: String,
        got: usize,
    },

    /// Argument or operand of the wrong type
    #[error("Type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    /// Any other runtime failure
    #[error("Execution error: {0}")]
    Exec(String),
}

/// Result type for template operations
pub type Result<T> = std::result::Result<T, TemplateError>;

impl TemplateError {
    pub fn syntax(name: impl Into<String>, message: impl Into<String>) -> Self {
        TemplateError::Syntax {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn structure(name: impl Into<String>, message: impl Into<String>) -> Self {
        TemplateError::Structure {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn arg_count(func: impl Into<String>, expected: impl Into<String>, got: usize) -> Self {
        TemplateError::ArgCount {
            func: func.into(),
            expected: expected.into(),
            got,
        }
    }

    pub fn type_mismatch(
        context: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        TemplateError::TypeMismatch {
            context: context.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn exec(message: impl Into<String>) -> Self {
        TemplateError::Exec(message.into())
    }
}
