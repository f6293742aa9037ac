use std::fmt;

use thiserror::Error;

use crate::channel::ChannelIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unknown template key '{key}'")]
    UnknownTemplateKey { key: String },

    #[error("{location}: malformed template: {message}")]
    MalformedTemplate {
        message: String,
        location: SourceLocation,
    },

    #[error("{location}: unbound variable '{name}'")]
    UnboundVariable {
        name: String,
        location: SourceLocation,
    },

    #[error("{location}: undefined function '{name}'")]
    UndefinedFunction {
        name: String,
        location: SourceLocation,
    },

    #[error("{location}: {message}")]
    TypeMismatch {
        message: String,
        location: SourceLocation,
    },

    #[error("invalid channel: {}", join_issues(.0))]
    InvalidChannel(Vec<ChannelIssue>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid channel definition: {0}")]
    Json(#[from] serde_json::Error),
}

impl TemplateError {
    pub(crate) fn malformed(message: impl Into<String>, location: SourceLocation) -> Self {
        TemplateError::MalformedTemplate {
            message: message.into(),
            location,
        }
    }

    pub(crate) fn mismatch(message: impl Into<String>, location: SourceLocation) -> Self {
        TemplateError::TypeMismatch {
            message: message.into(),
            location,
        }
    }
}

fn join_issues(issues: &[ChannelIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type TemplateResult<T> = Result<T, TemplateError>;
