use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Errors raised while building or querying the custom type table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("custom type '{0}' is already defined")]
    DuplicateType(String),

    #[error("custom type '{0}' has no entries")]
    EmptyMapping(String),

    #[error("custom type '{type_id}' declares code {code} more than once")]
    DuplicateCode { type_id: String, code: u32 },

    #[error("unknown custom type '{0}'")]
    UnknownType(String),

    #[error("custom type '{type_id}' has no label for code {code}")]
    UnknownCode { type_id: String, code: u32 },
}

/// Errors raised while parsing a register map export.
///
/// A parse either yields a complete catalog or one of these; nothing partial
/// is ever returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("line {line}: {reason}: {content:?}")]
    Format {
        line: usize,
        content: String,
        reason: String,
    },

    #[error("line {line}: register '{name}' in group '{group}' already defined at line {first_line}")]
    DuplicateRegister {
        line: usize,
        group: String,
        name: String,
        first_line: usize,
    },

    #[error("line {line}: {source}")]
    Type {
        line: usize,
        #[source]
        source: TypeError,
    },
}

impl ParseError {
    pub fn format(line: usize, content: &str, reason: impl Into<String>) -> Self {
        ParseError::Format {
            line,
            content: content.to_string(),
            reason: reason.into(),
        }
    }

    /// Source line the error refers to.
    pub fn line(&self) -> usize {
        match self {
            ParseError::Format { line, .. }
            | ParseError::DuplicateRegister { line, .. }
            | ParseError::Type { line, .. } => *line,
        }
    }
}

/// Inconsistencies between a register definition and the words read for it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{group}/{name}: expected {expected} register(s), got {actual}")]
    LengthMismatch {
        group: String,
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("{group}/{name}: code {code} is not defined in custom type '{type_id}'")]
    UnknownCode {
        group: String,
        name: String,
        type_id: String,
        code: u32,
    },

    #[error("{group}/{name}: custom type '{type_id}' is not defined")]
    UnknownType {
        group: String,
        name: String,
        type_id: String,
    },
}

/// Opaque failure reported by a transport collaborator.
#[derive(Error, Debug)]
#[error("transport failure: {source}")]
pub struct TransportError {
    #[source]
    source: Box<dyn StdError + Send + Sync>,
}

impl TransportError {
    pub fn new<E>(source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self {
            source: source.into(),
        }
    }

    pub fn message(msg: impl fmt::Display) -> Self {
        Self::new(msg.to_string())
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::new(err)
    }
}

/// Errors returned by a single register query.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("unknown register group '{0}'")]
    UnknownGroup(String),

    #[error("unknown register '{name}' in group '{group}'")]
    UnknownRegister { group: String, name: String },

    #[error("{group}/{name}: reading {count} register(s) at address {address} failed: {source}")]
    Transport {
        group: String,
        name: String,
        address: u16,
        count: u16,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}
