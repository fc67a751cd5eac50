//! Error types for window stage construction and evaluation.

/// Broad failure class of a [`WindowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The stage definition is malformed or incompatible with the input.
    Configuration,
    /// A value had a type the stage cannot work with.
    TypeMismatch,
    /// A configured resource guard was exceeded.
    ResourceLimit,
    /// An invariant of the evaluator itself was violated.
    Internal,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WindowError {
    /// The top-level stage definition is malformed.
    #[error("invalid $setWindowFields stage: {0}")]
    InvalidSpec(String),

    /// `sortBy` is missing or malformed.
    #[error("invalid sortBy: {0}")]
    InvalidSortBy(String),

    /// An expression could not be parsed.
    #[error("invalid expression {expr}: {reason}")]
    InvalidExpression {
        expr: String,
        reason: String,
    },

    /// An output field names a window function that is not registered.
    #[error("unknown window function '{function}' for output field '{field}'")]
    UnknownFunction {
        field: String,
        function: String,
    },

    /// A window bound is malformed.
    #[error("invalid window for output field '{field}': {reason}")]
    InvalidWindow {
        field: String,
        reason: String,
    },

    /// A range-based window met a sort key it cannot do arithmetic on.
    #[error("range-based window for output field '{field}' at document {position}: {reason}")]
    RangeSortKey {
        field: String,
        position: usize,
        reason: String,
    },

    /// The partition expression evaluated to an array.
    #[error("partitionBy expression evaluated to an array at document {position}; partition keys must not be arrays")]
    PartitionKeyArray { position: usize },

    /// A single partition outgrew the configured buffer limit.
    #[error("partition {partition} exceeded the limit of {max} buffered documents")]
    PartitionTooLarge {
        partition: usize,
        max: usize,
    },

    /// Retract was called on an accumulator that cannot retract.
    #[error("accumulator {0} does not support retraction")]
    RetractNotSupported(&'static str),
}

impl WindowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WindowError::InvalidSpec(_)
            | WindowError::InvalidSortBy(_)
            | WindowError::InvalidExpression { .. }
            | WindowError::UnknownFunction { .. }
            | WindowError::InvalidWindow { .. }
            | WindowError::RangeSortKey { .. } => ErrorKind::Configuration,
            WindowError::PartitionKeyArray { .. } => ErrorKind::TypeMismatch,
            WindowError::PartitionTooLarge { .. } => ErrorKind::ResourceLimit,
            WindowError::RetractNotSupported(_) => ErrorKind::Internal,
        }
    }

    pub fn is_type_mismatch(&self) -> bool {
        self.kind() == ErrorKind::TypeMismatch
    }

    pub(crate) fn invalid_window(field: &str, reason: impl Into<String>) -> Self {
        WindowError::InvalidWindow {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
