//! The result channel carried between stages.
//!
//! Stages never panic to report an ordinary fault. They return an [`Outcome`],
//! which is either the produced value or a [`Failure`]. Failures are shared,
//! not copied: cloning a `Failure` hands out another reference to the same
//! error, since an error is a terminal fact once produced.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Outcome of a stage: `Ok` carries the produced value, `Err` a [`Failure`].
pub type Outcome<T> = Result<T, Failure>;

/// Errors that can travel through a chain.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageError {
    /// Failure raised by a stage function, with a human-readable description.
    #[error("{0}")]
    Message(String),

    /// `stream` was entered through a stage that cannot reach its chain head.
    #[error("not executed by head")]
    NotExecutedByHead,

    /// The stage has not run in any traversal yet.
    #[error("not executed")]
    NotExecuted,

    /// An option-returning stage produced nothing.
    #[error("step failed {stage}")]
    EmptyOutput {
        /// Display name of the stage.
        stage: String,
    },

    /// The value was moved on to the next stage by a fail-fast traversal.
    #[error("result of {stage} was handed to the next stage")]
    Consumed {
        /// Display name of the stage.
        stage: String,
    },

    /// A stage handle does not belong to the chain it was used with.
    #[error("unknown stage {index}")]
    UnknownStage {
        /// Index carried by the handle.
        index: usize,
    },

    /// A stored value did not have the type the stage expected.
    #[error("unexpected value type at {stage}")]
    TypeMismatch {
        /// Display name of the stage.
        stage: String,
    },
}

/// A shared, immutable error value.
///
/// `Failure` is cheap to clone and every clone points at the same
/// [`StageError`]. Use [`Failure::ptr_eq`] to check identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Failure(Arc<StageError>);

impl Failure {
    /// Create a failure with a human-readable description.
    pub fn new(message: impl Into<String>) -> Self {
        Self::from(StageError::Message(message.into()))
    }

    /// Get the underlying error.
    pub fn error(&self) -> &StageError {
        &self.0
    }

    /// Get the description of this failure.
    pub fn message(&self) -> String {
        self.0.to_string()
    }

    /// Returns `true` if both failures share the same error allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Returns `true` if this failure reports an unreachable chain head.
    pub fn is_not_executed_by_head(&self) -> bool {
        matches!(*self.0, StageError::NotExecutedByHead)
    }

    pub(crate) fn not_executed() -> Self {
        Self::from(StageError::NotExecuted)
    }
}

impl From<StageError> for Failure {
    fn from(error: StageError) -> Self {
        Self(Arc::new(error))
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Failure").field(&*self.0).finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.0)
    }
}

/// Wrap a value as a successful outcome.
pub fn success<T>(value: T) -> Outcome<T> {
    Ok(value)
}

/// Build a failed outcome with the given description.
pub fn failure<T>(message: impl Into<String>) -> Outcome<T> {
    Err(Failure::new(message))
}
