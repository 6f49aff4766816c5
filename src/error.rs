//! Error handler for curata.

use crate::args::ArgName;
use crate::privilege::Privilege;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Enum representing core errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("missing required argument `{0}`")]
    MissingArgument(ArgName),

    #[error("insufficient privileges for {0}")]
    AccessDenied(Privilege),

    #[error("{0}")]
    Validation(String),

    #[error("user `{0}` not found")]
    NotFound(String),

    /// Programming error in a caller or job, never bad user input.
    #[error("invariant violation: {0}")]
    InvariantViolation(&'static str),

    #[error("collaborator failure: {0}")]
    Collaborator(Box<dyn std::error::Error + Send + Sync>),
}

impl CoreError {
    /// Wrap any collaborator (persistence, filesystem) failure.
    pub fn collaborator<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Collaborator(Box::new(err))
    }

    /// Build a user-facing validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub trait ToCollaborator<T> {
    fn catch(self) -> Result<T>;
}

impl<T, E> ToCollaborator<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn catch(self) -> Result<T> {
        self.map_err(|e| CoreError::Collaborator(Box::new(e)))
    }
}
