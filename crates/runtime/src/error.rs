use crate::model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Policy(#[from] policy::Error),
}

impl Error {
    /// True when the turn was cut short by a newer one.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Model(e) if e.is_cancelled())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
