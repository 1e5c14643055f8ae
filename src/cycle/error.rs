use std::fmt;

use crate::salience::SalienceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleErrorKind {
    Salience,
    InvalidBatch,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    pub kind: CycleErrorKind,
    pub message: String,
}

impl CycleError {
    pub fn new(kind: CycleErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CycleError {}

impl From<SalienceError> for CycleError {
    fn from(err: SalienceError) -> Self {
        CycleError::new(CycleErrorKind::Salience, format!("salience: {err}"))
    }
}

pub fn invalid_batch(message: impl Into<String>) -> CycleError {
    CycleError::new(CycleErrorKind::InvalidBatch, message)
}

pub fn internal_error(message: impl Into<String>) -> CycleError {
    CycleError::new(CycleErrorKind::Internal, message)
}
