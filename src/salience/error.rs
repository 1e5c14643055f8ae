use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SalienceErrorKind {
    GateShapeMismatch,
    DuplicateHead,
    InvalidContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalienceError {
    pub kind: SalienceErrorKind,
    pub message: String,
}

impl SalienceError {
    pub fn new(kind: SalienceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for SalienceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SalienceError {}

pub fn gate_shape_mismatch(expected: usize, got: usize) -> SalienceError {
    SalienceError::new(
        SalienceErrorKind::GateShapeMismatch,
        format!("gate vector length {got} does not match head count {expected}"),
    )
}

pub fn duplicate_head(name: &str) -> SalienceError {
    SalienceError::new(
        SalienceErrorKind::DuplicateHead,
        format!("salience head '{name}' is registered more than once"),
    )
}

pub fn invalid_context(message: impl Into<String>) -> SalienceError {
    SalienceError::new(SalienceErrorKind::InvalidContext, message)
}
