//! Arithmetic error taxonomy

use thiserror::Error;

/// Failures of checked fixed-point arithmetic.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Division by zero")]
    DivisionByZero,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_math_error_display() {
        assert_eq!(MathError::Overflow.to_string(), "Arithmetic overflow");
        assert_eq!(MathError::DivisionByZero.to_string(), "Division by zero");
    }
}
