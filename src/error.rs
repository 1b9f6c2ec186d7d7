//! Error types for portfolio generation, metrics and session control.

use thiserror::Error;

use crate::types::LoanId;

/// Errors raised by the portfolio engine and the session driver.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetoxError {
    /// Rejected configuration value (e.g. a zero portfolio size).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A metric whose denominator collapsed to zero.
    #[error("Degenerate {metric}: {reason}")]
    DegenerateMetric { metric: &'static str, reason: String },

    /// Slot outside the portfolio.
    #[error("Loan not found: slot {slot} in portfolio of size {size}")]
    LoanNotFound { slot: LoanId, size: usize },

    /// Configuration file could not be read.
    #[error("IO error: {0}")]
    ConfigIo(String),

    /// Configuration file could not be parsed.
    #[error("Parse error: {0}")]
    ConfigParse(String),
}

impl DetoxError {
    pub(crate) fn degenerate(metric: &'static str, reason: impl Into<String>) -> Self {
        DetoxError::DegenerateMetric { metric, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, DetoxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_configuration() {
        let err = DetoxError::InvalidConfiguration("portfolio_size must be at least 1".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: portfolio_size must be at least 1");
    }

    #[test]
    fn display_degenerate_metric() {
        let err = DetoxError::degenerate("score", "concentration index is zero");
        assert_eq!(err.to_string(), "Degenerate score: concentration index is zero");
    }

    #[test]
    fn display_loan_not_found() {
        let err = DetoxError::LoanNotFound { slot: LoanId(12), size: 10 };
        assert_eq!(err.to_string(), "Loan not found: slot 12 in portfolio of size 10");
    }

    #[test]
    fn is_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(DetoxError::ConfigIo("missing".into()));
        assert!(err.to_string().contains("missing"));
    }
}
