//! # Error Types
//!
//! Domain-specific error types for teller-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  teller-core errors (this file)                                        │
//! │  ├── CoreError        - Funds / balance rule violations                │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  teller-db errors (separate crate)                                     │
//! │  ├── DbError          - Store operation failures                       │
//! │  └── TransferError    - What a transfer caller branches on             │
//! │                                                                         │
//! │  Flow: ValidationError / CoreError → TransferError → CLI               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::money::Amount;
use crate::types::AccountId;

// =============================================================================
// Core Error
// =============================================================================

/// Balance rule violations detected against locked account state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The sender's balance does not cover the requested amount.
    ///
    /// ## When This Occurs
    /// ```text
    /// transfer(A → B, 200.00)
    ///      │
    ///      ▼
    /// lock A: balance = 100.00
    ///      │
    ///      ▼
    /// InsufficientFunds { account: #A, available: 100.00, requested: 200.00 }
    ///      │
    ///      ▼
    /// rollback, nothing changes
    /// ```
    #[error("Insufficient funds in account {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        available: Amount,
        requested: Amount,
    },

    /// Crediting the account would overflow its balance.
    #[error("Balance of account {account} would overflow when credited {amount}")]
    BalanceOverflow { account: AccountId, amount: Amount },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These are raised before any store access; they never have side effects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be strictly positive.
    #[error("{field} must be greater than zero, got {value}")]
    MustBePositive { field: String, value: Amount },

    /// Value must not be negative.
    #[error("{field} must not be negative, got {value}")]
    MustNotBeNegative { field: String, value: Amount },

    /// Sender and receiver are the same account.
    #[error("cannot transfer from account {0} to itself")]
    SameAccount(AccountId),

    /// Invalid format (e.g., malformed email, unparsable amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientFunds {
            account: AccountId::new(1),
            available: Amount::from_minor(10_000),
            requested: Amount::from_minor(20_000),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds in account #1: available 100.00, requested 200.00"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::MustBePositive {
            field: "amount".to_string(),
            value: Amount::from_minor(-500),
        };
        assert_eq!(err.to_string(), "amount must be greater than zero, got -5.00");

        let err = ValidationError::SameAccount(AccountId::new(4));
        assert_eq!(err.to_string(), "cannot transfer from account #4 to itself");
    }
}
