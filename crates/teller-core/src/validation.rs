//! # Validation Module
//!
//! Input validation and funds rules for Teller.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request (before any transaction opens)                       │
//! │  ├── amount > 0                       validate_transfer                │
//! │  └── from != to                                                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Locked state (inside the transaction)                        │
//! │  ├── sender.balance >= amount         ensure_sufficient_funds          │
//! │  └── receiver.balance + amount fits   ensure_can_credit                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database                                                     │
//! │  ├── CHECK (balance >= 0)                                              │
//! │  └── UNIQUE (email)                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Amount;
use crate::types::{Account, AccountId};
use crate::{MAX_EMAIL_LENGTH, MAX_NAME_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Transfer Validators
// =============================================================================

/// Validates a transfer request before any store access.
///
/// ## Rules
/// - `amount` must be strictly positive
/// - `from` and `to` must differ
///
/// ## Example
/// ```rust
/// use teller_core::validation::validate_transfer;
/// use teller_core::{AccountId, Amount};
///
/// let (a, b) = (AccountId::new(1), AccountId::new(2));
/// assert!(validate_transfer(a, b, Amount::from_minor(1)).is_ok());
/// assert!(validate_transfer(a, b, Amount::zero()).is_err());
/// assert!(validate_transfer(a, a, Amount::from_minor(1)).is_err());
/// ```
pub fn validate_transfer(from: AccountId, to: AccountId, amount: Amount) -> ValidationResult<()> {
    validate_transfer_amount(amount)?;

    if from == to {
        return Err(ValidationError::SameAccount(from));
    }

    Ok(())
}

/// Validates that a transfer amount is strictly positive.
pub fn validate_transfer_amount(amount: Amount) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
            value: amount,
        });
    }
    Ok(())
}

/// Checks the locked sender balance covers `amount`.
pub fn ensure_sufficient_funds(sender: &Account, amount: Amount) -> CoreResult<()> {
    if sender.balance < amount {
        return Err(CoreError::InsufficientFunds {
            account: sender.id,
            available: sender.balance,
            requested: amount,
        });
    }
    Ok(())
}

/// Checks crediting `amount` cannot overflow the receiver balance.
pub fn ensure_can_credit(receiver: &Account, amount: Amount) -> CoreResult<()> {
    match receiver.balance.checked_add(amount) {
        Some(_) => Ok(()),
        None => Err(CoreError::BalanceOverflow {
            account: receiver.id,
            amount,
        }),
    }
}

// =============================================================================
// Account Validators
// =============================================================================

/// Validates an account display name (already trimmed).
pub fn validate_account_name(name: &str) -> ValidationResult<()> {
    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_LENGTH,
        });
    }

    Ok(())
}

/// Validates a contact email.
///
/// ## Rules
/// - Not empty, at most 254 characters
/// - Exactly one `@`, with something on both sides
/// - No whitespace
///
/// This is a shape check, not RFC 5322 parsing.
pub fn validate_email(email: &str) -> ValidationResult<()> {
    if email.is_empty() {
        return Err(ValidationError::Required {
            field: "email".to_string(),
        });
    }

    if email.chars().count() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong {
            field: "email".to_string(),
            max: MAX_EMAIL_LENGTH,
        });
    }

    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "email".to_string(),
        reason: reason.to_string(),
    };

    if email.chars().any(char::is_whitespace) {
        return Err(invalid("must not contain whitespace"));
    }

    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(invalid("expected exactly one '@' between a local part and a domain")),
    }
}

/// Validates an opening balance (zero allowed, negative not).
pub fn validate_opening_balance(balance: Amount) -> ValidationResult<()> {
    if balance.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "balance".to_string(),
            value: balance,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;

    fn account(id: i64, balance: i64) -> Account {
        Account {
            id: AccountId::new(id),
            name: "Test".to_string(),
            email: format!("user{}@example.com", id),
            balance: Amount::from_minor(balance),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_sufficient_funds_boundary() {
        let sender = account(1, 10_000);

        // Exactly the balance is allowed, leaving zero.
        assert!(ensure_sufficient_funds(&sender, Amount::from_minor(10_000)).is_ok());

        let err = ensure_sufficient_funds(&sender, Amount::from_minor(10_001)).unwrap_err();
        assert_eq!(
            err,
            CoreError::InsufficientFunds {
                account: AccountId::new(1),
                available: Amount::from_minor(10_000),
                requested: Amount::from_minor(10_001),
            }
        );
    }

    #[test]
    fn test_credit_overflow() {
        let receiver = account(2, i64::MAX - 5);
        assert!(ensure_can_credit(&receiver, Amount::from_minor(5)).is_ok());
        assert!(matches!(
            ensure_can_credit(&receiver, Amount::from_minor(6)),
            Err(CoreError::BalanceOverflow { .. })
        ));
    }

    #[rstest]
    #[case("aizhan@example.com")]
    #[case("a@b")]
    fn test_valid_emails(#[case] email: &str) {
        assert!(validate_email(email).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("no-at-sign")]
    #[case("@example.com")]
    #[case("user@")]
    #[case("a@b@c")]
    #[case("a b@c.d")]
    fn test_invalid_emails(#[case] email: &str) {
        assert!(validate_email(email).is_err());
    }

    #[test]
    fn test_name_length_counts_characters() {
        // Cyrillic names are two bytes per char; the limit is on characters.
        let name = "Б".repeat(MAX_NAME_LENGTH);
        assert!(validate_account_name(&name).is_ok());
        let name = "Б".repeat(MAX_NAME_LENGTH + 1);
        assert!(validate_account_name(&name).is_err());
    }

    #[test]
    fn test_opening_balance() {
        assert!(validate_opening_balance(Amount::zero()).is_ok());
        assert!(validate_opening_balance(Amount::from_minor(-1)).is_err());
    }
}
