//! # Domain Types
//!
//! Core domain types used throughout Teller.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Account      │   │ TransferRequest │   │ TransferReceipt │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (i64)       │   │  from           │   │  transfer_id    │       │
//! │  │  name           │   │  to             │   │  attempts       │       │
//! │  │  email          │   │  amount (> 0)   │   │  balances after │       │
//! │  │  balance (≥ 0)  │   └─────────────────┘   └─────────────────┘       │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │   AccountId     │   │  TransferStep   │                             │
//! │  │  ─────────────  │   │  ─────────────  │                             │
//! │  │  Ord: defines   │   │  begin → lock → │                             │
//! │  │  lock order     │   │  validate → ... │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::money::Amount;
use crate::validation;

// =============================================================================
// Account Identity
// =============================================================================

/// Primary key of an account row.
///
/// The ordering of `AccountId` is the canonical lock order: a transaction
/// touching several accounts always locks them in ascending id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(i64);

impl AccountId {
    #[inline]
    pub const fn new(id: i64) -> Self {
        AccountId(id)
    }

    #[inline]
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Parses `42` or `#42`.
impl FromStr for AccountId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches('#');
        digits
            .parse::<i64>()
            .map(AccountId)
            .map_err(|_| ValidationError::InvalidFormat {
                field: "account id".to_string(),
                reason: format!("'{}' is not an integer id", s.trim()),
            })
    }
}

impl From<i64> for AccountId {
    fn from(id: i64) -> Self {
        AccountId(id)
    }
}

// =============================================================================
// Account
// =============================================================================

/// An account row as stored.
///
/// ## Invariant
/// `balance >= 0` at every transaction boundary. Intermediate states inside a
/// transfer are never visible to other transactions because both rows are
/// locked for the duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    /// Contact identifier.
    pub email: String,
    pub balance: Amount,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an account.
///
/// Only constructible through [`NewAccount::new`], which trims and validates.
/// Deserialization goes through the same path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawNewAccount")]
pub struct NewAccount {
    name: String,
    email: String,
    balance: Amount,
}

impl NewAccount {
    /// Validates and normalizes account input.
    ///
    /// ## Example
    /// ```rust
    /// use teller_core::{Amount, NewAccount};
    ///
    /// let account = NewAccount::new("  Ермек ", "ermek@example.com", Amount::from_major(50)).unwrap();
    /// assert_eq!(account.name(), "Ермек");
    ///
    /// assert!(NewAccount::new("", "a@b.c", Amount::zero()).is_err());
    /// assert!(NewAccount::new("A", "a@b.c", Amount::from_minor(-1)).is_err());
    /// ```
    pub fn new(
        name: impl AsRef<str>,
        email: impl AsRef<str>,
        balance: Amount,
    ) -> Result<Self, ValidationError> {
        let name = name.as_ref().trim();
        let email = email.as_ref().trim();

        validation::validate_account_name(name)?;
        validation::validate_email(email)?;
        validation::validate_opening_balance(balance)?;

        Ok(NewAccount {
            name: name.to_string(),
            email: email.to_lowercase(),
            balance,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }
}

/// Wire shape of [`NewAccount`] before validation.
#[derive(Deserialize)]
struct RawNewAccount {
    name: String,
    email: String,
    balance: Amount,
}

impl TryFrom<RawNewAccount> for NewAccount {
    type Error = ValidationError;

    fn try_from(raw: RawNewAccount) -> Result<Self, Self::Error> {
        NewAccount::new(raw.name, raw.email, raw.balance)
    }
}

// =============================================================================
// Transfer Request
// =============================================================================

/// A validated request to move `amount` from one account to another.
///
/// Holding a `TransferRequest` proves that `amount > 0` and `from != to`.
/// Deserialized requests are validated by [`TransferRequest::new`] too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTransferRequest")]
pub struct TransferRequest {
    from: AccountId,
    to: AccountId,
    amount: Amount,
}

impl TransferRequest {
    /// Validates the request without touching any store.
    pub fn new(from: AccountId, to: AccountId, amount: Amount) -> Result<Self, ValidationError> {
        validation::validate_transfer(from, to, amount)?;
        Ok(TransferRequest { from, to, amount })
    }

    #[inline]
    pub fn from(&self) -> AccountId {
        self.from
    }

    #[inline]
    pub fn to(&self) -> AccountId {
        self.to
    }

    #[inline]
    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Returns both account ids in canonical lock order (ascending).
    ///
    /// ## Why Not Sender First?
    /// ```text
    /// T1: transfer(A → B)          T2: transfer(B → A)
    ///     lock A  ✓                    lock B  ✓
    ///     lock B  … waits on T2        lock A  … waits on T1   ☠ deadlock
    ///
    /// With ascending order both lock min(A,B) first; one of them waits
    /// before holding anything, so no cycle can form.
    /// ```
    pub fn lock_order(&self) -> [AccountId; 2] {
        if self.from <= self.to {
            [self.from, self.to]
        } else {
            [self.to, self.from]
        }
    }

    /// The step name used when locking `account` fails.
    pub fn lock_step(&self, account: AccountId) -> TransferStep {
        if account == self.from {
            TransferStep::LockSender
        } else {
            TransferStep::LockReceiver
        }
    }
}

#[derive(Deserialize)]
struct RawTransferRequest {
    from: AccountId,
    to: AccountId,
    amount: Amount,
}

impl TryFrom<RawTransferRequest> for TransferRequest {
    type Error = ValidationError;

    fn try_from(raw: RawTransferRequest) -> Result<Self, Self::Error> {
        TransferRequest::new(raw.from, raw.to, raw.amount)
    }
}

// =============================================================================
// Transfer Step
// =============================================================================

/// The step of a transfer attempt at which something happened.
///
/// ```text
/// begin ─► lock-sender / lock-receiver (ascending id) ─► validate
///       ─► debit ─► credit ─► commit
/// ```
///
/// Failures at any step before `commit` leave no effect. A failure reported
/// at `commit` is indeterminate: the store may or may not have applied it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferStep {
    Begin,
    LockSender,
    LockReceiver,
    Validate,
    Debit,
    Credit,
    Commit,
}

impl TransferStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStep::Begin => "begin",
            TransferStep::LockSender => "lock-sender",
            TransferStep::LockReceiver => "lock-receiver",
            TransferStep::Validate => "validate",
            TransferStep::Debit => "debit",
            TransferStep::Credit => "credit",
            TransferStep::Commit => "commit",
        }
    }
}

impl fmt::Display for TransferStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transfer Receipt
// =============================================================================

/// Returned for a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Correlation id of the transfer (log spans only, never persisted).
    pub transfer_id: Uuid,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
    /// Attempts used, including the successful one.
    pub attempts: u32,
    pub from_balance: Amount,
    pub to_balance: Amount,
}

// =============================================================================
// Unit Tests
// =============================================================================
