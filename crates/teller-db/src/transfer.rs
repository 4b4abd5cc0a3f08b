//! # Transfer Engine
//!
//! Moves money between two accounts atomically.
//!
//! ## One Attempt
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  transfer(from, to, amount)                                            │
//! │       │                                                                 │
//! │       ├── amount ≤ 0 ──────────────────────► InvalidAmount (no tx)     │
//! │       ├── from == to ──────────────────────► InvalidRequest (no tx)    │
//! │       ▼                                                                 │
//! │  begin (read committed, deadline = now + attempt_timeout)              │
//! │       ▼                                                                 │
//! │  lock min(from,to) ─► lock max(from,to)      ← ascending id, always    │
//! │       │  missing ──────────────────────────► NotFound                  │
//! │       │  lock wait / deadline ─────────────► Timeout                   │
//! │       ▼                                                                 │
//! │  validate: sender.balance ≥ amount ────────► InsufficientFunds         │
//! │       ▼                                                                 │
//! │  debit sender ─► credit receiver                                       │
//! │       ▼                                                                 │
//! │  commit ─► TransferReceipt                                             │
//! │                                                                         │
//! │  Any failure after begin rolls back the whole attempt.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Retries
//! Only store conflicts (serialization failure, deadlock victim, SQLite
//! snapshot/lock conflicts) repeat the attempt, with exponential backoff.
//! Business rejections and timeouts are returned after the first attempt.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use teller_core::validation::{ensure_can_credit, ensure_sufficient_funds};
use teller_core::{
    Account, AccountId, Amount, CoreError, TransferReceipt, TransferRequest, TransferStep,
    ValidationError,
};

use crate::error::{DbError, TransferError, TransferErrorKind, TransferOutcome};
use crate::pool::Store;
use crate::repository::AccountRepository;
use crate::transaction::{
    before_deadline, IsolationLevel, ScopeError, TransactionHandle, TransactionManager,
    TransactionSource,
};

// =============================================================================
// Retry Policy
// =============================================================================

/// How often and how patiently a conflicting transfer is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Default: 3
    pub max_attempts: u32,
    /// Delay before the first retry. Default: 10ms
    pub initial_backoff: Duration,
    /// Cap on any single delay. Default: 200ms
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    pub fn max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Attempts actually made; a zero setting still runs once.
    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_backoff,
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Attempt Failure
// =============================================================================

/// How a single attempt failed, before retry bookkeeping.
#[derive(Debug)]
enum AttemptFailure {
    /// A business rule said no. Never retried.
    Rejected(TransferError),
    /// The store failed at `step`.
    Store { step: TransferStep, source: DbError },
}

impl AttemptFailure {
    /// Wraps a store error at `step`; a missing row becomes `NotFound`.
    fn store_for(step: TransferStep, account: AccountId) -> impl FnOnce(DbError) -> AttemptFailure {
        move |source| match source {
            DbError::NotFound { .. } => {
                AttemptFailure::Rejected(TransferError::NotFound { account, step })
            }
            source => AttemptFailure::Store { step, source },
        }
    }

    fn is_transient(&self) -> bool {
        matches!(self, AttemptFailure::Store { source, .. } if source.is_transient())
    }

    fn into_transfer_error(self, attempts: u32) -> TransferError {
        match self {
            AttemptFailure::Rejected(err) => err,
            AttemptFailure::Store { step, source } => {
                TransferError::from_store(step, attempts, source)
            }
        }
    }
}

/// Maps a pre-transaction validation failure.
fn invalid(err: ValidationError) -> TransferError {
    match err {
        ValidationError::MustBePositive { .. } => TransferError::InvalidAmount(err),
        other => TransferError::InvalidRequest {
            reason: other.to_string(),
            step: None,
        },
    }
}

/// Maps a rule violation found against locked rows.
fn rejected(err: CoreError) -> AttemptFailure {
    let err = match err {
        CoreError::InsufficientFunds {
            account,
            available,
            requested,
        } => TransferError::InsufficientFunds {
            account,
            available,
            requested,
        },
        other => TransferError::InvalidRequest {
            reason: other.to_string(),
            step: Some(TransferStep::Validate),
        },
    };
    AttemptFailure::Rejected(err)
}

// =============================================================================
// Attempt Body
// =============================================================================

/// Locks one account, reporting the step by its role in the transfer.
async fn lock<R: AccountRepository>(
    accounts: &R,
    tx: &mut R::Tx,
    request: &TransferRequest,
    id: AccountId,
) -> Result<Account, AttemptFailure> {
    let step = request.lock_step(id);
    let deadline = tx.deadline();
    let account = before_deadline(deadline, accounts.lock_for_update(tx, id))
        .await
        .map_err(AttemptFailure::store_for(step, id))?;
    debug!(%step, account = %id, balance = %account.balance, "Account locked");
    Ok(account)
}

/// Everything between begin and commit. Returns the new balances of
/// (sender, receiver).
async fn apply_transfer<R: AccountRepository>(
    accounts: &R,
    tx: &mut R::Tx,
    request: TransferRequest,
) -> Result<(Amount, Amount), AttemptFailure> {
    let amount = request.amount();
    let deadline = tx.deadline();

    let [first, second] = request.lock_order();
    let first_locked = lock(accounts, tx, &request, first).await?;
    let second_locked = lock(accounts, tx, &request, second).await?;
    let (sender, receiver) = if first == request.from() {
        (first_locked, second_locked)
    } else {
        (second_locked, first_locked)
    };

    ensure_sufficient_funds(&sender, amount).map_err(rejected)?;
    ensure_can_credit(&receiver, amount).map_err(rejected)?;

    before_deadline(deadline, accounts.adjust_balance(tx, sender.id, -amount))
        .await
        .map_err(AttemptFailure::store_for(TransferStep::Debit, sender.id))?;

    before_deadline(deadline, accounts.adjust_balance(tx, receiver.id, amount))
        .await
        .map_err(AttemptFailure::store_for(TransferStep::Credit, receiver.id))?;

    Ok((sender.balance - amount, receiver.balance + amount))
}

// =============================================================================
// Transfer Coordinator
// =============================================================================

/// Runs transfers against a store.
///
/// ## Example
/// ```rust,ignore
/// let coordinator = TransferCoordinator::from_store(&db);
/// let receipt = coordinator
///     .transfer(AccountId::new(1), AccountId::new(2), Amount::from_major(15))
///     .await?;
/// assert_eq!(receipt.from_balance, Amount::from_major(85));
/// ```
#[derive(Debug, Clone)]
pub struct TransferCoordinator<S, R> {
    transactions: TransactionManager<S>,
    accounts: R,
    retry: RetryPolicy,
    isolation: IsolationLevel,
}

impl<S: Store> TransferCoordinator<S, S::Accounts> {
    /// Coordinator using the store's own account repository.
    pub fn from_store(store: &S) -> Self {
        TransferCoordinator::new(store.clone(), store.accounts())
    }
}

impl<S, R> TransferCoordinator<S, R>
where
    S: TransactionSource,
    R: AccountRepository<Tx = S::Handle>,
{
    pub fn new(source: S, accounts: R) -> Self {
        TransferCoordinator {
            transactions: TransactionManager::new(source),
            accounts,
            retry: RetryPolicy::default(),
            isolation: IsolationLevel::ReadCommitted,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the deadline for each attempt, begin through commit.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.transactions = self.transactions.with_attempt_timeout(timeout);
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn accounts(&self) -> &R {
        &self.accounts
    }

    /// Moves `amount` from `from` to `to`.
    ///
    /// On error nothing changed, unless [`TransferError::outcome`] says
    /// `Indeterminate` (failure while committing).
    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<TransferReceipt, TransferError> {
        let request = TransferRequest::new(from, to, amount).map_err(invalid)?;
        self.execute(request).await
    }

    /// Runs an already validated request.
    pub async fn execute(&self, request: TransferRequest) -> Result<TransferReceipt, TransferError> {
        let transfer_id = Uuid::new_v4();
        let span = info_span!(
            "transfer",
            %transfer_id,
            from = %request.from(),
            to = %request.to(),
            amount = %request.amount(),
        );

        self.run(transfer_id, request).instrument(span).await
    }

    async fn run(
        &self,
        transfer_id: Uuid,
        request: TransferRequest,
    ) -> Result<TransferReceipt, TransferError> {
        let max_attempts = self.retry.attempts();
        let mut backoff = self.retry.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(attempt, max_attempts, "Starting transfer attempt");

            let failure = match self.attempt(request).await {
                Ok((from_balance, to_balance)) => {
                    info!(attempt, %from_balance, %to_balance, "Transfer committed");
                    return Ok(TransferReceipt {
                        transfer_id,
                        from: request.from(),
                        to: request.to(),
                        amount: request.amount(),
                        attempts: attempt,
                        from_balance,
                        to_balance,
                    });
                }
                Err(failure) => failure,
            };

            if failure.is_transient() && attempt < max_attempts {
                let delay = backoff.next_backoff().unwrap_or(self.retry.max_backoff);
                if let AttemptFailure::Store { step, source } = &failure {
                    warn!(attempt, %step, error = %source, delay_ms = delay.as_millis() as u64, "Transfer conflicted, retrying");
                }
                tokio::time::sleep(delay).await;
                continue;
            }

            let err = failure.into_transfer_error(attempt);
            report(&err, attempt);
            return Err(err);
        }
    }

    async fn attempt(&self, request: TransferRequest) -> Result<(Amount, Amount), AttemptFailure> {
        let accounts = self.accounts.clone();

        self.transactions
            .with_transaction(self.isolation, move |tx| {
                Box::pin(async move { apply_transfer(&accounts, tx, request).await })
            })
            .await
            .map_err(|scope| match scope {
                ScopeError::Begin(source) => AttemptFailure::Store {
                    step: TransferStep::Begin,
                    source,
                },
                ScopeError::Body(failure) => failure,
                ScopeError::Commit(source) => AttemptFailure::Store {
                    step: TransferStep::Commit,
                    source,
                },
            })
    }
}

/// Logs a final failure at a level matching its kind.
fn report(err: &TransferError, attempts: u32) {
    let step = err.step().map(|s| s.as_str()).unwrap_or("none");
    let kind = err.kind();

    if err.outcome() == TransferOutcome::Indeterminate {
        error!(%kind, step, attempts, error = %err, "Transfer outcome unknown after commit failure");
        return;
    }

    match kind {
        TransferErrorKind::InvalidAmount
        | TransferErrorKind::InvalidRequest
        | TransferErrorKind::NotFound
        | TransferErrorKind::InsufficientFunds => {
            info!(%kind, step, error = %err, "Transfer rejected")
        }
        TransferErrorKind::Conflict | TransferErrorKind::Timeout => {
            warn!(%kind, step, attempts, error = %err, "Transfer aborted")
        }
        TransferErrorKind::Connection | TransferErrorKind::Transaction => {
            error!(%kind, step, attempts, error = %err, "Transfer failed")
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
