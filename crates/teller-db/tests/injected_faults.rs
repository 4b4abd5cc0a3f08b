//! Rollback and retry behaviour, driven by a repository that fails on cue.

mod common;

use common::{balance, file_db, open, Fault, FaultyRepository};
use teller_core::{Amount, TransferStep};
use teller_db::{
    AccountRepository, DbError, RetryPolicy, TransferCoordinator, TransferError, TransferOutcome,
};

#[tokio::test]
async fn failed_credit_rolls_back_debit() {
    let t = file_db().await;
    let a = open(&t.db, "Aizhan", 100).await;
    let b = open(&t.db, "Ermek", 50).await;
    let repo = FaultyRepository::new(&t.db, Fault::FailCredit);
    let coordinator = TransferCoordinator::new(t.db.clone(), repo);

    let err = coordinator.transfer(a, b, Amount::from_major(15)).await.unwrap_err();

    assert!(
        matches!(
            err,
            TransferError::Transaction {
                step: TransferStep::Credit,
                source: DbError::QueryFailed(_),
            }
        ),
        "got {err:?}"
    );
    assert_eq!(err.outcome(), TransferOutcome::NoEffect);
    assert_eq!(balance(&t.db, a).await, Amount::from_major(100));
    assert_eq!(balance(&t.db, b).await, Amount::from_major(50));
}

#[tokio::test]
async fn conflicts_are_retried_until_success() {
    let t = file_db().await;
    let a = open(&t.db, "Aizhan", 100).await;
    let b = open(&t.db, "Ermek", 50).await;
    let repo = FaultyRepository::new(&t.db, Fault::ConflictOnLock(2));
    let coordinator = TransferCoordinator::new(t.db.clone(), repo.clone());

    let receipt = coordinator.transfer(a, b, Amount::from_major(15)).await.unwrap();

    assert_eq!(receipt.attempts, 3);
    // Two aborted attempts locked once each, the third locked both.
    assert_eq!(repo.locks(), vec![a, a, a, b]);
    assert_eq!(balance(&t.db, a).await, Amount::from_major(85));
    assert_eq!(balance(&t.db, b).await, Amount::from_major(65));
}

#[tokio::test]
async fn exhausted_retries_report_conflict() {
    let t = file_db().await;
    let a = open(&t.db, "Aizhan", 100).await;
    let b = open(&t.db, "Ermek", 50).await;
    let repo = FaultyRepository::new(&t.db, Fault::ConflictOnLock(100));
    let coordinator = TransferCoordinator::new(t.db.clone(), repo.clone());

    let err = coordinator.transfer(a, b, Amount::from_major(15)).await.unwrap_err();

    match &err {
        TransferError::Conflict { attempts, step, .. } => {
            assert_eq!(*attempts, 3);
            assert_eq!(*step, TransferStep::LockSender);
        }
        other => panic!("expected Conflict, got {other:?}"),
    }
    assert_eq!(err.outcome(), TransferOutcome::NoEffect);
    assert_eq!(repo.locks().len(), 3);
    assert_eq!(balance(&t.db, a).await, Amount::from_major(100));
}

#[tokio::test]
async fn retry_budget_is_configurable() {
    let t = file_db().await;
    let a = open(&t.db, "Aizhan", 100).await;
    let b = open(&t.db, "Ermek", 50).await;
    let repo = FaultyRepository::new(&t.db, Fault::ConflictOnLock(1));
    let coordinator =
        TransferCoordinator::new(t.db.clone(), repo.clone()).with_retry_policy(RetryPolicy::no_retry());

    let err = coordinator.transfer(a, b, Amount::from_major(15)).await.unwrap_err();

    assert!(matches!(err, TransferError::Conflict { attempts: 1, .. }));
    assert_eq!(repo.locks().len(), 1);
}

#[tokio::test]
async fn business_rejections_are_not_retried() {
    let t = file_db().await;
    let a = open(&t.db, "Aizhan", 100).await;
    let b = open(&t.db, "Ermek", 50).await;
    let repo = FaultyRepository::new(&t.db, Fault::None);
    let coordinator = TransferCoordinator::new(t.db.clone(), repo.clone());

    let err = coordinator.transfer(a, b, Amount::from_major(500)).await.unwrap_err();

    assert!(matches!(err, TransferError::InsufficientFunds { .. }));
    assert_eq!(repo.locks().len(), 2);
}

#[tokio::test]
async fn locks_follow_ascending_id_regardless_of_direction() {
    let t = file_db().await;
    let a = open(&t.db, "Aizhan", 100).await;
    let b = open(&t.db, "Ermek", 50).await;
    assert!(a < b);
    let repo = FaultyRepository::new(&t.db, Fault::None);
    let coordinator = TransferCoordinator::new(t.db.clone(), repo.clone());

    let receipt = coordinator.transfer(b, a, Amount::from_major(10)).await.unwrap();

    assert_eq!(repo.locks(), vec![a, b]);
    assert_eq!(receipt.from_balance, Amount::from_major(40));
    assert_eq!(receipt.to_balance, Amount::from_major(110));
    assert_eq!(
        t.db.accounts().total_balance().await.unwrap(),
        Amount::from_major(150)
    );
}
