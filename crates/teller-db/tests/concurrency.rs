//! Concurrent transfers against one file-backed database.

mod common;

use std::time::Duration;

use common::{balance, file_db, file_db_with, open};
use teller_core::{Amount, TransferStep};
use teller_db::{
    AccountRepository, DbError, TransferCoordinator, TransferError, TransferErrorKind,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposing_transfers_all_commit() {
    let t = file_db().await;
    let a = open(&t.db, "Aizhan", 100).await;
    let b = open(&t.db, "Ermek", 50).await;
    let coordinator = TransferCoordinator::from_store(&t.db);

    let mut handles = Vec::new();
    for i in 0..20 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                coordinator.transfer(a, b, Amount::from_minor(100)).await
            } else {
                coordinator.transfer(b, a, Amount::from_minor(70)).await
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // 10 x (-1.00 + 0.70)
    assert_eq!(balance(&t.db, a).await, Amount::from_minor(9_700));
    assert_eq!(balance(&t.db, b).await, Amount::from_minor(5_300));
    assert_eq!(
        t.db.accounts().total_balance().await.unwrap(),
        Amount::from_major(150)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_accounts_conserve_total() {
    let t = file_db().await;
    let mut ids = Vec::new();
    for (i, major) in [40, 10, 0, 25, 5].into_iter().enumerate() {
        ids.push(open(&t.db, &format!("holder{i}"), major).await);
    }
    let coordinator = TransferCoordinator::from_store(&t.db);
    let total = t.db.accounts().total_balance().await.unwrap();

    let mut handles = Vec::new();
    for i in 0..40usize {
        let coordinator = coordinator.clone();
        let from = ids[i % ids.len()];
        let to = ids[(i * 3 + 1) % ids.len()];
        let amount = Amount::from_minor(((i as i64 * 137) % 1_500) + 1);
        handles.push(tokio::spawn(async move {
            if from == to {
                return None;
            }
            Some(coordinator.transfer(from, to, amount).await)
        }));
    }

    for handle in handles {
        match handle.await.unwrap() {
            None | Some(Ok(_)) => {}
            Some(Err(err)) => assert_eq!(
                err.kind(),
                TransferErrorKind::InsufficientFunds,
                "unexpected failure: {err}"
            ),
        }
    }

    let accounts = t.db.accounts().list_all().await.unwrap();
    assert!(accounts.iter().all(|account| !account.balance.is_negative()));
    assert_eq!(accounts.iter().map(|account| account.balance).sum::<Amount>(), total);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn held_lock_times_out_without_effect() {
    let t = file_db_with(|config| config.lock_timeout(Duration::from_millis(200))).await;
    let a = open(&t.db, "Aizhan", 100).await;
    let b = open(&t.db, "Ermek", 50).await;

    let mut holder = t.db.pool().begin().await.unwrap();
    sqlx::query("UPDATE accounts SET balance = balance WHERE id = ?1")
        .bind(a.get())
        .execute(&mut *holder)
        .await
        .unwrap();

    let coordinator = TransferCoordinator::from_store(&t.db);
    let err = coordinator.transfer(a, b, Amount::from_major(15)).await.unwrap_err();

    holder.rollback().await.unwrap();

    assert_eq!(err.kind(), TransferErrorKind::Timeout);
    assert_eq!(err.step(), Some(TransferStep::LockSender));
    assert_eq!(balance(&t.db, a).await, Amount::from_major(100));
    assert_eq!(balance(&t.db, b).await, Amount::from_major(50));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn attempt_deadline_bounds_lock_wait() {
    let t = file_db_with(|config| config.lock_timeout(Duration::from_millis(600))).await;
    let a = open(&t.db, "Aizhan", 100).await;
    let b = open(&t.db, "Ermek", 50).await;

    let mut holder = t.db.pool().begin().await.unwrap();
    sqlx::query("UPDATE accounts SET balance = balance WHERE id = ?1")
        .bind(b.get())
        .execute(&mut *holder)
        .await
        .unwrap();

    let coordinator =
        TransferCoordinator::from_store(&t.db).with_attempt_timeout(Duration::from_millis(100));
    let err = coordinator.transfer(a, b, Amount::from_major(15)).await.unwrap_err();

    holder.rollback().await.unwrap();

    assert!(
        matches!(
            err,
            TransferError::Timeout {
                source: DbError::DeadlineElapsed,
                ..
            }
        ),
        "got {err:?}"
    );
    assert_eq!(balance(&t.db, a).await, Amount::from_major(100));
    assert_eq!(balance(&t.db, b).await, Amount::from_major(50));
}
