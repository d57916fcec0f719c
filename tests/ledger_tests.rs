// Integration tests for the quota ledger
//
// Reservation admission under concurrency, settlement idempotency and
// period rollover.

mod common;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use futures::future::join_all;
use intentx_sessions::{
    CoordinatorError, ErrorKind, LedgerKey, MemoryLedgerStore, QuotaLedger, Settlement,
    Subscription, DEFAULT_MAX_CAS_ATTEMPTS,
};
use std::sync::Arc;
use std::time::Duration;

fn ledger() -> QuotaLedger {
    QuotaLedger::new(Arc::new(MemoryLedgerStore::new()), DEFAULT_MAX_CAS_ATTEMPTS)
}

fn subscription(user_id: &str, plan_id: &str, days_ago: i64) -> Subscription {
    let start = Utc::now() - ChronoDuration::days(days_ago);
    Subscription::new(user_id, plan_id, start, start + ChronoDuration::days(30))
}

// A reserve only loses a race to a granted reserve, so with LIMIT below the
// attempt budget no caller can run out of attempts
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reserves_never_over_admit() -> Result<()> {
    const LIMIT: u32 = 16;
    assert!(LIMIT < DEFAULT_MAX_CAS_ATTEMPTS);
    let ledger = ledger();
    let plan = common::plan("pro", Some(LIMIT));
    let sub = subscription("user-1", "pro", 0);

    let attempts = (0..LIMIT * 2).map(|_| {
        let ledger = ledger.clone();
        let plan = plan.clone();
        let sub = sub.clone();
        tokio::spawn(async move { ledger.reserve(&sub, &plan).await })
    });
    let results = join_all(attempts).await;

    let mut granted = 0;
    let mut exceeded = 0;
    for result in results {
        match result? {
            Ok(_) => granted += 1,
            Err(CoordinatorError::QuotaExceeded { limit, .. }) => {
                assert_eq!(limit, LIMIT);
                exceeded += 1;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(granted, LIMIT);
    assert_eq!(exceeded, LIMIT);

    let entry = ledger.usage(&LedgerKey::new("user-1", sub.period_key())).await?;
    assert_eq!(entry.reserved, LIMIT);
    assert_eq!(entry.consumed, 0);
    Ok(())
}

#[tokio::test]
async fn test_commit_is_idempotent() -> Result<()> {
    let ledger = ledger();
    let plan = common::plan("pro", Some(3));
    let sub = subscription("user-1", "pro", 0);
    let key = LedgerKey::new("user-1", sub.period_key());

    let token = ledger.reserve(&sub, &plan).await?;
    assert_eq!(ledger.commit(&token).await?, Settlement::Committed);
    let once = ledger.usage(&key).await?;

    assert_eq!(ledger.commit(&token).await?, Settlement::Committed);
    let twice = ledger.usage(&key).await?;

    assert_eq!(once.consumed, 1);
    assert_eq!(once.reserved, 0);
    assert_eq!(once, twice);
    Ok(())
}

#[tokio::test]
async fn test_release_is_idempotent() -> Result<()> {
    let ledger = ledger();
    let plan = common::plan("pro", Some(1));
    let sub = subscription("user-1", "pro", 0);
    let key = LedgerKey::new("user-1", sub.period_key());

    let token = ledger.reserve(&sub, &plan).await?;
    assert_eq!(ledger.release(&token).await?, Settlement::Released);
    let once = ledger.usage(&key).await?;
    assert_eq!(ledger.release(&token).await?, Settlement::Released);
    assert_eq!(once, ledger.usage(&key).await?);

    assert_eq!(once.consumed, 0);
    assert_eq!(once.reserved, 0);

    // The released unit is available again
    ledger.reserve(&sub, &plan).await?;
    Ok(())
}

#[tokio::test]
async fn test_first_settlement_wins() -> Result<()> {
    let ledger = ledger();
    let plan = common::plan("pro", Some(2));
    let sub = subscription("user-1", "pro", 0);
    let key = LedgerKey::new("user-1", sub.period_key());

    let committed = ledger.reserve(&sub, &plan).await?;
    ledger.commit(&committed).await?;
    assert_eq!(ledger.release(&committed).await?, Settlement::Committed);

    let released = ledger.reserve(&sub, &plan).await?;
    ledger.release(&released).await?;
    assert_eq!(ledger.commit(&released).await?, Settlement::Released);

    let entry = ledger.usage(&key).await?;
    assert_eq!(entry.consumed, 1);
    assert_eq!(entry.reserved, 0);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_duplicate_commits_count_once() -> Result<()> {
    let ledger = ledger();
    let plan = common::plan("pro", Some(1));
    let sub = subscription("user-1", "pro", 0);
    let token = ledger.reserve(&sub, &plan).await?;

    let commits = (0..8).map(|_| ledger.commit(&token));
    for result in join_all(commits).await {
        assert_eq!(result?, Settlement::Committed);
    }

    let entry = ledger.usage(&token.key).await?;
    assert_eq!(entry.consumed, 1);
    assert_eq!(entry.reserved, 0);
    Ok(())
}

#[tokio::test]
async fn test_new_period_resets_consumption() -> Result<()> {
    let ledger = ledger();
    let plan = common::plan("pro", Some(1));

    let previous = subscription("user-1", "pro", 31);
    let token = ledger.reserve(&previous, &plan).await?;
    ledger.commit(&token).await?;
    assert!(matches!(
        ledger.reserve(&previous, &plan).await,
        Err(CoordinatorError::QuotaExceeded { .. })
    ));

    let current = subscription("user-1", "pro", 0);
    assert_ne!(previous.period_key(), current.period_key());
    let token = ledger.reserve(&current, &plan).await?;
    assert_eq!(token.key.period_key, current.period_key());
    Ok(())
}

#[tokio::test]
async fn test_unlimited_plan_admits_everything() -> Result<()> {
    let ledger = ledger();
    let plan = common::plan("enterprise", None);
    let sub = subscription("user-1", "enterprise", 0);

    for _ in 0..50 {
        ledger.reserve(&sub, &plan).await?;
    }

    let entry = ledger.usage(&LedgerKey::new("user-1", sub.period_key())).await?;
    assert_eq!(entry.reserved, 50);
    Ok(())
}

#[tokio::test]
async fn test_users_do_not_share_quota() -> Result<()> {
    let ledger = ledger();
    let plan = common::plan("starter", Some(1));

    ledger.reserve(&subscription("alice", "starter", 0), &plan).await?;
    ledger.reserve(&subscription("bob", "starter", 0), &plan).await?;
    Ok(())
}

#[tokio::test]
async fn test_stale_reservations_respect_cutoff() -> Result<()> {
    let ledger = ledger();
    let plan = common::plan("pro", Some(5));
    let sub = subscription("user-1", "pro", 0);

    let open = ledger.reserve(&sub, &plan).await?;
    let settled = ledger.reserve(&sub, &plan).await?;
    ledger.commit(&settled).await?;

    assert!(ledger
        .stale_reservations(Utc::now() - ChronoDuration::hours(1))
        .await?
        .is_empty());

    let stale = ledger
        .stale_reservations(Utc::now() + ChronoDuration::seconds(1))
        .await?;
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, open.id);
    Ok(())
}

#[tokio::test]
async fn test_settled_ids_are_forgotten_after_retention() -> Result<()> {
    let ledger = QuotaLedger::new(Arc::new(MemoryLedgerStore::new()), DEFAULT_MAX_CAS_ATTEMPTS)
        .with_settled_retention(Duration::from_millis(20));
    let plan = common::plan("unlimited", None);
    let sub = subscription("user-1", "unlimited", 0);

    for _ in 0..50 {
        let token = ledger.reserve(&sub, &plan).await?;
        ledger.release(&token).await?;
    }
    let first = ledger.reserve(&sub, &plan).await?;
    ledger.commit(&first).await?;
    assert_eq!(ledger.commit(&first).await?, Settlement::Committed);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let next = ledger.reserve(&sub, &plan).await?;

    let entry = ledger.usage(&next.key).await?;
    assert!(entry.settled.is_empty());
    assert_eq!((entry.consumed, entry.reserved), (1, 1));

    // Too late to recognise the duplicate, and the counters stay put
    let err = ledger.commit(&first).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
    let entry = ledger.usage(&next.key).await?;
    assert_eq!((entry.consumed, entry.reserved), (1, 1));
    Ok(())
}

#[tokio::test]
async fn test_recent_settlements_survive_pruning() -> Result<()> {
    let ledger = ledger();
    let plan = common::plan("pro", Some(3));
    let sub = subscription("user-1", "pro", 0);

    let first = ledger.reserve(&sub, &plan).await?;
    ledger.release(&first).await?;
    ledger.reserve(&sub, &plan).await?;

    assert_eq!(ledger.commit(&first).await?, Settlement::Released);
    let entry = ledger.usage(&first.key).await?;
    assert_eq!(entry.settled.len(), 1);
    Ok(())
}
