//! BalanceStore interface tests.
//!
//! These tests verify the contract of the BalanceStore trait.
//! Each storage implementation should run these tests.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use futures::future::join_all;
use uuid::Uuid;

use promoshare::model::{Currency, EntryKind, LedgerBatch, MasterKeyGrant, Posting, QuotaClaim};
use promoshare::storage::{BalanceStore, StorageError};

use super::at;

fn earn(user: Uuid, currency: Currency, amount: i64) -> Posting {
    Posting::earn(user, currency, amount, "test_earn")
}

fn spend(user: Uuid, currency: Currency, amount: i64) -> Posting {
    Posting::spend(user, currency, amount, "test_spend")
}

// =============================================================================
// BalanceStore::balance tests
// =============================================================================

pub async fn test_balance_created_lazily<S: BalanceStore>(store: &S) {
    let user = Uuid::new_v4();

    let balance = store.balance(user).await.expect("balance should succeed");
    assert_eq!(balance.user_id, user);
    for currency in Currency::ALL {
        assert_eq!(balance.quantity(currency), 0);
    }
    assert_eq!(balance.daily_conversion_count, 0);
    assert!(!balance.master_key_active);

    let again = store.balance(user).await.expect("second balance should succeed");
    assert_eq!(again, balance);
}

// =============================================================================
// BalanceStore::apply tests
// =============================================================================

pub async fn test_apply_credit_and_debit<S: BalanceStore>(store: &S) {
    let user = Uuid::new_v4();

    let credited = store
        .apply(LedgerBatch::single(
            earn(user, Currency::Points, 700).with_reference(Some("quest-1".to_string())),
        ))
        .await
        .expect("credit should succeed");
    let debited = store
        .apply(LedgerBatch::single(
            spend(user, Currency::Points, 250).with_description(Some("shop".to_string())),
        ))
        .await
        .expect("debit should succeed");

    assert_eq!(credited.len(), 1);
    assert_eq!(credited[0].signed_amount, 700);
    assert_eq!(credited[0].kind, EntryKind::Earn);
    assert_eq!(credited[0].reference_id.as_deref(), Some("quest-1"));
    assert_eq!(debited[0].signed_amount, -250);
    assert_eq!(debited[0].kind, EntryKind::Spend);
    assert_eq!(debited[0].description.as_deref(), Some("shop"));
    assert!(debited[0].id > credited[0].id, "ledger ids must be monotonic");

    let balance = store.balance(user).await.expect("balance should succeed");
    assert_eq!(balance.quantity(Currency::Points), 450);
}

pub async fn test_insufficient_funds_rolls_back_batch<S: BalanceStore>(store: &S) {
    let user = Uuid::new_v4();
    store
        .apply(LedgerBatch::single(earn(user, Currency::Gems, 10)))
        .await
        .expect("seed should succeed");

    let err = store
        .apply(LedgerBatch {
            postings: vec![earn(user, Currency::Points, 500), spend(user, Currency::Gems, 11)],
            ..Default::default()
        })
        .await
        .expect_err("overdraft should fail");

    match err {
        StorageError::InsufficientFunds {
            currency,
            available,
            requested,
            ..
        } => {
            assert_eq!(currency, Currency::Gems);
            assert_eq!(available, 10);
            assert_eq!(requested, 11);
        }
        other => panic!("expected InsufficientFunds, got {other:?}"),
    }

    let balance = store.balance(user).await.expect("balance should succeed");
    assert_eq!(balance.quantity(Currency::Points), 0, "earlier posting must roll back");
    assert_eq!(balance.quantity(Currency::Gems), 10);
    let ledger = store.ledger(user, None).await.expect("ledger should succeed");
    assert_eq!(ledger.len(), 1);
}

pub async fn test_spend_from_empty_balance_fails<S: BalanceStore>(store: &S) {
    let user = Uuid::new_v4();

    let err = store
        .apply(LedgerBatch::single(spend(user, Currency::PromoKeys, 1)))
        .await
        .expect_err("spend from empty should fail");
    assert!(matches!(err, StorageError::InsufficientFunds { available: 0, .. }));
    assert!(store.ledger(user, None).await.unwrap().is_empty());
}

pub async fn test_quota_claim_enforces_cap<S: BalanceStore>(store: &S) {
    let user = Uuid::new_v4();
    let day = NaiveDate::from_ymd_opt(2030, 5, 1).unwrap();
    let claim = |date: NaiveDate, units: u32| QuotaClaim {
        user_id: user,
        date,
        units,
        cap: 3,
    };

    store
        .apply(LedgerBatch {
            postings: vec![earn(user, Currency::PromoKeys, 2)],
            quota: Some(claim(day, 2)),
            master_key: None,
        })
        .await
        .expect("claim under cap should succeed");

    let err = store
        .apply(LedgerBatch {
            postings: vec![earn(user, Currency::PromoKeys, 2)],
            quota: Some(claim(day, 2)),
            master_key: None,
        })
        .await
        .expect_err("claim over cap should fail");
    assert!(matches!(
        err,
        StorageError::QuotaExceeded {
            used: 2,
            requested: 2,
            cap: 3,
            ..
        }
    ));

    let balance = store.balance(user).await.unwrap();
    assert_eq!(balance.daily_conversion_count, 2);
    assert_eq!(balance.daily_conversion_reset_date, Some(day));
    assert_eq!(balance.quantity(Currency::PromoKeys), 2);

    let next_day = day.succ_opt().unwrap();
    store
        .apply(LedgerBatch {
            postings: vec![earn(user, Currency::PromoKeys, 3)],
            quota: Some(claim(next_day, 3)),
            master_key: None,
        })
        .await
        .expect("counter should reset on a new day");
    let balance = store.balance(user).await.unwrap();
    assert_eq!(balance.daily_conversion_count, 3);
    assert_eq!(balance.daily_conversion_reset_date, Some(next_day));
}

pub async fn test_master_key_grant<S: BalanceStore>(store: &S) {
    let user = Uuid::new_v4();
    let now = at(2030, 0);
    store
        .apply(LedgerBatch::single(earn(user, Currency::PromoKeys, 2)))
        .await
        .unwrap();

    let grant = MasterKeyGrant {
        user_id: user,
        now,
        valid_for: Duration::hours(24),
    };
    store
        .apply(LedgerBatch {
            postings: vec![spend(user, Currency::PromoKeys, 1)],
            quota: None,
            master_key: Some(grant),
        })
        .await
        .expect("grant should succeed");

    let balance = store.balance(user).await.unwrap();
    assert!(balance.master_key_active);
    assert_eq!(balance.master_key_expiry, Some(now + Duration::hours(24)));
    assert_eq!(balance.quantity(Currency::PromoKeys), 1);

    store
        .apply(LedgerBatch {
            postings: vec![spend(user, Currency::PromoKeys, 1)],
            quota: None,
            master_key: Some(MasterKeyGrant {
                now: now + Duration::hours(1),
                ..grant
            }),
        })
        .await
        .expect("extension should succeed");
    let balance = store.balance(user).await.unwrap();
    assert_eq!(balance.master_key_expiry, Some(now + Duration::hours(48)));

    let err = store
        .apply(LedgerBatch {
            postings: vec![spend(user, Currency::PromoKeys, 1)],
            quota: None,
            master_key: Some(grant),
        })
        .await
        .expect_err("grant without keys should fail");
    assert!(matches!(err, StorageError::InsufficientFunds { .. }));
    let balance = store.balance(user).await.unwrap();
    assert_eq!(balance.master_key_expiry, Some(now + Duration::hours(48)));
}

// =============================================================================
// BalanceStore::ledger tests
// =============================================================================

pub async fn test_ledger_filters_by_currency<S: BalanceStore>(store: &S) {
    let user = Uuid::new_v4();
    let other = Uuid::new_v4();
    store
        .apply(LedgerBatch {
            postings: vec![
                earn(user, Currency::Points, 1),
                earn(user, Currency::Gems, 2),
                earn(other, Currency::Gems, 3),
                earn(user, Currency::Points, 4),
            ],
            ..Default::default()
        })
        .await
        .unwrap();

    let all = store.ledger(user, None).await.unwrap();
    assert_eq!(all.iter().map(|e| e.signed_amount).collect::<Vec<_>>(), vec![1, 2, 4]);

    let points = store.ledger(user, Some(Currency::Points)).await.unwrap();
    assert_eq!(points.iter().map(|e| e.signed_amount).collect::<Vec<_>>(), vec![1, 4]);
    assert!(points.windows(2).all(|w| w[0].id < w[1].id));
}

pub async fn test_ledger_sum_matches_balance<S: BalanceStore>(store: &S) {
    let users = [Uuid::new_v4(), Uuid::new_v4()];
    let operations: [(usize, Currency, i64); 10] = [
        (0, Currency::Points, 100),
        (0, Currency::Points, -30),
        (1, Currency::Gems, 5),
        (0, Currency::Gems, 7),
        (1, Currency::Gems, -6),
        (0, Currency::Points, -80),
        (1, Currency::PromoKeys, 3),
        (0, Currency::Gems, -7),
        (1, Currency::PromoKeys, -1),
        (0, Currency::Points, 12),
    ];

    for (user, currency, amount) in operations {
        let posting = if amount > 0 {
            earn(users[user], currency, amount)
        } else {
            spend(users[user], currency, -amount)
        };
        // Some spends are refused; the invariant must hold either way.
        let _ = store.apply(LedgerBatch::single(posting)).await;
    }

    for user in users {
        let balance = store.balance(user).await.unwrap();
        let mut sums: HashMap<Currency, i64> = HashMap::new();
        for entry in store.ledger(user, None).await.unwrap() {
            *sums.entry(entry.currency).or_default() += entry.signed_amount;
        }
        for currency in Currency::ALL {
            let quantity = balance.quantity(currency);
            assert!(quantity >= 0, "balance must never go negative");
            assert_eq!(sums.get(&currency).copied().unwrap_or(0), quantity);
        }
    }
}

// =============================================================================
// Concurrency tests
// =============================================================================

pub async fn test_concurrent_credits<S: BalanceStore>(store: &S) {
    let user = Uuid::new_v4();

    let results = join_all(
        (0..100).map(|_| store.apply(LedgerBatch::single(earn(user, Currency::Points, 1)))),
    )
    .await;
    assert!(results.iter().all(|r| r.is_ok()), "every credit should succeed");

    let balance = store.balance(user).await.unwrap();
    assert_eq!(balance.quantity(Currency::Points), 100);
    assert_eq!(store.ledger(user, None).await.unwrap().len(), 100);
}

pub async fn test_concurrent_debits_never_overdraw<S: BalanceStore>(store: &S) {
    let user = Uuid::new_v4();
    store
        .apply(LedgerBatch::single(earn(user, Currency::Gems, 50)))
        .await
        .unwrap();

    let results = join_all(
        (0..100).map(|_| store.apply(LedgerBatch::single(spend(user, Currency::Gems, 1)))),
    )
    .await;
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 50);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, StorageError::InsufficientFunds { .. })));

    let balance = store.balance(user).await.unwrap();
    assert_eq!(balance.quantity(Currency::Gems), 0);
    assert_eq!(store.ledger(user, None).await.unwrap().len(), 51);
}

pub async fn test_credit_overflow_refused<S: BalanceStore>(store: &S) {
    let user = Uuid::new_v4();
    store
        .apply(LedgerBatch::single(earn(user, Currency::Gems, i64::MAX)))
        .await
        .expect("credit up to the ceiling should succeed");

    let err = store
        .apply(LedgerBatch::single(earn(user, Currency::Gems, 1)))
        .await
        .expect_err("credit past the ceiling should fail");
    assert!(matches!(
        err,
        StorageError::AmountOverflow {
            current: i64::MAX,
            amount: 1
        }
    ));

    let balance = store.balance(user).await.expect("balance should stay readable");
    assert_eq!(balance.quantity(Currency::Gems), i64::MAX);
    let ledger = store.ledger(user, None).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.iter().map(|e| e.signed_amount).sum::<i64>(), i64::MAX);

    // The refused posting takes the rest of its batch down with it.
    let err = store
        .apply(LedgerBatch {
            postings: vec![earn(user, Currency::Points, 10), earn(user, Currency::Gems, 5)],
            ..Default::default()
        })
        .await
        .expect_err("batch with an overflowing posting should fail");
    assert!(matches!(err, StorageError::AmountOverflow { .. }));
    assert_eq!(store.balance(user).await.unwrap().quantity(Currency::Points), 0);
    assert_eq!(store.ledger(user, None).await.unwrap().len(), 1);
}

#[macro_export]
macro_rules! run_balance_store_tests {
    ($store:expr) => {
        use $crate::storage::balance_store_tests::*;

        test_balance_created_lazily($store).await;
        println!("  test_balance_created_lazily: PASSED");

        test_apply_credit_and_debit($store).await;
        println!("  test_apply_credit_and_debit: PASSED");

        test_insufficient_funds_rolls_back_batch($store).await;
        println!("  test_insufficient_funds_rolls_back_batch: PASSED");

        test_spend_from_empty_balance_fails($store).await;
        println!("  test_spend_from_empty_balance_fails: PASSED");

        test_quota_claim_enforces_cap($store).await;
        println!("  test_quota_claim_enforces_cap: PASSED");

        test_master_key_grant($store).await;
        println!("  test_master_key_grant: PASSED");

        test_ledger_filters_by_currency($store).await;
        println!("  test_ledger_filters_by_currency: PASSED");

        test_ledger_sum_matches_balance($store).await;
        println!("  test_ledger_sum_matches_balance: PASSED");

        test_concurrent_credits($store).await;
        println!("  test_concurrent_credits: PASSED");

        test_concurrent_debits_never_overdraw($store).await;
        println!("  test_concurrent_debits_never_overdraw: PASSED");

        test_credit_overflow_refused($store).await;
        println!("  test_credit_overflow_refused: PASSED");
    };
}
