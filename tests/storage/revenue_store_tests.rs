//! RevenueStore interface tests.
//!
//! These tests verify the contract of the RevenueStore trait.
//! Each storage implementation should run these tests.

use uuid::Uuid;

use promoshare::model::{CycleStatus, NewRevenue, RevenueStatus};
use promoshare::storage::{CycleStore, RevenueStore};

use super::at;
use super::cycle_store_tests::make_cycle;

fn revenue(total: i64, share: i64) -> NewRevenue {
    NewRevenue {
        source_type: "ads".to_string(),
        total_amount: total,
        promoshare_share: share,
    }
}

pub async fn test_record_allocated<S: CycleStore + RevenueStore>(store: &S) {
    let cycle = make_cycle(store, at(2301, 0), 1).await;

    let entry = store
        .record_revenue(revenue(2_000, 100), Some(cycle.id))
        .await
        .expect("record should succeed");
    assert_eq!(entry.status, RevenueStatus::Allocated);
    assert_eq!(entry.allocated_cycle_id, Some(cycle.id));
    assert_eq!(entry.total_amount, 2_000);
    assert_eq!(entry.promoshare_share, 100);

    store
        .transition(cycle.id, CycleStatus::Active, CycleStatus::Calculating)
        .await
        .unwrap();
    let entry = store.record_revenue(revenue(400, 20), Some(cycle.id)).await.unwrap();
    assert_eq!(entry.status, RevenueStatus::Allocated);

    let cycle = store.get_cycle(cycle.id).await.unwrap().unwrap();
    assert_eq!(cycle.jackpot_amount, 120);
}

pub async fn test_record_pending_without_target<S: CycleStore + RevenueStore>(store: &S) {
    let entry = store
        .record_revenue(revenue(1_000, 50), None)
        .await
        .expect("record should succeed");
    assert_eq!(entry.status, RevenueStatus::Pending);
    assert_eq!(entry.allocated_cycle_id, None);

    let pending = store.pending_revenue().await.unwrap();
    assert!(pending.iter().any(|p| p.id == entry.id));
}

pub async fn test_record_pending_when_target_closed<S: CycleStore + RevenueStore>(store: &S) {
    let cycle = make_cycle(store, at(2303, 0), 1).await;
    store
        .transition(cycle.id, CycleStatus::Active, CycleStatus::Completed)
        .await
        .unwrap();

    let entry = store.record_revenue(revenue(1_000, 50), Some(cycle.id)).await.unwrap();
    assert_eq!(entry.status, RevenueStatus::Pending);
    assert_eq!(store.get_cycle(cycle.id).await.unwrap().unwrap().jackpot_amount, 0);

    let entry = store
        .record_revenue(revenue(1_000, 50), Some(Uuid::new_v4()))
        .await
        .expect("unknown cycle should fall back to pending");
    assert_eq!(entry.status, RevenueStatus::Pending);
}

pub async fn test_pending_revenue_excludes_allocated<S: CycleStore + RevenueStore>(store: &S) {
    let cycle = make_cycle(store, at(2304, 0), 1).await;
    let allocated = store.record_revenue(revenue(300, 15), Some(cycle.id)).await.unwrap();
    let first = store.record_revenue(revenue(100, 5), None).await.unwrap();
    let second = store.record_revenue(revenue(200, 10), None).await.unwrap();

    let pending: Vec<Uuid> = store
        .pending_revenue()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .filter(|id| [allocated.id, first.id, second.id].contains(id))
        .collect();
    assert_eq!(pending, vec![first.id, second.id]);
}

pub async fn test_zero_share_stays_pending<S: CycleStore + RevenueStore>(store: &S) {
    let cycle = make_cycle(store, at(2305, 0), 1).await;

    let entry = store.record_revenue(revenue(19, 0), Some(cycle.id)).await.unwrap();
    assert_eq!(entry.status, RevenueStatus::Pending);
    assert_eq!(entry.allocated_cycle_id, None);
    assert_eq!(store.get_cycle(cycle.id).await.unwrap().unwrap().jackpot_amount, 0);
}

pub async fn test_full_jackpot_leaves_pending<S: CycleStore + RevenueStore>(store: &S) {
    let cycle = make_cycle(store, at(2306, 0), 1).await;
    store.add_to_jackpot(cycle.id, i64::MAX).await.unwrap();

    let entry = store
        .record_revenue(revenue(1_000, 50), Some(cycle.id))
        .await
        .expect("overflowing share should fall back to pending");
    assert_eq!(entry.status, RevenueStatus::Pending);
    assert_eq!(store.get_cycle(cycle.id).await.unwrap().unwrap().jackpot_amount, i64::MAX);
}

#[macro_export]
macro_rules! run_revenue_store_tests {
    ($store:expr) => {
        use $crate::storage::revenue_store_tests::*;

        test_record_allocated($store).await;
        println!("  test_record_allocated: PASSED");

        test_record_pending_without_target($store).await;
        println!("  test_record_pending_without_target: PASSED");

        test_record_pending_when_target_closed($store).await;
        println!("  test_record_pending_when_target_closed: PASSED");

        test_pending_revenue_excludes_allocated($store).await;
        println!("  test_pending_revenue_excludes_allocated: PASSED");

        test_zero_share_stays_pending($store).await;
        println!("  test_zero_share_stays_pending: PASSED");

        test_full_jackpot_leaves_pending($store).await;
        println!("  test_full_jackpot_leaves_pending: PASSED");
    };
}
