//! End-to-end economy scenarios over a storage backend.
//!
//! Drives the services through the `Economy` facade so the backend's
//! transactions are exercised the way production code uses them.

use std::sync::Arc;

use chrono::Duration;
use futures::future::join_all;
use uuid::Uuid;

use promoshare::config::Config;
use promoshare::facade::Economy;
use promoshare::model::{Currency, CycleStatus, CycleType, Tier};
use promoshare::services::{EconomyError, StaticTiers, TicketRequest};
use promoshare::storage::Stores;
use promoshare::utils::clock::{Clock, FixedClock};
use promoshare::utils::random::ScriptedNumbers;

use super::at;

pub struct Harness {
    pub economy: Economy,
    pub clock: Arc<FixedClock>,
    pub numbers: Arc<ScriptedNumbers>,
    pub tiers: Arc<StaticTiers>,
}

/// Economy over `stores` with the clock at `year`.
pub async fn harness(stores: Stores, year: i32) -> Harness {
    let clock = Arc::new(FixedClock::new(at(year, 0)));
    let numbers = Arc::new(ScriptedNumbers::default());
    let tiers = Arc::new(StaticTiers::new());
    let economy = Economy::builder(Config::for_test())
        .with_stores(stores)
        .with_clock(clock.clone())
        .with_numbers(numbers.clone())
        .with_tiers(tiers.clone())
        .build()
        .await
        .expect("economy should build");
    Harness {
        economy,
        clock,
        numbers,
        tiers,
    }
}

impl Harness {
    /// One-day cycle starting `offset_days` from the clock.
    async fn cycle(&self, offset_days: i64) -> Uuid {
        let start = self.clock.now() + Duration::days(offset_days);
        self.economy
            .cycles()
            .create_cycle(CycleType::Daily, start, start + Duration::days(1), serde_json::Value::Null)
            .await
            .expect("create_cycle should succeed")
            .id
    }

    async fn ticket(&self, user: Uuid, number: u32) {
        self.numbers.push(number);
        self.economy
            .tickets()
            .issue_ticket(TicketRequest::new(user, "post"))
            .await
            .expect("ticket should be issued");
    }

    async fn gems(&self, user: Uuid) -> i64 {
        self.economy.ledger().balance(user).await.unwrap().quantity(Currency::Gems)
    }

    async fn draw(&self, cycle_id: Uuid, number: u32) -> promoshare::services::DrawOutcome {
        assert!(self.economy.cycles().begin_draw(cycle_id).await.unwrap());
        self.numbers.push(number);
        self.economy.draws().execute(cycle_id).await.expect("draw should settle")
    }
}

pub async fn test_conversion_round_trip(stores: Stores) {
    let h = harness(stores, 2401).await;
    let user = Uuid::new_v4();
    h.economy
        .ledger()
        .credit(user, Currency::Points, 1_600, "quest", None, None)
        .await
        .unwrap();

    for _ in 0..3 {
        h.economy
            .conversion()
            .convert(user, Currency::Points, Currency::PromoKeys, 1)
            .await
            .expect("conversion under cap should succeed");
    }
    let err = h
        .economy
        .conversion()
        .convert(user, Currency::Points, Currency::PromoKeys, 1)
        .await
        .expect_err("fourth conversion should hit the cap");
    assert!(matches!(err, EconomyError::DailyCapExceeded { .. }));

    let balance = h.economy.ledger().balance(user).await.unwrap();
    assert_eq!(balance.quantity(Currency::Points), 100);
    assert_eq!(balance.quantity(Currency::PromoKeys), 3);
    assert_eq!(h.economy.ledger().ledger(user, None).await.unwrap().len(), 7);

    h.economy.ledger().activate_master_key(user).await.unwrap();
    let balance = h.economy.ledger().balance(user).await.unwrap();
    assert!(balance.has_master_key(h.clock.now()));
    assert_eq!(balance.quantity(Currency::PromoKeys), 2);
}

pub async fn test_no_winner_rolls_over(stores: Stores) {
    let h = harness(stores, 2402).await;
    let cycle_id = h.cycle(0).await;
    let next_id = h.cycle(1).await;
    h.economy.cycles().add_to_jackpot(cycle_id, 1_000).await.unwrap();
    h.ticket(Uuid::new_v4(), 10).await;

    let outcome = h.draw(cycle_id, 11).await;
    assert!(outcome.winners.is_empty());
    assert_eq!(outcome.rollover_cycle_id, Some(next_id));

    let next = h.economy.cycles().get_cycle(next_id).await.unwrap();
    assert_eq!(next.jackpot_amount, 1_000);
    assert!(next.is_rollover);
}

pub async fn test_single_free_winner(stores: Stores) {
    let h = harness(stores, 2403).await;
    let cycle_id = h.cycle(0).await;
    h.economy.cycles().add_to_jackpot(cycle_id, 1_000).await.unwrap();
    let user = Uuid::new_v4();
    h.ticket(user, 99).await;

    let outcome = h.draw(cycle_id, 99).await;
    assert_eq!(outcome.winners.len(), 1);
    assert_eq!(h.gems(user).await, 300);

    let ledger = h.economy.ledger().ledger(user, Some(Currency::Gems)).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].source, "lottery_win");
    assert_eq!(ledger[0].reference_id, Some(cycle_id.to_string()));
}

pub async fn test_three_winners_share_base(stores: Stores) {
    let h = harness(stores, 2404).await;
    let cycle_id = h.cycle(0).await;
    h.economy.cycles().add_to_jackpot(cycle_id, 900).await.unwrap();
    let premium = [Uuid::new_v4(), Uuid::new_v4()];
    let free = Uuid::new_v4();
    for user in premium {
        h.tiers.set(user, Tier::Premium).await;
        h.ticket(user, 5).await;
    }
    h.ticket(free, 5).await;

    let outcome = h.draw(cycle_id, 5).await;
    assert_eq!(outcome.winners.len(), 3);
    for user in premium {
        assert_eq!(h.gems(user).await, 300);
    }
    assert_eq!(h.gems(free).await, 90);
}

pub async fn test_second_draw_rejected(stores: Stores) {
    let h = harness(stores, 2405).await;
    let cycle_id = h.cycle(0).await;
    h.economy.cycles().add_to_jackpot(cycle_id, 1_000).await.unwrap();
    let user = Uuid::new_v4();
    h.ticket(user, 7).await;
    h.draw(cycle_id, 7).await;

    h.numbers.push(7);
    let err = h
        .economy
        .draws()
        .execute(cycle_id)
        .await
        .expect_err("second draw should be rejected");
    assert!(matches!(
        err,
        EconomyError::InvalidCycleState {
            actual: CycleStatus::Completed,
            ..
        }
    ));
    assert_eq!(h.economy.cycles().winners(cycle_id).await.unwrap().len(), 1);
    assert_eq!(h.gems(user).await, 300);
}

pub async fn test_concurrent_draws_pay_once(stores: Stores) {
    let h = harness(stores, 2406).await;
    let cycle_id = h.cycle(0).await;
    h.economy.cycles().add_to_jackpot(cycle_id, 1_000).await.unwrap();
    let user = Uuid::new_v4();
    h.tiers.set(user, Tier::Premium).await;
    h.ticket(user, 3).await;
    assert!(h.economy.cycles().begin_draw(cycle_id).await.unwrap());
    for _ in 0..5 {
        h.numbers.push(3);
    }

    let results = join_all((0..5).map(|_| h.economy.draws().execute(cycle_id))).await;
    let settled = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(settled, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, EconomyError::InvalidCycleState { .. })));
    assert_eq!(h.gems(user).await, 1_000);
}

pub async fn test_revenue_feeds_active_jackpot(stores: Stores) {
    let h = harness(stores, 2407).await;
    let pending = h.economy.revenue().track_revenue(1_000, "ads").await.unwrap();
    assert_eq!(pending.allocated_cycle_id, None);

    let cycle_id = h.cycle(0).await;
    let allocated = h.economy.revenue().track_revenue(10_000, "ads").await.unwrap();
    assert_eq!(allocated.allocated_cycle_id, Some(cycle_id));
    assert_eq!(allocated.promoshare_share, 500);

    let cycle = h.economy.cycles().get_cycle(cycle_id).await.unwrap();
    assert_eq!(cycle.jackpot_amount, 500);
    let pending_ids: Vec<Uuid> = h
        .economy
        .revenue()
        .pending_revenue()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert!(pending_ids.contains(&pending.id));
    assert!(!pending_ids.contains(&allocated.id));
}

#[macro_export]
macro_rules! run_economy_tests {
    ($make_stores:expr) => {
        use $crate::storage::economy_tests::*;

        test_conversion_round_trip($make_stores).await;
        println!("  test_conversion_round_trip: PASSED");

        test_no_winner_rolls_over($make_stores).await;
        println!("  test_no_winner_rolls_over: PASSED");

        test_single_free_winner($make_stores).await;
        println!("  test_single_free_winner: PASSED");

        test_three_winners_share_base($make_stores).await;
        println!("  test_three_winners_share_base: PASSED");

        test_second_draw_rejected($make_stores).await;
        println!("  test_second_draw_rejected: PASSED");

        test_concurrent_draws_pay_once($make_stores).await;
        println!("  test_concurrent_draws_pay_once: PASSED");

        test_revenue_feeds_active_jackpot($make_stores).await;
        println!("  test_revenue_feeds_active_jackpot: PASSED");
    };
}
