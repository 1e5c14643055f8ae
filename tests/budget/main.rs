use std::collections::BTreeMap;

use rand::{Rng, SeedableRng, rngs::StdRng};
use vigil::budget::{AvailableMs, BudgetManager, FixedBudget, TempoForecaster};

#[test]
fn given_random_requests_when_allocating_then_grants_never_exceed_pool() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut budget = BudgetManager::new(1_000);
    budget.set_reserves(BTreeMap::from([
        ("alert".to_string(), 300),
        ("chat".to_string(), 200),
    ]));

    for tick in 0..20 {
        budget.tick();
        let mut granted_sum = 0;
        for request in 0..40 {
            let ms = rng.random_range(0..400);
            let event_type = match request % 3 {
                0 => Some("alert"),
                1 => Some("chat"),
                _ => None,
            };
            if budget.request_allocation(ms, &format!("t{tick}:r{request}"), event_type) {
                granted_sum += ms;
            }
        }
        assert!(granted_sum <= budget.pool_ms(), "tick {tick} granted {granted_sum}");
        assert_eq!(budget.granted_this_tick(), granted_sum);
        assert_eq!(budget.available(), budget.pool_ms() - granted_sum);
    }
}

#[test]
fn given_reserves_when_untyped_request_fits_available_then_it_is_granted() {
    let mut budget = BudgetManager::new(1_000);
    budget.set_reserves(BTreeMap::from([("alert".to_string(), 400)]));
    budget.tick();

    assert!(!budget.can_allocate_non_reserved(700));
    assert!(budget.request_allocation(700, "bulk", None));
    assert_eq!(budget.available(), 300);
    assert!(!budget.request_allocation(400, "alert-1", Some("alert")));
    assert!(budget.request_allocation(300, "alert-1", Some("alert")));
    assert_eq!(budget.available(), 0);
    assert_eq!(budget.granted_this_tick(), 1_000);
}

#[test]
fn given_typed_request_past_its_reserve_when_available_covers_it_then_it_is_granted() {
    let mut budget = BudgetManager::new(1_000);
    budget.set_reserves(BTreeMap::from([
        ("alert".to_string(), 500),
        ("chat".to_string(), 100),
    ]));
    budget.tick();

    assert!(budget.request_allocation(800, "chat-1", Some("chat")));
    let snapshot = budget.snapshot();
    assert_eq!(snapshot.reserve_used_ms.get("chat"), Some(&100));
    assert_eq!(snapshot.available_ms, 200);
    assert!(!budget.request_allocation(201, "alert-1", Some("alert")));
    assert_eq!(budget.available(), 200);
}

#[test]
fn given_reserve_exhausted_when_typed_request_then_shortfall_comes_from_unreserved_pool() {
    let mut budget = BudgetManager::new(1_000);
    budget.set_reserves(BTreeMap::from([("alert".to_string(), 100)]));
    budget.tick();

    assert!(budget.request_allocation(250, "alert-1", Some("alert")));
    let snapshot = budget.snapshot();
    assert_eq!(snapshot.reserve_used_ms.get("alert"), Some(&100));
    assert_eq!(snapshot.available_ms, 750);
}

#[test]
fn given_oversized_reserve_hints_when_set_then_reserves_clamp_to_pool() {
    let mut budget = BudgetManager::new(500);
    budget.set_reserves(BTreeMap::from([
        ("a".to_string(), 400),
        ("b".to_string(), 400),
    ]));
    let total: u64 = budget.reserves().values().sum();
    assert!(total <= 500);
}

#[test]
fn given_new_tick_when_pool_changed_then_available_resets_to_new_pool() {
    let mut budget = BudgetManager::new(1_000);
    budget.tick();
    assert!(budget.request_allocation(900, "a", None));
    budget.set_pool_ms(200);
    assert_eq!(budget.available(), 100);
    budget.tick();
    assert_eq!(budget.available(), 200);
    assert_eq!(budget.granted_this_tick(), 0);
}

#[test]
fn given_bursty_type_when_forecasting_then_it_receives_the_larger_reserve() {
    let mut tempo = TempoForecaster::new(0.5, 0.6);
    for _ in 0..4 {
        tempo.observe_event("alert");
    }
    tempo.observe_event("chat");

    let mut budget = BudgetManager::new(1_000);
    tempo.forecast_and_reserve(&mut budget);
    let reserves = budget.reserves();
    let alert = reserves.get("alert").copied().unwrap_or(0);
    let chat = reserves.get("chat").copied().unwrap_or(0);

    assert!(alert > chat);
    assert!(alert + chat <= 600);
}

#[test]
fn available_ms_sources_agree() {
    let mut budget = BudgetManager::new(750);
    budget.tick();
    let sources: [&dyn AvailableMs; 3] = [&budget, &FixedBudget(750), &750_i64];
    for source in sources {
        assert_eq!(source.available_ms(), 750);
    }
}
