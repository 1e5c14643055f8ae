use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BudgetSnapshot {
    pub pool_ms: u64,
    pub available_ms: u64,
    pub reserves_ms: BTreeMap<String, u64>,
    pub reserve_used_ms: BTreeMap<String, u64>,
}

/// Per-tick millisecond pool with per-event-type reserves.
///
/// Reserves are earmarked inside the pool: a typed request draws its own
/// remaining reserve first and takes any shortfall from `available`. Every
/// grant is deducted from `available`, which starts each tick at `pool`, so
/// grants within a tick never sum past the pool. Callers that must leave
/// other types' reserves intact check [`BudgetManager::can_allocate_non_reserved`]
/// first.
#[derive(Debug, Clone)]
pub struct BudgetManager {
    pool_ms: u64,
    available_ms: u64,
    reserves_ms: BTreeMap<String, u64>,
    reserve_used_ms: BTreeMap<String, u64>,
    granted_this_tick_ms: u64,
}

impl BudgetManager {
    pub fn new(pool_ms: u64) -> Self {
        Self {
            pool_ms,
            available_ms: pool_ms,
            reserves_ms: BTreeMap::new(),
            reserve_used_ms: BTreeMap::new(),
            granted_this_tick_ms: 0,
        }
    }

    pub fn pool_ms(&self) -> u64 {
        self.pool_ms
    }

    /// Takes effect at the next [`BudgetManager::tick`].
    pub fn set_pool_ms(&mut self, pool_ms: u64) {
        self.pool_ms = pool_ms;
    }

    pub fn tick(&mut self) {
        self.available_ms = self.pool_ms;
        self.reserve_used_ms.clear();
        self.granted_this_tick_ms = 0;
    }

    pub fn set_reserves(&mut self, reserves_ms: BTreeMap<String, u64>) {
        let mut remaining = self.pool_ms;
        let mut clamped = BTreeMap::new();
        for (event_type, reserve_ms) in reserves_ms {
            let granted = reserve_ms.min(remaining);
            remaining -= granted;
            if granted > 0 {
                clamped.insert(event_type, granted);
            }
        }
        self.reserves_ms = clamped;
    }

    pub fn reserves(&self) -> &BTreeMap<String, u64> {
        &self.reserves_ms
    }

    pub fn available(&self) -> u64 {
        self.available_ms
    }

    pub fn granted_this_tick(&self) -> u64 {
        self.granted_this_tick_ms
    }

    pub fn can_allocate_non_reserved(&self, ms: u64) -> bool {
        ms <= self.unreserved_available()
    }

    pub fn request_allocation(&mut self, ms: u64, source_tag: &str, event_type: Option<&str>) -> bool {
        let reserve_draw = event_type
            .map(|event_type| self.reserve_remaining(event_type).min(ms))
            .unwrap_or(0);
        let shortfall = ms - reserve_draw;

        // The reserve draw is earmarked inside `available`; the whole request is deducted from it.
        if ms > self.available_ms {
            tracing::debug!(
                target: "budget",
                source_tag = source_tag,
                event_type = event_type.unwrap_or(""),
                requested_ms = ms,
                reserve_draw_ms = reserve_draw,
                shortfall_ms = shortfall,
                available_ms = self.available_ms,
                "allocation_denied"
            );
            return false;
        }

        if let Some(event_type) = event_type
            && reserve_draw > 0
        {
            *self
                .reserve_used_ms
                .entry(event_type.to_string())
                .or_insert(0) += reserve_draw;
        }
        self.available_ms -= ms;
        self.granted_this_tick_ms += ms;

        tracing::trace!(
            target: "budget",
            source_tag = source_tag,
            granted_ms = ms,
            reserve_draw_ms = reserve_draw,
            available_ms = self.available_ms,
            "allocation_granted"
        );
        true
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            pool_ms: self.pool_ms,
            available_ms: self.available_ms,
            reserves_ms: self.reserves_ms.clone(),
            reserve_used_ms: self.reserve_used_ms.clone(),
        }
    }

    fn reserve_remaining(&self, event_type: &str) -> u64 {
        let reserved = self.reserves_ms.get(event_type).copied().unwrap_or(0);
        let used = self.reserve_used_ms.get(event_type).copied().unwrap_or(0);
        reserved.saturating_sub(used)
    }

    fn outstanding_reserve(&self) -> u64 {
        self.reserves_ms
            .keys()
            .map(|event_type| self.reserve_remaining(event_type))
            .sum()
    }

    fn unreserved_available(&self) -> u64 {
        self.available_ms.saturating_sub(self.outstanding_reserve())
    }
}
