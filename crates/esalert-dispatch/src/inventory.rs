//! Retry inventory: remaining delivery attempts per (method, alert) pair.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Attempts granted to a delivery identity on registration.
pub const DEFAULT_BUDGET: i64 = 3;

/// One obligation: deliver one alert through one of its methods.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryId {
    pub method_index: usize,
    pub alert_id: String,
}

impl DeliveryId {
    pub fn new(method_index: usize, alert_id: impl Into<String>) -> Self {
        Self {
            method_index,
            alert_id: alert_id.into(),
        }
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.method_index, self.alert_id)
    }
}

/// Counter store behind a single lock.
///
/// `decrement` has no floor: check `remaining` first.
#[derive(Debug)]
pub struct Inventory {
    budget: i64,
    entries: Mutex<HashMap<DeliveryId, i64>>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET)
    }
}

impl Inventory {
    pub fn new(budget: i64) -> Self {
        Self {
            budget,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DeliveryId, i64>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the entry at the full budget. First registration wins.
    pub fn register(&self, id: &DeliveryId) {
        self.lock().entry(id.clone()).or_insert(self.budget);
    }

    pub fn deregister(&self, id: &DeliveryId) {
        self.lock().remove(id);
    }

    /// Subtract one attempt; unknown identities are ignored.
    pub fn decrement(&self, id: &DeliveryId) {
        if let Some(v) = self.lock().get_mut(id) {
            *v -= 1;
        }
    }

    /// Attempts left, or 0 when unknown.
    pub fn remaining(&self, id: &DeliveryId) -> i64 {
        self.lock().get(id).copied().unwrap_or(0)
    }

    pub fn contains(&self, id: &DeliveryId) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of tracked identities, including delivered ones.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
