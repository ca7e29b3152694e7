//! Per-provider request budgets.
//!
//! Protects vendor quotas (Unsplash's 50 requests per hour, Google's daily
//! allowance) across requests. A budget is a fixed window: `max_requests`
//! invocations, then nothing until the window rolls over.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use quarry_core::ProviderId;

struct Window {
    started: Instant,
    used: u32,
}

/// Fixed-window invocation budget for one provider.
pub struct RequestBudget {
    /// Invocations allowed per window
    pub max_requests: u32,

    /// Window length
    pub window: Duration,

    state: Mutex<Window>,
}

impl RequestBudget {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Mutex::new(Window {
                started: Instant::now(),
                used: 0,
            }),
        }
    }

    fn roll(&self, state: &mut Window) {
        let now = Instant::now();
        if now.duration_since(state.started) >= self.window {
            state.started = now;
            state.used = 0;
        }
    }

    /// Check whether one more invocation fits, without charging it.
    pub fn has_capacity(&self) -> bool {
        self.remaining() > 0
    }

    /// Charge one invocation if it fits. Check and charge happen under one
    /// lock, so concurrent callers cannot overspend the window.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        self.roll(&mut state);
        if state.used >= self.max_requests {
            return false;
        }
        state.used += 1;
        true
    }

    pub fn remaining(&self) -> u32 {
        let mut state = self.state.lock();
        self.roll(&mut state);
        self.max_requests.saturating_sub(state.used)
    }

    pub fn used(&self) -> u32 {
        let mut state = self.state.lock();
        self.roll(&mut state);
        state.used
    }
}

impl std::fmt::Debug for RequestBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBudget")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .field("used", &self.used())
            .finish()
    }
}

/// Budgets for every provider that has one.
///
/// Clones share the same budgets, so every orchestrator holding a clone
/// charges one window per provider no matter which capability or category
/// the request came through.
#[derive(Debug, Clone, Default)]
pub struct BudgetTracker {
    budgets: Arc<RwLock<HashMap<ProviderId, Arc<RequestBudget>>>>,
}

impl BudgetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `provider` a budget. A provider that already has one keeps it,
    /// along with the usage already charged to it.
    pub fn set(&self, provider: ProviderId, max_requests: u32, window: Duration) {
        self.budgets
            .write()
            .entry(provider)
            .or_insert_with(|| Arc::new(RequestBudget::new(max_requests, window)));
    }

    /// Providers without a budget always have capacity.
    pub fn has_capacity(&self, provider: &ProviderId) -> bool {
        self.get(provider).map(|b| b.has_capacity()).unwrap_or(true)
    }

    /// Charge one invocation. Always succeeds for providers without a budget.
    pub fn try_acquire(&self, provider: &ProviderId) -> bool {
        self.get(provider).map(|b| b.try_acquire()).unwrap_or(true)
    }

    pub fn remaining(&self, provider: &ProviderId) -> Option<u32> {
        self.get(provider).map(|b| b.remaining())
    }

    pub fn get(&self, provider: &ProviderId) -> Option<Arc<RequestBudget>> {
        self.budgets.read().get(provider).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.budgets.read().is_empty()
    }
}
