//! Resilience patterns for quarry-runtime.
//!
//! This module provides:
//! - Bounded retry with exponential backoff
//! - Cached provider health probing
//! - Per-provider request budgets

mod budget;
mod health;
mod retry;

pub use budget::{BudgetTracker, RequestBudget};
pub use health::HealthProber;
pub use retry::{attempt_with_retry, with_retry, Retried};
