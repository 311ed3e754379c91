//! Deadline utilities for the cooperative time budgets of the driver.

use std::time::{Duration, Instant};

/// Per-query SMT budget cap in milliseconds. The remaining analysis
/// budget is handed to the oracle, but single queries never get more than
/// this so one hard query cannot eat the whole run.
pub const SMT_QUERY_CAP_MS: u64 = 500;

/// The three budgets of an analysis run: a hard wall-clock limit, a soft
/// limit for the simplification loop, and a per-pass preprocessing limit.
///
/// All checks are cooperative; the driver polls at phase boundaries.
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    hard: Option<Instant>,
    soft: Option<Instant>,
    preprocess_budget: Option<Duration>,
}

impl Deadlines {
    /// Budgets derived from the configured total timeout: the soft limit
    /// is two thirds of the hard one, preprocessing passes get a tenth
    /// (at most five seconds). Zero disables everything.
    pub fn from_timeout_secs(timeout_secs: u64) -> Self {
        if timeout_secs == 0 {
            return Self::unlimited();
        }
        let now = Instant::now();
        let hard = Duration::from_secs(timeout_secs);
        let soft = hard.mul_f64(2.0 / 3.0);
        let preprocess = (hard / 10).min(Duration::from_secs(5));
        Self {
            hard: now.checked_add(hard),
            soft: now.checked_add(soft),
            preprocess_budget: Some(preprocess),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            hard: None,
            soft: None,
            preprocess_budget: None,
        }
    }

    pub fn hard_exceeded(&self) -> bool {
        deadline_exceeded(self.hard)
    }

    pub fn soft_exceeded(&self) -> bool {
        deadline_exceeded(self.soft)
    }

    /// Whether the current preprocessing pass used up its budget.
    pub fn preprocessing_exceeded(&self, pass_start: Instant) -> bool {
        match self.preprocess_budget {
            Some(budget) => pass_start.elapsed() >= budget,
            None => false,
        }
    }

    /// Budget hint for the next SMT query, in milliseconds. Zero means
    /// unlimited analysis time, where the per-query cap still applies.
    pub fn smt_budget_ms(&self) -> u64 {
        match self.hard {
            None => SMT_QUERY_CAP_MS,
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                (remaining.as_millis() as u64).clamp(1, SMT_QUERY_CAP_MS)
            }
        }
    }
}

fn deadline_exceeded(deadline: Option<Instant>) -> bool {
    match deadline {
        Some(deadline) => Instant::now() >= deadline,
        None => false,
    }
}
