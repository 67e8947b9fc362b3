//! Global minimum-interval limiter with escalation on throttling signals.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Smallest escalated delay when the base interval is zero.
const MIN_ESCALATED_DELAY: Duration = Duration::from_millis(500);

struct LimiterState {
    last_call: Option<Instant>,
    current_delay: Duration,
}

/// Enforces a minimum interval between consecutive calls across all callers.
///
/// Holding the lock while waiting serializes callers, so the interval holds globally and
/// not just per task.
pub struct RateLimiter {
    base_delay: Duration,
    max_delay: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            state: Mutex::new(LimiterState {
                last_call: None,
                current_delay: base_delay,
            }),
        }
    }

    /// Waits until the current interval has elapsed since the previous call, then claims the slot.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        if let Some(last_call) = state.last_call {
            let elapsed = last_call.elapsed();
            if elapsed < state.current_delay {
                tokio::time::sleep(state.current_delay - elapsed).await;
            }
        }
        state.last_call = Some(Instant::now());
    }

    /// Doubles the interval up to the ceiling and returns the new interval.
    pub async fn escalate(&self) -> Duration {
        let mut state = self.state.lock().await;
        let doubled = if state.current_delay.is_zero() {
            MIN_ESCALATED_DELAY
        } else {
            state.current_delay.saturating_mul(2)
        };
        state.current_delay = doubled.min(self.max_delay);
        debug!("Rate limiter escalated to {:?}", state.current_delay);
        state.current_delay
    }

    /// Halves an escalated interval back toward the base interval.
    pub async fn relax(&self) {
        let mut state = self.state.lock().await;
        if state.current_delay > self.base_delay {
            state.current_delay = (state.current_delay / 2).max(self.base_delay);
        }
    }

    pub async fn current_delay(&self) -> Duration {
        self.state.lock().await.current_delay
    }
}
