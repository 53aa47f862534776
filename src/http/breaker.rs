use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::http_client::HttpClientError;

/// Counts consecutive transport failures against the dashboard and fails
/// fast while the backend is given time to recover.
///
/// HTTP error statuses are responses, not transport failures, and do not
/// trip the breaker. After the cooldown a single probe request is let
/// through; one more failure re-opens the circuit.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// Fails with [`HttpClientError::CircuitOpen`] while the circuit is
    /// open and the cooldown has not elapsed.
    pub fn check(&self) -> Result<(), HttpClientError> {
        let mut state = self.lock_state();
        if let Some(opened_at) = state.opened_at {
            if opened_at.elapsed() < self.cooldown {
                return Err(HttpClientError::CircuitOpen);
            }
            // Half-open: allow one probe through.
            debug!("circuit breaker cooldown elapsed, probing the dashboard");
            state.opened_at = None;
            state.consecutive_failures = self.threshold.saturating_sub(1);
        }
        Ok(())
    }

    pub fn record_success(&self) {
        let mut state = self.lock_state();
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut state = self.lock_state();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.threshold && state.opened_at.is_none() {
            warn!(
                failures = state.consecutive_failures,
                "dashboard transport keeps failing, opening circuit breaker"
            );
            state.opened_at = Some(Instant::now());
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        // The state is plain counters; a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
