//! Retry pacing

use crate::FetchConfig;
use std::time::Duration;

impl FetchConfig {
    /// Delay before retry `attempt` (1-based): exponential growth from
    /// `initial_delay` capped at `max_delay`, spread by the jitter factor
    /// so parallel syncs against a recovering upstream do not retry in
    /// lockstep.
    pub(crate) fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1).min(30)).unwrap_or(30);
        let grown = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let spread = 1.0 + (rand::random::<f64>() - 0.5) * self.jitter_factor;
        let seconds = (grown * spread).clamp(0.0, self.max_delay.as_secs_f64());

        Duration::try_from_secs_f64(seconds).unwrap_or(self.max_delay)
    }
}
