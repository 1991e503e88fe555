use std::time::{Duration, Instant};

use crate::settings::MIN_REPORT_INTERVAL;

/// Lets a progress update through at most once per interval.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emitted: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        ProgressThrottle {
            interval: interval.max(Duration::from_secs_f64(MIN_REPORT_INTERVAL)),
            last_emitted: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The first call always emits.
    pub fn should_emit(&mut self, now: Instant) -> bool {
        let emit = match self.last_emitted {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if emit {
            self.last_emitted = Some(now);
        }
        emit
    }
}
