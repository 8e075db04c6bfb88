//! Retransmission timing.
//!
//! The protocol waits a fixed time for each acknowledgment and resends the
//! identical packet when that time passes.  [`RetransmitTimer`] hands out
//! the deadline for the current wait and counts retransmissions of the
//! packet in flight, enforcing the optional retry cap.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::ExchangeConfig;
use crate::error::{ExchangeError, Result};

/// Deadline bookkeeping for one packet in flight.
#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    timeout: Duration,
    max_retries: Option<u32>,
    retries: u32,
}

impl RetransmitTimer {
    pub fn new(config: &ExchangeConfig) -> Self {
        Self {
            timeout: config.ack_timeout,
            max_retries: config.max_retries,
            retries: 0,
        }
    }

    /// Deadline for a wait starting now.
    pub fn arm(&self) -> Instant {
        Instant::now() + self.timeout
    }

    /// Record that the wait for `sequence` expired.
    ///
    /// Returns the number of retransmissions so far, or
    /// [`ExchangeError::RetriesExhausted`] once the cap is passed.
    pub fn on_timeout(&mut self, sequence: i32) -> Result<u32> {
        self.retries += 1;
        match self.max_retries {
            Some(max) if self.retries > max => Err(ExchangeError::RetriesExhausted {
                sequence,
                attempts: self.retries,
            }),
            _ => Ok(self.retries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_retries: Option<u32>) -> ExchangeConfig {
        ExchangeConfig {
            ack_timeout: Duration::from_millis(40),
            max_retries,
            ..ExchangeConfig::default()
        }
    }

    #[tokio::test]
    async fn deadline_is_one_timeout_ahead() {
        let timer = RetransmitTimer::new(&config(None));
        let before = Instant::now();
        let deadline = timer.arm();
        assert!(deadline >= before + Duration::from_millis(40));
    }

    #[test]
    fn unbounded_by_default() {
        let mut timer = RetransmitTimer::new(&config(None));
        for expected in 1..=1000 {
            assert_eq!(timer.on_timeout(7).unwrap(), expected);
        }
    }

    #[test]
    fn cap_is_enforced() {
        let mut timer = RetransmitTimer::new(&config(Some(2)));
        assert_eq!(timer.on_timeout(3).unwrap(), 1);
        assert_eq!(timer.on_timeout(3).unwrap(), 2);
        match timer.on_timeout(3) {
            Err(ExchangeError::RetriesExhausted { sequence, attempts }) => {
                assert_eq!(sequence, 3);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }
}
