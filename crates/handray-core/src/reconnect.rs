//! Reconnect policy for the landmark stream.
//!
//! Linear backoff bounded by an attempt cap: after the k-th consecutive
//! abnormal close the client waits `k × base_delay_ms` before retrying, and
//! gives up once `max_attempts` retries have failed. Pure state machine; the
//! caller owns the timer.

use serde::{Deserialize, Serialize};

/// WebSocket close code for a deliberate, normal closure.
pub const NORMAL_CLOSE_CODE: u16 = 1000;

/// Terminal error surfaced when the retry budget is exhausted.
pub const RETRIES_EXHAUSTED: &str = "max reconnection attempts reached";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Retries allowed before giving up (default 5).
    pub max_attempts: u32,
    /// Delay unit in milliseconds (default 2000).
    pub base_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2_000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before 1-based retry `attempt`.
    pub fn delay_for(&self, attempt: u32) -> u64 {
        self.base_delay_ms.saturating_mul(u64::from(attempt))
    }
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Our own `disconnect()` or a peer close with code 1000.
    Deliberate,
    /// Everything else: refused connects, resets, read errors, other codes.
    Abnormal,
}

impl CloseKind {
    /// Classify a close by its WebSocket close code (`None` when the
    /// connection dropped without a close frame).
    pub fn from_code(code: Option<u16>) -> Self {
        match code {
            Some(NORMAL_CLOSE_CODE) => Self::Deliberate,
            _ => Self::Abnormal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// Schedule retry `attempt` after `after_ms`.
    Reconnect { attempt: u32, after_ms: u64 },
    /// Budget exhausted; report a terminal failure.
    GiveUp { attempts: u32 },
    /// Deliberate close; stay disconnected.
    Stay,
}

#[derive(Debug, Clone)]
pub struct ReconnectTracker {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl ReconnectTracker {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Connection established: the retry budget is restored.
    pub fn record_open(&mut self) {
        self.attempts = 0;
    }

    pub fn record_close(&mut self, kind: CloseKind) -> CloseDecision {
        if kind == CloseKind::Deliberate {
            self.attempts = 0;
            return CloseDecision::Stay;
        }
        if self.attempts >= self.policy.max_attempts {
            return CloseDecision::GiveUp {
                attempts: self.attempts,
            };
        }
        self.attempts += 1;
        CloseDecision::Reconnect {
            attempt: self.attempts,
            after_ms: self.policy.delay_for(self.attempts),
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Retries scheduled since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_values() {
        let p = ReconnectPolicy::default();
        assert_eq!(p.max_attempts, 5);
        assert_eq!(p.base_delay_ms, 2_000);
    }

    #[test]
    fn code_1000_is_deliberate() {
        assert_eq!(CloseKind::from_code(Some(1000)), CloseKind::Deliberate);
        assert_eq!(CloseKind::from_code(Some(1006)), CloseKind::Abnormal);
        assert_eq!(CloseKind::from_code(Some(1001)), CloseKind::Abnormal);
        assert_eq!(CloseKind::from_code(None), CloseKind::Abnormal);
    }

    #[test]
    fn linear_backoff_then_give_up() {
        let mut tracker = ReconnectTracker::new(ReconnectPolicy::default());
        for k in 1..=5u32 {
            assert_eq!(
                tracker.record_close(CloseKind::Abnormal),
                CloseDecision::Reconnect {
                    attempt: k,
                    after_ms: u64::from(k) * 2_000
                }
            );
        }
        assert!(tracker.is_exhausted());
        assert_eq!(
            tracker.record_close(CloseKind::Abnormal),
            CloseDecision::GiveUp { attempts: 5 }
        );
        // Still exhausted; no sixth attempt ever appears.
        assert_eq!(
            tracker.record_close(CloseKind::Abnormal),
            CloseDecision::GiveUp { attempts: 5 }
        );
    }

    #[test]
    fn open_restores_budget() {
        let mut tracker = ReconnectTracker::new(ReconnectPolicy::default());
        tracker.record_close(CloseKind::Abnormal);
        tracker.record_close(CloseKind::Abnormal);
        tracker.record_open();
        assert_eq!(tracker.attempts(), 0);
        assert_eq!(
            tracker.record_close(CloseKind::Abnormal),
            CloseDecision::Reconnect {
                attempt: 1,
                after_ms: 2_000
            }
        );
    }

    #[test]
    fn deliberate_close_stays_and_resets() {
        let mut tracker = ReconnectTracker::new(ReconnectPolicy::default());
        tracker.record_close(CloseKind::Abnormal);
        assert_eq!(tracker.record_close(CloseKind::Deliberate), CloseDecision::Stay);
        assert_eq!(tracker.attempts(), 0);
    }

    #[test]
    fn zero_budget_gives_up_immediately() {
        let mut tracker = ReconnectTracker::new(ReconnectPolicy {
            max_attempts: 0,
            ..Default::default()
        });
        assert_eq!(
            tracker.record_close(CloseKind::Abnormal),
            CloseDecision::GiveUp { attempts: 0 }
        );
    }
}
