//! Integration health state machine.
//!
//! ```text
//! active/pending → error : consecutive failed checks >= unhealthy_threshold
//! error → active         : one successful check
//! ```
//!
//! Inactive integrations are never probed and never change state here.

use crate::integration::IntegrationStatus;

/// A status change caused by a health check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: IntegrationStatus,
    pub to: IntegrationStatus,
}

/// Applies health check results to an integration's status.
#[derive(Debug, Clone, Copy)]
pub struct HealthTracker {
    unhealthy_threshold: u32,
}

impl HealthTracker {
    pub fn new(unhealthy_threshold: u32) -> Self {
        Self {
            unhealthy_threshold: unhealthy_threshold.max(1),
        }
    }

    pub fn unhealthy_threshold(&self) -> u32 {
        self.unhealthy_threshold
    }

    /// Fold one check result into `status` and the failure streak.
    pub fn observe(
        &self,
        status: &mut IntegrationStatus,
        consecutive_failures: &mut u32,
        healthy: bool,
    ) -> Option<StatusTransition> {
        if *status == IntegrationStatus::Inactive {
            return None;
        }

        let from = *status;
        if healthy {
            *consecutive_failures = 0;
            if from != IntegrationStatus::Active {
                *status = IntegrationStatus::Active;
            }
        } else {
            *consecutive_failures = consecutive_failures.saturating_add(1);
            if *consecutive_failures >= self.unhealthy_threshold && from != IntegrationStatus::Error {
                *status = IntegrationStatus::Error;
            }
        }

        (from != *status).then_some(StatusTransition { from, to: *status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_after_threshold_failures() {
        let tracker = HealthTracker::new(3);
        let mut status = IntegrationStatus::Active;
        let mut failures = 0;

        assert_eq!(tracker.observe(&mut status, &mut failures, false), None);
        assert_eq!(tracker.observe(&mut status, &mut failures, false), None);
        assert_eq!(status, IntegrationStatus::Active);

        let transition = tracker.observe(&mut status, &mut failures, false).unwrap();
        assert_eq!(transition.from, IntegrationStatus::Active);
        assert_eq!(transition.to, IntegrationStatus::Error);

        // Further failures keep it in error without new transitions.
        assert_eq!(tracker.observe(&mut status, &mut failures, false), None);
        assert_eq!(failures, 4);
    }

    #[test]
    fn test_success_resets_streak_and_recovers() {
        let tracker = HealthTracker::new(2);
        let mut status = IntegrationStatus::Active;
        let mut failures = 0;

        tracker.observe(&mut status, &mut failures, false);
        tracker.observe(&mut status, &mut failures, true);
        tracker.observe(&mut status, &mut failures, false);
        assert_eq!(status, IntegrationStatus::Active);

        tracker.observe(&mut status, &mut failures, false);
        assert_eq!(status, IntegrationStatus::Error);

        let transition = tracker.observe(&mut status, &mut failures, true).unwrap();
        assert_eq!(transition.to, IntegrationStatus::Active);
        assert_eq!(failures, 0);
    }

    #[test]
    fn test_inactive_is_untouched() {
        let tracker = HealthTracker::new(1);
        let mut status = IntegrationStatus::Inactive;
        let mut failures = 0;
        assert_eq!(tracker.observe(&mut status, &mut failures, false), None);
        assert_eq!(tracker.observe(&mut status, &mut failures, true), None);
        assert_eq!(status, IntegrationStatus::Inactive);
        assert_eq!(failures, 0);
    }
}
