//! Trial lifecycle predicates and grace-period policy
//!
//! Pure functions of "now" and a stored `trial_ends_at`. All callers share
//! one [`GracePolicy`] so the grace windows have a single source of truth.

use time::{Duration, OffsetDateTime};

/// Grace periods applied after trial expiry before tenant data is deleted.
///
/// The scheduled sweep and the self-service path historically used different
/// windows (7 days vs 3 days). Both values are kept here, overridable by
/// `TRIAL_GRACE_SWEEP_DAYS` / `TRIAL_GRACE_SELF_SERVICE_DAYS`; whether they
/// should converge is an open product question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GracePolicy {
    /// Window used by the scheduled sweep
    pub sweep: Duration,
    /// Window used by the user-triggered removal
    pub self_service: Duration,
}

impl Default for GracePolicy {
    fn default() -> Self {
        Self {
            sweep: Duration::days(7),
            self_service: Duration::days(3),
        }
    }
}

impl GracePolicy {
    /// Build from environment, falling back to the defaults (7d / 3d)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sweep: env_days("TRIAL_GRACE_SWEEP_DAYS").unwrap_or(defaults.sweep),
            self_service: env_days("TRIAL_GRACE_SELF_SERVICE_DAYS").unwrap_or(defaults.self_service),
        }
    }
}

fn env_days(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .map(Duration::days)
}

/// The trial has ended: strictly after `ends_at`.
pub fn is_trial_expired(now: OffsetDateTime, ends_at: OffsetDateTime) -> bool {
    now > ends_at
}

/// Expired but still within the grace window: `(ends_at, ends_at + grace]`.
pub fn is_in_grace_period(now: OffsetDateTime, ends_at: OffsetDateTime, grace: Duration) -> bool {
    now > ends_at && now <= ends_at + grace
}

/// Past the grace window: data is eligible for deletion.
pub fn is_past_grace_period(now: OffsetDateTime, ends_at: OffsetDateTime, grace: Duration) -> bool {
    now > ends_at + grace
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use time::macros::datetime;

    // Serializes tests that mutate process environment
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENDS_AT: OffsetDateTime = datetime!(2025-06-01 12:00:00 UTC);

    #[test]
    fn test_not_expired_before_and_at_boundary() {
        let grace = GracePolicy::default().sweep;
        for now in [ENDS_AT - Duration::days(1), ENDS_AT] {
            assert!(!is_trial_expired(now, ENDS_AT));
            assert!(!is_in_grace_period(now, ENDS_AT, grace));
            assert!(!is_past_grace_period(now, ENDS_AT, grace));
        }
    }

    #[test]
    fn test_grace_window_is_half_open() {
        let grace = Duration::days(7);

        // Just after expiry: expired and in grace, not past it
        let now = ENDS_AT + Duration::seconds(1);
        assert!(is_trial_expired(now, ENDS_AT));
        assert!(is_in_grace_period(now, ENDS_AT, grace));
        assert!(!is_past_grace_period(now, ENDS_AT, grace));

        // Exactly at the grace boundary: still in grace
        let now = ENDS_AT + grace;
        assert!(is_trial_expired(now, ENDS_AT));
        assert!(is_in_grace_period(now, ENDS_AT, grace));
        assert!(!is_past_grace_period(now, ENDS_AT, grace));

        // One second past the boundary: past grace, no longer in it
        let now = ENDS_AT + grace + Duration::seconds(1);
        assert!(is_trial_expired(now, ENDS_AT));
        assert!(!is_in_grace_period(now, ENDS_AT, grace));
        assert!(is_past_grace_period(now, ENDS_AT, grace));
    }

    #[test]
    fn test_predicates_partition_time() {
        // At any instant, at most one of {not-expired, in-grace, past-grace} holds
        let grace = Duration::days(3);
        let instants = [
            ENDS_AT - Duration::days(10),
            ENDS_AT,
            ENDS_AT + Duration::hours(1),
            ENDS_AT + grace,
            ENDS_AT + grace + Duration::seconds(1),
            ENDS_AT + Duration::days(30),
        ];

        for now in instants {
            let not_expired = !is_trial_expired(now, ENDS_AT);
            let in_grace = is_in_grace_period(now, ENDS_AT, grace);
            let past_grace = is_past_grace_period(now, ENDS_AT, grace);

            let regions = [not_expired, in_grace, past_grace];
            assert_eq!(
                regions.iter().filter(|r| **r).count(),
                1,
                "instant {now} must fall in exactly one region"
            );
        }
    }

    #[test]
    fn test_default_policy_windows() {
        let policy = GracePolicy::default();
        assert_eq!(policy.sweep, Duration::days(7));
        assert_eq!(policy.self_service, Duration::days(3));
    }

    #[test]
    fn test_policy_from_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();

        std::env::set_var("TRIAL_GRACE_SWEEP_DAYS", "14");
        std::env::set_var("TRIAL_GRACE_SELF_SERVICE_DAYS", "5");
        let policy = GracePolicy::from_env();
        assert_eq!(policy.sweep, Duration::days(14));
        assert_eq!(policy.self_service, Duration::days(5));

        std::env::remove_var("TRIAL_GRACE_SWEEP_DAYS");
        std::env::remove_var("TRIAL_GRACE_SELF_SERVICE_DAYS");
        let policy = GracePolicy::from_env();
        assert_eq!(policy, GracePolicy::default());
    }
}
