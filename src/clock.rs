use time::{Duration, OffsetDateTime};

pub const MESSAGE_EXPIRY: Duration = Duration::hours(1);
pub const USER_TIMEOUT: Duration = Duration::seconds(60);

/// TTL thresholds for messages and presence. Remaining lifetime is always
/// derived from `created_at` on demand, never ticked down by a timer.
#[derive(Clone, Copy, Debug)]
pub struct TtlPolicy {
    pub message_expiry: Duration,
    pub user_timeout: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            message_expiry: MESSAGE_EXPIRY,
            user_timeout: USER_TIMEOUT,
        }
    }
}

impl TtlPolicy {
    pub fn remaining_secs(&self, created_at: OffsetDateTime, now: OffsetDateTime) -> i64 {
        (self.message_expiry - (now - created_at)).whole_seconds().max(0)
    }

    pub fn is_expired(&self, created_at: OffsetDateTime, now: OffsetDateTime) -> bool {
        now - created_at >= self.message_expiry
    }

    pub fn is_stale(&self, last_heartbeat: OffsetDateTime, now: OffsetDateTime) -> bool {
        now - last_heartbeat >= self.user_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn remaining_is_monotone_and_hits_zero_once() {
        let policy = TtlPolicy::default();
        let created = datetime!(2026-01-01 12:00 UTC);

        let mut last = i64::MAX;
        for secs in [0, 1, 1800, 3599, 3600, 3601, 9999] {
            let remaining = policy.remaining_secs(created, created + Duration::seconds(secs));
            assert!(remaining <= last);
            last = remaining;
        }
        assert_eq!(policy.remaining_secs(created, created + Duration::seconds(3599)), 1);
        assert_eq!(policy.remaining_secs(created, created + Duration::seconds(3600)), 0);
        assert_eq!(policy.remaining_secs(created, created + Duration::seconds(3601)), 0);
    }

    #[test]
    fn expiry_boundary() {
        let policy = TtlPolicy::default();
        let created = datetime!(2026-01-01 12:00 UTC);
        assert!(!policy.is_expired(created, created + Duration::seconds(3599)));
        assert!(policy.is_expired(created, created + Duration::seconds(3600)));
    }

    #[test]
    fn staleness_boundary() {
        let policy = TtlPolicy::default();
        let seen = datetime!(2026-01-01 12:00 UTC);
        assert!(!policy.is_stale(seen, seen + Duration::seconds(59)));
        assert!(policy.is_stale(seen, seen + Duration::seconds(60)));
        assert!(policy.is_stale(seen, seen + Duration::seconds(61)));
    }
}
