//! Instance-hour billing arithmetic

use chrono::{DateTime, Duration, Utc};

/// Length of one billing period
pub const BILLING_INTERVAL_SECS: i64 = 3600;

/// Start of the next billing period of a machine launched at `launch_time`
///
/// A machine exactly on a period boundary has just started a new period.
#[must_use]
pub fn next_billing_boundary(launch_time: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let elapsed = (now - launch_time).num_seconds().max(0);
    let periods = elapsed / BILLING_INTERVAL_SECS + 1;
    launch_time + Duration::seconds(periods * BILLING_INTERVAL_SECS)
}

/// Time left in the current billing period
#[must_use]
pub fn remaining_billing_time(launch_time: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    next_billing_boundary(launch_time, now) - now
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn boundary_within_first_hour() {
        let now = t0() + Duration::minutes(55);
        assert_eq!(next_billing_boundary(t0(), now), t0() + Duration::hours(1));
        assert_eq!(remaining_billing_time(t0(), now), Duration::minutes(5));
    }

    #[test]
    fn boundary_in_later_hours() {
        let now = t0() + Duration::minutes(130);
        assert_eq!(next_billing_boundary(t0(), now), t0() + Duration::hours(3));
    }

    #[test]
    fn exact_boundary_starts_new_period() {
        let now = t0() + Duration::hours(2);
        assert_eq!(next_billing_boundary(t0(), now), t0() + Duration::hours(3));
    }

    #[test]
    fn launch_in_future_counts_as_fresh() {
        let now = t0() - Duration::minutes(1);
        assert_eq!(next_billing_boundary(t0(), now), t0() + Duration::hours(1));
    }
}
