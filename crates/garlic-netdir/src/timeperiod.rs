//! Time-period and shared-random arithmetic.
//!
//! Everything here is pure integer arithmetic over Unix-second
//! timestamps; no calendar library is needed once the consensus'
//! `valid-after`/`fresh-until`/`valid-until` have already been turned
//! into Unix seconds by `garlic-netdoc`.

/// Default voting interval (seconds) assumed when `fresh_until` isn't
/// strictly after `valid_after` (shouldn't happen on a real consensus,
/// but keeps this arithmetic total).
pub const DEFAULT_VOTING_INTERVAL_SECS: u64 = 3600;
/// Default time-period length (minutes) on the real Tor network.
pub const DEFAULT_TIME_PERIOD_LENGTH_MINUTES: u64 = 1440;

/// The voting interval, in seconds, implied by a consensus's validity window.
pub fn voting_interval(valid_after: u64, fresh_until: u64) -> u64 {
    if fresh_until > valid_after {
        fresh_until - valid_after
    } else {
        DEFAULT_VOTING_INTERVAL_SECS
    }
}

/// The time-period length, in minutes, auto-reduced on low-voting-interval
/// (testing) networks.
pub fn time_period_length_minutes(voting_interval_secs: u64) -> u64 {
    if voting_interval_secs < 3600 {
        24 * voting_interval_secs / 60
    } else {
        DEFAULT_TIME_PERIOD_LENGTH_MINUTES
    }
}

/// The current time-period number at Unix time `t`.
pub fn time_period_num(t: u64, voting_interval_secs: u64, time_period_length_minutes: u64) -> u64 {
    let rotation_offset = 12 * (voting_interval_secs / 60);
    let minutes = t / 60;
    minutes.saturating_sub(rotation_offset) / time_period_length_minutes
}

/// The Unix-second start of the period *after* `tpn`.
pub fn tp_start(tpn: u64, time_period_length_minutes: u64, voting_interval_secs: u64) -> u64 {
    (tpn + 1) * time_period_length_minutes * 60 + 12 * voting_interval_secs
}

/// The start of the 24-hour shared-random voting day containing
/// `valid_after`.
pub fn srv_start(valid_after: u64, voting_interval_secs: u64) -> u64 {
    let period_index = (valid_after / voting_interval_secs) % 24;
    valid_after - period_index * voting_interval_secs
}

/// Which shared-random value a consensus with the given `valid_after`
/// should use: true selects
/// the *previous* SRV, false selects the *current* one.
pub fn use_previous_srv(valid_after: u64, voting_interval_secs: u64, time_period_length_minutes: u64) -> bool {
    let start = srv_start(valid_after, voting_interval_secs);
    let tpn_at_start = time_period_num(start, voting_interval_secs, time_period_length_minutes);
    let next_start = tp_start(tpn_at_start, time_period_length_minutes, voting_interval_secs);
    start <= valid_after && valid_after < next_start
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn time_period_num_matches_rend_spec_vector() {
        // rend-spec-v3 time-period worked example.
        let tpl = 1440;
        let vi = 3600;
        let t = 1_460_545_200; // 2016-04-13T11:00:00Z
        assert_eq!(time_period_num(t, vi, tpl), 16903);
        assert_eq!(time_period_num(t + 3599, vi, tpl), 16903);
    }

    #[test]
    fn time_period_num_is_monotonic_and_steps_by_one_at_boundaries() {
        let tpl = 1440;
        let vi = 3600;
        let t0 = 1_460_545_200;
        let tpn0 = time_period_num(t0, vi, tpl);
        for delta in [0u64, 100, 3599, 7200] {
            assert!(time_period_num(t0 + delta, vi, tpl) >= tpn0);
        }
        let boundary = tp_start(tpn0, tpl, vi);
        assert_eq!(time_period_num(boundary, vi, tpl), tpn0 + 1);
        assert_eq!(time_period_num(boundary - 1, vi, tpl), tpn0);
    }

    #[test]
    fn srv_selection_matches_rend_spec_vector() {
        // rend-spec-v3 shared-random-selection worked example.
        let vi = 3600;
        let tpl = 1440;
        let va_current = 499_176_000; // 1985-10-26T12:00:00Z
        assert!(!use_previous_srv(va_current, vi, tpl));
        let va_previous = 499_219_200; // 1985-10-27T00:00:00Z
        assert!(use_previous_srv(va_previous, vi, tpl));
    }

    #[test]
    fn low_voting_interval_reduces_time_period_length() {
        assert_eq!(time_period_length_minutes(600), 240);
        assert_eq!(time_period_length_minutes(3600), 1440);
        assert_eq!(time_period_length_minutes(7200), 1440);
    }
}
