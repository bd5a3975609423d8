//! Integer accrual math shared by the payment path and the read-only views.
//!
//! Every clock value here is in milliseconds while rates are expressed per
//! second, hence the `/ MILLIS_PER_SECOND` on every accrual.

pub const MILLIS_PER_SECOND: u64 = 1_000;

/// `total_amount / duration_seconds`, truncating.
///
/// Returns `None` when the duration is zero. A zero result is a degenerate
/// rate and is rejected by the caller.
pub fn rate_per_second(total_amount: i128, duration_seconds: u64) -> Option<i128> {
    if duration_seconds == 0 {
        return None;
    }
    total_amount.checked_div(duration_seconds as i128)
}

/// Clock value `seconds` after `start`, or `None` if it does not fit in a
/// `u64`. Used for both the end of the vesting window and trigger due times.
pub fn after_seconds(start: u64, seconds: u64) -> Option<u64> {
    seconds
        .checked_mul(MILLIS_PER_SECOND)
        .and_then(|span| start.checked_add(span))
}

/// Value accrued between the last checkpoint and `now`.
///
/// `None` signals an arithmetic overflow; the payment path treats that as a
/// halt rather than wrapping. A clock that reads earlier than the checkpoint
/// accrues nothing.
pub fn accrued_since(last_payment_time: u64, now: u64, rate_per_second: i128) -> Option<i128> {
    let elapsed = now.saturating_sub(last_payment_time) as i128;
    elapsed
        .checked_mul(rate_per_second)
        .map(|scaled| scaled / MILLIS_PER_SECOND as i128)
}

/// Unpaid part of the escrow.
pub fn remaining(total_amount: i128, withdrawn_amount: i128) -> i128 {
    total_amount.saturating_sub(withdrawn_amount).max(0)
}

/// Amount the next payment would release, without touching state.
///
/// Past `end_time` this is the exact remainder, which is what the final
/// payment sends. Before that it is the accrual since the checkpoint,
/// clamped to the remainder. An overflowing accrual halts the payment path,
/// so it previews as zero.
pub fn withdrawable(
    total_amount: i128,
    withdrawn_amount: i128,
    rate_per_second: i128,
    last_payment_time: u64,
    end_time: u64,
    now: u64,
) -> i128 {
    let left = remaining(total_amount, withdrawn_amount);
    if now >= end_time {
        return left;
    }
    match accrued_since(last_payment_time, now, rate_per_second) {
        Some(accrued) => accrued.clamp(0, left),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_truncates() {
        assert_eq!(rate_per_second(3600, 3600), Some(1));
        assert_eq!(rate_per_second(1000, 3), Some(333));
        assert_eq!(rate_per_second(59, 60), Some(0));
        assert_eq!(rate_per_second(100, 0), None);
    }

    #[test]
    fn after_seconds_overflow_is_detected() {
        assert_eq!(after_seconds(5_000, 10), Some(15_000));
        assert_eq!(after_seconds(0, u64::MAX), None);
        assert_eq!(after_seconds(u64::MAX - 500, 1), None);
    }

    #[test]
    fn accrual_uses_millisecond_clock() {
        // one minute at 1/s
        assert_eq!(accrued_since(0, 60_000, 1), Some(60));
        // sub-second remainder is truncated
        assert_eq!(accrued_since(0, 1_999, 1), Some(1));
        assert_eq!(accrued_since(10_000, 5_000, 7), Some(0));
    }

    #[test]
    fn accrual_overflow_returns_none() {
        assert_eq!(accrued_since(0, u64::MAX, i128::MAX), None);
    }

    #[test]
    fn withdrawable_clamps_to_remaining() {
        // 1000 over 10s, 900 already paid, 5s elapsed since checkpoint.
        assert_eq!(withdrawable(1000, 900, 100, 0, 10_000, 5_000), 100);
        assert_eq!(withdrawable(1000, 0, 100, 0, 10_000, 5_000), 500);
    }

    #[test]
    fn withdrawable_after_end_is_exact_remainder() {
        // 1000 / 3s truncates to 333/s; the final payment covers the lost unit.
        assert_eq!(withdrawable(1000, 666, 333, 2_000, 3_000, 3_000), 334);
        assert_eq!(withdrawable(1000, 1000, 333, 2_000, 3_000, 9_000), 0);
    }

    #[test]
    fn withdrawable_is_zero_on_overflow() {
        assert_eq!(
            withdrawable(i128::MAX, 0, i128::MAX, 0, u64::MAX, u64::MAX - 1),
            0
        );
    }
}
