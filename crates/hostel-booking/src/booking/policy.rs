use chrono::NaiveDate;

use super::domain::{CancellationPolicy, RefundOutcome};

/// Maps days-before-check-in to a refund tier under the hostel's policy.
///
/// `days` floors to whole days (`check_in - today`). Boundary days resolve to
/// the higher tier: exactly `full_refund_days` out is a full refund, exactly
/// `partial_refund_days` out is a partial one. Pure: no I/O, no hidden state.
pub fn evaluate_refund(
    check_in: NaiveDate,
    today: NaiveDate,
    policy: &CancellationPolicy,
) -> RefundOutcome {
    let days = (check_in - today).num_days();

    if days >= policy.full_refund_days {
        RefundOutcome::Full
    } else if days >= policy.partial_refund_days {
        RefundOutcome::Partial(policy.partial_refund_percentage)
    } else {
        RefundOutcome::None
    }
}
