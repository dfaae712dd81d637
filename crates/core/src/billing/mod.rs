pub mod cancellation;
pub mod distribution;
pub mod renewal;

use crate::domain::subscription::{Frequency, Subscription};

/// Average weeks per month. This is an approximation, not a calendar-accurate conversion:
/// a given month has anywhere from 4 to 4.43 weeks.
pub const WEEKS_PER_MONTH: f64 = 4.33;

/// Cost of a subscription normalized to one month. Unknown frequencies fall back to the raw
/// amount. No rounding is applied.
pub fn monthly_amount(sub: &Subscription) -> f64 {
    monthly_equivalent(sub.amount, &sub.frequency)
}

pub fn monthly_equivalent(amount: f64, frequency: &Frequency) -> f64 {
    match frequency {
        Frequency::Monthly => amount,
        Frequency::Yearly => amount / 12.0,
        Frequency::Quarterly => amount / 3.0,
        Frequency::Weekly => amount * WEEKS_PER_MONTH,
        Frequency::Other(_) => amount,
    }
}

/// Unrounded sum of monthly amounts.
pub fn total_monthly(subs: &[Subscription]) -> f64 {
    subs.iter().map(monthly_amount).sum()
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn format_currency(value: f64) -> String {
    format!("${value:.2}")
}


#[cfg(test)]
mod tests {
    use super::fixtures::sub;
    use super::*;

    #[test]
    fn yearly_is_one_twelfth() {
        for amount in [0.0, 1.0, 120.0, 99.99, 1234.5] {
            let m = monthly_amount(&sub("x", amount, "yearly", "other"));
            assert!((m - amount / 12.0).abs() < 1e-9);
        }
        assert!((monthly_amount(&sub("x", 120.0, "yearly", "other")) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn weekly_uses_average_month() {
        let m = monthly_amount(&sub("gym", 15.0, "weekly", "other"));
        assert!((m - 64.95).abs() < 1e-9);
        assert_eq!(round_cents(m), 64.95);
    }

    #[test]
    fn every_frequency_is_defined() {
        assert_eq!(monthly_amount(&sub("a", 30.0, "monthly", "other")), 30.0);
        assert_eq!(monthly_amount(&sub("a", 30.0, "quarterly", "other")), 10.0);
        assert_eq!(monthly_amount(&sub("a", 30.0, "fortnightly", "other")), 30.0);
        assert_eq!(monthly_amount(&sub("a", 30.0, "", "other")), 30.0);
        assert_eq!(monthly_amount(&sub("a", 30.0, " yearly", "other")), 30.0);
    }

    #[test]
    fn total_monthly_sums_without_rounding() {
        let subs = vec![
            sub("a", 10.0, "monthly", "other"),
            sub("b", 1.0, "yearly", "other"),
            sub("c", 1.0, "quarterly", "other"),
        ];
        let expected = 10.0 + 1.0 / 12.0 + 1.0 / 3.0;
        assert!((total_monthly(&subs) - expected).abs() < 1e-12);
        assert_eq!(total_monthly(&[]), 0.0);
    }

    #[test]
    fn currency_has_two_decimals() {
        assert_eq!(format_currency(10.0), "$10.00");
        assert_eq!(format_currency(64.9500000001), "$64.95");
    }
}
