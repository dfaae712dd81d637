use crate::billing::cancellation::{cancellation_alerts, CancellationAlert, DismissedSet};
use crate::billing::distribution::{group_monthly_by_category, CategoryTotal};
use crate::billing::renewal::upcoming_renewal_count;
use crate::billing::{format_currency, round_cents, total_monthly};
use crate::domain::subscription::Subscription;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Everything the dashboard header and banners need, derived from one store snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub total_monthly: f64,
    pub total_monthly_display: String,
    pub active_subscriptions: usize,
    pub upcoming_renewals: usize,
    pub cancellation_alerts: Vec<CancellationAlert>,
    pub category_totals: Vec<CategoryTotal>,
}

impl DashboardSummary {
    pub fn build(
        subs: &[Subscription],
        now: DateTime<Utc>,
        today: NaiveDate,
        dismissed: &DismissedSet,
    ) -> Self {
        let total = total_monthly(subs);
        Self {
            total_monthly: round_cents(total),
            total_monthly_display: format_currency(total),
            active_subscriptions: subs.len(),
            upcoming_renewals: upcoming_renewal_count(subs, now),
            cancellation_alerts: cancellation_alerts(subs, today, dismissed),
            category_totals: group_monthly_by_category(subs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::fixtures::sub;
    use chrono::{Duration, TimeZone};

    #[test]
    fn builds_summary_from_snapshot() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 15, 0, 0).unwrap();
        let today = now.date_naive();

        let mut netflix = sub("Netflix", 15.0, "monthly", "entertainment");
        netflix.next_billing_date = Some(today + Duration::days(3));
        let mut gym = sub("Gym", 120.0, "yearly", "health");
        gym.next_billing_date = Some(today - Duration::days(2));
        gym.cancellation_date = Some(today - Duration::days(1));
        let mut cloud = sub("Cloud", 9.99, "monthly", "entertainment");
        cloud.next_billing_date = Some(today + Duration::days(30));

        let subs = vec![netflix, gym.clone(), cloud];

        let summary = DashboardSummary::build(&subs, now, today, &DismissedSet::new());
        assert_eq!(summary.total_monthly, 34.99);
        assert_eq!(summary.total_monthly_display, "$34.99");
        assert_eq!(summary.active_subscriptions, 3);
        assert_eq!(summary.upcoming_renewals, 2);
        assert_eq!(summary.cancellation_alerts.len(), 1);
        assert_eq!(summary.category_totals.len(), 2);
        assert_eq!(summary.category_totals[0].monthly_total, 24.99);

        let dismissed: DismissedSet = [gym.id].into_iter().collect();
        let summary = DashboardSummary::build(&subs, now, today, &dismissed);
        assert!(summary.cancellation_alerts.is_empty());
    }
}
