use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use subtracker_core::billing::cancellation::{cancellation_alerts, CancellationAlert, DismissedSet};
use subtracker_core::billing::renewal::{
    billing_notices, renewal_schedule, upcoming_renewal_count, RenewalEntry,
};
use subtracker_core::billing::{format_currency, total_monthly};
use subtracker_core::config::Settings;
use subtracker_core::domain::subscription::Subscription;
use subtracker_core::time::calendar::{format_short_date, resolve_today};

#[derive(Debug)]
pub struct ReminderReport {
    pub today: NaiveDate,
    pub cancellation_alerts: Vec<CancellationAlert>,
    pub overdue: Vec<RenewalEntry>,
    pub upcoming: Vec<RenewalEntry>,
    pub billing_notices: Vec<RenewalEntry>,
    pub headline_upcoming: usize,
    pub total_monthly: f64,
    pub active: usize,
}

/// A worker run has no session, so nothing is dismissed.
pub fn build_report(subs: &[Subscription], now: DateTime<Utc>, today: NaiveDate) -> ReminderReport {
    let schedule = renewal_schedule(subs, now);
    ReminderReport {
        today,
        cancellation_alerts: cancellation_alerts(subs, today, &DismissedSet::new()),
        overdue: schedule.overdue,
        upcoming: schedule.upcoming,
        billing_notices: billing_notices(subs, now),
        headline_upcoming: upcoming_renewal_count(subs, now),
        total_monthly: total_monthly(subs),
        active: subs.len(),
    }
}

pub async fn run(settings: &Settings, as_of: Option<&str>) -> anyhow::Result<()> {
    let today = resolve_today(as_of, Utc::now(), settings.utc_offset_minutes)?;
    // With an explicit date, measure renewals from the start of that day.
    let now = match as_of {
        Some(_) => today.and_time(NaiveTime::MIN).and_utc(),
        None => Utc::now(),
    };

    let store = subtracker_core::storage::connect_from_settings(settings).await?;
    let subs = store.list().await?;

    let report = build_report(&subs, now, today);
    log_report(&report);
    Ok(())
}

fn log_report(report: &ReminderReport) {
    for alert in &report.cancellation_alerts {
        tracing::warn!(
            id = %alert.subscription_id,
            severity = ?alert.severity,
            "{}",
            alert.message
        );
    }

    for entry in report.overdue.iter().chain(&report.upcoming) {
        tracing::info!(
            id = %entry.subscription.id,
            name = %entry.subscription.name,
            days_until = entry.days_until,
            billing_date = %entry
                .subscription
                .next_billing_date
                .map(format_short_date)
                .unwrap_or_default(),
            "{}",
            entry.label
        );
    }

    for entry in &report.billing_notices {
        tracing::info!(
            id = %entry.subscription.id,
            name = %entry.subscription.name,
            notice_days = entry.subscription.notification_days,
            "billing notice: {}",
            entry.label
        );
    }

    tracing::info!(
        today = %report.today,
        active = report.active,
        upcoming = report.headline_upcoming,
        alerts = report.cancellation_alerts.len(),
        total_monthly = %format_currency(report.total_monthly),
        "reminder run complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use subtracker_core::domain::subscription::Frequency;

    fn sub(name: &str, amount: f64, frequency: &str) -> Subscription {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Subscription {
            id: fixed_id(),
            name: name.to_string(),
            amount,
            frequency: Frequency::from(frequency),
            category: "other".to_string(),
            next_billing_date: None,
            notification_days: None,
            email_sender: None,
            notes: None,
            cancellation_date: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn fixed_id() -> subtracker_core::domain::subscription::SubscriptionId {
        "00000000-0000-4000-8000-000000000000"
            .parse::<subtracker_core::domain::subscription::SubscriptionId>()
            .unwrap()
    }

    #[test]
    fn report_collects_alerts_and_windows() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 6, 0, 0).unwrap();
        let today = now.date_naive();

        let mut soon = sub("Soon", 15.0, "weekly");
        soon.next_billing_date = Some(today + Duration::days(3));
        soon.notification_days = Some(5);

        let mut late = sub("Late", 120.0, "yearly");
        late.next_billing_date = Some(today - Duration::days(2));
        late.cancellation_date = Some(today);

        let mut far = sub("Far", 30.0, "quarterly");
        far.next_billing_date = Some(today + Duration::days(40));

        let report = build_report(&[soon, late, far], now, today);

        assert_eq!(report.active, 3);
        assert_eq!(report.upcoming.len(), 1);
        assert_eq!(report.upcoming[0].label, "Due in 3 days");
        assert_eq!(report.overdue.len(), 1);
        assert_eq!(report.overdue[0].label, "Overdue by 2 days");
        assert_eq!(report.headline_upcoming, 2);
        assert_eq!(report.billing_notices.len(), 1);
        assert_eq!(report.cancellation_alerts.len(), 1);
        assert!((report.total_monthly - (64.95 + 10.0 + 10.0)).abs() < 1e-9);
    }
}
