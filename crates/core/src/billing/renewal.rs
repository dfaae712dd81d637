use crate::domain::subscription::Subscription;
use crate::time::calendar::days_until;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Renewals at most this many days out count as upcoming.
pub const UPCOMING_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "days", rename_all = "snake_case")]
pub enum RenewalStatus {
    DueToday,
    Overdue(i64),
    DueIn(i64),
}

impl RenewalStatus {
    pub fn from_days(days: i64) -> Self {
        match days {
            0 => RenewalStatus::DueToday,
            d if d < 0 => RenewalStatus::Overdue(-d),
            d => RenewalStatus::DueIn(d),
        }
    }
}

impl fmt::Display for RenewalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenewalStatus::DueToday => f.write_str("Due today"),
            RenewalStatus::Overdue(n) => write!(f, "Overdue by {n} days"),
            RenewalStatus::DueIn(n) => write!(f, "Due in {n} days"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalWindow {
    Overdue,
    Upcoming,
    Later,
}

impl RenewalWindow {
    pub fn from_days(days: i64) -> Self {
        if days < 0 {
            RenewalWindow::Overdue
        } else if days <= UPCOMING_WINDOW_DAYS {
            RenewalWindow::Upcoming
        } else {
            RenewalWindow::Later
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenewalEntry {
    pub subscription: Subscription,
    pub days_until: i64,
    pub status: RenewalStatus,
    pub label: String,
    pub window: RenewalWindow,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenewalSchedule {
    pub upcoming: Vec<RenewalEntry>,
    pub overdue: Vec<RenewalEntry>,
    pub later: Vec<RenewalEntry>,
    /// The later section starts collapsed in the detail view.
    pub later_collapsed: bool,
}

/// Dated subscriptions with their distance to the next billing date, soonest first. Ties keep
/// their input order.
pub fn renewal_entries(subs: &[Subscription], now: DateTime<Utc>) -> Vec<RenewalEntry> {
    let mut out: Vec<RenewalEntry> = subs
        .iter()
        .filter_map(|sub| {
            let date = sub.next_billing_date?;
            let days = days_until(date, now);
            let status = RenewalStatus::from_days(days);
            Some(RenewalEntry {
                subscription: sub.clone(),
                days_until: days,
                status,
                label: status.to_string(),
                window: RenewalWindow::from_days(days),
            })
        })
        .collect();

    // `sort_by_key` is stable.
    out.sort_by_key(|e| e.days_until);
    out
}

pub fn renewal_schedule(subs: &[Subscription], now: DateTime<Utc>) -> RenewalSchedule {
    let mut schedule = RenewalSchedule {
        upcoming: Vec::new(),
        overdue: Vec::new(),
        later: Vec::new(),
        later_collapsed: true,
    };

    for entry in renewal_entries(subs, now) {
        match entry.window {
            RenewalWindow::Upcoming => schedule.upcoming.push(entry),
            RenewalWindow::Overdue => schedule.overdue.push(entry),
            RenewalWindow::Later => schedule.later.push(entry),
        }
    }

    schedule
}

/// Headline count. Unlike the schedule, overdue renewals are included here.
pub fn upcoming_renewal_count(subs: &[Subscription], now: DateTime<Utc>) -> usize {
    subs.iter()
        .filter_map(|sub| sub.next_billing_date)
        .filter(|date| days_until(*date, now) <= UPCOMING_WINDOW_DAYS)
        .count()
}

/// Renewals inside each subscription's own notice period. Subscriptions without
/// `notification_days` never produce a notice.
pub fn billing_notices(subs: &[Subscription], now: DateTime<Utc>) -> Vec<RenewalEntry> {
    renewal_entries(subs, now)
        .into_iter()
        .filter(|e| {
            e.subscription
                .notification_days
                .is_some_and(|n| (0..=i64::from(n)).contains(&e.days_until))
        })
        .collect()
}
