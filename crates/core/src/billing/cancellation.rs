use crate::domain::subscription::{Subscription, SubscriptionId};
use crate::time::calendar::format_long_date;
use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;

/// Subscription ids whose cancellation alert the user has acknowledged.
///
/// The set belongs to the caller and lives for one session. It is never written to the
/// record store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DismissedSet(HashSet<SubscriptionId>);

impl DismissedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the id was already dismissed.
    pub fn dismiss(&mut self, id: SubscriptionId) -> bool {
        self.0.insert(id)
    }

    pub fn contains(&self, id: &SubscriptionId) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses a comma-separated id list. Blank entries are ignored.
    pub fn parse_list(s: &str) -> anyhow::Result<Self> {
        let mut out = Self::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let id = part
                .parse::<SubscriptionId>()
                .with_context(|| format!("invalid subscription id: {part}"))?;
            out.dismiss(id);
        }
        Ok(out)
    }
}

impl FromIterator<SubscriptionId> for DismissedSet {
    fn from_iter<I: IntoIterator<Item = SubscriptionId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    DueToday,
    PastDue,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationAlert {
    pub subscription_id: SubscriptionId,
    pub name: String,
    pub cancellation_date: NaiveDate,
    pub severity: AlertSeverity,
    pub message: String,
}

/// Day-granularity severity of a cancellation reminder, or `None` when there is no reminder or
/// it is still in the future. Dismissal is not considered here.
pub fn alert_severity(sub: &Subscription, today: NaiveDate) -> Option<AlertSeverity> {
    let date = sub.cancellation_date?;
    if today == date {
        Some(AlertSeverity::DueToday)
    } else if today > date {
        Some(AlertSeverity::PastDue)
    } else {
        None
    }
}

pub fn is_cancellation_due(sub: &Subscription, today: NaiveDate, dismissed: &DismissedSet) -> bool {
    !dismissed.contains(&sub.id) && alert_severity(sub, today).is_some()
}

/// Alerts to show, in input order.
pub fn cancellation_alerts(
    subs: &[Subscription],
    today: NaiveDate,
    dismissed: &DismissedSet,
) -> Vec<CancellationAlert> {
    subs.iter()
        .filter(|sub| is_cancellation_due(sub, today, dismissed))
        .filter_map(|sub| {
            let severity = alert_severity(sub, today)?;
            let date = sub.cancellation_date?;
            Some(CancellationAlert {
                subscription_id: sub.id,
                name: sub.name.clone(),
                cancellation_date: date,
                severity,
                message: alert_message(&sub.name, date, severity),
            })
        })
        .collect()
}

fn alert_message(name: &str, date: NaiveDate, severity: AlertSeverity) -> String {
    let date = format_long_date(date);
    match severity {
        AlertSeverity::DueToday => format!("Cancel {name} today! Due date: {date}"),
        AlertSeverity::PastDue => {
            format!("Past due: Cancel {name} immediately! Was due on {date}")
        }
    }
}
