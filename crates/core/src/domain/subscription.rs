use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type SubscriptionId = uuid::Uuid;

/// Billing cadence. Strings that are not exactly one of the four known cadences are kept
/// verbatim in `Other` so that a row written by another client never fails to decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Frequency {
    Monthly,
    Yearly,
    Quarterly,
    Weekly,
    Other(String),
}

impl Frequency {
    pub fn as_str(&self) -> &str {
        match self {
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
            Frequency::Quarterly => "quarterly",
            Frequency::Weekly => "weekly",
            Frequency::Other(s) => s.as_str(),
        }
    }
}

impl From<&str> for Frequency {
    fn from(s: &str) -> Self {
        match s {
            "monthly" => Frequency::Monthly,
            "yearly" => Frequency::Yearly,
            "quarterly" => Frequency::Quarterly,
            "weekly" => Frequency::Weekly,
            _ => Frequency::Other(s.to_string()),
        }
    }
}

impl From<String> for Frequency {
    fn from(s: String) -> Self {
        Frequency::from(s.as_str())
    }
}

impl From<Frequency> for String {
    fn from(f: Frequency) -> Self {
        match f {
            Frequency::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subscription row as the record store returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub name: String,
    pub amount: f64,
    pub frequency: Frequency,
    pub category: String,
    pub next_billing_date: Option<NaiveDate>,
    /// Days of advance billing notice; `None` when notifications are off.
    pub notification_days: Option<i32>,
    #[serde(default)]
    pub email_sender: Option<String>,
    pub notes: Option<String>,
    pub cancellation_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn notifications_enabled(&self) -> bool {
        self.notification_days.is_some()
    }
}

/// Capitalizes the first character, as category labels are shown in the distribution view.
pub fn display_label(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
