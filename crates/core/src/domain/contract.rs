use crate::domain::subscription::{Frequency, Subscription};
use anyhow::{bail, ensure, Context};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

const DEFAULT_NOTIFICATION_DAYS: i32 = 7;
const DEFAULT_FREQUENCY: &str = "monthly";
const DEFAULT_CATEGORY: &str = "other";

// Characters stripped from free-text notes before they reach the store.
const STRIPPED_NOTE_CHARS: [char; 9] = ['<', '>', '{', '}', '(', ')', '\'', '"', ';'];

/// Every user-editable column, validated, ready for insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionFields {
    pub name: String,
    pub amount: f64,
    pub frequency: Frequency,
    pub category: String,
    pub next_billing_date: Option<NaiveDate>,
    pub notification_days: Option<i32>,
    pub notes: Option<String>,
    pub cancellation_date: Option<NaiveDate>,
}

impl SubscriptionFields {
    pub fn validate_and_normalize(self) -> anyhow::Result<Self> {
        let name = validate_name(&self.name)?;
        validate_amount(self.amount)?;
        if let Some(days) = self.notification_days {
            validate_notification_days(days)?;
        }

        let category = self.category.trim().to_string();
        ensure!(!category.is_empty(), "category must be non-empty");

        Ok(Self {
            name,
            amount: self.amount,
            frequency: self.frequency,
            category,
            next_billing_date: self.next_billing_date,
            notification_days: self.notification_days,
            notes: normalize_notes(self.notes),
            cancellation_date: self.cancellation_date,
        })
    }

    /// A patch that overwrites every editable column, as the edit dialog does on submit.
    pub fn into_patch(self) -> SubscriptionPatch {
        SubscriptionPatch {
            name: Some(self.name),
            amount: Some(self.amount),
            frequency: Some(self.frequency),
            category: Some(self.category),
            next_billing_date: Some(self.next_billing_date),
            notification_days: Some(self.notification_days),
            notes: Some(self.notes),
            cancellation_date: Some(self.cancellation_date),
        }
    }
}

/// Partial update. For nullable columns the outer `Option` means "touch this column" and the
/// inner one is the new value, so `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_billing_date: Option<Option<NaiveDate>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub notification_days: Option<Option<i32>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub cancellation_date: Option<Option<NaiveDate>>,
}

impl SubscriptionPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn validate_and_normalize(self) -> anyhow::Result<Self> {
        let name = self.name.as_deref().map(validate_name).transpose()?;
        if let Some(amount) = self.amount {
            validate_amount(amount)?;
        }
        if let Some(Some(days)) = self.notification_days {
            validate_notification_days(days)?;
        }

        let category = match self.category {
            Some(c) => {
                let c = c.trim().to_string();
                ensure!(!c.is_empty(), "category must be non-empty");
                Some(c)
            }
            None => None,
        };

        Ok(Self {
            name,
            amount: self.amount,
            frequency: self.frequency,
            category,
            next_billing_date: self.next_billing_date,
            notification_days: self.notification_days,
            notes: self.notes.map(normalize_notes),
            cancellation_date: self.cancellation_date,
        })
    }
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Raw add/edit dialog input. Everything is a string as typed; blank means "not set".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionForm {
    pub name: String,
    pub amount: String,
    pub frequency: String,
    pub category: String,
    pub next_billing_date: String,
    pub enable_notifications: bool,
    pub notification_days: String,
    pub notes: String,
    pub cancellation_date: String,
}

impl SubscriptionForm {
    /// Prefills the edit dialog from a stored row.
    pub fn from_subscription(sub: &Subscription) -> Self {
        Self {
            name: sub.name.clone(),
            amount: sub.amount.to_string(),
            frequency: sub.frequency.to_string(),
            category: sub.category.clone(),
            next_billing_date: sub
                .next_billing_date
                .map(|d| d.to_string())
                .unwrap_or_default(),
            enable_notifications: sub.notifications_enabled(),
            notification_days: sub
                .notification_days
                .map(|d| d.to_string())
                .unwrap_or_default(),
            notes: sub.notes.clone().unwrap_or_default(),
            cancellation_date: sub
                .cancellation_date
                .map(|d| d.to_string())
                .unwrap_or_default(),
        }
    }

    pub fn validate_and_into_fields(self) -> anyhow::Result<SubscriptionFields> {
        let amount_str = self.amount.trim();
        ensure!(!amount_str.is_empty(), "amount is required");
        let amount: f64 = amount_str
            .parse()
            .with_context(|| format!("amount is not a number: {amount_str}"))?;

        let frequency = match self.frequency.trim() {
            "" => Frequency::from(DEFAULT_FREQUENCY),
            f => Frequency::from(f),
        };

        let category = match self.category.trim() {
            "" => DEFAULT_CATEGORY.to_string(),
            c => c.to_string(),
        };

        let notification_days = if self.enable_notifications {
            match self.notification_days.trim() {
                "" => Some(DEFAULT_NOTIFICATION_DAYS),
                s => Some(
                    s.parse::<i32>()
                        .with_context(|| format!("notification days is not an integer: {s}"))?,
                ),
            }
        } else {
            None
        };

        SubscriptionFields {
            name: self.name,
            amount,
            frequency,
            category,
            next_billing_date: parse_optional_date("next billing date", &self.next_billing_date)?,
            notification_days,
            notes: Some(self.notes),
            cancellation_date: parse_optional_date("cancellation date", &self.cancellation_date)?,
        }
        .validate_and_normalize()
    }
}

/// Removes markup and quoting characters from user text.
pub fn sanitize_text(text: &str) -> String {
    text.chars()
        .filter(|c| !STRIPPED_NOTE_CHARS.contains(c))
        .collect()
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| sanitize_text(n.trim()).trim().to_string())
        .filter(|n| !n.is_empty())
}

fn validate_name(name: &str) -> anyhow::Result<String> {
    let name = name.trim().to_string();
    ensure!(!name.is_empty(), "name must be non-empty");
    Ok(name)
}

fn validate_amount(amount: f64) -> anyhow::Result<()> {
    ensure!(amount.is_finite(), "amount must be a finite number");
    ensure!(amount >= 0.0, "amount must be >= 0 (got {amount})");
    Ok(())
}

fn validate_notification_days(days: i32) -> anyhow::Result<()> {
    ensure!(days >= 1, "notification days must be a positive integer (got {days})");
    Ok(())
}

fn parse_optional_date(field: &str, s: &str) -> anyhow::Result<Option<NaiveDate>> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        Ok(d) => Ok(Some(d)),
        Err(e) => bail!("{field} must be YYYY-MM-DD (got {s}): {e}"),
    }
}
