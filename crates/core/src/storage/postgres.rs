use crate::domain::contract::{SubscriptionFields, SubscriptionPatch};
use crate::domain::subscription::{Frequency, Subscription, SubscriptionId};
use crate::storage::{Backend, StoreError, SubscriptionStore};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

const COLUMNS: &str = "id, name, amount, frequency, category, next_billing_date, notification_days, \
                       email_sender, notes, cancellation_date, created_at, updated_at";

type SubscriptionRow = (
    SubscriptionId,
    String,
    f64,
    String,
    String,
    Option<NaiveDate>,
    Option<i32>,
    Option<String>,
    Option<String>,
    Option<NaiveDate>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn row_into_subscription(row: SubscriptionRow) -> Subscription {
    let (
        id,
        name,
        amount,
        frequency,
        category,
        next_billing_date,
        notification_days,
        email_sender,
        notes,
        cancellation_date,
        created_at,
        updated_at,
    ) = row;

    Subscription {
        id,
        name,
        amount,
        frequency: Frequency::from(frequency),
        category,
        next_billing_date,
        notification_days,
        email_sender,
        notes,
        cancellation_date,
        created_at,
        updated_at,
    }
}

fn query_error(stage: &'static str, err: sqlx::Error) -> anyhow::Error {
    StoreError {
        backend: Backend::Postgres,
        stage,
        detail: err.to_string(),
        status: None,
    }
    .into()
}

#[derive(Debug, Clone)]
pub struct PgSubscriptionStore {
    pool: sqlx::PgPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    fn with_access_token(&self, _access_token: &str) -> Arc<dyn SubscriptionStore> {
        Arc::new(self.clone())
    }

    async fn list(&self) -> anyhow::Result<Vec<Subscription>> {
        let t0 = std::time::Instant::now();
        let sql = format!(
            "SELECT {COLUMNS} FROM subscriptions \
             ORDER BY next_billing_date ASC NULLS LAST, created_at ASC"
        );
        let rows = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .persistent(false)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_error("list", e))
            .context("select subscriptions failed")?;

        tracing::debug!(
            rows = rows.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "subscriptions list"
        );
        Ok(rows.into_iter().map(row_into_subscription).collect())
    }

    async fn insert(&self, fields: &SubscriptionFields) -> anyhow::Result<Subscription> {
        let sql = format!(
            "INSERT INTO subscriptions \
             (name, amount, frequency, category, next_billing_date, notification_days, notes, cancellation_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .persistent(false)
            .bind(&fields.name)
            .bind(fields.amount)
            .bind(fields.frequency.as_str())
            .bind(&fields.category)
            .bind(fields.next_billing_date)
            .bind(fields.notification_days)
            .bind(&fields.notes)
            .bind(fields.cancellation_date)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_error("insert", e))
            .context("insert subscriptions failed")?;

        let sub = row_into_subscription(row);
        tracing::debug!(id = %sub.id, "subscription inserted");
        Ok(sub)
    }

    async fn update(
        &self,
        id: SubscriptionId,
        patch: &SubscriptionPatch,
    ) -> anyhow::Result<Subscription> {
        let mut qb = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "UPDATE subscriptions SET updated_at = now()",
        );
        push_patch_assignments(&mut qb, patch);
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(format!(" RETURNING {COLUMNS}"));

        let row = qb
            .build_query_as::<SubscriptionRow>()
            .persistent(false)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error("update", e))
            .context("update subscriptions failed")?;

        let Some(row) = row else {
            return Err(StoreError::not_found(Backend::Postgres, id).into());
        };

        tracing::debug!(%id, "subscription updated");
        Ok(row_into_subscription(row))
    }
}

fn push_patch_assignments(qb: &mut sqlx::QueryBuilder<'_, sqlx::Postgres>, patch: &SubscriptionPatch) {
    if let Some(name) = &patch.name {
        qb.push(", name = ").push_bind(name.clone());
    }
    if let Some(amount) = patch.amount {
        qb.push(", amount = ").push_bind(amount);
    }
    if let Some(frequency) = &patch.frequency {
        qb.push(", frequency = ").push_bind(frequency.as_str().to_string());
    }
    if let Some(category) = &patch.category {
        qb.push(", category = ").push_bind(category.clone());
    }
    if let Some(next_billing_date) = patch.next_billing_date {
        qb.push(", next_billing_date = ").push_bind(next_billing_date);
    }
    if let Some(notification_days) = patch.notification_days {
        qb.push(", notification_days = ").push_bind(notification_days);
    }
    if let Some(notes) = &patch.notes {
        qb.push(", notes = ").push_bind(notes.clone());
    }
    if let Some(cancellation_date) = patch.cancellation_date {
        qb.push(", cancellation_date = ").push_bind(cancellation_date);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_builds_only_touched_assignments() {
        let patch = SubscriptionPatch {
            amount: Some(12.5),
            notes: Some(None),
            cancellation_date: Some(NaiveDate::from_ymd_opt(2026, 12, 1)),
            ..Default::default()
        };

        let mut qb = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "UPDATE subscriptions SET updated_at = now()",
        );
        push_patch_assignments(&mut qb, &patch);
        qb.push(" WHERE id = ").push_bind(uuid::Uuid::nil());

        assert_eq!(
            qb.sql(),
            "UPDATE subscriptions SET updated_at = now(), amount = $1, notes = $2, \
             cancellation_date = $3 WHERE id = $4"
        );
    }

    #[test]
    fn empty_patch_only_touches_updated_at() {
        let mut qb = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "UPDATE subscriptions SET updated_at = now()",
        );
        push_patch_assignments(&mut qb, &SubscriptionPatch::default());
        assert_eq!(qb.sql(), "UPDATE subscriptions SET updated_at = now()");
    }

    #[test]
    fn unknown_frequency_column_maps_to_other() {
        let now = Utc::now();
        let sub = row_into_subscription((
            uuid::Uuid::nil(),
            "Box".to_string(),
            4.0,
            "biweekly".to_string(),
            "other".to_string(),
            None,
            None,
            None,
            None,
            None,
            now,
            now,
        ));
        assert_eq!(sub.frequency, Frequency::Other("biweekly".to_string()));
    }
}
