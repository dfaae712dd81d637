pub mod postgres;
pub mod supabase;

use crate::config::Settings;
use crate::domain::contract::{SubscriptionFields, SubscriptionPatch};
use crate::domain::subscription::{Subscription, SubscriptionId};
use anyhow::Context;
use std::fmt;
use std::sync::Arc;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Supabase,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Postgres => "postgres",
            Backend::Supabase => "supabase",
        }
    }
}

/// Failure reported by a record store backend. Wrapped in `anyhow::Error`; callers that need to
/// tell a missing row from an outage downcast to this.
#[derive(Debug, Clone)]
pub struct StoreError {
    pub backend: Backend,
    pub stage: &'static str,
    pub detail: String,
    pub status: Option<u16>,
}

impl StoreError {
    pub const NOT_FOUND: &'static str = "not_found";

    pub fn not_found(backend: Backend, id: SubscriptionId) -> Self {
        Self {
            backend,
            stage: Self::NOT_FOUND,
            detail: format!("no subscription with id={id}"),
            status: None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.stage == Self::NOT_FOUND
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "store error (backend={}, stage={}): {}",
            self.backend.as_str(),
            self.stage,
            self.detail
        )?;
        if let Some(status) = self.status {
            write!(f, " [status={status}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {}

/// True when `err` carries a `StoreError` for a missing row.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<StoreError>()
        .is_some_and(StoreError::is_not_found)
}

/// The hosted subscriptions table. There is intentionally no delete.
#[async_trait::async_trait]
pub trait SubscriptionStore: Send + Sync {
    fn backend(&self) -> Backend;

    /// Same store acting for a signed-in user. Backends without per-user auth ignore the token.
    fn with_access_token(&self, access_token: &str) -> Arc<dyn SubscriptionStore>;

    /// All rows, `next_billing_date` ascending with undated rows last.
    async fn list(&self) -> anyhow::Result<Vec<Subscription>>;

    async fn insert(&self, fields: &SubscriptionFields) -> anyhow::Result<Subscription>;

    async fn update(
        &self,
        id: SubscriptionId,
        patch: &SubscriptionPatch,
    ) -> anyhow::Result<Subscription>;
}

/// Postgres when `DATABASE_URL` is set, otherwise the Supabase REST endpoint.
pub async fn connect_from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn SubscriptionStore>> {
    let store: Arc<dyn SubscriptionStore> = match settings.require_database_url() {
        Ok(db_url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .context("connect DATABASE_URL failed")?;
            migrate(&pool).await?;
            Arc::new(postgres::PgSubscriptionStore::new(pool))
        }
        Err(_) => Arc::new(supabase::SupabaseStore::from_settings(settings).context(
            "no record store configured (set DATABASE_URL or SUPABASE_URL/SUPABASE_ANON_KEY)",
        )?),
    };

    tracing::info!(backend = store.backend().as_str(), "record store ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_survives_context_wrapping() {
        let id = uuid::Uuid::new_v4();
        let err = anyhow::Error::new(StoreError::not_found(Backend::Postgres, id))
            .context("update subscriptions failed");
        assert!(is_not_found(&err));

        let other = anyhow::Error::new(StoreError {
            backend: Backend::Supabase,
            stage: "http",
            detail: "status=500".to_string(),
            status: Some(500),
        });
        assert!(!is_not_found(&other));
        assert!(other.to_string().contains("[status=500]"));
        assert!(other.to_string().starts_with("store error (backend=supabase, stage=http)"));
    }
}
