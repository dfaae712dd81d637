use crate::config::Settings;
use crate::domain::contract::{SubscriptionFields, SubscriptionPatch};
use crate::domain::subscription::{Subscription, SubscriptionId};
use crate::storage::{Backend, StoreError, SubscriptionStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_RETRIES: u32 = 3;
const MAX_RETRIES: u32 = 10;
const BACKOFF_BASE_MS: u64 = 250;
// 250ms << 5 = 8s between the last attempts at most.
const MAX_BACKOFF_SHIFT: u32 = 5;
const TABLE: &str = "subscriptions";
const LIST_ORDER: &str = "next_billing_date.asc.nullslast";

/// PostgREST client for the hosted `subscriptions` table.
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
    retries: u32,
}

impl SupabaseStore {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_supabase_url()?.to_string();
        let anon_key = settings.require_supabase_anon_key()?.to_string();

        let timeout_secs = std::env::var("SUPABASE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("SUPABASE_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .clamp(1, MAX_RETRIES);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build supabase http client")?;

        Ok(Self::new(http, base_url, anon_key, retries))
    }

    pub fn new(http: reqwest::Client, base_url: String, anon_key: String, retries: u32) -> Self {
        Self {
            http,
            base_url,
            anon_key,
            access_token: None,
            retries,
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{TABLE}", self.base_url.trim_end_matches('/'))
    }

    fn headers(&self, return_representation: bool) -> Result<HeaderMap> {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);

        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(&self.anon_key)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {bearer}"))?,
        );
        if return_representation {
            headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        }
        Ok(headers)
    }

    async fn list_once(&self) -> Result<Vec<Subscription>> {
        let res = self
            .http
            .get(self.table_url())
            .headers(self.headers(false)?)
            .query(&[("select", "*"), ("order", LIST_ORDER)])
            .send()
            .await
            .map_err(|e| transport_error("list", e))?;

        read_rows(res, "list").await
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for SupabaseStore {
    fn backend(&self) -> Backend {
        Backend::Supabase
    }

    fn with_access_token(&self, access_token: &str) -> Arc<dyn SubscriptionStore> {
        Arc::new(Self {
            access_token: Some(access_token.to_string()),
            ..self.clone()
        })
    }

    async fn list(&self) -> Result<Vec<Subscription>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.list_once().await {
                Ok(rows) => {
                    tracing::debug!(rows = rows.len(), attempt, "supabase subscriptions list");
                    return Ok(rows);
                }
                Err(err) => {
                    if attempt >= self.retries || !is_retryable(&err) {
                        return Err(err).context("list subscriptions failed");
                    }
                    let backoff = retry_backoff(attempt);
                    tracing::warn!(attempt, ?backoff, error = %err, "supabase list failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn insert(&self, fields: &SubscriptionFields) -> Result<Subscription> {
        let res = self
            .http
            .post(self.table_url())
            .headers(self.headers(true)?)
            .json(fields)
            .send()
            .await
            .map_err(|e| transport_error("insert", e))?;

        let rows = read_rows(res, "insert")
            .await
            .context("insert subscription failed")?;
        let sub = rows.into_iter().next().ok_or_else(|| {
            anyhow::Error::new(StoreError {
                backend: Backend::Supabase,
                stage: "insert",
                detail: "insert returned no row".to_string(),
                status: None,
            })
        })?;

        tracing::debug!(id = %sub.id, "subscription inserted");
        Ok(sub)
    }

    async fn update(&self, id: SubscriptionId, patch: &SubscriptionPatch) -> Result<Subscription> {
        let body = patch_body(patch, Utc::now())?;

        let res = self
            .http
            .patch(self.table_url())
            .headers(self.headers(true)?)
            .query(&[("id", format!("eq.{id}"))])
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("update", e))?;

        let rows = read_rows(res, "update")
            .await
            .context("update subscription failed")?;
        let Some(sub) = rows.into_iter().next() else {
            return Err(StoreError::not_found(Backend::Supabase, id).into());
        };

        tracing::debug!(%id, "subscription updated");
        Ok(sub)
    }
}

/// PATCH body: only touched columns, plus `updated_at`.
fn patch_body(patch: &SubscriptionPatch, now: DateTime<Utc>) -> Result<Value> {
    let mut body = serde_json::to_value(patch).context("serialize subscription patch failed")?;
    let obj = body
        .as_object_mut()
        .context("subscription patch must serialize to an object")?;
    obj.insert("updated_at".to_string(), serde_json::to_value(now)?);
    Ok(body)
}

async fn read_rows(res: reqwest::Response, stage: &'static str) -> Result<Vec<Subscription>> {
    let status = res.status();
    let text = res
        .text()
        .await
        .map_err(|e| transport_error(stage, e))?;

    if !status.is_success() {
        return Err(StoreError {
            backend: Backend::Supabase,
            stage,
            detail: text,
            status: Some(status.as_u16()),
        }
        .into());
    }

    decode_rows(&text)
}

fn decode_rows(text: &str) -> Result<Vec<Subscription>> {
    serde_json::from_str::<Vec<Subscription>>(text)
        .with_context(|| format!("supabase response is not a subscription array: {text}"))
}

fn transport_error(stage: &'static str, err: reqwest::Error) -> anyhow::Error {
    StoreError {
        backend: Backend::Supabase,
        stage,
        detail: err.to_string(),
        status: err.status().map(|s| s.as_u16()),
    }
    .into()
}

fn retry_backoff(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    Duration::from_millis(BACKOFF_BASE_MS << shift)
}

// Transport failures and 5xx are worth another try; 4xx and decode errors are not.
fn is_retryable(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<StoreError>() {
        Some(e) => e.status.map_or(true, |s| s >= 500),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> SupabaseStore {
        SupabaseStore::new(
            reqwest::Client::new(),
            "https://abc.supabase.co/".to_string(),
            "anon-key".to_string(),
            3,
        )
    }

    #[test]
    fn builds_table_url_without_double_slash() {
        assert_eq!(
            store().table_url(),
            "https://abc.supabase.co/rest/v1/subscriptions"
        );
    }

    #[test]
    fn bearer_falls_back_to_anon_key() {
        let s = store();
        let headers = s.headers(false).unwrap();
        assert_eq!(headers.get("apikey").unwrap(), "anon-key");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer anon-key");
        assert!(headers.get("Prefer").is_none());

        let scoped = SupabaseStore {
            access_token: Some("user-jwt".to_string()),
            ..s
        };
        let headers = scoped.headers(true).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer user-jwt");
        assert_eq!(headers.get("Prefer").unwrap(), "return=representation");
    }

    #[test]
    fn patch_body_adds_updated_at() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let patch = SubscriptionPatch {
            name: Some("Netflix".to_string()),
            next_billing_date: Some(None),
            ..Default::default()
        };
        let body = patch_body(&patch, now).unwrap();
        assert_eq!(
            body,
            json!({
                "name": "Netflix",
                "next_billing_date": null,
                "updated_at": "2026-10-18T12:00:00Z",
            })
        );
    }

    #[test]
    fn decodes_rows_and_rejects_error_payloads() {
        let rows = json!([{
            "id": "7b0f3c38-3c55-4a0e-9d7c-0a4b1f6f8a11",
            "name": "Spotify",
            "amount": 9.99,
            "frequency": "monthly",
            "category": "entertainment",
            "next_billing_date": null,
            "notification_days": null,
            "email_sender": null,
            "notes": null,
            "cancellation_date": null,
            "created_at": "2026-01-02T03:04:05+00:00",
            "updated_at": "2026-01-02T03:04:05+00:00"
        }])
        .to_string();
        let out = decode_rows(&rows).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "Spotify");

        assert!(decode_rows(r#"{"message":"JWT expired"}"#).is_err());
    }

    #[test]
    fn only_transport_and_server_errors_retry() {
        let mk = |status| {
            anyhow::Error::new(StoreError {
                backend: Backend::Supabase,
                stage: "list",
                detail: String::new(),
                status,
            })
        };
        assert!(is_retryable(&mk(None)));
        assert!(is_retryable(&mk(Some(503))));
        assert!(!is_retryable(&mk(Some(401))));
        assert!(!is_retryable(&anyhow::anyhow!("decode failed")));
    }

    #[test]
    fn backoff_doubles_then_levels_off() {
        assert_eq!(retry_backoff(1), Duration::from_millis(250));
        assert_eq!(retry_backoff(2), Duration::from_millis(500));
        assert_eq!(retry_backoff(6), Duration::from_secs(8));
        assert_eq!(retry_backoff(7), Duration::from_secs(8));
        assert_eq!(retry_backoff(u32::MAX), Duration::from_secs(8));
    }

    /// Serves `/rest/v1/subscriptions`, answering request `n` (0-based) with `respond(n)`.
    async fn stub_table(
        respond: fn(usize) -> (StatusCode, &'static str),
    ) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = axum::Router::new().route(
            "/rest/v1/subscriptions",
            axum::routing::get(move || {
                let counter = Arc::clone(&counter);
                async move { respond(counter.fetch_add(1, Ordering::SeqCst)) }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), hits)
    }

    fn store_at(base_url: String, retries: u32) -> SupabaseStore {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        SupabaseStore::new(http, base_url, "anon-key".to_string(), retries)
    }

    #[tokio::test]
    async fn list_retries_server_errors_up_to_the_limit() {
        let (base, hits) =
            stub_table(|_| (StatusCode::SERVICE_UNAVAILABLE, r#"{"message":"down"}"#)).await;

        let err = store_at(base, 3).list().await.unwrap_err();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        let store_err = err.downcast_ref::<StoreError>().unwrap();
        assert_eq!(store_err.status, Some(503));
    }

    #[tokio::test]
    async fn list_does_not_retry_client_errors() {
        let (base, hits) =
            stub_table(|_| (StatusCode::UNAUTHORIZED, r#"{"message":"JWT expired"}"#)).await;

        let err = store_at(base, 3).list().await.unwrap_err();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(err.downcast_ref::<StoreError>().unwrap().status, Some(401));
    }

    #[tokio::test]
    async fn list_recovers_after_a_server_error() {
        let (base, hits) = stub_table(|n| match n {
            0 => (StatusCode::BAD_GATEWAY, "upstream"),
            _ => (StatusCode::OK, "[]"),
        })
        .await;

        let store = store_at(base, 3);
        assert_eq!(store.backend(), Backend::Supabase);
        let rows = store.list().await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
