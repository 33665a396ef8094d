//! Supabase-style REST row store.
//!
//! Talks to a PostgREST `tasks` table with a service-role key. Updates
//! are read-modify-write: the current row is fetched, the patch is
//! sanitized against it (see [`crate::patch`]), and only the surviving
//! fields are sent. Concurrent writers race; the guards make the races
//! harmless rather than impossible.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use vidgen_models::{Task, TaskId, TaskPatch, TaskStatus};

use crate::error::{StoreError, StoreResult};
use crate::patch;
use crate::store::{StatusCounts, TaskStore};

/// REST store configuration.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Base URL of the Supabase project (no trailing slash)
    pub base_url: String,
    /// Service-role API key
    pub service_key: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl RestConfig {
    /// Read config from the environment. Returns `None` when the
    /// credentials are absent, which selects the in-memory backend.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SUPABASE_URL").ok()?;
        let service_key = std::env::var("SUPABASE_SERVICE_KEY").ok()?;
        if base_url.is_empty() || service_key.is_empty() {
            return None;
        }

        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(
                std::env::var("STORE_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
        })
    }
}

/// REST task store client.
pub struct RestTaskStore {
    http: Client,
    config: RestConfig,
    table_url: String,
}

impl RestTaskStore {
    /// Create a new REST task store.
    pub fn new(config: RestConfig) -> StoreResult<Self> {
        let mut headers = header::HeaderMap::new();
        let key = header::HeaderValue::from_str(&config.service_key)
            .map_err(|_| StoreError::request_failed("Invalid service key"))?;
        headers.insert("apikey", key.clone());
        let mut bearer = header::HeaderValue::from_str(&format!("Bearer {}", config.service_key))
            .map_err(|_| StoreError::request_failed("Invalid service key"))?;
        bearer.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, bearer);

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .default_headers(headers)
            .user_agent(concat!("vidgen-store/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(StoreError::Network)?;

        let table_url = format!("{}/rest/v1/tasks", config.base_url);

        Ok(Self {
            http,
            config,
            table_url,
        })
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    async fn check_status(response: reqwest::Response) -> StoreResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(StoreError::not_found(body)),
            StatusCode::CONFLICT => Err(StoreError::AlreadyExists(body)),
            StatusCode::TOO_MANY_REQUESTS => Err(StoreError::RateLimited(1_000)),
            _ => Err(StoreError::request_failed(format!("{status}: {body}"))),
        }
    }

    /// Fetch rows matching a PostgREST query string.
    async fn select(&self, query: &[(&str, String)]) -> StoreResult<Vec<Task>> {
        let response = self.http.get(&self.table_url).query(query).send().await?;
        let response = Self::check_status(response).await?;
        let rows: Vec<Task> = response.json().await?;
        Ok(rows)
    }
}

#[derive(Debug, Deserialize)]
struct StatusRow {
    status: TaskStatus,
}

#[async_trait]
impl TaskStore for RestTaskStore {
    fn backend(&self) -> &'static str {
        "rest"
    }

    async fn create(&self, task: Task) -> StoreResult<Task> {
        let response = self
            .http
            .post(&self.table_url)
            .header("Prefer", "return=representation")
            .json(&task)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let mut rows: Vec<Task> = response.json().await?;
        let created = rows
            .pop()
            .ok_or_else(|| StoreError::InvalidResponse("insert returned no row".to_string()))?;
        debug!(task_id = %created.id, "Created task row");
        Ok(created)
    }

    async fn get(&self, id: &TaskId) -> StoreResult<Option<Task>> {
        let rows = self
            .select(&[
                ("id", format!("eq.{id}")),
                ("select", "*".to_string()),
                ("limit", "1".to_string()),
            ])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn update(&self, id: &TaskId, update: TaskPatch) -> StoreResult<Task> {
        let current = self
            .get(id)
            .await?
            .ok_or_else(|| StoreError::not_found(id.to_string()))?;

        let sanitized = patch::sanitize(&current, update);
        if sanitized.is_empty() {
            return Ok(current);
        }

        // Derive updated_at/duration the same way the guards do locally,
        // then send only the surviving fields.
        let applied = patch::apply(&current, sanitized.clone());
        let mut body = serde_json::to_value(&sanitized)?;
        if let Some(obj) = body.as_object_mut() {
            obj.insert(
                "updated_at".to_string(),
                serde_json::to_value(applied.updated_at)?,
            );
            if applied.duration_seconds != current.duration_seconds {
                obj.insert(
                    "duration_seconds".to_string(),
                    serde_json::to_value(applied.duration_seconds)?,
                );
            }
        }

        let response = self
            .http
            .patch(&self.table_url)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let mut rows: Vec<Task> = response.json().await?;
        rows.pop()
            .ok_or_else(|| StoreError::not_found(id.to_string()))
    }

    async fn list(
        &self,
        owner_id: &str,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> StoreResult<Vec<Task>> {
        let mut query = vec![
            ("owner_id", format!("eq.{owner_id}")),
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(status) = status {
            query.push(("status", format!("eq.{status}")));
        }
        self.select(&query).await
    }

    async fn list_by_status(&self, status: TaskStatus, limit: usize) -> StoreResult<Vec<Task>> {
        self.select(&[
            ("status", format!("eq.{status}")),
            ("select", "*".to_string()),
            ("order", "created_at.asc".to_string()),
            ("limit", limit.to_string()),
        ])
        .await
    }

    async fn count_by_status(
        &self,
        owner_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> StoreResult<StatusCounts> {
        let mut query = vec![
            ("select", "status".to_string()),
            ("created_at", format!("gte.{}", since.to_rfc3339())),
        ];
        if let Some(owner) = owner_id {
            query.push(("owner_id", format!("eq.{owner}")));
        }

        let response = self.http.get(&self.table_url).query(&query).send().await?;
        let response = Self::check_status(response).await?;
        let rows: Vec<StatusRow> = response.json().await?;

        let mut counts = StatusCounts::new();
        for row in rows {
            *counts.entry(row.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn delete_older_than(&self, age: chrono::Duration) -> StoreResult<u64> {
        let cutoff = Utc::now() - age;
        let response = self
            .http
            .delete(&self.table_url)
            .query(&[("created_at", format!("lt.{}", cutoff.to_rfc3339()))])
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let rows: Vec<serde_json::Value> = response.json().await?;
        Ok(rows.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_requires_both_credentials() {
        // Serialize env access within this test.
        std::env::remove_var("SUPABASE_URL");
        std::env::remove_var("SUPABASE_SERVICE_KEY");
        assert!(RestConfig::from_env().is_none());

        std::env::set_var("SUPABASE_URL", "https://example.supabase.co/");
        assert!(RestConfig::from_env().is_none());

        std::env::set_var("SUPABASE_SERVICE_KEY", "service-key");
        let config = RestConfig::from_env().expect("config present");
        assert_eq!(config.base_url, "https://example.supabase.co");

        std::env::remove_var("SUPABASE_URL");
        std::env::remove_var("SUPABASE_SERVICE_KEY");
    }
}
