//! HTTP client for the external cron daemon's RPC surface.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use serde_json::json;

use crate::models::cron::{CronJob, CronJobPatch, CronJobSpec, CronRunEntry};
use crate::{AppError, Result};

use super::{CronService, RemoveOutcome};

/// Cron daemon client over plain JSON-per-endpoint HTTP.
pub struct HttpCronService {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    jobs: Vec<CronJob>,
}

#[derive(Debug, Deserialize)]
struct RunsResponse {
    #[serde(default)]
    entries: Vec<CronRunEntry>,
}

impl HttpCronService {
    /// Create a client for the daemon at `base_url`, optionally with a
    /// bearer token.
    #[must_use]
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token,
            http: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(ref token) = self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .request(reqwest::Method::POST, path)
            .json(&body)
            .send()
            .await
            .map_err(|err| AppError::Cron(format!("cron rpc {path} failed: {err}")))?;
        Ok(response)
    }
}

fn check_status(path: &str, response: &reqwest::Response) -> Result<()> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(AppError::Cron(format!(
            "cron rpc {path} returned {}",
            response.status()
        )))
    }
}

impl CronService for HttpCronService {
    fn add(&self, spec: CronJobSpec) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move {
            let response = self.post_json("/cron/add", json!(spec)).await?;
            check_status("/cron/add", &response)?;
            let body: AddResponse = response
                .json()
                .await
                .map_err(|err| AppError::Cron(format!("cron add response invalid: {err}")))?;
            Ok(body.id)
        })
    }

    fn update(
        &self,
        id: &str,
        patch: CronJobPatch,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let id = id.to_owned();
        Box::pin(async move {
            let response = self
                .post_json("/cron/update", json!({ "id": id, "patch": patch }))
                .await?;
            check_status("/cron/update", &response)
        })
    }

    fn remove(&self, id: &str) -> Pin<Box<dyn Future<Output = Result<RemoveOutcome>> + Send + '_>> {
        let id = id.to_owned();
        Box::pin(async move {
            let response = self.post_json("/cron/remove", json!({ "id": id })).await?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(RemoveOutcome::NotFound);
            }
            check_status("/cron/remove", &response)?;
            Ok(RemoveOutcome::Removed)
        })
    }

    fn list(
        &self,
        include_disabled: bool,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CronJob>>> + Send + '_>> {
        Box::pin(async move {
            let response = self
                .request(reqwest::Method::GET, "/cron/list")
                .query(&[("includeDisabled", include_disabled)])
                .send()
                .await
                .map_err(|err| AppError::Cron(format!("cron rpc /cron/list failed: {err}")))?;
            check_status("/cron/list", &response)?;
            let body: ListResponse = response
                .json()
                .await
                .map_err(|err| AppError::Cron(format!("cron list response invalid: {err}")))?;
            Ok(body.jobs)
        })
    }

    fn runs(
        &self,
        id: &str,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CronRunEntry>>> + Send + '_>> {
        let id = id.to_owned();
        Box::pin(async move {
            let response = self
                .request(reqwest::Method::GET, "/cron/runs")
                .query(&[("id", id.as_str())])
                .query(&[("limit", limit)])
                .send()
                .await
                .map_err(|err| AppError::Cron(format!("cron rpc /cron/runs failed: {err}")))?;
            check_status("/cron/runs", &response)?;
            let body: RunsResponse = response
                .json()
                .await
                .map_err(|err| AppError::Cron(format!("cron runs response invalid: {err}")))?;
            Ok(body.entries)
        })
    }
}
