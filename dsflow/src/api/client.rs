//! HTTP client for the metadata API with transport-level retry.

use super::error::ApiError;
use super::models::{Dataset, DatasetAssociation, DatasetFile, DatasetState, Metric};
use crate::cancellation::CancellationToken;
use crate::config::{ApiConfig, HttpRetryConfig};
use crate::pipeline::BackoffPolicy;
use crate::utils::duration_ms;
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Statuses whose `Retry-After` header replaces the computed backoff.
const RETRY_AFTER_STATUSES: [StatusCode; 2] =
    [StatusCode::TOO_MANY_REQUESTS, StatusCode::SERVICE_UNAVAILABLE];

/// Client for the metadata API.
///
/// Every request carries the bearer token and is retried below the caller:
/// connection failures and timeouts for any method, and the statuses listed
/// in [`HttpRetryConfig::status_forcelist`]. Callers only see the final
/// outcome. Clones share one connection pool.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    auth_token: Arc<str>,
    retry: Arc<HttpRetryConfig>,
    backoff: BackoffPolicy,
    cancellation: Option<Arc<CancellationToken>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("retry", &self.retry)
            .field("cancellation", &self.cancellation)
            .finish_non_exhaustive()
    }
}

/// Request payload, kept so each attempt can rebuild the request.
enum Payload<'a> {
    Empty,
    Json(Value),
    Report { file_name: &'a str, bytes: &'a [u8] },
}

impl Payload<'_> {
    fn attach(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Empty => request,
            Self::Json(body) => request.json(body),
            Self::Report { file_name, bytes } => {
                let part = reqwest::multipart::Part::bytes(bytes.to_vec())
                    .file_name((*file_name).to_string());
                request.multipart(reqwest::multipart::Form::new().part("report", part))
            }
        }
    }
}

impl ApiClient {
    /// Builds a client from configuration.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let base_url = config.parsed_base_url()?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self {
            http,
            base_url,
            auth_token: Arc::from(config.auth_token.as_str()),
            backoff: config.retry.backoff(),
            retry: Arc::new(config.retry.clone()),
            cancellation: None,
        })
    }

    /// Makes backoff waits and in-flight requests cancellable by `token`.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns the base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET datasets`, optionally filtered by type and name.
    pub async fn list_datasets(
        &self,
        dataset_type: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<Dataset>, ApiError> {
        let mut query = Vec::new();
        if let Some(dataset_type) = dataset_type {
            query.push(("type", dataset_type.to_string()));
        }
        if let Some(name) = name {
            query.push(("name", name.to_string()));
        }
        let response = self
            .send(Method::GET, "datasets", &query, &Payload::Empty)
            .await?;
        decode(response).await
    }

    /// `GET datasets/{id}`.
    pub async fn get_dataset(
        &self,
        dataset_id: &str,
        include_files: bool,
    ) -> Result<Dataset, ApiError> {
        let query = [("files", include_files.to_string())];
        let path = format!("datasets/{dataset_id}");
        let response = self.send(Method::GET, &path, &query, &Payload::Empty).await?;
        decode(response).await
    }

    /// `POST datasets`.
    pub async fn create_dataset(&self, dataset: &Dataset) -> Result<Dataset, ApiError> {
        let body = to_json(dataset)?;
        let response = self
            .send(Method::POST, "datasets", &[], &Payload::Json(body))
            .await?;
        decode(response).await
    }

    /// `PATCH datasets/{id}`. Only the fields present in `update` change.
    pub async fn update_dataset(&self, dataset_id: &str, update: &Dataset) -> Result<Dataset, ApiError> {
        let body = to_json(update)?;
        let path = format!("datasets/{dataset_id}");
        let response = self
            .send(Method::PATCH, &path, &[], &Payload::Json(body))
            .await?;
        decode(response).await
    }

    /// `POST datasets/{id}/files`.
    pub async fn add_files(&self, dataset_id: &str, files: &[DatasetFile]) -> Result<(), ApiError> {
        let body = to_json(files)?;
        let path = format!("datasets/{dataset_id}/files");
        self.send(Method::POST, &path, &[], &Payload::Json(body))
            .await?;
        Ok(())
    }

    /// `PUT datasets/{id}/report` with the file as multipart field `report`.
    pub async fn upload_report(&self, dataset_id: &str, report: &Path) -> Result<(), ApiError> {
        let bytes = tokio::fs::read(report).await.map_err(|source| ApiError::Io {
            path: report.display().to_string(),
            source,
        })?;
        let file_name = report
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_string());
        let path = format!("datasets/{dataset_id}/report");
        let payload = Payload::Report {
            file_name: &file_name,
            bytes: &bytes,
        };
        self.send(Method::PUT, &path, &[], &payload).await?;
        Ok(())
    }

    /// `POST metrics`.
    pub async fn send_metrics(&self, metrics: &[Metric]) -> Result<(), ApiError> {
        let body = to_json(metrics)?;
        self.send(Method::POST, "metrics", &[], &Payload::Json(body))
            .await?;
        Ok(())
    }

    /// `POST datasets/associations`.
    pub async fn add_associations(&self, associations: &[DatasetAssociation]) -> Result<(), ApiError> {
        let body = to_json(associations)?;
        self.send(Method::POST, "datasets/associations", &[], &Payload::Json(body))
            .await?;
        Ok(())
    }

    /// `POST datasets/{id}/states`.
    pub async fn add_state(
        &self,
        dataset_id: &str,
        state: &str,
        metadata: Option<Value>,
    ) -> Result<(), ApiError> {
        let body = to_json(&DatasetState {
            state: state.to_string(),
            metadata,
        })?;
        let path = format!("datasets/{dataset_id}/states");
        self.send(Method::POST, &path, &[], &Payload::Json(body))
            .await?;
        Ok(())
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ApiError> {
        let mut url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidUrl {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        payload: &Payload<'_>,
    ) -> Result<Response, ApiError> {
        let url = self.url(path, query)?;
        let mut retries = 0u32;

        loop {
            let request = payload.attach(
                self.http
                    .request(method.clone(), url.clone())
                    .bearer_auth(&*self.auth_token),
            );
            let Some(outcome) = self.until_cancelled(request.send()).await else {
                return Err(cancelled(&url));
            };

            let (delay, reason) = match outcome {
                Ok(response) if response.status().is_success() => {
                    debug!(%method, url = %url, status = response.status().as_u16(), "API request succeeded");
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status();
                    if retries >= self.retry.total_retries
                        || !self.retry.status_forcelist.contains(&status.as_u16())
                    {
                        let body = response.text().await.unwrap_or_default();
                        return Err(ApiError::Status {
                            status: status.as_u16(),
                            url: url.to_string(),
                            body,
                        });
                    }
                    let delay = retry_after(&response)
                        .map_or_else(|| self.backoff.delay(retries + 1), |d| d.min(self.backoff.max_delay));
                    (delay, format!("status {}", status.as_u16()))
                }
                Err(err) => {
                    if retries >= self.retry.total_retries || !is_transient(&err) {
                        return Err(ApiError::Transport {
                            url: url.to_string(),
                            attempts: retries + 1,
                            source: err,
                        });
                    }
                    (self.backoff.delay(retries + 1), err.to_string())
                }
            };

            retries += 1;
            warn!(
                %method,
                url = %url,
                retry = retries,
                max_retries = self.retry.total_retries,
                delay_ms = duration_ms(delay),
                reason = %reason,
                "retrying API request"
            );
            if !self.sleep(delay).await {
                return Err(cancelled(&url));
            }
        }
    }

    async fn until_cancelled<F: std::future::Future>(&self, future: F) -> Option<F::Output> {
        match &self.cancellation {
            Some(token) => token.run_until_cancelled(future).await,
            None => Some(future.await),
        }
    }

    async fn sleep(&self, delay: Duration) -> bool {
        match &self.cancellation {
            Some(token) => token.sleep(delay).await,
            None => {
                tokio::time::sleep(delay).await;
                true
            }
        }
    }
}

fn cancelled(url: &Url) -> ApiError {
    ApiError::Cancelled {
        url: url.to_string(),
    }
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request()
}

/// Integer-seconds `Retry-After` on statuses that define it.
fn retry_after(response: &Response) -> Option<Duration> {
    if !RETRY_AFTER_STATUSES.contains(&response.status()) {
        return None;
    }
    let value = response.headers().get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(ApiError::Encode)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let url = response.url().to_string();
    let bytes = response.bytes().await.map_err(|source| ApiError::Transport {
        url: url.clone(),
        attempts: 1,
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode { url, source })
}
