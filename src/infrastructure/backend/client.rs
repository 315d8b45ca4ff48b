//! HTTP client for the estimation backend's function app.
//!
//! Every request goes through the shared rate limiter. Calls that are safe to
//! repeat (progress, execution count, downloads) also go through the retry
//! policy; submissions and terminations are sent once.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::rate_limiter::RequestRateLimiter;
use super::retry::RetryPolicy;
use crate::domain::errors::{BackendError, BackendResult};
use crate::domain::models::config::{BackendConfig, Config};
use crate::domain::models::{
    EstimateProgress, JobHandle, NodeRequest, OrchestrationStatus, ProgressReport,
    RawSpecificationRow, SignificanceProgress, StatusType,
};
use crate::domain::ports::OrchestratorBackend;

/// Host the backend uses for its own URLs when running in containers.
const INTERNAL_FUNCTIONS_HOST: &str = "http://functions/";

/// Retries for progress calls.
const PROGRESS_RETRIES: u32 = 3;

/// Retries for execution counts.
const COUNT_RETRIES: u32 = 1;

#[derive(Deserialize)]
struct TotalExecutionsResponse {
    total_executions: u64,
}

#[derive(Deserialize)]
struct DownloadUrlResponse {
    signed_url: String,
}

pub struct HttpBackend {
    http: Client,
    config: BackendConfig,
    rate_limiter: RequestRateLimiter,
    retry: RetryPolicy,
}

impl HttpBackend {
    pub fn new(
        config: BackendConfig,
        rate_limiter: RequestRateLimiter,
        retry: RetryPolicy,
    ) -> BackendResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(4)
            .build()?;
        Ok(Self {
            http,
            config,
            rate_limiter,
            retry,
        })
    }

    pub fn from_config(config: &Config) -> BackendResult<Self> {
        Self::new(
            config.backend.clone(),
            RequestRateLimiter::from(&config.rate_limit),
            RetryPolicy::from(&config.retry),
        )
    }

    /// `{base}/api/{path}` with the function key and extra query pairs.
    fn api_url(&self, path: &str, key: Option<&String>, query: &[(&str, &str)]) -> BackendResult<Url> {
        let base = self.config.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/api/{path}"))
            .map_err(|e| BackendError::InvalidRequest(format!("invalid backend url: {e}")))?;
        let code = key.map(|code| ("code", code.as_str()));
        let pairs: Vec<(&str, &str)> = query.iter().copied().chain(code).collect();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }

    /// Parse a URL the backend handed out, pointing internal hosts at the
    /// configured functions URL.
    fn backend_issued_url(&self, raw: &str) -> BackendResult<Url> {
        let rewritten = rewrite_functions_host(raw, self.config.local_functions_url.as_deref());
        Url::parse(&rewritten)
            .map_err(|e| BackendError::UnexpectedResponse(format!("invalid url '{raw}': {e}")))
    }

    async fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.rate_limiter.acquire().await;
        self.http
            .request(method, url)
            .header("Content-Type", "application/json")
    }

    async fn send(&self, builder: RequestBuilder) -> BackendResult<Response> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout
            } else {
                BackendError::NetworkError(e)
            }
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::from_status(status.as_u16(), error_text(&body)))
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> BackendResult<T> {
        let response = self.send(builder).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl OrchestratorBackend for HttpBackend {
    #[instrument(skip(self, request), fields(session = %request.session_id))]
    async fn execute_node(&self, request: &NodeRequest) -> BackendResult<JobHandle> {
        let url = self.api_url(
            "orchestrators/ExecuteNodeOrchestrator",
            self.config.keys.orchestrators.as_ref(),
            &[],
        )?;
        let builder = self.request(Method::POST, url).await.json(request);
        let handle: JobHandle = self.send_json(builder).await?;
        debug!(instance_id = %handle.id, "node accepted");
        Ok(handle)
    }

    async fn orchestration_status(&self, handle: &JobHandle) -> BackendResult<OrchestrationStatus> {
        let url = self.backend_issued_url(&handle.status_query_get_uri)?;
        let builder = self.request(Method::GET, url).await;
        self.send_json(builder).await
    }

    async fn progress(
        &self,
        session_id: &str,
        instance_id: &str,
        status_type: StatusType,
    ) -> BackendResult<ProgressReport> {
        let key = match status_type {
            StatusType::Estimate => self.config.keys.check_status.as_ref(),
            StatusType::Significance => self.config.keys.check_significance_status.as_ref(),
        };
        let url = self.api_url(
            status_type.path(),
            key,
            &[("session", session_id), ("instance", instance_id)],
        )?;

        let body: Value = self
            .retry
            .with_max_retries(PROGRESS_RETRIES)
            .execute(|| {
                let url = url.clone();
                async move {
                    let builder = self.request(Method::GET, url).await;
                    self.send_json(builder).await
                }
            })
            .await?;

        Ok(match status_type {
            StatusType::Estimate => {
                ProgressReport::Estimate(serde_json::from_value::<EstimateProgress>(body)?)
            }
            StatusType::Significance => {
                ProgressReport::Significance(serde_json::from_value::<SignificanceProgress>(body)?)
            }
        })
    }

    async fn terminate(&self, handle: &JobHandle, reason: &str) -> BackendResult<()> {
        let url = self.backend_issued_url(&handle.terminate_post_uri.replace("{text}", reason))?;
        let builder = self.request(Method::POST, url).await;
        self.send(builder).await?;
        Ok(())
    }

    async fn number_of_executions(&self, request: &NodeRequest) -> BackendResult<u64> {
        let url = self.api_url(
            "getnumberofexecutions",
            self.config.keys.executions_number.as_ref(),
            &[],
        )?;
        let node_data = request.nodes.first().cloned().unwrap_or(Value::Null);
        let body = json!({ "node_data": node_data });

        let response: TotalExecutionsResponse = self
            .retry
            .with_max_retries(COUNT_RETRIES)
            .execute(|| {
                let url = url.clone();
                let body = body.clone();
                async move {
                    let builder = self.request(Method::POST, url).await.json(&body);
                    self.send_json(builder).await
                }
            })
            .await?;
        Ok(response.total_executions)
    }

    async fn download_results(
        &self,
        session_id: &str,
        file_name: &str,
    ) -> BackendResult<Vec<RawSpecificationRow>> {
        let url = self.api_url(
            "getdownloadurl",
            self.config.keys.download_files.as_ref(),
            &[("session_id", session_id), ("file_name", file_name)],
        )?;
        let signed: DownloadUrlResponse = self
            .retry
            .execute(|| {
                let url = url.clone();
                async move {
                    let builder = self.request(Method::GET, url).await;
                    self.send_json(builder).await
                }
            })
            .await?;

        let file_url = self.backend_issued_url(&signed.signed_url)?;
        self.retry
            .execute(|| {
                let url = file_url.clone();
                async move {
                    let builder = self.request(Method::GET, url).await;
                    self.send_json(builder).await
                }
            })
            .await
    }
}

/// Point `http://functions/` URLs at `local`, when configured.
pub fn rewrite_functions_host(url: &str, local: Option<&str>) -> String {
    match local {
        Some(local) if url.starts_with(INTERNAL_FUNCTIONS_HOST) => {
            format!(
                "{}/{}",
                local.trim_end_matches('/'),
                &url[INTERNAL_FUNCTIONS_HOST.len()..]
            )
        }
        _ => url.to_string(),
    }
}

/// Pull a readable message out of an error body.
///
/// Function apps answer with plain text, `{"error": ...}` or `{"message": ...}`.
fn error_text(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => ["error", "message", "detail"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map_or_else(|| body.to_string(), str::to_string),
        Ok(Value::String(text)) => text,
        _ => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_functions_host() {
        assert_eq!(
            rewrite_functions_host(
                "http://functions/runtime/webhooks/durabletask/instances/abc",
                Some("http://localhost:81/")
            ),
            "http://localhost:81/runtime/webhooks/durabletask/instances/abc"
        );
        assert_eq!(
            rewrite_functions_host("https://prod.example/api/x", Some("http://localhost:81")),
            "https://prod.example/api/x"
        );
        assert_eq!(
            rewrite_functions_host("http://functions/a", None),
            "http://functions/a"
        );
    }

    #[test]
    fn test_error_text_prefers_json_fields() {
        assert_eq!(error_text(r#"{"error": "dataset missing"}"#), "dataset missing");
        assert_eq!(error_text(r#"{"message": "bad node"}"#), "bad node");
        assert_eq!(error_text("plain failure"), "plain failure");
        assert_eq!(error_text(r#"{"other": 1}"#), r#"{"other": 1}"#);
    }

    #[test]
    fn test_api_url_appends_code_only_when_configured() {
        let mut config = BackendConfig {
            base_url: "http://backend:81/".to_string(),
            ..Default::default()
        };
        let backend =
            HttpBackend::new(config.clone(), RequestRateLimiter::new(10.0, 10), RetryPolicy::none())
                .unwrap();
        let url = backend
            .api_url("checkinferencestatus", None, &[("session", "s 1"), ("instance", "i")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://backend:81/api/checkinferencestatus?session=s+1&instance=i"
        );

        config.keys.check_status = Some("k".to_string());
        let backend =
            HttpBackend::new(config, RequestRateLimiter::new(10.0, 10), RetryPolicy::none()).unwrap();
        let url = backend
            .api_url("checkinferencestatus", backend.config.keys.check_status.as_ref(), &[])
            .unwrap();
        assert!(url.as_str().ends_with("?code=k"));
    }
}
