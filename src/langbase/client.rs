use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::types::{CreatePipeRequest, CreatePipeResponse, PipeRequest, PipeResponse};
use crate::config::{LangbaseConfig, RequestConfig};
use crate::error::{LangbaseError, LangbaseResult};
use crate::retry::RetryPolicy;

/// Client for interacting with Langbase Pipes API
#[derive(Clone)]
pub struct LangbaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
    retry: RetryPolicy,
}

impl LangbaseClient {
    /// Create a new Langbase client
    pub fn new(config: &LangbaseConfig, request_config: RequestConfig) -> LangbaseResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LangbaseError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_ms: request_config.timeout_ms,
            retry: RetryPolicy::from(&request_config),
        })
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Call a Langbase pipe, retrying transient failures per the retry policy.
    ///
    /// Exhausted transient failures come back as [`LangbaseError::Unavailable`]
    /// carrying the number of attempts; permanent failures are returned as-is
    /// after the first attempt.
    pub async fn call_pipe(&self, request: PipeRequest) -> LangbaseResult<PipeResponse> {
        let url = format!("{}/v1/pipes/run", self.base_url);
        let pipe_name = request.name.as_str();

        let result = self
            .retry
            .run(
                |attempt| {
                    let url = &url;
                    let request = &request;
                    async move {
                        let start = Instant::now();
                        let outcome = self.execute_request(url, request).await;
                        let latency = start.elapsed();
                        match &outcome {
                            Ok(response) => info!(
                                pipe = %pipe_name,
                                attempt,
                                latency_ms = latency.as_millis(),
                                total_tokens = ?response.total_tokens(),
                                "Langbase pipe call succeeded"
                            ),
                            Err(e) => error!(
                                pipe = %pipe_name,
                                attempt,
                                error = %e,
                                latency_ms = latency.as_millis(),
                                "Langbase pipe call failed"
                            ),
                        }
                        outcome
                    }
                },
                LangbaseError::is_transient,
            )
            .await;

        result.map_err(|exhausted| {
            if exhausted.transient {
                LangbaseError::Unavailable {
                    message: exhausted.error.to_string(),
                    retries: exhausted.attempts,
                }
            } else {
                exhausted.error
            }
        })
    }

    /// Execute a single request (internal)
    async fn execute_request(
        &self,
        url: &str,
        request: &PipeRequest,
    ) -> LangbaseResult<PipeResponse> {
        debug!(
            pipe = %request.name,
            messages = request.messages.len(),
            "Calling Langbase pipe"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LangbaseError::Timeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    LangbaseError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LangbaseError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json::<PipeResponse>()
            .await
            .map_err(|e| LangbaseError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a new pipe
    pub async fn create_pipe(
        &self,
        request: CreatePipeRequest,
    ) -> LangbaseResult<CreatePipeResponse> {
        let url = format!("{}/v1/pipes", self.base_url);

        info!(pipe = %request.name, "Creating Langbase pipe");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(LangbaseError::Http)?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LangbaseError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json::<CreatePipeResponse>()
            .await
            .map_err(|e| LangbaseError::InvalidResponse {
                message: format!("Failed to parse create pipe response: {}", e),
            })
    }

    /// Upsert a JSON-mode pipe with the given system prompt. A 409 from the
    /// API means the pipe already exists and is accepted.
    pub async fn ensure_pipe(
        &self,
        pipe_name: &str,
        description: &str,
        model: &str,
        system_prompt: &str,
    ) -> LangbaseResult<()> {
        let request = CreatePipeRequest::new(pipe_name)
            .with_description(description)
            .with_model(model)
            .with_upsert(true)
            .with_json_output(true)
            .with_temperature(0.7)
            .with_max_tokens(2000)
            .with_system_prompt(system_prompt);

        match self.create_pipe(request).await {
            Ok(created) => {
                info!(pipe = %created.name, url = %created.url, "Pipe ready");
                Ok(())
            }
            Err(LangbaseError::Api { status: 409, .. }) => {
                info!(pipe = %pipe_name, "Pipe already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
