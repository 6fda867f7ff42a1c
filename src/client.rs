use std::pin::Pin;
use std::time::Duration;

use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::sse::{process_sse, tokens};
use crate::types::{ChatCompletionRequest, ChatMessage};

/// Chat completions endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Model requested when none is configured.
pub const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";

/// Origin marker sent as `HTTP-Referer` when none is configured.
pub const DEFAULT_REFERER: &str = "http://localhost";

/// Value shipped in sample environment files in place of a real key.
pub const PLACEHOLDER_API_KEY: &str = "-------------------";

/// A stream of content tokens from one completion.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Something that can turn a message history into a stream of reply tokens.
///
/// [`Completions`] talks to the HTTP endpoint; tests substitute scripted backends.
#[async_trait::async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Returns false when no usable API credential is configured.
    fn credential_configured(&self) -> bool;

    /// Request a streamed completion for `messages`, oldest first.
    ///
    /// Errors returned here (or yielded by the stream) are request failures: non-success
    /// statuses, transport failures, and body read failures.
    async fn stream_completion(&self, messages: Vec<ChatMessage>) -> Result<TokenStream>;
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct Completions {
    api_key: Option<String>,
    client: ReqwestClient,
    endpoint: String,
    model: String,
    referer: String,
    timeout: Option<Duration>,
}

impl Completions {
    /// Create a new client against the default endpoint and model.
    ///
    /// A missing key is not an error here: the controller reports it to the user without making
    /// a request.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None, None, None)
    }

    /// Create a new client with custom settings.
    ///
    /// `timeout` bounds the whole request including the streamed body; `None` leaves it
    /// unbounded.
    pub fn with_options(
        api_key: Option<String>,
        endpoint: Option<String>,
        model: Option<String>,
        referer: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = ReqwestClient::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {e}"),
                Some(Box::new(e)),
            )
        })?;

        Ok(Self {
            api_key,
            client,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            referer: referer.unwrap_or_else(|| DEFAULT_REFERER.to_string()),
            timeout,
        })
    }

    /// The endpoint requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The model named in every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The usable API key, if any.
    fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && *key != PLACEHOLDER_API_KEY)
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self, api_key: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| Error::authentication("API key contains invalid header characters"))?;
        headers.insert(header::AUTHORIZATION, bearer);
        let referer = HeaderValue::from_str(&self.referer).map_err(|_| {
            Error::validation(
                "referer contains invalid header characters",
                Some("referer".to_string()),
            )
        })?;
        headers.insert("http-referer", referer);
        Ok(headers)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<String>,
            message: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);
        let error_type = detail.as_ref().and_then(|e| e.error_type.clone());
        let error_message = detail
            .and_then(|e| e.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if error_body.is_empty() {
                    format!("API error: {status_code}")
                } else {
                    error_body.clone()
                }
            });

        // Map HTTP status code to appropriate error type
        match status_code {
            400 => Error::bad_request(error_message, None),
            401 => Error::authentication(error_message),
            403 => Error::permission(error_message),
            404 => Error::not_found(error_message, None, None),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_type, error_message),
        }
    }

    /// Post a streaming request and return the successful response.
    async fn post(&self, request: &ChatCompletionRequest) -> Result<Response> {
        let api_key = self
            .api_key()
            .ok_or_else(|| Error::authentication("API key not configured"))?;
        let headers = self.default_headers(api_key)?;

        CLIENT_REQUESTS.click();
        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {e}"),
                        self.timeout.map(|t| t.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
                }
            })?;

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl CompletionBackend for Completions {
    fn credential_configured(&self) -> bool {
        self.api_key().is_some()
    }

    async fn stream_completion(&self, messages: Vec<ChatMessage>) -> Result<TokenStream> {
        let request = ChatCompletionRequest::streaming(self.model.clone(), messages);
        let response = self.post(&request).await?;
        let lines = process_sse(response.bytes_stream());
        Ok(Box::pin(tokens(lines)))
    }
}
