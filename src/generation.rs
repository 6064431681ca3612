//! Client for the hosted text-generation endpoint.
//!
//! [`GenerationClient::generate`] posts a prompt to
//! `{endpoint}/{model}` and returns the generated text. Hosted inference
//! endpoints answer `503` while a cold model loads and drop connections
//! under load, so the client retries those two cases under a
//! [`RetryPolicy`]. Every other non-200 status fails straight away.
//!
//! The HTTP call sits behind the [`Transport`] trait. Production code uses
//! [`HttpTransport`] (reqwest); tests substitute a scripted transport.
//!
//! # Request
//!
//! ```text
//! POST {endpoint}/{model}
//! Authorization: Bearer <token>
//!
//! {"inputs": "<prompt>",
//!  "parameters": {"max_new_tokens": 1024, "temperature": 0.2,
//!                 "return_full_text": false}}
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;

/// Raw HTTP outcome handed back by a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// A request that produced no HTTP response.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// Connection refused, reset, DNS failure.
    Connect(String),
    Timeout,
    /// Anything else (request construction, body read).
    Other(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Connect(e) => write!(f, "connection failed: {}", e),
            TransportError::Timeout => write!(f, "request timed out"),
            TransportError::Other(e) => write!(f, "{}", e),
        }
    }
}

/// Posts a JSON body with a bearer token.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        token: &str,
        body: &Value,
        timeout: Duration,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

/// reqwest-backed [`Transport`].
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        token: &str,
        body: &Value,
        timeout: Duration,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_reqwest_error)?;
        Ok(TransportResponse { status, body })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() || e.is_request() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

/// When and how long to wait between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Pause after a `503` while the model warms up.
    pub warmup_delay: Duration,
    /// Pause after a connection failure or timeout.
    pub connect_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            warmup_delay: Duration::from_secs(15),
            connect_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            warmup_delay: Duration::from_secs(config.warmup_delay_secs),
            connect_backoff: Duration::from_secs(config.connect_backoff_secs),
        }
    }
}

/// Why generation produced no text.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationError {
    /// None of the token variables is set. Raised before any network call.
    MissingToken { vars: Vec<String> },
    /// Non-retryable HTTP status.
    Status { status: u16, body: String },
    /// 200 response whose body is not JSON.
    InvalidResponse(String),
    /// Non-retryable transport failure.
    Transport(String),
    /// Every attempt hit a retryable failure.
    Exhausted { attempts: u32 },
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationError::MissingToken { vars } => write!(
                f,
                "Hugging Face API token missing (expected one of {})",
                vars.join(", ")
            ),
            GenerationError::Status { status, body } => {
                write!(f, "Hugging Face API Error: {}", status)?;
                if !body.is_empty() {
                    write!(f, " - {}", truncate(body, 200))?;
                }
                Ok(())
            }
            GenerationError::InvalidResponse(e) => {
                write!(f, "Invalid response from generation endpoint: {}", e)
            }
            GenerationError::Transport(e) => write!(f, "Generation request failed: {}", e),
            GenerationError::Exhausted { attempts } => write!(
                f,
                "Failed to get response from Hugging Face API after {} attempts.",
                attempts
            ),
        }
    }
}

impl std::error::Error for GenerationError {}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Text-generation client. Cheap to share behind an `Arc`.
pub struct GenerationClient {
    transport: Box<dyn Transport>,
    endpoint: String,
    model: String,
    token: Option<String>,
    token_vars: Vec<String>,
    max_new_tokens: u32,
    temperature: f32,
    timeout: Duration,
    policy: RetryPolicy,
}

impl GenerationClient {
    /// Builds a client from config, resolving the token from the
    /// environment now. A missing token is only reported by
    /// [`generate`](Self::generate).
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let transport = HttpTransport::new()?;
        Ok(Self::new(config, Box::new(transport), config.resolve_token()))
    }

    pub fn new(
        config: &GenerationConfig,
        transport: Box<dyn Transport>,
        token: Option<String>,
    ) -> Self {
        Self {
            transport,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            token,
            token_vars: config.token_env.clone(),
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
            policy: RetryPolicy::from_config(config),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generates a completion for `prompt`.
    pub async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| GenerationError::MissingToken {
                vars: self.token_vars.clone(),
            })?;

        let url = format!("{}/{}", self.endpoint, self.model);
        let body = json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": self.max_new_tokens,
                "temperature": self.temperature,
                "return_full_text": false,
            }
        });

        let attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            let is_last = attempt == attempts;
            debug!(attempt, model = %self.model, "generation request");

            let pause = match self
                .transport
                .post_json(&url, token, &body, self.timeout)
                .await
            {
                Ok(resp) if resp.status == 200 => return parse_generated_text(&resp.body),
                Ok(resp) if resp.status == 503 => {
                    info!(attempt, "model loading on endpoint, waiting before retry");
                    self.policy.warmup_delay
                }
                Ok(resp) => {
                    warn!(status = resp.status, "generation endpoint error");
                    return Err(GenerationError::Status {
                        status: resp.status,
                        body: resp.body,
                    });
                }
                Err(e @ (TransportError::Connect(_) | TransportError::Timeout)) => {
                    warn!(attempt, error = %e, "generation connection error, retrying");
                    self.policy.connect_backoff
                }
                Err(TransportError::Other(e)) => return Err(GenerationError::Transport(e)),
            };

            if !is_last && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        Err(GenerationError::Exhausted { attempts })
    }
}

/// Extracts the generated text from a 200 response body.
pub fn parse_generated_text(body: &str) -> std::result::Result<String, GenerationError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

    let text = match &value {
        Value::Array(items) if !items.is_empty() => items[0]
            .get("generated_text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Value::Object(map) if map.contains_key("generated_text") => map
            .get("generated_text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        other => other.to_string(),
    };

    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Replays canned outcomes and records every request.
    struct ScriptedTransport {
        outcomes: Mutex<Vec<std::result::Result<TransportResponse, TransportError>>>,
        calls: Arc<Mutex<Vec<(String, String, Value)>>>,
    }

    impl ScriptedTransport {
        fn new(
            outcomes: Vec<std::result::Result<TransportResponse, TransportError>>,
        ) -> (Self, Arc<Mutex<Vec<(String, String, Value)>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let mut outcomes = outcomes;
            outcomes.reverse();
            (
                Self {
                    outcomes: Mutex::new(outcomes),
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post_json(
            &self,
            url: &str,
            token: &str,
            body: &Value,
            _timeout: Duration,
        ) -> std::result::Result<TransportResponse, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), token.to_string(), body.clone()));
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(TransportError::Other("script exhausted".into())))
        }
    }

    fn ok(status: u16, body: &str) -> std::result::Result<TransportResponse, TransportError> {
        Ok(TransportResponse {
            status,
            body: body.to_string(),
        })
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            warmup_delay: Duration::from_millis(1),
            connect_backoff: Duration::from_millis(1),
        }
    }

    fn client(
        outcomes: Vec<std::result::Result<TransportResponse, TransportError>>,
    ) -> (GenerationClient, Arc<Mutex<Vec<(String, String, Value)>>>) {
        let (transport, calls) = ScriptedTransport::new(outcomes);
        let client = GenerationClient::new(
            &GenerationConfig::default(),
            Box::new(transport),
            Some("hf_test".to_string()),
        )
        .with_policy(fast_policy());
        (client, calls)
    }

    #[tokio::test]
    async fn test_list_response() {
        let (client, calls) = client(vec![ok(200, r#"[{"generated_text": "  You match.  "}]"#)]);
        assert_eq!(client.generate("prompt").await.unwrap(), "You match.");

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (url, token, body) = &calls[0];
        assert_eq!(
            url,
            "https://api-inference.huggingface.co/models/mistralai/Mistral-7B-Instruct-v0.3"
        );
        assert_eq!(token, "hf_test");
        assert_eq!(body["inputs"], "prompt");
        assert_eq!(body["parameters"]["max_new_tokens"], 1024);
        assert_eq!(body["parameters"]["return_full_text"], false);
    }

    #[tokio::test]
    async fn test_object_response() {
        let (client, _) = client(vec![ok(200, r#"{"generated_text": "hello"}"#)]);
        assert_eq!(client.generate("p").await.unwrap(), "hello");
    }

    #[test]
    fn test_other_json_is_stringified() {
        assert_eq!(parse_generated_text(r#"{"foo":1}"#).unwrap(), r#"{"foo":1}"#);
        assert_eq!(parse_generated_text("[]").unwrap(), "[]");
    }

    #[test]
    fn test_non_json_body_is_invalid() {
        assert!(matches!(
            parse_generated_text("<html>oops</html>"),
            Err(GenerationError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_always_503_exhausts_after_three_attempts() {
        let (client, calls) = client(vec![ok(503, ""), ok(503, ""), ok(503, ""), ok(503, "")]);
        let err = client.generate("p").await.unwrap_err();
        assert_eq!(err, GenerationError::Exhausted { attempts: 3 });
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_503_then_success() {
        let (client, calls) = client(vec![ok(503, "loading"), ok(200, r#"[{"generated_text":"ok"}]"#)]);
        assert_eq!(client.generate("p").await.unwrap(), "ok");
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_connection_errors_retried() {
        let (client, calls) = client(vec![
            Err(TransportError::Connect("refused".into())),
            Err(TransportError::Timeout),
            ok(200, r#"{"generated_text":"late"}"#),
        ]);
        assert_eq!(client.generate("p").await.unwrap(), "late");
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let (client, calls) = client(vec![ok(401, "bad token"), ok(200, "[]")]);
        let err = client.generate("p").await.unwrap_err();
        assert_eq!(
            err,
            GenerationError::Status {
                status: 401,
                body: "bad token".to_string()
            }
        );
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_token_makes_no_call() {
        let (transport, calls) = ScriptedTransport::new(vec![ok(200, "[]")]);
        let client = GenerationClient::new(&GenerationConfig::default(), Box::new(transport), None);
        let err = client.generate("p").await.unwrap_err();
        assert!(matches!(err, GenerationError::MissingToken { .. }));
        assert!(err.to_string().contains("HUGGING_FACE_HUB_TOKEN"));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_sleep_after_final_attempt() {
        let (transport, _) = ScriptedTransport::new(vec![ok(503, "")]);
        let client = GenerationClient::new(
            &GenerationConfig::default(),
            Box::new(transport),
            Some("t".into()),
        )
        .with_policy(RetryPolicy {
            max_attempts: 1,
            warmup_delay: Duration::from_secs(3600),
            connect_backoff: Duration::from_secs(3600),
        });

        let result = tokio::time::timeout(Duration::from_secs(5), client.generate("p")).await;
        assert_eq!(result.unwrap().unwrap_err(), GenerationError::Exhausted { attempts: 1 });
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from_config(&GenerationConfig::default());
        assert_eq!(policy, RetryPolicy::default());
    }
}
