use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::config::{ApiKey, Config};
use crate::constants;
use crate::error::{AdvisorError, CompletionError, ErrorKind};
use crate::prompt::{Category, PromptBuilder};

/// One standalone call to the completion service. No prior turns are sent.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub api_key: ApiKey,
    pub model: String,
    pub prompt: String,
}

/// The hosted text-completion service.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

// Structures matching Gemini's generateContent endpoint
#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Google Gemini over its REST API.
#[derive(Debug, Clone)]
pub struct GeminiService {
    client: Client,
    api_base: String,
}

impl GeminiService {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            model
        )
    }
}

#[async_trait]
impl CompletionService for GeminiService {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn generate(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let url = self.endpoint(&request.model);
        let payload = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart {
                    text: &request.prompt,
                }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", request.api_key.expose())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                CompletionError::new(
                    ErrorKind::Transport,
                    format!("failed to send request to {}: {}", url, e),
                )
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            CompletionError::new(ErrorKind::Transport, format!("failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            let err = classify_failure(status, &body);
            error!(%status, kind = %err.kind, "Gemini API request failed");
            return Err(err);
        }

        let text = extract_text(&body)?;
        debug!(chars = text.chars().count(), "Received Gemini response");
        Ok(text)
    }
}

/// Maps a non-success HTTP answer to an error kind.
fn classify_failure(status: StatusCode, body: &str) -> CompletionError {
    let (api_status, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.status, envelope.error.message),
        Err(_) => (String::new(), body.trim().to_string()),
    };

    let kind = if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || api_status == "UNAUTHENTICATED"
        || api_status == "PERMISSION_DENIED"
        || message.to_lowercase().contains("api key not valid")
    {
        ErrorKind::Unauthenticated
    } else if status == StatusCode::TOO_MANY_REQUESTS || api_status == "RESOURCE_EXHAUSTED" {
        ErrorKind::RateLimited
    } else {
        ErrorKind::Service
    };

    let message = if message.is_empty() {
        format!("request failed with status {}", status)
    } else {
        format!("{} {}", status, message)
    };
    CompletionError::new(kind, message)
}

/// Concatenates the text parts of the first candidate.
fn extract_text(body: &str) -> Result<String, CompletionError> {
    let response: GenerateResponse = serde_json::from_str(body).map_err(|e| {
        CompletionError::new(ErrorKind::Malformed, format!("failed to parse response JSON: {}", e))
    })?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::new(ErrorKind::Malformed, "response contained no candidates"))?;

    let parts: Vec<String> = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| p.text)
        .collect();

    if parts.is_empty() {
        return Err(CompletionError::new(
            ErrorKind::Malformed,
            "response candidate contained no text",
        ));
    }
    Ok(parts.concat())
}

/// Builds prompts and forwards them to the completion service.
///
/// Without a credential the service is never called.
#[derive(Clone)]
pub struct CompletionClient {
    credential: Option<ApiKey>,
    model: String,
    prompts: Arc<PromptBuilder>,
    service: Arc<dyn CompletionService>,
}

impl CompletionClient {
    pub fn new(
        credential: Option<ApiKey>,
        model: impl Into<String>,
        prompts: PromptBuilder,
        service: Arc<dyn CompletionService>,
    ) -> Self {
        Self {
            credential,
            model: model.into(),
            prompts: Arc::new(prompts),
            service,
        }
    }

    /// A client talking to Gemini with the configured model and endpoint.
    pub fn from_config(config: &Config, credential: Option<ApiKey>) -> Result<Self, AdvisorError> {
        let prompts = PromptBuilder::new(config.dashboard)?;
        let service = Arc::new(GeminiService::new(config.api_base.clone()));
        Ok(Self::new(credential, config.model.clone(), prompts, service))
    }

    /// Same service and prompts, different credential.
    pub fn with_credential(&self, credential: Option<ApiKey>) -> Self {
        Self {
            credential,
            ..self.clone()
        }
    }

    /// The client to use for a session. The secret-store key always wins;
    /// a session's typed key only fills in when the store had none.
    pub fn for_session(&self, session_key: Option<ApiKey>) -> Self {
        if self.has_credential() {
            self.clone()
        } else {
            self.with_credential(session_key)
        }
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    /// Sends one query and returns the raw reply, or a tagged error.
    pub async fn complete(&self, category: Category, query: &str) -> Result<String, AdvisorError> {
        let api_key = self.credential.clone().ok_or(AdvisorError::MissingCredential)?;
        let prompt = self.prompts.build(category, query)?;
        let request = CompletionRequest {
            api_key,
            model: self.model.clone(),
            prompt,
        };
        Ok(self.service.generate(&request).await?)
    }

    /// Sends one query and always returns display text: the reply, the
    /// missing-key warning, or the error marker followed by the failure.
    pub async fn generate_response(&self, category: Category, query: &str) -> String {
        match self.complete(category, query).await {
            Ok(text) => text,
            Err(AdvisorError::MissingCredential) => constants::MISSING_KEY_WARNING.to_string(),
            Err(e) => {
                warn!(error = %e, "Completion failed; reporting in transcript");
                format!("{}\n{}", constants::ERROR_MARKER, e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingService {
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
        reply: Result<String, CompletionError>,
    }

    impl CountingService {
        fn new(reply: Result<String, CompletionError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                reply,
            })
        }
    }

    #[async_trait]
    impl CompletionService for CountingService {
        async fn generate(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.prompt.clone());
            self.reply.clone()
        }
    }

    fn client(key: Option<&str>, service: Arc<CountingService>) -> CompletionClient {
        CompletionClient::new(
            key.and_then(ApiKey::new),
            "test-model",
            PromptBuilder::new(false).unwrap(),
            service,
        )
    }

    #[tokio::test]
    async fn missing_credential_returns_warning_without_calling_service() {
        let service = CountingService::new(Ok("never".to_string()));
        let client = client(None, service.clone());

        let reply = client.generate_response(Category::Strategy, "hello").await;

        assert_eq!(reply, constants::MISSING_KEY_WARNING);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            client.complete(Category::Strategy, "hello").await,
            Err(AdvisorError::MissingCredential)
        ));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_returns_text_verbatim() {
        let service = CountingService::new(Ok("  Do X.\n".to_string()));
        let client = client(Some("key"), service.clone());

        let reply = client.generate_response(Category::IdeaGen, "pet food").await;

        assert_eq!(reply, "  Do X.\n");
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert!(service.prompts.lock().unwrap()[0].contains("'pet food'"));
    }

    #[tokio::test]
    async fn failure_is_swallowed_into_display_text() {
        let service = CountingService::new(Err(CompletionError::new(
            ErrorKind::RateLimited,
            "429 Too Many Requests quota exceeded",
        )));
        let client = client(Some("key"), service);

        let reply = client.generate_response(Category::Competition, "crm").await;

        assert!(reply.starts_with(constants::ERROR_MARKER));
        assert!(reply.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn complete_keeps_error_kind() {
        let service = CountingService::new(Err(CompletionError::new(ErrorKind::Unauthenticated, "bad key")));
        let client = client(Some("key"), service);

        match client.complete(Category::Strategy, "x").await {
            Err(AdvisorError::Completion(e)) => assert_eq!(e.kind, ErrorKind::Unauthenticated),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn with_credential_enables_calls() {
        let service = CountingService::new(Ok("ok".to_string()));
        let anonymous = client(None, service.clone());
        let keyed = anonymous.with_credential(ApiKey::new("k"));

        assert!(!anonymous.has_credential());
        assert!(keyed.has_credential());
        assert_eq!(keyed.generate_response(Category::Strategy, "x").await, "ok");
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn store_key_wins_over_session_key() {
        let service = CountingService::new(Ok("ok".to_string()));
        let stored = client(Some("stored"), service.clone());
        assert_eq!(
            stored.for_session(ApiKey::new("typed")).credential.unwrap().expose(),
            "stored"
        );

        let anonymous = client(None, service.clone());
        assert_eq!(
            anonymous.for_session(ApiKey::new("typed")).credential.unwrap().expose(),
            "typed"
        );
        assert!(!anonymous.for_session(None).has_credential());
    }

    #[test]
    fn classify_maps_statuses() {
        let invalid_key = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(classify_failure(StatusCode::BAD_REQUEST, invalid_key).kind, ErrorKind::Unauthenticated);
        assert_eq!(classify_failure(StatusCode::FORBIDDEN, "").kind, ErrorKind::Unauthenticated);

        let quota = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, quota);
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert!(err.message.contains("Resource has been exhausted"));

        let err = classify_failure(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert_eq!(err.kind, ErrorKind::Service);
        assert!(err.message.contains("boom"));
    }

    #[test]
    fn extract_text_concatenates_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Hello, "},{"text":"founder."}],"role":"model"}}]}"#;
        assert_eq!(extract_text(body).unwrap(), "Hello, founder.");
    }

    #[test]
    fn extract_text_rejects_empty_or_invalid() {
        assert_eq!(extract_text("not json").unwrap_err().kind, ErrorKind::Malformed);
        assert_eq!(extract_text(r#"{"candidates":[]}"#).unwrap_err().kind, ErrorKind::Malformed);
        assert_eq!(
            extract_text(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap_err().kind,
            ErrorKind::Malformed
        );
    }
}
