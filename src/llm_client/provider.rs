//! `LlmProvider`: the narrow outbound interface the client drives an external
//! LLM service through, plus a `NullLlmProvider` stand-in and an
//! HTTP-backed implementation over `reqwest`.

use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("llm provider unavailable")]
    Unavailable,
    #[error("llm request timed out")]
    Timeout,
    #[error("llm provider rate limited the request")]
    RateLimited,
    #[error("llm provider returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    #[must_use]
    pub const fn kind(&self) -> crate::error::ErrorKind {
        match self {
            Self::Unavailable => crate::error::ErrorKind::LlmUnavailable,
            Self::Timeout => crate::error::ErrorKind::LlmTimeout,
            // Provider-specific rate-limit/invalid-response outcomes degrade the
            // same way as Unavailable from the Scraping Service's point of view
            //: the task proceeds without LLM rather than failing.
            Self::RateLimited | Self::InvalidResponse(_) => crate::error::ErrorKind::LlmUnavailable,
        }
    }
}

/// Outbound contract to an LLM provider: a single `complete` call taking
/// the content to restructure, optional free-form instructions, and a model
/// identifier. Timeout/deadline handling lives in [`super::LlmClient`], not here.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        content: &str,
        instructions: Option<&str>,
        model: &str,
    ) -> Result<String, LlmError>;
}

/// Always reports `Unavailable`. The default provider for tasks/tests that
/// never configure a real backend — exercises the graceful-degradation path.
pub struct NullLlmProvider;

#[async_trait]
impl LlmProvider for NullLlmProvider {
    async fn complete(
        &self,
        _content: &str,
        _instructions: Option<&str>,
        _model: &str,
    ) -> Result<String, LlmError> {
        Err(LlmError::Unavailable)
    }
}

/// Generic OpenAI-compatible chat-completions provider over `reqwest`. Works
/// against any provider speaking the `{model, messages}` / `choices[0].message.content`
/// shape (OpenAI itself, and most self-hosted/compatible gateways).
pub struct HttpChatProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpChatProvider {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(serde::Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[async_trait]
impl LlmProvider for HttpChatProvider {
    async fn complete(
        &self,
        content: &str,
        instructions: Option<&str>,
        model: &str,
    ) -> Result<String, LlmError> {
        let prompt = match instructions {
            Some(instructions) => format!("{instructions}\n\n{content}"),
            None => content.to_string(),
        };

        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Unavailable.with_source(e))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(LlmError::Unavailable);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("empty choices array".into()))
    }
}

impl LlmError {
    /// Attach a source error's message for diagnostics while still collapsing
    /// to the stable `Unavailable` variant the rest of the engine matches on.
    fn with_source(self, source: impl std::fmt::Display) -> Self {
        tracing::warn!(error = %source, "llm http provider request failed");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_provider_is_always_unavailable() {
        let err = NullLlmProvider.complete("x", None, "m").await.unwrap_err();
        assert!(matches!(err, LlmError::Unavailable));
    }

    #[test]
    fn error_kinds_map_to_stable_taxonomy() {
        assert_eq!(LlmError::Unavailable.kind(), crate::error::ErrorKind::LlmUnavailable);
        assert_eq!(LlmError::Timeout.kind(), crate::error::ErrorKind::LlmTimeout);
        assert_eq!(LlmError::RateLimited.kind(), crate::error::ErrorKind::LlmUnavailable);
    }
}
