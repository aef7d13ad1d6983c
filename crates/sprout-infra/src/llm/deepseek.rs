//! DeepSeekClient -- chat responder and summarizer over the DeepSeek
//! OpenAI-compatible chat-completions API.
//!
//! Per-request timeouts follow a word-count profile: short messages get the
//! simple timeout, long messages the complex one. Summaries always use the
//! complex timeout.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never logged
//! or included in `Debug` output.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use sprout_core::boundary::keywords;
use sprout_core::responder::ChatResponder;
use sprout_core::summarize::Summarizer;
use sprout_types::config::ServiceConfig;
use sprout_types::error::UpstreamError;

/// System prompt steering the model toward child-safe tutoring. Instructs it
/// to append the end marker when the child wants to stop; the lifecycle's
/// assistant-signal rule depends on that marker, not on the exact wording.
const SYSTEM_PROMPT: &str = "You are a friendly AI tutor for children aged 6-9. \
Use simple words and short sentences, ask one follow-up question, and relate \
to earlier topics when you can. Do not engage with trolling. \
IMPORTANT: if the child says they want to end the conversation (\"let's end\", \
\"done talking\", \"finish this\", and similar), say a nice goodbye and append \
\"CHAT-ENDED\" to your response.";

/// Prompt template for single-conversation summaries.
const SUMMARY_PROMPT: &str = "Act as a child development expert. Summarize this \
conversation for future reference: note the child's interests, the concepts \
covered, and one topic to explore next. Keep it under 100 words, third person, \
child-friendly terms.\n\nConversation:\n";

/// Prompt template for whole-session summaries.
const SESSION_SUMMARY_PROMPT: &str = "Analyze this complete conversation session \
with a child and write a comprehensive educational summary: main topics, \
curiosity patterns, teaching moments that worked, and two follow-up subjects \
for future sessions. Keep it under 200 words.\n\nConversation:\n";

/// How many topic keywords to attach to a record.
const MAX_TOPICS: usize = 3;

/// DeepSeek chat-completions client implementing both collaborator ports.
pub struct DeepSeekClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    simple_timeout: Duration,
    complex_timeout: Duration,
    complex_word_threshold: usize,
}

// DeepSeekClient intentionally does NOT derive Debug so the API key can
// never leak through debug formatting.

impl DeepSeekClient {
    /// Create a client from the service config and an API key.
    pub fn new(api_key: SecretString, config: &ServiceConfig) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("failed to create reqwest client");

        Self {
            client,
            api_key,
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            simple_timeout: Duration::from_secs(config.simple_timeout_secs),
            complex_timeout: Duration::from_secs(config.complex_timeout_secs),
            complex_word_threshold: config.complex_word_threshold,
        }
    }

    /// Override the base URL (useful for testing or proxies).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Timeout for a message based on its word count.
    fn timeout_for(&self, message: &str) -> Duration {
        if message.split_whitespace().count() > self.complex_word_threshold {
            self.complex_timeout
        } else {
            self.simple_timeout
        }
    }

    /// Send a chat-completion request and return the first choice's content.
    async fn complete(
        &self,
        messages: Vec<ChatCompletionMessage>,
        timeout: Duration,
    ) -> Result<String, UpstreamError> {
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
        };
        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout(timeout.as_secs())
                } else {
                    UpstreamError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::MalformedResponse(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| UpstreamError::MalformedResponse("no choices in response".to_string()))
    }
}

impl ChatResponder for DeepSeekClient {
    async fn respond(&self, context: &str, message: &str) -> Result<String, UpstreamError> {
        let messages = vec![
            ChatCompletionMessage::system(SYSTEM_PROMPT),
            ChatCompletionMessage::system(format!("Previous context:\n{context}")),
            ChatCompletionMessage::user(message),
        ];
        self.complete(messages, self.timeout_for(message)).await
    }
}

impl Summarizer for DeepSeekClient {
    async fn summarize(&self, transcript: &str) -> Result<String, UpstreamError> {
        let prompt = format!("{SUMMARY_PROMPT}{transcript}");
        let messages = vec![ChatCompletionMessage::user(prompt)];
        self.complete(messages, self.complex_timeout).await
    }

    async fn summarize_session(&self, transcript: &str) -> Result<String, UpstreamError> {
        let prompt = format!("{SESSION_SUMMARY_PROMPT}{transcript}");
        let messages = vec![ChatCompletionMessage::user(prompt)];
        self.complete(messages, self.complex_timeout).await
    }

    async fn extract_topics(&self, transcript: &str) -> Result<Vec<String>, UpstreamError> {
        // Topics come from local keyword extraction, so this never does I/O
        Ok(keywords::topics(transcript, MAX_TOPICS))
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatCompletionMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatCompletionMessage {
    role: String,
    content: String,
}

impl ChatCompletionMessage {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> DeepSeekClient {
        DeepSeekClient::new(
            SecretString::from("test-key"),
            &ServiceConfig::default(),
        )
    }

    #[test]
    fn short_message_uses_simple_timeout() {
        let c = client();
        assert_eq!(c.timeout_for("why is the sky blue"), Duration::from_secs(15));
    }

    #[test]
    fn long_message_uses_complex_timeout() {
        let c = client();
        let long = "can you explain to me in detail why the sky turns orange at sunset";
        assert_eq!(c.timeout_for(long), Duration::from_secs(30));
    }

    #[test]
    fn request_body_serializes_to_openai_shape() {
        let body = ChatCompletionRequest {
            model: "deepseek-chat".to_string(),
            messages: vec![
                ChatCompletionMessage::system("be nice"),
                ChatCompletionMessage::user("hello"),
            ],
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"model\":\"deepseek-chat\""));
        assert!(json.contains("\"role\":\"system\""));
        assert!(json.contains("\"content\":\"hello\""));
    }

    #[test]
    fn response_parses_first_choice() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"Hi there!"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "Hi there!");
    }

    #[tokio::test]
    async fn topics_are_extracted_locally() {
        let c = client();
        let topics = c
            .extract_topics("child: dinosaurs roamed everywhere")
            .await
            .unwrap();
        assert!(topics.contains(&"dinosaurs".to_string()));
    }

    #[test]
    fn system_prompt_carries_the_end_marker_contract() {
        assert!(SYSTEM_PROMPT.contains("CHAT-ENDED"));
    }
}
