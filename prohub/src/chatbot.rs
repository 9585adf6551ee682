//! Outbound client for the chatbot proxy.
//!
//! Questions are forwarded to an OpenAI-compatible `chat/completions` endpoint
//! together with the configured system prompt and the most recent turns of the
//! conversation the browser keeps.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::{
    api::models::chatbot::{ChatRole, ChatTurn},
    config::ChatbotConfig,
    errors::Error,
};

#[derive(Debug, thiserror::Error)]
pub enum ChatbotError {
    #[error("Chatbot is disabled")]
    Disabled,

    #[error("Question must not be empty")]
    EmptyQuestion,

    #[error("Question exceeds {0} characters")]
    QuestionTooLong(usize),

    #[error("Upstream returned {0}")]
    Upstream(reqwest::StatusCode),

    #[error("Upstream returned no answer")]
    EmptyAnswer,

    #[error("Upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<ChatbotError> for Error {
    fn from(err: ChatbotError) -> Self {
        match err {
            ChatbotError::Disabled => Error::ServiceUnavailable { message: err.to_string() },
            ChatbotError::EmptyQuestion | ChatbotError::QuestionTooLong(_) => Error::BadRequest { message: err.to_string() },
            ChatbotError::Upstream(_) | ChatbotError::EmptyAnswer | ChatbotError::Http(_) => {
                tracing::warn!("Chatbot upstream failure: {err}");
                Error::ServiceUnavailable {
                    message: "The assistant is unavailable right now, please try again later".to_string(),
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct ChatbotClient {
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    system_prompt: String,
    max_history: usize,
    max_question_length: usize,
    timeout: Duration,
    http: reqwest::Client,
}

impl ChatbotClient {
    pub fn from_config(config: &ChatbotConfig) -> Result<Self, ChatbotError> {
        let base_url = match (&config.base_url, config.enabled) {
            (Some(base_url), true) => base_url,
            _ => return Err(ChatbotError::Disabled),
        };
        // `join` drops the last path segment unless the base ends with a slash
        let mut base_url = base_url.clone();
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        let endpoint = base_url.join("chat/completions").map_err(|_| ChatbotError::Disabled)?;

        Ok(Self {
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            max_history: config.max_history,
            max_question_length: config.max_question_length,
            timeout: config.timeout,
            http: crate::http_client(),
        })
    }

    fn build_request<'a>(&'a self, question: &'a str, history: &'a [ChatTurn]) -> ChatCompletionRequest<'a> {
        let recent = &history[history.len().saturating_sub(self.max_history)..];

        let mut messages = Vec::with_capacity(recent.len() + 2);
        messages.push(ChatMessage {
            role: "system",
            content: &self.system_prompt,
        });
        messages.extend(recent.iter().map(|turn| ChatMessage {
            role: match turn.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            },
            content: &turn.content,
        }));
        messages.push(ChatMessage {
            role: "user",
            content: question,
        });

        ChatCompletionRequest {
            model: &self.model,
            messages,
        }
    }

    #[instrument(skip(self, question, history), fields(history = history.len()), err)]
    pub async fn ask(&self, question: &str, history: &[ChatTurn]) -> Result<String, ChatbotError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatbotError::EmptyQuestion);
        }
        if question.chars().count() > self.max_question_length {
            return Err(ChatbotError::QuestionTooLong(self.max_question_length));
        }

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(&self.build_request(question, history));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ChatbotError::Upstream(response.status()));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let answer = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(ChatbotError::EmptyAnswer)?;

        debug!(length = answer.len(), "Chatbot answered");
        Ok(answer)
    }
}
