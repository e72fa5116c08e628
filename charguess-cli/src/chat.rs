//! Role-play replies from an OpenAI-compatible chat completion endpoint.
use std::time::Duration;

use anyhow::{Context, Result};
use charguess_game::{ChatRole, ChatTurn, GenerationError, TextGenerator};
use serde_json::{Value, json};

const MAX_OUTPUT_TOKENS: u32 = 1024;

pub struct HttpTextGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpTextGenerator {
    pub fn new(endpoint: String, model: String, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("building chat client")?;
        Ok(Self {
            client,
            endpoint,
            model,
            api_key,
        })
    }
}

const fn role_name(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Model => "assistant",
    }
}

fn request_body(model: &str, history: &[ChatTurn]) -> Value {
    let messages: Vec<Value> = history
        .iter()
        .map(|turn| json!({"role": role_name(turn.role), "content": turn.text}))
        .collect();
    json!({
        "model": model,
        "messages": messages,
        "max_tokens": MAX_OUTPUT_TOKENS,
    })
}

fn reply_text(body: &Value) -> Option<String> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[async_trait::async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, history: &[ChatTurn]) -> Result<String, GenerationError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&request_body(&self.model, history));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|err| GenerationError(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError(format!("{} answered {status}", self.endpoint)));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|err| GenerationError(err.to_string()))?;
        reply_text(&body).ok_or_else(|| GenerationError("response carried no text".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_maps_to_chat_messages() {
        let body = request_body(
            "tiny",
            &[
                ChatTurn::new(ChatRole::System, "persona"),
                ChatTurn::new(ChatRole::User, "who are you?"),
                ChatTurn::new(ChatRole::Model, "guess!"),
            ],
        );
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][2]["role"], "assistant");
        assert_eq!(body["max_tokens"], 1024);
    }

    #[test]
    fn reply_text_reads_first_choice() {
        let body = json!({"choices": [{"message": {"content": "  hello  "}}]});
        assert_eq!(reply_text(&body).as_deref(), Some("hello"));
        assert_eq!(reply_text(&json!({"choices": []})), None);
    }
}
