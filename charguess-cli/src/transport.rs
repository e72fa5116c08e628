//! Live metadata transport backed by `reqwest`.
use std::time::Duration;

use anyhow::{Context, Result};
use charguess_game::constants::USER_AGENT;
use charguess_game::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError};
use serde_json::Value;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building http client")?;
        Ok(Self { client })
    }
}

fn failure(request: &HttpRequest, err: &reqwest::Error) -> TransportError {
    TransportError {
        method: request.method,
        url: request.url.clone(),
        message: err.to_string(),
    }
}

/// JSON when the body parses, the raw text otherwise, null when empty.
fn parse_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        let builder = builder.query(&request.query);
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };
        log::debug!("{} {}", request.method, request.url);
        let response = builder.send().await.map_err(|err| failure(request, &err))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let text = response.text().await.map_err(|err| failure(request, &err))?;
        Ok(HttpResponse {
            status,
            headers,
            body: parse_body(text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodies_fall_back_to_text() {
        assert_eq!(parse_body(String::new()), Value::Null);
        assert_eq!(parse_body(r#"{"id": 1}"#.into())["id"], 1);
        assert_eq!(
            parse_body("<html>busy</html>".into()),
            Value::String("<html>busy</html>".into())
        );
    }
}
