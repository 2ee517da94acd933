// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! OpenAI-compatible `/chat/completions` client.

use super::{check_endpoint, count_field, http_client, join_url, request_error, ModelClient};
use energy_meter::{Generate, GenerateError, GenerationOutcome};
use std::time::{Duration, Instant};

pub struct OpenAiClient {
    endpoint: String,
    models_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::blocking::Client,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl AsRef<str>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerateError> {
        Ok(Self {
            endpoint: join_url(base_url.as_ref(), "chat/completions"),
            models_url: join_url(base_url.as_ref(), "models"),
            model: model.into(),
            api_key: api_key.into(),
            timeout,
            client: http_client(timeout)?,
        })
    }
}

impl Generate for OpenAiClient {
    fn generate(&mut self, prompt: &str) -> Result<GenerationOutcome, GenerateError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let started = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| request_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(GenerateError::Request(format!(
                "OpenAI endpoint returned {status}: {}",
                detail.trim()
            )));
        }

        let value: serde_json::Value = response
            .json()
            .map_err(|e| GenerateError::InvalidResponse(format!("OpenAI JSON: {e}")))?;
        let elapsed = started.elapsed().as_secs_f64();
        tracing::debug!(model = %self.model, elapsed, "chat completion received");
        parse_response(&value, elapsed)
    }
}

impl ModelClient for OpenAiClient {
    fn check_connection(&self) -> Result<(), GenerateError> {
        let request = self.client.get(&self.models_url).bearer_auth(&self.api_key);
        check_endpoint(request, "OpenAI endpoint", &self.models_url)
    }
}

fn parse_response(value: &serde_json::Value, elapsed_s: f64) -> Result<GenerationOutcome, GenerateError> {
    let text = value
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            GenerateError::InvalidResponse("missing choices[0].message.content".to_string())
        })?;

    let (prompt_tokens, completion_tokens) = match value.get("usage") {
        Some(usage) => (
            count_field(usage, "prompt_tokens"),
            count_field(usage, "completion_tokens"),
        ),
        None => {
            tracing::warn!("response has no usage block; token counts set to 0");
            (0, 0)
        }
    };

    Ok(GenerationOutcome::new(text, prompt_tokens, completion_tokens).with_response_time(elapsed_s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let v = serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Paris."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 14, "completion_tokens": 2, "total_tokens": 16}
        });
        let o = parse_response(&v, 0.8).unwrap();
        assert_eq!(o.text, "Paris.");
        assert_eq!(o.tokens_prompt, 14);
        assert_eq!(o.tokens_completion, 2);
        assert_eq!(o.total_tokens(), 16);
    }

    #[test]
    fn test_missing_usage() {
        let v = serde_json::json!({"choices": [{"message": {"content": "ok"}}]});
        let o = parse_response(&v, 0.1).unwrap();
        assert_eq!(o.total_tokens(), 0);
    }

    #[test]
    fn test_no_choices() {
        let v = serde_json::json!({"choices": []});
        assert!(matches!(
            parse_response(&v, 0.1),
            Err(GenerateError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_endpoint() {
        let c = OpenAiClient::new("http://localhost:8080/v1", "m", "k", Duration::from_secs(1))
            .unwrap();
        assert_eq!(c.endpoint, "http://localhost:8080/v1/chat/completions");
        assert_eq!(c.models_url, "http://localhost:8080/v1/models");
    }
}
