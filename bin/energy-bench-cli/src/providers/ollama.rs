// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Ollama `/api/generate` client (non-streaming).

use super::{check_endpoint, count_field, http_client, join_url, request_error, ModelClient};
use energy_meter::{Generate, GenerateError, GenerationOutcome};
use std::time::{Duration, Instant};

pub struct OllamaClient {
    endpoint: String,
    tags_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::blocking::Client,
}

impl OllamaClient {
    pub fn new(
        base_url: impl AsRef<str>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerateError> {
        Ok(Self {
            endpoint: join_url(base_url.as_ref(), "api/generate"),
            tags_url: join_url(base_url.as_ref(), "api/tags"),
            model: model.into(),
            timeout,
            client: http_client(timeout)?,
        })
    }
}

impl Generate for OllamaClient {
    fn generate(&mut self, prompt: &str) -> Result<GenerationOutcome, GenerateError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let started = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|e| request_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(GenerateError::Request(format!(
                "Ollama returned {status}: {}",
                detail.trim()
            )));
        }

        let value: serde_json::Value = response
            .json()
            .map_err(|e| GenerateError::InvalidResponse(format!("Ollama JSON: {e}")))?;
        let elapsed = started.elapsed().as_secs_f64();
        tracing::debug!(model = %self.model, elapsed, "ollama response received");
        parse_response(&value, elapsed)
    }
}

impl ModelClient for OllamaClient {
    fn check_connection(&self) -> Result<(), GenerateError> {
        check_endpoint(self.client.get(&self.tags_url), "Ollama", &self.tags_url)
    }
}

fn parse_response(value: &serde_json::Value, elapsed_s: f64) -> Result<GenerationOutcome, GenerateError> {
    if let Some(err) = value.get("error").and_then(|e| e.as_str()) {
        return Err(GenerateError::Request(format!("Ollama error: {err}")));
    }
    let text = value
        .get("response")
        .and_then(|r| r.as_str())
        .ok_or_else(|| GenerateError::InvalidResponse("missing 'response' field".to_string()))?;

    Ok(GenerationOutcome::new(
        text,
        count_field(value, "prompt_eval_count"),
        count_field(value, "eval_count"),
    )
    .with_response_time(elapsed_s))
}
