// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! HTTP clients for the supported generation endpoints.
//!
//! Both clients are blocking: a measurement session sees one call that
//! returns when the full completion is available. Each can also list its
//! models, which the runner uses as a connectivity check before any
//! prompt is metered.

mod ollama;
mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use energy_meter::{Generate, GenerateError};
use std::time::Duration;

/// Which endpoint family to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Provider {
    Ollama,
    #[value(name = "openai")]
    OpenAi,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::OpenAi => "openai",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Ollama => "http://localhost:11434",
            Provider::OpenAi => "https://api.openai.com/v1",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection settings shared by every provider.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// A generation endpoint the runner can talk to.
pub trait ModelClient: Generate + Send {
    /// Fails unless the endpoint answers a cheap listing request.
    fn check_connection(&self) -> Result<(), GenerateError>;
}

/// Builds the client for `provider`.
pub fn build_client(
    provider: Provider,
    options: &ClientOptions,
) -> Result<Box<dyn ModelClient>, GenerateError> {
    let base_url = options
        .base_url
        .clone()
        .unwrap_or_else(|| provider.default_base_url().to_string());
    match provider {
        Provider::Ollama => Ok(Box::new(OllamaClient::new(
            base_url,
            options.model.clone(),
            options.timeout,
        )?)),
        Provider::OpenAi => {
            let api_key = options
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .ok_or_else(|| {
                    GenerateError::Request(
                        "an API key is required (--api-key or OPENAI_API_KEY)".to_string(),
                    )
                })?;
            Ok(Box::new(OpenAiClient::new(
                base_url,
                options.model.clone(),
                api_key,
                options.timeout,
            )?))
        }
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client, GenerateError> {
    reqwest::blocking::Client::builder()
        .user_agent(concat!("energy-bench/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| GenerateError::Request(format!("failed to create HTTP client: {e}")))
}

/// Maps a transport error, distinguishing deadline expiry.
pub(crate) fn request_error(e: reqwest::Error, timeout: Duration) -> GenerateError {
    if e.is_timeout() {
        GenerateError::Timeout {
            seconds: timeout.as_secs_f64(),
        }
    } else {
        GenerateError::Request(e.to_string())
    }
}

/// Sends a listing request and maps any failure to a connection error
/// naming `service` and `url`.
pub(crate) fn check_endpoint(
    request: reqwest::blocking::RequestBuilder,
    service: &str,
    url: &str,
) -> Result<(), GenerateError> {
    let response = request
        .send()
        .map_err(|e| GenerateError::Request(format!("cannot reach {service} at {url}: {e}")))?;
    connection_status(response.status(), service, url)
}

fn connection_status(
    status: reqwest::StatusCode,
    service: &str,
    url: &str,
) -> Result<(), GenerateError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(GenerateError::Request(format!(
            "{service} at {url} answered {status}"
        )))
    }
}

/// Reads a non-negative integer field, treating absence as 0.
pub(crate) fn count_field(value: &serde_json::Value, key: &str) -> u64 {
    value.get(key).and_then(serde_json::Value::as_u64).unwrap_or(0)
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
