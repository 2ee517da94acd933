// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The blocking text-generation capability a session measures.

use crate::GenerateError;

/// What a generate call produced.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GenerationOutcome {
    /// Generated completion text.
    pub text: String,
    pub tokens_prompt: u64,
    pub tokens_completion: u64,
    /// Wall-clock seconds the request took, as seen by the client.
    pub response_time_s: f64,
}

impl GenerationOutcome {
    pub fn new(text: impl Into<String>, tokens_prompt: u64, tokens_completion: u64) -> Self {
        Self {
            text: text.into(),
            tokens_prompt,
            tokens_completion,
            response_time_s: 0.0,
        }
    }

    pub fn with_response_time(mut self, seconds: f64) -> Self {
        self.response_time_s = seconds;
        self
    }

    pub fn total_tokens(&self) -> u64 {
        self.tokens_prompt.saturating_add(self.tokens_completion)
    }
}

/// A synchronous generate call against some model endpoint.
///
/// Implementations may be async or streamed internally; the session only
/// sees a blocking call that returns an outcome or a typed error.
pub trait Generate {
    fn generate(&mut self, prompt: &str) -> Result<GenerationOutcome, GenerateError>;
}

impl<F> Generate for F
where
    F: FnMut(&str) -> Result<GenerationOutcome, GenerateError>,
{
    fn generate(&mut self, prompt: &str) -> Result<GenerationOutcome, GenerateError> {
        self(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_tokens() {
        let o = GenerationOutcome::new("hi", 12, 30);
        assert_eq!(o.total_tokens(), 42);
        assert_eq!(o.response_time_s, 0.0);
    }

    #[test]
    fn test_total_tokens_saturates() {
        let o = GenerationOutcome::new("", u64::MAX, 1);
        assert_eq!(o.total_tokens(), u64::MAX);
    }

    #[test]
    fn test_closure_is_generate() {
        let mut calls = 0;
        let mut echo = |p: &str| -> Result<GenerationOutcome, GenerateError> {
            calls += 1;
            Ok(GenerationOutcome::new(p.to_uppercase(), 1, 1).with_response_time(0.5))
        };
        let out = Generate::generate(&mut echo, "abc").unwrap();
        assert_eq!(out.text, "ABC");
        assert_eq!(out.response_time_s, 0.5);
        drop(echo);
        assert_eq!(calls, 1);
    }
}
