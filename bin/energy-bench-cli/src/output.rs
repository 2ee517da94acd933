// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Result rows and the JSON results file.

use crate::testset::{Question, TestSet};
use anyhow::Context;
use energy_meter::MetricsRecord;
use std::path::Path;

/// One output row: the metrics record plus request context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResultRow {
    pub prompt: String,
    pub completion: String,
    pub provider: String,
    pub model: String,
    #[serde(flatten)]
    pub record: MetricsRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testset_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testset_goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testset_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_difficulty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_task_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_answer_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens_hint: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_relevance: Option<String>,
}

impl ResultRow {
    pub fn new(
        record: MetricsRecord,
        completion: String,
        provider: &str,
        model: &str,
        set: &TestSet,
        question: &Question,
    ) -> Self {
        Self {
            prompt: question.prompt().to_string(),
            completion,
            provider: provider.to_string(),
            model: model.to_string(),
            record,
            testset_id: set.id.clone(),
            testset_name: set.name.clone(),
            testset_goal: set.goal.clone(),
            testset_notes: set.notes.clone(),
            question_id: question.id.clone(),
            question_difficulty: question.difficulty.clone(),
            question_task_type: question.task_type.clone(),
            tags: question.tags.clone(),
            expected_answer_description: question.expected_answer_description.clone(),
            max_output_tokens_hint: question.max_output_tokens_hint,
            energy_relevance: question.energy_relevance.clone(),
        }
    }
}

/// Writes rows as a pretty-printed JSON array, creating parent directories.
pub fn write_results(path: &Path, rows: &[ResultRow]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(rows).context("serialising results")?;
    std::fs::write(path, json).with_context(|| format!("writing results to {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "results written");
    Ok(())
}
