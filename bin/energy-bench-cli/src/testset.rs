// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Prompt test sets loaded from JSON.
//!
//! Two layouts are accepted:
//! ```json
//! [{"id": "q1", "prompt": "…"}, …]
//! {"id": "easy", "name": "Easy set", "goal": "…", "questions": [{"prompt": "…"}, …]}
//! ```
//!
//! `--test-set` takes either a path or a bare name such as `easy`, which
//! resolves to `easy.json` or `testset_easy.json` in the test-set
//! directory.

use anyhow::{bail, Context};
use std::path::{Path, PathBuf};

/// One prompt plus the metadata copied into its output row.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct Question {
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub expected_answer_description: Option<String>,
    #[serde(default)]
    pub max_output_tokens_hint: Option<u64>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub energy_relevance: Option<String>,
}

impl Question {
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    /// The prompt text. Present for every question of a loaded set.
    pub fn prompt(&self) -> &str {
        self.prompt.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestSet {
    pub id: Option<String>,
    pub name: Option<String>,
    pub goal: Option<String>,
    /// Free-form guidance for whoever runs the set.
    pub notes: Option<String>,
    pub questions: Vec<Question>,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum TestSetFile {
    List(Vec<Question>),
    Object {
        #[serde(default, deserialize_with = "scalar_as_string")]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        goal: Option<String>,
        #[serde(default)]
        notes_for_experimenter: Option<String>,
        questions: Vec<Question>,
    },
}

impl TestSet {
    /// A one-question set for `--prompt`.
    pub fn single(prompt: impl Into<String>) -> Self {
        Self {
            questions: vec![Question::from_prompt(prompt)],
            ..Self::default()
        }
    }

    /// Loads `arg` as a path if it names a file, otherwise as a set name
    /// looked up in `dir`.
    pub fn load(arg: &str, dir: &Path) -> anyhow::Result<Self> {
        Self::from_file(&resolve_path(arg, dir)?)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading test set {}", path.display()))?;
        let mut set = Self::from_json(&content)
            .with_context(|| format!("parsing test set {}", path.display()))?;
        if set.id.is_none() {
            set.id = path.file_stem().map(|s| s.to_string_lossy().into_owned());
        }
        Ok(set)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let file: TestSetFile = serde_json::from_str(json).context(
            "test set must be a list of questions or an object with a 'questions' array",
        )?;
        let set = match file {
            TestSetFile::List(questions) => Self {
                questions,
                ..Self::default()
            },
            TestSetFile::Object {
                id,
                name,
                goal,
                notes_for_experimenter,
                questions,
            } => Self {
                id,
                name,
                goal,
                notes: notes_for_experimenter,
                questions,
            },
        };

        if set.questions.is_empty() {
            bail!("test set contains no questions");
        }
        if let Some(i) = set.questions.iter().position(|q| q.prompt.is_none()) {
            bail!("question {} has no 'prompt' field", i + 1);
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }
}

/// Resolves a test-set argument to a file.
///
/// An existing path wins. Otherwise the lower-cased name, minus any
/// `.json`, is tried as `<name>.json` and then `testset_<name>.json`
/// under `dir`.
pub fn resolve_path(arg: &str, dir: &Path) -> anyhow::Result<PathBuf> {
    let direct = Path::new(arg);
    if direct.is_file() {
        return Ok(direct.to_path_buf());
    }

    let lower = arg.to_ascii_lowercase();
    let name = lower.strip_suffix(".json").unwrap_or(&lower);
    let mut candidates = vec![dir.join(format!("{name}.json"))];
    if !name.starts_with("testset_") {
        candidates.push(dir.join(format!("testset_{name}.json")));
    }
    if let Some(found) = candidates.into_iter().find(|c| c.is_file()) {
        return Ok(found);
    }

    let available = available(dir);
    if available.is_empty() {
        bail!("test set '{arg}' not found; {} has no test sets", dir.display());
    }
    bail!(
        "test set '{arg}' not found in {}. Available: {}",
        dir.display(),
        available.join(", ")
    )
}

/// Sorted file stems of the `.json` files in `dir`.
pub fn available(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut stems: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect();
    stems.sort();
    stems
}

/// Accepts string or numeric scalars.
fn scalar_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
