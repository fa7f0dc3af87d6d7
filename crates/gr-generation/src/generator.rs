//! Text-generation collaborator contract
//!
//! The network provider lives outside this workspace. Everything that
//! produces text implements [`TextGenerator`]; [`ScriptedGenerator`]
//! replays fixed responses for tests, demos and re-validation runs.

use crate::error::ScriptError;
use crate::prompt::PromptContext;
use gr_core::GenerationError;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Text returned by a generator plus its token usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutput {
    /// Generated text
    pub text: String,
    /// Prompt tokens billed
    pub input_tokens: u64,
    /// Completion tokens billed
    pub output_tokens: u64,
}

impl GenerationOutput {
    /// Output with token counts estimated from word counts
    #[must_use]
    pub fn estimated(prompt: &str, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            input_tokens: estimate_tokens(prompt),
            output_tokens: estimate_tokens(&text),
            text,
        }
    }
}

/// Rough token count: one per whitespace-separated word
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// Produces text for one rule of one entity
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for a rendered prompt
    ///
    /// # Errors
    /// Returns a [`GenerationError`]; only transient kinds are retried
    async fn generate(
        &self,
        prompt: &str,
        context: &PromptContext,
    ) -> Result<GenerationOutput, GenerationError>;

    /// Name used in logs
    fn name(&self) -> &str {
        "generator"
    }
}

type Scripted = Result<GenerationOutput, GenerationError>;

/// Generator that replays scripted responses
///
/// Responses are looked up by `"{entity}/{rule}"` first, then by
/// `"{rule}"`. Queued one-shot results (including errors) take priority
/// over the fixed responses, which makes retry paths testable.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: IndexMap<String, String>,
    queued: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    /// Create an empty script
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed response for a key (`rule` or `entity/rule`)
    #[must_use]
    pub fn with_response(mut self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.responses.insert(key.into(), text.into());
        self
    }

    /// Queue a one-shot error for a key
    #[must_use]
    pub fn with_error(self, key: impl Into<String>, error: GenerationError) -> Self {
        self.push(key, Err(error));
        self
    }

    /// Queue a one-shot result for a key
    pub fn push(&self, key: impl Into<String>, result: Result<GenerationOutput, GenerationError>) {
        self.queued.lock().entry(key.into()).or_default().push_back(result);
    }

    /// Parse a JSON object of `key -> text`
    ///
    /// # Errors
    /// Returns error if the JSON is not an object of strings
    pub fn from_json_str(json: &str) -> Result<Self, ScriptError> {
        let responses: IndexMap<String, String> = serde_json::from_str(json)?;
        Ok(Self {
            responses,
            ..Self::default()
        })
    }

    /// Load a JSON object of `key -> text` from disk
    ///
    /// # Errors
    /// Returns error if the file is unreadable or malformed
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Number of `generate` calls so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn take_queued(&self, keys: &[String]) -> Option<Scripted> {
        let mut queued = self.queued.lock();
        keys.iter()
            .find_map(|key| queued.get_mut(key).and_then(VecDeque::pop_front))
    }
}

#[async_trait::async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        context: &PromptContext,
    ) -> Result<GenerationOutput, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());

        let keys = [
            format!("{}/{}", context.entity, context.rule_id),
            context.rule_id.clone(),
        ];
        if let Some(result) = self.take_queued(&keys) {
            return result;
        }
        keys.iter()
            .find_map(|key| self.responses.get(key))
            .map(|text| GenerationOutput::estimated(prompt, text.clone()))
            .ok_or_else(|| {
                GenerationError::InvalidResponse(format!("no scripted response for `{}`", keys[0]))
            })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
