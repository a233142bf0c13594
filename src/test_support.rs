//! Scripted collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::dialogue::GenerationConfig;
use crate::llm::{ChatMessage, Completion, CompletionClient, LlmError, ModelSettings, TokenUsage};
use crate::orchestrator::{BackgroundTask, TaskSpawner};

/// Replays a fixed list of responses, one per call, and records every request.
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<Completion, LlmError>>>,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<Result<Completion, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(texts: &[String]) -> Self {
        Self::new(texts.iter().map(|t| Ok(completion(t))).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        _settings: &ModelSettings,
    ) -> Result<Completion, LlmError> {
        self.requests.lock().unwrap().push(messages);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::ResponseFormat("script exhausted".into())))
    }
}

pub fn completion(text: &str) -> Completion {
    Completion {
        content: text.to_string(),
        finish_reason: Some("stop".into()),
        usage: TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        },
    }
}

/// A well-formed single-agent response with `n` alternating turns.
pub fn conversation_json(n: usize, starter: &str) -> String {
    let other = if starter == "tutor" { "student" } else { "tutor" };
    let turns: Vec<_> = (0..n)
        .map(|i| {
            let role = if i % 2 == 0 { starter } else { other };
            json!({
                "role": role,
                "content": format!("{role} says something useful number {i}"),
                "purpose": if role == "tutor" { "explanation" } else { "question" },
            })
        })
        .collect();
    json!({ "conversation": turns }).to_string()
}

/// A single-turn response body.
pub fn turn_json(role: &str, content: &str) -> String {
    json!({"role": role, "content": content, "addresses_previous": true}).to_string()
}

/// Holds spawned tasks until the test runs them.
#[derive(Default)]
pub struct DeferredSpawner {
    tasks: Mutex<Vec<BackgroundTask>>,
}

impl DeferredSpawner {
    pub fn pending(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub async fn run_all(&self) {
        let tasks: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
        for task in tasks {
            task.await;
        }
    }
}

impl TaskSpawner for DeferredSpawner {
    fn spawn(&self, task: BackgroundTask) {
        self.tasks.lock().unwrap().push(task);
    }
}

/// A runnable configuration: model and key set, everything else default.
pub fn model_config(turns: usize) -> GenerationConfig {
    GenerationConfig {
        turns,
        model: ModelSettings {
            model: Some("gpt-4o-mini".into()),
            api_key: Some("sk-test".into()),
            ..ModelSettings::default()
        },
        ..GenerationConfig::default()
    }
}
