//! Tipos de dados para requisições e respostas da API de chat completions.
//!
//! A requisição é montada a partir de [`ModelSettings`]; o conjunto de campos
//! enviados depende do modelo (ver [`is_reasoning_model`]).

use serde::{Deserialize, Serialize};

/// Piso do orçamento de tokens para modelos de raciocínio.
pub const REASONING_MIN_COMPLETION_TOKENS: u32 = 4000;

/// Orçamento padrão para modelos de raciocínio quando nada é pedido.
pub const REASONING_DEFAULT_COMPLETION_TOKENS: u32 = 8000;

/// Orçamento padrão (`max_tokens`) para modelos comuns.
pub const STANDARD_DEFAULT_MAX_TOKENS: u32 = 4000;

const REASONING_MODEL_PREFIXES: &[&str] = &["o1", "o3", "o4", "gpt-5"];

/// Uma mensagem com papel (`system`, `user`, `assistant`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Nível de esforço aceito pelos modelos de raciocínio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    #[default]
    Medium,
    High,
}

/// Parâmetros de modelo vindos da configuração da geração.
///
/// Todos os campos são opcionais na entrada; `model` é exigido no momento
/// da execução e `api_key` cai no default do processo quando ausente.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub frequency_penalty: Option<f32>,
    #[serde(default)]
    pub presence_penalty: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub reasoning_effort: Option<ReasoningEffort>,
}

/// Formato de resposta pedido ao modelo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

/// Corpo da requisição para o endpoint de chat completions.
///
/// Os campos opcionais são omitidos do JSON quando `None`: enviar um campo do
/// conjunto errado para o modelo faz a API rejeitar a requisição.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
}

impl ChatRequest {
    /// Monta a requisição escolhendo o conjunto de parâmetros pelo modelo.
    pub fn build(model: &str, messages: Vec<ChatMessage>, settings: &ModelSettings) -> Self {
        let mut req = Self {
            model: model.to_string(),
            messages,
            response_format: ResponseFormat {
                format_type: "json_object".into(),
            },
            max_tokens: None,
            max_completion_tokens: None,
            reasoning_effort: None,
            temperature: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        };

        if is_reasoning_model(model) {
            let budget = settings
                .max_tokens
                .unwrap_or(REASONING_DEFAULT_COMPLETION_TOKENS)
                .max(REASONING_MIN_COMPLETION_TOKENS);
            req.max_completion_tokens = Some(budget);
            req.reasoning_effort = Some(settings.reasoning_effort.unwrap_or_default());
        } else {
            req.max_tokens = Some(settings.max_tokens.unwrap_or(STANDARD_DEFAULT_MAX_TOKENS));
            req.temperature = settings.temperature;
            req.top_p = settings.top_p;
            req.frequency_penalty = settings.frequency_penalty;
            req.presence_penalty = settings.presence_penalty;
        }
        req
    }
}

/// Indica se o modelo usa a superfície de parâmetros de raciocínio.
pub fn is_reasoning_model(model: &str) -> bool {
    let model = model.trim().to_ascii_lowercase();
    REASONING_MODEL_PREFIXES
        .iter()
        .any(|prefix| model.starts_with(prefix))
}

/// Resposta do endpoint de chat completions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Estatísticas de consumo de tokens para uma chamada.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Resultado normalizado de uma chamada bem-sucedida.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Texto bruto produzido pelo modelo.
    pub content: String,
    pub finish_reason: Option<String>,
    pub usage: TokenUsage,
}
