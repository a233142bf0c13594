use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::metrics::{
    PurposeIssue, QualityMetrics, WordCountReport, purpose_compliance, word_count_compliance,
};
use super::parser::{extract, extract_turn};
use super::prompt::PromptBuilder;
use super::purpose::AgentContext;
use super::settings::{GenerationConfig, GenerationMode};
use super::turn::{Role, Turn, turns_from_document};
use crate::error::GenerationError;
use crate::llm::{ChatMessage, CompletionClient, TokenUsage};

/// Finished conversation plus everything measured while producing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub conversation: Vec<Turn>,
    pub metadata: GenerationMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    pub mode: GenerationMode,
    pub model: String,
    pub requested_turns: usize,
    pub turn_count: usize,
    pub turn_shortfall: usize,
    pub llm_calls: u32,
    pub token_usage: TokenUsage,
    pub duration_ms: u64,
    pub quality: QualityMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count: Option<WordCountReport>,
    pub purpose_issues: Vec<PurposeIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose_history: Option<PurposeHistory>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurposeHistory {
    pub tutor: Vec<String>,
    pub student: Vec<String>,
}

/// Lifecycle of one dual-agent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Running { turn: usize },
    Completed,
    Failed,
}

/// Two agents taking turns over a shared history.
///
/// The session owns the purpose state and the transcript; the engine drives it
/// and performs the model calls in between `begin_turn` and `record`.
#[derive(Debug)]
pub struct DualAgentSession {
    tutor: AgentContext,
    student: AgentContext,
    turns: Vec<Turn>,
    total: usize,
    state: SessionState,
}

impl DualAgentSession {
    pub fn new(config: &GenerationConfig) -> Self {
        // Offset the student's seed so both agents don't mirror each other.
        let student_seed = config.seed.map(|s| s.wrapping_add(1));
        Self {
            tutor: AgentContext::new(Role::Tutor, config.tutor.purposes.allowed(), config.seed),
            student: AgentContext::new(
                Role::Student,
                config.student.purposes.allowed(),
                student_seed,
            ),
            turns: Vec::with_capacity(config.turns),
            total: config.turns,
            state: SessionState::NotStarted,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_done(&self) -> bool {
        self.turns.len() >= self.total
    }

    /// Moves to the next turn and picks the acting agent's purpose.
    pub fn begin_turn(&mut self, config: &GenerationConfig) -> (usize, Role, Option<String>) {
        let index = self.turns.len();
        self.state = SessionState::Running { turn: index };
        let role = config.role_at(index);
        let previous = self.turns.last().map(|t| t.content.as_str());
        let agent = match role {
            Role::Tutor => &mut self.tutor,
            Role::Student => &mut self.student,
        };
        let purpose = agent.select(previous);
        (index, role, purpose)
    }

    pub fn record(&mut self, turn: Turn) {
        self.turns.push(turn);
        if self.is_done() {
            self.state = SessionState::Completed;
        }
    }

    pub fn fail(&mut self) {
        self.state = SessionState::Failed;
    }

    pub fn finish(self) -> (Vec<Turn>, PurposeHistory) {
        let history = PurposeHistory {
            tutor: self.tutor.history().to_vec(),
            student: self.student.history().to_vec(),
        };
        (self.turns, history)
    }
}

#[derive(Debug, Default)]
struct CallStats {
    calls: u32,
    usage: TokenUsage,
}

/// Drives turn generation for all modes and measures the result.
pub struct ConversationEngine {
    client: Arc<dyn CompletionClient>,
    prompts: Arc<dyn PromptBuilder>,
}

impl ConversationEngine {
    pub fn new(client: Arc<dyn CompletionClient>, prompts: Arc<dyn PromptBuilder>) -> Self {
        Self { client, prompts }
    }

    /// Generates one conversation. The first error aborts the whole run.
    pub async fn generate(
        &self,
        config: &GenerationConfig,
    ) -> Result<GenerationOutcome, GenerationError> {
        config.validate().map_err(GenerationError::Config)?;
        let model = config
            .model_name()
            .ok_or_else(|| GenerationError::Config("a model must be specified".into()))?
            .to_string();

        info!(mode = %config.mode, model = %model, turns = config.turns, "generating conversation");
        let started = Instant::now();
        let mut stats = CallStats::default();

        let (conversation, purpose_history) = match config.mode {
            GenerationMode::Single => (self.run_single(config, &mut stats).await?, None),
            GenerationMode::Dual => {
                let (turns, history) = self.run_dual(config, &mut stats).await?;
                (turns, Some(history))
            }
            GenerationMode::LegacyDual => {
                warn!("legacy_dual mode is deprecated; prefer dual");
                (self.run_legacy_dual(config, &mut stats).await?, None)
            }
        };

        let word_count = word_count_compliance(&conversation, config);
        if let Some(report) = &word_count {
            if report.violation_count > 0 {
                warn!(
                    violations = report.violation_count,
                    "turns outside configured word limits"
                );
            }
        }
        let purpose_issues = purpose_compliance(&conversation, config);
        if !purpose_issues.is_empty() {
            warn!(issues = purpose_issues.len(), "turns with purposes outside the allow-list");
        }

        let metadata = GenerationMetadata {
            mode: config.mode,
            model,
            requested_turns: config.turns,
            turn_count: conversation.len(),
            turn_shortfall: config.turns.saturating_sub(conversation.len()),
            llm_calls: stats.calls,
            token_usage: stats.usage,
            duration_ms: whole_millis(started.elapsed()),
            quality: QualityMetrics::compute(&conversation),
            word_count,
            purpose_issues,
            purpose_history,
            generated_at: Utc::now(),
        };

        info!(
            turns = metadata.turn_count,
            calls = metadata.llm_calls,
            coherence = metadata.quality.coherence_score,
            "conversation generated"
        );
        Ok(GenerationOutcome {
            conversation,
            metadata,
        })
    }

    async fn call(
        &self,
        messages: Vec<ChatMessage>,
        config: &GenerationConfig,
        stats: &mut CallStats,
    ) -> Result<String, GenerationError> {
        stats.calls += 1;
        let completion = self.client.complete(messages, &config.model).await?;
        stats.usage.add(&completion.usage);
        Ok(completion.content)
    }

    async fn run_single(
        &self,
        config: &GenerationConfig,
        stats: &mut CallStats,
    ) -> Result<Vec<Turn>, GenerationError> {
        let messages = self.prompts.conversation_prompt(config);
        let raw = self.call(messages, config, stats).await?;
        let mut turns = parse_conversation(&raw)?;
        if turns.len() > config.turns {
            debug!(
                returned = turns.len(),
                requested = config.turns,
                "dropping surplus turns"
            );
            turns.truncate(config.turns);
        }
        Ok(turns)
    }

    async fn run_dual(
        &self,
        config: &GenerationConfig,
        stats: &mut CallStats,
    ) -> Result<(Vec<Turn>, PurposeHistory), GenerationError> {
        let mut session = DualAgentSession::new(config);
        while !session.is_done() {
            match self.dual_step(config, &mut session, stats).await {
                Ok(turn) => session.record(turn),
                Err(e) => {
                    let at = session.state();
                    session.fail();
                    warn!(error = %e, state = ?at, "dual-agent session failed");
                    return Err(e);
                }
            }
        }
        Ok(session.finish())
    }

    async fn dual_step(
        &self,
        config: &GenerationConfig,
        session: &mut DualAgentSession,
        stats: &mut CallStats,
    ) -> Result<Turn, GenerationError> {
        let (index, role, purpose) = session.begin_turn(config);
        debug!(index, %role, purpose = ?purpose, "generating turn");

        let messages =
            self.prompts
                .turn_prompt(config, role, purpose.as_deref(), session.history());
        let raw = self.call(messages, config, stats).await?;
        let value =
            extract_turn(&raw).map_err(|e| GenerationError::Extraction(e.to_string()))?;

        let mut turn = Turn::from_value(index, &with_role(value, role))?;
        if turn.purpose.is_none() {
            turn.purpose = purpose;
        }
        Ok(turn)
    }

    async fn run_legacy_dual(
        &self,
        config: &GenerationConfig,
        stats: &mut CallStats,
    ) -> Result<Vec<Turn>, GenerationError> {
        let mut sides = Vec::with_capacity(2);
        for role in [Role::Tutor, Role::Student] {
            let count = config.turns_for(role);
            if count == 0 {
                sides.push(Vec::new());
                continue;
            }
            let messages = self.prompts.single_role_prompt(config, role, count);
            let raw = self.call(messages, config, stats).await?;
            let mut turns = parse_conversation(&raw)?;
            for turn in &mut turns {
                turn.role = role;
            }
            sides.push(turns);
        }
        let student = sides.pop().unwrap_or_default();
        let tutor = sides.pop().unwrap_or_default();
        Ok(interleave(config.starter, tutor, student, config.turns))
    }
}

/// Elapsed milliseconds, saturating at `u64::MAX`.
fn whole_millis(elapsed: std::time::Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn parse_conversation(raw: &str) -> Result<Vec<Turn>, GenerationError> {
    let doc = extract(raw).map_err(|e| GenerationError::Extraction(e.to_string()))?;
    turns_from_document(&doc)
}

/// Stamps the acting agent's role onto a raw turn object.
fn with_role(mut value: Value, role: Role) -> Value {
    if let Some(obj) = value.as_object_mut() {
        obj.insert("role".into(), Value::String(role.to_string()));
    }
    value
}

/// Alternates the two sides starting with `starter`, falling back to whichever
/// side still has turns once the other runs out, up to `total` turns.
pub fn interleave(starter: Role, tutor: Vec<Turn>, student: Vec<Turn>, total: usize) -> Vec<Turn> {
    let mut tutor = tutor.into_iter();
    let mut student = student.into_iter();
    let mut out = Vec::with_capacity(total);
    let mut next = starter;

    while out.len() < total {
        let (primary, fallback) = match next {
            Role::Tutor => (&mut tutor, &mut student),
            Role::Student => (&mut student, &mut tutor),
        };
        match primary.next().or_else(|| fallback.next()) {
            Some(turn) => out.push(turn),
            None => break,
        }
        next = next.other();
    }
    out
}
