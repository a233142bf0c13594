//! Prompt assembly. Templates are data; the builder only fills placeholders.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::settings::GenerationConfig;
use super::turn::{Role, Turn};
use crate::llm::ChatMessage;

/// Turns a configuration (plus per-turn context) into role-tagged messages.
pub trait PromptBuilder: Send + Sync {
    /// Whole conversation in one response.
    fn conversation_prompt(&self, config: &GenerationConfig) -> Vec<ChatMessage>;

    /// `count` turns spoken only by `role`.
    fn single_role_prompt(
        &self,
        config: &GenerationConfig,
        role: Role,
        count: usize,
    ) -> Vec<ChatMessage>;

    /// Exactly one next turn by `role`, given the history so far.
    fn turn_prompt(
        &self,
        config: &GenerationConfig,
        role: Role,
        purpose: Option<&str>,
        history: &[Turn],
    ) -> Vec<ChatMessage>;
}

const SYSTEM_TEMPLATE: &str = "You write realistic educational dialogues between a tutor and a student \
about {subject}{grade}. Write every utterance in {language}. \
Respond with a single JSON object and nothing else.";

const TURN_SCHEMA: &str = "{\"role\": \"tutor|student\", \"content\": \"...\", \"purpose\": \"...\", \
\"addresses_previous\": true, \"topic_transition\": \"smooth|natural|abrupt\", \"shows_learning\": false}";

const CONVERSATION_TEMPLATE: &str = "Write a conversation of exactly {turns} turns. \
The {starter} speaks first and the roles strictly alternate.\n\
{tutor_profile}\n{student_profile}\n\
Return {\"conversation\": [TURN, ...]} where each TURN is {schema}.";

const SINGLE_ROLE_TEMPLATE: &str = "Write exactly {count} consecutive utterances spoken only by the {role} \
in a lesson on {subject}. Each one should read as a reply to an unseen partner.\n\
{profile}\n\
Return {\"conversation\": [TURN, ...]} where each TURN is {schema} and role is always \"{role}\".";

const TURN_TEMPLATE: &str = "You are the {role}. Write the next single turn of the conversation below.\n\
{profile}\n\
{purpose_line}\
Conversation so far:\n{history}\n\
Return one TURN object: {schema}";

const PROFILE_TEMPLATE: &str = "The {role} uses a {style} style, about {target} words per turn \
(between {min} and {max}). Allowed purposes: {purposes}.{persona}";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("valid regex"));

/// Replaces each `{key}` in `template` with its value in one pass; inserted
/// values are never rescanned. Unknown keys are left as written.
fn render(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            vars.iter()
                .find(|(k, _)| *k == key)
                .map_or_else(|| caps[0].to_string(), |(_, v)| v.to_string())
        })
        .into_owned()
}

/// Default builder backed by the constant templates above.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplatePromptBuilder;

impl TemplatePromptBuilder {
    fn system(&self, config: &GenerationConfig) -> ChatMessage {
        let grade = config
            .grade_level
            .as_deref()
            .map(|g| format!(" for {g} learners"))
            .unwrap_or_default();
        ChatMessage::system(render(
            SYSTEM_TEMPLATE,
            &[
                ("subject", config.subject.as_str()),
                ("grade", grade.as_str()),
                ("language", config.language.as_str()),
            ],
        ))
    }

    fn profile(&self, config: &GenerationConfig, role: Role) -> String {
        let settings = config.role(role);
        let limits = &settings.word_limits;
        let style = if limits.style.is_empty() {
            "natural"
        } else {
            limits.style.as_str()
        };
        let allowed = settings.purposes.allowed();
        let purposes = if allowed.is_empty() {
            "any".to_string()
        } else {
            allowed.join(", ")
        };
        let persona = settings
            .persona
            .as_deref()
            .map(|p| format!(" Persona: {p}"))
            .unwrap_or_default();
        render(
            PROFILE_TEMPLATE,
            &[
                ("role", role.to_string().as_str()),
                ("style", style),
                ("target", limits.target.to_string().as_str()),
                ("min", limits.min.to_string().as_str()),
                ("max", limits.max.to_string().as_str()),
                ("purposes", purposes.as_str()),
                ("persona", persona.as_str()),
            ],
        )
    }
}

fn format_history(history: &[Turn]) -> String {
    if history.is_empty() {
        return "(nothing yet; you open the conversation)".to_string();
    }
    history
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

impl PromptBuilder for TemplatePromptBuilder {
    fn conversation_prompt(&self, config: &GenerationConfig) -> Vec<ChatMessage> {
        let user = render(
            CONVERSATION_TEMPLATE,
            &[
                ("turns", config.turns.to_string().as_str()),
                ("starter", config.starter.to_string().as_str()),
                ("tutor_profile", self.profile(config, Role::Tutor).as_str()),
                ("student_profile", self.profile(config, Role::Student).as_str()),
                ("schema", TURN_SCHEMA),
            ],
        );
        vec![self.system(config), ChatMessage::user(user)]
    }

    fn single_role_prompt(
        &self,
        config: &GenerationConfig,
        role: Role,
        count: usize,
    ) -> Vec<ChatMessage> {
        let user = render(
            SINGLE_ROLE_TEMPLATE,
            &[
                ("count", count.to_string().as_str()),
                ("subject", config.subject.as_str()),
                ("profile", self.profile(config, role).as_str()),
                ("schema", TURN_SCHEMA),
                ("role", role.to_string().as_str()),
            ],
        );
        vec![self.system(config), ChatMessage::user(user)]
    }

    fn turn_prompt(
        &self,
        config: &GenerationConfig,
        role: Role,
        purpose: Option<&str>,
        history: &[Turn],
    ) -> Vec<ChatMessage> {
        let purpose_line = purpose
            .map(|p| format!("The purpose of this turn is: {p}.\n"))
            .unwrap_or_default();
        let user = render(
            TURN_TEMPLATE,
            &[
                ("profile", self.profile(config, role).as_str()),
                ("purpose_line", purpose_line.as_str()),
                ("history", format_history(history).as_str()),
                ("schema", TURN_SCHEMA),
                ("role", role.to_string().as_str()),
            ],
        );
        vec![self.system(config), ChatMessage::user(user)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_fills_every_occurrence() {
        assert_eq!(render("{a}-{b}-{a}", &[("a", "x"), ("b", "y")]), "x-y-x");
    }

    #[test]
    fn render_does_not_expand_placeholders_inside_values() {
        let out = render(
            "{subject} in {language}",
            &[("subject", "sets like {language}"), ("language", "French")],
        );
        assert_eq!(out, "sets like {language} in French");
        assert_eq!(render("{missing}", &[]), "{missing}");
    }

    #[test]
    fn user_text_with_braces_reaches_the_prompt_verbatim() {
        let config = GenerationConfig {
            subject: "the {grade} of {language}".into(),
            grade_level: Some("5th grade".into()),
            ..Default::default()
        };
        let msgs = TemplatePromptBuilder.conversation_prompt(&config);
        assert!(msgs[0].content.contains("about the {grade} of {language} for 5th grade learners"));
    }

    #[test]
    fn conversation_prompt_embeds_turns_and_starter() {
        let config = GenerationConfig {
            subject: "photosynthesis".into(),
            turns: 6,
            starter: Role::Student,
            language: "Spanish".into(),
            ..Default::default()
        };
        let msgs = TemplatePromptBuilder.conversation_prompt(&config);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, "system");
        assert!(msgs[0].content.contains("photosynthesis"));
        assert!(msgs[0].content.contains("Spanish"));
        assert!(msgs[1].content.contains("exactly 6 turns"));
        assert!(msgs[1].content.contains("The student speaks first"));
        assert!(msgs[1].content.contains("scaffolding"));
    }

    #[test]
    fn turn_prompt_carries_history_and_purpose() {
        let config = GenerationConfig::default();
        let history = vec![Turn::new(Role::Tutor, "What do you know about atoms?")];
        let msgs =
            TemplatePromptBuilder.turn_prompt(&config, Role::Student, Some("question"), &history);
        let user = &msgs[1].content;
        assert!(user.contains("You are the student"));
        assert!(user.contains("tutor: What do you know about atoms?"));
        assert!(user.contains("The purpose of this turn is: question."));
    }

    #[test]
    fn single_role_prompt_pins_the_role() {
        let config = GenerationConfig::default();
        let msgs = TemplatePromptBuilder.single_role_prompt(&config, Role::Tutor, 4);
        assert!(msgs[1].content.contains("exactly 4 consecutive utterances"));
        assert!(msgs[1].content.contains("role is always \"tutor\""));
    }

    #[test]
    fn persona_and_grade_are_optional() {
        let mut config = GenerationConfig::default();
        config.grade_level = Some("7th grade".into());
        config.tutor.persona = Some("patient and upbeat".into());
        let msgs = TemplatePromptBuilder.conversation_prompt(&config);
        assert!(msgs[0].content.contains("for 7th grade learners"));
        assert!(msgs[1].content.contains("Persona: patient and upbeat"));
    }
}
