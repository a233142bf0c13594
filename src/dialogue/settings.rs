//! Generation configuration: the request body describing the conversation to build.
//!
//! Every field is optional on the wire and filled from the defaults below, so a
//! `{}` body is a valid (if bland) request. Shape checks run once, in
//! [`GenerationConfig::validate`]; the engine never re-defaults anything.

use serde::{Deserialize, Deserializer, Serialize};

use super::turn::Role;
use crate::llm::ModelSettings;

pub const DEFAULT_TURNS: usize = 8;
pub const MAX_TURNS: usize = 50;

/// How the conversation is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// One completion call for the whole conversation.
    #[default]
    Single,
    /// Two agents taking turns, one completion call per turn.
    Dual,
    /// Deprecated: a tutor-only and a student-only conversation interleaved.
    LegacyDual,
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationMode::Single => write!(f, "single"),
            GenerationMode::Dual => write!(f, "dual"),
            GenerationMode::LegacyDual => write!(f, "legacy_dual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordLimits {
    pub min: u32,
    pub target: u32,
    pub max: u32,
    #[serde(default)]
    pub style: String,
}

impl WordLimits {
    /// The allowed `[min, max]` range, widened by 20% of the target on both
    /// sides when variation is permitted.
    pub fn effective_range(&self, allow_variation: bool) -> (f64, f64) {
        let (min, max) = (self.min as f64, self.max as f64);
        if allow_variation {
            let slack = self.target as f64 * 0.2;
            ((min - slack).max(0.0), max + slack)
        } else {
            (min, max)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurposeSelection {
    #[serde(default)]
    pub selected: Vec<String>,
    #[serde(default)]
    pub custom: Vec<String>,
}

impl PurposeSelection {
    /// Built-in selections followed by custom ones, duplicates removed.
    pub fn allowed(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for p in self.selected.iter().chain(self.custom.iter()) {
            let p = p.trim();
            if !p.is_empty() && !out.iter().any(|x| x == p) {
                out.push(p.to_string());
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSettings {
    pub word_limits: WordLimits,
    pub purposes: PurposeSelection,
    pub persona: Option<String>,
}

/// Wire form of a role block: any subset of fields, laid over that role's
/// defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RoleOverride {
    word_limits: LimitsOverride,
    purposes: PurposesOverride,
    persona: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LimitsOverride {
    min: Option<u32>,
    target: Option<u32>,
    max: Option<u32>,
    style: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PurposesOverride {
    selected: Option<Vec<String>>,
    custom: Option<Vec<String>>,
}

impl RoleOverride {
    fn over(self, mut base: RoleSettings) -> RoleSettings {
        let limits = &mut base.word_limits;
        limits.min = self.word_limits.min.unwrap_or(limits.min);
        limits.target = self.word_limits.target.unwrap_or(limits.target);
        limits.max = self.word_limits.max.unwrap_or(limits.max);
        if let Some(style) = self.word_limits.style {
            limits.style = style;
        }
        if let Some(selected) = self.purposes.selected {
            base.purposes.selected = selected;
        }
        if let Some(custom) = self.purposes.custom {
            base.purposes.custom = custom;
        }
        if self.persona.is_some() {
            base.persona = self.persona;
        }
        base
    }
}

fn tutor_settings<'de, D: Deserializer<'de>>(d: D) -> Result<RoleSettings, D::Error> {
    Ok(RoleOverride::deserialize(d)?.over(RoleSettings::tutor_default()))
}

fn student_settings<'de, D: Deserializer<'de>>(d: D) -> Result<RoleSettings, D::Error> {
    Ok(RoleOverride::deserialize(d)?.over(RoleSettings::student_default()))
}

impl RoleSettings {
    fn tutor_default() -> Self {
        Self {
            word_limits: WordLimits {
                min: 15,
                target: 30,
                max: 50,
                style: "conversational".into(),
            },
            purposes: PurposeSelection {
                selected: [
                    "explanation",
                    "clarification",
                    "scaffolding",
                    "questioning",
                    "encouragement",
                    "feedback",
                ]
                .map(String::from)
                .to_vec(),
                custom: Vec::new(),
            },
            persona: None,
        }
    }

    fn student_default() -> Self {
        Self {
            word_limits: WordLimits {
                min: 5,
                target: 15,
                max: 30,
                style: "casual".into(),
            },
            purposes: PurposeSelection {
                selected: [
                    "question",
                    "clarification_request",
                    "confusion_expression",
                    "understanding_check",
                    "validation",
                    "reflection",
                ]
                .map(String::from)
                .to_vec(),
                custom: Vec::new(),
            },
            persona: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordCountPolicy {
    #[serde(default)]
    pub enforce: bool,
    #[serde(default = "default_true")]
    pub allow_variation: bool,
}

impl Default for WordCountPolicy {
    fn default() -> Self {
        Self {
            enforce: false,
            allow_variation: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Input describing the desired conversation. Read-only once validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_turns")]
    pub turns: usize,
    #[serde(default = "default_starter")]
    pub starter: Role,
    #[serde(default)]
    pub mode: GenerationMode,
    #[serde(default = "RoleSettings::tutor_default", deserialize_with = "tutor_settings")]
    pub tutor: RoleSettings,
    #[serde(
        default = "RoleSettings::student_default",
        deserialize_with = "student_settings"
    )]
    pub student: RoleSettings,
    #[serde(default)]
    pub word_count: WordCountPolicy,
    #[serde(default)]
    pub model: ModelSettings,
    /// Seeds purpose selection in dual-agent mode.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_subject() -> String {
    "general studies".to_string()
}

fn default_language() -> String {
    "English".to_string()
}

fn default_turns() -> usize {
    DEFAULT_TURNS
}

fn default_starter() -> Role {
    Role::Tutor
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            subject: default_subject(),
            grade_level: None,
            language: default_language(),
            turns: DEFAULT_TURNS,
            starter: Role::Tutor,
            mode: GenerationMode::default(),
            tutor: RoleSettings::tutor_default(),
            student: RoleSettings::student_default(),
            word_count: WordCountPolicy::default(),
            model: ModelSettings::default(),
            seed: None,
        }
    }
}

impl GenerationConfig {
    pub fn role(&self, role: Role) -> &RoleSettings {
        match role {
            Role::Tutor => &self.tutor,
            Role::Student => &self.student,
        }
    }

    /// Role acting at 0-based turn `index`: the starter on even indices.
    pub fn role_at(&self, index: usize) -> Role {
        let odd = index % 2 == 1;
        if odd ^ (self.starter == Role::Student) {
            Role::Student
        } else {
            Role::Tutor
        }
    }

    /// How many of the configured turns belong to `role`.
    pub fn turns_for(&self, role: Role) -> usize {
        (0..self.turns).filter(|&i| self.role_at(i) == role).count()
    }

    /// Shape checks applied at the request boundary.
    pub fn validate(&self) -> Result<(), String> {
        if self.turns == 0 || self.turns > MAX_TURNS {
            return Err(format!(
                "turns must be between 1 and {MAX_TURNS}, got {}",
                self.turns
            ));
        }
        if self.subject.trim().is_empty() {
            return Err("subject must not be empty".into());
        }
        if self.language.trim().is_empty() {
            return Err("language must not be empty".into());
        }
        for role in [Role::Tutor, Role::Student] {
            let limits = &self.role(role).word_limits;
            if limits.min > limits.target || limits.target > limits.max {
                return Err(format!(
                    "{role} word limits must satisfy min <= target <= max ({} / {} / {})",
                    limits.min, limits.target, limits.max
                ));
            }
        }
        Ok(())
    }

    /// Model identity, if one was configured.
    pub fn model_name(&self) -> Option<&str> {
        self.model.model.as_deref().filter(|m| !m.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_gets_documented_defaults() {
        let cfg: GenerationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.turns, 8);
        assert_eq!(cfg.starter, Role::Tutor);
        assert_eq!(cfg.tutor.word_limits.target, 30);
        assert_eq!(cfg.student.word_limits.target, 15);
        assert_eq!(cfg.language, "English");
        assert_eq!(cfg.mode, GenerationMode::Single);
        assert!(!cfg.word_count.enforce);
        assert!(cfg.word_count.allow_variation);
        assert!(cfg.model_name().is_none());
        assert_eq!(cfg, GenerationConfig::default());
    }

    #[test]
    fn partial_body_keeps_other_defaults() {
        let cfg: GenerationConfig = serde_json::from_str(
            r#"{"subject": "fractions", "turns": 4, "starter": "student", "mode": "dual",
                "model": {"model": "gpt-4o", "temperature": 0.5}}"#,
        )
        .unwrap();
        assert_eq!(cfg.subject, "fractions");
        assert_eq!(cfg.turns, 4);
        assert_eq!(cfg.starter, Role::Student);
        assert_eq!(cfg.mode, GenerationMode::Dual);
        assert_eq!(cfg.model_name(), Some("gpt-4o"));
        assert_eq!(cfg.student.word_limits.max, 30);
    }

    #[test]
    fn partial_role_blocks_keep_that_roles_defaults() {
        let cfg: GenerationConfig =
            serde_json::from_str(r#"{"tutor": {"persona": "patient"}}"#).unwrap();
        assert_eq!(cfg.tutor.persona.as_deref(), Some("patient"));
        assert_eq!(cfg.tutor.word_limits, GenerationConfig::default().tutor.word_limits);
        assert!(cfg.tutor.purposes.allowed().contains(&"scaffolding".to_string()));

        let cfg: GenerationConfig = serde_json::from_str(
            r#"{"student": {"word_limits": {"target": 20, "max": 40}, "purposes": {"custom": ["analogy"]}}}"#,
        )
        .unwrap();
        let limits = &cfg.student.word_limits;
        assert_eq!((limits.min, limits.target, limits.max), (5, 20, 40));
        assert_eq!(limits.style, "casual");
        assert!(cfg.student.purposes.selected.contains(&"question".to_string()));
        assert_eq!(cfg.student.purposes.custom, vec!["analogy"]);
        assert_eq!(cfg.tutor, GenerationConfig::default().tutor);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn stored_config_reads_back_unchanged() {
        let mut cfg = GenerationConfig::default();
        cfg.student.persona = Some("curious".into());
        cfg.tutor.purposes.custom = vec!["analogy".into()];
        let value = serde_json::to_value(&cfg).unwrap();
        let back: GenerationConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn role_parity_follows_starter() {
        let mut cfg = GenerationConfig::default();
        let roles: Vec<Role> = (0..4).map(|i| cfg.role_at(i)).collect();
        assert_eq!(roles, vec![Role::Tutor, Role::Student, Role::Tutor, Role::Student]);

        cfg.starter = Role::Student;
        let roles: Vec<Role> = (0..4).map(|i| cfg.role_at(i)).collect();
        assert_eq!(roles, vec![Role::Student, Role::Tutor, Role::Student, Role::Tutor]);
    }

    #[test]
    fn turns_for_splits_odd_counts_toward_starter() {
        let cfg = GenerationConfig {
            turns: 5,
            ..Default::default()
        };
        assert_eq!(cfg.turns_for(Role::Tutor), 3);
        assert_eq!(cfg.turns_for(Role::Student), 2);
    }

    #[test]
    fn validate_rejects_out_of_range_turns() {
        let cfg = GenerationConfig {
            turns: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = GenerationConfig {
            turns: MAX_TURNS + 1,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_word_limits() {
        let mut cfg = GenerationConfig::default();
        cfg.student.word_limits.min = 40;
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("student"));
    }

    #[test]
    fn effective_range_widens_by_twenty_percent_of_target() {
        let limits = WordLimits {
            min: 10,
            target: 20,
            max: 30,
            style: String::new(),
        };
        assert_eq!(limits.effective_range(false), (10.0, 30.0));
        assert_eq!(limits.effective_range(true), (6.0, 34.0));
    }

    #[test]
    fn allowed_purposes_merge_selected_and_custom() {
        let sel = PurposeSelection {
            selected: vec!["explanation".into(), "feedback".into()],
            custom: vec!["analogy".into(), "feedback".into(), " ".into()],
        };
        assert_eq!(sel.allowed(), vec!["explanation", "feedback", "analogy"]);
    }
}
