use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GenerationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Tutor,
    Student,
}

impl Role {
    pub fn other(self) -> Role {
        match self {
            Role::Tutor => Role::Student,
            Role::Student => Role::Tutor,
        }
    }

    fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tutor" => Some(Role::Tutor),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Tutor => write!(f, "tutor"),
            Role::Student => write!(f, "student"),
        }
    }
}

/// One utterance. Immutable once appended to a conversation.
///
/// The coherence flags are whatever the model self-reported; they are advisory
/// and only feed the quality metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    pub word_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses_previous: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_transition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shows_learning: Option<bool>,
}

/// Whitespace-delimited token count.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            role,
            word_count: count_words(&content),
            content,
            purpose: None,
            addresses_previous: None,
            topic_transition: None,
            shows_learning: None,
        }
    }

    #[cfg(test)]
    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    /// Validates one raw turn object from model output.
    ///
    /// `role` must be `tutor` or `student` and `content` non-empty; a missing
    /// `word_count` is computed from the content.
    pub fn from_value(index: usize, value: &Value) -> Result<Turn, GenerationError> {
        let invalid = |reason: &str| GenerationError::InvalidTurn {
            index,
            reason: reason.to_string(),
        };

        let obj = value.as_object().ok_or_else(|| invalid("not an object"))?;

        let role_str = obj
            .get("role")
            .and_then(Value::as_str)
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| invalid("missing role"))?;
        let role = Role::parse(role_str)
            .ok_or_else(|| invalid(&format!("unknown role '{role_str}'")))?;

        let content = obj
            .get("content")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| invalid("missing or empty content"))?
            .to_string();

        let word_count = obj
            .get("word_count")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or_else(|| count_words(&content));

        Ok(Turn {
            role,
            word_count,
            purpose: string_field(obj, "purpose"),
            addresses_previous: obj.get("addresses_previous").and_then(Value::as_bool),
            topic_transition: string_field(obj, "topic_transition"),
            shows_learning: obj.get("shows_learning").and_then(Value::as_bool),
            content,
        })
    }

    pub fn is_question(&self) -> bool {
        super::purpose::detects_question(&self.content)
    }
}

fn string_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Validates an extracted `{conversation: [...]}` document into turns.
///
/// The whole response is rejected when the array is empty or any turn fails.
pub fn turns_from_document(doc: &Value) -> Result<Vec<Turn>, GenerationError> {
    let items = doc
        .get("conversation")
        .and_then(Value::as_array)
        .ok_or_else(|| GenerationError::Extraction("no conversation array".into()))?;
    if items.is_empty() {
        return Err(GenerationError::EmptyConversation);
    }
    items
        .iter()
        .enumerate()
        .map(|(i, v)| Turn::from_value(i, v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn word_count_is_computed_when_absent() {
        let turn = Turn::from_value(0, &json!({"role": "tutor", "content": "  two   words "})).unwrap();
        assert_eq!(turn.word_count, 2);
        assert_eq!(turn.content, "two   words");
    }

    #[test]
    fn reported_word_count_is_kept() {
        let turn = Turn::from_value(
            0,
            &json!({"role": "Student", "content": "hello there", "word_count": 7, "purpose": "question"}),
        )
        .unwrap();
        assert_eq!(turn.role, Role::Student);
        assert_eq!(turn.word_count, 7);
        assert_eq!(turn.purpose.as_deref(), Some("question"));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = Turn::from_value(4, &json!({"role": "professor", "content": "hi"})).unwrap_err();
        match err {
            GenerationError::InvalidTurn { index, reason } => {
                assert_eq!(index, 4);
                assert!(reason.contains("professor"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_content_is_rejected() {
        assert!(Turn::from_value(0, &json!({"role": "tutor", "content": "   "})).is_err());
        assert!(Turn::from_value(0, &json!({"role": "", "content": "x"})).is_err());
    }

    #[test]
    fn document_with_empty_array_is_rejected() {
        let err = turns_from_document(&json!({"conversation": []})).unwrap_err();
        assert!(matches!(err, GenerationError::EmptyConversation));
    }

    #[test]
    fn one_bad_turn_rejects_the_document() {
        let doc = json!({"conversation": [
            {"role": "tutor", "content": "Hi"},
            {"role": "student"}
        ]});
        assert!(matches!(
            turns_from_document(&doc),
            Err(GenerationError::InvalidTurn { index: 1, .. })
        ));
    }

    #[test]
    fn coherence_flags_are_read() {
        let turn = Turn::from_value(
            1,
            &json!({"role": "student", "content": "Oh I see", "addresses_previous": true,
                    "topic_transition": "smooth", "shows_learning": true}),
        )
        .unwrap();
        assert_eq!(turn.addresses_previous, Some(true));
        assert_eq!(turn.topic_transition.as_deref(), Some("smooth"));
        assert_eq!(turn.shows_learning, Some(true));
    }

    #[test]
    fn role_other() {
        assert_eq!(Role::Tutor.other(), Role::Student);
        assert_eq!(Role::Student.to_string(), "student");
    }
}
