//! Purpose selection for the dual-agent mode.
//!
//! Each agent keeps its own usage history and avoids repeating a purpose until
//! its allow-list is exhausted. The previous turn's content biases the choice:
//! a question pulls toward clarifying/explaining (tutor) or clarifying/validating
//! (student), visible confusion pulls toward support.

use std::collections::HashSet;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::turn::Role;

const WH_WORDS: &[&str] = &["what", "why", "how", "when", "where", "who", "which"];

const CONFUSION_MARKERS: &[&str] = &[
    "confused",
    "confusing",
    "don't understand",
    "do not understand",
    "don't get",
    "not sure",
    "lost",
    "unclear",
    "doesn't make sense",
    "does not make sense",
    "stuck",
    "i'm not following",
    "hard to understand",
];

const TUTOR_QUESTION_FAMILY: &[&str] = &["clarif", "explan", "elaborat", "answer"];
const STUDENT_QUESTION_FAMILY: &[&str] = &["clarif", "validat", "confirm", "understanding"];
const SUPPORT_FAMILY: &[&str] = &[
    "support",
    "scaffold",
    "encourag",
    "reassur",
    "help",
    "confusion",
];

/// Signals read from the turn an agent is responding to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnSignals {
    pub question: bool,
    pub confusion: bool,
}

impl TurnSignals {
    pub fn detect(content: &str) -> Self {
        Self {
            question: detects_question(content),
            confusion: detects_confusion(content),
        }
    }
}

/// A `?` anywhere, or a wh-word as a standalone word.
pub fn detects_question(content: &str) -> bool {
    if content.contains('?') {
        return true;
    }
    content
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .any(|word| WH_WORDS.contains(&word.to_lowercase().as_str()))
}

pub fn detects_confusion(content: &str) -> bool {
    let lower = content.to_lowercase();
    CONFUSION_MARKERS.iter().any(|m| lower.contains(m))
}

fn in_family(purpose: &str, family: &[&str]) -> bool {
    let lower = purpose.to_lowercase();
    family.iter().any(|stem| lower.contains(stem))
}

/// One simulated participant's purpose state.
#[derive(Debug)]
pub struct AgentContext {
    role: Role,
    purposes: Vec<String>,
    used: HashSet<String>,
    history: Vec<String>,
    rng: StdRng,
}

impl AgentContext {
    pub fn new(role: Role, purposes: Vec<String>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            role,
            purposes,
            used: HashSet::new(),
            history: Vec::new(),
            rng,
        }
    }

    /// Purposes chosen so far, in order.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Picks the next purpose, or `None` when the allow-list is empty.
    pub fn select(&mut self, previous: Option<&str>) -> Option<String> {
        if self.purposes.is_empty() {
            return None;
        }

        let mut unused: Vec<&String> = self
            .purposes
            .iter()
            .filter(|p| !self.used.contains(*p))
            .collect();
        if unused.is_empty() {
            self.used.clear();
            unused = self.purposes.iter().collect();
        }

        let signals = previous.map(TurnSignals::detect).unwrap_or_default();
        let family = self.preferred_family(signals);
        let preferred: Vec<&String> = match family {
            Some(family) => unused
                .iter()
                .copied()
                .filter(|p| in_family(p, family))
                .collect(),
            None => Vec::new(),
        };

        let pool = if preferred.is_empty() { &unused } else { &preferred };
        let choice = pool.choose(&mut self.rng).map(|p| (*p).clone())?;

        self.used.insert(choice.clone());
        self.history.push(choice.clone());
        Some(choice)
    }

    fn preferred_family(&self, signals: TurnSignals) -> Option<&'static [&'static str]> {
        if signals.confusion {
            return Some(SUPPORT_FAMILY);
        }
        if signals.question {
            return Some(match self.role {
                Role::Tutor => TUTOR_QUESTION_FAMILY,
                Role::Student => STUDENT_QUESTION_FAMILY,
            });
        }
        None
    }
}
