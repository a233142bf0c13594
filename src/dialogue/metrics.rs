//! Post-hoc quality metrics over a finished conversation.
//!
//! Nothing here gates a generation: low scores and compliance issues are
//! recorded in metadata and returned, never raised.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::settings::GenerationConfig;
use super::turn::{Role, Turn};

/// Denominator of the purpose variety score.
const VARIETY_TARGET: f64 = 8.0;

const DISRUPTIVE_TRANSITIONS: &[&str] = &["abrupt", "disruptive", "off_topic", "off-topic"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub coherence_score: u32,
    pub question_response_rate: u32,
    pub purpose_fulfillment: PurposeFulfillment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurposeFulfillment {
    pub variety_score: u32,
    pub balance_score: u32,
    pub overall_score: u32,
    pub tutor_purposes_used: usize,
    pub student_purposes_used: usize,
}

impl QualityMetrics {
    pub fn compute(turns: &[Turn]) -> Self {
        Self {
            coherence_score: coherence_score(turns),
            question_response_rate: question_response_rate(turns),
            purpose_fulfillment: purpose_fulfillment(turns),
        }
    }
}

fn percent(num: usize, den: usize) -> u32 {
    if den == 0 {
        return 100;
    }
    (num as f64 / den as f64 * 100.0).round() as u32
}

/// Share of satisfied sub-checks across all transitions.
///
/// Every transition checks "addresses the previous turn" and "smooth topic
/// transition"; student turns additionally check "shows learning".
pub fn coherence_score(turns: &[Turn]) -> u32 {
    let mut satisfied = 0;
    let mut checks = 0;

    for turn in turns.iter().skip(1) {
        checks += 1;
        if turn.addresses_previous == Some(true) {
            satisfied += 1;
        }

        checks += 1;
        let disruptive = turn
            .topic_transition
            .as_deref()
            .map(|t| DISRUPTIVE_TRANSITIONS.contains(&t.to_lowercase().as_str()))
            .unwrap_or(false);
        if !disruptive {
            satisfied += 1;
        }

        if turn.role == Role::Student {
            checks += 1;
            if turn.shows_learning == Some(true) {
                satisfied += 1;
            }
        }
    }

    percent(satisfied, checks)
}

/// Of tutor turns that follow a question, the share flagged as addressing it.
/// 100 when nobody asked anything.
pub fn question_response_rate(turns: &[Turn]) -> u32 {
    let mut asked = 0;
    let mut answered = 0;
    for pair in turns.windows(2) {
        let (prev, turn) = (&pair[0], &pair[1]);
        if turn.role == Role::Tutor && prev.is_question() {
            asked += 1;
            if turn.addresses_previous == Some(true) {
                answered += 1;
            }
        }
    }
    percent(answered, asked)
}

fn purpose_counts(turns: &[Turn], role: Role) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for turn in turns.iter().filter(|t| t.role == role) {
        if let Some(p) = turn.purpose.as_deref() {
            *counts.entry(p).or_insert(0) += 1;
        }
    }
    counts
}

/// Normalized Shannon entropy of a usage distribution, 0..=1.
/// A single distinct purpose (or none) scores 0.
fn normalized_entropy(counts: &HashMap<&str, usize>) -> f64 {
    let distinct = counts.len();
    if distinct < 2 {
        return 0.0;
    }
    let total: usize = counts.values().sum();
    let entropy: f64 = counts
        .values()
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.ln()
        })
        .sum();
    entropy / (distinct as f64).ln()
}

pub fn purpose_fulfillment(turns: &[Turn]) -> PurposeFulfillment {
    let tutor = purpose_counts(turns, Role::Tutor);
    let student = purpose_counts(turns, Role::Student);

    let distinct = (tutor.len() + student.len()) as f64;
    let variety = (distinct / VARIETY_TARGET * 100.0).min(100.0).round() as u32;

    let spoken: Vec<&HashMap<&str, usize>> = [&tutor, &student]
        .into_iter()
        .filter(|c| !c.is_empty())
        .collect();
    let balance = if spoken.is_empty() {
        0
    } else {
        let sum: f64 = spoken.iter().map(|c| normalized_entropy(c)).sum();
        (sum / spoken.len() as f64 * 100.0).round() as u32
    };

    PurposeFulfillment {
        variety_score: variety,
        balance_score: balance,
        overall_score: ((variety + balance) as f64 / 2.0).round() as u32,
        tutor_purposes_used: tutor.len(),
        student_purposes_used: student.len(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordCountViolation {
    pub turn_index: usize,
    pub role: Role,
    pub word_count: usize,
    pub allowed_min: f64,
    pub allowed_max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordCountReport {
    pub enforced: bool,
    pub violation_count: usize,
    pub violations: Vec<WordCountViolation>,
    pub tutor_average: f64,
    pub student_average: f64,
}

/// Records every turn outside its role's effective word range.
/// Returns `None` when the configuration does not enforce limits.
pub fn word_count_compliance(turns: &[Turn], config: &GenerationConfig) -> Option<WordCountReport> {
    if !config.word_count.enforce {
        return None;
    }

    let mut violations = Vec::new();
    let mut totals: HashMap<Role, (usize, usize)> = HashMap::new();

    for (i, turn) in turns.iter().enumerate() {
        let (min, max) = config
            .role(turn.role)
            .word_limits
            .effective_range(config.word_count.allow_variation);
        let words = turn.word_count as f64;
        if words < min || words > max {
            violations.push(WordCountViolation {
                turn_index: i,
                role: turn.role,
                word_count: turn.word_count,
                allowed_min: min,
                allowed_max: max,
            });
        }
        let entry = totals.entry(turn.role).or_insert((0, 0));
        entry.0 += turn.word_count;
        entry.1 += 1;
    }

    let average = |role: Role| {
        totals
            .get(&role)
            .map(|&(sum, n)| ((sum as f64 / n as f64) * 10.0).round() / 10.0)
            .unwrap_or(0.0)
    };

    Some(WordCountReport {
        enforced: true,
        violation_count: violations.len(),
        tutor_average: average(Role::Tutor),
        student_average: average(Role::Student),
        violations,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurposeIssue {
    pub turn_index: usize,
    pub role: Role,
    pub purpose: Option<String>,
}

/// Turns whose purpose is missing from their role's allow-list.
///
/// An empty allow-list means the role is unrestricted.
pub fn purpose_compliance(turns: &[Turn], config: &GenerationConfig) -> Vec<PurposeIssue> {
    let tutor = config.tutor.purposes.allowed();
    let student = config.student.purposes.allowed();

    turns
        .iter()
        .enumerate()
        .filter_map(|(i, turn)| {
            let allowed = match turn.role {
                Role::Tutor => &tutor,
                Role::Student => &student,
            };
            if allowed.is_empty() {
                return None;
            }
            let ok = turn
                .purpose
                .as_ref()
                .map(|p| allowed.contains(p))
                .unwrap_or(false);
            (!ok).then(|| PurposeIssue {
                turn_index: i,
                role: turn.role,
                purpose: turn.purpose.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: Role, content: &str) -> Turn {
        Turn::new(role, content)
    }

    fn flagged(role: Role, content: &str, addresses: bool, learning: bool) -> Turn {
        let mut t = Turn::new(role, content);
        t.addresses_previous = Some(addresses);
        t.shows_learning = Some(learning);
        t.topic_transition = Some("smooth".into());
        t
    }

    #[test]
    fn single_turn_coherence_is_100() {
        assert_eq!(coherence_score(&[turn(Role::Tutor, "Hello")]), 100);
        assert_eq!(coherence_score(&[]), 100);
    }

    #[test]
    fn coherence_counts_each_sub_check() {
        let turns = vec![
            turn(Role::Tutor, "Let's talk about fractions."),
            // student: addresses(1/1) smooth(1/1) learning(0/1)
            flagged(Role::Student, "Okay", true, false),
            // tutor: addresses(0/1) abrupt(0/1)
            {
                let mut t = flagged(Role::Tutor, "Anyway, volcanoes.", false, false);
                t.topic_transition = Some("abrupt".into());
                t
            },
        ];
        // 2 satisfied out of 5 checks.
        assert_eq!(coherence_score(&turns), 40);
    }

    #[test]
    fn question_response_rate_defaults_to_100() {
        let turns = vec![turn(Role::Tutor, "Fractions."), turn(Role::Student, "Okay.")];
        assert_eq!(question_response_rate(&turns), 100);
    }

    #[test]
    fn question_response_rate_counts_tutor_answers() {
        let turns = vec![
            turn(Role::Student, "What is a numerator?"),
            flagged(Role::Tutor, "The top number.", true, false),
            turn(Role::Student, "Why is it on top?"),
            flagged(Role::Tutor, "Let's move on.", false, false),
        ];
        assert_eq!(question_response_rate(&turns), 50);
    }

    #[test]
    fn purpose_fulfillment_uses_entropy_for_balance() {
        let turns = vec![
            turn(Role::Tutor, "a").with_purpose("explanation"),
            turn(Role::Student, "b").with_purpose("question"),
            turn(Role::Tutor, "c").with_purpose("feedback"),
            turn(Role::Student, "d").with_purpose("question"),
        ];
        let pf = purpose_fulfillment(&turns);
        assert_eq!(pf.tutor_purposes_used, 2);
        assert_eq!(pf.student_purposes_used, 1);
        // 3 distinct / 8
        assert_eq!(pf.variety_score, 38);
        // tutor perfectly balanced (1.0), student single purpose (0.0)
        assert_eq!(pf.balance_score, 50);
        assert_eq!(pf.overall_score, 44);
    }

    #[test]
    fn variety_is_capped() {
        let turns: Vec<Turn> = (0..10)
            .map(|i| turn(Role::Tutor, "x").with_purpose(format!("p{i}")))
            .collect();
        let pf = purpose_fulfillment(&turns);
        assert_eq!(pf.variety_score, 100);
        assert_eq!(pf.balance_score, 100);
    }

    #[test]
    fn word_count_violations_are_recorded_not_dropped() {
        let mut config = GenerationConfig::default();
        config.word_count.enforce = true;
        config.word_count.allow_variation = false;
        // student limits 5..=30
        let turns = vec![
            turn(Role::Student, "too short"),
            turn(Role::Student, "this one has exactly six words"),
        ];
        let report = word_count_compliance(&turns, &config).unwrap();
        assert_eq!(report.violation_count, 1);
        assert_eq!(report.violations[0].turn_index, 0);
        assert_eq!(report.violations[0].allowed_min, 5.0);
        assert_eq!(report.student_average, 4.0);
    }

    #[test]
    fn variation_widens_the_range() {
        let mut config = GenerationConfig::default();
        config.word_count.enforce = true;
        // student target 15 → slack 3 → [2, 33]
        let turns = vec![turn(Role::Student, "only three words")];
        let report = word_count_compliance(&turns, &config).unwrap();
        assert_eq!(report.violation_count, 0);
    }

    #[test]
    fn word_count_not_checked_unless_enforced() {
        let config = GenerationConfig::default();
        assert!(word_count_compliance(&[turn(Role::Tutor, "x")], &config).is_none());
    }

    #[test]
    fn purpose_compliance_flags_unknown_and_missing() {
        let mut config = GenerationConfig::default();
        config.tutor.purposes.custom.push("analogy".into());
        let turns = vec![
            turn(Role::Tutor, "a").with_purpose("analogy"),
            turn(Role::Student, "b").with_purpose("daydreaming"),
            turn(Role::Tutor, "c"),
        ];
        let issues = purpose_compliance(&turns, &config);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].turn_index, 1);
        assert_eq!(issues[0].purpose.as_deref(), Some("daydreaming"));
        assert_eq!(issues[1].turn_index, 2);
        assert!(issues[1].purpose.is_none());
    }

    #[test]
    fn empty_allow_list_is_unrestricted() {
        let mut config = GenerationConfig::default();
        config.student.purposes.selected.clear();
        let turns = vec![turn(Role::Student, "b").with_purpose("anything")];
        assert!(purpose_compliance(&turns, &config).is_empty());
    }
}
