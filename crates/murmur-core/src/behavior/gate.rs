//! Content policy check applied to generated text before publish.
//!
//! Rules come from the persona's `EthicalFramework` plus an optional built-in
//! baseline. Every rule is matched case-insensitively; a configured entry that
//! is not a valid regular expression is matched as a literal phrase.

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use murmur_types::action::ActionKind;
use murmur_types::agent::{EthicalFramework, TopicHandling};

/// Which rule family produced an issue. Each maps to one fixed suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    EthicalBoundary,
    ContentRestriction,
    SensitiveTopic,
    Profanity,
    HateSpeech,
    PersonalInfo,
}

impl IssueCategory {
    pub fn suggestion(&self) -> &'static str {
        match self {
            IssueCategory::EthicalBoundary => "Consider rephrasing to align with ethical guidelines",
            IssueCategory::ContentRestriction => "Remove or modify restricted content",
            IssueCategory::SensitiveTopic => "Use more careful language around sensitive topics",
            IssueCategory::Profanity => "Remove or replace inappropriate language",
            IssueCategory::HateSpeech => "Use more inclusive and respectful language",
            IssueCategory::PersonalInfo => "Remove personal or sensitive information",
        }
    }
}

/// Outcome of a content check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentCheck {
    /// True iff no blocking issue was found.
    pub approved: bool,
    pub issues: Vec<String>,
    /// One per issue category, in first-seen order.
    pub suggestions: Vec<String>,
    /// Non-blocking findings (`careful` topics).
    pub warnings: Vec<String>,
    pub content_type: ActionKind,
}

struct Rule {
    source: String,
    regex: Regex,
}

struct BaselinePattern {
    name: &'static str,
    category: IssueCategory,
    regex: Regex,
}

/// Per-agent content gate. Stateless after construction.
pub struct ContentGate {
    boundaries: Vec<Rule>,
    restrictions: Vec<Rule>,
    topics: Vec<(Rule, TopicHandling)>,
    baseline: Vec<BaselinePattern>,
}

impl ContentGate {
    /// Compile the persona's rules. `baseline` adds the built-in patterns.
    pub fn new(framework: &EthicalFramework, baseline: bool) -> Self {
        let boundaries = framework
            .ethical_boundaries
            .iter()
            .filter_map(|p| compile_rule(p))
            .collect();
        let restrictions = framework
            .content_restrictions
            .iter()
            .filter_map(|p| compile_rule(p))
            .collect();
        let topics = framework
            .sensitive_topics
            .iter()
            .filter_map(|(topic, handling)| Some((compile_rule(topic)?, *handling)))
            .collect();

        Self {
            boundaries,
            restrictions,
            topics,
            baseline: if baseline { baseline_patterns() } else { Vec::new() },
        }
    }

    /// Evaluate `text`: boundaries, restrictions, sensitive topics, then
    /// the baseline patterns.
    pub fn check_content(&self, text: &str, content_type: ActionKind) -> ContentCheck {
        let mut issues = Vec::new();
        let mut categories: Vec<IssueCategory> = Vec::new();
        let mut warnings = Vec::new();

        let mut flag = |issue: String, category: IssueCategory| {
            issues.push(issue);
            if !categories.contains(&category) {
                categories.push(category);
            }
        };

        for rule in &self.boundaries {
            if rule.regex.is_match(text) {
                flag(
                    format!("Violates ethical boundary: {}", rule.source),
                    IssueCategory::EthicalBoundary,
                );
            }
        }

        for rule in &self.restrictions {
            if rule.regex.is_match(text) {
                flag(
                    format!("Violates content restriction: {}", rule.source),
                    IssueCategory::ContentRestriction,
                );
            }
        }

        for (rule, handling) in &self.topics {
            if !rule.regex.is_match(text) {
                continue;
            }
            match handling {
                TopicHandling::Avoid => flag(
                    format!("Contains sensitive topic to avoid: {}", rule.source),
                    IssueCategory::SensitiveTopic,
                ),
                TopicHandling::Careful => {
                    tracing::warn!(topic = %rule.source, %content_type, "content contains sensitive topic");
                    warnings.push(format!("Contains sensitive topic: {}", rule.source));
                }
            }
        }

        for pattern in &self.baseline {
            if pattern.regex.is_match(text) {
                flag(format!("Contains {}", pattern.name), pattern.category);
            }
        }

        ContentCheck {
            approved: issues.is_empty(),
            suggestions: categories.iter().map(|c| c.suggestion().to_string()).collect(),
            issues,
            warnings,
            content_type,
        }
    }
}

fn compile_rule(pattern: &str) -> Option<Rule> {
    let regex = case_insensitive(pattern)
        .or_else(|e| {
            tracing::debug!(pattern, error = %e, "not a valid pattern, matching as literal phrase");
            case_insensitive(&regex::escape(pattern))
        })
        .map_err(|e| tracing::warn!(pattern, error = %e, "skipping content rule"))
        .ok()?;
    Some(Rule {
        source: pattern.to_string(),
        regex,
    })
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

fn baseline_patterns() -> Vec<BaselinePattern> {
    let defs: [(&str, IssueCategory, &str); 3] = [
        (
            "profanity",
            IssueCategory::Profanity,
            r"\b(fuck\w*|shit\w*|bitch\w*|bastard|asshole|dickhead)\b",
        ),
        (
            "hate_speech",
            IssueCategory::HateSpeech,
            r"\b(subhuman|vermin|inferior race|go back to your country)\b",
        ),
        (
            "personal_info",
            IssueCategory::PersonalInfo,
            r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b",
        ),
    ];

    defs.into_iter()
        .filter_map(|(name, category, pattern)| match case_insensitive(pattern) {
            Ok(regex) => Some(BaselinePattern {
                name,
                category,
                regex,
            }),
            Err(e) => {
                tracing::error!(name, error = %e, "invalid built-in content pattern");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn framework() -> EthicalFramework {
        EthicalFramework {
            ethical_boundaries: vec!["foo".to_string()],
            content_restrictions: vec![r"crypto\s+giveaway".to_string()],
            sensitive_topics: BTreeMap::from([
                ("politics".to_string(), TopicHandling::Avoid),
                ("health".to_string(), TopicHandling::Careful),
            ]),
        }
    }

    #[test]
    fn boundary_matches_case_insensitively() {
        let gate = ContentGate::new(&framework(), false);
        let check = gate.check_content("this mentions FOO here", ActionKind::Tweet);
        assert!(!check.approved);
        assert_eq!(check.issues, vec!["Violates ethical boundary: foo"]);
        assert_eq!(
            check.suggestions,
            vec!["Consider rephrasing to align with ethical guidelines"]
        );
    }

    #[test]
    fn clean_text_is_approved() {
        let gate = ContentGate::new(&framework(), true);
        let check = gate.check_content("lovely sunset over the bay", ActionKind::Reply);
        assert!(check.approved);
        assert!(check.issues.is_empty());
        assert!(check.suggestions.is_empty());
        assert_eq!(check.content_type, ActionKind::Reply);
    }

    #[test]
    fn restriction_uses_regex() {
        let gate = ContentGate::new(&framework(), false);
        let check = gate.check_content("Huge CRYPTO   giveaway now", ActionKind::Tweet);
        assert!(!check.approved);
        assert!(check.issues[0].starts_with("Violates content restriction"));
        assert_eq!(check.suggestions, vec!["Remove or modify restricted content"]);
    }

    #[test]
    fn avoid_topic_blocks_and_careful_topic_warns() {
        let gate = ContentGate::new(&framework(), false);

        let blocked = gate.check_content("let's talk politics", ActionKind::Tweet);
        assert!(!blocked.approved);
        assert_eq!(blocked.issues, vec!["Contains sensitive topic to avoid: politics"]);

        let warned = gate.check_content("health tips for winter", ActionKind::Tweet);
        assert!(warned.approved);
        assert_eq!(warned.warnings, vec!["Contains sensitive topic: health"]);
    }

    #[test]
    fn baseline_detects_phone_numbers() {
        let gate = ContentGate::new(&EthicalFramework::default(), true);
        let check = gate.check_content("call me at 555-123-4567", ActionKind::Reply);
        assert!(!check.approved);
        assert_eq!(check.issues, vec!["Contains personal_info"]);
        assert_eq!(check.suggestions, vec!["Remove personal or sensitive information"]);
    }

    #[test]
    fn baseline_can_be_disabled() {
        let gate = ContentGate::new(&EthicalFramework::default(), false);
        assert!(gate.check_content("call me at 555-123-4567", ActionKind::Reply).approved);
    }

    #[test]
    fn suggestions_are_one_per_category() {
        let mut ethics = framework();
        ethics.ethical_boundaries.push("bar".to_string());
        let gate = ContentGate::new(&ethics, true);

        let check = gate.check_content("foo and bar, call 555.123.4567", ActionKind::Tweet);
        assert_eq!(check.issues.len(), 3);
        assert_eq!(
            check.suggestions,
            vec![
                "Consider rephrasing to align with ethical guidelines",
                "Remove personal or sensitive information",
            ]
        );
    }

    #[test]
    fn invalid_pattern_falls_back_to_literal() {
        let ethics = EthicalFramework {
            ethical_boundaries: vec!["(unclosed".to_string()],
            ..EthicalFramework::default()
        };
        let gate = ContentGate::new(&ethics, false);
        assert!(!gate.check_content("an (UNCLOSED group", ActionKind::Tweet).approved);
        assert!(gate.check_content("unclosed", ActionKind::Tweet).approved);
    }
}
