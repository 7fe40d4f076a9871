//! Template content generator.
//!
//! Composes posts from the persona's content focus, tone and traits without
//! calling a language model. Output is deterministic for a given context.

use chrono::Timelike;

use murmur_core::generator::{ContentGenerator, TweetContext};
use murmur_types::agent::Agent;
use murmur_types::error::GenerationError;

/// Platform post length limit, in characters.
pub const MAX_POST_CHARS: usize = 280;

#[derive(Debug, Default, Clone)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }
}

fn greeting(hour: u32) -> &'static str {
    match hour {
        5..=11 => "Morning thought",
        12..=17 => "Afternoon thought",
        _ => "Late-night thought",
    }
}

/// Truncate to `MAX_POST_CHARS` characters on a char boundary.
fn clamp(text: String) -> String {
    if text.chars().count() <= MAX_POST_CHARS {
        return text;
    }
    let mut out: String = text.chars().take(MAX_POST_CHARS - 1).collect();
    out.push('…');
    out
}

impl ContentGenerator for TemplateGenerator {
    async fn generate_tweet(
        &self,
        agent: &Agent,
        context: &TweetContext,
    ) -> Result<String, GenerationError> {
        if context.content_focus.is_empty() {
            return Err(GenerationError(format!(
                "{} has no content focus to write about",
                agent.name
            )));
        }

        // Rotate topics so consecutive posts differ.
        let index = context.recent_tweets.len() % context.content_focus.len();
        let topic = &context.content_focus[index];

        let mut text = format!("{} on {topic}", greeting(context.now.hour()));
        if let Some(key_trait) = agent.persona.key_traits.get(index % agent.persona.key_traits.len().max(1)) {
            text.push_str(&format!(", as someone {key_trait}"));
        }
        text.push('.');
        if !agent.persona.tone.is_empty() {
            text.push_str(&format!(" Keeping it {}.", agent.persona.tone));
        }

        if context.recent_tweets.iter().any(|t| t == &text) {
            text.push_str(&format!(" ({})", context.now.format("%H:%M")));
        }
        Ok(clamp(text))
    }

    async fn generate_reply(
        &self,
        agent: &Agent,
        source_text: &str,
        author_handle: &str,
    ) -> Result<String, GenerationError> {
        let handle = author_handle.trim_start_matches('@');
        if handle.is_empty() {
            return Err(GenerationError("reply target has no author".into()));
        }
        let about = agent
            .content_focus
            .first()
            .map(|topic| format!(" Always happy to talk {topic}."))
            .unwrap_or_default();
        let excerpt: String = source_text.chars().take(60).collect();
        Ok(clamp(format!("@{handle} thanks for \"{excerpt}\"!{about}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn agent() -> Agent {
        let mut agent = Agent::new("Luna");
        agent.content_focus = vec!["astronomy".into(), "tea".into()];
        agent.persona.tone = "gentle".into();
        agent.persona.key_traits = vec!["curious".into()];
        agent
    }

    fn context(recent: &[&str]) -> TweetContext {
        TweetContext {
            content_focus: vec!["astronomy".into(), "tea".into()],
            now: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
            recent_tweets: recent.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn tweet_uses_focus_tone_and_trait() {
        let text = TemplateGenerator::new()
            .generate_tweet(&agent(), &context(&[]))
            .await
            .unwrap();
        assert_eq!(
            text,
            "Morning thought on astronomy, as someone curious. Keeping it gentle."
        );
    }

    #[tokio::test]
    async fn topics_rotate_with_history() {
        let text = TemplateGenerator::new()
            .generate_tweet(&agent(), &context(&["earlier"]))
            .await
            .unwrap();
        assert!(text.contains("on tea"));
    }

    #[tokio::test]
    async fn empty_focus_is_an_error() {
        let mut ctx = context(&[]);
        ctx.content_focus.clear();
        assert!(TemplateGenerator::new()
            .generate_tweet(&agent(), &ctx)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn reply_addresses_author_and_fits() {
        let long = "x".repeat(500);
        let text = TemplateGenerator::new()
            .generate_reply(&agent(), &long, "@fan")
            .await
            .unwrap();
        assert!(text.starts_with("@fan thanks for"));
        assert!(text.chars().count() <= MAX_POST_CHARS);
    }

    #[test]
    fn clamp_respects_char_boundaries() {
        let text = "é".repeat(300);
        let clamped = clamp(text);
        assert_eq!(clamped.chars().count(), MAX_POST_CHARS);
        assert!(clamped.ends_with('…'));
    }
}
