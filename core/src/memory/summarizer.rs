//! Heuristic turn summarization
//!
//! Produces topic tags from a fixed keyword table plus any patient
//! references mentioned, and a condensed paraphrase of each exchange.
//! Deterministic for a given message block.

use std::collections::BTreeSet;

use chrono::Utc;

use super::conversation::{Message, MessageRange, MessageRole, Summary};
use crate::agent::intent::reference::find_reference;
use crate::agent::intent::PatientReference;

/// Longest excerpt kept from one message
const EXCERPT_CHARS: usize = 120;

/// Keyword stems mapped to topic tags
const TOPIC_KEYWORDS: &[(&str, &str)] = &[
    ("goal", "goals"),
    ("objective", "goals"),
    ("progress", "goals"),
    ("achiev", "goals"),
    ("budget", "budget"),
    ("fund", "budget"),
    ("spen", "budget"),
    ("cost", "budget"),
    ("expense", "budget"),
    ("session", "sessions"),
    ("attend", "sessions"),
    ("engag", "sessions"),
    ("appointment", "sessions"),
    ("strateg", "strategies"),
    ("intervention", "strategies"),
    ("technique", "strategies"),
    ("patient", "patients"),
    ("client", "patients"),
    ("profile", "patients"),
    ("where", "records"),
];

/// Words that carry no topic on their own
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "what", "who", "how", "did", "does", "has",
    "have", "had", "with", "about", "this", "that", "these", "those", "from", "into", "you",
    "your", "our", "their", "his", "her", "them", "they", "she", "its", "can", "could",
    "would", "should", "tell", "show", "list", "find", "give", "get", "please", "earlier",
    "previously", "before", "said", "say", "told", "mentioned", "discuss", "discussed",
    "remind", "talked", "covered", "ask", "asked", "last", "time", "again", "any", "all",
];

/// Lowercase content words with a trailing plural `s` removed
pub fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(|w| w.to_lowercase())
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .map(|w| {
            if w.len() > 3 && w.ends_with('s') && !w.ends_with("ss") {
                w[..w.len() - 1].to_string()
            } else {
                w
            }
        })
        .collect()
}

/// Topic tags for a piece of text
pub fn topic_tags(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    let mut tags: BTreeSet<String> = TOPIC_KEYWORDS
        .iter()
        .filter(|(stem, _)| lower.contains(stem))
        .map(|(_, tag)| tag.to_string())
        .collect();

    match find_reference(text) {
        Some(PatientReference::Identifier { value }) => {
            tags.insert(format!("#{}", value));
        }
        Some(PatientReference::Name { value }) => {
            tags.insert(value.to_lowercase());
        }
        Some(PatientReference::Combined { name, identifier }) => {
            tags.insert(name.to_lowercase());
            tags.insert(format!("#{}", identifier));
        }
        None => {}
    }
    tags
}

fn excerpt(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    if first_line.chars().count() <= EXCERPT_CHARS {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(EXCERPT_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}

/// Condenses a block of turns into one [`Summary`]
#[derive(Debug, Clone, Default)]
pub struct Summarizer;

impl Summarizer {
    pub fn new() -> Self {
        Self
    }

    /// Summarize `messages`, which must be a contiguous non-empty block
    pub fn summarize(&self, messages: &[Message]) -> Option<Summary> {
        let first = messages.first()?.index;
        let last = messages.last()?.index;

        let mut topics = BTreeSet::new();
        let mut lines = Vec::new();
        for message in messages {
            match message.role {
                MessageRole::User => {
                    topics.extend(topic_tags(&message.content));
                    lines.push(format!("Asked: {}", excerpt(&message.content)));
                }
                MessageRole::Assistant => {
                    lines.push(format!("Answered: {}", excerpt(&message.content)));
                }
            }
        }

        Some(Summary {
            topics,
            content: lines.join("\n"),
            range: MessageRange { first, last },
            message_count: messages.len(),
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Conversation;

    #[test]
    fn test_keywords_drop_stop_words_and_plurals() {
        let words = keywords("What did we discuss earlier about goals?");
        assert_eq!(words, BTreeSet::from(["goal".to_string()]));
        assert!(keywords("sessions progress").contains("progress"));
    }

    #[test]
    fn test_topic_tags_include_patient() {
        let tags = topic_tags("What's the budget for Liam O'Brien?");
        assert!(tags.contains("budget"));
        assert!(tags.contains("liam o'brien"));

        let tags = topic_tags("Goals for Radwan-563004");
        assert!(tags.contains("goals"));
        assert!(tags.contains("radwan"));
        assert!(tags.contains("#563004"));
    }

    #[test]
    fn test_summary_covers_block() {
        let mut conv = Conversation::new("t");
        conv.push(MessageRole::User, "Show goals for Amira Radwan", Vec::new());
        conv.push(MessageRole::Assistant, "Amira Radwan (#563004) has 2 goals.", Vec::new());
        conv.push(MessageRole::User, "Budget for patient #456789", Vec::new());
        conv.push(MessageRole::Assistant, "Liam O'Brien has spent 4770.50.", Vec::new());

        let summary = Summarizer::new().summarize(conv.messages()).unwrap();
        assert_eq!(summary.range, MessageRange { first: 0, last: 3 });
        assert_eq!(summary.message_count, 4);
        assert!(summary.topics.contains("goals"));
        assert!(summary.topics.contains("budget"));
        assert!(summary.content.contains("Asked: Budget for patient #456789"));
        assert!(Summarizer::new().summarize(&[]).is_none());
    }

    #[test]
    fn test_long_messages_are_condensed() {
        let mut conv = Conversation::new("t");
        conv.push(MessageRole::User, "goal ".repeat(100), Vec::new());
        let summary = Summarizer::new().summarize(conv.messages()).unwrap();
        assert!(summary.content.len() < 200);
        assert!(summary.content.ends_with("..."));
    }
}
