//! Keyword recall over summaries and recent messages
//!
//! Pure functions of the conversation state and the query: the same inputs
//! always yield the same hits in the same order.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::conversation::{Message, Summary};
use super::summarizer::keywords;

/// One recalled item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecallHit {
    Summary { summary: Summary, score: usize },
    Message { message: Message, score: usize },
}

impl RecallHit {
    /// Index of the first message the hit stands for
    pub fn position(&self) -> usize {
        match self {
            RecallHit::Summary { summary, .. } => summary.range.first,
            RecallHit::Message { message, .. } => message.index,
        }
    }

    pub fn score(&self) -> usize {
        match self {
            RecallHit::Summary { score, .. } | RecallHit::Message { score, .. } => *score,
        }
    }

    pub fn render(&self) -> String {
        match self {
            RecallHit::Summary { summary, .. } => format!(
                "Earlier (messages {}-{}, topics: {}):\n{}",
                summary.range.first + 1,
                summary.range.last + 1,
                summary.topics.iter().cloned().collect::<Vec<_>>().join(", "),
                summary.content
            ),
            RecallHit::Message { message, .. } => {
                format!("{} said: {}", capitalize(message.role.as_str()), message.content)
            }
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn overlap(query: &BTreeSet<String>, text_words: &BTreeSet<String>) -> usize {
    query.intersection(text_words).count()
}

/// Rank `summaries` and `messages` against `query` and keep the best
/// `limit`, returned in conversation order.
///
/// Higher keyword overlap ranks first; equal scores prefer the newer item.
/// Items sharing no keyword with the query are never returned.
pub fn recall(summaries: &[Summary], messages: &[Message], query: &str, limit: usize) -> Vec<RecallHit> {
    let wanted = keywords(query);
    if wanted.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut hits: Vec<RecallHit> = Vec::new();
    for summary in summaries {
        let mut words = keywords(&summary.content);
        for topic in &summary.topics {
            words.extend(keywords(topic));
        }
        let score = overlap(&wanted, &words);
        if score > 0 {
            hits.push(RecallHit::Summary {
                summary: summary.clone(),
                score,
            });
        }
    }
    for message in messages {
        let score = overlap(&wanted, &keywords(&message.content));
        if score > 0 {
            hits.push(RecallHit::Message {
                message: message.clone(),
                score,
            });
        }
    }

    hits.sort_by(|a, b| {
        b.score()
            .cmp(&a.score())
            .then_with(|| b.position().cmp(&a.position()))
    });
    hits.truncate(limit);
    hits.sort_by_key(RecallHit::position);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Conversation, MessageRole, Summarizer};

    fn conversation() -> Conversation {
        let mut conv = Conversation::new("t");
        let turns = [
            ("Show goals for Amira Radwan", "Amira Radwan has 2 goals: handwriting and turn-taking."),
            ("Budget for patient #456789", "Liam O'Brien has spent 4770.50 of 12000.00."),
            ("How many patients do we have?", "There are 6 patients, 5 active."),
            ("Goal progress for Liam O'Brien", "Liam has 3 goals, 1 achieved."),
        ];
        for (q, a) in turns {
            conv.push(MessageRole::User, q, Vec::new());
            conv.push(MessageRole::Assistant, a, Vec::new());
        }
        conv
    }

    #[test]
    fn test_recall_ranks_by_overlap_and_orders_chronologically() {
        let conv = conversation();
        let hits = recall(&[], conv.messages(), "What did we discuss earlier about goals?", 3);
        let positions: Vec<usize> = hits.iter().map(RecallHit::position).collect();
        // All four goal messages score 1; the newest three win
        assert_eq!(positions, vec![1, 6, 7]);
    }

    #[test]
    fn test_recall_prefers_stronger_match() {
        let conv = conversation();
        let hits = recall(&[], conv.messages(), "remind me of the budget spent", 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].position(), 3);
    }

    #[test]
    fn test_recall_includes_summaries() {
        let conv = conversation();
        let summary = Summarizer::new().summarize(&conv.messages()[..4]).unwrap();
        let hits = recall(&[summary], &conv.messages()[4..], "budget", 5);
        assert_eq!(hits.len(), 1);
        assert!(matches!(hits[0], RecallHit::Summary { .. }));
        assert!(hits[0].render().contains("budget"));
    }

    #[test]
    fn test_recall_is_deterministic() {
        let conv = conversation();
        let summary = Summarizer::new().summarize(&conv.messages()[..4]).unwrap();
        let summaries = vec![summary];
        let first = recall(&summaries, &conv.messages()[4..], "goals for Liam", 4);
        let second = recall(&summaries, &conv.messages()[4..], "goals for Liam", 4);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_no_keywords_recalls_nothing() {
        let conv = conversation();
        assert!(recall(&[], conv.messages(), "what did you say?", 5).is_empty());
    }
}
