//! Patient reference extraction
//!
//! Sub-rules, most specific first:
//!
//! 1. explicit identifier markers: `#123456`, `id 123456`, `identifier 5`
//! 2. a bare six-digit token with nothing glued to it
//! 3. `Name-digits` tokens such as `Radwan-563004`, split on the last hyphen
//!    before the digit run
//! 4. a capitalized 1-3 word name after a trigger word or before `'s`
//!
//! Where matches overlap, the most specific one wins (identifier > combined
//! > name). Of the references left, an explicit identifier marker wins,
//! otherwise the leftmost one.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A patient as the clinician referred to them, before resolution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatientReference {
    Identifier { value: String },
    Name { value: String },
    Combined { name: String, identifier: String },
}

impl PatientReference {
    pub fn identifier(value: impl Into<String>) -> Self {
        Self::Identifier {
            value: value.into(),
        }
    }

    pub fn name(value: impl Into<String>) -> Self {
        Self::Name {
            value: value.into(),
        }
    }

    pub fn combined(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::Combined {
            name: name.into(),
            identifier: identifier.into(),
        }
    }

    fn specificity(&self) -> u8 {
        match self {
            Self::Identifier { .. } => 3,
            Self::Combined { .. } => 2,
            Self::Name { .. } => 1,
        }
    }

    /// Human-readable form used in answers
    pub fn describe(&self) -> String {
        match self {
            Self::Identifier { value } => format!("identifier {}", value),
            Self::Name { value } => format!("the name \"{}\"", value),
            Self::Combined { name, identifier } => format!("{}-{}", name, identifier),
        }
    }

    /// Narrower references to try when this one resolves to nobody.
    ///
    /// A combined token may carry a stale identifier or a misspelled name;
    /// each half is tried on its own, identifier first.
    pub fn fallbacks(&self) -> Vec<PatientReference> {
        match self {
            Self::Combined { name, identifier } => vec![
                Self::identifier(identifier.clone()),
                Self::name(name.clone()),
            ],
            _ => Vec::new(),
        }
    }
}

lazy_static! {
    static ref MARKER: Regex = Regex::new(
        r"(?i)(?:#\s*|\b(?:identifier|id|ur|record(?:\s+number)?|patient\s+(?:number|no\.?))\s*[:#]?\s*)(\d+)\b"
    )
    .expect("valid regex");
    static ref SIX_DIGITS: Regex = Regex::new(r"\b\d{6}\b").expect("valid regex");
    static ref COMBINED: Regex = Regex::new(
        r"\b((?:[A-Z][A-Za-z']+\s+){0,2}[A-Z][A-Za-z'-]*)-(\d+)\b"
    )
    .expect("valid regex");
    static ref TRIGGERED_NAME: Regex = Regex::new(
        r"\b(?i:for|named|called|about|patient|client|with)\s+([A-Z][A-Za-z'-]*(?:\s+[A-Z][A-Za-z'-]*){0,2})"
    )
    .expect("valid regex");
    static ref POSSESSIVE_NAME: Regex = Regex::new(
        r"\b([A-Z][A-Za-z'-]*(?:\s+[A-Z][A-Za-z'-]*){0,2})'s\b"
    )
    .expect("valid regex");
    static ref PRONOUN: Regex = Regex::new(
        r"(?i)\b(they|them|their|he|him|his|she|her|hers|this patient|that patient|same patient|this client|that client)\b"
    )
    .expect("valid regex");
}

/// Words that start with a capital letter but are never part of a name
const NOT_NAMES: &[&str] = &[
    "what", "who", "whom", "whose", "which", "how", "when", "where", "why", "is", "are", "was",
    "the", "this", "that", "these", "those", "it", "its", "there", "here", "let", "lets", "show",
    "list", "find", "get", "give", "tell", "check", "me", "patient", "patients", "client",
    "clients", "id", "identifier", "ur", "record", "number", "for", "about", "named", "called",
    "with", "i", "we", "you", "he", "she", "they", "and", "or", "goal", "goals", "budget",
    "session", "sessions", "strategy", "strategies", "hello", "hi", "please", "can", "could",
    "does", "do", "did", "has", "have", "count", "summary", "progress",
];

fn is_name_word(word: &str) -> bool {
    let lower = word.trim_matches(|c| c == '\'' || c == '-').to_lowercase();
    !lower.is_empty() && !NOT_NAMES.contains(&lower.as_str())
}

/// Drop leading non-name words, then keep words up to the next non-name word
fn clean_name(raw: &str) -> Option<String> {
    let words: Vec<&str> = raw
        .split_whitespace()
        .skip_while(|w| !is_name_word(w))
        .take_while(|w| is_name_word(w))
        .map(|w| w.trim_end_matches(|c| c == '\'' || c == '-'))
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    reference: PatientReference,
    start: usize,
    end: usize,
    /// Written with `#`, `id` or a similar marker
    explicit: bool,
}

impl Candidate {
    fn overlaps(&self, other: &Candidate) -> bool {
        self.start < other.end && other.start < self.end
    }
}

fn marker_candidates(text: &str, out: &mut Vec<Candidate>) {
    for caps in MARKER.captures_iter(text) {
        if let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) {
            out.push(Candidate {
                reference: PatientReference::identifier(digits.as_str()),
                start: whole.start(),
                end: whole.end(),
                explicit: true,
            });
        }
    }
}

fn bare_identifier_candidates(text: &str, out: &mut Vec<Candidate>) {
    let glued = |c: char| c.is_alphanumeric() || c == '-' || c == '#';
    for m in SIX_DIGITS.find_iter(text) {
        let before = text[..m.start()].chars().next_back();
        let after = text[m.end()..].chars().next();
        if before.map_or(false, glued) || after.map_or(false, glued) {
            continue;
        }
        out.push(Candidate {
            reference: PatientReference::identifier(m.as_str()),
            start: m.start(),
            end: m.end(),
            explicit: false,
        });
    }
}

fn combined_candidates(text: &str, out: &mut Vec<Candidate>) {
    for caps in COMBINED.captures_iter(text) {
        let (Some(name), Some(digits)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        if let Some(cleaned) = clean_name(name.as_str()) {
            out.push(Candidate {
                reference: PatientReference::combined(cleaned, digits.as_str()),
                start: name.start(),
                end: digits.end(),
                explicit: false,
            });
        }
    }
}

fn name_candidates(text: &str, out: &mut Vec<Candidate>) {
    for re in [&*TRIGGERED_NAME, &*POSSESSIVE_NAME] {
        for caps in re.captures_iter(text) {
            let Some(name) = caps.get(1) else { continue };
            if let Some(cleaned) = clean_name(name.as_str()) {
                out.push(Candidate {
                    reference: PatientReference::name(cleaned),
                    start: name.start(),
                    end: name.end(),
                    explicit: false,
                });
            }
        }
    }
}

/// Extract the patient reference in `text`
pub fn find_reference(text: &str) -> Option<PatientReference> {
    let mut candidates = Vec::new();
    marker_candidates(text, &mut candidates);
    bare_identifier_candidates(text, &mut candidates);
    combined_candidates(text, &mut candidates);
    name_candidates(text, &mut candidates);

    let survivors: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| {
            !candidates.iter().any(|other| {
                other.overlaps(c) && other.reference.specificity() > c.reference.specificity()
            })
        })
        .collect();

    survivors
        .iter()
        .filter(|c| c.explicit)
        .min_by_key(|c| c.start)
        .or_else(|| survivors.iter().min_by_key(|c| c.start))
        .map(|c| c.reference.clone())
}

/// Does the query point back at a previously mentioned patient?
pub fn mentions_pronoun(text: &str) -> bool {
    PRONOUN.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_marker_is_identifier() {
        assert_eq!(
            find_reference("patient #123456"),
            Some(PatientReference::identifier("123456"))
        );
    }

    #[test]
    fn test_word_markers_accept_any_digit_run() {
        assert_eq!(
            find_reference("What are the goals for patient ID 5"),
            Some(PatientReference::identifier("5"))
        );
        assert_eq!(
            find_reference("budget for identifier 42"),
            Some(PatientReference::identifier("42"))
        );
    }

    #[test]
    fn test_bare_six_digit_token() {
        assert_eq!(
            find_reference("sessions for 456789 please"),
            Some(PatientReference::identifier("456789"))
        );
        // Five or seven digits are not record numbers
        assert_eq!(find_reference("sessions for 45678 please"), None);
        assert_eq!(find_reference("sessions for 4567890 please"), None);
        // Glued to letters is not a bare token
        assert_eq!(find_reference("code AB123456"), None);
    }

    #[test]
    fn test_trigger_word_name() {
        assert_eq!(
            find_reference("Find patient John Smith"),
            Some(PatientReference::name("John Smith"))
        );
        assert_eq!(
            find_reference("Show goals for Liam O'Brien?"),
            Some(PatientReference::name("Liam O'Brien"))
        );
    }

    #[test]
    fn test_possessive_name() {
        assert_eq!(
            find_reference("What are Amira Radwan's goals?"),
            Some(PatientReference::name("Amira Radwan"))
        );
        // Sentence-initial interrogatives are not names
        assert_eq!(find_reference("What's the weather like"), None);
    }

    #[test]
    fn test_lowercase_names_are_not_guessed() {
        assert_eq!(find_reference("goals for john smith"), None);
    }

    #[test]
    fn test_combined_name_identifier() {
        assert_eq!(
            find_reference("Radwan-563004"),
            Some(PatientReference::combined("Radwan", "563004"))
        );
    }

    #[test]
    fn test_combined_beats_overlapping_name_capture() {
        // The trigger-word rule alone would capture "Radwan-"; the combined
        // rule is more specific and wins.
        assert_eq!(
            find_reference("Show remaining funds for Radwan-563004"),
            Some(PatientReference::combined("Radwan", "563004"))
        );
    }

    #[test]
    fn test_combined_splits_on_last_hyphen() {
        assert_eq!(
            find_reference("goals for Smith-Jones-563004"),
            Some(PatientReference::combined("Smith-Jones", "563004"))
        );
    }

    #[test]
    fn test_combined_keeps_preceding_capitalized_words() {
        assert_eq!(
            find_reference("budget for Amira Radwan-563004"),
            Some(PatientReference::combined("Amira Radwan", "563004"))
        );
        assert_eq!(
            find_reference("Check Radwan-563004"),
            Some(PatientReference::combined("Radwan", "563004"))
        );
    }

    #[test]
    fn test_hyphenated_name_without_digits_stays_a_name() {
        assert_eq!(
            find_reference("goals for Mary-Jane Doyle"),
            Some(PatientReference::name("Mary-Jane Doyle"))
        );
    }

    #[test]
    fn test_lowercase_hyphen_digit_tokens_are_not_names() {
        assert_eq!(
            find_reference("Show goals for Amira Radwan in term-2"),
            Some(PatientReference::name("Amira Radwan"))
        );
        assert_eq!(find_reference("sessions in week-3"), None);
    }

    #[test]
    fn test_specificity_only_settles_overlapping_matches() {
        // Two separate references: the leftmost one is kept
        assert_eq!(
            find_reference("goals for Amira Radwan and Term-2"),
            Some(PatientReference::name("Amira Radwan"))
        );
        assert_eq!(
            find_reference("compare Radwan-563004 with patient Liam"),
            Some(PatientReference::combined("Radwan", "563004"))
        );
    }

    #[test]
    fn test_identifier_beats_name_in_same_query() {
        assert_eq!(
            find_reference("goals for John Smith #123456"),
            Some(PatientReference::identifier("123456"))
        );
    }

    #[test]
    fn test_dates_are_not_references() {
        assert_eq!(find_reference("sessions since 2024-01-01"), None);
    }

    #[test]
    fn test_fallbacks_only_for_combined() {
        let combined = PatientReference::combined("Radwan", "563004");
        assert_eq!(
            combined.fallbacks(),
            vec![
                PatientReference::identifier("563004"),
                PatientReference::name("Radwan")
            ]
        );
        assert!(PatientReference::name("Radwan").fallbacks().is_empty());
    }

    #[test]
    fn test_pronoun_detection() {
        assert!(mentions_pronoun("what about their budget?"));
        assert!(mentions_pronoun("show sessions for this patient"));
        assert!(!mentions_pronoun("how many patients do we have"));
    }
}
