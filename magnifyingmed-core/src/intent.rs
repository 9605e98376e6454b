//! Intent classification over an ordered rule table.
//!
//! Keyword sets overlap ("address" reads as both a mitigation verb and part
//! of "papers that address this"), so rules are evaluated top-to-bottom and
//! the first match wins. The table is inspectable through
//! [`IntentClassifier::rules`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::extraction::word_tokens;

const RETRIEVAL_VERBS: [&str; 9] = [
    "show",
    "list",
    "provide",
    "give",
    "find",
    "recommend",
    "suggest",
    "share",
    "see",
];
const PAPER_NOUNS: [&str; 7] = [
    "paper",
    "study",
    "studies",
    "research",
    "citation",
    "publication",
    "article",
];
const BARE_PAPER_WORDS: [&str; 2] = ["papers", "studies"];
const BARE_PAPER_PHRASES: [&str; 2] = ["research papers", "recent papers"];

const BIAS_VOCABULARY: [&str; 4] = ["bias", "areas", "gaps", "under-explored"];
const QUESTION_WORDS: [&str; 5] = ["find", "identify", "help", "what", "where"];
const ANALYSIS_VERBS: [&str; 4] = ["analyze", "analyse", "examine", "reanalyze"];

const MITIGATION_VOCABULARY: [&str; 8] = [
    "mitigation",
    "mitigate",
    "method",
    "solution",
    "address",
    "reduce",
    "fix",
    "improve",
];

const FOLLOW_UP_PREFIXES: [&str; 10] = [
    "what", "how", "why", "when", "where", "who", "which", "can you", "tell me", "show me",
];
const FOLLOW_UP_PHRASES: [&str; 2] = ["more about", "tell me more"];

const AFFIRMATIONS: [&str; 5] = ["yes", "y", "yeah", "sure", "please"];
const DEFERRAL_WORDS: [&str; 5] = ["wait", "don't", "dont", "no", "later"];

/// One user message, normalised once for all rule predicates.
#[derive(Debug, Clone)]
pub struct Utterance {
    raw: String,
    lower: String,
    tokens: Vec<String>,
}

impl Utterance {
    pub fn new(text: &str) -> Self {
        let lower = text.trim().replace('\u{2019}', "'").to_lowercase();
        Self {
            raw: text.to_string(),
            tokens: word_tokens(&lower),
            lower,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn lower(&self) -> &str {
        &self.lower
    }

    pub fn has_word(&self, word: &str) -> bool {
        self.tokens.iter().any(|t| t == word)
    }

    pub fn has_any_word(&self, words: &[&str]) -> bool {
        words.iter().any(|w| self.has_word(w))
    }

    /// `prefix` opens the text and ends on a word boundary.
    pub fn starts_with_word(&self, prefix: &str) -> bool {
        self.lower
            .strip_prefix(prefix)
            .is_some_and(|rest| !rest.starts_with(|c: char| c.is_alphanumeric()))
    }

    /// Substring match on the lowercased text.
    pub fn contains(&self, needle: &str) -> bool {
        self.lower.contains(needle)
    }

    pub fn contains_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.contains(n))
    }

    /// Explicit request to hold off: `wait`, `not yet`, `don't`, `no`,
    /// `later`, matched as words.
    pub fn is_deferral(&self) -> bool {
        self.has_any_word(&DEFERRAL_WORDS) || self.contains("not yet")
    }

    /// `all` or `all of them`, matched as words.
    pub fn requests_all(&self) -> bool {
        self.has_word("all")
    }

    fn has_paper_noun(&self) -> bool {
        self.contains_any(&PAPER_NOUNS)
    }

    /// The text without surrounding punctuation, for exact-match rules.
    fn bare(&self) -> &str {
        self.lower
            .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
    }
}

/// The discrete intents a message can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    PaperRequest,
    AnalysisRequest,
    MitigationRequest,
    FollowUp,
    Affirmation,
    /// No rule matched.
    Unmatched,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::PaperRequest => write!(f, "paper_request"),
            Intent::AnalysisRequest => write!(f, "analysis_request"),
            Intent::MitigationRequest => write!(f, "mitigation_request"),
            Intent::FollowUp => write!(f, "follow_up"),
            Intent::Affirmation => write!(f, "affirmation"),
            Intent::Unmatched => write!(f, "unmatched"),
        }
    }
}

/// A tagged predicate in the classification table.
#[derive(Clone, Copy)]
pub struct IntentRule {
    /// Lower runs first.
    pub priority: u8,
    pub intent: Intent,
    pub predicate: fn(&Utterance) -> bool,
}

impl fmt::Debug for IntentRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentRule")
            .field("priority", &self.priority)
            .field("intent", &self.intent)
            .finish()
    }
}

pub fn is_paper_request(u: &Utterance) -> bool {
    let verb_and_noun = u.has_any_word(&RETRIEVAL_VERBS) && u.has_paper_noun();
    let bare_plural = u.has_any_word(&BARE_PAPER_WORDS) || u.contains_any(&BARE_PAPER_PHRASES);
    verb_and_noun || bare_plural
}

pub fn is_analysis_request(u: &Utterance) -> bool {
    let bias_question = u.contains_any(&BIAS_VOCABULARY) && u.contains_any(&QUESTION_WORDS);
    bias_question || u.has_any_word(&ANALYSIS_VERBS)
}

pub fn is_mitigation_request(u: &Utterance) -> bool {
    MITIGATION_VOCABULARY
        .iter()
        .filter(|word| **word != "address" || !u.has_paper_noun())
        .any(|word| u.contains(word))
}

pub fn is_follow_up(u: &Utterance) -> bool {
    FOLLOW_UP_PREFIXES.iter().any(|p| u.starts_with_word(p))
        || u.contains_any(&FOLLOW_UP_PHRASES)
}

pub fn is_affirmation(u: &Utterance) -> bool {
    AFFIRMATIONS.contains(&u.bare())
}

/// The default table. Paper requests come first so that paper phrasings
/// never fall through to analysis or mitigation.
pub const DEFAULT_RULES: [IntentRule; 5] = [
    IntentRule {
        priority: 10,
        intent: Intent::PaperRequest,
        predicate: is_paper_request,
    },
    IntentRule {
        priority: 20,
        intent: Intent::AnalysisRequest,
        predicate: is_analysis_request,
    },
    IntentRule {
        priority: 30,
        intent: Intent::MitigationRequest,
        predicate: is_mitigation_request,
    },
    IntentRule {
        priority: 40,
        intent: Intent::FollowUp,
        predicate: is_follow_up,
    },
    IntentRule {
        priority: 50,
        intent: Intent::Affirmation,
        predicate: is_affirmation,
    },
];

/// Evaluates rules in priority order with short-circuit.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    rules: Vec<IntentRule>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_RULES.to_vec())
    }
}

impl IntentClassifier {
    pub fn new(mut rules: Vec<IntentRule>) -> Self {
        rules.sort_by_key(|r| r.priority);
        Self { rules }
    }

    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    pub fn classify(&self, utterance: &Utterance) -> Intent {
        self.rules
            .iter()
            .find(|rule| (rule.predicate)(utterance))
            .map(|rule| rule.intent)
            .unwrap_or(Intent::Unmatched)
    }
}
