//! Session quality metrics.
//!
//! `MetricsTracker` watches assistant responses and records claims, the
//! citations behind them, and the research gaps they identify. Metrics are
//! observational: nothing here feeds back into routing or scoring.

use std::sync::{LazyLock, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::analysis::AnalysisResult;
use crate::findings::fields;
use crate::routing::Action;

/// Minimum share of claims carrying a citation.
pub const TARGET_CITATION_RATE: f64 = 0.95;
/// Maximum share of uncited claims.
pub const TARGET_UNCITED_RATE: f64 = 0.02;
/// Minimum share of sourced gaps that flag a demographic or geographic axis.
pub const TARGET_FLAGGING_RATE: f64 = 0.80;
/// Maximum seconds until the first sourced gap.
pub const TARGET_FIRST_GAP_SECS: f64 = 90.0;

const MIN_CLAIM_CHARS: usize = 20;
const MIN_CLAIM_WORDS: usize = 5;

const CLAIM_QUESTION_PREFIXES: &[&str] =
    &["what", "how", "why", "when", "where", "can you", "would you"];

const GAP_KEYWORDS: &[&str] = &[
    "gap",
    "lack",
    "missing",
    "insufficient",
    "under-represented",
    "underrepresented",
    "bias",
    "disparity",
    "inequality",
    "limitation",
];

const DEMOGRAPHIC_KEYWORDS: &[&str] = &[
    "demographic",
    "race",
    "racial",
    "ethnic",
    "ethnicity",
    "minority",
    "african american",
    "black",
    "hispanic",
    "latino",
    "asian",
    "white",
    "under-represented",
    "underrepresented",
    "population bias",
];

const GEOGRAPHIC_KEYWORDS: &[&str] = &[
    "geographic",
    "geographical",
    "region",
    "country",
    "continent",
    "us-only",
    "us only",
    "united states",
    "europe",
    "asia",
    "africa",
    "location bias",
    "global",
    "international",
];

static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+").expect("valid sentence regex"));

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").expect("valid digit regex"));

static CITATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\[\d+\]",
        r"(?i)\([a-z]+ et al\.?, \d{4}\)",
        r"(?i)\([a-z]+, \d{4}\)",
        r"(?i)doi:\s*10\.\d+[/.]\S+",
        r"(?i)https?://\S+",
        r"(?i)arxiv:\d+\.\d+",
        r"(?i)pmid:\s*\d+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid citation regex"))
    .collect()
});

/// One assistant turn, as seen by observers.
#[derive(Debug, Clone, Copy)]
pub struct ResponseEvent<'a> {
    pub user_message: &'a str,
    pub response: &'a str,
    pub action: Action,
    pub elapsed: Duration,
}

/// Hook for components that watch a conversation without steering it.
pub trait SessionObserver: Send + Sync {
    fn on_response(&self, event: &ResponseEvent<'_>);

    fn on_analysis(&self, _result: &AnalysisResult) {}

    /// The conversation was reset; any analysis state is gone.
    fn on_reset(&self) {}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    pub has_citation: bool,
    pub citations: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub description: String,
    pub flags_demographic: bool,
    pub flags_geographic: bool,
    /// Cited inline, or backed by a non-empty analysis.
    pub has_sources: bool,
    pub sources: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

impl Gap {
    fn is_flagged(&self) -> bool {
        self.flags_demographic || self.flags_geographic
    }
}

/// Summary of one finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub citation_verification_rate: f64,
    pub false_uncited_claims_rate: f64,
    pub demographic_flagging_rate: f64,
    /// Seconds.
    pub median_response_time: f64,
    /// Seconds from session start to the first sourced gap.
    pub time_to_first_vetted_gap: Option<f64>,
    pub total_claims: usize,
    pub total_gaps: usize,
    pub total_responses: usize,
    /// Seconds.
    pub session_duration: f64,
    pub claims: Vec<Claim>,
    pub gaps: Vec<Gap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetsMet {
    pub citation_verification: bool,
    pub false_uncited_claims: bool,
    pub demographic_flagging: bool,
    pub response_time: bool,
}

/// Archived sessions summarised against the quality targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub citation_verification_rate: f64,
    pub false_uncited_claims_rate: f64,
    pub demographic_flagging_rate: f64,
    pub median_response_time: f64,
    pub median_time_to_first_gap: Option<f64>,
    pub total_sessions: usize,
    pub targets_met: TargetsMet,
}

#[derive(Debug)]
struct SessionState {
    id: String,
    started_at: DateTime<Utc>,
    claims: Vec<Claim>,
    gaps: Vec<Gap>,
    response_times: Vec<f64>,
    evidence_available: bool,
}

impl SessionState {
    fn start() -> Self {
        Self {
            id: format!("session_{}", Uuid::new_v4()),
            started_at: Utc::now(),
            claims: Vec::new(),
            gaps: Vec::new(),
            response_times: Vec::new(),
            evidence_available: false,
        }
    }
}

#[derive(Debug)]
struct TrackerState {
    session: SessionState,
    history: Vec<SessionMetrics>,
}

/// Records claim, gap, and latency metrics for the current session.
#[derive(Debug)]
pub struct MetricsTracker {
    state: Mutex<TrackerState>,
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                session: SessionState::start(),
                history: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn session_id(&self) -> String {
        self.lock().session.id.clone()
    }

    /// Analyse one response and record its claims, gaps, and latency.
    pub fn record_response(&self, response: &str, elapsed: Duration) {
        let now = Utc::now();
        let mut state = self.lock();
        let evidence = state.session.evidence_available;

        let claims = extract_claims(response, now);
        let gaps = extract_gaps(response, evidence, now);
        debug!(
            claims = claims.len(),
            gaps = gaps.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Recorded response metrics"
        );

        let session = &mut state.session;
        session.claims.extend(claims);
        session.gaps.extend(gaps);
        session.response_times.push(elapsed.as_secs_f64());
    }

    /// Mark whether a completed analysis backs later gap statements.
    pub fn set_evidence_available(&self, available: bool) {
        self.lock().session.evidence_available = available;
    }

    /// Close the current session, archive its metrics, and start a new one.
    pub fn end_session(&self) -> SessionMetrics {
        let mut state = self.lock();
        let finished = std::mem::replace(&mut state.session, SessionState::start());
        let metrics = summarise(finished, Utc::now());
        state.history.push(metrics.clone());
        metrics
    }

    pub fn history(&self) -> Vec<SessionMetrics> {
        self.lock().history.clone()
    }

    /// Summarise archived sessions. `None` until a session has ended.
    pub fn aggregate(&self) -> Option<AggregateMetrics> {
        aggregate_sessions(&self.lock().history)
    }
}

impl SessionObserver for MetricsTracker {
    fn on_response(&self, event: &ResponseEvent<'_>) {
        self.record_response(event.response, event.elapsed);
    }

    fn on_analysis(&self, result: &AnalysisResult) {
        let has_evidence = result.dataset.count(fields::TOTAL_DATASETS) > 0
            || result.subgroup.count(fields::TOTAL_STUDIES) > 0
            || result.mitigation.count(fields::TOTAL_STUDIES) > 0;
        self.set_evidence_available(has_evidence);
    }

    fn on_reset(&self) {
        self.set_evidence_available(false);
    }
}

fn sentences(text: &str) -> impl Iterator<Item = &str> {
    SENTENCE_BREAK
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn citations_in(text: &str) -> Vec<String> {
    CITATION_PATTERNS
        .iter()
        .flat_map(|re| re.find_iter(text).map(|m| m.as_str().to_string()))
        .collect()
}

fn is_claim(sentence: &str) -> bool {
    let lower = sentence.to_lowercase();
    if CLAIM_QUESTION_PREFIXES.iter().any(|q| lower.starts_with(q)) {
        return false;
    }
    DIGITS.is_match(sentence) || sentence.split_whitespace().count() > MIN_CLAIM_WORDS
}

fn mentions_any(lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| lower.contains(k))
}

pub fn extract_claims(text: &str, now: DateTime<Utc>) -> Vec<Claim> {
    sentences(text)
        .filter(|s| s.chars().count() >= MIN_CLAIM_CHARS && is_claim(s))
        .map(|s| {
            let citations = citations_in(s);
            Claim {
                text: s.to_string(),
                has_citation: !citations.is_empty(),
                citations,
                recorded_at: now,
            }
        })
        .collect()
}

pub fn extract_gaps(text: &str, evidence_available: bool, now: DateTime<Utc>) -> Vec<Gap> {
    sentences(text)
        .filter_map(|s| {
            let lower = s.to_lowercase();
            if !mentions_any(&lower, GAP_KEYWORDS) {
                return None;
            }
            let sources = citations_in(s);
            Some(Gap {
                description: s.to_string(),
                flags_demographic: mentions_any(&lower, DEMOGRAPHIC_KEYWORDS),
                flags_geographic: mentions_any(&lower, GEOGRAPHIC_KEYWORDS),
                has_sources: !sources.is_empty() || evidence_available,
                sources,
                recorded_at: now,
            })
        })
        .collect()
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Upper median; 0 for an empty slice.
fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted[sorted.len() / 2]
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds().max(0) as f64 / 1000.0
}

fn summarise(session: SessionState, ended_at: DateTime<Utc>) -> SessionMetrics {
    let total_claims = session.claims.len();
    let cited = session.claims.iter().filter(|c| c.has_citation).count();

    let sourced: Vec<&Gap> = session.gaps.iter().filter(|g| g.has_sources).collect();
    let flagged = sourced.iter().filter(|g| g.is_flagged()).count();

    let time_to_first_vetted_gap = sourced
        .first()
        .map(|g| seconds_between(session.started_at, g.recorded_at));

    SessionMetrics {
        session_id: session.id,
        timestamp: ended_at,
        citation_verification_rate: ratio(cited, total_claims),
        false_uncited_claims_rate: ratio(total_claims - cited, total_claims),
        demographic_flagging_rate: ratio(flagged, sourced.len()),
        median_response_time: median(&session.response_times),
        time_to_first_vetted_gap,
        total_claims,
        total_gaps: session.gaps.len(),
        total_responses: session.response_times.len(),
        session_duration: seconds_between(session.started_at, ended_at),
        claims: session.claims,
        gaps: session.gaps,
    }
}

pub fn aggregate_sessions(sessions: &[SessionMetrics]) -> Option<AggregateMetrics> {
    if sessions.is_empty() {
        return None;
    }
    let collect = |f: fn(&SessionMetrics) -> f64| sessions.iter().map(f).collect::<Vec<_>>();
    let citation = mean(&collect(|s| s.citation_verification_rate));
    let uncited = mean(&collect(|s| s.false_uncited_claims_rate));
    let flagging = mean(&collect(|s| s.demographic_flagging_rate));
    let response_times: Vec<f64> = sessions
        .iter()
        .map(|s| s.median_response_time)
        .filter(|t| *t > 0.0)
        .collect();
    let first_gaps: Vec<f64> = sessions
        .iter()
        .filter_map(|s| s.time_to_first_vetted_gap)
        .collect();
    let median_time_to_first_gap = (!first_gaps.is_empty()).then(|| median(&first_gaps));

    Some(AggregateMetrics {
        citation_verification_rate: citation,
        false_uncited_claims_rate: uncited,
        demographic_flagging_rate: flagging,
        median_response_time: median(&response_times),
        median_time_to_first_gap,
        total_sessions: sessions.len(),
        targets_met: TargetsMet {
            citation_verification: citation >= TARGET_CITATION_RATE,
            false_uncited_claims: uncited <= TARGET_UNCITED_RATE,
            demographic_flagging: flagging >= TARGET_FLAGGING_RATE,
            response_time: median_time_to_first_gap.is_some_and(|t| t <= TARGET_FIRST_GAP_SECS),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_require_substance() {
        let text = "Only 3 of 10 datasets report race labels (Daneshjou, 2022). \
                    What would you like next? Great. \
                    Most dermatology models are trained on images from a handful of hospitals.";
        let claims = extract_claims(text, Utc::now());
        assert_eq!(claims.len(), 2);
        assert!(claims[0].has_citation);
        assert_eq!(claims[0].citations, vec!["(Daneshjou, 2022)"]);
        assert!(!claims[1].has_citation);
    }

    #[test]
    fn test_citation_patterns() {
        for cited in [
            "see [12]",
            "(Smith, 2020)",
            "doi: 10.1038/s41591",
            "https://pubmed.ncbi.nlm.nih.gov/1",
            "arXiv:2101.00001",
            "PMID: 123456",
        ] {
            assert!(!citations_in(cited).is_empty(), "{cited}");
        }
        assert!(citations_in("no sources here").is_empty());
    }

    #[test]
    fn test_gaps_flag_demographic_and_geographic() {
        let text = "There is a lack of racial diversity in training data. \
                    Validation cohorts are missing outside the United States. \
                    Models achieve high accuracy overall.";
        let gaps = extract_gaps(text, false, Utc::now());
        assert_eq!(gaps.len(), 2);
        assert!(gaps[0].flags_demographic);
        assert!(!gaps[0].flags_geographic);
        assert!(gaps[1].flags_geographic);
        assert!(gaps.iter().all(|g| !g.has_sources));

        let sourced = extract_gaps(text, true, Utc::now());
        assert!(sourced.iter().all(|g| g.has_sources));
    }

    #[test]
    fn test_end_session_rates_and_archive() {
        let tracker = MetricsTracker::new();
        let first_id = tracker.session_id();
        tracker.set_evidence_available(true);
        tracker.record_response(
            "Only 2 of 10 datasets include race labels [1]. \
             Black patients lack representation in most image collections.",
            Duration::from_secs(4),
        );
        tracker.record_response("Happy to help with that.", Duration::from_secs(2));
        tracker.record_response("You're welcome.", Duration::from_secs(6));

        let metrics = tracker.end_session();
        assert_eq!(metrics.session_id, first_id);
        assert_eq!(metrics.total_claims, 2);
        assert_eq!(metrics.citation_verification_rate, 0.5);
        assert_eq!(metrics.false_uncited_claims_rate, 0.5);
        assert_eq!(metrics.total_gaps, 1);
        assert_eq!(metrics.demographic_flagging_rate, 1.0);
        assert_eq!(metrics.median_response_time, 4.0);
        assert!(metrics.time_to_first_vetted_gap.is_some());
        assert_eq!(metrics.total_responses, 3);

        assert_ne!(tracker.session_id(), first_id);
        assert_eq!(tracker.history().len(), 1);
    }

    #[test]
    fn test_empty_session_has_zero_rates() {
        let tracker = MetricsTracker::new();
        let metrics = tracker.end_session();
        assert_eq!(metrics.total_claims, 0);
        assert_eq!(metrics.citation_verification_rate, 0.0);
        assert_eq!(metrics.median_response_time, 0.0);
        assert!(metrics.time_to_first_vetted_gap.is_none());
    }

    #[test]
    fn test_aggregate_against_targets() {
        let tracker = MetricsTracker::new();
        assert!(tracker.aggregate().is_none());

        tracker.set_evidence_available(true);
        tracker.record_response(
            "Racial bias in 9 of 10 dermatology datasets is documented (Groh, 2021).",
            Duration::from_secs(3),
        );
        tracker.end_session();

        let aggregate = tracker.aggregate().unwrap();
        assert_eq!(aggregate.total_sessions, 1);
        assert_eq!(aggregate.citation_verification_rate, 1.0);
        assert!(aggregate.targets_met.citation_verification);
        assert!(aggregate.targets_met.false_uncited_claims);
        assert!(aggregate.targets_met.demographic_flagging);
        assert!(aggregate.targets_met.response_time);
    }

    #[test]
    fn test_reset_clears_evidence() {
        let tracker = MetricsTracker::new();
        tracker.set_evidence_available(true);
        tracker.on_reset();
        tracker.record_response("There is a gap in minority data.", Duration::ZERO);
        let metrics = tracker.end_session();
        assert_eq!(metrics.total_gaps, 1);
        assert!(!metrics.gaps[0].has_sources);
    }
}
