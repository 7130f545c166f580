// ===============================
// src/signal.rs
// ===============================
//
// Detektor sinyal dari post sosial:
// - author di luar allow-list            -> Ignore
// - signal source + keyword + sentiment  -> EnterLong (hanya kalau Flat)
// - commentary source                    -> Informational (log saja)
//
// Keyword matcher sengaja sederhana (regex, toleran homoglyph) dan TIDAK
// tervalidasi secara statistik.
//
use regex::Regex;

use crate::domain::{Phase, SocialEvent, TriggerDecision};

/// Matches "doge" case-insensitively, tolerating a few lookalike glyphs
/// ("√oge", "Êoge", "d0ge").
pub const DEFAULT_KEYWORD_PATTERN: &str = r"(?i)[√êd][o0]ge";

/// Sentiment gate in front of every entry. Implementations must be cheap;
/// they run on the control task.
pub trait Sentiment: Send + Sync {
    fn is_positive(&self, text: &str) -> bool;
}

/// Placeholder gate: every mention counts as positive.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysPositive;

impl Sentiment for AlwaysPositive {
    fn is_positive(&self, _text: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authors {
    pub signal_source: u64,
    pub commentary: u64,
}

impl Authors {
    pub fn contains(&self, id: u64) -> bool {
        id == self.signal_source || id == self.commentary
    }
}

pub struct SignalDetector {
    authors: Authors,
    keyword: Regex,
    sentiment: Box<dyn Sentiment>,
}

impl SignalDetector {
    pub fn new(authors: Authors, keyword_pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            authors,
            keyword: Regex::new(keyword_pattern)?,
            sentiment: Box::new(AlwaysPositive),
        })
    }

    pub fn with_sentiment(mut self, sentiment: Box<dyn Sentiment>) -> Self {
        self.sentiment = sentiment;
        self
    }

    pub fn authors(&self) -> Authors {
        self.authors
    }

    pub fn mentions_keyword(&self, text: &str) -> bool {
        self.keyword.is_match(text)
    }

    pub fn detect(&self, ev: &SocialEvent, phase: Phase) -> TriggerDecision {
        if !self.authors.contains(ev.author_id) {
            return TriggerDecision::Ignore;
        }
        if ev.author_id == self.authors.commentary && ev.author_id != self.authors.signal_source {
            return TriggerDecision::Informational;
        }

        let text = ev.full_text();
        if self.mentions_keyword(text) && self.sentiment.is_positive(text) && phase == Phase::Flat {
            TriggerDecision::EnterLong
        } else {
            TriggerDecision::Ignore
        }
    }
}
