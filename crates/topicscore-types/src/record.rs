//! Text records and their scored counterparts.

use serde::{Deserialize, Serialize};

/// Neutral polarity assigned when a record cannot be scored.
pub const NEUTRAL_SCORE: f64 = 0.0;

/// Half-width of the neutral band. Scores within `[-0.1, 0.1]` are neutral.
pub const NEUTRAL_BAND: f64 = 0.1;

/// Coarse polarity label derived from a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    /// Label `score`. Non-finite scores are neutral.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score > NEUTRAL_BAND {
            Self::Positive
        } else if score < -NEUTRAL_BAND {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of corpus text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Zero-based line number in the source file.
    pub line: u64,
    pub text: String,
}

impl Record {
    #[must_use]
    pub fn new(line: u64, text: impl Into<String>) -> Self {
        Self {
            line,
            text: text.into(),
        }
    }
}

/// A record paired with its polarity score in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub line: u64,
    pub text: String,
    pub score: f64,
}

impl ScoredRecord {
    /// Attach `score` to `record`.
    ///
    /// The caller is responsible for range-checking `score`.
    #[must_use]
    pub fn new(record: Record, score: f64) -> Self {
        Self {
            line: record.line,
            text: record.text,
            score,
        }
    }

    /// Pair `record` with [`NEUTRAL_SCORE`].
    #[must_use]
    pub fn neutral(record: Record) -> Self {
        Self::new(record, NEUTRAL_SCORE)
    }

    #[must_use]
    pub fn sentiment(&self) -> Sentiment {
        Sentiment::from_score(self.score)
    }
}

/// A contiguous run of records handed to a single worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub index: usize,
    pub records: Vec<Record>,
}

impl Partition {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
