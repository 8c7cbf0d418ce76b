//! Pipeline run result types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use topicscore_types::{ScoredRecord, Sentiment, Topic};

/// Counts and timings for a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub topic: Topic,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub records_read: u64,
    pub records_scored: u64,
    pub partitions: usize,
    pub resubmissions: u32,
    pub workers: u32,
    pub duration_secs: f64,
}

/// Per-label record counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SentimentBreakdown {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

impl SentimentBreakdown {
    #[must_use]
    pub fn total(&self) -> usize {
        self.positive + self.negative + self.neutral
    }

    fn add(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Negative => self.negative += 1,
            Sentiment::Neutral => self.neutral += 1,
        }
    }
}

/// Scored lines of one corpus, in source line order.
#[derive(Debug, Clone, Serialize)]
pub struct ResultSet {
    pub records: Vec<ScoredRecord>,
    pub summary: RunSummary,
}

impl ResultSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredRecord> {
        self.records.iter()
    }

    /// `(text, score)` pairs, the shape the presentation layer renders.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.records.iter().map(|r| (r.text.as_str(), r.score))
    }

    /// Mean polarity across all records, `None` when empty.
    #[must_use]
    pub fn mean_score(&self) -> Option<f64> {
        if self.records.is_empty() {
            return None;
        }
        let sum: f64 = self.records.iter().map(|r| r.score).sum();
        #[allow(clippy::cast_precision_loss)]
        let n = self.records.len() as f64;
        Some(sum / n)
    }

    /// Count records by [`Sentiment`] label.
    #[must_use]
    pub fn breakdown(&self) -> SentimentBreakdown {
        let mut counts = SentimentBreakdown::default();
        for record in &self.records {
            counts.add(record.sentiment());
        }
        counts
    }
}

impl IntoIterator for ResultSet {
    type Item = ScoredRecord;
    type IntoIter = std::vec::IntoIter<ScoredRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a ScoredRecord;
    type IntoIter = std::slice::Iter<'a, ScoredRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
