//! Scoring contract and the built-in lexicon scorer.
//!
//! The pipeline treats scoring as an injected pure function from text to a
//! polarity in `[-1.0, 1.0]`. Implementations may fail or return garbage;
//! the worker pool absorbs both (see [`crate::pool::score_record`]).

use std::collections::HashMap;

/// Failure reported by a [`ScoringFunction`] for a single text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoreError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("scoring timed out")]
    Timeout,

    #[error("scoring failed: {0}")]
    Failed(String),
}

/// Maps text to a polarity score.
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// worker of a run.
pub trait ScoringFunction: Send + Sync {
    /// Score `text`.
    ///
    /// # Errors
    ///
    /// Any error is mapped to a neutral score by the caller.
    fn score(&self, text: &str) -> Result<f64, ScoreError>;
}

impl<F> ScoringFunction for F
where
    F: Fn(&str) -> Result<f64, ScoreError> + Send + Sync,
{
    fn score(&self, text: &str) -> Result<f64, ScoreError> {
        self(text)
    }
}

/// Force `raw` into `[-1.0, 1.0]`. NaN becomes neutral.
#[must_use]
pub fn clamp_polarity(raw: f64) -> f64 {
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(-1.0, 1.0)
    }
}

const NEGATORS: &[&str] = &["not", "no", "never", "nothing", "nobody", "neither", "nor"];
const INTENSIFIERS: &[(&str, f64)] = &[
    ("very", 1.3),
    ("really", 1.3),
    ("extremely", 1.5),
    ("super", 1.3),
    ("so", 1.2),
    ("quite", 1.1),
    ("slightly", 0.6),
    ("somewhat", 0.7),
];
const NEGATION_FACTOR: f64 = -0.5;

const BUILTIN_LEXICON: &[(&str, f64)] = &[
    ("amazing", 0.6),
    ("awesome", 1.0),
    ("beautiful", 0.85),
    ("best", 1.0),
    ("better", 0.5),
    ("brilliant", 0.9),
    ("excellent", 1.0),
    ("fantastic", 0.4),
    ("fast", 0.2),
    ("fine", 0.4),
    ("good", 0.7),
    ("great", 0.8),
    ("happy", 0.8),
    ("helpful", 0.5),
    ("like", 0.3),
    ("love", 0.5),
    ("nice", 0.6),
    ("perfect", 1.0),
    ("pleased", 0.5),
    ("recommend", 0.4),
    ("reliable", 0.5),
    ("wonderful", 1.0),
    ("angry", -0.5),
    ("awful", -1.0),
    ("bad", -0.7),
    ("boring", -1.0),
    ("broken", -0.4),
    ("disappointing", -0.6),
    ("hate", -0.8),
    ("horrible", -1.0),
    ("poor", -0.4),
    ("sad", -0.5),
    ("slow", -0.3),
    ("terrible", -1.0),
    ("ugly", -0.7),
    ("unhappy", -0.6),
    ("useless", -0.5),
    ("worse", -0.4),
    ("worst", -1.0),
    ("wrong", -0.5),
];

/// Word-polarity lexicon scorer with simple negation and intensifier handling.
///
/// The score is the mean polarity of the sentiment-bearing words found in the
/// text, so a line with no known words scores `0.0`.
#[derive(Debug, Clone)]
pub struct LexiconScorer {
    lexicon: HashMap<String, f64>,
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self::with_entries(BUILTIN_LEXICON.iter().map(|(w, p)| ((*w).to_string(), *p)))
    }
}

impl LexiconScorer {
    /// Build a scorer from `(word, polarity)` pairs. Words are lowercased.
    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        Self {
            lexicon: entries
                .into_iter()
                .map(|(word, polarity)| (word.to_lowercase(), clamp_polarity(polarity)))
                .collect(),
        }
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }
}

impl ScoringFunction for LexiconScorer {
    fn score(&self, text: &str) -> Result<f64, ScoreError> {
        if text.contains('\0') {
            return Err(ScoreError::MalformedInput("embedded NUL byte".into()));
        }

        let mut total = 0.0;
        let mut hits = 0u32;
        let mut modifier = 1.0;

        for token in Self::tokens(text) {
            let bare = token.trim_matches('\'');
            if NEGATORS.contains(&bare) || bare.ends_with("n't") {
                modifier *= NEGATION_FACTOR;
                continue;
            }
            if let Some((_, factor)) = INTENSIFIERS.iter().find(|(w, _)| *w == bare) {
                modifier *= factor;
                continue;
            }
            if let Some(polarity) = self.lexicon.get(bare) {
                total += clamp_polarity(polarity * modifier);
                hits += 1;
            }
            modifier = 1.0;
        }

        if hits == 0 {
            return Ok(0.0);
        }
        Ok(clamp_polarity(total / f64::from(hits)))
    }
}
