use proptest::prelude::*;
use topicscore_engine::pool::score_record;
use topicscore_engine::{LexiconScorer, ScoreError};
use topicscore_types::Record;

fn raw_scores() -> impl Strategy<Value = f64> {
    prop_oneof![
        any::<f64>(),
        Just(f64::NAN),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
        -1.0..=1.0f64,
    ]
}

proptest! {
    #[test]
    fn fail_soft_score_is_always_in_range(raw in raw_scores(), text in ".{0,64}") {
        let scorer = move |_: &str| -> Result<f64, ScoreError> { Ok(raw) };
        let scored = score_record(&scorer, &Record::new(0, text.clone()));
        prop_assert!(scored.score.is_finite());
        prop_assert!((-1.0..=1.0).contains(&scored.score));
        prop_assert_eq!(scored.text, text);
    }

    #[test]
    fn in_range_scores_pass_through(raw in -1.0..=1.0f64) {
        let scorer = move |_: &str| -> Result<f64, ScoreError> { Ok(raw) };
        let scored = score_record(&scorer, &Record::new(3, "x"));
        prop_assert_eq!(scored.score, raw);
        prop_assert_eq!(scored.line, 3);
    }

    #[test]
    fn lexicon_scorer_stays_in_range(text in "\\PC{0,200}") {
        let scored = score_record(&LexiconScorer::default(), &Record::new(0, text));
        prop_assert!((-1.0..=1.0).contains(&scored.score));
    }

    #[test]
    fn scorer_errors_are_neutral(text in ".{0,64}") {
        let scorer = |_: &str| -> Result<f64, ScoreError> { Err(ScoreError::Timeout) };
        let scored = score_record(&scorer, &Record::new(0, text));
        prop_assert_eq!(scored.score, 0.0);
    }
}
