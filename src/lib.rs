//! Scene-graph caption scoring.
//!
//! Captions are compared as sets of `(object)`, `(object, attribute)` and
//! `(subject, relation, object)` tuples. A hypothesis tuple matches a reference
//! tuple when every position is synonymous according to a [`SynonymOracle`];
//! matches are found greedily and turned into precision, recall and F1 per
//! category, then averaged over a corpus.

pub mod config;
pub mod error;
pub mod extract;
pub mod lexicon;
pub mod matcher;
pub mod score;
pub mod similarity;
pub mod spice;
pub mod stream;
pub mod synonym;
pub mod tuple;
pub mod utils;
pub mod wordmatch;

#[cfg(feature = "python")]
mod python;

use tracing_subscriber::EnvFilter;

pub use config::EvalConfig;
pub use error::{EvalError, Result};
pub use matcher::{match_tuples, Match, MatchResult};
pub use score::{aggregate, score_batch, score_item, BatchReport, CorpusScore, EvalItem, ItemScore, ScoreRecord};
pub use synonym::{are_synonyms, SynonymOracle, SynonymTable, WordNetOracle};
pub use tuple::{Category, RawTuple, Tuple};

const DEFAULT_LOG_FILTER: &str = "captionscore=info";

/// Install a stderr `fmt` subscriber. `filter` takes precedence over
/// `CAPTIONSCORE_LOG`. Calling this again, or after the host application has
/// installed its own subscriber, is a no-op.
pub fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_env(format!("{}_LOG", config::ENV_PREFIX))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(Some("captionscore=debug"));
        init_logging(None);
        tracing::info!("still alive");
    }

    #[test]
    fn test_pipeline_from_json() {
        let items: Vec<EvalItem> = serde_json::from_str(
            r#"[
                {"image_id": "1",
                 "hypothesis": [{"tuple": ["dog"]}, {"tuple": ["dog", "big"]}],
                 "references": [[{"tuple": ["dog"]}, {"tuple": ["dog", "large"]}]]},
                {"image_id": "2",
                 "hypothesis": [],
                 "references": [[{"tuple": ["cat"]}]]}
            ]"#,
        )
        .unwrap();
        let oracle = SynonymTable::new().with_group(["big", "large"]);
        let report = score_batch(&items, &Category::CORE, &oracle);

        assert!(report.failures.is_empty());
        assert_eq!(report.items[0].get(Category::All).f1, 1.0);
        assert_eq!(report.items[1].get(Category::All).f1, 0.0);
        assert_eq!(report.corpus.mean.f1, 0.5);
    }
}
