use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::matcher::{match_tuples, MatchResult};
use crate::synonym::SynonymOracle;
use crate::tuple::{pool_references, subset, tuple_set, Category, RawTuple, Tuple};

/// Precision, recall and F1 for one caption or one corpus. Field names on the
/// wire follow the SPICE output (`p`/`pr`, `r`/`re`, `f`). Missing or `null`
/// values read as 0.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreRecord {
    #[serde(rename = "p", alias = "pr", default, deserialize_with = "null_as_zero")]
    pub precision: f64,
    #[serde(rename = "r", alias = "re", default, deserialize_with = "null_as_zero")]
    pub recall: f64,
    #[serde(rename = "f", default, deserialize_with = "null_as_zero")]
    pub f1: f64,
}

fn null_as_zero<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

impl ScoreRecord {
    pub fn zero() -> Self {
        Self::default()
    }
}

impl From<&MatchResult> for ScoreRecord {
    fn from(res: &MatchResult) -> Self {
        ScoreRecord {
            precision: res.precision,
            recall: res.recall,
            f1: res.f1,
        }
    }
}

/// One (hypothesis, references) pair as produced by the tuple extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalItem {
    pub image_id: String,
    pub hypothesis: Vec<RawTuple>,
    pub references: Vec<Vec<RawTuple>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemScore {
    pub image_id: String,
    pub scores: BTreeMap<Category, ScoreRecord>,
}

impl ItemScore {
    /// The score substituted for an item whose evaluation failed.
    pub fn zeroed(image_id: &str, categories: &[Category]) -> Self {
        ItemScore {
            image_id: image_id.to_string(),
            scores: with_all(categories)
                .into_iter()
                .map(|c| (c, ScoreRecord::zero()))
                .collect(),
        }
    }

    pub fn get(&self, category: Category) -> ScoreRecord {
        self.scores.get(&category).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub index: usize,
    pub image_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusScore {
    pub items: usize,
    /// Mean of the per-item `All` records.
    pub mean: ScoreRecord,
    pub per_category: BTreeMap<Category, ScoreRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// One entry per input item, in input order.
    pub items: Vec<ItemScore>,
    pub failures: Vec<ItemFailure>,
    pub corpus: CorpusScore,
}

/// `All` first, then the requested categories in order, without repeats.
fn with_all(categories: &[Category]) -> Vec<Category> {
    let mut out = vec![Category::All];
    for &c in categories {
        if !out.contains(&c) {
            out.push(c);
        }
    }
    out
}

/// Score validated tuples for the `All` pool plus each requested category.
/// Every category runs the matcher on its own subset of both sides, with the
/// references pooled per category.
pub fn score_tuples<O: SynonymOracle + ?Sized>(
    hypothesis: &[Tuple],
    references: &[Vec<Tuple>],
    categories: &[Category],
    oracle: &O,
) -> BTreeMap<Category, ScoreRecord> {
    with_all(categories)
        .into_iter()
        .map(|category| {
            let hyp = subset(hypothesis, category);
            let refs = pool_references(references, category);
            let res = match_tuples(&hyp, &refs, oracle);
            (category, ScoreRecord::from(&res))
        })
        .collect()
}

pub fn score_item<O: SynonymOracle + ?Sized>(
    item: &EvalItem,
    categories: &[Category],
    oracle: &O,
) -> Result<ItemScore> {
    let hypothesis = tuple_set(item.hypothesis.clone())?;
    let references = item
        .references
        .iter()
        .map(|r| tuple_set(r.clone()))
        .collect::<Result<Vec<_>>>()?;

    Ok(ItemScore {
        image_id: item.image_id.clone(),
        scores: score_tuples(&hypothesis, &references, categories, oracle),
    })
}

/// Score every item in order. An item that fails (e.g. a malformed tuple) is
/// replaced by [`ItemScore::zeroed`] and listed in `failures`; it still counts
/// towards the corpus mean, and its siblings are scored normally.
pub fn score_batch<O: SynonymOracle + ?Sized>(
    items: &[EvalItem],
    categories: &[Category],
    oracle: &O,
) -> BatchReport {
    let mut scores = Vec::with_capacity(items.len());
    let mut failures = vec![];

    for (index, item) in items.iter().enumerate() {
        match score_item(item, categories, oracle) {
            Ok(score) => scores.push(score),
            Err(e) => {
                warn!(index, image_id = %item.image_id, error = %e, "Item failed, substituting zero score");
                failures.push(ItemFailure {
                    index,
                    image_id: item.image_id.clone(),
                    error: e.to_string(),
                });
                scores.push(ItemScore::zeroed(&item.image_id, categories));
            }
        }
    }

    let corpus = aggregate(&scores);
    BatchReport {
        items: scores,
        failures,
        corpus,
    }
}

/// Unweighted arithmetic mean over items. An empty batch yields zeros.
/// A category an item did not report counts as zero for that item.
pub fn aggregate(items: &[ItemScore]) -> CorpusScore {
    let mut per_category: BTreeMap<Category, ScoreRecord> = BTreeMap::new();
    if items.is_empty() {
        return CorpusScore {
            items: 0,
            mean: ScoreRecord::zero(),
            per_category,
        };
    }

    let n = items.len() as f64;
    let categories: Vec<Category> = {
        let mut cats: Vec<Category> = items.iter().flat_map(|i| i.scores.keys().copied()).collect();
        cats.sort();
        cats.dedup();
        cats
    };

    for category in categories {
        let mut sum = ScoreRecord::zero();
        for item in items {
            let record = item.get(category);
            sum.precision += record.precision;
            sum.recall += record.recall;
            sum.f1 += record.f1;
        }
        per_category.insert(
            category,
            ScoreRecord {
                precision: sum.precision / n,
                recall: sum.recall / n,
                f1: sum.f1 / n,
            },
        );
    }

    CorpusScore {
        items: items.len(),
        mean: per_category.get(&Category::All).copied().unwrap_or_default(),
        per_category,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synonym::{ExactMatch, SynonymTable};

    fn raw(tokens: &[&str]) -> RawTuple {
        RawTuple {
            tuple: tokens.iter().map(|s| s.to_string()).collect(),
            category: None,
        }
    }

    fn item(id: &str, hyp: Vec<RawTuple>, refs: Vec<Vec<RawTuple>>) -> EvalItem {
        EvalItem {
            image_id: id.to_string(),
            hypothesis: hyp,
            references: refs,
        }
    }

    fn close_enough(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_per_category_independent() {
        let oracle = SynonymTable::new().with_group(["big", "large"]);
        let it = item(
            "img1",
            vec![raw(&["dog"]), raw(&["dog", "big"]), raw(&["dog", "on", "grass"])],
            vec![vec![raw(&["dog"]), raw(&["dog", "large"])]],
        );
        let score = score_item(&it, &Category::CORE, &oracle).unwrap();

        let all = score.get(Category::All);
        assert!(close_enough(all.precision, 2.0 / 3.0, 1e-9));
        assert_eq!(all.recall, 1.0);

        assert_eq!(score.get(Category::Object).f1, 1.0);
        assert_eq!(score.get(Category::Attribute).f1, 1.0);
        // No reference relations: recall guard keeps everything at zero.
        assert_eq!(score.get(Category::Relation), ScoreRecord::zero());
    }

    #[test]
    fn test_all_pool_always_scored() {
        let it = item("x", vec![raw(&["cat"])], vec![vec![raw(&["cat"])]]);
        let score = score_item(&it, &[Category::Relation], &ExactMatch).unwrap();
        let keys: Vec<Category> = score.scores.keys().copied().collect();
        assert_eq!(keys, vec![Category::All, Category::Relation]);
        assert_eq!(score.get(Category::All).f1, 1.0);
    }

    #[test]
    fn test_references_are_pooled() {
        let it = item(
            "img",
            vec![raw(&["dog"]), raw(&["park"])],
            vec![vec![raw(&["dog"])], vec![raw(&["park"]), raw(&["dog"])]],
        );
        let score = score_item(&it, &[], &ExactMatch).unwrap();
        let all = score.get(Category::All);
        assert_eq!(all.precision, 1.0);
        assert_eq!(all.recall, 1.0);
    }

    #[test]
    fn test_tagged_categories_respected() {
        let mut color = raw(&["car", "red"]);
        color.category = Some(Category::Color);
        let it = item("c", vec![color.clone()], vec![vec![color]]);
        let score = score_item(&it, &[Category::Color, Category::Attribute], &ExactMatch).unwrap();
        assert_eq!(score.get(Category::Color).f1, 1.0);
        assert_eq!(score.get(Category::Attribute).f1, 0.0);
    }

    #[test]
    fn test_duplicate_reference_keeps_both_tags() {
        let mut color = raw(&["car", "red"]);
        color.category = Some(Category::Color);
        let it = item(
            "c",
            vec![color.clone()],
            vec![vec![raw(&["car", "red"])], vec![color]],
        );
        let score = score_item(&it, &[Category::Color, Category::Attribute], &ExactMatch).unwrap();
        assert_eq!(score.get(Category::Color).f1, 1.0);
        assert_eq!(score.get(Category::Attribute).recall, 0.0);
        // One pooled reference in the All pool, not two.
        assert_eq!(score.get(Category::All).recall, 1.0);
    }

    #[test]
    fn test_batch_substitutes_failed_items() {
        let items = vec![
            item("ok", vec![raw(&["cat"])], vec![vec![raw(&["cat"])]]),
            item("bad", vec![raw(&["a", "b", "c", "d"])], vec![vec![raw(&["cat"])]]),
            item("half", vec![raw(&["cat"]), raw(&["dog"])], vec![vec![raw(&["cat"])]]),
        ];
        let report = score_batch(&items, &Category::CORE, &ExactMatch);

        assert_eq!(report.items.len(), 3);
        assert_eq!(report.items[1].image_id, "bad");
        assert_eq!(report.items[1], ItemScore::zeroed("bad", &Category::CORE));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);

        // (1.0 + 0.0 + 2/3) / 3
        assert!(close_enough(report.corpus.mean.f1, (1.0 + 2.0 / 3.0) / 3.0, 1e-9));
        assert_eq!(report.corpus.items, 3);
    }

    #[test]
    fn test_aggregate_empty_batch() {
        let corpus = aggregate(&[]);
        assert_eq!(corpus.items, 0);
        assert_eq!(corpus.mean, ScoreRecord::zero());
        assert!(corpus.per_category.is_empty());
    }

    #[test]
    fn test_aggregate_missing_category_counts_zero() {
        let mut a = ItemScore::zeroed("a", &[Category::Object]);
        a.scores.insert(
            Category::Object,
            ScoreRecord {
                precision: 1.0,
                recall: 1.0,
                f1: 1.0,
            },
        );
        let b = ItemScore::zeroed("b", &[]);
        let corpus = aggregate(&[a, b]);
        assert_eq!(corpus.per_category[&Category::Object].f1, 0.5);
        assert_eq!(corpus.mean.f1, 0.0);
    }

    #[test]
    fn test_score_record_wire_names() {
        let rec: ScoreRecord = serde_json::from_str(r#"{"pr": 0.5, "re": 0.25, "f": 0.3, "tp": 3}"#).unwrap();
        assert_eq!(rec.precision, 0.5);
        assert_eq!(rec.recall, 0.25);
        let rec: ScoreRecord = serde_json::from_str(r#"{"p": 0.7}"#).unwrap();
        assert_eq!(rec.f1, 0.0);
        assert_eq!(serde_json::to_string(&ScoreRecord::zero()).unwrap(), r#"{"p":0.0,"r":0.0,"f":0.0}"#);
    }

    #[test]
    fn test_score_record_null_reads_as_zero() {
        let rec: ScoreRecord = serde_json::from_str(r#"{"pr": null, "re": 0.5, "f": null}"#).unwrap();
        assert_eq!(rec.precision, 0.0);
        assert_eq!(rec.recall, 0.5);
        assert_eq!(rec.f1, 0.0);
    }
}
