use serde::{Deserialize, Serialize};

use crate::synonym::SynonymOracle;
use crate::tuple::Tuple;
use crate::utils::{f1_from, ratio};

/// A hypothesis tuple bound to the reference tuple it consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub hypothesis: usize,
    pub reference: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub matched: usize,
    pub pairs: Vec<Match>,
}

impl MatchResult {
    /// `(precision, recall, f1, matched)`.
    pub fn summary(&self) -> (f64, f64, f64, usize) {
        (self.precision, self.recall, self.f1, self.matched)
    }
}

/// Equal arity and every position synonymous.
pub fn tuples_match<O: SynonymOracle + ?Sized>(hyp: &Tuple, reference: &Tuple, oracle: &O) -> bool {
    hyp.arity() == reference.arity()
        && hyp
            .tokens()
            .iter()
            .zip(reference.tokens())
            .all(|(h, r)| oracle.are_synonyms(h, r))
}

/// Greedy first-fit matching of hypothesis tuples against reference tuples.
///
/// Hypotheses are visited in order and each binds to the first reference that
/// is still unused and matches position by position. A bound reference is
/// never reconsidered, so the result depends on input order and is not a
/// maximum matching.
pub fn match_tuples<O: SynonymOracle + ?Sized>(
    hypothesis: &[Tuple],
    references: &[Tuple],
    oracle: &O,
) -> MatchResult {
    let mut used = vec![false; references.len()];
    let mut pairs = vec![];

    for (h_idx, hyp) in hypothesis.iter().enumerate() {
        let found = references
            .iter()
            .enumerate()
            .find(|(r_idx, reference)| !used[*r_idx] && tuples_match(hyp, reference, oracle));
        if let Some((r_idx, _)) = found {
            used[r_idx] = true;
            pairs.push(Match {
                hypothesis: h_idx,
                reference: r_idx,
            });
        }
    }

    let matched = pairs.len();
    let precision = ratio(matched, hypothesis.len());
    let recall = ratio(matched, references.len());
    MatchResult {
        precision,
        recall,
        f1: f1_from(precision, recall),
        matched,
        pairs,
    }
}
