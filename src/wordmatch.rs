use serde::{Deserialize, Serialize};

use crate::matcher::match_tuples;
use crate::synonym::SynonymOracle;
use crate::tuple::Tuple;
use crate::utils::Sequence;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordMatchReport {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Candidate words that found a synonymous reference word, in candidate order.
    pub matched_words: Vec<String>,
    pub candidate_tokens: Vec<String>,
    pub reference_tokens: Vec<String>,
}

fn word_tuples(seq: &Sequence) -> Vec<Tuple> {
    seq.word_vector
        .iter()
        .filter_map(|w| Tuple::new([w.as_str()]).ok())
        .collect()
}

/// Word-level binary comparison of two raw captions. Each word is a one-token
/// tuple, so matching is the same greedy first-fit as for scene-graph tuples.
pub fn compare_captions<O: SynonymOracle + ?Sized>(
    candidate: &str,
    reference: &str,
    oracle: &O,
) -> WordMatchReport {
    let cand = Sequence::new(candidate);
    let gold = Sequence::new(reference);

    // If one of the captions has no words there is nothing to compare,
    // which warrants a score of 0.
    if cand.is_empty() || gold.is_empty() {
        return WordMatchReport {
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
            matched_words: vec![],
            candidate_tokens: cand.word_vector,
            reference_tokens: gold.word_vector,
        };
    }

    let res = match_tuples(&word_tuples(&cand), &word_tuples(&gold), oracle);
    let matched_words = res
        .pairs
        .iter()
        .map(|m| cand.word_vector[m.hypothesis].clone())
        .collect();

    WordMatchReport {
        precision: res.precision,
        recall: res.recall,
        f1: res.f1,
        matched_words,
        candidate_tokens: cand.word_vector,
        reference_tokens: gold.word_vector,
    }
}
