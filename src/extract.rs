//! Rule-based scene-graph tuple extraction.
//!
//! A lookup-table and suffix-rule tagger feeding three patterns: adjacent
//! adjective/noun pairs, a subject-verb(-object) relation per sentence, and
//! noun-preposition-noun relations. No learned model is involved, so the
//! output is a rough stand-in for a real scene-graph parser.

use std::collections::HashSet;
use std::fmt;

use crate::tuple::{Category, Tuple};
use crate::utils::str_to_word_vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PosTag {
    Noun,
    PluralNoun,
    Verb,
    Adjective,
    Adverb,
    Determiner,
    Preposition,
    Conjunction,
    Pronoun,
}

impl PosTag {
    /// Penn Treebank style label.
    pub fn as_str(&self) -> &'static str {
        match self {
            PosTag::Noun => "NN",
            PosTag::PluralNoun => "NNS",
            PosTag::Verb => "VB",
            PosTag::Adjective => "JJ",
            PosTag::Adverb => "RB",
            PosTag::Determiner => "DT",
            PosTag::Preposition => "IN",
            PosTag::Conjunction => "CC",
            PosTag::Pronoun => "PRP",
        }
    }

    pub fn is_noun(&self) -> bool {
        matches!(self, PosTag::Noun | PosTag::PluralNoun)
    }
}

impl fmt::Display for PosTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const DETERMINERS: &[&str] = &[
    "a", "an", "the", "this", "that", "these", "those", "some", "any", "each", "every", "its",
    "his", "her", "their", "our", "my", "your",
];
const PREPOSITIONS: &[&str] = &[
    "in", "on", "at", "through", "over", "under", "with", "by", "of", "from", "to", "into",
    "onto", "near", "beside", "behind", "above", "below", "across", "along", "around", "upon",
];
const CONJUNCTIONS: &[&str] = &["and", "or", "but", "while"];
const PRONOUNS: &[&str] = &["it", "he", "she", "they", "we", "i", "you", "him", "them"];

const COMMON_VERBS: &[&str] = &[
    "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "run",
    "runs", "running", "ran", "sprint", "sprints", "sprinting", "sprinted", "move", "moves",
    "moving", "moved", "walk", "walks", "walking", "walked", "sit", "sits", "sat", "stand",
    "stands", "stood", "ride", "rides", "rode", "hold", "holds", "held", "eat", "eats", "ate",
];
const COMMON_ADJECTIVES: &[&str] = &[
    "big", "small", "large", "tiny", "dark", "light", "bright", "green", "blue", "red", "yellow",
    "brown", "black", "white", "grassy", "beautiful", "ugly", "happy", "sad", "quick", "slow",
    "young", "old", "tall", "short", "crimson",
];
const COMMON_ADVERBS: &[&str] = &[
    "quickly", "slowly", "happily", "sadly", "very", "really", "quite", "rather", "too", "so",
    "well", "badly",
];

/// Prepositions that link two objects spatially.
const SPATIAL: &[&str] = &["in", "on", "at", "through", "over", "under"];

const VERB_SUFFIXES: &[&str] = &["ed", "ing", "ize", "ise", "ify", "ate"];
const ADJECTIVE_SUFFIXES: &[&str] = &["al", "ful", "ous", "ive", "able", "ible", "ic", "ical", "y"];
const PLURAL_SUFFIXES: &[&str] = &["s", "es"];

pub fn pos_tag(word: &str) -> PosTag {
    let word = word.to_lowercase();
    let w = word.as_str();

    if DETERMINERS.contains(&w) {
        return PosTag::Determiner;
    }
    if PREPOSITIONS.contains(&w) {
        return PosTag::Preposition;
    }
    if CONJUNCTIONS.contains(&w) {
        return PosTag::Conjunction;
    }
    if PRONOUNS.contains(&w) {
        return PosTag::Pronoun;
    }
    if COMMON_VERBS.contains(&w) {
        return PosTag::Verb;
    }
    if COMMON_ADJECTIVES.contains(&w) {
        return PosTag::Adjective;
    }
    if COMMON_ADVERBS.contains(&w) {
        return PosTag::Adverb;
    }

    let ends_with_any = |suffixes: &[&str]| suffixes.iter().any(|s| w.ends_with(s));
    if ends_with_any(VERB_SUFFIXES) {
        PosTag::Verb
    } else if w.ends_with("ly") {
        PosTag::Adverb
    } else if ends_with_any(ADJECTIVE_SUFFIXES) {
        PosTag::Adjective
    } else if ends_with_any(PLURAL_SUFFIXES) {
        PosTag::PluralNoun
    } else {
        PosTag::Noun
    }
}

fn split_sentences(caption: &str) -> impl Iterator<Item = &str> {
    caption
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn tag_sentence(sentence: &str) -> Vec<(String, PosTag)> {
    str_to_word_vec(sentence)
        .into_iter()
        .map(|w| {
            let tag = pos_tag(&w);
            (w, tag)
        })
        .filter(|(_, tag)| *tag != PosTag::Determiner)
        .collect()
}

fn sentence_tuples(tagged: &[(String, PosTag)]) -> Vec<(Vec<String>, Category)> {
    let mut tuples: Vec<(Vec<String>, Category)> = vec![];

    for pair in tagged.windows(2) {
        let (first, second) = (&pair[0], &pair[1]);
        if first.1.is_noun() && second.1 == PosTag::Adjective {
            tuples.push((vec![first.0.clone(), second.0.clone()], Category::Attribute));
        } else if first.1 == PosTag::Adjective && second.1.is_noun() {
            tuples.push((vec![second.0.clone(), first.0.clone()], Category::Attribute));
        }
    }

    let nouns: Vec<&String> = tagged.iter().filter(|(_, t)| t.is_noun()).map(|(w, _)| w).collect();
    let verbs: Vec<&str> = tagged
        .iter()
        .filter(|(_, t)| *t == PosTag::Verb)
        .map(|(w, _)| w.as_str())
        .collect();
    if let (Some(subject), false) = (nouns.first(), verbs.is_empty()) {
        let verb_phrase = verbs.join(" ");
        let tokens = match nouns.get(1) {
            Some(object) => vec![subject.to_string(), verb_phrase, object.to_string()],
            None => vec![subject.to_string(), verb_phrase],
        };
        tuples.push((tokens, Category::Relation));
    }

    for triple in tagged.windows(3) {
        let (subject, prep, object) = (&triple[0], &triple[1], &triple[2]);
        if subject.1.is_noun() && SPATIAL.contains(&prep.0.as_str()) && object.1.is_noun() {
            tuples.push((
                vec![subject.0.clone(), prep.0.clone(), object.0.clone()],
                Category::Relation,
            ));
        }
    }

    tuples
}

/// Extract attribute pairs and relation triples from a caption. Duplicates
/// are dropped keeping the first occurrence; pairs compare order-insensitively.
pub fn extract_tuples(caption: &str) -> Vec<Tuple> {
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut out = vec![];

    for sentence in split_sentences(caption) {
        let tagged = tag_sentence(sentence);
        for (tokens, category) in sentence_tuples(&tagged) {
            let mut key = tokens.clone();
            if key.len() == 2 {
                key.sort();
            }
            if !seen.insert(key) {
                continue;
            }
            if let Ok(tuple) = Tuple::new(tokens) {
                out.push(tuple.with_category(category));
            }
        }
    }
    out
}
