use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::warn;

use crate::config::{EvalConfig, LexiconConfig};
use crate::error::Result;
use crate::lexicon::{ensure_available, Lexicon};
use crate::utils::normalize_token;

/// Decides whether two surface forms denote the same concept.
///
/// Implementations never fail: a word the oracle knows nothing about simply
/// has no synonyms, which leaves exact (case-normalised) equality.
pub trait SynonymOracle {
    fn are_synonyms(&self, a: &str, b: &str) -> bool;
}

impl<T: SynonymOracle + ?Sized> SynonymOracle for &T {
    fn are_synonyms(&self, a: &str, b: &str) -> bool {
        (**self).are_synonyms(a, b)
    }
}

impl<T: SynonymOracle + ?Sized> SynonymOracle for Arc<T> {
    fn are_synonyms(&self, a: &str, b: &str) -> bool {
        (**self).are_synonyms(a, b)
    }
}

/// Identity after case normalisation; no lexical knowledge.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatch;

impl SynonymOracle for ExactMatch {
    fn are_synonyms(&self, a: &str, b: &str) -> bool {
        normalize_token(a) == normalize_token(b)
    }
}

/// Explicit synonym groups. Two words are synonyms when they share a group.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    groups: HashMap<String, HashSet<usize>>,
    n_groups: usize,
}

impl SynonymTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.add_group(words);
        self
    }

    pub fn add_group<I, S>(&mut self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let id = self.n_groups;
        self.n_groups += 1;
        for word in words {
            self.groups
                .entry(normalize_token(word.as_ref()))
                .or_default()
                .insert(id);
        }
    }
}

impl SynonymOracle for SynonymTable {
    fn are_synonyms(&self, a: &str, b: &str) -> bool {
        let (a, b) = (normalize_token(a), normalize_token(b));
        if a == b {
            return true;
        }
        match (self.groups.get(&a), self.groups.get(&b)) {
            (Some(ga), Some(gb)) => !ga.is_disjoint(gb),
            _ => false,
        }
    }
}

/// WordNet-backed oracle: two words are synonyms when the lemma names of
/// their senses intersect. Without a lexicon it degrades to [`ExactMatch`].
#[derive(Debug, Clone, Default)]
pub struct WordNetOracle {
    lexicon: Option<Arc<Lexicon>>,
}

impl WordNetOracle {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self {
            lexicon: Some(lexicon),
        }
    }

    /// An oracle with no lexical knowledge.
    pub fn degraded() -> Self {
        Self { lexicon: None }
    }

    /// Provision the data if needed, then load it.
    pub fn from_config(config: &LexiconConfig) -> Result<Self> {
        ensure_available(config)?;
        let lexicon = Lexicon::load(&config.data_dir)?;
        Ok(Self::new(Arc::new(lexicon)))
    }

    pub fn is_degraded(&self) -> bool {
        self.lexicon.is_none()
    }
}

impl SynonymOracle for WordNetOracle {
    fn are_synonyms(&self, a: &str, b: &str) -> bool {
        if normalize_token(a) == normalize_token(b) {
            return true;
        }
        let Some(lexicon) = &self.lexicon else {
            return false;
        };
        let terms_a = lexicon.sense_terms(a);
        if terms_a.is_empty() {
            return false;
        }
        let terms_b = lexicon.sense_terms(b);
        !terms_a.is_disjoint(&terms_b)
    }
}

/// Process-wide oracle. The first access reads the environment
/// configuration, provisions WordNet at most once, and loads it.
pub static WORDNET: Lazy<Arc<WordNetOracle>> = Lazy::new(|| {
    let oracle = EvalConfig::from_env()
        .and_then(|config| WordNetOracle::from_config(&config.lexicon))
        .unwrap_or_else(|e| {
            warn!(error = %e, "WordNet unavailable, synonym matching falls back to exact equality");
            WordNetOracle::degraded()
        });
    Arc::new(oracle)
});

pub fn global_oracle() -> Arc<WordNetOracle> {
    WORDNET.clone()
}

/// Synonymy check against the process-wide WordNet oracle.
pub fn are_synonyms(a: &str, b: &str) -> bool {
    WORDNET.are_synonyms(a, b)
}
