//! Semantic tuples extracted from a caption.
//!
//! A tuple is an object `(dog)`, an attribute pair `(dog, brown)` or a
//! relation triple `(dog, in, park)`. Tuples optionally carry the category
//! label the extractor assigned; untagged tuples fall back to the category
//! implied by their arity.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::utils::normalize_token;

pub const MAX_ARITY: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    All,
    Object,
    Attribute,
    Relation,
    Cardinality,
    Color,
    Count,
    Size,
}

impl Category {
    pub const CORE: [Category; 4] = [
        Category::All,
        Category::Object,
        Category::Attribute,
        Category::Relation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::All => "All",
            Category::Object => "Object",
            Category::Attribute => "Attribute",
            Category::Relation => "Relation",
            Category::Cardinality => "Cardinality",
            Category::Color => "Color",
            Category::Count => "Count",
            Category::Size => "Size",
        }
    }

    fn from_arity(arity: usize) -> Category {
        match arity {
            1 => Category::Object,
            2 => Category::Attribute,
            _ => Category::Relation,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Category::All),
            "object" => Ok(Category::Object),
            "attribute" => Ok(Category::Attribute),
            "relation" => Ok(Category::Relation),
            "cardinality" => Ok(Category::Cardinality),
            "color" | "colour" => Ok(Category::Color),
            "count" => Ok(Category::Count),
            "size" => Ok(Category::Size),
            _ => Err(EvalError::UnknownCategory(s.to_string())),
        }
    }
}

/// Wire shape of a tuple: `{"tuple": ["dog", "brown"]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTuple {
    pub tuple: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTuple", into = "RawTuple")]
pub struct Tuple {
    tokens: Vec<String>,
    category: Option<Category>,
}

impl Tuple {
    pub fn new<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        if tokens.is_empty() || tokens.len() > MAX_ARITY {
            return Err(EvalError::MalformedTuple {
                arity: tokens.len(),
            });
        }
        Ok(Tuple {
            tokens,
            category: None,
        })
    }

    /// Tag the tuple with the extractor's category. `All` is a pool, not a
    /// tag, so it clears the tag instead.
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = match category {
            Category::All => None,
            other => Some(other),
        };
        self
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn arity(&self) -> usize {
        self.tokens.len()
    }

    pub fn category(&self) -> Category {
        self.category
            .unwrap_or_else(|| Category::from_arity(self.arity()))
    }

    pub fn belongs_to(&self, category: Category) -> bool {
        category == Category::All || self.category() == category
    }

    fn normalized_tokens(&self) -> Vec<String> {
        self.tokens.iter().map(|t| normalize_token(t)).collect()
    }
}

impl TryFrom<RawTuple> for Tuple {
    type Error = EvalError;

    fn try_from(raw: RawTuple) -> Result<Self> {
        let tuple = Tuple::new(raw.tuple)?;
        Ok(match raw.category {
            Some(category) => tuple.with_category(category),
            None => tuple,
        })
    }
}

impl From<Tuple> for RawTuple {
    fn from(tuple: Tuple) -> Self {
        RawTuple {
            tuple: tuple.tokens,
            category: tuple.category,
        }
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.tokens.join(", "))
    }
}

/// Validate every raw tuple of a caption. The first malformed one fails the set.
pub fn tuple_set(raw: Vec<RawTuple>) -> Result<Vec<Tuple>> {
    raw.into_iter().map(Tuple::try_from).collect()
}

pub fn subset(tuples: &[Tuple], category: Category) -> Vec<Tuple> {
    tuples
        .iter()
        .filter(|t| t.belongs_to(category))
        .cloned()
        .collect()
}

/// Merge the reference tuple sets into the pool for one category: the tuples
/// that belong to `category`, with exact duplicates (after case normalisation)
/// keeping their first occurrence. A tuple that two references tag with
/// different categories lands in both category pools.
pub fn pool_references(references: &[Vec<Tuple>], category: Category) -> Vec<Tuple> {
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut pooled = vec![];
    for tuple in references.iter().flatten() {
        if tuple.belongs_to(category) && seen.insert(tuple.normalized_tokens()) {
            pooled.push(tuple.clone());
        }
    }
    pooled
}
