/// A caption broken into lowercase alphanumeric words.
pub struct Sequence {
    pub text: String,
    pub word_vector: Vec<String>,
    pub n_words: usize,
}

impl Sequence {
    pub fn new(text: &str) -> Self {
        let word_vec = str_to_word_vec(text);
        let word_vec_len = word_vec.len();
        Sequence {
            text: text.to_string(),
            word_vector: word_vec,
            n_words: word_vec_len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.n_words == 0
    }
}

/// Split on anything that is not alphanumeric and lowercase every word.
/// Punctuation never becomes a token.
pub fn str_to_word_vec(string: &str) -> Vec<String> {
    string
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

/// Canonical form used for lexical comparison: trimmed, lowercased,
/// inner whitespace collapsed to `_` as in WordNet lemma names.
pub fn normalize_token(token: &str) -> String {
    token
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

pub fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Harmonic mean of precision and recall, 0 when both are 0.
pub fn f1_from(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_drops_punctuation() {
        let seq = Sequence::new("A big, dark canine sprints!");
        assert_eq!(seq.word_vector, vec!["a", "big", "dark", "canine", "sprints"]);
        assert_eq!(seq.n_words, 5);
    }

    #[test]
    fn test_empty_sequence() {
        assert!(Sequence::new("  ... ").is_empty());
    }

    #[test]
    fn test_normalize_token() {
        assert_eq!(normalize_token("  Hot  Dog "), "hot_dog");
        assert_eq!(normalize_token("Large"), "large");
    }

    #[test]
    fn test_f1_from() {
        assert_eq!(f1_from(0.0, 0.0), 0.0);
        assert_eq!(f1_from(1.0, 0.0), 0.0);
        assert!((f1_from(0.5, 1.0) - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_ratio_guards_zero() {
        assert_eq!(ratio(3, 0), 0.0);
        assert_eq!(ratio(1, 4), 0.25);
    }
}
