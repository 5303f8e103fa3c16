//! Cosine similarity between caption embeddings. The embeddings themselves come
//! from an external model; this module only scores them.

/// Denominators are clamped to this to avoid dividing by zero.
const MIN_NORM: f64 = 1e-9;

/// Cosine similarity of two vectors. Returns 0.0 when the lengths differ or
/// either vector is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    // Accumulate in f64
    let (mut dot, mut norm_a, mut norm_b) = (0f64, 0f64, 0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < MIN_NORM {
        return 0.0;
    }
    dot / denom
}

/// Mean cosine similarity of the generated caption's embedding against each
/// reference embedding. No references, or any reference whose dimension
/// differs from the generated one, yields 0.0.
pub fn mean_reference_similarity<R: AsRef<[f32]>>(generated: &[f32], references: &[R]) -> f64 {
    if references.is_empty()
        || references
            .iter()
            .any(|r| r.as_ref().len() != generated.len())
    {
        return 0.0;
    }
    let total: f64 = references
        .iter()
        .map(|r| cosine_similarity(generated, r.as_ref()))
        .sum();
    total / references.len() as f64
}

/// Row-wise cosine similarity of two row-major matrices with `dim` columns,
/// e.g. a batch of predicted and gold embeddings. Extra trailing values that do
/// not fill a row are ignored.
pub fn cosine_per_row(pred: &[f32], gold: &[f32], dim: usize) -> Vec<f64> {
    if dim == 0 {
        return vec![];
    }
    pred.chunks_exact(dim)
        .zip(gold.chunks_exact(dim))
        .map(|(p, g)| cosine_similarity(p, g))
        .collect()
}
