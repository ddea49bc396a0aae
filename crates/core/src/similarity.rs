//! Cosine similarity over embedding vectors.

/// Compute the cosine similarity `Σ aᵢbᵢ / (√Σ aᵢ² · √Σ bᵢ²)`.
///
/// Mismatched dimensions or a zero denominator yield `0.0` rather than an
/// error; a missing or degenerate vector simply contributes no semantic
/// signal to ranking.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    dot / denom
}
