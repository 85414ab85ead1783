/// Cosine similarity of two equal-length vectors.
///
/// Mismatched lengths and zero-magnitude inputs yield 0.0. Accumulation is
/// done in f64.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0f64, 0f64, 0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    #[allow(clippy::cast_possible_truncation)]
    let sim = (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32;
    sim.clamp(-1.0, 1.0)
}
