//! Distance functions for similarity ranking.
//!
//! Every metric is expressed as a distance: lower = closer. Ranking code
//! never needs to know which metric produced a value.
//!
//! Vectors are used as given. Nothing here normalizes its inputs.

use vecdb_core::DistanceMetric;

/// Compute the distance between two vectors under `metric`
pub fn compute_distance(a: &[f32], b: &[f32], metric: DistanceMetric) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Dimension mismatch in distance computation");

    match metric {
        DistanceMetric::Euclidean => euclidean_distance(a, b),
        DistanceMetric::Cosine => cosine_distance(a, b),
        DistanceMetric::DotProduct => -dot_product(a, b),
    }
}

/// Euclidean (L2) distance
///
/// Range: [0, inf)
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Cosine distance: 1 - dot(a,b) / (||a|| * ||b||)
///
/// Range: [0, 2]. A zero vector has no direction, so its distance to
/// anything is 1.0 (orthogonal).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        1.0
    } else {
        1.0 - dot_product(a, b) / (norm_a * norm_b)
    }
}

/// Dot product (inner product)
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 norm (Euclidean length)
fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
