use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::clusterer::similarity::Metric;
use crate::clusterer::types::Point;

/// How K-Means picks its starting centroids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InitMethod {
    #[serde(rename = "random")]
    Random,
    #[default]
    #[serde(rename = "kmeans++")]
    KmeansPlusPlus,
}

/// Mean of the given points; the origin when there are none
pub fn compute_centroid(points: &[&Point], dim: usize) -> Point {
    let mut out = vec![0.0; dim];
    if points.is_empty() {
        return Point::new(out);
    }

    for p in points {
        for (acc, c) in out.iter_mut().zip(p.coords()) {
            *acc += c;
        }
    }

    let n = points.len() as f64;
    for acc in out.iter_mut() {
        *acc /= n;
    }

    Point::new(out)
}

/// Mean of the points at `indices`
pub fn centroid_of(data: &[Point], indices: &[usize], dim: usize) -> Point {
    let members: Vec<&Point> = indices.iter().map(|&i| &data[i]).collect();
    compute_centroid(&members, dim)
}

/// Pick `k` starting centroids and return their dataset indices
pub fn seed_centroids<R: Rng + ?Sized>(
    data: &[Point],
    k: usize,
    method: InitMethod,
    metric: Metric,
    rng: &mut R,
) -> Vec<usize> {
    if data.is_empty() || k == 0 {
        return Vec::new();
    }
    match method {
        InitMethod::Random => seed_random(data.len(), k, rng),
        InitMethod::KmeansPlusPlus => seed_plus_plus(data, k, metric, rng),
    }
}

fn seed_random<R: Rng + ?Sized>(n: usize, k: usize, rng: &mut R) -> Vec<usize> {
    let mut seeds = rand::seq::index::sample(rng, n, k.min(n)).into_vec();
    // More seeds than points: repeats are unavoidable
    while seeds.len() < k {
        seeds.push(rng.gen_range(0..n));
    }
    seeds
}

fn seed_plus_plus<R: Rng + ?Sized>(
    data: &[Point],
    k: usize,
    metric: Metric,
    rng: &mut R,
) -> Vec<usize> {
    let n = data.len();
    let mut seeds = Vec::with_capacity(k);
    let mut chosen = vec![false; n];

    let first = rng.gen_range(0..n);
    seeds.push(first);
    chosen[first] = true;

    // Squared distance from each point to its nearest seed so far
    let mut nearest: Vec<f64> = data
        .iter()
        .map(|p| metric.distance(p, &data[first]).powi(2))
        .collect();

    while seeds.len() < k {
        let weights: Vec<f64> = nearest
            .iter()
            .zip(&chosen)
            .map(|(&d, &c)| if c { 0.0 } else { d })
            .collect();
        let total: f64 = weights.iter().sum();

        let next = if total > 0.0 && total.is_finite() {
            let threshold = rng.gen::<f64>() * total;
            let mut cumsum = 0.0;
            let mut selected = None;
            for (j, &w) in weights.iter().enumerate() {
                if w <= 0.0 {
                    continue;
                }
                cumsum += w;
                selected = Some(j);
                if cumsum >= threshold {
                    break;
                }
            }
            selected
        } else {
            None
        };

        // Remaining points all coincide with a seed: fall back to a uniform pick
        let next = next.unwrap_or_else(|| {
            let unchosen: Vec<usize> = (0..n).filter(|&i| !chosen[i]).collect();
            if unchosen.is_empty() {
                rng.gen_range(0..n)
            } else {
                unchosen[rng.gen_range(0..unchosen.len())]
            }
        });

        seeds.push(next);
        chosen[next] = true;
        for (i, p) in data.iter().enumerate() {
            let d = metric.distance(p, &data[next]).powi(2);
            if d < nearest[i] {
                nearest[i] = d;
            }
        }
    }

    seeds
}
