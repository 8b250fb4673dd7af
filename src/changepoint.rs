//! Changepoint detection over a metric history.
//!
//! The divisive-means search is behind [`ChangepointAlgorithm`]; [`EDivisive`]
//! is the built-in implementation (energy distance, recursive bisection,
//! permutation significance test).

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::logging::{log, obj, v_num, Domain, Level};

/// Smallest segment on either side of a split.
pub const MIN_SEGMENT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePoint {
    pub index: usize,
}

pub trait ChangepointAlgorithm {
    /// Sorted indices where a new segment starts.
    fn split_points(&self, values: &[f64], permutations: usize, pvalue: f64) -> Result<Vec<usize>>;
}

pub fn validate_params(permutations: usize, pvalue: f64) -> Result<()> {
    if permutations < 1 {
        return Err(Error::Config("permutations must be at least 1".to_string()));
    }
    if !(0.0..=1.0).contains(&pvalue) {
        return Err(Error::Config(format!(
            "pvalue must lie in [0, 1], got {}",
            pvalue
        )));
    }
    Ok(())
}

/// Energy distance between two samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyStatistics {
    /// Raw energy distance.
    pub e: f64,
    /// `e` scaled by `n·m/(n+m)`; the quantity the search maximises.
    pub q: f64,
    /// `e` normalised by twice the mean cross distance, in `[0, 1]`.
    pub h: f64,
}

fn pair_mean_within(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n < 2 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        for k in (i + 1)..n {
            sum += (xs[i] - xs[k]).abs();
        }
    }
    sum / (n * (n - 1) / 2) as f64
}

pub fn energy_statistics(left: &[f64], right: &[f64]) -> EnergyStatistics {
    let (n, m) = (left.len(), right.len());
    if n == 0 || m == 0 {
        return EnergyStatistics { e: 0.0, q: 0.0, h: 0.0 };
    }
    let cross: f64 = left
        .iter()
        .map(|x| right.iter().map(|y| (x - y).abs()).sum::<f64>())
        .sum();
    let cross_mean = cross / (n * m) as f64;
    let e = 2.0 * cross_mean - pair_mean_within(left) - pair_mean_within(right);
    let q = e * (n * m) as f64 / (n + m) as f64;
    let h = if cross_mean > 0.0 { e / (2.0 * cross_mean) } else { 0.0 };
    EnergyStatistics { e, q, h }
}

/// 2-D prefix sums of |x_i - x_j| over one segment.
struct DistancePrefix {
    len: usize,
    sums: Vec<f64>,
}

impl DistancePrefix {
    fn new(xs: &[f64]) -> Self {
        let len = xs.len();
        let w = len + 1;
        let mut sums = vec![0.0; w * w];
        for i in 0..len {
            for j in 0..len {
                sums[(i + 1) * w + j + 1] = (xs[i] - xs[j]).abs() + sums[i * w + j + 1]
                    + sums[(i + 1) * w + j]
                    - sums[i * w + j];
            }
        }
        Self { len, sums }
    }

    /// Sum over rows `r0..r1`, columns `c0..c1`.
    fn block(&self, r0: usize, r1: usize, c0: usize, c1: usize) -> f64 {
        let w = self.len + 1;
        self.sums[r1 * w + c1] - self.sums[r0 * w + c1] - self.sums[r1 * w + c0] + self.sums[r0 * w + c0]
    }

    fn q_at(&self, tau: usize) -> f64 {
        let (n, m) = (tau, self.len - tau);
        let within = |count: usize, sum: f64| {
            if count < 2 {
                0.0
            } else {
                // Each unordered pair appears twice in the square block.
                (sum / 2.0) / (count * (count - 1) / 2) as f64
            }
        };
        let cross = self.block(0, tau, tau, self.len) / (n * m) as f64;
        let e = 2.0 * cross - within(n, self.block(0, tau, 0, tau)) - within(m, self.block(tau, self.len, tau, self.len));
        e * (n * m) as f64 / (n + m) as f64
    }
}

/// Best split of one segment as `(offset within segment, q)`.
fn best_split(xs: &[f64], min_size: usize) -> Option<(usize, f64)> {
    if xs.len() < 2 * min_size {
        return None;
    }
    let prefix = DistancePrefix::new(xs);
    (min_size..=xs.len() - min_size)
        .map(|tau| (tau, prefix.q_at(tau)))
        .fold(None, |best: Option<(usize, f64)>, cur| match best {
            Some(b) if b.1 >= cur.1 => Some(b),
            _ => Some(cur),
        })
}

#[derive(Debug, Clone)]
pub struct EDivisive {
    pub seed: u64,
    pub min_size: usize,
}

impl EDivisive {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            min_size: MIN_SEGMENT,
        }
    }

    /// Best `(absolute index, q)` over all segments bounded by `bounds`.
    fn best_over(&self, values: &[f64], bounds: &[usize]) -> Option<(usize, f64)> {
        bounds
            .windows(2)
            .filter_map(|w| best_split(&values[w[0]..w[1]], self.min_size).map(|(tau, q)| (w[0] + tau, q)))
            .fold(None, |best: Option<(usize, f64)>, cur| match best {
                Some(b) if b.1 >= cur.1 => Some(b),
                _ => Some(cur),
            })
    }

    /// Permutes within each segment and counts maxima at least `observed`.
    fn permutation_pvalue(
        &self,
        values: &[f64],
        bounds: &[usize],
        observed: f64,
        permutations: usize,
        rng: &mut StdRng,
    ) -> f64 {
        let mut shuffled = values.to_vec();
        let mut at_least = 0usize;
        for _ in 0..permutations {
            for w in bounds.windows(2) {
                shuffled[w[0]..w[1]].shuffle(rng);
            }
            let q = self.best_over(&shuffled, bounds).map(|(_, q)| q).unwrap_or(0.0);
            if q >= observed {
                at_least += 1;
            }
        }
        (at_least + 1) as f64 / (permutations + 1) as f64
    }
}

impl ChangepointAlgorithm for EDivisive {
    fn split_points(&self, values: &[f64], permutations: usize, pvalue: f64) -> Result<Vec<usize>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut bounds = vec![0, values.len()];
        loop {
            let (index, q) = match self.best_over(values, &bounds) {
                Some(found) if found.1 > 0.0 => found,
                _ => break,
            };
            let p = self.permutation_pvalue(values, &bounds, q, permutations, &mut rng);
            if p > pvalue {
                break;
            }
            let pos = bounds.partition_point(|&b| b < index);
            bounds.insert(pos, index);
        }
        Ok(bounds[1..bounds.len() - 1].to_vec())
    }
}

pub fn detect(
    values: &[f64],
    permutations: usize,
    pvalue: f64,
    algorithm: &dyn ChangepointAlgorithm,
) -> Result<Vec<ChangePoint>> {
    validate_params(permutations, pvalue)?;
    let points: Vec<ChangePoint> = algorithm
        .split_points(values, permutations, pvalue)?
        .into_iter()
        .map(|index| ChangePoint { index })
        .collect();

    if let Some(first) = points.first().filter(|cp| cp.index > 0 && cp.index < values.len()) {
        let stats = energy_statistics(&values[..first.index], &values[first.index..]);
        log(
            Level::Debug,
            Domain::Changepoint,
            "first_split_energy",
            obj(&[
                ("index", json!(first.index)),
                ("splits", json!(points.len())),
                ("e", v_num(stats.e)),
                ("q", v_num(stats.q)),
                ("h", v_num(stats.h)),
            ]),
        );
    }
    Ok(points)
}
