//! Sliding-window outlier detection over a metric history.
//!
//! Each point is scored against the population statistics of up to
//! `max_window` values before it; the point itself never contributes to
//! the window it is scored against.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Relative floor below which a window is treated as having no spread.
/// Against such a window any departure from its mean is an anomaly.
const ZERO_SPREAD_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Positive => "POSITIVE",
            Direction::Negative => "NEGATIVE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub index: usize,
    /// Signed distance from the window mean, in population std-devs.
    /// Infinite when the window had no spread.
    pub deviation: f64,
    pub direction: Direction,
}

pub fn validate_window(min_window: usize, max_window: usize, threshold: f64) -> Result<()> {
    if min_window < 2 {
        return Err(Error::Config(format!(
            "min_window must be at least 2, got {}",
            min_window
        )));
    }
    if max_window < min_window {
        return Err(Error::Config(format!(
            "max_window ({}) must not be smaller than min_window ({})",
            max_window, min_window
        )));
    }
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(Error::Config(format!(
            "threshold must be a positive number, got {}",
            threshold
        )));
    }
    Ok(())
}

/// Bounded window of the most recent values.
#[derive(Debug, Clone)]
struct TrailingWindow {
    max_size: usize,
    values: VecDeque<f64>,
}

impl TrailingWindow {
    fn new(max_size: usize) -> Self {
        Self {
            max_size,
            values: VecDeque::with_capacity(max_size),
        }
    }

    fn push(&mut self, value: f64) {
        if self.values.len() >= self.max_size {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    /// Population mean and std, recomputed from the retained values.
    fn stats(&self) -> (f64, f64) {
        let n = self.values.len() as f64;
        if n == 0.0 {
            return (0.0, 0.0);
        }
        let mean = self.values.iter().sum::<f64>() / n;
        let var = self.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        (mean, var.sqrt())
    }
}

fn spread_floor(mean: f64) -> f64 {
    ZERO_SPREAD_EPS * mean.abs().max(1.0)
}

/// Signed deviation of `value` from a window, in std-devs. A window with no
/// spread gives an infinite deviation for any value that leaves it, and 0
/// for a value that matches it.
fn score(value: f64, mean: f64, std: f64) -> f64 {
    let floor = spread_floor(mean);
    if std >= floor {
        (value - mean) / std
    } else if (value - mean).abs() > floor {
        f64::INFINITY.copysign(value - mean)
    } else {
        0.0
    }
}

/// Non-finite values are neither scored nor added to the window.
pub fn detect(
    values: &[f64],
    min_window: usize,
    max_window: usize,
    threshold: f64,
) -> Result<Vec<Anomaly>> {
    validate_window(min_window, max_window, threshold)?;
    let mut window = TrailingWindow::new(max_window);
    let mut out = Vec::new();

    for (index, &value) in values.iter().enumerate() {
        if !value.is_finite() {
            continue;
        }
        if window.len() >= min_window {
            let (mean, std) = window.stats();
            let z = score(value, mean, std);
            if z.abs() > threshold {
                out.push(Anomaly {
                    index,
                    deviation: z,
                    direction: if z > 0.0 {
                        Direction::Positive
                    } else {
                        Direction::Negative
                    },
                });
            }
        }
        window.push(value);
    }
    Ok(out)
}
