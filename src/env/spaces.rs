//! Box spaces describing observation and action vectors.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Bounded n-dimensional box of f32 values.
///
/// Mirrors the gym `Box` space: per-dimension low/high bounds with uniform
/// sampling. Observations and actions in this crate are flat `Vec<f32>`, so
/// shape is just the dimension count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    low: Vec<f32>,
    high: Vec<f32>,
}

impl BoxSpace {
    /// Create a space from explicit per-dimension bounds.
    ///
    /// # Panics
    ///
    /// Panics if `low` and `high` differ in length.
    pub fn new(low: Vec<f32>, high: Vec<f32>) -> Self {
        assert_eq!(low.len(), high.len(), "box bounds must have equal length");
        Self { low, high }
    }

    /// Symmetric space `[-bound, bound]^dim`.
    pub fn symmetric(dim: usize, bound: f32) -> Self {
        Self {
            low: vec![-bound; dim],
            high: vec![bound; dim],
        }
    }

    /// Number of dimensions.
    pub fn shape(&self) -> usize {
        self.low.len()
    }

    pub fn low(&self) -> &[f32] {
        &self.low
    }

    pub fn high(&self) -> &[f32] {
        &self.high
    }

    /// Uniform sample within the bounds.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f32> {
        self.low
            .iter()
            .zip(&self.high)
            .map(|(&lo, &hi)| {
                if lo < hi {
                    rng.gen_range(lo..hi)
                } else {
                    lo
                }
            })
            .collect()
    }

    /// Whether `value` lies within the bounds (and has the right dimension).
    pub fn contains(&self, value: &[f32]) -> bool {
        value.len() == self.shape()
            && value
                .iter()
                .zip(self.low.iter().zip(&self.high))
                .all(|(&v, (&lo, &hi))| v >= lo && v <= hi)
    }

    /// Clamp `value` into the bounds, element-wise.
    pub fn clamp(&self, value: &[f32]) -> Vec<f32> {
        value
            .iter()
            .zip(self.low.iter().zip(&self.high))
            .map(|(&v, (&lo, &hi))| v.clamp(lo, hi))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn sample_stays_within_bounds() {
        let space = BoxSpace::symmetric(4, 1.5);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let sample = space.sample(&mut rng);
            assert_eq!(sample.len(), 4);
            assert!(space.contains(&sample));
        }
    }

    #[test]
    fn clamp_pulls_values_into_bounds() {
        let space = BoxSpace::new(vec![-1.0, 0.0], vec![1.0, 2.0]);
        let clamped = space.clamp(&[-5.0, 5.0]);
        assert_eq!(clamped, vec![-1.0, 2.0]);
        assert!(space.contains(&clamped));
    }

    #[test]
    fn contains_rejects_wrong_dimension() {
        let space = BoxSpace::symmetric(3, 1.0);
        assert!(!space.contains(&[0.0, 0.0]));
    }
}
