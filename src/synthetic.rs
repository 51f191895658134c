//! Generated vehicle counts for signals without a sensor feed.

use crate::error::ConfigError;
use rand::Rng;
use rand_distr::{Distribution, Poisson};

/// A generator of plausible vehicle counts.
#[derive(Debug, Clone, Copy)]
pub enum SyntheticCounts {
    /// Counts drawn uniformly from `min..=max`.
    Uniform { min: u32, max: u32 },
    /// Counts drawn from a Poisson distribution, as if vehicles arrive
    /// independently at a constant rate. Built with [SyntheticCounts::poisson].
    Poisson(Poisson<f64>),
}

impl Default for SyntheticCounts {
    fn default() -> Self {
        SyntheticCounts::Uniform { min: 1, max: 80 }
    }
}

impl SyntheticCounts {
    /// Creates a Poisson generator. The mean must be positive and finite.
    pub fn poisson(mean: f64) -> Result<Self, ConfigError> {
        if !mean.is_finite() {
            return Err(ConfigError::InvalidPoissonMean(mean));
        }
        Poisson::new(mean)
            .map(SyntheticCounts::Poisson)
            .map_err(|_| ConfigError::InvalidPoissonMean(mean))
    }

    /// Draws a vehicle count.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        match self {
            SyntheticCounts::Uniform { min, max } => {
                rng.gen_range(*min.min(max)..=*max.max(min))
            }
            SyntheticCounts::Poisson(distr) => distr.sample(rng) as u32,
        }
    }
}

#[cfg(test)]
mod test {
    use super::SyntheticCounts;
    use crate::error::ConfigError;
    use rand::SeedableRng;

    #[test]
    fn uniform_stays_in_range() {
        let mut rng = rand::rngs::StdRng::from_seed(*b"Vegemite sandwhich is not fun...");
        let counts = SyntheticCounts::default();
        for _ in 0..1000 {
            let count = counts.sample(&mut rng);
            assert!((1..=80).contains(&count));
        }
    }

    #[test]
    fn poisson_centres_on_mean() {
        let mut rng = rand::rngs::StdRng::from_seed(*b"Vegemite sandwhich is not fun...");
        let counts = SyntheticCounts::poisson(25.0).unwrap();
        let total: u32 = (0..2000).map(|_| counts.sample(&mut rng)).sum();
        let mean = total as f64 / 2000.0;
        assert!((mean - 25.0).abs() < 1.5, "mean was {}", mean);
    }

    #[test]
    fn invalid_mean_is_rejected() {
        for mean in [-5.0, 0.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                SyntheticCounts::poisson(mean),
                Err(ConfigError::InvalidPoissonMean(_))
            ));
        }
    }
}
