use rand::distributions::{Distribution, Uniform};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaChaRng;
use rand_distr::{Exp, Gamma, Normal, Pareto, Triangular, Weibull};

use crate::{Error, Result};

fn invalid<E: std::fmt::Display>(distribution: &'static str) -> impl FnOnce(E) -> Error {
    move |err| Error::InvalidDistribution {
        distribution,
        reason: err.to_string(),
    }
}

/// Seeded random stream shared by all actors of a simulation.
///
/// Two streams created with the same seed produce the same samples, which makes simulation runs
/// reproducible. The named samplers validate their parameters and return an error instead of
/// panicking.
#[derive(Debug, Clone)]
pub struct Random {
    rng: ChaChaRng,
    seed: u64,
}

impl Random {
    /// Creates a stream seeded with `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaChaRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Seed the stream was created with.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform sample from `[0, 1)`.
    pub fn random(&mut self) -> f64 {
        self.rng.gen()
    }

    /// Sample from any distribution over `f64`.
    pub fn sample<D: Distribution<f64>>(&mut self, distribution: &D) -> f64 {
        distribution.sample(&mut self.rng)
    }

    /// Uniform sample from `[lower, upper)`.
    ///
    /// # Errors
    ///
    /// Returns an error unless `lower < upper` and both are finite.
    pub fn uniform(&mut self, lower: f64, upper: f64) -> Result<f64> {
        if !(lower < upper && lower.is_finite() && upper.is_finite()) {
            return Err(Error::InvalidDistribution {
                distribution: "uniform",
                reason: format!("empty or unbounded range [{}, {})", lower, upper),
            });
        }
        Ok(self.sample(&Uniform::new(lower, upper)))
    }

    /// Exponential sample with rate `lambda`.
    ///
    /// # Errors
    ///
    /// Returns an error if `lambda` is negative or NaN.
    pub fn exponential(&mut self, lambda: f64) -> Result<f64> {
        let distribution = Exp::new(lambda).map_err(invalid("exponential"))?;
        Ok(self.sample(&distribution))
    }

    /// Normal sample with mean `mu` and standard deviation `sigma`.
    ///
    /// # Errors
    ///
    /// Returns an error if `sigma` is negative or not finite.
    pub fn normal(&mut self, mu: f64, sigma: f64) -> Result<f64> {
        if !(sigma >= 0.0 && sigma.is_finite()) {
            return Err(Error::InvalidDistribution {
                distribution: "normal",
                reason: format!("invalid standard deviation {}", sigma),
            });
        }
        let distribution = Normal::new(mu, sigma).map_err(invalid("normal"))?;
        Ok(self.sample(&distribution))
    }

    /// Gamma sample with shape `alpha` and scale `beta`.
    ///
    /// # Errors
    ///
    /// Returns an error unless both parameters are positive.
    pub fn gamma(&mut self, alpha: f64, beta: f64) -> Result<f64> {
        let distribution = Gamma::new(alpha, beta).map_err(invalid("gamma"))?;
        Ok(self.sample(&distribution))
    }

    /// Pareto sample with scale 1 and shape `alpha`.
    ///
    /// # Errors
    ///
    /// Returns an error unless `alpha` is positive.
    pub fn pareto(&mut self, alpha: f64) -> Result<f64> {
        let distribution = Pareto::new(1.0, alpha).map_err(invalid("pareto"))?;
        Ok(self.sample(&distribution))
    }

    /// Triangular sample over `[lower, upper]` peaking at `mode`.
    ///
    /// # Errors
    ///
    /// Returns an error unless `lower <= mode <= upper`.
    pub fn triangular(&mut self, lower: f64, upper: f64, mode: f64) -> Result<f64> {
        let distribution = Triangular::new(lower, upper, mode).map_err(invalid("triangular"))?;
        Ok(self.sample(&distribution))
    }

    /// Weibull sample with scale `alpha` and shape `beta`.
    ///
    /// # Errors
    ///
    /// Returns an error unless both parameters are positive.
    pub fn weibull(&mut self, alpha: f64, beta: f64) -> Result<f64> {
        let distribution = Weibull::new(alpha, beta).map_err(invalid("weibull"))?;
        Ok(self.sample(&distribution))
    }
}

impl RngCore for Random {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::*;

    #[fixture]
    fn random() -> Random {
        Random::new(1234)
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = Random::new(17);
        let mut b = Random::new(17);
        let xs: Vec<f64> = (0..10).map(|_| a.exponential(0.5).unwrap()).collect();
        let ys: Vec<f64> = (0..10).map(|_| b.exponential(0.5).unwrap()).collect();
        assert_eq!(xs, ys);
        assert_eq!(a.seed(), 17);
        assert_ne!(Random::new(18).random(), Random::new(17).random());
    }

    #[rstest]
    fn test_samples_within_support(mut random: Random) {
        for _ in 0..1000 {
            let u = random.uniform(2.0, 3.0).unwrap();
            assert!((2.0..3.0).contains(&u));
            assert!(random.exponential(2.0).unwrap() >= 0.0);
            assert!(random.gamma(2.5, 1.0).unwrap() > 0.0);
            assert!(random.gamma(0.5, 2.0).unwrap() >= 0.0);
            assert!(random.pareto(3.0).unwrap() >= 1.0);
            let t = random.triangular(1.0, 5.0, 2.0).unwrap();
            assert!((1.0..=5.0).contains(&t));
            assert!(random.weibull(1.0, 1.5).unwrap() >= 0.0);
            assert!(random.normal(0.0, 1.0).unwrap().is_finite());
        }
    }

    #[rstest]
    fn test_sample_mean(mut random: Random) {
        let n = 20_000;
        let mean = (0..n).map(|_| random.gamma(3.0, 2.0).unwrap()).sum::<f64>() / f64::from(n);
        assert!((mean - 6.0).abs() < 0.2, "gamma mean {} far from 6", mean);
        let mean = (0..n).map(|_| random.exponential(0.25).unwrap()).sum::<f64>() / f64::from(n);
        assert!((mean - 4.0).abs() < 0.2, "exponential mean {} far from 4", mean);
    }

    #[rstest]
    fn test_invalid_parameters(mut random: Random) {
        assert!(random.uniform(1.0, 1.0).is_err());
        assert!(random.exponential(-1.0).is_err());
        assert!(random.normal(0.0, -1.0).is_err());
        assert!(random.normal(0.0, f64::INFINITY).is_err());
        assert!(random.normal(0.0, 0.0).is_ok());
        assert!(random.gamma(0.0, 1.0).is_err());
        assert!(random.pareto(0.0).is_err());
        assert!(random.triangular(0.0, 1.0, 2.0).is_err());
        assert!(random.weibull(-1.0, 1.0).is_err());
    }
}
