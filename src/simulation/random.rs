//! Deterministic pseudo-random numbers
//!
//! A small linear congruential generator. Replay depends on every run drawing
//! the same sequence, so the generator is reseeded whenever the simulation
//! resets.

pub const RAND_MAX: i64 = 1_000_000;

const MULTIPLIER: u64 = 9301;
const INCREMENT: u64 = 49297;
const MODULUS: u64 = 233_280;

#[derive(Debug, Clone)]
pub struct CppRandom {
    seed: u64,
}

impl CppRandom {
    pub fn new(seed: u64) -> Self {
        CppRandom {
            seed: seed % MODULUS,
        }
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed % MODULUS;
    }

    /// Uniform value in `[0, 1)`
    pub fn next_unit(&mut self) -> f64 {
        self.seed = (self.seed * MULTIPLIER + INCREMENT) % MODULUS;
        self.seed as f64 / MODULUS as f64
    }

    /// Integer in `[min, max)`
    pub fn next_in_range(&mut self, min: i64, max: i64) -> i64 {
        let span = (max - min) as f64;
        (min as f64 + self.next_unit() * span).floor() as i64
    }

    /// Value produced by `rand()`
    pub fn next_rand(&mut self) -> i64 {
        self.next_in_range(0, RAND_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = CppRandom::new(42);
        let mut b = CppRandom::new(42);
        let xs: Vec<i64> = (0..10).map(|_| a.next_rand()).collect();
        let ys: Vec<i64> = (0..10).map(|_| b.next_rand()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_range_bounds() {
        let mut rng = CppRandom::new(0);
        for _ in 0..1000 {
            let n = rng.next_in_range(0, 100);
            assert!((0..100).contains(&n), "{} out of range", n);
        }
    }

    #[test]
    fn test_reseed_restarts_sequence() {
        let mut rng = CppRandom::new(3);
        let first = rng.next_rand();
        rng.next_rand();
        rng.set_seed(3);
        assert_eq!(rng.next_rand(), first);
    }
}
