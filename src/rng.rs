//! Seedable sampling for lattice construction and grain drops.
//!
//! Every engine owns its sampler, so a run is reproduced by the seed alone
//! and never depends on what other engines drew before it.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::Cell;

/// Source of random draws an engine needs.
///
/// Implemented by [`LatticeRng`]; tests substitute scripted samplers to
/// drop grains on chosen sites.
pub trait LatticeSampler {
	/// Uniform site `(row, col)` on an `n`x`n` lattice.
	fn site(&mut self, n: usize) -> (usize, usize);
	/// Uniform value in `0..bound`.
	fn cell(&mut self, bound: Cell) -> Cell;
	/// `true` with probability `p`. Callers guarantee `0 <= p <= 1`.
	fn bernoulli(&mut self, p: f64) -> bool;
}

#[derive(Debug, Clone)]
pub struct LatticeRng {
	rng: ChaCha8Rng,
	seed: Option<u64>,
}

impl LatticeRng {
	pub fn seeded(seed: u64) -> LatticeRng {
		LatticeRng {
			rng: ChaCha8Rng::seed_from_u64(seed),
			seed: Some(seed),
		}
	}

	/// Draws its state once from the thread RNG.
	pub fn unseeded() -> LatticeRng {
		LatticeRng {
			rng: ChaCha8Rng::from_rng(&mut rand::rng()),
			seed: None,
		}
	}

	pub fn from_seed(seed: Option<u64>) -> LatticeRng {
		match seed {
			Some(s) => LatticeRng::seeded(s),
			None => LatticeRng::unseeded(),
		}
	}

	pub fn seed(&self) -> Option<u64> {
		self.seed
	}
}

impl LatticeSampler for LatticeRng {
	fn site(&mut self, n: usize) -> (usize, usize) {
		(self.rng.random_range(0..n), self.rng.random_range(0..n))
	}

	fn cell(&mut self, bound: Cell) -> Cell {
		self.rng.random_range(0..bound)
	}

	fn bernoulli(&mut self, p: f64) -> bool {
		self.rng.random_bool(p)
	}
}

impl<S: LatticeSampler + ?Sized> LatticeSampler for &mut S {
	fn site(&mut self, n: usize) -> (usize, usize) {
		(**self).site(n)
	}

	fn cell(&mut self, bound: Cell) -> Cell {
		(**self).cell(bound)
	}

	fn bernoulli(&mut self, p: f64) -> bool {
		(**self).bernoulli(p)
	}
}
