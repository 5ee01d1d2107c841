use std::fmt;

use tracing::{debug, warn};

use crate::{
	fmt_grid,
	neighbours,
	square_side,
	Cell,
	Grid,
	LatticeError,
	LatticeRng,
	LatticeSampler,
	Result,
	PERCOLATION_GLYPHS,
};

pub const BLOCKED: Cell = 0;
pub const OPEN: Cell = 1;
pub const FILLED: Cell = 2;

/// Site percolation on an `n`x`n` lattice.
///
/// `grid` is fixed at construction. `grid_filled` starts as a copy of it
/// and [`percolate`](PercolationEngine::percolate) marks every open site
/// reachable from the top row with [`FILLED`].
#[derive(Debug, Clone, PartialEq)]
pub struct PercolationEngine {
	grid: Grid,
	grid_filled: Grid,
	n: usize,
	p: f64,
}

impl PercolationEngine {
	/// Random lattice where each site is blocked with probability `p`.
	pub fn new<S: LatticeSampler>(n: usize, p: f64, mut sampler: S) -> Result<PercolationEngine> {
		if n == 0 {
			return Err(LatticeError::InvalidSize { n });
		}
		check_probability(p)?;
		let grid: Grid = (0..n)
			.map(|_| {
				(0..n)
					.map(|_| if sampler.bernoulli(p) { BLOCKED } else { OPEN })
					.collect()
			})
			.collect();
		debug!(n, p, "percolation lattice generated");
		Ok(PercolationEngine::with_grid(grid, n, p))
	}

	pub fn seeded(n: usize, p: f64, seed: u64) -> Result<PercolationEngine> {
		PercolationEngine::new(n, p, LatticeRng::seeded(seed))
	}

	/// Takes a lattice of 0s and 1s; `p` becomes the fraction of blocked sites.
	pub fn from_grid(grid: Grid) -> Result<PercolationEngine> {
		let n = square_side(&grid)?;
		let mut open = 0;
		for (i, row) in grid.iter().enumerate() {
			for (j, &c) in row.iter().enumerate() {
				match c {
					BLOCKED => {}
					OPEN => open += 1,
					_ => return Err(LatticeError::bad_value(i, j, c)),
				}
			}
		}
		let p = 1.0 - open as f64 / (n * n) as f64;
		Ok(PercolationEngine::with_grid(grid, n, p))
	}

	fn with_grid(grid: Grid, n: usize, p: f64) -> PercolationEngine {
		PercolationEngine {
			grid_filled: grid.clone(),
			grid,
			n,
			p,
		}
	}

	/// Pours water along the top row; `true` if it reaches the bottom row.
	///
	/// Water spreads from a filled site to its open neighbours in all four
	/// directions. Repeated calls leave `grid_filled` unchanged.
	pub fn percolate(&mut self) -> Result<bool> {
		let visits = self.fill()?;
		let percolates = self.grid_filled[self.n - 1].iter().any(|&c| c == FILLED);
		debug!(n = self.n, p = self.p, visits, percolates, "flood fill finished");
		Ok(percolates)
	}

	fn fill(&mut self) -> Result<u64> {
		let n = self.n;
		let limit = (n as u64) * (n as u64);
		let mut stack = Vec::new();
		for j in 0..n {
			self.pour(0, j, &mut stack);
		}
		let mut visits = 0;
		while let Some((i, j)) = stack.pop() {
			visits += 1;
			if visits > limit {
				warn!(limit, "flood fill visited more sites than the lattice holds");
				return Err(LatticeError::Divergence { what: "flood fill", limit });
			}
			for (ti, tj) in neighbours(i, j, n) {
				self.pour(ti, tj, &mut stack);
			}
		}
		Ok(visits)
	}

	// Marks on push, so each open site enters the stack at most once.
	fn pour(&mut self, i: usize, j: usize, stack: &mut Vec<(usize, usize)>) {
		if self.grid_filled[i][j] == OPEN {
			self.grid_filled[i][j] = FILLED;
			stack.push((i, j));
		}
	}

	pub fn grid(&self) -> &Grid {
		&self.grid
	}

	pub fn grid_filled(&self) -> &Grid {
		&self.grid_filled
	}

	pub fn n(&self) -> usize {
		self.n
	}

	/// Probability that a site is blocked.
	pub fn p(&self) -> f64 {
		self.p
	}

	pub fn open_count(&self) -> usize {
		count(&self.grid, OPEN)
	}

	pub fn filled_count(&self) -> usize {
		count(&self.grid_filled, FILLED)
	}
}

impl fmt::Display for PercolationEngine {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", fmt_grid(&self.grid_filled, &PERCOLATION_GLYPHS))
	}
}

fn count(grid: &Grid, value: Cell) -> usize {
	grid.iter().flatten().filter(|&&c| c == value).count()
}

fn check_probability(p: f64) -> Result<()> {
	if p.is_finite() && (0.0..=1.0).contains(&p) {
		Ok(())
	} else {
		Err(LatticeError::InvalidProbability { p })
	}
}

/// Fraction of `trials` fresh random lattices that percolate.
pub fn estimate_percolation_probability<S: LatticeSampler>(
	n: usize,
	p: f64,
	trials: usize,
	mut sampler: S,
) -> Result<f64> {
	if trials == 0 {
		return Err(LatticeError::InvalidTrials { trials });
	}
	let mut hits = 0;
	for _ in 0..trials {
		if PercolationEngine::new(n, p, &mut sampler)?.percolate()? {
			hits += 1;
		}
	}
	debug!(n, p, trials, hits, "percolation estimate");
	Ok(hits as f64 / trials as f64)
}
