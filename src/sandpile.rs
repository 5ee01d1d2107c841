use std::{
	collections::HashSet,
	fmt,
};

use tracing::{debug, trace, warn};

use crate::{
	check_difference,
	fmt_grid,
	grid_total,
	neighbours,
	square_side,
	Cell,
	Grid,
	LatticeError,
	LatticeRng,
	LatticeSampler,
	Result,
	SANDPILE_GLYPHS,
};

/// Sites holding at least this many grains topple.
pub const CRITICAL: Cell = 4;

/// What one grain drop set off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Relaxation {
	pub site: (usize, usize),
	pub passes: u64,
	pub topplings: u64,
	pub grains_lost: u64,
}

/// Abelian sandpile on an `n`x`n` lattice with open boundary.
///
/// `history` holds the initial grid followed by every grid produced by
/// [`step`](SandpileEngine::step) that differs from the one before it.
#[derive(Debug, Clone)]
pub struct SandpileEngine<S = LatticeRng> {
	grid: Grid,
	history: Vec<Grid>,
	n: usize,
	sampler: S,
	pass_limit: Option<u64>,
	last_relaxation: Option<Relaxation>,
}

impl SandpileEngine<LatticeRng> {
	pub fn seeded(n: usize, seed: u64) -> Result<SandpileEngine<LatticeRng>> {
		SandpileEngine::new(n, LatticeRng::seeded(seed))
	}
}

impl<S: LatticeSampler> SandpileEngine<S> {
	/// Random lattice with every site uniform in `0..CRITICAL`.
	pub fn new(n: usize, mut sampler: S) -> Result<SandpileEngine<S>> {
		if n == 0 {
			return Err(LatticeError::InvalidSize { n });
		}
		let grid = (0..n)
			.map(|_| (0..n).map(|_| sampler.cell(CRITICAL)).collect())
			.collect();
		Ok(SandpileEngine::with_grid(grid, n, sampler))
	}

	/// Starts from `grid` as given. Unstable sites are left alone until the
	/// first drop.
	pub fn from_grid(grid: Grid, sampler: S) -> Result<SandpileEngine<S>> {
		let n = square_side(&grid)?;
		Ok(SandpileEngine::with_grid(grid, n, sampler))
	}

	fn with_grid(grid: Grid, n: usize, sampler: S) -> SandpileEngine<S> {
		debug!(n, total = grid_total(&grid), "sandpile created");
		SandpileEngine {
			history: vec![grid.clone()],
			grid,
			n,
			sampler,
			pass_limit: None,
			last_relaxation: None,
		}
	}

	/// Caps the number of toppling passes a single drop may take.
	pub fn with_pass_limit(mut self, limit: u64) -> SandpileEngine<S> {
		self.pass_limit = Some(limit);
		self
	}

	/// Pass cap for the next relaxation. Unless overridden, scales with the
	/// grains on the lattice: a grain moves at most about `(n + 1)^2` times
	/// before it leaves, and every pass topples at least one site.
	pub fn pass_limit(&self) -> u64 {
		match self.pass_limit {
			Some(limit) => limit,
			None => {
				let side = self.n as u64 + 1;
				self.total_grains()
					.saturating_mul(side.saturating_mul(side))
					.saturating_add(1024)
			}
		}
	}

	fn add_grains(&mut self, i: usize, j: usize, grains: Cell) -> Result<Cell> {
		let c = &mut self.grid[i][j];
		*c = c.checked_add(grains).ok_or(LatticeError::GrainOverflow { row: i, col: j })?;
		Ok(*c)
	}

	/// Drops one grain on a random site and topples until stable.
	///
	/// Does not touch `history`. On `Divergence` the grid is left partially
	/// relaxed; on `GrainOverflow` nothing has changed if the dropped site
	/// was full, otherwise the grid is left partially relaxed.
	pub fn add_grain_and_relax(&mut self) -> Result<Relaxation> {
		let (i, j) = self.sampler.site(self.n);
		self.add_grains(i, j, 1)?;
		let mut relaxation = Relaxation {
			site: (i, j),
			..Relaxation::default()
		};
		self.relax(&mut relaxation)?;
		self.last_relaxation = Some(relaxation);
		Ok(relaxation)
	}

	// Every site critical at the start of a pass topples exactly once in it.
	fn relax(&mut self, relaxation: &mut Relaxation) -> Result<()> {
		let n = self.n;
		let pass_limit = self.pass_limit();
		let mut excessive = HashSet::new();
		for i in 0..n {
			for j in 0..n {
				if self.grid[i][j] >= CRITICAL {
					excessive.insert((i, j));
				}
			}
		}
		loop {
			let grid = &self.grid;
			let mut critical: Vec<_> = excessive
				.drain()
				.filter(|&(i, j)| grid[i][j] >= CRITICAL)
				.collect();
			// Row-major, so an overflow always surfaces at the same site.
			critical.sort_unstable();
			if critical.is_empty() {
				return Ok(());
			}
			if relaxation.passes >= pass_limit {
				warn!(limit = pass_limit, site = ?relaxation.site, "sandpile relaxation diverged");
				return Err(LatticeError::Divergence {
					what: "sandpile relaxation",
					limit: pass_limit,
				});
			}
			relaxation.passes += 1;
			let mut ex2 = HashSet::new();
			for &(i, j) in &critical {
				self.grid[i][j] -= CRITICAL;
				if self.grid[i][j] >= CRITICAL {
					ex2.insert((i, j));
				}
				let mut kept = 0;
				for (ti, tj) in neighbours(i, j, n) {
					kept += 1;
					if self.add_grains(ti, tj, 1)? >= CRITICAL {
						ex2.insert((ti, tj));
					}
				}
				relaxation.grains_lost += (CRITICAL - kept) as u64;
			}
			relaxation.topplings += critical.len() as u64;
			trace!(pass = relaxation.passes, toppled = critical.len(), "toppling pass");
			excessive = ex2;
		}
	}

	/// One simulation step: drop, relax, then record the grid if it changed.
	pub fn step(&mut self) -> Result<Relaxation> {
		let relaxation = self.add_grain_and_relax()?;
		self.record()?;
		Ok(relaxation)
	}

	fn record(&mut self) -> Result<bool> {
		let changed = match self.history.last() {
			Some(last) => check_difference(last, &self.grid)? > 0,
			None => true,
		};
		if changed {
			self.history.push(self.grid.clone());
		}
		Ok(changed)
	}

	/// Runs `steps` steps and returns the resulting grid.
	pub fn simulate(&mut self, steps: usize) -> Result<&Grid> {
		let mut topplings = 0;
		for _ in 0..steps {
			topplings += self.step()?.topplings;
		}
		debug!(steps, topplings, recorded = self.history.len(), "simulation finished");
		Ok(&self.grid)
	}

	pub fn grid(&self) -> &Grid {
		&self.grid
	}

	pub fn history(&self) -> &[Grid] {
		&self.history
	}

	pub fn n(&self) -> usize {
		self.n
	}

	pub fn total_grains(&self) -> u64 {
		grid_total(&self.grid)
	}

	pub fn last_relaxation(&self) -> Option<Relaxation> {
		self.last_relaxation
	}

	pub fn is_stable(&self) -> bool {
		self.grid.iter().flatten().all(|&c| c < CRITICAL)
	}

	pub fn into_grid(self) -> Grid {
		self.grid
	}
}

impl<S> fmt::Display for SandpileEngine<S> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", fmt_grid(&self.grid, &SANDPILE_GLYPHS))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Drops grains on a fixed cycle of sites.
	struct Scripted {
		sites: Vec<(usize, usize)>,
		next: usize,
	}

	impl Scripted {
		fn at(sites: &[(usize, usize)]) -> Scripted {
			Scripted {
				sites: sites.to_vec(),
				next: 0,
			}
		}
	}

	impl LatticeSampler for Scripted {
		fn site(&mut self, _n: usize) -> (usize, usize) {
			let s = self.sites[self.next % self.sites.len()];
			self.next += 1;
			s
		}

		fn cell(&mut self, _bound: Cell) -> Cell {
			0
		}

		fn bernoulli(&mut self, _p: f64) -> bool {
			false
		}
	}

	#[test]
	fn zero_size_is_rejected() {
		assert_eq!(
			SandpileEngine::seeded(0, 1).unwrap_err(),
			LatticeError::InvalidSize { n: 0 }
		);
	}

	#[test]
	fn initial_grid_is_subcritical_and_recorded() {
		let pile = SandpileEngine::seeded(20, 5).unwrap();
		assert!(pile.is_stable());
		assert_eq!(pile.history().len(), 1);
		assert_eq!(&pile.history()[0], pile.grid());
		assert_eq!(pile.grid().len(), 20);
		assert!(pile.grid().iter().all(|r| r.len() == 20));
	}

	#[test]
	fn single_site_loses_everything() {
		let mut pile = SandpileEngine::from_grid(vec![vec![3]], Scripted::at(&[(0, 0)])).unwrap();
		let r = pile.add_grain_and_relax().unwrap();
		assert_eq!(pile.grid(), &vec![vec![0]]);
		assert_eq!(r, Relaxation { site: (0, 0), passes: 1, topplings: 1, grains_lost: 4 });
	}

	#[test]
	fn full_three_by_three_avalanche() {
		let mut pile = SandpileEngine::from_grid(vec![vec![3; 3]; 3], Scripted::at(&[(1, 1)])).unwrap();
		let r = pile.add_grain_and_relax().unwrap();
		assert_eq!(pile.grid(), &vec![vec![1, 3, 1], vec![3, 0, 3], vec![1, 3, 1]]);
		assert_eq!(r.passes, 3);
		assert_eq!(r.topplings, 10);
		assert_eq!(r.grains_lost, 12);
		assert_eq!(pile.total_grains(), 27 + 1 - 12);
	}

	#[test]
	fn pass_uses_critical_snapshot() {
		// (0,1) reaches 4 from its left neighbour during the first pass but
		// must wait for the second pass to topple.
		let mut pile = SandpileEngine::from_grid(vec![vec![3, 3], vec![0, 0]], Scripted::at(&[(0, 0)])).unwrap();
		let r = pile.add_grain_and_relax().unwrap();
		assert_eq!(r.passes, 2);
		assert_eq!(r.topplings, 2);
		assert_eq!(pile.grid(), &vec![vec![1, 0], vec![1, 1]]);
		assert_eq!(r.grains_lost, 4);
	}

	#[test]
	fn unstable_start_relaxes_on_first_drop() {
		let mut pile = SandpileEngine::from_grid(vec![vec![8]], Scripted::at(&[(0, 0)])).unwrap();
		assert!(!pile.is_stable());
		let r = pile.add_grain_and_relax().unwrap();
		assert_eq!(pile.grid(), &vec![vec![1]]);
		assert_eq!(r.passes, 2);
	}

	#[test]
	fn runaway_cascade_hits_pass_limit() {
		let mut pile = SandpileEngine::from_grid(vec![vec![1000]], Scripted::at(&[(0, 0)]))
			.unwrap()
			.with_pass_limit(10);
		assert_eq!(
			pile.add_grain_and_relax(),
			Err(LatticeError::Divergence { what: "sandpile relaxation", limit: 10 })
		);
		assert_eq!(pile.last_relaxation(), None);
	}

	#[test]
	fn large_supplied_pile_relaxes_under_default_limit() {
		let mut pile = SandpileEngine::from_grid(vec![vec![100_000, 0], vec![0, 0]], Scripted::at(&[(1, 1)])).unwrap();
		assert!(pile.pass_limit() >= 100_001 * 9);
		let r = pile.add_grain_and_relax().unwrap();
		assert!(pile.is_stable());
		assert!(r.passes > 1040);
		assert_eq!(pile.total_grains(), 100_001 - r.grains_lost);
	}

	#[test]
	fn default_limit_tracks_grain_count() {
		let pile = SandpileEngine::from_grid(vec![vec![0; 3]; 3], Scripted::at(&[(0, 0)])).unwrap();
		assert_eq!(pile.pass_limit(), 1024);
		assert_eq!(pile.with_pass_limit(7).pass_limit(), 7);
	}

	#[test]
	fn full_site_reports_overflow_on_drop() {
		let mut pile = SandpileEngine::from_grid(vec![vec![Cell::MAX]], Scripted::at(&[(0, 0)])).unwrap();
		assert_eq!(
			pile.add_grain_and_relax(),
			Err(LatticeError::GrainOverflow { row: 0, col: 0 })
		);
		assert_eq!(pile.grid(), &vec![vec![Cell::MAX]]);
	}

	#[test]
	fn full_neighbour_reports_overflow_while_toppling() {
		let mut pile = SandpileEngine::from_grid(vec![vec![4, Cell::MAX], vec![4, 4]], Scripted::at(&[(1, 1)])).unwrap();
		assert_eq!(
			pile.add_grain_and_relax(),
			Err(LatticeError::GrainOverflow { row: 0, col: 1 })
		);
	}

	#[test]
	fn unchanged_grid_is_not_recorded() {
		let mut pile = SandpileEngine::seeded(4, 3).unwrap();
		assert_eq!(pile.record(), Ok(false));
		assert_eq!(pile.history().len(), 1);
		pile.add_grain_and_relax().unwrap();
		assert_eq!(pile.record(), Ok(true));
		assert_eq!(pile.record(), Ok(false));
		assert_eq!(pile.history().len(), 2);
	}

	#[test]
	fn history_is_detached_from_live_grid() {
		let mut pile = SandpileEngine::seeded(6, 11).unwrap();
		let first = pile.history()[0].clone();
		pile.simulate(50).unwrap();
		assert_eq!(pile.history()[0], first);
		let last = pile.history().last().unwrap().clone();
		assert_eq!(pile.into_grid(), last);
	}

	#[test]
	fn simulate_keeps_grid_stable() {
		let mut pile = SandpileEngine::seeded(10, 99).unwrap();
		let grid = pile.simulate(200).unwrap().clone();
		assert!(grid.iter().flatten().all(|&c| c < CRITICAL));
		assert!(pile.history().len() <= 201);
		for pair in pile.history().windows(2) {
			assert!(check_difference(&pair[0], &pair[1]).unwrap() > 0);
		}
	}

	#[test]
	fn display_uses_grain_glyphs() {
		let pile = SandpileEngine::from_grid(vec![vec![0, 1], vec![3, 5]], Scripted::at(&[(0, 0)])).unwrap();
		assert_eq!(pile.to_string(), " .\n&#\n");
	}
}
