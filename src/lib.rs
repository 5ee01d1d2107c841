//! Two simulations on an `n`x`n` square lattice.
//!
//! - [`SandpileEngine`]: abelian sandpile with open boundary. Grains are
//!   dropped on random sites and every site holding 4 or more grains
//!   topples, sending one grain to each orthogonal neighbour.
//! - [`PercolationEngine`]: site percolation. Water poured along the top
//!   row spreads through open sites; the lattice percolates when it
//!   reaches the bottom row.
//!
//! Both engines take an injected [`LatticeSampler`], usually a seeded
//! [`LatticeRng`].

use std::{
	fs::File,
	io,
};

mod error;
mod percolation;
mod rng;
mod sandpile;

pub use error::{LatticeError, Result};
pub use percolation::{estimate_percolation_probability, PercolationEngine, BLOCKED, FILLED, OPEN};
pub use rng::{LatticeRng, LatticeSampler};
pub use sandpile::{Relaxation, SandpileEngine, CRITICAL};

pub type Cell = u32;
pub type Grid = Vec<Vec<Cell>>;

/// One RGBA colour per cell value; values past the end use the last entry.
pub type Palette<'a> = &'a [[u8; 4]];

pub const SANDPILE_PALETTE: [[u8; 4]; 4] = [
	[0, 0, 0, 255],
	[64, 128, 0, 255],
	[118, 8, 170, 255],
	[255, 214, 0, 255],
];

pub const PERCOLATION_PALETTE: [[u8; 4]; 3] = [
	[40, 40, 40, 255],
	[235, 235, 235, 255],
	[30, 110, 220, 255],
];

/// Number of cells in which `a` and `b` differ.
pub fn check_difference(a: &Grid, b: &Grid) -> Result<usize> {
	let (sa, sb) = (shape(a), shape(b));
	if sa != sb || !is_rectangular(a) || !is_rectangular(b) {
		return Err(LatticeError::ShapeMismatch { left: sa, right: sb });
	}
	Ok(a.iter()
		.zip(b)
		.map(|(ra, rb)| ra.iter().zip(rb).filter(|(x, y)| x != y).count())
		.sum())
}

/// Sum of all cells.
pub fn grid_total(grid: &Grid) -> u64 {
	grid.iter().flatten().map(|&c| c as u64).sum()
}

fn shape(grid: &Grid) -> (usize, usize) {
	(grid.len(), grid.first().map_or(0, |r| r.len()))
}

fn is_rectangular(grid: &Grid) -> bool {
	let l = shape(grid).1;
	grid.iter().all(|r| r.len() == l)
}

/// Side length of a non-empty square grid.
pub(crate) fn square_side(grid: &Grid) -> Result<usize> {
	let n = grid.len();
	if n == 0 {
		return Err(LatticeError::InvalidSize { n });
	}
	for (i, row) in grid.iter().enumerate() {
		if row.len() != n {
			return Err(LatticeError::InvalidGrid {
				reason: format!("row {} has {} cells, expected {}", i, row.len(), n),
			});
		}
	}
	Ok(n)
}

/// In-bounds orthogonal neighbours of `(i, j)`. Off-lattice positions are
/// absent, not blocked.
pub(crate) fn neighbours(i: usize, j: usize, n: usize) -> impl Iterator<Item = (usize, usize)> {
	let up = i.checked_sub(1).map(|i1| (i1, j));
	let down = if i + 1 < n { Some((i + 1, j)) } else { None };
	let left = j.checked_sub(1).map(|j1| (i, j1));
	let right = if j + 1 < n { Some((i, j + 1)) } else { None };
	[down, up, left, right].into_iter().flatten()
}

pub fn png(grid: &Grid, palette: Palette, fname: &str) -> io::Result<()> {
	let (h, w) = shape(grid);
	let mut pixels = vec![0; h * w * 4];
	let mut p = 0;
	for row in grid {
		for el in row {
			pixels[p..p + 4].copy_from_slice(&colour(palette, *el));
			p += 4;
		}
	}
	repng::encode(File::create(fname)?, w as u32, h as u32, &pixels)
}

fn colour(palette: Palette, value: Cell) -> [u8; 4] {
	match palette.get(value as usize).or_else(|| palette.last()) {
		Some(c) => *c,
		None => [0, 0, 0, 255],
	}
}

pub const SANDPILE_GLYPHS: [&str; 5] = [" ", ".", ":", "&", "#"];
pub const PERCOLATION_GLYPHS: [&str; 3] = ["#", " ", "~"];

/// One glyph per cell value; values past the end use the last glyph.
pub fn fmt_grid(grid: &Grid, vis: &[&str]) -> String {
	let mut s = String::new();
	for row in grid {
		for el in row {
			s += vis[(*el as usize).min(vis.len() - 1)];
		}
		s += "\n";
	}
	s
}
