//! Error type shared by both engines.

use std::{
	error::Error,
	fmt,
};

use crate::Cell;

pub type Result<T> = std::result::Result<T, LatticeError>;

#[derive(Clone, Debug, PartialEq)]
pub enum LatticeError {
	/// Lattice side length was zero.
	InvalidSize {
		n: usize,
	},
	/// A supplied grid holds a value the engine does not accept,
	/// or its rows do not form a square.
	InvalidGrid {
		reason: String,
	},
	/// Two grids compared cell-by-cell have different shapes.
	ShapeMismatch {
		left: (usize, usize),
		right: (usize, usize),
	},
	/// Blocking probability is not a finite number in `[0, 1]`.
	InvalidProbability {
		p: f64,
	},
	/// Monte-Carlo estimate asked for zero trials.
	InvalidTrials {
		trials: usize,
	},
	/// A site would hold more grains than a `Cell` can count.
	GrainOverflow {
		row: usize,
		col: usize,
	},
	/// Relaxation or flood fill ran past its iteration bound.
	Divergence {
		what: &'static str,
		limit: u64,
	},
}

impl LatticeError {
	pub(crate) fn bad_value(row: usize, col: usize, value: Cell) -> LatticeError {
		LatticeError::InvalidGrid {
			reason: format!("value {} at ({}, {}) is not 0 or 1", value, row, col),
		}
	}
}

impl fmt::Display for LatticeError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::InvalidSize { n } => write!(f, "invalid lattice size {}, expected n > 0", n),
			Self::InvalidGrid { reason } => write!(f, "invalid grid: {}", reason),
			Self::ShapeMismatch { left, right } => write!(
				f,
				"grids of different shapes: {}x{} vs {}x{}",
				left.0, left.1, right.0, right.1
			),
			Self::InvalidProbability { p } => write!(f, "probability {} is outside [0, 1]", p),
			Self::InvalidTrials { trials } => write!(f, "invalid trial count {}, expected at least 1", trials),
			Self::GrainOverflow { row, col } => write!(f, "grain count overflow at ({}, {})", row, col),
			Self::Divergence { what, limit } => write!(f, "{} did not terminate within {} iterations", what, limit),
		}
	}
}

impl Error for LatticeError {}
