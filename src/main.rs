use lattice_sim::{
	estimate_percolation_probability,
	fmt_grid,
	png,
	Grid,
	LatticeRng,
	Palette,
	PercolationEngine,
	SandpileEngine,
	PERCOLATION_PALETTE,
	SANDPILE_GLYPHS,
	SANDPILE_PALETTE,
};

use std::{
	error::Error,
	io,
	process::ExitCode,
};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Sandpile and percolation simulations on square lattices
#[derive(Parser, Debug)]
#[command(name = "lattice-sim")]
#[command(about = "Abelian sandpile and site percolation on an NxN lattice", long_about = None)]
struct Args {
	#[command(subcommand)]
	model: Model,
}

#[derive(Subcommand, Debug)]
enum Model {
	/// Drop grains on a random sandpile, relaxing after each drop
	Sandpile {
		/// Lattice side length
		size: usize,

		/// Number of grains to drop
		#[arg(short, long, default_value_t = 1000)]
		steps: usize,

		/// Seed for reproducible runs (omit for a fresh random run)
		#[arg(long)]
		seed: Option<u64>,

		/// '+'-separated outputs: ascii, stats, history
		#[arg(short, long, default_value = "ascii", value_parser = parse_outputs)]
		output: Outputs,

		/// Write the final grid to this png file
		#[arg(long)]
		png: Option<String>,
	},
	/// Pour water on a random lattice and report whether it reaches the bottom
	Percolate {
		/// Lattice side length
		size: usize,

		/// Probability that a site is blocked
		#[arg(short, long, default_value_t = 0.4)]
		p: f64,

		/// Seed for reproducible runs (omit for a fresh random run)
		#[arg(long)]
		seed: Option<u64>,

		/// Estimate the percolation probability over this many lattices instead
		#[arg(short, long)]
		trials: Option<usize>,

		/// '+'-separated outputs: ascii, stats
		#[arg(short, long, default_value = "ascii", value_parser = parse_outputs)]
		output: Outputs,

		/// Write the filled lattice to this png file
		#[arg(long)]
		png: Option<String>,
	},
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Outputs {
	ascii: bool,
	stats: bool,
	history: bool,
}

fn parse_outputs(s: &str) -> Result<Outputs, String> {
	let mut outputs = Outputs::default();
	for out in s.split('+') {
		match out {
			"ascii" => outputs.ascii = true,
			"stats" => outputs.stats = true,
			"history" => outputs.history = true,
			_ => return Err(format!("\
Expected '+'-separated 'ascii', 'stats', and/or 'history'.
Got: {}", out)),
		}
	}
	Ok(outputs)
}

fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
		.with_writer(io::stderr)
		.init();
	let args = Args::parse();
	match run(args.model) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			eprintln!("{}", e);
			ExitCode::FAILURE
		}
	}
}

fn run(model: Model) -> Result<(), Box<dyn Error>> {
	match model {
		Model::Sandpile { size, steps, seed, output, png } => {
			let mut pile = SandpileEngine::new(size, LatticeRng::from_seed(seed))?;
			pile.simulate(steps)?;
			info!(size, steps, grains = pile.total_grains(), "sandpile done");
			if output.history {
				for (k, g) in pile.history().iter().enumerate() {
					println!("State {}:", k);
					print!("{}", fmt_grid(g, &SANDPILE_GLYPHS));
				}
			}
			if output.ascii {
				print!("{}", pile);
			}
			if output.stats {
				println!("Grains: {}", pile.total_grains());
				println!("Recorded states: {}", pile.history().len());
				if let Some(r) = pile.last_relaxation() {
					println!("Last drop: ({}, {})", r.site.0, r.site.1);
					println!("Topplings: {}", r.topplings);
					println!("Passes: {}", r.passes);
					println!("Grains lost: {}", r.grains_lost);
				}
			}
			if let Some(filename) = png {
				write_png(&pile.into_grid(), &SANDPILE_PALETTE, &filename)?;
			}
		}
		Model::Percolate { size, p, seed, trials, output, png } => {
			let rng = LatticeRng::from_seed(seed);
			if let Some(trials) = trials {
				let estimate = estimate_percolation_probability(size, p, trials, rng)?;
				println!("Percolation probability: {}", estimate);
				return Ok(())
			}
			let mut perc = PercolationEngine::new(size, p, rng)?;
			let percolates = perc.percolate()?;
			if output.ascii {
				print!("{}", perc);
			}
			println!("Percolates: {}", percolates);
			if output.stats {
				println!("Open sites: {}", perc.open_count());
				println!("Filled sites: {}", perc.filled_count());
			}
			if let Some(filename) = png {
				write_png(perc.grid_filled(), &PERCOLATION_PALETTE, &filename)?;
			}
		}
	}
	Ok(())
}

fn write_png(grid: &Grid, palette: Palette, filename: &str) -> Result<(), Box<dyn Error>> {
	png(grid, palette, filename)
		.map_err(|e| format!("Can't write to file {}. {}", filename, e).into())
}
