use std::sync::Arc;
use std::time::Duration;

/// Default number of concurrent workers
pub const DEFAULT_CONCURRENCY: usize = 50;
/// Default iterations per server and domain pair
pub const DEFAULT_ITERATIONS: u32 = 1;
/// Default per-query timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// A single (server, domain) probe to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
	pub server: Arc<str>,
	pub domain: Arc<str>,
}

/// Outcome of a single probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
	Success,
	Failure(String),
}

impl Outcome {
	pub fn is_success(&self) -> bool {
		matches!(self, Outcome::Success)
	}

	/// Error detail, if the probe failed
	pub fn error(&self) -> Option<&str> {
		match self {
			Outcome::Success => None,
			Outcome::Failure(msg) => Some(msg),
		}
	}
}

/// Result of a single DNS query against one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
	pub server: String,
	pub domain: String,
	pub elapsed: Duration,
	pub outcome: Outcome,
}

/// How the job source generates work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
	/// Every server×domain pair, repeated n times
	Iterations(u32),
	/// Random server×domain samples until the deadline fires
	WallClock(Duration),
}

/// Benchmark run configuration
#[derive(Debug, Clone)]
pub struct RunConfig {
	pub servers: Vec<String>,
	pub domains: Vec<String>,
	pub concurrency: usize,
	pub timeout: Duration,
	pub mode: RunMode,
	pub verbose: bool,
	pub show_progress: bool,
	/// Seed for wall-clock sampling; entropy when unset
	pub seed: Option<u64>,
}

impl RunConfig {
	/// Build a configuration with default concurrency, timeout and iterations.
	pub fn new(servers: Vec<String>, domains: Vec<String>) -> Self {
		RunConfig {
			servers,
			domains,
			concurrency: DEFAULT_CONCURRENCY,
			timeout: DEFAULT_TIMEOUT,
			mode: RunMode::Iterations(DEFAULT_ITERATIONS),
			verbose: false,
			show_progress: false,
			seed: None,
		}
	}

	/// Pick the run mode from an iteration count and an optional duration.
	///
	/// A non-zero duration overrides the iteration count.
	pub fn mode_from(iterations: u32, duration: Option<Duration>) -> RunMode {
		match duration {
			Some(d) if !d.is_zero() => RunMode::WallClock(d),
			_ => RunMode::Iterations(iterations),
		}
	}

	/// Total number of jobs, known only in iteration mode.
	pub fn total_jobs(&self) -> Option<usize> {
		match self.mode {
			RunMode::Iterations(n) => {
				Some(self.servers.len()
					.saturating_mul(self.domains.len())
					.saturating_mul(n as usize))
			}
			RunMode::WallClock(_) => None,
		}
	}
}

/// Snapshot of run progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
	pub completed: usize,
	pub total: usize,
	pub elapsed: Duration,
}
