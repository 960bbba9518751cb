use std::time::Duration;

use clap::Parser;

/// DNS resolver latency benchmark
#[derive(Parser, Debug)]
#[command(name = "dns-bench")]
#[command(about = "Benchmark DNS resolver latency and loss over UDP, DoT, and DoH")]
pub struct Cli {
	/// Number of concurrent queries
	#[arg(short = 'c', long = "concurrency", default_value = "50")]
	pub concurrency: usize,

	/// Number of iterations per domain per server
	#[arg(short = 'n', long = "iterations", default_value = "1")]
	pub iterations: u32,

	/// Timeout for each query (e.g. 1s, 500ms)
	#[arg(short = 't', long = "timeout", default_value = "1s", value_parser = humantime::parse_duration)]
	pub timeout: Duration,

	/// Run for a fixed duration with random sampling (e.g. 30s); overrides --iterations
	#[arg(short = 'd', long = "duration", value_parser = humantime::parse_duration)]
	pub duration: Option<Duration>,

	/// File containing servers (one per line, or YAML with a `servers:` list)
	#[arg(long = "servers")]
	pub servers: Option<String>,

	/// File containing domains (one per line, or CSV)
	#[arg(long = "domains")]
	pub domains: Option<String>,

	/// Output CSV file for raw results
	#[arg(short = 'o', long = "output")]
	pub output: Option<String>,

	/// Output HTML report file
	#[arg(long = "html")]
	pub html: Option<String>,

	/// Verbose logging (show errors and slow queries)
	#[arg(short = 'v', long = "verbose")]
	pub verbose: bool,

	/// Show a progress line (iteration mode only)
	#[arg(short = 'p', long = "progress")]
	pub progress: bool,

	/// Random seed for reproducible duration-mode sampling
	#[arg(short = 's', long = "seed")]
	pub seed: Option<u64>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let cli = Cli::try_parse_from(["dns-bench"]).unwrap();
		assert_eq!(cli.concurrency, 50);
		assert_eq!(cli.iterations, 1);
		assert_eq!(cli.timeout, Duration::from_secs(1));
		assert!(cli.duration.is_none());
		assert!(!cli.verbose);
		assert!(!cli.progress);
	}

	#[test]
	fn test_duration_flags() {
		let cli = Cli::try_parse_from(["dns-bench", "-d", "30s", "-t", "500ms", "-c", "8"]).unwrap();
		assert_eq!(cli.duration, Some(Duration::from_secs(30)));
		assert_eq!(cli.timeout, Duration::from_millis(500));
		assert_eq!(cli.concurrency, 8);
	}

	#[test]
	fn test_bad_duration() {
		assert!(Cli::try_parse_from(["dns-bench", "-t", "soon"]).is_err());
	}
}
