mod bench;
mod cli;
mod dns;
mod domains;
mod output;
mod probe;
mod resolver;
mod stats;
mod transport;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::Cli;
use crate::probe::{DnsProbe, Probe};
use crate::transport::RunConfig;

/// Log to stderr; RUST_LOG overrides the level picked from --verbose.
fn init_logging(verbose: bool) {
	let default_level = if verbose { "info" } else { "warn" };
	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(default_level));
	tracing_subscriber::registry()
		.with(env_filter)
		.with(fmt::layer().with_target(false).with_writer(std::io::stderr))
		.init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	init_logging(cli.verbose);

	// Servers from file or the built-in table
	let servers = match &cli.servers {
		Some(path) => resolver::read_server_file(path)?,
		None => resolver::default_servers(),
	};
	let (servers, warnings) = resolver::validate_servers(&servers);
	for w in &warnings {
		warn!("{}", w);
	}
	if servers.is_empty() {
		bail!("no valid servers to benchmark");
	}

	let domains = match &cli.domains {
		Some(path) => domains::read_domain_file(path)?,
		None => domains::default_domains(),
	};
	let (domains, warnings) = domains::validate_domains(&domains);
	for w in &warnings {
		warn!("{}", w);
	}
	if domains.is_empty() {
		bail!("no valid domains to query");
	}

	let mut config = RunConfig::new(servers, domains);
	config.concurrency = cli.concurrency;
	config.timeout = cli.timeout;
	config.mode = RunConfig::mode_from(cli.iterations, cli.duration);
	config.verbose = cli.verbose;
	config.show_progress = cli.progress;
	config.seed = cli.seed;

	output::print_config_summary(&config);

	// Built before any worker starts so every worker shares one HTTPS client
	let probe: Arc<dyn Probe> = Arc::new(
		DnsProbe::new(config.timeout).context("failed to initialise DNS transport")?,
	);

	println!("Running benchmark...");
	let start = Instant::now();
	let results = bench::run_benchmark(&config, probe, Arc::new(output::print_progress)).await;
	let total_time = start.elapsed();
	if config.show_progress && config.total_jobs().is_some_and(|t| t > 0) {
		println!();
	}
	info!(measurements = results.len(), "benchmark finished");

	let ranked = stats::compute_stats(&results);
	output::print_results_table(&ranked, total_time);

	if let Some(path) = &cli.output {
		match output::write_csv(path, &results) {
			Ok(()) => println!("Results exported to {}", path),
			Err(e) => error!("error exporting results: {:#}", e),
		}
	}

	if let Some(path) = &cli.html {
		match output::write_html(path, &ranked, total_time) {
			Ok(()) => println!("HTML report generated at {}", path),
			Err(e) => error!("error generating HTML report: {:#}", e),
		}
	}

	Ok(())
}
