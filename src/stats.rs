use std::collections::HashMap;
use std::time::Duration;

use crate::transport::Measurement;

/// Per-server statistics over every measurement of a run
#[derive(Debug, Clone, PartialEq)]
pub struct ServerStats {
	pub server: String,
	pub total: usize,
	pub success: usize,
	pub errors: usize,
	/// Fastest successful query; zero when nothing succeeded
	pub min: Duration,
	pub max: Duration,
	/// Mean over successful queries only
	pub avg: Duration,
	pub loss_pct: f64,
}

/// Server statistics with its position in the ranking
#[derive(Debug, Clone, PartialEq)]
pub struct RankedServer {
	pub rank: usize,
	pub stats: ServerStats,
}

/// Running totals for a single server
#[derive(Default)]
struct ServerAggregation {
	total: usize,
	errors: usize,
	success_time: Duration,
	min: Option<Duration>,
	max: Duration,
}

impl ServerAggregation {
	fn add(&mut self, m: &Measurement) {
		self.total += 1;
		if !m.outcome.is_success() {
			self.errors += 1;
			return;
		}
		self.success_time += m.elapsed;
		self.min = Some(self.min.map_or(m.elapsed, |min| min.min(m.elapsed)));
		self.max = self.max.max(m.elapsed);
	}

	fn finish(self, server: &str) -> ServerStats {
		let success = self.total - self.errors;
		let avg = if success > 0 {
			Duration::from_nanos((self.success_time.as_nanos() / success as u128) as u64)
		} else {
			Duration::ZERO
		};
		let loss_pct = if self.total > 0 {
			self.errors as f64 / self.total as f64 * 100.0
		} else {
			0.0
		};
		ServerStats {
			server: server.to_string(),
			total: self.total,
			success,
			errors: self.errors,
			min: self.min.unwrap_or(Duration::ZERO),
			max: self.max,
			avg,
			loss_pct,
		}
	}
}

/// Reduce a run's measurements to ranked per-server statistics.
///
/// The result only depends on the set of measurements, not their order.
pub fn compute_stats(results: &[Measurement]) -> Vec<RankedServer> {
	let mut groups: HashMap<&str, ServerAggregation> = HashMap::new();
	for m in results {
		groups.entry(m.server.as_str()).or_default().add(m);
	}

	let stats: Vec<ServerStats> = groups.into_iter()
		.map(|(server, agg)| agg.finish(server))
		.collect();
	rank_servers(stats)
}

/// Rank servers: any success beats none, then ascending average latency.
///
/// Ties fall back to the server identifier so the ranking is stable.
pub fn rank_servers(mut servers: Vec<ServerStats>) -> Vec<RankedServer> {
	servers.sort_by(|a, b| {
		(a.success == 0).cmp(&(b.success == 0))
			.then(a.avg.cmp(&b.avg))
			.then_with(|| a.server.cmp(&b.server))
	});
	servers.into_iter()
		.enumerate()
		.map(|(i, stats)| RankedServer { rank: i + 1, stats })
		.collect()
}
