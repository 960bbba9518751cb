use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::probe::{Probe, ProbeError, ProbeResult};
use crate::transport::{Job, Measurement, Outcome, ProgressUpdate, RunConfig, RunMode};

/// Successful queries slower than this are reported in verbose mode
pub const SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(500);
/// Progress is reported every this many completions
const PROGRESS_INTERVAL: usize = 10;

/// Callback receiving progress snapshots
pub type ProgressSink = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

type JobQueue = Arc<AsyncMutex<mpsc::Receiver<Job>>>;

/// Settings every worker reads, fixed for the run
struct WorkerSettings {
	timeout: Duration,
	verbose: bool,
	/// Wall-clock mode only: one permit per worker waiting for a job
	idle: Option<Arc<Semaphore>>,
}

/// Completion counter shared by the workers.
///
/// Only used when the total job count is known up front.
pub struct ProgressTracker {
	total: usize,
	started: Instant,
	completed: Mutex<usize>,
	sink: ProgressSink,
}

impl ProgressTracker {
	pub fn new(total: usize, sink: ProgressSink) -> Self {
		ProgressTracker {
			total,
			started: Instant::now(),
			completed: Mutex::new(0),
			sink,
		}
	}

	/// Count one completed job, reporting every tenth and the last one.
	pub fn record(&self) {
		// Reported under the lock so snapshots reach the sink in order
		let mut completed = self.completed.lock().unwrap_or_else(|e| e.into_inner());
		*completed += 1;
		if *completed % PROGRESS_INTERVAL == 0 || *completed == self.total {
			(self.sink)(ProgressUpdate {
				completed: *completed,
				total: self.total,
				elapsed: self.started.elapsed(),
			});
		}
	}
}

/// Every server×domain pair, repeated `iterations` times.
///
/// Iteration is the outer loop, then server, then domain.
pub fn iteration_jobs<'a>(
	servers: &'a [Arc<str>],
	domains: &'a [Arc<str>],
	iterations: u32,
) -> impl Iterator<Item = Job> + 'a {
	(0..iterations).flat_map(move |_| {
		servers.iter().flat_map(move |server| {
			domains.iter().map(move |domain| Job {
				server: server.clone(),
				domain: domain.clone(),
			})
		})
	})
}

/// Enqueue the full cross product, then close the queue by dropping the sender.
async fn enqueue_iterations(
	servers: Arc<[Arc<str>]>,
	domains: Arc<[Arc<str>]>,
	iterations: u32,
	jobs: mpsc::Sender<Job>,
) {
	for job in iteration_jobs(&servers, &domains, iterations) {
		if jobs.send(job).await.is_err() {
			warn!("job queue closed before all jobs were enqueued");
			return;
		}
	}
}

/// Enqueue uniformly sampled jobs until the deadline fires.
///
/// A job is only produced once a worker has announced itself idle, so the
/// queue never holds work that would start after the deadline. Every job
/// enqueued is still dequeued and probed.
async fn enqueue_sampled(
	servers: Arc<[Arc<str>]>,
	domains: Arc<[Arc<str>]>,
	deadline: Instant,
	seed: Option<u64>,
	idle: Arc<Semaphore>,
	jobs: mpsc::Sender<Job>,
) {
	if servers.is_empty() || domains.is_empty() {
		return;
	}

	let mut rng = match seed {
		Some(seed) => StdRng::seed_from_u64(seed),
		None => StdRng::from_entropy(),
	};
	let sleep = tokio::time::sleep_until(deadline);
	tokio::pin!(sleep);

	let mut sent = 0usize;
	while !sleep.is_elapsed() {
		let permit = tokio::select! {
			biased;
			_ = &mut sleep => break,
			permit = idle.acquire() => permit,
		};
		let Ok(permit) = permit else { break };
		permit.forget();

		let job = Job {
			server: servers[rng.gen_range(0..servers.len())].clone(),
			domain: domains[rng.gen_range(0..domains.len())].clone(),
		};
		if jobs.send(job).await.is_err() {
			break;
		}
		sent += 1;
	}
	debug!(jobs = sent, "deadline reached, job source stopped");
}

/// Run one job under the configured timeout.
async fn measure(probe: &dyn Probe, job: &Job, timeout: Duration) -> Measurement {
	let start = Instant::now();
	let result = match tokio::time::timeout(timeout, probe.probe(&job.server, &job.domain, timeout)).await {
		Ok(result) => result,
		Err(_) => ProbeResult {
			elapsed: start.elapsed(),
			outcome: Err(ProbeError::Timeout(timeout)),
		},
	};

	Measurement {
		server: job.server.to_string(),
		domain: job.domain.to_string(),
		elapsed: result.elapsed,
		outcome: match result.outcome {
			Ok(()) => Outcome::Success,
			Err(e) => Outcome::Failure(e.to_string()),
		},
	}
}

fn report_verbose(m: &Measurement) {
	match &m.outcome {
		Outcome::Failure(err) => {
			warn!(server = %m.server, domain = %m.domain, error = %err, "error resolving");
		}
		Outcome::Success if m.elapsed > SLOW_QUERY_THRESHOLD => {
			warn!(server = %m.server, domain = %m.domain, elapsed = ?m.elapsed, "slow resolve");
		}
		Outcome::Success => {}
	}
}

/// Pull jobs until the queue is closed and drained, publishing one
/// measurement per job.
async fn worker(
	jobs: JobQueue,
	results: mpsc::Sender<Measurement>,
	probe: Arc<dyn Probe>,
	settings: Arc<WorkerSettings>,
	progress: Option<Arc<ProgressTracker>>,
) {
	loop {
		if let Some(idle) = &settings.idle {
			idle.add_permits(1);
		}
		let job = jobs.lock().await.recv().await;
		let Some(job) = job else { break };

		let measurement = measure(probe.as_ref(), &job, settings.timeout).await;
		if settings.verbose {
			report_verbose(&measurement);
		}
		if results.send(measurement).await.is_err() {
			warn!("result queue closed, worker exiting");
			break;
		}
		if let Some(progress) = &progress {
			progress.record();
		}
	}
}

/// Drain the result queue until every sender is gone.
///
/// `capacity` is only a starting size; the job count may be huge.
async fn collect(mut results: mpsc::Receiver<Measurement>, capacity: usize) -> Vec<Measurement> {
	let mut all = Vec::with_capacity(capacity);
	while let Some(m) = results.recv().await {
		all.push(m);
	}
	all
}

/// Run the benchmark described by `config` and return every measurement.
///
/// Spawns `config.concurrency` workers fed from a bounded job queue. The
/// result queue closes only after every worker has returned, so no
/// measurement is dropped. In wall-clock mode jobs are handed out only to
/// idle workers, so the run ends at most one probe timeout after the
/// deadline.
pub async fn run_benchmark(
	config: &RunConfig,
	probe: Arc<dyn Probe>,
	on_progress: ProgressSink,
) -> Vec<Measurement> {
	if config.concurrency == 0 {
		warn!("concurrency is zero, nothing to run");
		return Vec::new();
	}

	let buffer_size = config.concurrency.saturating_mul(10).max(1);
	let (job_tx, job_rx) = mpsc::channel::<Job>(buffer_size);
	let (result_tx, result_rx) = mpsc::channel::<Measurement>(buffer_size);
	let job_rx: JobQueue = Arc::new(AsyncMutex::new(job_rx));

	let servers: Arc<[Arc<str>]> = config.servers.iter().map(|s| Arc::from(s.as_str())).collect();
	let domains: Arc<[Arc<str>]> = config.domains.iter().map(|d| Arc::from(d.as_str())).collect();

	let total_jobs = config.total_jobs();
	let progress = match total_jobs {
		Some(total) if config.show_progress && total > 0 => {
			Some(Arc::new(ProgressTracker::new(total, on_progress)))
		}
		_ => None,
	};

	let deadline = match config.mode {
		RunMode::WallClock(d) => Some(Instant::now() + d),
		RunMode::Iterations(_) => None,
	};
	let idle = deadline.map(|_| Arc::new(Semaphore::new(0)));
	let settings = Arc::new(WorkerSettings {
		timeout: config.timeout,
		verbose: config.verbose,
		idle: idle.clone(),
	});

	debug!(
		workers = config.concurrency,
		servers = servers.len(),
		domains = domains.len(),
		mode = ?config.mode,
		"starting worker pool"
	);

	let mut workers = JoinSet::new();
	for _ in 0..config.concurrency {
		workers.spawn(worker(
			job_rx.clone(),
			result_tx.clone(),
			probe.clone(),
			settings.clone(),
			progress.clone(),
		));
	}
	// Workers own the only handles on the job queue from here on
	drop(job_rx);

	let source = match (deadline, idle) {
		(Some(deadline), Some(idle)) => {
			tokio::spawn(enqueue_sampled(servers, domains, deadline, config.seed, idle, job_tx))
		}
		_ => {
			let iterations = match config.mode {
				RunMode::Iterations(n) => n,
				RunMode::WallClock(_) => 0,
			};
			tokio::spawn(enqueue_iterations(servers, domains, iterations, job_tx))
		}
	};

	// The result queue closes only once the pool has fully stopped
	let watcher = tokio::spawn(async move {
		while let Some(joined) = workers.join_next().await {
			if let Err(e) = joined {
				error!(error = %e, "worker task failed");
			}
		}
		drop(result_tx);
	});

	let results = collect(result_rx, buffer_size).await;

	if let Err(e) = source.await {
		error!(error = %e, "job source task failed");
	}
	if let Err(e) = watcher.await {
		error!(error = %e, "pool watcher task failed");
	}

	debug!(measurements = results.len(), "benchmark run complete");
	results
}
