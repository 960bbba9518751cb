use std::fmt::Write as _;
use std::io::Write as _;
use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use crate::stats::RankedServer;
use crate::transport::{Measurement, ProgressUpdate, RunConfig, RunMode};

/// Loss above this percentage is flagged in reports
const LOSS_WARNING_PCT: f64 = 5.0;

/// Format a latency in milliseconds with two decimals.
pub fn format_latency(d: Duration) -> String {
	format!("{:.2} ms", d.as_secs_f64() * 1000.0)
}

/// Print a summary of the benchmark configuration before running.
pub fn print_config_summary(config: &RunConfig) {
	println!("DNS Benchmark Configuration");
	println!("===========================");
	println!("Servers:        {}", config.servers.len());
	for s in &config.servers {
		println!("  - {}", s);
	}
	println!("Domains:        {}", config.domains.len());
	match config.mode {
		RunMode::Iterations(n) => println!("Iterations:     {}", n),
		RunMode::WallClock(d) => println!("Duration:       {}", humantime::format_duration(d)),
	}
	println!("Timeout:        {} ms", config.timeout.as_millis());
	println!("Concurrency:    {}", config.concurrency);
	if let Some(seed) = config.seed {
		println!("Seed:           {}", seed);
	}
	println!();
}

/// Rewrite the progress line in place.
pub fn print_progress(update: ProgressUpdate) {
	let pct = if update.total > 0 {
		update.completed as f64 / update.total as f64 * 100.0
	} else {
		0.0
	};
	let elapsed = Duration::from_secs(update.elapsed.as_secs_f64().round() as u64);
	print!(
		"\rProgress: {}/{} ({:.1}%) - Elapsed: {}",
		update.completed, update.total, pct, humantime::format_duration(elapsed),
	);
	let _ = std::io::stdout().flush();
}

/// Build the ranked results table.
pub fn results_table(results: &[RankedServer]) -> Table {
	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);
	table.set_header(vec!["Rank", "Server", "Avg Latency", "Min", "Max", "Loss %"]);

	for r in results {
		let s = &r.stats;
		let loss_color = if s.loss_pct > LOSS_WARNING_PCT { Color::Red } else { Color::Green };
		table.add_row(vec![
			Cell::new(r.rank),
			Cell::new(&s.server),
			Cell::new(format_latency(s.avg)),
			Cell::new(format_latency(s.min)),
			Cell::new(format_latency(s.max)),
			Cell::new(format!("{:.2}%", s.loss_pct)).fg(loss_color),
		]);
	}
	table
}

/// Print the benchmark results as a formatted table.
pub fn print_results_table(results: &[RankedServer], total_time: Duration) {
	println!("\nBenchmark complete in {:.2?}\n", total_time);
	println!("{}", results_table(results));
}

/// Write raw per-query measurements to a CSV file.
pub fn write_csv(path: &str, results: &[Measurement]) -> Result<()> {
	let mut writer = csv::Writer::from_path(path)
		.with_context(|| format!("failed to create CSV file '{}'", path))?;

	writer.write_record(["Server", "Domain", "Duration_ms", "Error"])?;
	for m in results {
		let duration_ms = format!("{:.4}", m.elapsed.as_micros() as f64 / 1000.0);
		writer.write_record([
			m.server.as_str(),
			m.domain.as_str(),
			duration_ms.as_str(),
			m.outcome.error().unwrap_or(""),
		])?;
	}

	writer.flush()?;
	Ok(())
}

fn escape_html(input: &str) -> String {
	let mut out = String::with_capacity(input.len());
	for c in input.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#39;"),
			_ => out.push(c),
		}
	}
	out
}

const HTML_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
	<meta charset="utf-8">
	<title>DNS Benchmark Report</title>
	<style>
		body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif; margin: 2rem; background: #f4f4f9; color: #333; }
		.container { max-width: 1000px; margin: 0 auto; background: white; padding: 2rem; border-radius: 8px; box-shadow: 0 2px 5px rgba(0,0,0,0.1); }
		h1 { margin-top: 0; color: #2c3e50; }
		.summary { margin-bottom: 2rem; padding: 1rem; background: #eef2f7; border-radius: 4px; }
		table { width: 100%; border-collapse: collapse; margin-top: 1rem; }
		th, td { padding: 12px; text-align: left; border-bottom: 1px solid #ddd; }
		th { background-color: #2c3e50; color: white; }
		tr:nth-child(even) { background-color: #f9f9f9; }
		.good { color: green; font-weight: bold; }
		.bad { color: red; font-weight: bold; }
		.rank { font-weight: bold; color: #555; }
	</style>
</head>
"#;

/// Render the ranked results as a self-contained HTML page.
pub fn render_html(results: &[RankedServer], total_time: Duration) -> String {
	let mut html = String::from(HTML_HEAD);
	html.push_str("<body>\n\t<div class=\"container\">\n\t\t<h1>DNS Benchmark Results</h1>\n");
	// Writing into a String cannot fail
	let _ = write!(
		html,
		"\t\t<div class=\"summary\">\n\t\t\t<strong>Total Duration:</strong> {:.2?}<br>\n\t\t\t<strong>Servers Tested:</strong> {}\n\t\t</div>\n",
		total_time,
		results.len(),
	);
	html.push_str(
		"\t\t<table>\n\t\t\t<thead>\n\t\t\t\t<tr><th>Rank</th><th>Server</th><th>Avg Latency</th><th>Min</th><th>Max</th><th>Loss %</th></tr>\n\t\t\t</thead>\n\t\t\t<tbody>\n",
	);

	for r in results {
		let s = &r.stats;
		let class = if s.loss_pct > LOSS_WARNING_PCT { "bad" } else { "good" };
		let _ = writeln!(
			html,
			"\t\t\t\t<tr><td class=\"rank\">{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td class=\"{}\">{:.2}%</td></tr>",
			r.rank,
			escape_html(&s.server),
			format_latency(s.avg),
			format_latency(s.min),
			format_latency(s.max),
			class,
			s.loss_pct,
		);
	}

	html.push_str("\t\t\t</tbody>\n\t\t</table>\n\t</div>\n</body>\n</html>\n");
	html
}

/// Write the HTML report to a file.
pub fn write_html(path: &str, results: &[RankedServer], total_time: Duration) -> Result<()> {
	std::fs::write(path, render_html(results, total_time))
		.with_context(|| format!("failed to write HTML report '{}'", path))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::stats::compute_stats;
	use crate::transport::Outcome;

	fn sample() -> Vec<Measurement> {
		vec![
			Measurement {
				server: "8.8.8.8".to_string(),
				domain: "a.com".to_string(),
				elapsed: Duration::from_micros(12_345),
				outcome: Outcome::Success,
			},
			Measurement {
				server: "<evil>".to_string(),
				domain: "b.com".to_string(),
				elapsed: Duration::from_millis(1000),
				outcome: Outcome::Failure("timeout after 1s".to_string()),
			},
		]
	}

	#[test]
	fn test_format_latency() {
		assert_eq!(format_latency(Duration::from_micros(12_345)), "12.35 ms");
		assert_eq!(format_latency(Duration::ZERO), "0.00 ms");
	}

	#[test]
	fn test_write_csv() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("raw.csv");
		write_csv(path.to_str().unwrap(), &sample()).unwrap();

		let content = std::fs::read_to_string(&path).unwrap();
		let lines: Vec<&str> = content.lines().collect();
		assert_eq!(lines[0], "Server,Domain,Duration_ms,Error");
		assert_eq!(lines[1], "8.8.8.8,a.com,12.3450,");
		assert_eq!(lines[2], "<evil>,b.com,1000.0000,timeout after 1s");
	}

	#[test]
	fn test_render_html() {
		let ranked = compute_stats(&sample());
		let html = render_html(&ranked, Duration::from_secs(2));
		assert!(html.starts_with("<!DOCTYPE html>"));
		assert!(html.contains("<strong>Servers Tested:</strong> 2"));
		assert!(html.contains("&lt;evil&gt;"));
		assert!(!html.contains("<evil>"));
		assert!(html.contains("class=\"good\">0.00%"));
		assert!(html.contains("class=\"bad\">100.00%"));
	}

	#[test]
	fn test_write_html() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("report.html");
		write_html(path.to_str().unwrap(), &compute_stats(&sample()), Duration::from_secs(1)).unwrap();
		assert!(std::fs::read_to_string(&path).unwrap().contains("DNS Benchmark Results"));
	}

	#[test]
	fn test_results_table_rows() {
		let ranked = compute_stats(&sample());
		let table = results_table(&ranked);
		let rendered = table.to_string();
		assert!(rendered.contains("8.8.8.8"));
		assert!(rendered.contains("100.00%"));
	}
}
