use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use regex::Regex;

const MAX_DOMAIN_LENGTH: usize = 253;
const MAX_LABEL_LENGTH: usize = 63;

/// Popular domains queried when no domain file is given
pub const DEFAULT_DOMAINS: &[&str] = &[
	"google.com",
	"facebook.com",
	"amazon.com",
	"apple.com",
	"microsoft.com",
	"netflix.com",
	"twitter.com",
	"instagram.com",
	"linkedin.com",
	"wikipedia.org",
];

fn domain_regex() -> &'static Regex {
	static DOMAIN_RE: OnceLock<Regex> = OnceLock::new();
	DOMAIN_RE.get_or_init(|| {
		Regex::new(r"^([a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}$")
			.expect("domain pattern is valid")
	})
}

/// Return the built-in domain table.
pub fn default_domains() -> Vec<String> {
	DEFAULT_DOMAINS.iter().map(|s| s.to_string()).collect()
}

/// Check that a domain name is well formed.
pub fn validate_domain(domain: &str) -> Result<()> {
	if domain.is_empty() {
		bail!("domain cannot be empty");
	}
	if domain.len() > MAX_DOMAIN_LENGTH {
		bail!("domain exceeds maximum length of {} characters", MAX_DOMAIN_LENGTH);
	}

	let labels: Vec<&str> = domain.split('.').collect();
	if labels.len() < 2 {
		bail!("domain must have at least two labels (e.g., example.com)");
	}
	for label in &labels {
		if label.is_empty() {
			bail!("domain contains empty label");
		}
		if label.len() > MAX_LABEL_LENGTH {
			bail!("domain label '{}' exceeds maximum length of {}", label, MAX_LABEL_LENGTH);
		}
		if label.starts_with('-') || label.ends_with('-') {
			bail!("domain label '{}' cannot start or end with hyphen", label);
		}
	}

	if !domain_regex().is_match(domain) {
		bail!("invalid domain format: {}", domain);
	}
	Ok(())
}

/// Validate a list of domains, returning the valid ones and warnings.
///
/// Domains are trimmed and lower-cased before the duplicate check.
pub fn validate_domains(domains: &[String]) -> (Vec<String>, Vec<String>) {
	let mut valid = Vec::with_capacity(domains.len());
	let mut warnings = Vec::new();
	let mut seen = HashSet::new();

	for domain in domains {
		let domain = domain.trim().to_lowercase();
		if domain.is_empty() {
			continue;
		}
		if !seen.insert(domain.clone()) {
			warnings.push(format!("duplicate domain ignored: {}", domain));
			continue;
		}
		if let Err(e) = validate_domain(&domain) {
			warnings.push(format!("invalid domain '{}': {}", domain, e));
			continue;
		}
		valid.push(domain);
	}

	(valid, warnings)
}

/// Read domains from a file.
///
/// `.csv` files are read with the csv reader; everything else is one
/// domain per line, skipping blank lines and lines starting with '#'.
pub fn read_domain_file(path: &str) -> Result<Vec<String>> {
	let is_csv = Path::new(path)
		.extension()
		.and_then(|e| e.to_str())
		.is_some_and(|e| e.eq_ignore_ascii_case("csv"));
	if is_csv {
		return read_domain_csv(path);
	}

	let content = std::fs::read_to_string(path)
		.with_context(|| format!("failed to read domain file '{}'", path))?;
	let domains: Vec<String> = content.lines()
		.map(|line| line.trim().to_string())
		.filter(|line| !line.is_empty() && !line.starts_with('#'))
		.collect();
	Ok(domains)
}

/// Read domains from a CSV file.
///
/// If the first row has a column named "domain" it is treated as a header
/// and that column is used; otherwise the first column of every row is.
fn read_domain_csv(path: &str) -> Result<Vec<String>> {
	let mut reader = csv::ReaderBuilder::new()
		.has_headers(false)
		.flexible(true)
		.from_path(path)
		.with_context(|| format!("failed to open domain CSV '{}'", path))?;

	let mut records = Vec::new();
	for record in reader.records() {
		records.push(record.with_context(|| format!("failed to parse domain CSV '{}'", path))?);
	}
	let Some(first) = records.first() else {
		return Ok(Vec::new());
	};

	let header_col = first.iter()
		.position(|field| field.trim().eq_ignore_ascii_case("domain"));
	let (col, skip) = match header_col {
		Some(idx) => (idx, 1),
		None => (0, 0),
	};

	Ok(records.iter()
		.skip(skip)
		.filter_map(|record| record.get(col))
		.map(str::trim)
		.filter(|domain| !domain.is_empty())
		.map(String::from)
		.collect())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn test_default_domains_size() {
		let domains = default_domains();
		assert_eq!(domains.len(), 10);
		let (valid, warnings) = validate_domains(&domains);
		assert_eq!(valid.len(), 10);
		assert!(warnings.is_empty());
	}

	#[test]
	fn test_validate_domain() {
		assert!(validate_domain("example.com").is_ok());
		assert!(validate_domain("sub.example.co.uk").is_ok());
		assert!(validate_domain("").is_err());
		assert!(validate_domain("localhost").is_err());
		assert!(validate_domain("-bad.com").is_err());
		assert!(validate_domain("bad-.com").is_err());
		assert!(validate_domain("a..com").is_err());
		assert!(validate_domain("example.c0m").is_err());
		assert!(validate_domain("under_score.com").is_err());
		let long_label = format!("{}.com", "a".repeat(64));
		assert!(validate_domain(&long_label).is_err());
	}

	#[test]
	fn test_validate_domains_dedup_case_insensitive() {
		let input: Vec<String> = vec!["Google.com", "google.com ", "", "not_valid", "example.org"]
			.into_iter().map(String::from).collect();
		let (valid, warnings) = validate_domains(&input);
		assert_eq!(valid, vec!["google.com", "example.org"]);
		assert_eq!(warnings.len(), 2);
		assert!(warnings[0].starts_with("duplicate domain ignored"));
	}

	#[test]
	fn test_read_domain_lines() {
		let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
		write!(file, "google.com\nyahoo.com\n\nexample.com\n  ").unwrap();
		let domains = read_domain_file(file.path().to_str().unwrap()).unwrap();
		assert_eq!(domains, vec!["google.com", "yahoo.com", "example.com"]);
	}

	#[test]
	fn test_read_domain_csv_with_header() {
		let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
		write!(file, "rank,domain,traffic\n1,google.com,high\n2,yahoo.com,medium\n").unwrap();
		let domains = read_domain_file(file.path().to_str().unwrap()).unwrap();
		assert_eq!(domains, vec!["google.com", "yahoo.com"]);
	}

	#[test]
	fn test_read_domain_csv_no_header() {
		let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
		write!(file, "google.com\nyahoo.com\n").unwrap();
		let domains = read_domain_file(file.path().to_str().unwrap()).unwrap();
		assert_eq!(domains, vec!["google.com", "yahoo.com"]);
	}

	#[test]
	fn test_read_domain_csv_empty() {
		let file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
		let domains = read_domain_file(file.path().to_str().unwrap()).unwrap();
		assert!(domains.is_empty());
	}

	#[test]
	fn test_read_missing_file() {
		assert!(read_domain_file("/nonexistent/domains.txt").is_err());
	}
}
