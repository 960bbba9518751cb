use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use url::Url;

/// Default port for plain DNS
pub const DNS_PORT: u16 = 53;
/// Default port for DNS-over-TLS
pub const DOT_PORT: u16 = 853;

const MAX_HOST_LENGTH: usize = 253;

/// Well-known public resolvers used when no server file is given
pub const DEFAULT_SERVERS: &[&str] = &[
	"8.8.8.8",                      // Google (UDP)
	"1.1.1.1",                      // Cloudflare (UDP)
	"tls://1.1.1.1",                // Cloudflare (DoT)
	"https://dns.google/dns-query", // Google (DoH)
	"9.9.9.9",                      // Quad9 (UDP)
];

/// A parsed server identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSpec {
	/// Plain DNS over UDP
	Udp { host: String, port: u16 },
	/// DNS-over-TLS (RFC 7858)
	Tls { host: String, port: u16 },
	/// DNS-over-HTTPS (RFC 8484)
	Https(Url),
}

impl ServerSpec {
	/// "host:port" suitable for connecting, with IPv6 hosts bracketed.
	pub fn socket_target(&self) -> Option<String> {
		match self {
			ServerSpec::Udp { host, port } | ServerSpec::Tls { host, port } => {
				Some(join_host_port(host, *port))
			}
			ServerSpec::Https(_) => None,
		}
	}
}

impl fmt::Display for ServerSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ServerSpec::Udp { host, port } => write!(f, "udp://{}", join_host_port(host, *port)),
			ServerSpec::Tls { host, port } => write!(f, "tls://{}", join_host_port(host, *port)),
			ServerSpec::Https(url) => write!(f, "{}", url),
		}
	}
}

fn join_host_port(host: &str, port: u16) -> String {
	if host.contains(':') {
		format!("[{}]:{}", host, port)
	} else {
		format!("{}:{}", host, port)
	}
}

/// Parse a server identifier into a ServerSpec.
///
/// Supports formats:
///   "https://dns.google/dns-query" -- DoH endpoint
///   "tls://1.1.1.1"                -- DoT, default port 853
///   "tls://dns.quad9.net:8853"     -- DoT with explicit port
///   "8.8.8.8" / "8.8.8.8:5353"     -- UDP, default port 53
///   "2606:4700::1111"              -- bare IPv6, default port 53
///   "[2606:4700::1111]:53"         -- bracketed IPv6 with port
pub fn parse_server(input: &str) -> Result<ServerSpec> {
	let trimmed = input.trim();
	if trimmed.is_empty() {
		bail!("server cannot be empty");
	}

	if trimmed.starts_with("https://") {
		let url = Url::parse(trimmed)
			.map_err(|e| anyhow!("invalid DoH URL '{}': {}", trimmed, e))?;
		if url.scheme() != "https" {
			bail!("DoH URL must use https scheme");
		}
		if url.host_str().map_or(true, str::is_empty) {
			bail!("DoH URL must have a host");
		}
		return Ok(ServerSpec::Https(url));
	}

	if let Some(rest) = trimmed.strip_prefix("tls://") {
		let (host, port) = parse_host_port(rest, DOT_PORT)?;
		return Ok(ServerSpec::Tls { host, port });
	}

	let (host, port) = parse_host_port(trimmed, DNS_PORT)?;
	Ok(ServerSpec::Udp { host, port })
}

/// Split "host[:port]" and validate both parts.
fn parse_host_port(input: &str, default_port: u16) -> Result<(String, u16)> {
	let (host, port) = if let Some(rest) = input.strip_prefix('[') {
		// Bracketed IPv6, optional port: [::1]:53
		let (host, tail) = rest.split_once(']')
			.ok_or_else(|| anyhow!("unterminated IPv6 bracket in '{}'", input))?;
		let port = match tail.strip_prefix(':') {
			Some(p) => parse_port(p)?,
			None if tail.is_empty() => default_port,
			None => bail!("unexpected characters after IPv6 address in '{}'", input),
		};
		if host.parse::<IpAddr>().is_err() {
			bail!("invalid IPv6 address '{}'", host);
		}
		(host.to_string(), port)
	} else if input.parse::<IpAddr>().is_ok() {
		// Bare IPv4 or IPv6 without port
		(input.to_string(), default_port)
	} else if let Some((host, port)) = input.rsplit_once(':') {
		if host.contains(':') {
			bail!("invalid address '{}'", input);
		}
		(host.to_string(), parse_port(port)?)
	} else {
		(input.to_string(), default_port)
	};

	if host.parse::<IpAddr>().is_err() {
		validate_hostname(&host)?;
	}
	Ok((host, port))
}

fn parse_port(input: &str) -> Result<u16> {
	match input.parse::<u16>() {
		Ok(port) if port > 0 => Ok(port),
		_ => Err(anyhow!("invalid port: {}", input)),
	}
}

fn validate_hostname(host: &str) -> Result<()> {
	if host.is_empty() {
		bail!("host cannot be empty");
	}
	if host.len() > MAX_HOST_LENGTH {
		bail!("host exceeds maximum length");
	}
	let valid_chars = host.chars()
		.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
	if !valid_chars {
		bail!("invalid host '{}'", host);
	}
	Ok(())
}

/// Validate a list of servers, returning the valid ones and warnings.
///
/// Entries are trimmed; blanks are skipped silently, duplicates and
/// invalid entries produce a warning. Order of first occurrence is kept.
pub fn validate_servers(servers: &[String]) -> (Vec<String>, Vec<String>) {
	let mut valid = Vec::with_capacity(servers.len());
	let mut warnings = Vec::new();
	let mut seen = HashSet::new();

	for server in servers {
		let server = server.trim();
		if server.is_empty() {
			continue;
		}
		if !seen.insert(server.to_string()) {
			warnings.push(format!("duplicate server ignored: {}", server));
			continue;
		}
		if let Err(e) = parse_server(server) {
			warnings.push(format!("invalid server '{}': {}", server, e));
			continue;
		}
		valid.push(server.to_string());
	}

	(valid, warnings)
}

/// Shape of a YAML server file
#[derive(Debug, Deserialize)]
struct ServerFile {
	#[serde(default)]
	servers: Vec<String>,
}

/// Read server identifiers from a file.
///
/// `.yaml` / `.yml` files hold a `servers:` list; anything else is read
/// one server per line, skipping blank lines and lines starting with '#'.
pub fn read_server_file(path: &str) -> Result<Vec<String>> {
	let content = std::fs::read_to_string(path)
		.with_context(|| format!("failed to read server file '{}'", path))?;

	let ext = Path::new(path)
		.extension()
		.and_then(|e| e.to_str())
		.map(str::to_ascii_lowercase);
	if matches!(ext.as_deref(), Some("yaml") | Some("yml")) {
		let parsed: ServerFile = serde_yaml::from_str(&content)
			.with_context(|| format!("failed to parse YAML server file '{}'", path))?;
		return Ok(parsed.servers);
	}

	Ok(content.lines()
		.map(str::trim)
		.filter(|line| !line.is_empty() && !line.starts_with('#'))
		.map(String::from)
		.collect())
}

/// Return the built-in server table.
pub fn default_servers() -> Vec<String> {
	DEFAULT_SERVERS.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn test_ipv4_no_port() {
		let s = parse_server("1.1.1.1").unwrap();
		assert_eq!(s, ServerSpec::Udp { host: "1.1.1.1".into(), port: 53 });
	}

	#[test]
	fn test_ipv4_with_port() {
		let s = parse_server("8.8.8.8:5353").unwrap();
		assert_eq!(s, ServerSpec::Udp { host: "8.8.8.8".into(), port: 5353 });
	}

	#[test]
	fn test_ipv6_bare() {
		let s = parse_server("2606:4700::1111").unwrap();
		assert_eq!(s.socket_target().unwrap(), "[2606:4700::1111]:53");
	}

	#[test]
	fn test_ipv6_bracketed() {
		let s = parse_server("[2606:4700::1111]:5353").unwrap();
		assert_eq!(s, ServerSpec::Udp { host: "2606:4700::1111".into(), port: 5353 });
	}

	#[test]
	fn test_tls_default_port() {
		let s = parse_server("tls://1.1.1.1").unwrap();
		assert_eq!(s, ServerSpec::Tls { host: "1.1.1.1".into(), port: 853 });
		let s = parse_server("tls://dns.quad9.net:8853").unwrap();
		assert_eq!(s, ServerSpec::Tls { host: "dns.quad9.net".into(), port: 8853 });
	}

	#[test]
	fn test_https() {
		let s = parse_server("https://dns.google/dns-query").unwrap();
		match s {
			ServerSpec::Https(url) => assert_eq!(url.host_str(), Some("dns.google")),
			other => panic!("expected https, got {:?}", other),
		}
	}

	#[test]
	fn test_invalid_input() {
		assert!(parse_server("").is_err());
		assert!(parse_server("8.8.8.8:0").is_err());
		assert!(parse_server("8.8.8.8:99999").is_err());
		assert!(parse_server("tls://").is_err());
		assert!(parse_server("bad host!").is_err());
		assert!(parse_server("https://").is_err());
	}

	#[test]
	fn test_validate_servers() {
		let input: Vec<String> = vec![
			"8.8.8.8", " 8.8.8.8 ", "", "tls://1.1.1.1", "bad host!", "https://dns.google/dns-query",
		].into_iter().map(String::from).collect();
		let (valid, warnings) = validate_servers(&input);
		assert_eq!(valid, vec!["8.8.8.8", "tls://1.1.1.1", "https://dns.google/dns-query"]);
		assert_eq!(warnings.len(), 2);
		assert!(warnings[0].contains("duplicate"));
		assert!(warnings[1].contains("invalid server"));
	}

	#[test]
	fn test_read_server_file_lines() {
		let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
		writeln!(file, "# resolvers\n8.8.8.8\n\n tls://1.1.1.1 ").unwrap();
		let servers = read_server_file(file.path().to_str().unwrap()).unwrap();
		assert_eq!(servers, vec!["8.8.8.8", "tls://1.1.1.1"]);
	}

	#[test]
	fn test_read_server_file_yaml() {
		let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
		write!(file, "servers:\n  - 8.8.8.8\n  - tls://1.1.1.1\n  - https://dns.google/dns-query\n").unwrap();
		let servers = read_server_file(file.path().to_str().unwrap()).unwrap();
		assert_eq!(servers.len(), 3);
		assert_eq!(servers[2], "https://dns.google/dns-query");
	}

	#[test]
	fn test_read_server_file_bad_yaml() {
		let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
		write!(file, "servers: [unclosed").unwrap();
		assert!(read_server_file(file.path().to_str().unwrap()).is_err());
	}

	#[test]
	fn test_defaults_valid() {
		let defaults = default_servers();
		assert_eq!(defaults.len(), 5);
		let (valid, warnings) = validate_servers(&defaults);
		assert_eq!(valid.len(), 5);
		assert!(warnings.is_empty());
	}
}
