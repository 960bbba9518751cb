use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio_rustls::TlsConnector;
use tracing::debug;
use url::Url;

use crate::dns::{build_query, frame_stream, parse_response};
use crate::resolver::{parse_server, ServerSpec};

const DNS_MESSAGE_MIME: &str = "application/dns-message";
/// Replies with a foreign txid are skipped this many times before giving up
const MAX_UDP_RECV_ATTEMPTS: usize = 3;

/// Why a single probe failed
#[derive(Debug, Error)]
pub enum ProbeError {
	#[error("timeout after {0:?}")]
	Timeout(Duration),

	#[error("invalid server: {0}")]
	InvalidServer(String),

	#[error("i/o error: {0}")]
	Io(#[from] io::Error),

	#[error("tls error: {0}")]
	Tls(String),

	#[error("http error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("DoH error: {status}: {body}")]
	HttpStatus { status: StatusCode, body: String },

	#[error("protocol error: {0}")]
	Protocol(String),
}

/// Elapsed time and outcome of one query attempt
#[derive(Debug)]
pub struct ProbeResult {
	pub elapsed: Duration,
	pub outcome: Result<(), ProbeError>,
}

/// One timed query attempt against a resolver.
///
/// Implementations are shared by every worker and called concurrently,
/// and must return within `timeout`.
#[async_trait]
pub trait Probe: Send + Sync {
	async fn probe(&self, server: &str, domain: &str, timeout: Duration) -> ProbeResult;
}

/// Real DNS transport for UDP, DNS-over-TLS and DNS-over-HTTPS.
///
/// The HTTPS client and TLS connector are built once up front and shared
/// by all workers.
pub struct DnsProbe {
	http: reqwest::Client,
	tls: TlsConnector,
}

impl DnsProbe {
	pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
		let http = reqwest::Client::builder()
			.use_rustls_tls()
			.timeout(timeout)
			.build()?;

		let roots = RootCertStore {
			roots: webpki_roots::TLS_SERVER_ROOTS.into(),
		};
		let provider = Arc::new(rustls::crypto::ring::default_provider());
		let tls_config = ClientConfig::builder_with_provider(provider)
			.with_safe_default_protocol_versions()
			.map_err(|e| ProbeError::Tls(e.to_string()))?
			.with_root_certificates(roots)
			.with_no_client_auth();

		Ok(DnsProbe {
			http,
			tls: TlsConnector::from(Arc::new(tls_config)),
		})
	}

	async fn exchange(&self, server: &str, domain: &str) -> Result<(), ProbeError> {
		let spec = parse_server(server)
			.map_err(|e| ProbeError::InvalidServer(e.to_string()))?;

		let rcode = match &spec {
			ServerSpec::Https(url) => self.exchange_https(url.clone(), domain).await,
			ServerSpec::Tls { host, .. } => {
				let target = resolve(&spec).await?;
				self.exchange_tls(host, target, domain).await
			}
			ServerSpec::Udp { .. } => {
				let target = resolve(&spec).await?;
				exchange_udp(target, domain).await
			}
		}?;
		debug!(server, domain, rcode = ?rcode, "reply received");
		Ok(())
	}

	async fn exchange_tls(
		&self,
		host: &str,
		target: SocketAddr,
		domain: &str,
	) -> Result<ResponseCode, ProbeError> {
		let txid: u16 = rand::random();
		let query = frame_stream(&build_query(domain, txid)?)?;

		let server_name = ServerName::try_from(host)
			.map_err(|e| ProbeError::Tls(format!("invalid server name '{}': {}", host, e)))?
			.to_owned();
		let tcp = TcpStream::connect(target).await?;
		tcp.set_nodelay(true)?;
		let mut stream = self.tls.connect(server_name, tcp).await?;

		stream.write_all(&query).await?;
		stream.flush().await?;

		let mut len_buf = [0u8; 2];
		stream.read_exact(&mut len_buf).await?;
		let mut reply = vec![0u8; u16::from_be_bytes(len_buf) as usize];
		stream.read_exact(&mut reply).await?;

		parse_response(&reply, txid)
	}

	async fn exchange_https(&self, url: Url, domain: &str) -> Result<ResponseCode, ProbeError> {
		// RFC 8484 4.1: DoH clients use id 0 so replies stay cache friendly
		let query = build_query(domain, 0)?;

		let response = self.http
			.post(url)
			.header(CONTENT_TYPE, DNS_MESSAGE_MIME)
			.header(ACCEPT, DNS_MESSAGE_MIME)
			.body(query)
			.send()
			.await?;

		let status = response.status();
		if status != StatusCode::OK {
			let body = response.text().await.unwrap_or_default();
			return Err(ProbeError::HttpStatus { status, body });
		}

		let body = response.bytes().await?;
		parse_response(&body, 0)
	}
}

#[async_trait]
impl Probe for DnsProbe {
	async fn probe(&self, server: &str, domain: &str, timeout: Duration) -> ProbeResult {
		let start = Instant::now();
		let outcome = match tokio::time::timeout(timeout, self.exchange(server, domain)).await {
			Ok(outcome) => outcome,
			Err(_) => Err(ProbeError::Timeout(timeout)),
		};
		ProbeResult {
			elapsed: start.elapsed(),
			outcome,
		}
	}
}

/// Resolve a UDP or TLS server spec to a socket address.
async fn resolve(spec: &ServerSpec) -> Result<SocketAddr, ProbeError> {
	let target = spec.socket_target()
		.ok_or_else(|| ProbeError::InvalidServer(spec.to_string()))?;
	let addr = tokio::net::lookup_host(target.as_str()).await?.next();
	addr.ok_or_else(|| ProbeError::InvalidServer(format!("no address for '{}'", target)))
}

/// Send a single query over UDP and wait for the matching reply.
///
/// Uses a dedicated connected socket per query so concurrent workers never
/// read each other's replies.
async fn exchange_udp(target: SocketAddr, domain: &str) -> Result<ResponseCode, ProbeError> {
	let txid: u16 = rand::random();
	let query = build_query(domain, txid)?;

	let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
	let socket = UdpSocket::bind(bind_addr).await?;
	socket.connect(target).await?;
	socket.send(&query).await?;

	// 4096 bytes covers EDNS-sized replies
	let mut buf = vec![0u8; 4096];
	let mut last_err = None;
	for _ in 0..MAX_UDP_RECV_ATTEMPTS {
		let len = socket.recv(&mut buf).await?;
		match parse_response(&buf[..len], txid) {
			Ok(rcode) => return Ok(rcode),
			Err(e) => last_err = Some(e),
		}
	}
	Err(last_err.unwrap_or_else(|| ProbeError::Protocol("no valid reply".to_string())))
}
