use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::{Name, RecordType};

use crate::probe::ProbeError;

/// Build a recursive A query for the given domain.
///
/// Returns the serialized query bytes ready to send on the wire.
pub fn build_query(domain: &str, txid: u16) -> Result<Vec<u8>, ProbeError> {
	let name = Name::from_ascii(domain)
		.map_err(|e| ProbeError::Protocol(format!("invalid domain name '{}': {}", domain, e)))?;

	let mut message = Message::new();
	message.set_id(txid);
	message.set_recursion_desired(true);
	message.add_query(Query::query(name, RecordType::A));

	message.to_vec()
		.map_err(|e| ProbeError::Protocol(format!("failed to serialize DNS query: {}", e)))
}

/// Parse a DNS response, validating the transaction ID.
///
/// Any well-formed reply counts, whatever its rcode; NXDOMAIN is still an
/// answer from the resolver. The rcode is returned for diagnostics.
pub fn parse_response(bytes: &[u8], expected_txid: u16) -> Result<ResponseCode, ProbeError> {
	let message = Message::from_vec(bytes)
		.map_err(|e| ProbeError::Protocol(format!("failed to parse DNS response: {}", e)))?;

	if message.id() != expected_txid {
		return Err(ProbeError::Protocol(format!(
			"txid mismatch: expected {}, got {}",
			expected_txid, message.id()
		)));
	}

	if message.message_type() != MessageType::Response {
		return Err(ProbeError::Protocol("received a query instead of a response".to_string()));
	}

	Ok(message.response_code())
}

/// Prefix a message with its two-byte length for stream transports (RFC 1035 4.2.2).
pub fn frame_stream(message: &[u8]) -> Result<Vec<u8>, ProbeError> {
	let len = u16::try_from(message.len())
		.map_err(|_| ProbeError::Protocol("DNS message too large for stream framing".to_string()))?;
	let mut framed = Vec::with_capacity(message.len() + 2);
	framed.extend_from_slice(&len.to_be_bytes());
	framed.extend_from_slice(message);
	Ok(framed)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn response_for(query: &[u8]) -> Vec<u8> {
		let mut response = Message::from_vec(query).unwrap();
		response.set_message_type(MessageType::Response);
		response.to_vec().unwrap()
	}

	#[test]
	fn test_build_a_query() {
		let bytes = build_query("example.com", 1234).unwrap();
		// DNS header is 12 bytes minimum
		assert!(bytes.len() >= 12);
		assert_eq!(bytes[0], (1234 >> 8) as u8);
		assert_eq!(bytes[1], (1234 & 0xff) as u8);

		let message = Message::from_vec(&bytes).unwrap();
		assert!(message.recursion_desired());
		assert_eq!(message.queries()[0].query_type(), RecordType::A);
	}

	#[test]
	fn test_build_invalid_name() {
		let long_label = format!("{}.com", "a".repeat(70));
		assert!(build_query(&long_label, 1).is_err());
	}

	#[test]
	fn test_parse_valid_response() {
		let query = build_query("example.com", 9999).unwrap();
		let rcode = parse_response(&response_for(&query), 9999).unwrap();
		assert_eq!(rcode, ResponseCode::NoError);
	}

	#[test]
	fn test_nxdomain_is_still_an_answer() {
		let query = build_query("does-not-exist.example", 7).unwrap();
		let mut response = Message::from_vec(&query).unwrap();
		response.set_message_type(MessageType::Response);
		response.set_response_code(ResponseCode::NXDomain);
		let rcode = parse_response(&response.to_vec().unwrap(), 7).unwrap();
		assert_eq!(rcode, ResponseCode::NXDomain);
	}

	#[test]
	fn test_txid_mismatch() {
		let query = build_query("example.com", 1111).unwrap();
		let err = parse_response(&response_for(&query), 2222).unwrap_err();
		assert!(err.to_string().contains("txid mismatch"));
	}

	#[test]
	fn test_query_is_not_response() {
		let query = build_query("example.com", 42).unwrap();
		assert!(parse_response(&query, 42).is_err());
	}

	#[test]
	fn test_truncated_buffer() {
		let bytes = vec![0u8; 5];
		assert!(parse_response(&bytes, 0).is_err());
	}

	#[test]
	fn test_frame_stream() {
		let framed = frame_stream(&[1, 2, 3]).unwrap();
		assert_eq!(framed, vec![0, 3, 1, 2, 3]);
	}
}
