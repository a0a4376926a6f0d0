//! pkt-line framing for the Git Smart-Transport protocol: 4 hex nibbles of
//! length (`length = payload + 4`) followed by the payload; `0000` flush,
//! `0001` delim, `0002` response-end. Side-band streams additionally prefix
//! each payload with a 1-byte channel tag.

pub const FLUSH_PKT: &[u8] = b"0000";
pub const DELIM_PKT: &[u8] = b"0001";
pub const RESPONSE_END_PKT: &[u8] = b"0002";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideBandChannel {
	Data = 1,
	Progress = 2,
	Fatal = 3,
}

/// Encodes `payload` as a single pkt-line (length-prefixed, no trailing
/// framing byte appended beyond what the caller passed in).
pub fn encode(payload: &[u8]) -> Vec<u8> {
	let len = payload.len() + 4;
	let mut out = format!("{len:04x}").into_bytes();
	out.extend_from_slice(payload);
	out
}

pub fn encode_str(line: &str) -> Vec<u8> {
	encode(line.as_bytes())
}

pub fn flush() -> Vec<u8> {
	FLUSH_PKT.to_vec()
}

/// Wraps `payload` in a side-band pkt-line on the given channel.
pub fn encode_side_band(channel: SideBandChannel, payload: &[u8]) -> Vec<u8> {
	let mut framed = Vec::with_capacity(payload.len() + 1);
	framed.push(channel as u8);
	framed.extend_from_slice(payload);
	encode(&framed)
}

/// A single decoded pkt-line: either a control packet or a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
	Flush,
	Delim,
	ResponseEnd,
	Data(Vec<u8>),
}

/// Parses as many complete pkt-lines as `buf` contains, returning them plus
/// the number of bytes consumed. Never blocks; the caller owns buffering for
/// partial reads from the wire.
pub fn parse_all(buf: &[u8]) -> (Vec<PktLine>, usize) {
	let mut lines = Vec::new();
	let mut pos = 0;
	while pos + 4 <= buf.len() {
		let len_hex = match std::str::from_utf8(&buf[pos..pos + 4]) {
			Ok(s) => s,
			Err(_) => break,
		};
		let len = match u32::from_str_radix(len_hex, 16) {
			Ok(n) => n as usize,
			Err(_) => break,
		};
		match len {
			0 => {
				lines.push(PktLine::Flush);
				pos += 4;
			}
			1 => {
				lines.push(PktLine::Delim);
				pos += 4;
			}
			2 => {
				lines.push(PktLine::ResponseEnd);
				pos += 4;
			}
			n if n < 4 => break,
			n => {
				if pos + n > buf.len() {
					break;
				}
				lines.push(PktLine::Data(buf[pos + 4..pos + n].to_vec()));
				pos += n;
			}
		}
	}
	(lines, pos)
}

/// The advertised capability set for both `upload-pack` and `receive-pack`,
/// per spec §4.1.1. `default_branch` feeds `symref=HEAD:refs/heads/<...>`.
pub fn capabilities(default_branch: &str, agent: &str) -> String {
	format!(
		"multi_ack thin-pack side-band side-band-64k ofs-delta shallow no-progress \
		 include-tag multi_ack_detailed no-done symref=HEAD:refs/heads/{default_branch} agent={agent}"
	)
}

/// Builds the full ref-advertisement response for `GetInfoRefs`: the
/// `"# service=<svc>\n"` header pkt-line, a flush, then the caller-supplied
/// advertisement payload (already pkt-line framed by the Git subprocess).
pub fn info_refs_response(service: &str, advertisement: &[u8]) -> Vec<u8> {
	let mut out = encode_str(&format!("# service={service}\n"));
	out.extend_from_slice(&flush());
	out.extend_from_slice(advertisement);
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encode_matches_known_example() {
		// "0032want " is 9 bytes payload + 4 = 13 = 0x0d... use spec example instead.
		let pkt = encode_str("# service=git-upload-pack\n");
		assert_eq!(&pkt[..4], b"001e");
	}

	#[test]
	fn flush_is_0000() {
		assert_eq!(flush(), b"0000");
	}

	#[test]
	fn round_trip_parse() {
		let mut buf = Vec::new();
		buf.extend(encode_str("hello"));
		buf.extend(flush());
		buf.extend(encode_str("world"));

		let (lines, consumed) = parse_all(&buf);
		assert_eq!(consumed, buf.len());
		assert_eq!(
			lines,
			vec![
				PktLine::Data(b"hello".to_vec()),
				PktLine::Flush,
				PktLine::Data(b"world".to_vec()),
			]
		);
	}

	#[test]
	fn partial_trailing_data_not_consumed() {
		let mut buf = encode_str("complete");
		buf.extend_from_slice(b"0010partial"); // claims 16 bytes but only has 11
		let (lines, consumed) = parse_all(&buf);
		assert_eq!(lines, vec![PktLine::Data(b"complete".to_vec())]);
		assert_eq!(consumed, encode_str("complete").len());
	}

	#[test]
	fn side_band_prefixes_channel_byte() {
		let pkt = encode_side_band(SideBandChannel::Progress, b"50% done");
		let (lines, _) = parse_all(&pkt);
		match &lines[0] {
			PktLine::Data(d) => {
				assert_eq!(d[0], 2);
				assert_eq!(&d[1..], b"50% done");
			}
			_ => panic!("expected data line"),
		}
	}

	#[test]
	fn info_refs_response_shape() {
		let resp = info_refs_response("git-upload-pack", b"0000");
		assert_eq!(&resp[..4], b"001e");
		assert!(resp.windows(4).any(|w| w == b"0000"));
	}

	#[test]
	fn capabilities_includes_symref_and_agent() {
		let caps = capabilities("main", "forgekeep/0.1");
		assert!(caps.contains("symref=HEAD:refs/heads/main"));
		assert!(caps.contains("agent=forgekeep/0.1"));
		assert!(caps.contains("side-band-64k"));
	}
}
