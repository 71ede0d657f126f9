//! Line framing for the daemon protocol.
//!
//! A message is a block of `Key: value` header lines terminated by one empty
//! line. A `Length` header announces that many payload bytes immediately
//! after the blank line. Header text is ASCII; payload bytes are opaque.

use std::str;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("malformed header line in daemon message")]
    MalformedHeader,
    #[error("daemon message header is not valid UTF-8")]
    Encoding,
    #[error("daemon message carries an unparsable Length header")]
    BadLength,
}

/// One parsed inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    headers: Vec<(String, String)>,
    pub payload: Vec<u8>,
}

impl Message {
    /// First value of the header `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The request id this message answers.
    pub fn response_to(&self) -> Option<u64> {
        self.get("In response to")?.parse().ok()
    }
}

/// Serialise a request. A payload implies a `Length` header; the caller
/// never writes one itself.
pub fn render(headers: &[(&str, &str)], payload: Option<&[u8]>, out: &mut Vec<u8>) {
    for (key, value) in headers {
        out.extend_from_slice(key.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.push(b'\n');
    }
    if let Some(payload) = payload {
        out.extend_from_slice(format!("Length: {}\n", payload.len()).as_bytes());
    }
    out.push(b'\n');
    if let Some(payload) = payload {
        out.extend_from_slice(payload);
    }
}

/// Try to parse one complete message from the front of `buf`.
///
/// Returns the message and the number of bytes it consumed, or `None` when
/// the buffer does not yet hold a full message.
pub fn try_parse(buf: &[u8]) -> Result<Option<(Message, usize)>, WireError> {
    // Look for the blank line ending the header block.
    let mut header_end = None;
    for i in 0..buf.len() {
        if buf[i] == b'\n' && (i == 0 || buf[i - 1] == b'\n') {
            header_end = Some(i + 1);
            break;
        }
    }
    let Some(header_end) = header_end else {
        return Ok(None);
    };

    let text = str::from_utf8(&buf[..header_end]).map_err(|_| WireError::Encoding)?;
    let mut headers = Vec::new();
    let mut length = 0usize;
    for line in text.lines() {
        if line.is_empty() {
            break;
        }
        let (key, value) = line.split_once(": ").ok_or(WireError::MalformedHeader)?;
        if key == "Length" {
            length = value.parse().map_err(|_| WireError::BadLength)?;
        }
        headers.push((key.to_owned(), value.to_owned()));
    }

    if buf.len() < header_end + length {
        return Ok(None);
    }
    let payload = buf[header_end..header_end + length].to_vec();
    Ok(Some((Message { headers, payload }, header_end + length)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn render_then_parse_round_trips() {
        let mut out = Vec::new();
        render(
            &[("Command", "set-gamma"), ("Message ID", "7")],
            Some(b"abc"),
            &mut out,
        );
        let (msg, consumed) = try_parse(&out).unwrap().unwrap();
        assert_eq!(consumed, out.len());
        assert_eq!(msg.get("Command"), Some("set-gamma"));
        assert_eq!(msg.get("Message ID"), Some("7"));
        assert_eq!(msg.payload, b"abc");
    }

    #[test]
    fn incomplete_header_block_waits() {
        assert_eq!(try_parse(b"Command: set-gamma\n").unwrap(), None);
    }

    #[test]
    fn incomplete_payload_waits() {
        let mut out = Vec::new();
        render(&[("In response to", "3")], Some(&[0u8; 16]), &mut out);
        assert_eq!(try_parse(&out[..out.len() - 1]).unwrap(), None);
        assert!(try_parse(&out).unwrap().is_some());
    }

    #[test]
    fn consumes_exactly_one_message() {
        let mut out = Vec::new();
        render(&[("In response to", "1")], None, &mut out);
        let first_len = out.len();
        render(&[("In response to", "2")], None, &mut out);
        let (msg, consumed) = try_parse(&out).unwrap().unwrap();
        assert_eq!(consumed, first_len);
        assert_eq!(msg.response_to(), Some(1));
        let (msg, _) = try_parse(&out[consumed..]).unwrap().unwrap();
        assert_eq!(msg.response_to(), Some(2));
    }

    #[test]
    fn malformed_header_is_an_error() {
        assert_eq!(
            try_parse(b"no colon here\n\n").unwrap_err(),
            WireError::MalformedHeader
        );
    }

    #[test]
    fn first_header_wins_on_duplicates() {
        let mut out = Vec::new();
        render(&[("CRTC", "a"), ("CRTC", "b")], None, &mut out);
        let (msg, _) = try_parse(&out).unwrap().unwrap();
        assert_eq!(msg.get("CRTC"), Some("a"));
    }
}
