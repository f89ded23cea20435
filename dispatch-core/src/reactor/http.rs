//! Hand-rolled sync HTTP/1.1 parsing over `httparse`, the zero-copy request-line/header
//! scanner the reference pack's sync services (`reifydb`, `polkadot-sdk`) use for the
//! same purpose. A [`ConnectionBuffer`] accumulates bytes across possibly-partial reads
//! and reports once a full request (or a cap violation) is available.

use crate::error::ReactorError;
use crate::request::Method;

const MAX_HEADERS: usize = 64;

pub struct ParsedRequest {
    pub method: Method,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Per-connection accumulation buffer. Bytes arrive from possibly-many non-blocking
/// reads; `try_parse` is called again after each read until it reports `Complete`.
pub struct ConnectionBuffer {
    data: Vec<u8>,
    header_limit: usize,
    body_limit: usize,
}

pub enum ParseOutcome {
    /// Not enough bytes yet; keep reading.
    Incomplete,
    /// A full request was parsed; `consumed` bytes should be drained from the buffer.
    Complete { request: ParsedRequest, consumed: usize },
}

impl ConnectionBuffer {
    pub fn new(header_limit: usize, body_limit: usize) -> ConnectionBuffer {
        ConnectionBuffer {
            data: Vec::new(),
            header_limit,
            body_limit,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn drain(&mut self, consumed: usize) {
        self.data.drain(..consumed);
    }

    pub fn try_parse(&self) -> Result<ParseOutcome, ReactorError> {
        let mut header_buf = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut header_buf);

        let header_end = match find_header_end(&self.data) {
            Some(end) => end,
            None => {
                if self.data.len() > self.header_limit {
                    return Err(ReactorError::HeaderTooLarge { limit: self.header_limit });
                }
                return Ok(ParseOutcome::Incomplete);
            }
        };
        if header_end > self.header_limit {
            return Err(ReactorError::HeaderTooLarge { limit: self.header_limit });
        }

        let status = parsed
            .parse(&self.data[..header_end])
            .map_err(|e| ReactorError::MalformedRequest(e.to_string()))?;
        if status.is_partial() {
            return Ok(ParseOutcome::Incomplete);
        }

        let method = Method::from_str(parsed.method.unwrap_or(""));
        let uri = parsed.path.unwrap_or("/").to_string();
        let headers: Vec<(String, String)> = parsed
            .headers
            .iter()
            .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
            .collect();

        let content_length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if content_length > self.body_limit {
            return Err(ReactorError::BodyTooLarge { limit: self.body_limit });
        }

        let body_available = self.data.len().saturating_sub(header_end);
        if body_available < content_length {
            return Ok(ParseOutcome::Incomplete);
        }

        let body = self.data[header_end..header_end + content_length].to_vec();
        Ok(ParseOutcome::Complete {
            request: ParsedRequest { method, uri, headers, body },
            consumed: header_end + content_length,
        })
    }
}

fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_complete_get_request() {
        let mut buf = ConnectionBuffer::new(8192, 1024);
        buf.feed(b"GET /status HTTP/1.1\r\nHost: example\r\n\r\n");
        match buf.try_parse().unwrap() {
            ParseOutcome::Complete { request, consumed } => {
                assert_eq!(request.method, Method::Get);
                assert_eq!(request.uri, "/status");
                assert_eq!(consumed, 39);
            }
            ParseOutcome::Incomplete => panic!("expected a complete parse"),
        }
    }

    #[test]
    fn waits_for_the_body_to_fully_arrive() {
        let mut buf = ConnectionBuffer::new(8192, 1024);
        buf.feed(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhel");
        assert!(matches!(buf.try_parse().unwrap(), ParseOutcome::Incomplete));
        buf.feed(b"lo");
        match buf.try_parse().unwrap() {
            ParseOutcome::Complete { request, .. } => assert_eq!(request.body, b"hello"),
            ParseOutcome::Incomplete => panic!("expected a complete parse"),
        }
    }

    #[test]
    fn oversized_header_section_is_rejected() {
        let mut buf = ConnectionBuffer::new(16, 1024);
        buf.feed(b"GET /a-very-long-uri-that-blows-the-cap HTTP/1.1\r\n\r\n");
        assert!(matches!(buf.try_parse(), Err(ReactorError::HeaderTooLarge { limit: 16 })));
    }

    #[test]
    fn oversized_body_is_rejected() {
        let mut buf = ConnectionBuffer::new(8192, 4);
        buf.feed(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\n");
        assert!(matches!(buf.try_parse(), Err(ReactorError::BodyTooLarge { limit: 4 })));
    }
}
