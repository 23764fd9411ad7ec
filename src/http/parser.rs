use crate::http::request::{Method, ParsedRequest};
use thiserror::Error;

/// Longest URL kept from a request line. Longer URLs are cut silently.
pub const MAX_URL_LEN: usize = 255;

/// Request line prefix of the broadcast service.
pub const BROADCAST_PREFIX: &[u8] = b"POST /broadcast.service";

const GET_PREFIX: &[u8] = b"GET ";
const CONTENT_LENGTH_PREFIX: &[u8] = b"Content-Length: ";
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("header block is not terminated yet")]
    Incomplete,
    #[error("GET line has no space after the url")]
    MalformedRequestLine,
    #[error("Content-Length header is not a number")]
    InvalidContentLength,
    #[error("neither a GET nor a broadcast POST request")]
    UnsupportedRequest,
}

/// Parses the first header block of `buf`.
///
/// Only bytes up to the first empty line are looked at, so the result is
/// the same however the block was split across reads.
pub fn parse_request(buf: &[u8]) -> Result<ParsedRequest, ParseError> {
    let headers_end = find_headers_end(buf).ok_or(ParseError::Incomplete)?;
    let header_bytes = &buf[..headers_end];

    let mut method = None;
    let mut url = String::new();
    let mut content_length = None;

    for line in header_bytes
        .split(|b| *b == b'\r' || *b == b'\n')
        .filter(|line| !line.is_empty())
    {
        if method.is_none() {
            if let Some(rest) = line.strip_prefix(GET_PREFIX) {
                let url_end = rest
                    .iter()
                    .position(|b| *b == b' ')
                    .ok_or(ParseError::MalformedRequestLine)?;
                let url_len = url_end.min(MAX_URL_LEN);
                url = String::from_utf8_lossy(&rest[..url_len]).into_owned();
                method = Some(Method::GET);
                continue;
            }
            if line.starts_with(BROADCAST_PREFIX) {
                method = Some(Method::POST);
                continue;
            }
        }

        if let Some(value) = line.strip_prefix(CONTENT_LENGTH_PREFIX) {
            let value = std::str::from_utf8(value)
                .map_err(|_| ParseError::InvalidContentLength)?;
            let parsed = value
                .trim()
                .parse::<usize>()
                .map_err(|_| ParseError::InvalidContentLength)?;
            content_length = Some(parsed);
        }
    }

    let method = method.ok_or(ParseError::UnsupportedRequest)?;

    Ok(ParsedRequest {
        method,
        url,
        content_length: if method == Method::POST {
            content_length
        } else {
            None
        },
        body_offset: headers_end + HEADER_TERMINATOR.len(),
    })
}

/// Position of the first `\r\n\r\n` in `buf`.
pub fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let req = b"GET /index.html HTTP/1.0\r\nHost: example.com\r\n\r\n";

        let parsed = parse_request(req).unwrap();

        assert_eq!(parsed.method, Method::GET);
        assert_eq!(parsed.url, "/index.html");
        assert_eq!(parsed.body_offset, req.len());
    }

    #[test]
    fn content_length_is_ignored_on_get() {
        let req = b"GET / HTTP/1.0\r\nContent-Length: 4\r\n\r\nbody";

        let parsed = parse_request(req).unwrap();

        assert_eq!(parsed.content_length, None);
    }
}
