use std::time::SystemTime;

const HTTP_VERSION: &str = "HTTP/1.0";

/// HTTP status codes the server answers with.
///
/// - `Ok` (200): document or broadcast log follows
/// - `NotFound` (404): the canned error document follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 404 Not Found
    NotFound,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use herald::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::NotFound => 404,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::NotFound => "Not Found",
        }
    }
}

/// Serializes the header block sent ahead of a body.
///
/// Successful answers carry a `Date` header; not-found answers carry only
/// the status line. The block always ends with an empty line.
pub fn header_block(status: StatusCode, now: SystemTime) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);

    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        status.as_u16(),
        status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    if status == StatusCode::Ok {
        buf.extend_from_slice(b"Date: ");
        buf.extend_from_slice(httpdate::fmt_http_date(now).as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf
}
