//! Wire protocol: a small subset of HTTP/1.0.
//!
//! - **`parser`**: turns a raw header block into a [`request::ParsedRequest`]
//! - **`request`**: the parsed request
//! - **`response`**: status codes and the header block written ahead of a body
//!
//! Requests come in two shapes:
//!
//! ```text
//! GET /path/to/doc HTTP/1.0\r\n          POST /broadcast.service HTTP/1.0\r\n
//! ...\r\n                                 Content-Length: <n>\r\n
//! \r\n                                    \r\n
//!                                         <n bytes of message>
//! ```
//!
//! Every answer is a status line, an optional `Date` header, an empty line,
//! and the raw bytes of a file. The connection closes after the body.

pub mod parser;
pub mod request;
pub mod response;
