/// Request methods understood by the server.
///
/// Only two request shapes exist on the wire: a `GET` for a document, and a
/// `POST` to the broadcast service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a document
    GET,
    /// POST - Subscribe to, or publish on, the broadcast service
    POST,
}

/// A request header block, reduced to what the connection needs.
///
/// Produced by [`crate::http::parser::parse_request`] and consumed right
/// away by the connection that read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    /// The request method
    pub method: Method,
    /// The requested URL, empty for broadcast posts
    pub url: String,
    /// Value of the `Content-Length` header, only looked for on posts
    pub content_length: Option<usize>,
    /// Offset in the raw buffer where the body begins
    pub body_offset: usize,
}

impl ParsedRequest {
    pub fn is_post(&self) -> bool {
        self.method == Method::POST
    }
}
