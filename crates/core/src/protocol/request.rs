use crate::error::{ParseErrorKind, Result, RtspError};

use super::headers::{Headers, names};
use super::message::{Method, Version};

/// An RTSP or HTTP request (RFC 2326 §6).
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// The same type backs both [`Message::Request`](super::Message::Request)
/// and [`Message::HttpRequest`](super::Message::HttpRequest); the
/// enclosing variant decides which protocol token is written.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Request {
    pub method: Method,
    /// Request-URI (e.g. `rtsp://host:port/stream/track1`).
    pub uri: String,
    pub version: Version,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: Method, uri: &str) -> Self {
        Request {
            method,
            uri: uri.to_string(),
            version: Version::V1_0,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns the CSeq header value (RFC 2326 §12.17).
    pub fn cseq(&self) -> Option<&str> {
        self.get_header(names::CSEQ)
    }
}

/// Parsed `Method URI Version` line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct RequestLine {
    pub method: Method,
    pub uri: String,
    pub version: Version,
    pub http: bool,
}

/// Parse a normalized request line.
///
/// HTTP requests may only use GET or POST; RTSP requests may use anything
/// except those two.
pub(crate) fn parse_request_line(line: &str) -> Result<RequestLine> {
    let parts: Vec<&str> = line.split_ascii_whitespace().collect();

    if parts.len() != 3 {
        return Err(RtspError::parse(ParseErrorKind::InvalidRequestLine));
    }

    let method =
        Method::from_token(parts[0]).ok_or(RtspError::parse(ParseErrorKind::InvalidMethod))?;
    let (http, version) = parse_protocol_version(parts[2])?;

    if method.is_http() != http {
        tracing::debug!(method = %method, http, "method not valid for protocol");
        return Err(RtspError::parse(ParseErrorKind::InvalidMethod));
    }

    Ok(RequestLine {
        method,
        uri: parts[1].to_string(),
        version,
        http,
    })
}

/// Parse `RTSP/x.y` or `HTTP/x.y`. Returns whether the token named HTTP.
pub(crate) fn parse_protocol_version(token: &str) -> Result<(bool, Version)> {
    let invalid = || RtspError::parse(ParseErrorKind::InvalidVersion);

    let (proto, ver) = token.split_once('/').ok_or_else(invalid)?;
    let http = if proto.eq_ignore_ascii_case("RTSP") {
        false
    } else if proto.eq_ignore_ascii_case("HTTP") {
        true
    } else {
        return Err(invalid());
    };

    let version = match (http, ver) {
        (_, "1.0") => Version::V1_0,
        (true, "1.1") => Version::V1_1,
        (_, "2.0") => Version::V2_0,
        _ => return Err(invalid()),
    };
    Ok((http, version))
}
