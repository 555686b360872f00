use crate::error::{ParseErrorKind, Result, RtspError};

use super::headers::Headers;
use super::message::Version;
use super::request::parse_protocol_version;

/// An RTSP or HTTP response (RFC 2326 §7).
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 1\r\n
/// \r\n
/// ```
///
/// Uses a builder pattern: chain [`add_header`](Self::add_header) and
/// [`with_body`](Self::with_body). `Content-Length` is computed by the
/// serializer when a body is present.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Response {
    pub status_code: u16,
    pub reason: String,
    pub version: Version,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Response {
    /// An empty `reason` is replaced with the standard phrase for the code.
    pub fn new(status_code: u16, reason: &str) -> Self {
        let reason = if reason.is_empty() {
            status_text(status_code)
        } else {
            reason
        };
        Response {
            status_code,
            reason: reason.to_string(),
            version: Version::V1_0,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// 200 OK (RFC 2326 §7.1.1).
    pub fn ok() -> Self {
        Self::new(200, "")
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

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}

/// Standard reason phrase for an RTSP/HTTP status code.
pub fn status_text(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        200 => "OK",
        201 => "Created",
        250 => "Low on Storage Space",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Moved Temporarily",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Request Entity Too Large",
        414 => "Request-URI Too Long",
        415 => "Unsupported Media Type",
        451 => "Invalid parameter",
        452 => "Illegal Conference Identifier",
        453 => "Not Enough Bandwidth",
        454 => "Session Not Found",
        455 => "Method Not Valid In This State",
        456 => "Header Field Not Valid",
        457 => "Invalid Range",
        458 => "Parameter Is Read-Only",
        459 => "Aggregate Operation Not Allowed",
        460 => "Only Aggregate Operation Allowed",
        461 => "Unsupported Transport",
        462 => "Destination Unreachable",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Time-out",
        505 => "RTSP Version Not Supported",
        551 => "Option not supported",
        _ => "Unknown Status Code",
    }
}

/// Parsed `Version Code Reason` line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct StatusLine {
    pub version: Version,
    pub http: bool,
    pub code: u16,
    pub reason: String,
}

/// Parse a normalized status line. The reason phrase may be empty.
pub(crate) fn parse_status_line(line: &str) -> Result<StatusLine> {
    let invalid = || RtspError::parse(ParseErrorKind::InvalidStatusLine);

    let line = line.trim_start();
    let (version_tok, rest) = line.split_once(' ').ok_or_else(invalid)?;
    let (http, version) = parse_protocol_version(version_tok)?;

    let rest = rest.trim_start();
    let (code_tok, reason) = rest.split_once(' ').unwrap_or((rest, ""));
    if code_tok.is_empty() || code_tok.len() > 3 || !code_tok.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }
    let code: u16 = code_tok.parse().map_err(|_| invalid())?;
    if code >= 600 {
        return Err(invalid());
    }

    Ok(StatusLine {
        version,
        http,
        code,
        reason: reason.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ok_status() {
        let status = parse_status_line("RTSP/1.0 200 OK").unwrap();
        assert_eq!(status.code, 200);
        assert_eq!(status.reason, "OK");
        assert!(!status.http);
    }

    #[test]
    fn reason_may_contain_spaces_or_be_empty() {
        let status = parse_status_line("HTTP/1.1 404 Not Found").unwrap();
        assert_eq!(status.reason, "Not Found");
        assert!(status.http);
        let status = parse_status_line("RTSP/1.0 200").unwrap();
        assert_eq!(status.reason, "");
    }

    #[test]
    fn rejects_bad_codes() {
        assert!(parse_status_line("RTSP/1.0 600 Nope").is_err());
        assert!(parse_status_line("RTSP/1.0 2x0 OK").is_err());
        assert!(parse_status_line("RTSP/1.1 200 OK").is_err());
    }

    #[test]
    fn default_reason_phrase() {
        let resp = Response::new(454, "");
        assert_eq!(resp.reason, "Session Not Found");
        let resp = Response::ok().add_header("CSeq", "5");
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.get_header("cseq"), Some("5"));
    }
}
