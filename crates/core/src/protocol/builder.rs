//! Incremental message parser.
//!
//! ```text
//!            '$'                       len bytes
//!  START ─────────► DATA_HEADER ──► DATA_BODY ──────────► END
//!    │  ▲ CR/LF                          ▲
//!    │  └──┘                             │ Content-Length > 0
//!    └─── other ──► READ_LINES ──────────┴──── blank line ──► END
//! ```
//!
//! The builder pulls bytes from a [`ByteSource`]. When the source runs dry
//! it returns [`RtspError::WouldBlock`] and keeps every partial result, so
//! the next call resumes exactly where the previous one stopped. This
//! holds for arbitrarily small chunks, down to one byte per call.
//!
//! A malformed start line or header does not abort the message: the first
//! such error is recorded and the builder keeps consuming until the end of
//! the message so the stream stays in sync. Only a bad or oversized
//! Content-Length ends the message early, since the body boundary is then
//! unknown.

use crate::error::{ParseErrorKind, Result, RtspError};

use super::headers::{Headers, allows_multiple, names};
use super::line::{ByteSource, LineReader, normalize_line};
use super::message::{DataFrame, Message, Method};
use super::request::{Request, RequestLine, parse_request_line};
use super::response::{Response, StatusLine, parse_status_line};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum State {
    #[default]
    Start,
    DataHeader,
    DataBody,
    ReadLines,
    End,
}

#[derive(Debug)]
enum StartLine {
    Request(RequestLine),
    Status(StatusLine),
    Data(u8),
}

/// A message that reached the END state.
///
/// `status` carries the first parse error seen while reading it. `message`
/// is `None` only when the start line itself could not be parsed.
#[derive(Debug)]
pub struct Completed {
    pub message: Option<Message>,
    pub status: Result<()>,
}

impl Completed {
    pub fn into_result(self) -> Result<Message> {
        self.status?;
        self.message
            .ok_or(RtspError::parse(ParseErrorKind::InvalidRequestLine))
    }
}

/// Body bytes allocated ahead of the data actually received.
const BODY_CHUNK: usize = 64 * 1024;

/// Byte-stream to [`Message`] state machine. One instance holds exactly
/// one in-flight message and resets itself when it completes.
#[derive(Debug, Default)]
pub struct Builder {
    state: State,
    line_reader: LineReader,
    line: Vec<u8>,
    line_count: usize,
    data_header: [u8; 3],
    data_filled: usize,
    start: Option<StartLine>,
    headers: Headers,
    body: Vec<u8>,
    body_filled: usize,
    /// Declared body length; `body` grows towards it as bytes arrive.
    body_len: usize,
    status: Option<RtspError>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard any partially parsed message.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether no byte of a new message has been consumed yet.
    pub fn is_idle(&self) -> bool {
        self.state == State::Start
    }

    /// Advance the state machine.
    ///
    /// `content_length_limit` caps the accepted body size. Errors other
    /// than [`RtspError::WouldBlock`] leave the builder reset.
    pub fn build<S: ByteSource + ?Sized>(
        &mut self,
        src: &mut S,
        content_length_limit: Option<u64>,
    ) -> Result<Completed> {
        match self.step(src, content_length_limit) {
            Ok(completed) => Ok(completed),
            Err(RtspError::WouldBlock) => Err(RtspError::WouldBlock),
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    fn step<S: ByteSource + ?Sized>(
        &mut self,
        src: &mut S,
        content_length_limit: Option<u64>,
    ) -> Result<Completed> {
        loop {
            match self.state {
                State::Start => {
                    let byte = src.read_byte()?;
                    match byte {
                        b'$' => self.state = State::DataHeader,
                        b'\r' | b'\n' => {}
                        _ => {
                            self.line.push(byte);
                            self.state = State::ReadLines;
                        }
                    }
                }
                State::DataHeader => {
                    src.read_exact_from(&mut self.data_header, &mut self.data_filled)?;
                    let [channel, hi, lo] = self.data_header;
                    let len = usize::from(u16::from_be_bytes([hi, lo]));
                    tracing::trace!(channel, len, "interleaved frame header");
                    self.start = Some(StartLine::Data(channel));
                    self.begin_body(len)?;
                }
                State::DataBody => {
                    while self.body_filled < self.body_len {
                        if self.body_filled == self.body.len() {
                            self.grow_body()?;
                        }
                        src.read_exact_from(&mut self.body, &mut self.body_filled)?;
                    }
                    self.state = State::End;
                }
                State::ReadLines => {
                    self.line_reader.read_line(src, &mut self.line)?;
                    if self.line.is_empty() {
                        self.end_of_headers(content_length_limit)?;
                        continue;
                    }
                    let text = normalize_line(&self.line);
                    self.line.clear();
                    let res = if self.line_count == 0 {
                        self.parse_start_line(&text)
                    } else {
                        self.parse_header_line(&text)
                    };
                    self.line_count += 1;
                    if let Err(e) = res {
                        tracing::debug!(line = %text, error = %e, "malformed line");
                        self.status.get_or_insert(e);
                    }
                }
                State::End => return Ok(self.finish()),
            }
        }
    }

    fn parse_start_line(&mut self, line: &str) -> Result<()> {
        let start = if line.starts_with("RTSP") || line.starts_with("HTTP") {
            StartLine::Status(parse_status_line(line)?)
        } else {
            StartLine::Request(parse_request_line(line)?)
        };
        self.start = Some(start);
        Ok(())
    }

    fn parse_header_line(&mut self, line: &str) -> Result<()> {
        let (name, value) = line
            .split_once(':')
            .ok_or(RtspError::parse(ParseErrorKind::InvalidHeader))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(RtspError::parse(ParseErrorKind::InvalidHeader));
        }

        let is_request = matches!(self.start, Some(StartLine::Request(ref r)) if !r.http);
        for value in split_header_values(name, value, is_request) {
            self.headers.append(name, value);
        }
        Ok(())
    }

    fn end_of_headers(&mut self, content_length_limit: Option<u64>) -> Result<()> {
        let Some(value) = self.headers.get(names::CONTENT_LENGTH) else {
            self.state = State::End;
            return Ok(());
        };

        if self.is_tunnel_post() {
            // the POST body is the tunneled stream itself
            self.state = State::End;
            return Ok(());
        }

        let len: u64 = value
            .trim()
            .parse()
            .map_err(|_| RtspError::parse(ParseErrorKind::InvalidContentLength))?;
        if let Some(limit) = content_length_limit
            && len > limit
        {
            tracing::warn!(len, limit, "content length over limit");
            return Err(RtspError::BodyTooLarge { len, limit });
        }
        let len = usize::try_from(len).map_err(|_| RtspError::NoMemory(usize::MAX))?;
        self.begin_body(len)
    }

    fn is_tunnel_post(&self) -> bool {
        matches!(
            self.start,
            Some(StartLine::Request(ref r)) if r.http && r.method == Method::Post
        ) && self.headers.contains(names::X_SESSIONCOOKIE)
    }

    fn begin_body(&mut self, len: usize) -> Result<()> {
        if len == 0 {
            self.state = State::End;
            return Ok(());
        }
        self.body.clear();
        self.body_filled = 0;
        self.body_len = len;
        self.state = State::DataBody;
        Ok(())
    }

    /// Make room for the next chunk of body, never more than has been
    /// declared.
    fn grow_body(&mut self) -> Result<()> {
        let grow = (self.body_len - self.body.len()).min(BODY_CHUNK);
        self.body
            .try_reserve(grow)
            .map_err(|_| RtspError::NoMemory(self.body_len))?;
        self.body.resize(self.body.len() + grow, 0);
        Ok(())
    }

    fn finish(&mut self) -> Completed {
        let done = std::mem::take(self);
        let headers = done.headers;
        let body = done.body;

        let message = done.start.map(|start| match start {
            StartLine::Request(line) => {
                let request = Request {
                    method: line.method,
                    uri: line.uri,
                    version: line.version,
                    headers,
                    body,
                };
                if line.http {
                    Message::HttpRequest(request)
                } else {
                    Message::Request(request)
                }
            }
            StartLine::Status(line) => {
                let response = Response {
                    status_code: line.code,
                    reason: line.reason,
                    version: line.version,
                    headers,
                    body,
                };
                if line.http {
                    Message::HttpResponse(response)
                } else {
                    Message::Response(response)
                }
            }
            StartLine::Data(channel) => Message::Data(DataFrame { channel, body }),
        });

        let status = match (done.status, &message) {
            (Some(e), _) => Err(e),
            (None, None) => Err(RtspError::parse(ParseErrorKind::InvalidRequestLine)),
            (None, Some(_)) => Ok(()),
        };
        Completed { message, status }
    }
}

/// Split a raw header value into the entries it represents.
///
/// Single-valued headers produce one entry. Multi-valued headers are split
/// on commas outside quoted strings and parenthesized comments. On RTSP
/// requests the Session value is cut at the first `;`, since some clients
/// send session attributes that only belong in responses.
/// An empty value still yields one (empty) entry.
fn split_header_values<'a>(name: &str, value: &'a str, is_request: bool) -> Vec<&'a str> {
    let mut values = Vec::new();

    if is_request && name.eq_ignore_ascii_case(names::SESSION) {
        values.push(value.split(';').next().unwrap_or_default().trim());
        return values;
    }

    let multiple = allows_multiple(name);
    let challenge = is_auth_challenge(name);
    let mut rest = value;
    while !rest.is_empty() {
        rest = rest.strip_prefix(' ').unwrap_or(rest);
        let (end, next) = if !multiple {
            (rest.len(), rest.len())
        } else if challenge {
            next_challenge_boundary(rest)
        } else {
            next_list_boundary(rest)
        };
        let item = rest[..end].trim_end_matches(' ');
        if !item.is_empty() {
            values.push(item);
        }
        rest = &rest[next..];
    }
    if values.is_empty() {
        values.push("");
    }
    values
}

fn is_auth_challenge(name: &str) -> bool {
    name.eq_ignore_ascii_case(names::WWW_AUTHENTICATE)
        || name.eq_ignore_ascii_case(names::PROXY_AUTHENTICATE)
}

/// Tracks quoted strings and (nested) comments while scanning a value.
#[derive(Default)]
struct Scanner {
    quoted: bool,
    comment: u32,
}

impl Scanner {
    /// Feed byte `i`; returns how many bytes to advance and whether the
    /// byte sits outside any quote or comment.
    fn advance(&mut self, bytes: &[u8], i: usize) -> (usize, bool) {
        let c = bytes[i];
        let nested = self.quoted || self.comment > 0;
        if nested && c == b'\\' && i + 1 < bytes.len() {
            return (2, false);
        }
        if c == b'"' && self.comment == 0 {
            self.quoted = !self.quoted;
            return (1, false);
        }
        if !self.quoted {
            if c == b'(' {
                self.comment += 1;
                return (1, false);
            }
            if c == b')' && self.comment > 0 {
                self.comment -= 1;
                return (1, false);
            }
        }
        (1, !nested)
    }
}

/// Returns (end of this value, start of the next) for a plain list.
fn next_list_boundary(value: &str) -> (usize, usize) {
    let bytes = value.as_bytes();
    let mut scanner = Scanner::default();
    let mut i = 0;
    while i < bytes.len() {
        let (step, bare) = scanner.advance(bytes, i);
        if bare && bytes[i] == b',' {
            return (i, i + 1);
        }
        i += step;
    }
    (bytes.len(), bytes.len())
}

/// Boundary finder for `WWW-Authenticate` / `Proxy-Authenticate`.
///
/// Within one challenge, commas separate auth-params
/// (`Digest realm="x", nonce="y"`). A new challenge starts at the last
/// comma before a `space token space` sequence, i.e. a scheme name
/// followed by its first parameter (`, Basic realm="z"`).
///
/// Known limitation: this is a heuristic, not the RFC 7235 grammar. A
/// token68-style challenge (`Negotiate abc=, Basic realm="z"`) or an
/// unquoted parameter value containing spaces can still be split in the
/// wrong place.
fn next_challenge_boundary(value: &str) -> (usize, usize) {
    let bytes = value.as_bytes();
    let mut scanner = Scanner::default();
    let mut last_comma = None;
    let mut i = 0;
    while i < bytes.len() {
        let (step, bare) = scanner.advance(bytes, i);
        if bare {
            match bytes[i] {
                b',' => {
                    last_comma = Some(i);
                    if bytes.get(i + 1) == Some(&b' ') {
                        i += 1;
                    }
                }
                b' ' => {
                    if let Some(comma) = last_comma
                        && !matches!(bytes.get(i + 1), Some(b',' | b'='))
                    {
                        if bytes[i..].iter().any(|b| *b != b' ') {
                            return (comma, comma + 1);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
        i += step;
    }
    (bytes.len(), bytes.len())
}
