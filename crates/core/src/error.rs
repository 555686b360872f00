//! Error types for the RTSP connection layer.

use std::fmt;
use std::io;

/// Errors that can occur while framing, sending or receiving RTSP messages.
///
/// Variants map onto the result classes a caller typically branches on
/// (see [`ResultCode`]):
///
/// - **Arguments/state**: [`Invalid`](Self::Invalid).
/// - **Cancellation and deadlines**: [`Interrupted`](Self::Interrupted),
///   [`Timeout`](Self::Timeout).
/// - **Transport**: [`Eof`](Self::Eof), [`Net`](Self::Net), [`Io`](Self::Io).
/// - **Protocol**: [`Parse`](Self::Parse).
/// - **Limits**: [`BodyTooLarge`](Self::BodyTooLarge),
///   [`BacklogFull`](Self::BacklogFull), [`NoMemory`](Self::NoMemory).
/// - **Tunneling**: [`Tunnel`](Self::Tunnel).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Bad argument, or the connection is in the wrong state for the call.
    #[error("invalid argument or state: {0}")]
    Invalid(&'static str),

    /// The operation was cancelled through [`Connection::flush`](crate::Connection::flush)
    /// or a flushing [`Watch`](crate::Watch).
    #[error("operation interrupted")]
    Interrupted,

    /// The caller-supplied deadline elapsed.
    #[error("operation timed out")]
    Timeout,

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Eof,

    /// Host resolution or connection establishment failed.
    #[error("network error: {0}")]
    Net(#[source] io::Error),

    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed protocol bytes.
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// A declared Content-Length exceeds the configured ceiling.
    #[error("content length {len} exceeds limit {limit}")]
    BodyTooLarge { len: u64, limit: u64 },

    /// The watch send backlog is at its byte or message limit.
    #[error("send backlog full")]
    BacklogFull,

    /// A body buffer could not be allocated.
    #[error("out of memory allocating {0} bytes")]
    NoMemory(usize),

    /// The HTTP tunnel handshake failed.
    #[error("tunnel setup failed: {0}")]
    Tunnel(String),

    /// Non-blocking read needs more bytes. Never returned by the
    /// blocking API.
    #[error("operation would block")]
    WouldBlock,
}

/// Result class of an [`RtspError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Einval,
    Eintr,
    Etimeout,
    Eeof,
    Enet,
    Esys,
    Eparse,
    Enomem,
    Error,
}

impl RtspError {
    /// Shorthand for a [`Parse`](Self::Parse) error.
    pub fn parse(kind: ParseErrorKind) -> Self {
        Self::Parse { kind }
    }

    pub fn code(&self) -> ResultCode {
        match self {
            Self::Invalid(_) => ResultCode::Einval,
            Self::Interrupted | Self::WouldBlock => ResultCode::Eintr,
            Self::Timeout => ResultCode::Etimeout,
            Self::Eof => ResultCode::Eeof,
            Self::Net(_) => ResultCode::Enet,
            Self::Io(_) => ResultCode::Esys,
            Self::Parse { .. } => ResultCode::Eparse,
            Self::BodyTooLarge { .. } | Self::BacklogFull | Self::NoMemory(_) => {
                ResultCode::Enomem
            }
            Self::Tunnel(_) => ResultCode::Error,
        }
    }

    /// Classify a socket error from a read or write attempt.
    ///
    /// Would-block and socket-timeout results both become
    /// [`WouldBlock`](Self::WouldBlock) so the caller can check its own
    /// deadline and cancellation token before retrying.
    pub(crate) fn from_socket(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::WouldBlock,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Self::Eof,
            _ => Self::Io(err),
        }
    }
}

/// Specific kind of RTSP parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// Status line did not have the expected `Version Code Reason` format.
    InvalidStatusLine,
    /// Unknown method, or a method not allowed for the protocol.
    InvalidMethod,
    /// Unsupported protocol token or version pairing.
    InvalidVersion,
    /// A header line did not contain a name and colon separator.
    InvalidHeader,
    /// Content-Length was not a non-negative integer.
    InvalidContentLength,
    /// CSeq header missing from a request or response.
    MissingCSeq,
    /// CSeq malformed, or a response CSeq newer than any request sent.
    InvalidCSeq,
    /// An HTTP message arrived where only RTSP is accepted.
    UnexpectedHttp,
    /// Tunneled input was not valid base64.
    InvalidEncoding,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidMethod => write!(f, "invalid method"),
            Self::InvalidVersion => write!(f, "unsupported protocol version"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidContentLength => write!(f, "invalid Content-Length"),
            Self::MissingCSeq => write!(f, "missing CSeq"),
            Self::InvalidCSeq => write!(f, "invalid CSeq"),
            Self::UnexpectedHttp => write!(f, "unexpected HTTP message"),
            Self::InvalidEncoding => write!(f, "invalid base64 in tunneled stream"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
