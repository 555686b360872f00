//! RTSP/HTTP message model and wire framing (RFC 2326 §4, §10.12).
//!
//! RTSP messages follow HTTP/1.1 syntax:
//!
//! ```text
//! DESCRIBE rtsp://server/stream RTSP/1.0\r\n
//! CSeq: 2\r\n
//! Accept: application/sdp\r\n
//! \r\n
//! ```
//!
//! Media can be interleaved on the same TCP stream as binary frames with
//! no textual header:
//!
//! ```text
//! +------+---------+----------------+----------------------+
//! | '$'  | channel | length (BE 16) | payload (length)     |
//! +------+---------+----------------+----------------------+
//! ```
//!
//! | Piece | Role |
//! |-------|------|
//! | [`Message`] | request / response / HTTP request / HTTP response / data |
//! | [`Headers`] | ordered multi-map, case-insensitive names |
//! | [`Builder`] | incremental bytes to message parser |
//! | line reader | CR/LF handling and header folding for the builder |
//! | serializer | message to bytes, with CSeq/Session/Date injection |

pub mod builder;
pub mod date;
pub mod headers;
pub mod line;
pub mod message;
pub mod request;
pub mod response;
pub(crate) mod serialize;

pub use builder::{Builder, Completed};
pub use headers::{Headers, names};
pub use line::ByteSource;
pub use message::{DataFrame, Message, Method, Version};
pub use request::Request;
pub use response::{Response, status_text};
