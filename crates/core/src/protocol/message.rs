use std::fmt;

use super::headers::Headers;
use super::request::Request;
use super::response::Response;

/// Protocol version carried in the start line.
///
/// `1.1` only exists for HTTP; RTSP accepts `1.0` and `2.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    #[default]
    V1_0,
    V1_1,
    V2_0,
}

impl Version {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1_0 => "1.0",
            Self::V1_1 => "1.1",
            Self::V2_0 => "2.0",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request methods: the RTSP set plus the two HTTP methods used by
/// tunneling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Describe,
    Announce,
    GetParameter,
    Options,
    Pause,
    Play,
    Record,
    Redirect,
    Setup,
    SetParameter,
    Teardown,
    PlayNotify,
    /// HTTP GET (tunnel read channel).
    Get,
    /// HTTP POST (tunnel write channel).
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Describe => "DESCRIBE",
            Self::Announce => "ANNOUNCE",
            Self::GetParameter => "GET_PARAMETER",
            Self::Options => "OPTIONS",
            Self::Pause => "PAUSE",
            Self::Play => "PLAY",
            Self::Record => "RECORD",
            Self::Redirect => "REDIRECT",
            Self::Setup => "SETUP",
            Self::SetParameter => "SET_PARAMETER",
            Self::Teardown => "TEARDOWN",
            Self::PlayNotify => "PLAY_NOTIFY",
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }

    /// Look up a method token, ignoring ASCII case.
    pub fn from_token(token: &str) -> Option<Self> {
        const ALL: [Method; 14] = [
            Method::Describe,
            Method::Announce,
            Method::GetParameter,
            Method::Options,
            Method::Pause,
            Method::Play,
            Method::Record,
            Method::Redirect,
            Method::Setup,
            Method::SetParameter,
            Method::Teardown,
            Method::PlayNotify,
            Method::Get,
            Method::Post,
        ];
        ALL.into_iter().find(|m| m.as_str().eq_ignore_ascii_case(token))
    }

    pub fn is_http(self) -> bool {
        matches!(self, Self::Get | Self::Post)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interleaved binary packet (`$`, channel, 16-bit length, payload).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataFrame {
    pub channel: u8,
    pub body: Vec<u8>,
}

/// One protocol message.
///
/// HTTP variants only appear on the wire during tunnel setup (or when the
/// connection is in manual HTTP mode). [`Data`](Self::Data) frames never
/// carry headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request(Request),
    Response(Response),
    HttpRequest(Request),
    HttpResponse(Response),
    Data(DataFrame),
}

impl Message {
    pub fn headers(&self) -> Option<&Headers> {
        match self {
            Self::Request(r) | Self::HttpRequest(r) => Some(&r.headers),
            Self::Response(r) | Self::HttpResponse(r) => Some(&r.headers),
            Self::Data(_) => None,
        }
    }

    pub fn headers_mut(&mut self) -> Option<&mut Headers> {
        match self {
            Self::Request(r) | Self::HttpRequest(r) => Some(&mut r.headers),
            Self::Response(r) | Self::HttpResponse(r) => Some(&mut r.headers),
            Self::Data(_) => None,
        }
    }

    pub fn body(&self) -> &[u8] {
        match self {
            Self::Request(r) | Self::HttpRequest(r) => &r.body,
            Self::Response(r) | Self::HttpResponse(r) => &r.body,
            Self::Data(d) => &d.body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers().and_then(|h| h.get(name))
    }

    pub fn is_http(&self) -> bool {
        matches!(self, Self::HttpRequest(_) | Self::HttpResponse(_))
    }

    pub fn as_request(&self) -> Option<&Request> {
        match self {
            Self::Request(r) | Self::HttpRequest(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Self::Response(r) | Self::HttpResponse(r) => Some(r),
            _ => None,
        }
    }
}

impl From<DataFrame> for Message {
    fn from(frame: DataFrame) -> Self {
        Self::Data(frame)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let proto = if self.is_http() { "HTTP" } else { "RTSP" };
        match self {
            Self::Request(r) | Self::HttpRequest(r) => {
                writeln!(f, "{proto} request: {} {} {proto}/{}", r.method, r.uri, r.version)?;
                write!(f, "{}", r.headers)?;
            }
            Self::Response(r) | Self::HttpResponse(r) => {
                writeln!(f, "{proto} response: {proto}/{} {} {}", r.version, r.status_code, r.reason)?;
                write!(f, "{}", r.headers)?;
            }
            Self::Data(d) => {
                writeln!(f, "data frame: channel {}", d.channel)?;
            }
        }
        write!(f, "  body: {} bytes", self.body().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_lookup_ignores_case() {
        assert_eq!(Method::from_token("get_parameter"), Some(Method::GetParameter));
        assert_eq!(Method::from_token("OPTIONS"), Some(Method::Options));
        assert_eq!(Method::from_token("BREW"), None);
        assert!(Method::Post.is_http());
        assert!(!Method::Play.is_http());
    }

    #[test]
    fn data_frame_has_no_headers() {
        let msg = Message::from(DataFrame { channel: 3, body: vec![1, 2] });
        assert!(msg.headers().is_none());
        assert_eq!(msg.body(), &[1, 2]);
    }

    #[test]
    fn display_summarizes_request() {
        let msg = Message::Request(Request::new(Method::Options, "*"));
        let text = msg.to_string();
        assert!(text.starts_with("RTSP request: OPTIONS * RTSP/1.0"));
        assert!(text.ends_with("body: 0 bytes"));
    }
}
