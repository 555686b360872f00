//! Message to wire bytes.

use std::fmt::Write as _;

use crate::auth::Credentials;
use crate::error::{Result, RtspError};

use super::date::http_date_now;
use super::headers::{Headers, names};
use super::message::{DataFrame, Message};
use super::request::Request;
use super::response::Response;

/// Connection state consulted (and for CSeq, advanced) while serializing.
pub(crate) struct WriteContext<'a> {
    /// CSeq to stamp on the next RTSP request.
    pub cseq: &'a mut u32,
    /// Remembered session id, sent on every RTSP request.
    pub session_id: Option<&'a str>,
    pub credentials: &'a Credentials,
}

/// Serialize `message`.
///
/// RTSP requests get `CSeq` (advancing the counter by exactly one), the
/// remembered `Session` and an `Authorization` header; HTTP requests get
/// only `Authorization`. Every text message gets a fresh `Date`, and
/// `Content-Length` whenever it has a body.
pub(crate) fn serialize(message: &Message, ctx: &mut WriteContext<'_>) -> Result<Vec<u8>> {
    match message {
        Message::Request(req) => Ok(serialize_request(req, "RTSP", ctx, true)),
        Message::HttpRequest(req) => Ok(serialize_request(req, "HTTP", ctx, false)),
        Message::Response(resp) => Ok(serialize_response(resp, "RTSP")),
        Message::HttpResponse(resp) => Ok(serialize_response(resp, "HTTP")),
        Message::Data(frame) => serialize_data(frame),
    }
}

fn serialize_request(
    req: &Request,
    proto: &str,
    ctx: &mut WriteContext<'_>,
    rtsp: bool,
) -> Vec<u8> {
    let mut head = String::with_capacity(256);
    let _ = write!(head, "{} {} {proto}/{}\r\n", req.method, req.uri, req.version);

    let mut injected: Vec<&str> = vec![names::DATE];
    if rtsp {
        let _ = write!(head, "{}: {}\r\n", names::CSEQ, *ctx.cseq);
        *ctx.cseq += 1;
        injected.push(names::CSEQ);
        if let Some(id) = ctx.session_id {
            let _ = write!(head, "{}: {id}\r\n", names::SESSION);
            injected.push(names::SESSION);
        }
    }
    if let Some(auth) = ctx.credentials.authorization(req.method.as_str(), &req.uri) {
        let _ = write!(head, "{}: {auth}\r\n", names::AUTHORIZATION);
        injected.push(names::AUTHORIZATION);
    }

    finish(head, &req.headers, &injected, &req.body)
}

fn serialize_response(resp: &Response, proto: &str) -> Vec<u8> {
    let mut head = String::with_capacity(256);
    let _ = write!(
        head,
        "{proto}/{} {} {}\r\n",
        resp.version, resp.status_code, resp.reason
    );
    finish(head, &resp.headers, &[names::DATE], &resp.body)
}

/// Append the remaining headers, `Date`, `Content-Length` and the body.
fn finish(mut head: String, headers: &Headers, skip: &[&str], body: &[u8]) -> Vec<u8> {
    for (name, value) in headers.iter() {
        let skipped = skip.iter().any(|s| s.eq_ignore_ascii_case(name))
            || (!body.is_empty() && name.eq_ignore_ascii_case(names::CONTENT_LENGTH));
        if !skipped {
            let _ = write!(head, "{name}: {value}\r\n");
        }
    }
    let _ = write!(head, "{}: {}\r\n", names::DATE, http_date_now());

    if !body.is_empty() {
        let _ = write!(head, "{}: {}\r\n", names::CONTENT_LENGTH, body.len());
    }
    head.push_str("\r\n");

    let mut out = head.into_bytes();
    out.extend_from_slice(body);
    out
}

fn serialize_data(frame: &DataFrame) -> Result<Vec<u8>> {
    let len = u16::try_from(frame.body.len())
        .map_err(|_| RtspError::Invalid("data frame larger than 65535 bytes"))?;
    let mut out = Vec::with_capacity(4 + frame.body.len());
    out.push(b'$');
    out.push(frame.channel);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&frame.body);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthMethod;
    use crate::protocol::{Builder, Method};

    fn ser(message: &Message, cseq: &mut u32, session: Option<&str>, creds: &Credentials) -> String {
        let mut ctx = WriteContext {
            cseq,
            session_id: session,
            credentials: creds,
        };
        String::from_utf8(serialize(message, &mut ctx).unwrap()).unwrap()
    }

    #[test]
    fn request_gets_cseq_session_and_date() {
        let creds = Credentials::default();
        let mut cseq = 1;
        let msg = Message::Request(
            Request::new(Method::Play, "rtsp://h/s")
                .add_header("Session", "stale")
                .add_header("Range", "npt=0-"),
        );
        let text = ser(&msg, &mut cseq, Some("ABC123"), &creds);
        assert!(text.starts_with("PLAY rtsp://h/s RTSP/1.0\r\nCSeq: 1\r\nSession: ABC123\r\n"));
        assert!(text.contains("Range: npt=0-\r\n"));
        assert!(!text.contains("stale"));
        assert!(text.contains("\r\nDate: "));
        assert!(text.ends_with("GMT\r\n\r\n"));
        assert_eq!(cseq, 2);
    }

    #[test]
    fn cseq_advances_only_for_requests() {
        let creds = Credentials::default();
        let mut cseq = 5;
        let req = Message::Request(Request::new(Method::Options, "*"));
        ser(&req, &mut cseq, None, &creds);
        ser(&req, &mut cseq, None, &creds);
        let resp = Message::Response(Response::ok().add_header("CSeq", "9"));
        let text = ser(&resp, &mut cseq, None, &creds);
        assert!(text.starts_with("RTSP/1.0 200 OK\r\nCSeq: 9\r\n"));
        let http = Message::HttpRequest(Request::new(Method::Get, "/"));
        ser(&http, &mut cseq, None, &creds);
        assert_eq!(cseq, 7);
    }

    #[test]
    fn body_gets_content_length() {
        let creds = Credentials::default();
        let mut cseq = 1;
        let msg = Message::Response(
            Response::ok()
                .add_header("Content-Length", "999")
                .with_body("v=0\r\n"),
        );
        let text = ser(&msg, &mut cseq, None, &creds);
        assert!(text.contains("Content-Length: 5\r\n\r\nv=0\r\n"));
        assert!(!text.contains("999"));
    }

    #[test]
    fn placeholder_content_length_kept_without_body() {
        let creds = Credentials::default();
        let mut cseq = 1;
        let msg = Message::HttpRequest(
            Request::new(Method::Post, "/s").add_header("Content-Length", "32767"),
        );
        let text = ser(&msg, &mut cseq, None, &creds);
        assert!(text.starts_with("POST /s HTTP/1.0\r\n"));
        assert!(text.contains("Content-Length: 32767\r\n"));
        assert!(!text.contains("CSeq"));
    }

    #[test]
    fn authorization_added() {
        let mut creds = Credentials::default();
        creds.set(AuthMethod::Basic, "u", "p").unwrap();
        let mut cseq = 1;
        let msg = Message::Request(Request::new(Method::Describe, "rtsp://h/s"));
        let text = ser(&msg, &mut cseq, None, &creds);
        assert!(text.contains("Authorization: Basic dTpw\r\n"));
    }

    #[test]
    fn data_frame_layout() {
        let creds = Credentials::default();
        let mut cseq = 1;
        let frame = DataFrame { channel: 4, body: vec![9; 300] };
        let mut ctx = WriteContext { cseq: &mut cseq, session_id: None, credentials: &creds };
        let bytes = serialize(&Message::Data(frame), &mut ctx).unwrap();
        assert_eq!(&bytes[..4], &[b'$', 4, 0x01, 0x2c]);
        assert_eq!(bytes.len(), 304);

        let big = DataFrame { channel: 0, body: vec![0; 70_000] };
        assert!(serialize(&Message::Data(big), &mut ctx).is_err());
    }

    #[test]
    fn serialized_request_parses_back() {
        let creds = Credentials::default();
        let mut cseq = 3;
        let msg = Message::Request(
            Request::new(Method::SetParameter, "rtsp://h/s")
                .add_header("Content-Type", "text/parameters")
                .with_body("volume: 5\r\n"),
        );
        let text = ser(&msg, &mut cseq, None, &creds);
        let mut src = text.as_bytes();
        let parsed = Builder::new().build(&mut src, None).unwrap().into_result().unwrap();
        let Message::Request(req) = parsed else {
            panic!("expected request")
        };
        assert_eq!(req.cseq(), Some("3"));
        assert_eq!(req.get_header("content-type"), Some("text/parameters"));
        assert_eq!(req.body, b"volume: 5\r\n");
    }
}
