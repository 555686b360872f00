//! RTSP over HTTP.
//!
//! ```text
//!   client                                        server
//!   ── GET  (x-sessioncookie: C) ─────────────►   GotGet, replies 200
//!   ◄─ 200 OK (x-server-ip-address) ───────────
//!   ── POST (x-sessioncookie: C) on socket 2 ──►  GotPost
//!                                                 do_tunnel(GET, POST)
//!   ── base64(RTSP) on POST ──────────────────►   Complete
//!   ◄─ plain RTSP on GET ──────────────────────
//! ```
//!
//! The POST is never answered; it stays open as the client's write
//! channel. Its Content-Length is a placeholder.

use std::mem;
use std::time::Instant;

use rand::RngExt;
use url::Url;

use crate::error::{Result, RtspError};
use crate::protocol::{Completed, Message, Method, Request, Response, names};
use crate::transport::CancelToken;
use crate::transport::codec::Input;
use crate::transport::tcp::Wait;

use super::{Channel, Connection, TunnelState, set_host};

pub(super) const MAX_REDIRECTS: usize = 5;

const COOKIE_LEN: usize = 23;
const TUNNEL_CONTENT_TYPE: &str = "application/x-rtsp-tunnelled";
const POST_EXPIRES: &str = "Sun, 9 Jan 1972 00:00:00 GMT";
const POST_CONTENT_LENGTH: &str = "32767";
const SERVER_AGENT: &str = concat!("rtsp-rs/", env!("CARGO_PKG_VERSION"));

pub(super) enum Setup {
    /// Both channels are up; carries the GET response.
    Complete(Response),
    /// The server redirected the GET; reconnect to this URL.
    Redirect(Url),
}

/// Random lowercase cookie pairing the GET and POST halves.
pub(crate) fn generate_cookie() -> String {
    let mut rng = rand::rng();
    (0..COOKIE_LEN)
        .map(|_| char::from(rng.random_range(b'a'..b'z')))
        .collect()
}

/// Client handshake on a freshly connected direct channel.
pub(super) fn setup_client(
    conn: &mut Connection,
    deadline: Option<Instant>,
    cancel: &CancelToken,
) -> Result<Setup> {
    let wait = Wait::Blocking { deadline, cancel };
    // Pinned so a redirect to an http:// URL stays tunneled.
    conn.config.tunneled = true;
    let cookie = generate_cookie();
    conn.tunnel_cookie = Some(cookie.clone());

    let get = tunnel_request(conn, Method::Get, &cookie);
    tracing::debug!(uri = %get.uri, cookie, "tunnel GET");
    conn.write_message(&Message::HttpRequest(get), wait)?;

    let manual_http = mem::replace(&mut conn.manual_http, true);
    let reply = conn.next_message(wait).and_then(Completed::into_result);
    conn.manual_http = manual_http;
    let Message::HttpResponse(response) = reply? else {
        return Err(RtspError::Tunnel("GET not answered with HTTP".into()));
    };

    match response.status_code {
        200 => {}
        301 | 302 | 303 | 307 if conn.config.proxy.is_none() => {
            let location = response
                .headers
                .get(names::LOCATION)
                .ok_or_else(|| RtspError::Tunnel("redirect without Location".into()))?;
            let url = conn
                .url
                .join(location)
                .map_err(|_| RtspError::Invalid("malformed redirect Location"))?;
            return Ok(Setup::Redirect(url));
        }
        code => {
            return Err(RtspError::Tunnel(format!(
                "GET answered {code} {}",
                response.reason
            )));
        }
    }
    conn.tunnel_state = TunnelState::GotGet;

    if !conn.config.ignore_x_server_reply
        && let Some(ip) = response.headers.get(names::X_SERVER_IP_ADDRESS)
    {
        if set_host(&mut conn.url, ip) {
            tracing::debug!(ip, "POST follows x-server-ip-address");
        } else {
            tracing::warn!(ip, "ignoring unusable x-server-ip-address");
        }
    }

    let (host, port) = conn.target();
    let post_socket = conn.open_socket(&host, port, deadline, cancel)?;
    let Some(get_socket) = conn.channel.take_direct() else {
        return Err(RtspError::Invalid("tunnel GET channel missing"));
    };
    conn.channel = Channel::Tunneled {
        read: get_socket,
        write: post_socket,
    };

    let post = tunnel_request(conn, Method::Post, &cookie);
    tracing::debug!(uri = %post.uri, "tunnel POST");
    conn.tunnel_state = TunnelState::GotPost;
    conn.write_message(&Message::HttpRequest(post), wait)?;
    conn.tunnel_state = TunnelState::Complete;
    Ok(Setup::Complete(response))
}

fn tunnel_request(conn: &Connection, method: Method, cookie: &str) -> Request {
    let mut request = Request::new(method, &tunnel_uri(conn))
        .add_header(names::X_SESSIONCOOKIE, cookie)
        .add_header(names::ACCEPT, TUNNEL_CONTENT_TYPE);
    if method == Method::Post {
        request = request.add_header(names::CONTENT_TYPE, TUNNEL_CONTENT_TYPE);
    }
    request = request
        .add_header(names::CACHE_CONTROL, "no-cache")
        .add_header(names::PRAGMA, "no-cache");
    if method == Method::Post {
        request = request
            .add_header(names::EXPIRES, POST_EXPIRES)
            .add_header(names::CONTENT_LENGTH, POST_CONTENT_LENGTH);
    }
    if let Some(agent) = &conn.config.user_agent {
        request.headers.insert(names::USER_AGENT, agent.as_str());
    }
    for (name, value) in conn.config.extra_http_request_headers.iter() {
        request.headers.insert(name, value);
    }
    request
}

/// Request-URI for the GET/POST: the URL path, or an absolute
/// `http://host:port/path` when going through a proxy.
fn tunnel_uri(conn: &Connection) -> String {
    let mut path = conn.url.path().to_string();
    if path.is_empty() {
        path.push('/');
    }
    if let Some(query) = conn.url.query() {
        path.push('?');
        path.push_str(query);
    }
    match conn.config.proxy {
        Some(_) => format!(
            "http://{}:{}{path}",
            conn.url.host_str().unwrap_or_default(),
            conn.port()
        ),
        None => path,
    }
}

impl Connection {
    /// HTTP reply to a tunnel GET, mirroring the request's version.
    ///
    /// A 200 reply advertises this connection's local address in
    /// `x-server-ip-address` so the client sends its POST to the same
    /// host.
    pub fn gen_tunnel_reply(&self, code: u16, request: &Request) -> Response {
        let mut reply = Response::new(code, "")
            .with_version(request.version)
            .add_header(names::SERVER, SERVER_AGENT)
            .add_header(names::CONNECTION, "close")
            .add_header(names::CACHE_CONTROL, "no-store")
            .add_header(names::PRAGMA, "no-cache");
        if code == 200 {
            if let Some(ip) = &self.local_ip {
                reply = reply.add_header(names::X_SERVER_IP_ADDRESS, ip);
            }
            reply = reply.add_header(names::CONTENT_TYPE, TUNNEL_CONTENT_TYPE);
        }
        reply
    }

    /// Merge the GET and POST halves of a server-side tunnel into `self`.
    ///
    /// Either connection may be the GET one. Afterwards `self` reads the
    /// (base64) client stream from the POST socket, including bytes the
    /// POST connection had already buffered, and writes plain RTSP on the
    /// GET socket. `other` is consumed.
    pub fn do_tunnel(&mut self, mut other: Connection) -> Result<()> {
        let self_is_get = match (self.tunnel_state, other.tunnel_state) {
            (TunnelState::GotGet, TunnelState::GotPost) => true,
            (TunnelState::GotPost, TunnelState::GotGet) => false,
            _ => return Err(RtspError::Invalid("not a tunnel GET/POST pair")),
        };
        if self.tunnel_cookie.is_none() || self.tunnel_cookie != other.tunnel_cookie {
            return Err(RtspError::Invalid("tunnel cookies differ"));
        }

        let (get, post) = if self_is_get {
            (&mut *self, &mut other)
        } else {
            (&mut other, &mut *self)
        };
        if !matches!(get.channel, Channel::Direct(_)) || !matches!(post.channel, Channel::Direct(_))
        {
            return Err(RtspError::Invalid("tunnel halves not connected"));
        }
        let leftover = post.input.take_remaining();
        let (Some(write), Some(read)) = (get.channel.take_direct(), post.channel.take_direct())
        else {
            return Err(RtspError::Invalid("tunnel halves not connected"));
        };

        if !self_is_get {
            self.remote_ip = other.remote_ip.take();
            self.local_ip = other.local_ip.take();
        }
        self.channel = Channel::Tunneled { read, write };
        self.input = Input::default();
        self.input.set_decoding(true);
        self.input.push(&leftover)?;
        self.builder.reset();
        self.tunnel_state = TunnelState::Complete;
        tracing::info!(cookie = ?self.tunnel_cookie, peer = ?self.remote_ip, "tunnel complete");
        Ok(())
    }
}
