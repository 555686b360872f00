//! One logical RTSP connection.
//!
//! A [`Connection`] owns the socket (or, when tunneled over HTTP, the
//! GET/POST socket pair), the incremental [`Builder`] for inbound bytes and
//! the per-connection protocol state: next CSeq, remembered session id and
//! timeout, credentials and tunnel bookkeeping.
//!
//! ```text
//!   client                                 server
//!   Connection::new(url)                   Connection::accept(&listener)
//!   connect(timeout) ──── TCP/TLS ───────► receive(timeout)
//!   send(request)    ──── request ───────►   Received::Message
//!   receive(timeout) ◄─── response ──────  send(response)
//! ```
//!
//! The blocking API takes an optional timeout (`None` or zero waits
//! forever) and can be interrupted from another thread through
//! [`Connection::canceller`]. For readiness-driven use, hand the
//! connection to a [`Watch`](crate::Watch) instead; the two modes are
//! never mixed on one connection.

use std::io::Read;
use std::mem;
use std::net::{IpAddr, Ipv6Addr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use url::Url;

use crate::auth::{AuthMethod, Credentials};
use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::serialize::{WriteContext, serialize};
use crate::protocol::{Builder, Completed, Message, Method, Request, Response, names};
use crate::transport::codec::{self, Input};
use crate::transport::socket::{Side, SocketTimeouts};
use crate::transport::tcp::{self, SocketReader, Wait};
use crate::transport::{CancelToken, Canceller, Socket};

mod config;
mod tunnel;

pub use config::{ConnectionConfig, DEFAULT_SESSION_TIMEOUT, Proxy};

/// Longer session ids are truncated.
const MAX_SESSION_ID_LEN: usize = 511;

/// Progress of the HTTP tunnel handshake.
///
/// Clients walk `None → GotGet → GotPost → Complete` inside
/// [`Connection::connect`]. On the server one accepted connection sees
/// the GET (`GotGet`), another the POST (`GotPost`), and
/// [`Connection::do_tunnel`] merges them into one `Complete` connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TunnelState {
    #[default]
    None,
    GotGet,
    GotPost,
    Complete,
}

/// The sockets behind a connection.
#[derive(Debug, Default)]
pub(crate) enum Channel {
    #[default]
    Detached,
    Direct(Socket),
    /// HTTP tunnel. Client: read = GET, write = POST. Server: read = POST,
    /// write = GET.
    Tunneled { read: Socket, write: Socket },
}

impl Channel {
    pub fn read_socket(&self) -> Option<&Socket> {
        match self {
            Self::Detached => None,
            Self::Direct(socket) | Self::Tunneled { read: socket, .. } => Some(socket),
        }
    }

    pub fn write_socket(&self) -> Option<&Socket> {
        match self {
            Self::Detached => None,
            Self::Direct(socket) | Self::Tunneled { write: socket, .. } => Some(socket),
        }
    }

    pub fn read_socket_mut(&mut self) -> Option<&mut Socket> {
        match self {
            Self::Detached => None,
            Self::Direct(socket) | Self::Tunneled { read: socket, .. } => Some(socket),
        }
    }

    pub fn write_socket_mut(&mut self) -> Option<&mut Socket> {
        match self {
            Self::Detached => None,
            Self::Direct(socket) | Self::Tunneled { write: socket, .. } => Some(socket),
        }
    }

    /// Take the socket of a direct channel, leaving anything else in place.
    fn take_direct(&mut self) -> Option<Socket> {
        match mem::take(self) {
            Self::Direct(socket) => Some(socket),
            other => {
                *self = other;
                None
            }
        }
    }

    fn shutdown(&self) {
        match self {
            Self::Detached => {}
            Self::Direct(socket) => socket.shutdown(),
            Self::Tunneled { read, write } => {
                read.shutdown();
                write.shutdown();
            }
        }
    }
}

/// Outcome of [`Connection::receive`].
#[derive(Debug)]
pub enum Received {
    Message(Message),
    /// A tunnel GET arrived and has been answered. The connection is now
    /// the tunnel's server-to-client half and waits for its POST.
    TunnelGet(Request),
    /// A tunnel POST arrived; its body is the tunneled stream and is left
    /// unread. Pair this connection with the GET one using
    /// [`Connection::do_tunnel`].
    TunnelPost(Request),
}

/// A single RTSP connection, client or server side.
#[derive(Debug)]
pub struct Connection {
    url: Url,
    config: ConnectionConfig,
    channel: Channel,
    input: Input,
    builder: Builder,
    timeouts: SocketTimeouts,
    canceller: Canceller,
    /// CSeq stamped on the next outgoing request.
    cseq: u32,
    session_id: Option<String>,
    timeout: Duration,
    timer: Instant,
    credentials: Credentials,
    tunnel_state: TunnelState,
    tunnel_cookie: Option<String>,
    /// Surface HTTP messages as-is instead of treating them as tunnel
    /// requests.
    manual_http: bool,
    remote_ip: Option<String>,
    local_ip: Option<String>,
}

impl Connection {
    /// Client connection to `url` (`rtsp://`, `rtsps://`, or `rtsph://`
    /// for an HTTP-tunneled target). Nothing is opened until
    /// [`connect`](Self::connect).
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, ConnectionConfig::default())
    }

    pub fn with_config(url: &str, config: ConnectionConfig) -> Result<Self> {
        let url = Url::parse(url).map_err(|_| RtspError::Invalid("malformed URL"))?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(RtspError::Invalid("URL has no host"));
        }
        Ok(Self::build(url, config))
    }

    fn build(url: Url, config: ConnectionConfig) -> Self {
        let timeout = config.session_timeout;
        Self {
            url,
            config,
            channel: Channel::Detached,
            input: Input::default(),
            builder: Builder::new(),
            timeouts: SocketTimeouts::default(),
            canceller: Canceller::default(),
            cseq: 1,
            session_id: None,
            timeout,
            timer: Instant::now(),
            credentials: Credentials::default(),
            tunnel_state: TunnelState::None,
            tunnel_cookie: None,
            manual_http: false,
            remote_ip: None,
            local_ip: None,
        }
    }

    /// Accept one client from `listener` as a server-side connection.
    pub fn accept(listener: &TcpListener) -> Result<Self> {
        let (stream, _) = listener.accept()?;
        Self::from_stream(stream, Vec::new())
    }

    /// Server-side connection over an accepted stream.
    ///
    /// `initial_buffer` holds bytes already read from the stream (by a
    /// listener that sniffed the protocol, say); they are parsed before
    /// anything is read from the socket.
    pub fn from_stream(stream: TcpStream, initial_buffer: Vec<u8>) -> Result<Self> {
        let peer = stream.peer_addr()?;
        let local = stream.local_addr()?;
        let url = Url::parse(&format!("rtsp://{peer}"))
            .map_err(|_| RtspError::Invalid("unusable peer address"))?;

        let mut conn = Self::build(url, ConnectionConfig::default());
        conn.remote_ip = Some(peer.ip().to_string());
        conn.local_ip = Some(local.ip().to_string());
        conn.input = Input::with_initial(initial_buffer);
        conn.channel = Channel::Direct(Socket::Tcp(stream));
        tracing::info!(%peer, "accepted connection");
        Ok(conn)
    }

    pub fn connect(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.connect_with_response(timeout).map(|_| ())
    }

    /// Connect, returning the HTTP response to the tunnel GET when the
    /// connection is tunneled.
    ///
    /// Tunnel setup follows up to five redirects (never through a proxy).
    /// Fails with [`RtspError::Invalid`] if already connected.
    pub fn connect_with_response(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<Response>> {
        if !matches!(self.channel, Channel::Detached) {
            return Err(RtspError::Invalid("already connected"));
        }
        let deadline = deadline_after(timeout);
        let cancel = self.canceller.token();

        let mut redirects = 0;
        loop {
            let (host, port) = self.target();
            let socket = self.open_socket(&host, port, deadline, &cancel)?;
            self.remote_ip = socket.peer_addr().ok().map(|a| a.ip().to_string());
            self.local_ip = socket.local_addr().ok().map(|a| a.ip().to_string());
            self.channel = Channel::Direct(socket);
            self.timer = Instant::now();

            if !self.is_tunneled() {
                tracing::info!(url = %self.url, "connected");
                return Ok(None);
            }
            match tunnel::setup_client(self, deadline, &cancel) {
                Ok(tunnel::Setup::Complete(response)) => {
                    tracing::info!(url = %self.url, "tunnel established");
                    return Ok(Some(response));
                }
                Ok(tunnel::Setup::Redirect(location)) => {
                    self.detach();
                    redirects += 1;
                    if redirects > tunnel::MAX_REDIRECTS {
                        return Err(RtspError::Tunnel("too many redirects".into()));
                    }
                    tracing::debug!(%location, redirects, "tunnel redirected");
                    self.url = location;
                }
                Err(e) => {
                    self.detach();
                    return Err(e);
                }
            }
        }
    }

    /// Release the sockets and reset session, auth, tunnel and timeout
    /// state. The URL is kept, so the connection can be connected again.
    pub fn close(&mut self) {
        let was_open = !matches!(self.channel, Channel::Detached);
        self.detach();
        self.cseq = 1;
        self.session_id = None;
        self.timeout = self.config.session_timeout;
        self.credentials = Credentials::default();
        self.tunnel_state = TunnelState::None;
        self.tunnel_cookie = None;
        if was_open {
            tracing::info!(url = %self.url, "connection closed");
        }
    }

    fn detach(&mut self) {
        self.channel.shutdown();
        self.channel = Channel::Detached;
        self.input.clear();
        self.builder.reset();
    }

    pub fn send(&mut self, message: &Message, timeout: Option<Duration>) -> Result<()> {
        self.send_messages(std::slice::from_ref(message), timeout)
    }

    /// Serialize all `messages` and write them in one go.
    pub fn send_messages(&mut self, messages: &[Message], timeout: Option<Duration>) -> Result<()> {
        if self.channel.write_socket().is_none() {
            return Err(RtspError::Invalid("not connected"));
        }
        let mut data = Vec::new();
        for message in messages {
            data.extend(self.serialize(message)?);
        }
        let cancel = self.canceller.token();
        self.write_bytes(
            &data,
            Wait::Blocking {
                deadline: deadline_after(timeout),
                cancel: &cancel,
            },
        )
    }

    /// Read the next message.
    ///
    /// Unless in manual HTTP mode, a tunnel GET is answered here and
    /// reported as [`Received::TunnelGet`]; a tunnel POST is reported as
    /// [`Received::TunnelPost`]. Any other HTTP message is a parse error.
    pub fn receive(&mut self, timeout: Option<Duration>) -> Result<Received> {
        let cancel = self.canceller.token();
        let wait = Wait::Blocking {
            deadline: deadline_after(timeout),
            cancel: &cancel,
        };
        let message = self.next_message(wait)?.into_result()?;
        let received = self.intercept(message)?;
        if let Received::TunnelGet(request) = &received {
            let reply = self.gen_tunnel_reply(200, request);
            self.write_message(&Message::HttpResponse(reply), wait)?;
        }
        Ok(received)
    }

    /// Restart the session idle timer, typically after a keep-alive.
    pub fn reset_timeout(&mut self) {
        self.timer = Instant::now();
    }

    /// Time left before the session should be refreshed.
    ///
    /// Leaves a margin before the server's session timeout: 5s for
    /// timeouts of 20s or more, a fifth for 5s to 20s, and 1s below that.
    pub fn next_timeout(&self) -> Duration {
        let secs = self.timeout.as_secs();
        let refresh = match secs {
            20.. => secs - 5,
            5.. => secs - secs / 5,
            1.. => secs - 1,
            0 => 0,
        };
        Duration::from_secs(refresh).saturating_sub(self.timer.elapsed())
    }

    /// Cancel (`true`) or re-enable (`false`) blocking calls.
    pub fn flush(&self, flush: bool) {
        self.canceller.flush(flush);
    }

    /// Handle for calling [`flush`](Self::flush) from another thread.
    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    pub fn set_auth(&mut self, method: AuthMethod, username: &str, password: &str) -> Result<()> {
        self.credentials.set(method, username, password)
    }

    /// Set or (with `None`) remove a digest challenge parameter such as
    /// `realm` or `nonce`. Names are case-insensitive.
    pub fn set_auth_param(&mut self, name: &str, value: Option<&str>) {
        self.credentials.set_param(name, value);
    }

    pub fn clear_auth_params(&mut self) {
        self.credentials.clear_params();
    }

    pub fn set_tunneled(&mut self, tunneled: bool) {
        self.config.tunneled = tunneled;
    }

    pub fn is_tunneled(&self) -> bool {
        self.config.tunneled || self.url.scheme() == "rtsph"
    }

    /// In manual HTTP mode received HTTP messages are returned as-is.
    pub fn set_http_mode(&mut self, manual: bool) {
        self.manual_http = manual;
    }

    pub fn set_ignore_x_server_reply(&mut self, ignore: bool) {
        self.config.ignore_x_server_reply = ignore;
    }

    pub fn add_extra_http_request_header(&mut self, name: &str, value: &str) {
        self.config.extra_http_request_headers.append(name, value);
    }

    pub fn set_remember_session_id(&mut self, remember: bool) {
        self.config.remember_session_id = remember;
        if !remember {
            self.session_id = None;
        }
    }

    pub fn set_content_length_limit(&mut self, limit: Option<u64>) {
        self.config.content_length_limit = limit;
    }

    pub fn set_proxy(&mut self, proxy: Option<Proxy>) {
        self.config.proxy = proxy;
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Remote IP address, once connected.
    pub fn ip(&self) -> Option<&str> {
        self.remote_ip.as_deref()
    }

    pub fn local_ip(&self) -> Option<&str> {
        self.local_ip.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Session timeout advertised by the server (60s until one is).
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// CSeq the next request will carry.
    pub fn cseq(&self) -> u32 {
        self.cseq
    }

    pub fn tunnel_state(&self) -> TunnelState {
        self.tunnel_state
    }

    pub fn tunnel_cookie(&self) -> Option<&str> {
        self.tunnel_cookie.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        !matches!(self.channel, Channel::Detached)
    }

    pub(crate) fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Switch every socket between blocking and non-blocking mode.
    pub(crate) fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        if let Some(socket) = self.channel.read_socket() {
            socket.set_nonblocking(nonblocking)?;
        }
        if let Some(socket) = self.channel.write_socket() {
            socket.set_nonblocking(nonblocking)?;
        }
        Ok(())
    }

    /// Wire bytes for `message`, base64-encoded on a client tunnel.
    pub(crate) fn serialize(&mut self, message: &Message) -> Result<Vec<u8>> {
        let mut ctx = WriteContext {
            cseq: &mut self.cseq,
            session_id: self.session_id.as_deref(),
            credentials: &self.credentials,
        };
        let bytes = serialize(message, &mut ctx)?;
        if let Message::Request(request) = message {
            tracing::debug!(method = %request.method, uri = %request.uri, cseq = self.cseq - 1, "sending request");
        }
        Ok(if self.encodes_writes() {
            codec::encode(&bytes)
        } else {
            bytes
        })
    }

    /// Client writes on an established tunnel go out as base64.
    fn encodes_writes(&self) -> bool {
        self.is_tunneled() && self.tunnel_state == TunnelState::Complete
    }

    fn write_message(&mut self, message: &Message, wait: Wait<'_>) -> Result<()> {
        let data = self.serialize(message)?;
        self.write_bytes(&data, wait)
    }

    fn write_bytes(&mut self, data: &[u8], wait: Wait<'_>) -> Result<()> {
        let Some(socket) = self.channel.write_socket_mut() else {
            return Err(RtspError::Invalid("not connected"));
        };
        let blocking = matches!(wait, Wait::Blocking { .. });
        if blocking {
            self.timeouts.arm(socket, Side::Write)?;
        }
        let mut written = 0;
        let res = tcp::write_all(socket, data, &mut written, wait);
        if blocking {
            self.timeouts.disarm(socket, Side::Write);
        }
        res
    }

    /// Non-blocking write of `data[*written..]`, advancing `written`.
    pub(crate) fn try_write(&mut self, data: &[u8], written: &mut usize) -> Result<()> {
        let Some(socket) = self.channel.write_socket_mut() else {
            return Err(RtspError::Invalid("not connected"));
        };
        tcp::write_all(socket, data, written, Wait::NonBlocking)
    }

    /// Drain whatever the peer sent on the write socket of a tunnel.
    ///
    /// Nothing meaningful arrives there; the read only detects that the
    /// peer closed it ([`RtspError::Eof`]).
    pub(crate) fn read_control(&mut self) -> Result<()> {
        let Some(socket) = self.channel.write_socket_mut() else {
            return Err(RtspError::Invalid("not connected"));
        };
        let mut scratch = [0u8; 1024];
        loop {
            match socket.read(&mut scratch) {
                Ok(0) => return Err(RtspError::Eof),
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return match RtspError::from_socket(e) {
                        RtspError::WouldBlock => Ok(()),
                        other => Err(other),
                    };
                }
            }
        }
    }

    /// The read half of a tunnel went away: fall back to the write socket
    /// alone and wait for a new POST.
    pub(crate) fn lose_tunnel(&mut self) {
        if let Channel::Tunneled { read, write } = mem::take(&mut self.channel) {
            read.shutdown();
            self.channel = Channel::Direct(write);
        }
        self.input.clear();
        self.builder.reset();
        self.tunnel_state = TunnelState::GotGet;
    }

    /// Run the builder until a message completes, then validate it.
    ///
    /// A validation failure is reported through `status` like a parse
    /// error, so the message is still available to the caller.
    pub(crate) fn next_message(&mut self, wait: Wait<'_>) -> Result<Completed> {
        let mut done = self.build_message(wait)?;
        if done.status.is_ok()
            && let Some(message) = &done.message
        {
            done.status = self.check_message(message);
        }
        Ok(done)
    }

    fn build_message(&mut self, wait: Wait<'_>) -> Result<Completed> {
        let limit = self.config.content_length_limit;
        let Some(socket) = self.channel.read_socket_mut() else {
            return Err(RtspError::Invalid("not connected"));
        };
        let blocking = matches!(wait, Wait::Blocking { .. });
        if blocking {
            self.timeouts.arm(socket, Side::Read)?;
        }
        let res = {
            let mut reader = SocketReader {
                input: &mut self.input,
                socket: &mut *socket,
                wait,
            };
            self.builder.build(&mut reader, limit)
        };
        if blocking {
            self.timeouts.disarm(socket, Side::Read);
        }
        if let Err(e) = &res
            && !matches!(e, RtspError::WouldBlock)
        {
            tracing::debug!(error = %e, "receive failed");
        }
        res
    }

    fn check_message(&mut self, message: &Message) -> Result<()> {
        match message {
            Message::Request(_) => {
                parse_cseq(message)?;
            }
            Message::Response(response) => {
                let cseq = parse_cseq(message)?;
                if cseq >= u64::from(self.cseq) {
                    tracing::warn!(cseq, next = self.cseq, "response CSeq ahead of requests sent");
                    return Err(RtspError::parse(ParseErrorKind::InvalidCSeq));
                }
                self.capture_session(response);
            }
            Message::HttpRequest(request) => self.arm_tunnel(request),
            Message::HttpResponse(_) | Message::Data(_) => {}
        }
        Ok(())
    }

    /// Remember the `Session` id and its `timeout` attribute.
    fn capture_session(&mut self, response: &Response) {
        let Some(value) = response.headers.get(names::SESSION) else {
            return;
        };
        let (id, attrs) = value.split_once(';').unwrap_or((value, ""));
        self.timeout = self.config.session_timeout;
        for attr in attrs.split(';') {
            if let Some(secs) = attr.trim().strip_prefix("timeout=")
                && let Some(secs) = leading_number(secs)
                && secs > 0
            {
                self.timeout = Duration::from_secs(secs);
            }
        }
        let id = truncate(id.trim(), MAX_SESSION_ID_LEN);
        tracing::debug!(session = id, timeout = self.timeout.as_secs(), "session updated");
        if self.config.remember_session_id {
            self.session_id = Some(id.to_string());
        }
    }

    /// A cookie on an HTTP request announces a tunnel half.
    fn arm_tunnel(&mut self, request: &Request) {
        if self.manual_http || self.tunnel_state != TunnelState::None {
            return;
        }
        if let Some(cookie) = request.headers.get(names::X_SESSIONCOOKIE) {
            self.tunnel_cookie = Some(cookie.to_string());
        }
    }

    /// Route tunnel requests away from the caller's message stream.
    pub(crate) fn intercept(&mut self, message: Message) -> Result<Received> {
        if self.manual_http {
            return Ok(Received::Message(message));
        }
        match message {
            Message::HttpRequest(request)
                if self.tunnel_state == TunnelState::None && request.method == Method::Get =>
            {
                tracing::debug!(cookie = ?self.tunnel_cookie, "tunnel GET");
                self.tunnel_state = TunnelState::GotGet;
                Ok(Received::TunnelGet(request))
            }
            Message::HttpRequest(request)
                if self.tunnel_state == TunnelState::None && request.method == Method::Post =>
            {
                tracing::debug!(cookie = ?self.tunnel_cookie, "tunnel POST");
                self.tunnel_state = TunnelState::GotPost;
                Ok(Received::TunnelPost(request))
            }
            Message::HttpRequest(_) | Message::HttpResponse(_) => {
                Err(RtspError::parse(ParseErrorKind::UnexpectedHttp))
            }
            other => Ok(Received::Message(other)),
        }
    }

    /// Where to open the TCP connection: the proxy for a proxied tunnel,
    /// the URL's host otherwise.
    fn target(&self) -> (String, u16) {
        match &self.config.proxy {
            Some(proxy) if self.is_tunneled() => (proxy.host.clone(), proxy.port),
            _ => (host_of(&self.url), self.port()),
        }
    }

    fn port(&self) -> u16 {
        self.url
            .port()
            .unwrap_or_else(|| default_port(self.url.scheme()))
    }

    fn open_socket(
        &self,
        host: &str,
        port: u16,
        deadline: Option<Instant>,
        cancel: &CancelToken,
    ) -> Result<Socket> {
        let stream = tcp::connect(host, port, deadline, cancel)?;
        if matches!(self.url.scheme(), "rtsps" | "https") {
            self.wrap_tls(stream)
        } else {
            Ok(Socket::Tcp(stream))
        }
    }

    #[cfg(feature = "tls")]
    fn wrap_tls(&self, stream: TcpStream) -> Result<Socket> {
        let config = self
            .config
            .tls
            .clone()
            .ok_or(RtspError::Invalid("rtsps URL without a TLS config"))?;
        crate::transport::socket::wrap_tls(stream, &host_of(&self.url), config)
    }

    #[cfg(not(feature = "tls"))]
    fn wrap_tls(&self, _stream: TcpStream) -> Result<Socket> {
        Err(RtspError::Invalid("built without TLS support"))
    }
}

fn parse_cseq(message: &Message) -> Result<u64> {
    let value = message
        .header(names::CSEQ)
        .ok_or(RtspError::parse(ParseErrorKind::MissingCSeq))?;
    value
        .trim()
        .parse()
        .map_err(|_| RtspError::parse(ParseErrorKind::InvalidCSeq))
}

/// `atoi`-style: the digits at the start of `s`, if any.
fn leading_number(s: &str) -> Option<u64> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
    timeout
        .filter(|t| !t.is_zero())
        .map(|t| Instant::now() + t)
}

/// Host suitable for name resolution (IPv6 without brackets).
fn host_of(url: &Url) -> String {
    match url.host() {
        Some(url::Host::Ipv6(addr)) => addr.to_string(),
        Some(host) => host.to_string(),
        None => String::new(),
    }
}

/// Point `url` at `host`, which may be a bare IPv6 address.
fn set_host(url: &mut Url, host: &str) -> bool {
    match host.parse::<Ipv6Addr>() {
        Ok(addr) => url.set_ip_host(IpAddr::V6(addr)).is_ok(),
        Err(_) => url.set_host(Some(host)).is_ok(),
    }
}

fn default_port(scheme: &str) -> u16 {
    match scheme {
        "rtsps" => 322,
        "rtsph" | "http" => 80,
        "https" => 443,
        _ => 554,
    }
}
