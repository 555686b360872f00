use std::time::Duration;

use crate::protocol::Headers;

/// Session timeout assumed until the server advertises one.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP proxy fronting the server, used for tunneled connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
}

/// Client-side connection settings.
///
/// Server-side connections created with
/// [`Connection::accept`](crate::Connection::accept) use the defaults.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Carry RTSP over an HTTP GET/POST pair. Also implied by an
    /// `rtsph://` URL.
    pub tunneled: bool,
    pub proxy: Option<Proxy>,
    /// Largest accepted Content-Length; `None` accepts any size.
    pub content_length_limit: Option<u64>,
    /// Copy the `Session` id from responses into later requests.
    pub remember_session_id: bool,
    /// Keep connecting the POST channel to the original host even when the
    /// server names another one in `x-server-ip-address`.
    pub ignore_x_server_reply: bool,
    /// Added to the tunnel GET and POST, replacing same-named headers.
    pub extra_http_request_headers: Headers,
    /// Sent as `User-Agent` on the tunnel GET and POST.
    pub user_agent: Option<String>,
    pub session_timeout: Duration,
    /// Client TLS settings for `rtsps://` targets. Certificate policy is
    /// whatever the supplied config implements.
    #[cfg(feature = "tls")]
    pub tls: Option<std::sync::Arc<rustls::ClientConfig>>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            tunneled: false,
            proxy: None,
            content_length_limit: None,
            remember_session_id: true,
            ignore_x_server_reply: false,
            extra_http_request_headers: Headers::new(),
            user_agent: None,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            #[cfg(feature = "tls")]
            tls: None,
        }
    }
}
