pub mod auth;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod watch;

pub use auth::AuthMethod;
pub use connection::{
    Connection, ConnectionConfig, DEFAULT_SESSION_TIMEOUT, Proxy, Received, TunnelState,
};
pub use error::{ParseErrorKind, Result, ResultCode, RtspError};
pub use protocol::{DataFrame, Headers, Message, Method, Request, Response, Version};
pub use transport::Canceller;
#[cfg(unix)]
pub use watch::MioReactor;
pub use watch::{Dispatch, Interest, Reactor, Source, Watch, WatchConfig, WatchHandle, WatchHandler};
