use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use parking_lot::Mutex;

use super::POLL_INTERVAL;

/// A connected stream: plain TCP, or TLS over TCP with the `tls` feature.
#[derive(Debug)]
pub enum Socket {
    Tcp(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<rustls::StreamOwned<rustls::ClientConnection, TcpStream>>),
}

impl Socket {
    /// The underlying TCP stream.
    pub fn tcp(&self) -> &TcpStream {
        match self {
            Self::Tcp(stream) => stream,
            #[cfg(feature = "tls")]
            Self::Tls(stream) => stream.get_ref(),
        }
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.tcp().peer_addr()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp().local_addr()
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.tcp().set_nonblocking(nonblocking)
    }

    pub fn shutdown(&self) {
        let _ = self.tcp().shutdown(Shutdown::Both);
    }

    fn set_timeout(&self, side: Side, timeout: Option<Duration>) -> io::Result<()> {
        match side {
            Side::Read => self.tcp().set_read_timeout(timeout),
            Side::Write => self.tcp().set_write_timeout(timeout),
        }
    }
}

impl Read for Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for Socket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => stream.flush(),
        }
    }
}

#[cfg(unix)]
impl std::os::fd::AsRawFd for Socket {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.tcp().as_raw_fd()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Read,
    Write,
}

/// Tracks which direction currently has the poll timeout applied.
///
/// A blocking call arms the timeout on its socket for its own duration
/// and clears it afterwards. Read and write may use two different sockets
/// (tunneled mode), so each side is armed and cleared independently under
/// one lock.
#[derive(Debug, Default)]
pub(crate) struct SocketTimeouts {
    armed: Mutex<[bool; 2]>,
}

impl SocketTimeouts {
    pub fn arm(&self, socket: &Socket, side: Side) -> io::Result<()> {
        let mut armed = self.armed.lock();
        socket.set_timeout(side, Some(POLL_INTERVAL))?;
        armed[side as usize] = true;
        Ok(())
    }

    pub fn disarm(&self, socket: &Socket, side: Side) {
        let mut armed = self.armed.lock();
        if armed[side as usize] {
            let _ = socket.set_timeout(side, None);
            armed[side as usize] = false;
        }
    }
}

#[cfg(feature = "tls")]
pub(crate) fn wrap_tls(
    stream: TcpStream,
    host: &str,
    config: std::sync::Arc<rustls::ClientConfig>,
) -> crate::Result<Socket> {
    let name = rustls::pki_types::ServerName::try_from(host.to_owned())
        .map_err(|_| crate::RtspError::Invalid("invalid TLS server name"))?;
    let conn = rustls::ClientConnection::new(config, name)
        .map_err(|e| crate::RtspError::Io(io::Error::other(e)))?;
    Ok(Socket::Tls(Box::new(rustls::StreamOwned::new(conn, stream))))
}
