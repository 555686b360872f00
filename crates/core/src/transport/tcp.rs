use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Instant;

use crate::error::{Result, RtspError};
use crate::protocol::ByteSource;

use super::POLL_INTERVAL;
use super::cancel::CancelToken;
use super::codec::Input;
use super::socket::Socket;

const READ_CHUNK: usize = 4096;

/// How an I/O primitive behaves when the socket has nothing to offer.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Wait<'a> {
    /// Return [`RtspError::WouldBlock`] immediately.
    NonBlocking,
    /// Keep polling until the deadline (`None` = forever) or cancellation.
    Blocking {
        deadline: Option<Instant>,
        cancel: &'a CancelToken,
    },
}

impl Wait<'_> {
    /// Checked at every would-block point.
    fn check(&self) -> Result<()> {
        if let Wait::Blocking { deadline, cancel } = self {
            if cancel.is_cancelled() {
                return Err(RtspError::Interrupted);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(RtspError::Timeout);
            }
        }
        Ok(())
    }

    fn would_block(&self) -> Result<()> {
        match self {
            Wait::NonBlocking => Err(RtspError::WouldBlock),
            Wait::Blocking { .. } => self.check(),
        }
    }
}

/// Resolve `host:port` and connect to the first address that answers.
///
/// Resolution and connect failures are [`RtspError::Net`]; running out
/// of time is [`RtspError::Timeout`]. The connect itself is non-blocking
/// and polled every [`POLL_INTERVAL`], so cancelling `cancel` interrupts
/// a pending attempt.
pub(crate) fn connect(
    host: &str,
    port: u16,
    deadline: Option<Instant>,
    cancel: &CancelToken,
) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(RtspError::Net)?
        .collect();
    if addrs.is_empty() {
        return Err(RtspError::Net(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {host}"),
        )));
    }

    let mut last_err = None;
    for addr in addrs {
        match connect_addr(addr, deadline, cancel) {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                tracing::debug!(%addr, "tcp connected");
                return Ok(stream);
            }
            Err(e @ (RtspError::Interrupted | RtspError::Timeout)) => return Err(e),
            Err(RtspError::Net(e)) if e.kind() == io::ErrorKind::TimedOut => {
                last_err = Some(RtspError::Timeout);
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "connect attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or(RtspError::Timeout))
}

/// One non-blocking connect attempt, handed back as a blocking std stream.
fn connect_addr(
    addr: SocketAddr,
    deadline: Option<Instant>,
    cancel: &CancelToken,
) -> Result<TcpStream> {
    let mut stream = mio::net::TcpStream::connect(addr).map_err(RtspError::Net)?;
    let mut poll = mio::Poll::new()?;
    poll.registry()
        .register(&mut stream, mio::Token(0), mio::Interest::WRITABLE)?;
    let mut events = mio::Events::with_capacity(1);

    loop {
        if cancel.is_cancelled() {
            return Err(RtspError::Interrupted);
        }
        let slice = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Err(RtspError::Timeout);
                }
                left.min(POLL_INTERVAL)
            }
            None => POLL_INTERVAL,
        };
        match poll.poll(&mut events, Some(slice)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
        if events.is_empty() {
            continue;
        }
        if let Some(e) = stream.take_error()? {
            return Err(RtspError::Net(e));
        }
        match stream.peer_addr() {
            Ok(_) => break,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotConnected | io::ErrorKind::WouldBlock
                ) => {}
            Err(e) => return Err(RtspError::Net(e)),
        }
    }

    poll.registry().deregister(&mut stream)?;
    let stream = into_std(stream);
    stream.set_nonblocking(false)?;
    Ok(stream)
}

#[cfg(unix)]
fn into_std(stream: mio::net::TcpStream) -> TcpStream {
    TcpStream::from(std::os::fd::OwnedFd::from(stream))
}

#[cfg(windows)]
fn into_std(stream: mio::net::TcpStream) -> TcpStream {
    TcpStream::from(std::os::windows::io::OwnedSocket::from(stream))
}

/// [`ByteSource`] over a connection's input buffer and read socket.
pub(crate) struct SocketReader<'a> {
    pub input: &'a mut Input,
    pub socket: &'a mut Socket,
    pub wait: Wait<'a>,
}

impl SocketReader<'_> {
    /// Read from the socket until the input buffer has something to offer.
    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            self.wait.check()?;
            match self.socket.read(&mut chunk) {
                Ok(0) => return Err(RtspError::Eof),
                Ok(n) => {
                    self.input.push(&chunk[..n])?;
                    if !self.input.is_empty() {
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => match RtspError::from_socket(e) {
                    RtspError::WouldBlock => self.wait.would_block()?,
                    other => return Err(other),
                },
            }
        }
    }
}

impl ByteSource for SocketReader<'_> {
    fn read_exact_from(&mut self, buf: &mut [u8], filled: &mut usize) -> Result<()> {
        while *filled < buf.len() {
            let n = self.input.take(&mut buf[*filled..]);
            if n == 0 {
                self.fill()?;
            }
            *filled += n;
        }
        Ok(())
    }
}

/// Write `data[*written..]`, advancing `*written` so a non-blocking or
/// interrupted write can resume from the exact byte offset.
pub(crate) fn write_all(
    socket: &mut Socket,
    data: &[u8],
    written: &mut usize,
    wait: Wait<'_>,
) -> Result<()> {
    while *written < data.len() {
        wait.check()?;
        match socket.write(&data[*written..]) {
            Ok(0) => return Err(RtspError::Eof),
            Ok(n) => *written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => match RtspError::from_socket(e) {
                RtspError::WouldBlock => wait.would_block()?,
                other => return Err(other),
            },
        }
    }
    loop {
        match socket.flush() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => match RtspError::from_socket(e) {
                RtspError::WouldBlock => wait.would_block()?,
                other => return Err(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Canceller;
    use std::net::TcpListener;
    use std::time::Duration;

    fn pair() -> (Socket, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (Socket::Tcp(client), server)
    }

    #[test]
    fn nonblocking_read_reports_would_block() {
        let (mut socket, _server) = pair();
        socket.set_nonblocking(true).unwrap();
        let mut input = Input::default();
        let mut reader = SocketReader {
            input: &mut input,
            socket: &mut socket,
            wait: Wait::NonBlocking,
        };
        assert!(matches!(reader.read_byte(), Err(RtspError::WouldBlock)));
    }

    #[test]
    fn blocking_read_times_out() {
        let (mut socket, _server) = pair();
        socket
            .tcp()
            .set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();
        let cancel = CancelToken::default();
        let mut input = Input::default();
        let mut reader = SocketReader {
            input: &mut input,
            socket: &mut socket,
            wait: Wait::Blocking {
                deadline: Some(Instant::now() + Duration::from_millis(50)),
                cancel: &cancel,
            },
        };
        assert!(matches!(reader.read_byte(), Err(RtspError::Timeout)));
    }

    #[test]
    fn cancelled_token_interrupts() {
        let (mut socket, _server) = pair();
        let canceller = Canceller::default();
        let token = canceller.token();
        canceller.flush(true);
        let mut written = 0;
        let err = write_all(
            &mut socket,
            b"data",
            &mut written,
            Wait::Blocking { deadline: None, cancel: &token },
        )
        .unwrap_err();
        assert!(matches!(err, RtspError::Interrupted));
        assert_eq!(written, 0);
    }

    #[test]
    fn connect_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let cancel = CancelToken::default();
        let stream = connect("127.0.0.1", port, None, &cancel).unwrap();
        let (_server, peer) = listener.accept().unwrap();
        assert_eq!(stream.local_addr().unwrap(), peer);
    }

    #[test]
    fn connect_with_cancelled_token() {
        let canceller = Canceller::default();
        let token = canceller.token();
        canceller.flush(true);
        let err = connect("127.0.0.1", 9, None, &token).unwrap_err();
        assert!(matches!(err, RtspError::Interrupted));
    }

    #[test]
    fn flush_interrupts_pending_connect() {
        let canceller = Canceller::default();
        let token = canceller.token();
        let started = Instant::now();
        let result = std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(Duration::from_millis(100));
                canceller.flush(true);
            });
            // Unroutable: the SYN goes nowhere, so only the flush ends the
            // attempt. Hosts without a route fail fast instead.
            connect("10.255.255.1", 554, None, &token)
        });
        assert!(started.elapsed() < Duration::from_secs(5));
        if let Err(e) = &result {
            assert!(matches!(e, RtspError::Interrupted | RtspError::Net(_)), "{e}");
        }
    }

    #[test]
    fn reads_what_peer_wrote() {
        let (mut socket, mut server) = pair();
        server.write_all(b"xyz").unwrap();
        drop(server);
        let cancel = CancelToken::default();
        let mut input = Input::default();
        let mut reader = SocketReader {
            input: &mut input,
            socket: &mut socket,
            wait: Wait::Blocking { deadline: None, cancel: &cancel },
        };
        let mut buf = [0u8; 3];
        let mut filled = 0;
        reader.read_exact_from(&mut buf, &mut filled).unwrap();
        assert_eq!(&buf, b"xyz");
        assert!(matches!(reader.read_byte(), Err(RtspError::Eof)));
    }
}
