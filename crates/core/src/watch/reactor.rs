use std::io;

use crate::transport::Socket;

/// Which of a connection's sockets a registration is for.
///
/// A direct connection only ever uses [`Source::Read`], with write
/// interest added while data is queued. A tunneled connection registers
/// its read socket under `Read` and its write socket under `Write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Read = 0,
    Write = 1,
}

/// Readiness a watch wants to hear about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
}

impl Interest {
    pub const READABLE: Self = Self {
        readable: true,
        writable: false,
    };

    pub fn is_empty(self) -> bool {
        !self.readable && !self.writable
    }
}

/// Registration side of the event loop that drives a
/// [`Watch`](super::Watch).
///
/// Implementations must tolerate repeated calls with an unchanged
/// interest and a socket replaced under the same source (after a tunnel
/// merge). Calls may come from any thread that queues data.
pub trait Reactor: Send + Sync {
    /// Register `socket` under `source`, or update its interest. An empty
    /// interest removes the registration.
    fn set_interest(&self, source: Source, socket: &Socket, interest: Interest) -> io::Result<()>;

    /// Drop the registration for `source`, if any.
    fn remove(&self, source: Source) -> io::Result<()>;
}

#[cfg(unix)]
pub use mio_reactor::MioReactor;

#[cfg(unix)]
mod mio_reactor {
    use std::io;
    use std::os::fd::{AsRawFd, RawFd};

    use mio::unix::SourceFd;
    use mio::{Registry, Token};
    use parking_lot::Mutex;

    use super::{Interest, Reactor, Source};
    use crate::transport::Socket;

    /// [`Reactor`] backed by a `mio` [`Registry`].
    ///
    /// The owner polls, maps each event's token back with
    /// [`source`](Self::source) and passes it to
    /// [`Watch::dispatch`](crate::Watch::dispatch). `mio` is
    /// edge-triggered; the watch drains sockets until they would block.
    #[derive(Debug)]
    pub struct MioReactor {
        registry: Registry,
        tokens: [Token; 2],
        registered: Mutex<[Option<(RawFd, Interest)>; 2]>,
    }

    impl MioReactor {
        pub fn new(registry: &Registry, read: Token, write: Token) -> io::Result<Self> {
            Ok(Self {
                registry: registry.try_clone()?,
                tokens: [read, write],
                registered: Mutex::new([None, None]),
            })
        }

        pub fn source(&self, token: Token) -> Option<Source> {
            match token {
                t if t == self.tokens[Source::Read as usize] => Some(Source::Read),
                t if t == self.tokens[Source::Write as usize] => Some(Source::Write),
                _ => None,
            }
        }
    }

    fn to_mio(interest: Interest) -> Option<mio::Interest> {
        match (interest.readable, interest.writable) {
            (true, true) => Some(mio::Interest::READABLE | mio::Interest::WRITABLE),
            (true, false) => Some(mio::Interest::READABLE),
            (false, true) => Some(mio::Interest::WRITABLE),
            (false, false) => None,
        }
    }

    impl Reactor for MioReactor {
        fn set_interest(
            &self,
            source: Source,
            socket: &Socket,
            interest: Interest,
        ) -> io::Result<()> {
            let Some(wanted) = to_mio(interest) else {
                return self.remove(source);
            };
            let fd = socket.as_raw_fd();
            let token = self.tokens[source as usize];
            let mut registered = self.registered.lock();
            let slot = &mut registered[source as usize];
            match *slot {
                Some((old_fd, old)) if old_fd == fd && old == interest => return Ok(()),
                Some((old_fd, _)) if old_fd == fd => {
                    self.registry
                        .reregister(&mut SourceFd(&fd), token, wanted)?;
                }
                Some((old_fd, _)) => {
                    // The old socket may already be closed.
                    let _ = self.registry.deregister(&mut SourceFd(&old_fd));
                    self.registry.register(&mut SourceFd(&fd), token, wanted)?;
                }
                None => self.registry.register(&mut SourceFd(&fd), token, wanted)?,
            }
            *slot = Some((fd, interest));
            tracing::trace!(?source, fd, ?interest, "interest updated");
            Ok(())
        }

        fn remove(&self, source: Source) -> io::Result<()> {
            if let Some((fd, _)) = self.registered.lock()[source as usize].take() {
                let _ = self.registry.deregister(&mut SourceFd(&fd));
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use mio::{Events, Poll};
        use std::io::Write;
        use std::net::{TcpListener, TcpStream};
        use std::time::Duration;

        #[test]
        fn registers_and_reports_readiness() {
            let mut poll = Poll::new().unwrap();
            let reactor = MioReactor::new(poll.registry(), Token(1), Token(2)).unwrap();
            assert_eq!(reactor.source(Token(2)), Some(Source::Write));
            assert_eq!(reactor.source(Token(9)), None);

            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let mut peer = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
            let (stream, _) = listener.accept().unwrap();
            stream.set_nonblocking(true).unwrap();
            let socket = Socket::Tcp(stream);

            reactor
                .set_interest(Source::Read, &socket, Interest::READABLE)
                .unwrap();
            // Unchanged interest is a no-op.
            reactor
                .set_interest(Source::Read, &socket, Interest::READABLE)
                .unwrap();
            peer.write_all(b"x").unwrap();

            let mut events = Events::with_capacity(4);
            poll.poll(&mut events, Some(Duration::from_secs(5))).unwrap();
            let event = events.iter().next().unwrap();
            assert_eq!(reactor.source(event.token()), Some(Source::Read));
            assert!(event.is_readable());

            reactor
                .set_interest(Source::Read, &socket, Interest::default())
                .unwrap();
            assert!(reactor.registered.lock()[0].is_none());
        }
    }
}
