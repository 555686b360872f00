//! Readiness-driven adapter around a [`Connection`].
//!
//! A [`Watch`] owns a connection switched to non-blocking mode. The event
//! loop registers its sockets through a [`Reactor`] and feeds readiness
//! back with [`Watch::dispatch`]; complete messages and other events are
//! delivered to a [`WatchHandler`].
//!
//! Outbound data is written straight away when the queue is empty and
//! otherwise queued, bounded by a byte and a message backlog limit:
//!
//! ```text
//!  WatchHandle::send_message ──► serialize ──► queue empty? ── write now
//!                                                  │ no / would block
//!                                                  ▼
//!                                      backlog (FIFO, per-record cursor)
//!                                                  │ writable
//!                                                  ▼
//!                                  drain ──► WatchHandler::message_sent(id)
//! ```
//!
//! [`WatchHandle`] is cheap to clone and may queue messages from any
//! thread; [`WatchHandle::wait_backlog`] blocks a producer until there is
//! room again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::connection::{Channel, Connection, Received, TunnelState};
use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::{Completed, Message, Request, Response};
use crate::transport::tcp::Wait;

mod backlog;
mod reactor;

use backlog::Backlog;

#[cfg(unix)]
pub use reactor::MioReactor;
pub use reactor::{Interest, Reactor, Source};

/// Backlog limits. 0 means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchConfig {
    pub max_bytes: usize,
    pub max_messages: usize,
}

/// Callbacks for connection events. Every method has a no-op default.
///
/// Callbacks run on the thread calling [`Watch::dispatch`] with no lock
/// held, so they may send through the handle they are given.
pub trait WatchHandler: Send {
    fn message_received(&mut self, _watch: &WatchHandle, _message: Message) {}

    /// A queued batch with this id has been written completely.
    fn message_sent(&mut self, _watch: &WatchHandle, _id: u32) {}

    /// The peer closed the connection or the watch stopped on an error.
    fn closed(&mut self, _watch: &WatchHandle) {}

    /// `message` is set for malformed input, `id` for queued batches lost
    /// to a write failure (0 otherwise).
    fn error(
        &mut self,
        _watch: &WatchHandle,
        _error: &RtspError,
        _message: Option<&Message>,
        _id: u32,
    ) {
    }

    /// A tunnel GET arrived. The returned status code is sent back; 200
    /// accepts the tunnel.
    fn tunnel_start(&mut self, _watch: &WatchHandle) -> u16 {
        200
    }

    /// Last chance to adjust the reply to a tunnel GET.
    fn tunnel_http_response(
        &mut self,
        _watch: &WatchHandle,
        _request: &Request,
        _response: &mut Response,
    ) {
    }

    /// A tunnel POST arrived. [`Watch::dispatch`] returns
    /// [`Dispatch::TunnelPost`] right after this; the owner should pass
    /// [`Watch::into_connection`] to the GET side's [`Watch::do_tunnel`].
    fn tunnel_complete(&mut self, _watch: &WatchHandle) {}

    /// The POST half of a tunnel closed. The watch keeps the GET half and
    /// accepts a new POST.
    fn tunnel_lost(&mut self, _watch: &WatchHandle) {}
}

/// What the owner should do after [`Watch::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Continue,
    /// The watch is finished; its registrations are gone.
    Stop,
    /// This connection is the POST half of a tunnel; hand it over.
    TunnelPost,
}

struct State {
    conn: Option<Connection>,
    backlog: Backlog,
    flushing: bool,
    /// The read half of a tunnel is gone; only watch the GET socket for
    /// closure.
    control_only: bool,
    /// The watch stopped; sends and backlog waits fail.
    stopped: bool,
}

struct Shared {
    state: Mutex<State>,
    space: Condvar,
    reactor: Box<dyn Reactor>,
}

impl Shared {
    /// Bring the reactor registrations in line with the connection's
    /// sockets and the queue.
    fn sync_interest(&self, state: &State) -> Result<()> {
        let writable = !state.backlog.is_empty();
        match state.conn.as_ref().map(Connection::channel) {
            None | Some(Channel::Detached) => self.remove_all()?,
            Some(Channel::Direct(socket)) => {
                self.reactor.remove(Source::Write)?;
                self.reactor.set_interest(
                    Source::Read,
                    socket,
                    Interest {
                        readable: true,
                        writable,
                    },
                )?;
            }
            Some(Channel::Tunneled { read, write }) => {
                self.reactor
                    .set_interest(Source::Read, read, Interest::READABLE)?;
                self.reactor.set_interest(
                    Source::Write,
                    write,
                    Interest {
                        readable: true,
                        writable,
                    },
                )?;
            }
        }
        Ok(())
    }

    fn remove_all(&self) -> Result<()> {
        self.reactor.remove(Source::Read)?;
        self.reactor.remove(Source::Write)?;
        Ok(())
    }

    /// Mark the watch stopped and wake every backlog waiter.
    fn shut(&self) {
        self.state.lock().stopped = true;
        self.space.notify_all();
        if let Err(e) = self.remove_all() {
            tracing::debug!(error = %e, "deregistering stopped watch failed");
        }
    }

    /// Write `data` now if nothing is queued, queue the rest.
    ///
    /// Returns 0 when everything went out immediately, otherwise the id
    /// later passed to [`WatchHandler::message_sent`].
    fn enqueue(&self, state: &mut State, data: Vec<u8>) -> Result<u32> {
        if state.stopped {
            return Err(RtspError::Invalid("watch stopped"));
        }
        let conn = state
            .conn
            .as_mut()
            .ok_or(RtspError::Invalid("watch has no connection"))?;
        let mut written = 0;
        if state.backlog.is_empty() {
            match conn.try_write(&data, &mut written) {
                Ok(()) => return Ok(0),
                Err(RtspError::WouldBlock) => {}
                Err(e) => return Err(e),
            }
        }
        let id = state.backlog.push(data, written)?;
        tracing::trace!(
            id,
            bytes = state.backlog.bytes(),
            records = state.backlog.len(),
            "data queued"
        );
        self.sync_interest(state)?;
        Ok(id)
    }
}

/// Thread-safe handle for queueing data on a [`Watch`] and tuning its
/// backlog.
#[derive(Clone)]
pub struct WatchHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle").finish_non_exhaustive()
    }
}

impl WatchHandle {
    pub fn send_message(&self, message: &Message) -> Result<u32> {
        self.send_messages(std::slice::from_ref(message))
    }

    /// Queue several messages as one batch; the sent callback fires once,
    /// after the last of them is written.
    pub fn send_messages(&self, messages: &[Message]) -> Result<u32> {
        let mut state = self.shared.state.lock();
        if state.flushing {
            return Err(RtspError::Interrupted);
        }
        let conn = state
            .conn
            .as_mut()
            .ok_or(RtspError::Invalid("watch has no connection"))?;
        let mut data = Vec::new();
        for message in messages {
            data.extend(conn.serialize(message)?);
        }
        self.shared.enqueue(&mut state, data)
    }

    /// Queue already serialized bytes.
    pub fn write_data(&self, data: Vec<u8>) -> Result<u32> {
        let mut state = self.shared.state.lock();
        if state.flushing {
            return Err(RtspError::Interrupted);
        }
        self.shared.enqueue(&mut state, data)
    }

    /// Set the backlog limits; 0 lifts a limit.
    pub fn set_send_backlog(&self, max_bytes: usize, max_messages: usize) {
        let mut state = self.shared.state.lock();
        state.backlog.set_limits(max_bytes, max_messages);
        if !state.backlog.is_full() {
            self.shared.space.notify_all();
        }
        tracing::debug!(max_bytes, max_messages, "send backlog limits set");
    }

    /// `(max_bytes, max_messages)`.
    pub fn get_send_backlog(&self) -> (usize, usize) {
        self.shared.state.lock().backlog.limits()
    }

    /// While flushing, queued data is dropped (without sent callbacks),
    /// new sends fail with [`RtspError::Interrupted`] and
    /// [`wait_backlog`](Self::wait_backlog) returns the same.
    pub fn set_flushing(&self, flushing: bool) {
        let mut state = self.shared.state.lock();
        state.flushing = flushing;
        if flushing {
            state.backlog.clear();
            if let Err(e) = self.shared.sync_interest(&state) {
                tracing::debug!(error = %e, "interest update while flushing failed");
            }
        }
        self.shared.space.notify_all();
    }

    /// Block until the backlog has room.
    ///
    /// `None` or a zero timeout waits forever. Fails with
    /// [`RtspError::Timeout`], with [`RtspError::Interrupted`] when the
    /// watch is flushing, or with [`RtspError::Invalid`] once it stopped.
    pub fn wait_backlog(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout
            .filter(|t| !t.is_zero())
            .map(|t| Instant::now() + t);
        let mut state = self.shared.state.lock();
        loop {
            if state.flushing {
                return Err(RtspError::Interrupted);
            }
            if state.stopped {
                return Err(RtspError::Invalid("watch stopped"));
            }
            if !state.backlog.is_full() {
                return Ok(());
            }
            match deadline {
                Some(deadline) => {
                    if self
                        .shared
                        .space
                        .wait_until(&mut state, deadline)
                        .timed_out()
                        && !state.flushing
                        && !state.stopped
                        && state.backlog.is_full()
                    {
                        return Err(RtspError::Timeout);
                    }
                }
                None => self.shared.space.wait(&mut state),
            }
        }
    }

    /// Run `f` on the watched connection.
    pub fn with_connection<R>(&self, f: impl FnOnce(&mut Connection) -> R) -> Result<R> {
        let mut state = self.shared.state.lock();
        let conn = state
            .conn
            .as_mut()
            .ok_or(RtspError::Invalid("watch has no connection"))?;
        Ok(f(conn))
    }
}

enum ReadEvent {
    Pending,
    Message(Message),
    TunnelGet(Request),
    TunnelPost,
    TunnelLost,
    Closed,
    Failed(RtspError, Option<Message>),
}

/// Drives one [`Connection`] from readiness events.
pub struct Watch {
    shared: Arc<Shared>,
    handle: WatchHandle,
    handler: Box<dyn WatchHandler>,
    stopped: bool,
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch")
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl Watch {
    pub fn new(
        conn: Connection,
        reactor: Box<dyn Reactor>,
        handler: Box<dyn WatchHandler>,
    ) -> Result<Self> {
        Self::with_config(conn, reactor, handler, WatchConfig::default())
    }

    pub fn with_config(
        conn: Connection,
        reactor: Box<dyn Reactor>,
        handler: Box<dyn WatchHandler>,
        config: WatchConfig,
    ) -> Result<Self> {
        conn.set_nonblocking(true)?;
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                conn: Some(conn),
                backlog: Backlog::with_limits(config.max_bytes, config.max_messages),
                flushing: false,
                control_only: false,
                stopped: false,
            }),
            space: Condvar::new(),
            reactor,
        });
        let handle = WatchHandle {
            shared: Arc::clone(&shared),
        };
        Ok(Self {
            shared,
            handle,
            handler,
            stopped: false,
        })
    }

    /// Register with the reactor and parse anything already buffered
    /// (such as a connection's initial buffer).
    pub fn attach(&mut self) -> Result<Dispatch> {
        self.shared.sync_interest(&self.shared.state.lock())?;
        Ok(self.on_readable())
    }

    pub fn handle(&self) -> WatchHandle {
        self.handle.clone()
    }

    /// Handle readiness reported for `source`.
    pub fn dispatch(&mut self, source: Source, readable: bool, writable: bool) -> Dispatch {
        if self.stopped {
            return Dispatch::Stop;
        }
        if writable {
            let next = self.on_writable();
            if next != Dispatch::Continue {
                return next;
            }
        }
        if readable {
            let control = source == Source::Write || self.shared.state.lock().control_only;
            return if control {
                self.on_control_readable()
            } else {
                self.on_readable()
            };
        }
        Dispatch::Continue
    }

    /// Re-register after the connection's sockets changed.
    pub fn reset(&mut self) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.control_only = false;
        self.shared.remove_all()?;
        self.shared.sync_interest(&state)
    }

    /// Merge the POST half `post` into this watch's GET connection (see
    /// [`Connection::do_tunnel`]) and start reading the tunnel.
    pub fn do_tunnel(&mut self, post: Connection) -> Result<Dispatch> {
        {
            let mut state = self.shared.state.lock();
            let conn = state
                .conn
                .as_mut()
                .ok_or(RtspError::Invalid("watch has no connection"))?;
            conn.do_tunnel(post)?;
            conn.set_nonblocking(true)?;
        }
        self.reset()?;
        Ok(self.on_readable())
    }

    /// Stop watching and take the connection back, in blocking mode.
    pub fn into_connection(self) -> Result<Connection> {
        let mut state = self.shared.state.lock();
        self.shared.remove_all()?;
        let conn = state
            .conn
            .take()
            .ok_or(RtspError::Invalid("watch has no connection"))?;
        conn.set_nonblocking(false)?;
        Ok(conn)
    }

    fn read_step(&self) -> ReadEvent {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let Some(conn) = state.conn.as_mut() else {
            return ReadEvent::Closed;
        };
        match conn.next_message(Wait::NonBlocking) {
            Err(RtspError::WouldBlock) => ReadEvent::Pending,
            Err(RtspError::Eof) if conn.tunnel_state() == TunnelState::Complete => {
                conn.lose_tunnel();
                state.control_only = true;
                match self.shared.sync_interest(state) {
                    Ok(()) => ReadEvent::TunnelLost,
                    Err(e) => ReadEvent::Failed(e, None),
                }
            }
            Err(RtspError::Eof) => ReadEvent::Closed,
            Err(e) => ReadEvent::Failed(e, None),
            Ok(Completed {
                message,
                status: Err(e),
            }) => ReadEvent::Failed(e, message),
            Ok(Completed {
                message: None,
                status: Ok(()),
            }) => ReadEvent::Failed(RtspError::parse(ParseErrorKind::InvalidRequestLine), None),
            Ok(Completed {
                message: Some(message),
                status: Ok(()),
            }) => match conn.intercept(message) {
                Ok(Received::Message(message)) => ReadEvent::Message(message),
                Ok(Received::TunnelGet(request)) => ReadEvent::TunnelGet(request),
                Ok(Received::TunnelPost(_)) => ReadEvent::TunnelPost,
                Err(e) => ReadEvent::Failed(e, None),
            },
        }
    }

    fn on_readable(&mut self) -> Dispatch {
        loop {
            match self.read_step() {
                ReadEvent::Pending => return Dispatch::Continue,
                ReadEvent::Message(message) => {
                    self.handler.message_received(&self.handle, message);
                }
                ReadEvent::TunnelGet(request) => self.answer_tunnel_get(&request),
                ReadEvent::TunnelPost => {
                    self.handler.tunnel_complete(&self.handle);
                    return Dispatch::TunnelPost;
                }
                ReadEvent::TunnelLost => {
                    tracing::info!("tunnel POST channel closed");
                    self.handler.tunnel_lost(&self.handle);
                    return Dispatch::Continue;
                }
                ReadEvent::Closed => return self.stop(),
                ReadEvent::Failed(e, message) => {
                    tracing::warn!(error = %e, "read failed, stopping watch");
                    self.handler.error(&self.handle, &e, message.as_ref(), 0);
                    return self.stop();
                }
            }
        }
    }

    fn answer_tunnel_get(&mut self, request: &Request) {
        let code = self.handler.tunnel_start(&self.handle);
        let reply = self
            .handle
            .with_connection(|conn| conn.gen_tunnel_reply(code, request));
        let mut reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                self.handler.error(&self.handle, &e, None, 0);
                return;
            }
        };
        self.handler
            .tunnel_http_response(&self.handle, request, &mut reply);
        if let Err(e) = self.handle.send_message(&Message::HttpResponse(reply)) {
            self.handler.error(&self.handle, &e, None, 0);
        }
    }

    fn on_writable(&mut self) -> Dispatch {
        let (sent, failure) = {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            let Some(conn) = state.conn.as_mut() else {
                return Dispatch::Continue;
            };
            let (sent, res) = state
                .backlog
                .drain(|data, written| conn.try_write(data, written));
            let failure = match res {
                Ok(()) => self.shared.sync_interest(state).err().map(|e| (e, Vec::new())),
                Err(e) => Some((e, state.backlog.ids())),
            };
            if !state.backlog.is_full() {
                self.shared.space.notify_all();
            }
            (sent, failure)
        };

        for id in sent {
            self.handler.message_sent(&self.handle, id);
        }
        match failure {
            None => Dispatch::Continue,
            Some((e, ids)) => {
                tracing::warn!(error = %e, pending = ids.len(), "write failed, stopping watch");
                for id in ids {
                    self.handler.error(&self.handle, &e, None, id);
                }
                self.stop()
            }
        }
    }

    fn on_control_readable(&mut self) -> Dispatch {
        let res = self.handle.with_connection(Connection::read_control);
        match res.and_then(|r| r) {
            Ok(()) => Dispatch::Continue,
            Err(RtspError::Eof) => {
                tracing::debug!("tunnel GET channel closed");
                self.stop()
            }
            Err(e) => {
                self.handler.error(&self.handle, &e, None, 0);
                self.stop()
            }
        }
    }

    fn stop(&mut self) -> Dispatch {
        self.stopped = true;
        self.shared.shut();
        self.handler.closed(&self.handle);
        Dispatch::Stop
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.shared.shut();
    }
}
