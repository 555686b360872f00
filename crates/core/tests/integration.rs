//! Integration tests: a `Connection` or `Watch` on one side of a loopback
//! socket, a hand-driven peer on the other.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use base64::prelude::{BASE64_STANDARD, Engine as _};
use mio::{Events, Poll, Token};
use rtsp::protocol::names;
use rtsp::{
    Connection, Dispatch, Message, Method, MioReactor, Received, Request, Response, RtspError,
    Source, TunnelState, Watch, WatchHandle, WatchHandler,
};

const TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

/// Read up to and including the blank line ending a message head.
fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).expect("read head");
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

fn header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().find_map(|line| {
        let (n, v) = line.split_once(':')?;
        n.eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

fn client(listener: &TcpListener) -> Connection {
    let addr = listener.local_addr().unwrap();
    let mut conn = Connection::new(&format!("rtsp://{addr}/stream")).unwrap();
    conn.connect(TIMEOUT).unwrap();
    conn
}

fn expect_response(conn: &mut Connection) -> Response {
    match conn.receive(TIMEOUT).unwrap() {
        Received::Message(Message::Response(response)) => response,
        other => panic!("expected a response, got {other:?}"),
    }
}

#[test]
fn setup_captures_session_and_keepalive() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut conn = client(&listener);
    let (mut server, _) = listener.accept().unwrap();

    let setup = Request::new(Method::Setup, "rtsp://127.0.0.1/stream/track1")
        .add_header("Transport", "RTP/AVP/TCP;unicast;interleaved=0-1");
    conn.send(&Message::Request(setup), TIMEOUT).unwrap();
    let head = read_head(&mut server);
    assert!(head.starts_with("SETUP rtsp://127.0.0.1/stream/track1 RTSP/1.0\r\n"));
    assert_eq!(header(&head, "CSeq"), Some("1"));
    assert_eq!(header(&head, "Session"), None);

    server
        .write_all(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nSession: ABC123;timeout=30\r\n\r\n")
        .unwrap();
    let response = expect_response(&mut conn);
    assert_eq!(response.status_code, 200);
    assert_eq!(conn.session_id(), Some("ABC123"));
    assert_eq!(conn.timeout(), Duration::from_secs(30));
    let left = conn.next_timeout();
    assert!(left <= Duration::from_secs(25) && left > Duration::from_secs(23));

    // The session rides along on the next request.
    let play = Request::new(Method::Play, "rtsp://127.0.0.1/stream");
    conn.send(&Message::Request(play), TIMEOUT).unwrap();
    let head = read_head(&mut server);
    assert_eq!(header(&head, "CSeq"), Some("2"));
    assert_eq!(header(&head, "Session"), Some("ABC123"));
}

#[test]
fn interleaved_data_between_responses() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut conn = client(&listener);
    let (mut server, _) = listener.accept().unwrap();

    conn.send(&Message::Request(Request::new(Method::Options, "*")), TIMEOUT)
        .unwrap();
    read_head(&mut server);
    server
        .write_all(b"$\x01\x00\x03abcRTSP/1.0 200 OK\r\nCSeq: 1\r\nContent-Length: 2\r\n\r\nhi")
        .unwrap();

    let Received::Message(Message::Data(frame)) = conn.receive(TIMEOUT).unwrap() else {
        panic!("expected a data frame");
    };
    assert_eq!(frame.channel, 1);
    assert_eq!(frame.body, b"abc");
    assert_eq!(expect_response(&mut conn).body, b"hi");
}

#[test]
fn auth_challenges_and_lists_are_split() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut conn = client(&listener);
    let (mut server, _) = listener.accept().unwrap();

    conn.send(&Message::Request(Request::new(Method::Describe, "*")), TIMEOUT)
        .unwrap();
    read_head(&mut server);
    server
        .write_all(
            b"RTSP/1.0 401 Unauthorized\r\nCSeq: 1\r\n\
              WWW-Authenticate: Digest realm=\"cam\", nonce=\"n1\", Basic realm=\"cam\"\r\n\
              Cache-Control: no-cache, private\r\n\r\n",
        )
        .unwrap();
    let response = expect_response(&mut conn);
    let challenges: Vec<_> = response.headers.get_all(names::WWW_AUTHENTICATE).collect();
    assert_eq!(
        challenges,
        [r#"Digest realm="cam", nonce="n1""#, r#"Basic realm="cam""#]
    );
    let cache: Vec<_> = response.headers.get_all(names::CACHE_CONTROL).collect();
    assert_eq!(cache, ["no-cache", "private"]);
}

#[test]
fn tunneled_client_writes_base64() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut get, _) = listener.accept().unwrap();
        let get_head = read_head(&mut get);
        assert!(get_head.starts_with("GET /stream HTTP/1.0\r\n"));
        get.write_all(b"HTTP/1.0 200 OK\r\nContent-Type: application/x-rtsp-tunnelled\r\n\r\n")
            .unwrap();

        let (mut post, _) = listener.accept().unwrap();
        let post_head = read_head(&mut post);
        assert!(post_head.starts_with("POST /stream HTTP/1.0\r\n"));
        let cookie = header(&get_head, "x-sessioncookie").unwrap().to_string();
        assert_eq!(header(&post_head, "x-sessioncookie"), Some(cookie.as_str()));

        post.set_read_timeout(TIMEOUT).unwrap();
        let mut encoded = Vec::new();
        let mut buf = [0u8; 1024];
        let decoded = loop {
            let n = post.read(&mut buf).unwrap();
            assert!(n > 0, "POST closed early");
            encoded.extend_from_slice(&buf[..n]);
            if encoded.len() % 4 == 0
                && let Ok(decoded) = BASE64_STANDARD.decode(&encoded)
                && decoded.ends_with(b"\r\n\r\n")
            {
                break String::from_utf8(decoded).unwrap();
            }
        };
        assert!(decoded.starts_with("OPTIONS * RTSP/1.0\r\n"));
        assert_eq!(header(&decoded, "CSeq"), Some("1"));

        // Replies come back in the clear on the GET socket.
        get.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nPublic: OPTIONS\r\n\r\n")
            .unwrap();
        (get, post)
    });

    let mut conn = Connection::new(&format!("rtsph://{addr}/stream")).unwrap();
    conn.connect(TIMEOUT).unwrap();
    assert_eq!(conn.tunnel_state(), TunnelState::Complete);
    conn.send(&Message::Request(Request::new(Method::Options, "*")), TIMEOUT)
        .unwrap();
    let response = expect_response(&mut conn);
    assert_eq!(response.get_header("Public"), Some("OPTIONS"));
    let _sockets = server.join().unwrap();
}

#[test]
fn server_merges_tunnel_halves() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let mut get_peer = TcpStream::connect(addr).unwrap();
    let mut get = Connection::accept(&listener).unwrap();
    get_peer
        .write_all(b"GET /live HTTP/1.0\r\nx-sessioncookie: c00kie\r\n\r\n")
        .unwrap();
    assert!(matches!(get.receive(TIMEOUT).unwrap(), Received::TunnelGet(_)));
    let reply = read_head(&mut get_peer);
    assert!(reply.starts_with("HTTP/1.0 200 OK\r\n"));
    assert_eq!(header(&reply, "Cache-Control"), Some("no-store"));

    let mut post_peer = TcpStream::connect(addr).unwrap();
    let mut post = Connection::accept(&listener).unwrap();
    let mut bytes = b"POST /live HTTP/1.0\r\nx-sessioncookie: c00kie\r\n\r\n".to_vec();
    bytes.extend(
        BASE64_STANDARD
            .encode("DESCRIBE rtsp://h/live RTSP/1.0\r\nCSeq: 7\r\n\r\n")
            .as_bytes(),
    );
    post_peer.write_all(&bytes).unwrap();
    assert!(matches!(post.receive(TIMEOUT).unwrap(), Received::TunnelPost(_)));

    get.do_tunnel(post).unwrap();
    assert_eq!(get.tunnel_state(), TunnelState::Complete);
    let Received::Message(Message::Request(request)) = get.receive(TIMEOUT).unwrap() else {
        panic!("expected the tunneled DESCRIBE");
    };
    assert_eq!(request.method, Method::Describe);
    assert_eq!(request.cseq(), Some("7"));

    let response = Response::ok().add_header("CSeq", "7");
    get.send(&Message::Response(response), TIMEOUT).unwrap();
    let head = read_head(&mut get_peer);
    assert!(head.starts_with("RTSP/1.0 200 OK\r\n"));
}

#[test]
fn flush_interrupts_blocked_receive() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut conn = client(&listener);
    let _server = listener.accept().unwrap();

    let canceller = conn.canceller();
    let flusher = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        canceller.flush(true);
    });
    let started = Instant::now();
    assert!(matches!(conn.receive(None), Err(RtspError::Interrupted)));
    assert!(started.elapsed() < Duration::from_secs(5));
    flusher.join().unwrap();

    conn.flush(false);
    assert!(matches!(
        conn.receive(Some(Duration::from_millis(100))),
        Err(RtspError::Timeout)
    ));
}

struct Responder;

impl WatchHandler for Responder {
    fn message_received(&mut self, watch: &WatchHandle, message: Message) {
        let Message::Request(request) = message else {
            return;
        };
        let response = Response::ok()
            .add_header("CSeq", request.cseq().unwrap_or("0"))
            .add_header("Public", "OPTIONS, DESCRIBE");
        watch.send_message(&Message::Response(response)).unwrap();
    }
}

#[test]
fn watch_serves_client_over_mio() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let client = thread::spawn(move || {
        let mut conn = Connection::new(&format!("rtsp://{addr}/")).unwrap();
        conn.connect(TIMEOUT).unwrap();
        for _ in 0..3 {
            conn.send(&Message::Request(Request::new(Method::Options, "*")), TIMEOUT)
                .unwrap();
            let response = expect_response(&mut conn);
            let public: Vec<_> = response.headers.get_all("Public").collect();
            assert_eq!(public, ["OPTIONS", "DESCRIBE"]);
        }
        conn.close();
    });

    let mut poll = Poll::new().unwrap();
    let reactor = MioReactor::new(poll.registry(), Token(0), Token(1)).unwrap();
    let conn = Connection::accept(&listener).unwrap();
    let mut watch = Watch::new(conn, Box::new(reactor), Box::new(Responder)).unwrap();
    assert_eq!(watch.attach().unwrap(), Dispatch::Continue);

    let mut events = Events::with_capacity(8);
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut outcome = Dispatch::Continue;
    while outcome == Dispatch::Continue {
        assert!(Instant::now() < deadline, "watch did not finish");
        poll.poll(&mut events, Some(Duration::from_millis(100)))
            .unwrap();
        for event in events.iter() {
            let source = if event.token() == Token(0) {
                Source::Read
            } else {
                Source::Write
            };
            outcome = watch.dispatch(
                source,
                event.is_readable() || event.is_read_closed(),
                event.is_writable(),
            );
        }
    }
    assert_eq!(outcome, Dispatch::Stop);
    client.join().unwrap();
}
