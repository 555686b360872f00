use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use rtsp::protocol::names;
use rtsp::{
    AuthMethod, Connection, ConnectionConfig, Message, Method, Proxy, Received, Request, Response,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rtsp-probe",
    about = "Query an RTSP server with OPTIONS (and optionally DESCRIBE)"
)]
struct Args {
    /// rtsp://, rtsps:// or rtsph:// URL
    url: String,

    /// Tunnel RTSP over HTTP
    #[arg(long)]
    tunnel: bool,

    /// HTTP proxy for tunneling (host:port)
    #[arg(long)]
    proxy: Option<String>,

    #[arg(long, short)]
    user: Option<String>,

    #[arg(long, short, default_value = "")]
    password: String,

    /// Use Digest instead of Basic authentication
    #[arg(long)]
    digest: bool,

    /// Also send DESCRIBE and print the SDP
    #[arg(long)]
    describe: bool,

    /// Per-operation timeout in seconds (0 waits forever)
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    #[arg(long)]
    user_agent: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "probe failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ConnectionConfig {
        tunneled: args.tunnel,
        user_agent: args.user_agent.clone(),
        ..ConnectionConfig::default()
    };
    if let Some(proxy) = &args.proxy {
        let (host, port) = proxy
            .rsplit_once(':')
            .ok_or("proxy must be host:port")?;
        config.proxy = Some(Proxy {
            host: host.to_string(),
            port: port.parse()?,
        });
    }

    let timeout = Some(Duration::from_secs(args.timeout));
    let mut conn = Connection::with_config(&args.url, config)?;
    if let Some(user) = &args.user {
        let method = if args.digest {
            AuthMethod::Digest
        } else {
            AuthMethod::Basic
        };
        conn.set_auth(method, user, &args.password)?;
    }
    conn.connect(timeout)?;
    if let Some(ip) = conn.ip() {
        println!("connected to {ip}");
    }

    let url = conn.url().to_string();
    let response = request(&mut conn, Method::Options, &url, timeout)?;
    print_response(&response);

    if args.describe {
        let response = request(&mut conn, Method::Describe, &url, timeout)?;
        print_response(&response);
    }

    conn.close();
    Ok(())
}

/// Send one request and wait for its response, answering a single
/// authentication challenge.
fn request(
    conn: &mut Connection,
    method: Method,
    url: &str,
    timeout: Option<Duration>,
) -> Result<Response, Box<dyn std::error::Error>> {
    let mut retried = false;
    loop {
        let mut req = Request::new(method, url);
        if method == Method::Describe {
            req = req.add_header(names::ACCEPT, "application/sdp");
        }
        conn.send(&Message::Request(req), timeout)?;
        let response = read_response(conn, timeout)?;
        if response.status_code != 401 || retried {
            return Ok(response);
        }
        let Some(challenge) = response.get_header(names::WWW_AUTHENTICATE) else {
            return Ok(response);
        };
        for (name, value) in challenge_params(challenge) {
            conn.set_auth_param(&name, Some(&value));
        }
        retried = true;
    }
}

fn read_response(
    conn: &mut Connection,
    timeout: Option<Duration>,
) -> Result<Response, Box<dyn std::error::Error>> {
    loop {
        match conn.receive(timeout)? {
            Received::Message(Message::Response(response)) => return Ok(response),
            Received::Message(other) => tracing::debug!(%other, "skipping"),
            Received::TunnelGet(_) | Received::TunnelPost(_) => {
                return Err("unexpected tunnel request from server".into());
            }
        }
    }
}

/// `name=value` pairs of a challenge such as
/// `Digest realm="x", nonce="y"`, with quotes removed.
fn challenge_params(challenge: &str) -> Vec<(String, String)> {
    let params = challenge
        .split_once(' ')
        .map(|(_, rest)| rest)
        .unwrap_or("");
    let mut out = Vec::new();
    let mut rest = params;
    while let Some((name, after)) = rest.split_once('=') {
        let name = name.trim_start_matches([',', ' ']).trim();
        let (value, tail) = match after.strip_prefix('"') {
            Some(quoted) => match quoted.split_once('"') {
                Some((value, tail)) => (value, tail),
                None => (quoted, ""),
            },
            None => after.split_once(',').unwrap_or((after, "")),
        };
        out.push((name.to_string(), value.trim().to_string()));
        rest = tail;
    }
    out
}

fn print_response(response: &Response) {
    println!(
        "RTSP/{} {} {}",
        response.version, response.status_code, response.reason
    );
    for (name, value) in response.headers.iter() {
        println!("{name}: {value}");
    }
    if !response.body.is_empty() {
        println!();
        println!("{}", String::from_utf8_lossy(&response.body));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_challenge_params() {
        let params = challenge_params(r#"Digest realm="cam, front", nonce="abc", stale=FALSE"#);
        assert_eq!(
            params,
            [
                ("realm".to_string(), "cam, front".to_string()),
                ("nonce".to_string(), "abc".to_string()),
                ("stale".to_string(), "FALSE".to_string()),
            ]
        );
    }
}
