//! Client credentials and `Authorization` header generation.
//!
//! Basic (RFC 2617 §2) sends `base64(user:pass)`. Digest (RFC 2617 §3)
//! answers a server challenge: the `realm` and `nonce` parameters must have
//! been copied from the `WWW-Authenticate` header with
//! [`Connection::set_auth_param`](crate::Connection::set_auth_param) before
//! the next request is sent.

use std::collections::HashMap;

use base64::prelude::{BASE64_STANDARD, Engine as _};
use md5::{Digest, Md5};

use crate::error::{Result, RtspError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMethod {
    #[default]
    None,
    Basic,
    Digest,
}

/// Username, password and digest challenge parameters for one connection.
#[derive(Debug, Clone, Default)]
pub(crate) struct Credentials {
    method: AuthMethod,
    username: String,
    password: String,
    /// Challenge parameters, keyed by lowercased name.
    params: HashMap<String, String>,
}

impl Credentials {
    pub fn set(&mut self, method: AuthMethod, username: &str, password: &str) -> Result<()> {
        if method != AuthMethod::None && username.contains(':') {
            return Err(RtspError::Invalid("user name must not contain ':'"));
        }
        self.method = method;
        self.username = username.to_string();
        self.password = password.to_string();
        Ok(())
    }

    /// Set (`Some`) or remove (`None`) a challenge parameter.
    pub fn set_param(&mut self, name: &str, value: Option<&str>) {
        let key = name.to_ascii_lowercase();
        match value {
            Some(value) => {
                self.params.insert(key, value.to_string());
            }
            None => {
                self.params.remove(&key);
            }
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn clear_params(&mut self) {
        self.params.clear();
    }

    pub fn method(&self) -> AuthMethod {
        self.method
    }

    /// `Authorization` value for a request, or `None` when nothing should
    /// be sent (no method, or Digest without a challenge yet).
    pub fn authorization(&self, method: &str, uri: &str) -> Option<String> {
        match self.method {
            AuthMethod::None => None,
            AuthMethod::Basic => Some(format!(
                "Basic {}",
                basic_encode(&self.username, &self.password)
            )),
            AuthMethod::Digest => {
                let realm = self.param("realm")?;
                let nonce = self.param("nonce")?;
                let response =
                    digest_response(method, uri, realm, &self.username, &self.password, nonce);
                let mut value = format!(
                    "Digest username=\"{}\", realm=\"{realm}\", nonce=\"{nonce}\", uri=\"{uri}\", response=\"{response}\"",
                    self.username
                );
                if let Some(opaque) = self.param("opaque") {
                    value.push_str(&format!(", opaque=\"{opaque}\""));
                }
                Some(value)
            }
        }
    }
}

/// `base64(user:pass)` for Basic authentication.
pub fn basic_encode(username: &str, password: &str) -> String {
    BASE64_STANDARD.encode(format!("{username}:{password}"))
}

/// Digest response: `MD5(MD5(user:realm:pass):nonce:MD5(method:uri))`,
/// lowercase hex.
pub fn digest_response(
    method: &str,
    uri: &str,
    realm: &str,
    username: &str,
    password: &str,
    nonce: &str,
) -> String {
    let ha1 = md5_hex(format!("{username}:{realm}:{password}").as_bytes());
    let ha2 = md5_hex(format!("{method}:{uri}").as_bytes());
    md5_hex(format!("{ha1}:{nonce}:{ha2}").as_bytes())
}

fn md5_hex(data: &[u8]) -> String {
    Md5::digest(data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
