//! Ordered, multi-valued header map.
//!
//! Headers keep insertion order (the serializer writes them back in that
//! order) and compare names case-insensitively per RFC 2326 §4.2.

use std::fmt;

/// Well-known header names used by the connection layer.
pub mod names {
    pub const ACCEPT: &str = "Accept";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const CACHE_CONTROL: &str = "Cache-Control";
    pub const CONNECTION: &str = "Connection";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CSEQ: &str = "CSeq";
    pub const DATE: &str = "Date";
    pub const EXPIRES: &str = "Expires";
    pub const HOST: &str = "Host";
    pub const LOCATION: &str = "Location";
    pub const PRAGMA: &str = "Pragma";
    pub const PROXY_AUTHENTICATE: &str = "Proxy-Authenticate";
    pub const SERVER: &str = "Server";
    pub const SESSION: &str = "Session";
    pub const USER_AGENT: &str = "User-Agent";
    pub const WWW_AUTHENTICATE: &str = "WWW-Authenticate";
    pub const X_SERVER_IP_ADDRESS: &str = "x-server-ip-address";
    pub const X_SESSIONCOOKIE: &str = "x-sessioncookie";
}

/// Headers whose value may be a comma-separated list of several values.
///
/// Anything not listed here (including unknown extension headers) is
/// treated as single-valued and never split.
const MULTI_VALUED: &[&str] = &[
    "Accept",
    "Accept-Encoding",
    "Accept-Language",
    "Allow",
    "Cache-Control",
    "Connection",
    "Content-Encoding",
    "Content-Language",
    "Proxy-Authenticate",
    "Proxy-Require",
    "Public",
    "Require",
    "RTP-Info",
    "Supported",
    "Transport",
    "Via",
    "WWW-Authenticate",
];

/// Whether a header value may be split on commas into several entries.
pub fn allows_multiple(name: &str) -> bool {
    MULTI_VALUED.iter().any(|n| n.eq_ignore_ascii_case(name))
}

/// Ordered (name, value) pairs with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_nth(name, 0)
    }

    /// The `index`-th value for `name`, counting only entries with that name.
    pub fn get_nth(&self, name: &str, index: usize) -> Option<&str> {
        self.get_all(name).nth(index)
    }

    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    /// Add a value, keeping any existing values for the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace all values for `name` with a single value at the end.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    /// Remove every value for `name`. Returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            writeln!(f, "  {name}: {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_case_insensitive() {
        let mut h = Headers::new();
        h.append("cseq", "42");
        assert_eq!(h.get("CSeq"), Some("42"));
        assert_eq!(h.get("CSEQ"), Some("42"));
        assert!(h.contains("Cseq"));
    }

    #[test]
    fn multiple_values_keep_order() {
        let mut h = Headers::new();
        h.append("Cache-Control", "no-cache");
        h.append("Server", "x");
        h.append("cache-control", "no-store");
        assert_eq!(h.get_nth("Cache-Control", 1), Some("no-store"));
        let names: Vec<_> = h.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["Cache-Control", "Server", "cache-control"]);
    }

    #[test]
    fn values_outlive_lookup_name() {
        let mut h = Headers::new();
        h.append("Public", "OPTIONS");
        h.append("Public", "PLAY");
        let second = {
            let name = String::from("public");
            h.get_nth(&name, 1)
        };
        assert_eq!(second, Some("PLAY"));
    }

    #[test]
    fn insert_replaces() {
        let mut h = Headers::new();
        h.append("Date", "a");
        h.append("Date", "b");
        h.insert("date", "c");
        assert_eq!(h.get_all("Date").collect::<Vec<_>>(), ["c"]);
        assert_eq!(h.remove("DATE"), 1);
        assert!(h.is_empty());
    }

    #[test]
    fn multi_valued_table() {
        assert!(allows_multiple("cache-control"));
        assert!(allows_multiple("WWW-Authenticate"));
        assert!(!allows_multiple("Date"));
        assert!(!allows_multiple("X-Custom"));
    }
}
