//! Read-side buffering and base64 transcoding for tunneled streams.

use base64::prelude::{BASE64_STANDARD, Engine as _};

use crate::error::{ParseErrorKind, Result, RtspError};

/// Base64-encode one serialized message for the tunnel write channel.
pub(crate) fn encode(data: &[u8]) -> Vec<u8> {
    BASE64_STANDARD.encode(data).into_bytes()
}

/// Streaming base64 decoder.
///
/// The peer encodes each message separately, so padding may appear at
/// the end of any 4-character group, not only at the end of the stream.
/// Incomplete groups are held back until the rest arrives.
#[derive(Debug, Default)]
pub(crate) struct Base64Decoder {
    pending: Vec<u8>,
}

impl Base64Decoder {
    pub fn decode(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.pending
            .extend(input.iter().copied().filter(|b| !b.is_ascii_whitespace()));

        let complete = self.pending.len() / 4 * 4;
        let mut start = 0;
        for group in (0..complete).step_by(4) {
            if self.pending[group + 3] == b'=' {
                decode_run(&self.pending[start..group + 4], out)?;
                start = group + 4;
            }
        }
        if start < complete {
            decode_run(&self.pending[start..complete], out)?;
        }
        self.pending.drain(..complete);
        Ok(())
    }
}

fn decode_run(run: &[u8], out: &mut Vec<u8>) -> Result<()> {
    BASE64_STANDARD
        .decode_vec(run, out)
        .map_err(|_| RtspError::parse(ParseErrorKind::InvalidEncoding))
}

/// Bytes received but not yet consumed by the builder.
///
/// Also holds the initial buffer of a server connection: bytes a listener
/// already read before handing the stream over. When decoding is on,
/// everything pushed is base64 and stored decoded.
#[derive(Debug, Default)]
pub(crate) struct Input {
    buf: Vec<u8>,
    pos: usize,
    decoder: Option<Base64Decoder>,
}

impl Input {
    pub fn with_initial(initial: Vec<u8>) -> Self {
        Self {
            buf: initial,
            pos: 0,
            decoder: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn set_decoding(&mut self, decoding: bool) {
        self.decoder = decoding.then(Base64Decoder::default);
    }

    /// Store freshly read bytes, decoding them if needed.
    pub fn push(&mut self, raw: &[u8]) -> Result<()> {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        match self.decoder.as_mut() {
            Some(decoder) => decoder.decode(raw, &mut self.buf),
            None => {
                self.buf.extend_from_slice(raw);
                Ok(())
            }
        }
    }

    /// Copy as much as is buffered into `dst`.
    pub fn take(&mut self, dst: &mut [u8]) -> usize {
        let available = &self.buf[self.pos..];
        let n = available.len().min(dst.len());
        dst[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        n
    }

    /// Remove and return everything not yet consumed.
    pub fn take_remaining(&mut self) -> Vec<u8> {
        let rest = self.buf.split_off(self.pos);
        self.buf.clear();
        self.pos = 0;
        rest
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_concatenated_padded_messages() {
        let mut stream = encode(b"OPTIONS * RTSP/1.0\r\n");
        stream.extend(encode(b"x"));
        stream.extend(encode(b"yz"));

        let mut decoder = Base64Decoder::default();
        let mut out = Vec::new();
        for chunk in stream.chunks(3) {
            decoder.decode(chunk, &mut out).unwrap();
        }
        assert_eq!(out, b"OPTIONS * RTSP/1.0\r\nxyz");
    }

    #[test]
    fn invalid_base64_rejected() {
        let mut decoder = Base64Decoder::default();
        let mut out = Vec::new();
        assert!(decoder.decode(b"!!!!", &mut out).is_err());
    }

    #[test]
    fn input_serves_initial_then_pushed() {
        let mut input = Input::with_initial(b"ab".to_vec());
        input.push(b"cd").unwrap();
        let mut dst = [0u8; 3];
        assert_eq!(input.take(&mut dst), 3);
        assert_eq!(&dst, b"abc");
        assert_eq!(input.take_remaining(), b"d");
        assert!(input.is_empty());
    }

    #[test]
    fn decoding_input() {
        let mut input = Input::default();
        input.set_decoding(true);
        input.push(&encode(b"hello")).unwrap();
        let mut dst = [0u8; 5];
        assert_eq!(input.take(&mut dst), 5);
        assert_eq!(&dst, b"hello");
    }
}
