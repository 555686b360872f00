//! Header line reader.
//!
//! Extracts one logical line at a time from a byte source, accepting
//! `\r\n`, bare `\n` and bare `\r` terminators in any mixture, folding
//! continuation lines (a terminator followed by space or tab) into a
//! single space, and recognizing the blank line that ends the header
//! block.
//!
//! The reader peeks one byte past every terminator. Whatever it learns
//! from that byte is kept in a lookahead register so a non-blocking
//! caller can resume after [`RtspError::WouldBlock`] without losing
//! input:
//!
//! | Register        | Meaning                                         |
//! |-----------------|-------------------------------------------------|
//! | `None`          | nothing pending                                 |
//! | `Char(c)`       | `c` is the first byte of the next line          |
//! | `Crlf`          | saw `\r\n`, next byte not yet classified        |
//! | `CrlfCr`        | saw `\r\n\r`, may be end of headers             |
//! | `EndOfHeaders`  | next call returns the empty terminating line    |

use crate::error::{Result, RtspError};

/// Maximum bytes kept per line; longer lines are truncated.
pub const LINE_CAPACITY: usize = 4096;

/// Byte input for the line reader and the message builder.
///
/// Blocking sources wait (subject to their own deadline and cancellation);
/// non-blocking ones return [`RtspError::WouldBlock`] when no byte is
/// available yet.
pub trait ByteSource {
    /// Read into `buf[*filled..]` until it is full, advancing `*filled`
    /// as bytes arrive so that an interrupted call can be resumed.
    fn read_exact_from(&mut self, buf: &mut [u8], filled: &mut usize) -> Result<()>;

    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        let mut filled = 0;
        self.read_exact_from(&mut byte, &mut filled)?;
        Ok(byte[0])
    }
}

/// In-memory input. Running dry is [`RtspError::WouldBlock`], so callers
/// can feed a message in arbitrary chunks.
impl<'a> ByteSource for &'a [u8] {
    fn read_exact_from(&mut self, buf: &mut [u8], filled: &mut usize) -> Result<()> {
        while *filled < buf.len() {
            let data: &'a [u8] = self;
            let Some((&first, rest)) = data.split_first() else {
                return Err(RtspError::WouldBlock);
            };
            buf[*filled] = first;
            *filled += 1;
            *self = rest;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum ReadAhead {
    #[default]
    None,
    Char(u8),
    Crlf,
    CrlfCr,
    EndOfHeaders,
}

#[derive(Debug, Default)]
pub(crate) struct LineReader {
    read_ahead: ReadAhead,
    /// Terminator byte waiting for its lookahead to be classified.
    current: Option<u8>,
}

impl LineReader {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Append the rest of the current line to `line`.
    ///
    /// Returns once a line terminator has been consumed; an empty `line`
    /// afterwards means end of headers. On error the register and `line`
    /// keep their progress.
    pub fn read_line<S: ByteSource + ?Sized>(
        &mut self,
        src: &mut S,
        line: &mut Vec<u8>,
    ) -> Result<()> {
        loop {
            let mut c = match self.current {
                Some(c) => c,
                None => {
                    let c = match self.read_ahead {
                        ReadAhead::EndOfHeaders => {
                            self.read_ahead = ReadAhead::None;
                            return Ok(());
                        }
                        ReadAhead::Crlf => b'\n',
                        ReadAhead::CrlfCr => b'\r',
                        ReadAhead::Char(c) => {
                            self.read_ahead = ReadAhead::None;
                            c
                        }
                        ReadAhead::None => src.read_byte()?,
                    };
                    self.current = Some(c);
                    c
                }
            };

            if c == b'\r' || c == b'\n' {
                match self.classify_terminator(src, c)? {
                    Some(folded) => c = folded,
                    None => {
                        self.current = None;
                        return Ok(());
                    }
                }
            }

            self.current = None;
            if line.len() < LINE_CAPACITY {
                line.push(c);
            }
        }
    }

    /// Peek past terminator `c`. Returns `Some(b' ')` for a folded
    /// continuation, `None` when the line is complete.
    fn classify_terminator<S: ByteSource + ?Sized>(
        &mut self,
        src: &mut S,
        c: u8,
    ) -> Result<Option<u8>> {
        loop {
            let next = src.read_byte()?;

            if next == b' ' || next == b'\t' {
                let ends_line = self.read_ahead == ReadAhead::CrlfCr;
                self.read_ahead = ReadAhead::Char(next);
                return Ok(if ends_line { None } else { Some(b' ') });
            }

            match self.read_ahead {
                ReadAhead::CrlfCr => {
                    self.read_ahead = if next == b'\r' || next == b'\n' {
                        ReadAhead::EndOfHeaders
                    } else {
                        ReadAhead::Char(next)
                    };
                    return Ok(None);
                }
                ReadAhead::Crlf => match next {
                    b'\r' => self.read_ahead = ReadAhead::CrlfCr,
                    b'\n' => {
                        self.read_ahead = ReadAhead::EndOfHeaders;
                        return Ok(None);
                    }
                    _ => {
                        self.read_ahead = ReadAhead::Char(next);
                        return Ok(None);
                    }
                },
                _ if next == c => {
                    self.read_ahead = ReadAhead::EndOfHeaders;
                    return Ok(None);
                }
                _ if c == b'\r' && next == b'\n' => self.read_ahead = ReadAhead::Crlf,
                _ => {
                    self.read_ahead = ReadAhead::Char(next);
                    return Ok(None);
                }
            }
        }
    }
}

/// Collapse every run of ASCII whitespace into a single space.
pub(crate) fn normalize_line(line: &[u8]) -> String {
    let mut out = Vec::with_capacity(line.len());
    let mut in_space = false;
    for &b in line {
        if b.is_ascii_whitespace() {
            if !in_space {
                out.push(b' ');
            }
            in_space = true;
        } else {
            out.push(b);
            in_space = false;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(input: &[u8]) -> Vec<String> {
        let mut reader = LineReader::default();
        let mut src = input;
        let mut out = Vec::new();
        loop {
            let mut line = Vec::new();
            match reader.read_line(&mut src, &mut line) {
                Ok(()) if line.is_empty() => {
                    out.push(String::new());
                    return out;
                }
                Ok(()) => out.push(normalize_line(&line)),
                Err(RtspError::WouldBlock) => return out,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
    }

    #[test]
    fn crlf_terminated_headers() {
        let out = lines(b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n");
        assert_eq!(out, ["OPTIONS * RTSP/1.0", "CSeq: 1", ""]);
    }

    #[test]
    fn mixed_terminators_give_same_lines() {
        let expected = ["A: 1", "B: 2", "C: 3", ""];
        assert_eq!(lines(b"A: 1\nB: 2\rC: 3\r\n\r\n"), expected);
        assert_eq!(lines(b"A: 1\r\nB: 2\nC: 3\n\n"), expected);
        assert_eq!(lines(b"A: 1\rB: 2\rC: 3\r\r"), expected);
        assert_eq!(lines(b"A: 1\r\nB: 2\r\nC: 3\r\n\n"), expected);
        assert_eq!(lines(b"A: 1\r\nB: 2\r\nC: 3\r\n\r\r"), expected);
    }

    #[test]
    fn folded_continuation_joins_line() {
        let out = lines(b"Public: OPTIONS,\r\n\tDESCRIBE\r\nCSeq: 2\r\n\r\n");
        assert_eq!(out, ["Public: OPTIONS, DESCRIBE", "CSeq: 2", ""]);
    }

    #[test]
    fn resumes_one_byte_at_a_time() {
        let input = b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n  folded\r\n\r\n";
        let mut reader = LineReader::default();
        let mut line = Vec::new();
        let mut out = Vec::new();
        for i in 0..input.len() {
            let mut src = &input[i..=i];
            match reader.read_line(&mut src, &mut line) {
                Ok(()) => {
                    out.push(normalize_line(&line));
                    line.clear();
                }
                Err(RtspError::WouldBlock) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        // end-of-headers is reported on the next call without reading
        let mut empty: &[u8] = &[];
        reader.read_line(&mut empty, &mut line).unwrap();
        assert!(line.is_empty());
        assert_eq!(out, ["RTSP/1.0 200 OK", "CSeq: 1 folded"]);
    }

    #[test]
    fn long_lines_are_truncated() {
        let mut input = vec![b'x'; LINE_CAPACITY + 100];
        input.extend_from_slice(b"\r\n\r\n");
        let mut reader = LineReader::default();
        let mut line = Vec::new();
        let mut src = input.as_slice();
        reader.read_line(&mut src, &mut line).unwrap();
        assert_eq!(line.len(), LINE_CAPACITY);
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_line(b"a \t  b\t"), "a b ");
    }
}
