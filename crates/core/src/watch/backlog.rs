use std::collections::VecDeque;

use crate::error::{Result, RtspError};

/// One queued batch: the serialized bytes of everything passed to a
/// single send call, and how far writing has got.
#[derive(Debug)]
struct Record {
    data: Vec<u8>,
    written: usize,
    id: u32,
}

/// Outbound queue with byte and batch accounting.
///
/// A limit of 0 means unlimited. The queue counts as full once either
/// limit is reached, so one batch larger than `max_bytes` still fits into
/// an empty queue.
#[derive(Debug, Default)]
pub(crate) struct Backlog {
    queue: VecDeque<Record>,
    bytes: usize,
    max_bytes: usize,
    max_messages: usize,
    last_id: u32,
}

impl Backlog {
    pub fn with_limits(max_bytes: usize, max_messages: usize) -> Self {
        Self {
            max_bytes,
            max_messages,
            ..Self::default()
        }
    }

    pub fn set_limits(&mut self, max_bytes: usize, max_messages: usize) {
        self.max_bytes = max_bytes;
        self.max_messages = max_messages;
    }

    pub fn limits(&self) -> (usize, usize) {
        (self.max_bytes, self.max_messages)
    }

    pub fn is_full(&self) -> bool {
        (self.max_bytes != 0 && self.bytes >= self.max_bytes)
            || (self.max_messages != 0 && self.queue.len() >= self.max_messages)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Unsent bytes across all records.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Queue `data`, of which the first `written` bytes already went out.
    /// Returns the batch id, never 0.
    pub fn push(&mut self, data: Vec<u8>, written: usize) -> Result<u32> {
        if self.is_full() {
            tracing::warn!(
                bytes = self.bytes,
                max_bytes = self.max_bytes,
                messages = self.queue.len(),
                max_messages = self.max_messages,
                "send backlog full"
            );
            return Err(RtspError::BacklogFull);
        }
        self.last_id = self.last_id.wrapping_add(1);
        if self.last_id == 0 {
            self.last_id = 1;
        }
        self.bytes += data.len() - written;
        self.queue.push_back(Record {
            data,
            written,
            id: self.last_id,
        });
        Ok(self.last_id)
    }

    /// Write records in order until the queue is empty, `write` would
    /// block, or it fails.
    ///
    /// `write` advances the cursor it is given, so a record interrupted
    /// part-way resumes at the same byte next time. Returns the ids of
    /// the records completed.
    pub fn drain<F>(&mut self, mut write: F) -> (Vec<u32>, Result<()>)
    where
        F: FnMut(&[u8], &mut usize) -> Result<()>,
    {
        let mut sent = Vec::new();
        while let Some(record) = self.queue.front_mut() {
            let before = record.written;
            let res = write(&record.data, &mut record.written);
            self.bytes -= record.written - before;
            match res {
                Ok(()) => {
                    sent.push(record.id);
                    self.queue.pop_front();
                }
                Err(RtspError::WouldBlock) => break,
                Err(e) => return (sent, Err(e)),
            }
        }
        (sent, Ok(()))
    }

    pub fn ids(&self) -> Vec<u32> {
        self.queue.iter().map(|r| r.id).collect()
    }

    /// Drop everything queued.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_limit() {
        let mut backlog = Backlog::with_limits(0, 2);
        assert_eq!(backlog.push(b"a".to_vec(), 0).unwrap(), 1);
        assert_eq!(backlog.push(b"b".to_vec(), 0).unwrap(), 2);
        assert!(backlog.is_full());
        assert!(matches!(
            backlog.push(b"c".to_vec(), 0),
            Err(RtspError::BacklogFull)
        ));
        assert_eq!(backlog.len(), 2);
        assert_eq!(backlog.bytes(), 2);

        backlog.set_limits(0, 0);
        assert!(!backlog.is_full());
    }

    #[test]
    fn byte_limit_counts_unsent_bytes() {
        let mut backlog = Backlog::with_limits(10, 0);
        backlog.push(vec![0; 12], 4).unwrap();
        assert_eq!(backlog.bytes(), 8);
        assert!(!backlog.is_full());
        backlog.push(vec![0; 2], 0).unwrap();
        assert!(backlog.is_full());
    }

    #[test]
    fn ids_skip_zero() {
        let mut backlog = Backlog::default();
        backlog.last_id = u32::MAX;
        assert_eq!(backlog.push(vec![1], 0).unwrap(), 1);
    }

    #[test]
    fn drain_resumes_mid_record() {
        let mut backlog = Backlog::default();
        backlog.push(b"hello".to_vec(), 0).unwrap();
        backlog.push(b"world".to_vec(), 0).unwrap();

        let mut out = Vec::new();
        let mut budget = 7;
        let (sent, res) = backlog.drain(|data, written| {
            while *written < data.len() {
                if budget == 0 {
                    return Err(RtspError::WouldBlock);
                }
                out.push(data[*written]);
                *written += 1;
                budget -= 1;
            }
            Ok(())
        });
        res.unwrap();
        assert_eq!(sent, vec![1]);
        assert_eq!(out, b"hellowo");
        assert_eq!(backlog.bytes(), 3);

        let (sent, res) = backlog.drain(|data, written| {
            out.extend_from_slice(&data[*written..]);
            *written = data.len();
            Ok(())
        });
        res.unwrap();
        assert_eq!(sent, vec![2]);
        assert_eq!(out, b"helloworld");
        assert!(backlog.is_empty());
        assert_eq!(backlog.bytes(), 0);
    }

    #[test]
    fn drain_stops_on_error() {
        let mut backlog = Backlog::default();
        backlog.push(b"a".to_vec(), 0).unwrap();
        backlog.push(b"b".to_vec(), 0).unwrap();
        let (sent, res) = backlog.drain(|_, _| Err(RtspError::Eof));
        assert!(sent.is_empty());
        assert!(matches!(res, Err(RtspError::Eof)));
        assert_eq!(backlog.ids(), vec![1, 2]);
        backlog.clear();
        assert!(backlog.is_empty());
        assert_eq!(backlog.bytes(), 0);
    }
}
