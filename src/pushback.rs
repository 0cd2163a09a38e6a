//! A byte source augmented with bounded `unread` capability, layered over any [`Read`].
//!
//! ZIP's streaming reader has no seek available; overshoot recovery (the decompressor, or the
//! stored-entry scavenger, consuming bytes that actually belong to the next entry) is instead
//! realized by unreading the excess back into this buffer.

use std::collections::VecDeque;
use std::io::{self, Read};

/// Wraps `R` with a FIFO queue of bytes to return before consulting the inner reader again.
pub struct PushbackReader<R> {
    inner: R,
    pending: VecDeque<u8>,
}

impl<R: Read> PushbackReader<R> {
    pub fn new(inner: R) -> Self {
        PushbackReader {
            inner,
            pending: VecDeque::new(),
        }
    }

    /// Pushes `bytes` back so the next reads return them, in order, before fresh source bytes.
    pub fn unread(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        // `pending` must stay in FIFO order with `bytes` preceding whatever was already
        // queued (unread is always called with the most-recently-read trailing bytes).
        for &b in bytes.iter().rev() {
            self.pending.push_front(b);
        }
    }

    /// True if there are no pushed-back bytes waiting (doesn't consult the inner reader).
    pub fn pending_is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<R: Read> Read for PushbackReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending.is_empty() {
            return self.inner.read(buf);
        }
        let mut n = 0;
        while n < buf.len() {
            match self.pending.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}
