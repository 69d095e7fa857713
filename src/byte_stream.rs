use std::collections::VecDeque;

/// A bounded, in-memory byte FIFO with a write side and a read side.
///
/// Capacity is enforced on push, not pop, so a writer can never make the stream
/// exceed its capacity even transiently. The stream is single-owner: whichever
/// component holds it (a [`crate::tcp::TCPSender`] for outbound bytes, a
/// [`crate::reassembler::Reassembler`] for inbound bytes) drives both the writer
/// and reader sides directly; there is no cross-thread sharing at this layer.
#[derive(Debug, Clone)]
pub struct ByteStream {
    capacity: usize,
    buffer: VecDeque<u8>,
    bytes_pushed: u64,
    bytes_popped: u64,
    closed: bool,
    error: bool,
}

impl ByteStream {
    pub fn new(capacity: usize) -> Self {
        ByteStream {
            capacity,
            buffer: VecDeque::new(),
            bytes_pushed: 0,
            bytes_popped: 0,
            closed: false,
            error: false,
        }
    }

    // --- writer-side operations ---

    /// Appends up to `available_capacity` bytes of `data` (truncating the tail if
    /// `data` is larger). No-op once the stream is closed. Never fails.
    pub fn push(&mut self, data: &[u8]) {
        if self.closed {
            return;
        }
        let accepted = data.len().min(self.available_capacity() as usize);
        self.buffer.extend(&data[..accepted]);
        self.bytes_pushed += accepted as u64;
    }

    /// Idempotent: signals that no more bytes will ever be pushed.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn available_capacity(&self) -> u64 {
        (self.capacity - self.buffer.len()) as u64
    }

    pub fn bytes_pushed(&self) -> u64 {
        self.bytes_pushed
    }

    // --- reader-side operations ---

    /// The currently buffered contiguous prefix. Backed by a `VecDeque`, so this
    /// is the deque's first contiguous slice — the full buffered region unless the
    /// ring has wrapped.
    pub fn peek(&self) -> &[u8] {
        self.buffer.as_slices().0
    }

    /// Discards up to `min(n, buffered)` bytes from the head.
    pub fn pop(&mut self, n: usize) {
        let n = n.min(self.buffer.len());
        self.buffer.drain(..n);
        self.bytes_popped += n as u64;
    }

    pub fn is_finished(&self) -> bool {
        self.closed && self.buffer.is_empty()
    }

    pub fn bytes_buffered(&self) -> u64 {
        self.buffer.len() as u64
    }

    pub fn bytes_popped(&self) -> u64 {
        self.bytes_popped
    }

    // --- shared queries / error flag ---

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    pub fn set_error(&mut self) {
        self.error = true;
    }
}
