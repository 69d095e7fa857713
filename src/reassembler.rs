use std::collections::BTreeMap;

use crate::byte_stream::ByteStream;

/// Reassembles out-of-order byte-stream fragments into a contiguous [`ByteStream`].
///
/// Held fragments are keyed by their absolute stream index in a `BTreeMap`, which
/// keeps them ordered and gives us `split_off` for splitting a range at a boundary —
/// the same role the teacher's `BTreeMap`-backed retransmission queue plays for
/// ordered lookups, borrowed here for ordered byte ranges instead.
#[derive(Debug)]
pub struct Reassembler {
    output: ByteStream,
    buffer: BTreeMap<u64, Vec<u8>>,
    final_index: Option<u64>,
    pending_bytes: u64,
}

impl Reassembler {
    pub fn new(output: ByteStream) -> Self {
        Reassembler {
            output,
            buffer: BTreeMap::new(),
            final_index: None,
            pending_bytes: 0,
        }
    }

    pub fn writer(&self) -> &ByteStream {
        &self.output
    }

    pub fn writer_mut(&mut self) -> &mut ByteStream {
        &mut self.output
    }

    pub fn into_output(self) -> ByteStream {
        self.output
    }

    pub fn count_bytes_pending(&self) -> u64 {
        self.pending_bytes
    }

    /// Splits the stored range that straddles `pos`, if any, so that `pos` becomes
    /// a range boundary. Returns nothing; the buffer is mutated in place.
    fn split_at(&mut self, pos: u64) {
        // Find the range that starts at or before `pos` and might extend past it.
        let Some((&start, _)) = self.buffer.range(..=pos).next_back() else {
            return;
        };
        if start == pos {
            return;
        }
        let data = self.buffer.get(&start).unwrap();
        let end = start + data.len() as u64;
        if end > pos {
            let split_point = (pos - start) as usize;
            let tail = self.buffer.get_mut(&start).unwrap().split_off(split_point);
            self.buffer.insert(pos, tail);
        }
    }

    fn try_close(&mut self) {
        if self.final_index == Some(self.output.bytes_pushed()) {
            self.output.close();
        }
    }

    /// Integrates a payload fragment starting at `first_index` in absolute stream
    /// coordinates. `is_last` marks the fragment as carrying the stream's final
    /// byte (FIN).
    pub fn insert(&mut self, mut first_index: u64, mut data: Vec<u8>, mut is_last: bool) {
        if data.is_empty() {
            if self.final_index.is_none() && is_last {
                self.final_index = Some(first_index);
            }
            self.try_close();
            return;
        }

        if self.output.is_closed() || self.output.available_capacity() == 0 {
            return;
        }

        let first_unassembled = self.output.bytes_pushed();
        let first_unacceptable = first_unassembled + self.output.available_capacity();

        if first_index + data.len() as u64 <= first_unassembled || first_index >= first_unacceptable {
            return;
        }

        if first_index + data.len() as u64 > first_unacceptable {
            data.truncate((first_unacceptable - first_index) as usize);
            is_last = false;
        }

        if first_index < first_unassembled {
            let drop = (first_unassembled - first_index) as usize;
            data.drain(..drop);
            first_index = first_unassembled;
        }

        if self.final_index.is_none() && is_last {
            self.final_index = Some(first_index + data.len() as u64);
        }

        let end = first_index + data.len() as u64;
        self.split_at(first_index);
        self.split_at(end);

        let overlapping: Vec<u64> = self
            .buffer
            .range(first_index..end)
            .map(|(&k, _)| k)
            .collect();
        for key in overlapping {
            if let Some(old) = self.buffer.remove(&key) {
                self.pending_bytes -= old.len() as u64;
            }
        }

        self.pending_bytes += data.len() as u64;
        self.buffer.insert(first_index, data);

        while let Some((&index, _)) = self.buffer.iter().next() {
            if index != self.output.bytes_pushed() {
                break;
            }
            let (_, payload) = self.buffer.remove_entry(&index).unwrap();
            self.pending_bytes -= payload.len() as u64;
            self.output.push(&payload);
        }

        self.try_close();
    }
}
