use crate::byte_stream::ByteStream;
use crate::reassembler::Reassembler;
use crate::wrap32::Wrap32;

use super::{TCPReceiverMessage, TCPSenderMessage};

/// Consumes segments from a peer's [`super::TCPSender`], drives a [`Reassembler`],
/// and reports back an acknowledgement plus a window advertisement.
#[derive(Debug)]
pub struct TCPReceiver {
    reassembler: Reassembler,
    isn: Option<Wrap32>,
}

impl TCPReceiver {
    pub fn new(capacity: usize) -> Self {
        TCPReceiver {
            reassembler: Reassembler::new(ByteStream::new(capacity)),
            isn: None,
        }
    }

    pub fn reassembler(&self) -> &Reassembler {
        &self.reassembler
    }

    pub fn inbound_stream(&self) -> &ByteStream {
        self.reassembler.writer()
    }

    pub fn inbound_stream_mut(&mut self) -> &mut ByteStream {
        self.reassembler.writer_mut()
    }

    pub fn has_synced(&self) -> bool {
        self.isn.is_some()
    }

    pub fn receive(&mut self, seg: TCPSenderMessage) {
        if self.reassembler.writer().has_error() {
            return;
        }

        if seg.rst {
            self.reassembler.writer_mut().set_error();
            return;
        }

        if seg.syn && self.isn.is_none() {
            self.isn = Some(seg.seqno);
        }

        let Some(isn) = self.isn else {
            // Stray pre-SYN segment.
            return;
        };

        // `+ 1` accounts for SYN occupying absolute sequence index 0.
        let abs_seqno = seg.seqno.unwrap(isn, self.reassembler.writer().bytes_pushed() + 1);
        let stream_index = if seg.syn { 0 } else { abs_seqno - 1 };

        self.reassembler.insert(stream_index, seg.payload, seg.fin);
    }

    pub fn send(&self) -> TCPReceiverMessage {
        let writer = self.reassembler.writer();

        let ackno = self.isn.map(|isn| {
            // SYN and FIN (if the stream has closed) each consume one sequence
            // number in addition to the bytes pushed so far.
            let mut next_seq = writer.bytes_pushed() + 1;
            if writer.is_closed() {
                next_seq += 1;
            }
            Wrap32::wrap(next_seq, isn)
        });

        TCPReceiverMessage {
            ackno,
            window_size: writer.available_capacity().min(u16::MAX as u64) as u16,
            rst: writer.has_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syn(seqno: u32) -> TCPSenderMessage {
        TCPSenderMessage {
            seqno: Wrap32::new(seqno),
            syn: true,
            payload: Vec::new(),
            fin: false,
            rst: false,
        }
    }

    fn data(seqno: u32, payload: &[u8], fin: bool) -> TCPSenderMessage {
        TCPSenderMessage {
            seqno: Wrap32::new(seqno),
            syn: false,
            payload: payload.to_vec(),
            fin,
            rst: false,
        }
    }

    #[test]
    fn syn_sets_isn_and_window() {
        let mut rcv = TCPReceiver::new(10);
        rcv.receive(syn(100));
        let msg = rcv.send();
        assert_eq!(msg.ackno, Some(Wrap32::new(101)));
        assert_eq!(msg.window_size, 10);
    }

    #[test]
    fn pre_syn_segment_is_dropped() {
        let mut rcv = TCPReceiver::new(10);
        rcv.receive(data(5, b"x", false));
        assert_eq!(rcv.send().ackno, None);
    }

    #[test]
    fn full_handshake_and_close_advances_ackno() {
        let mut rcv = TCPReceiver::new(10);
        rcv.receive(syn(0));
        rcv.receive(data(1, b"hello", true));
        let msg = rcv.send();
        // 1 (SYN) + 5 (payload) + 1 (FIN) = 7
        assert_eq!(msg.ackno, Some(Wrap32::new(7)));
        assert!(rcv.inbound_stream().is_finished());
    }

    #[test]
    fn rst_sets_error_and_reports_it() {
        let mut rcv = TCPReceiver::new(10);
        rcv.receive(syn(0));
        rcv.receive(TCPSenderMessage {
            seqno: Wrap32::new(1),
            syn: false,
            payload: Vec::new(),
            fin: false,
            rst: true,
        });
        assert!(rcv.send().rst);
    }

    #[test]
    fn out_of_order_segments_reassemble() {
        let mut rcv = TCPReceiver::new(10);
        rcv.receive(syn(0));
        rcv.receive(data(4, b"lo", true));
        rcv.receive(data(1, b"hel", false));
        assert_eq!(rcv.inbound_stream().peek(), b"hello");
        assert!(rcv.inbound_stream().is_finished());
    }
}
