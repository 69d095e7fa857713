use log::debug;

use crate::byte_stream::ByteStream;
use crate::wrap32::Wrap32;

use super::receiver::TCPReceiver;
use super::sender::TCPSender;
use super::{Quad, TCPReceiverMessage, TCPSenderMessage};

/// How long a connection lingers after both streams finish before it is torn
/// down, carried over from the teacher's own RFC 9293 TIME-WAIT commentary.
pub const MSL_MS: u64 = 30_000;
const LINGER_MS: u64 = 2 * MSL_MS;

const DEFAULT_CAPACITY: usize = 64 * 1024;
const DEFAULT_RTO_MS: u64 = 1_000;

/// Glues one [`TCPSender`] and one [`TCPReceiver`] into a single full-duplex
/// connection, identified by `quad`. Introduces no wire semantics beyond what the
/// sender/receiver already define; its only job is routing messages between them
/// and tracking when the connection is safe to tear down.
#[derive(Debug)]
pub struct TcpConnection {
    quad: Quad,
    sender: TCPSender,
    receiver: TCPReceiver,
    linger_remaining_ms: Option<u64>,
}

impl TcpConnection {
    /// Starts a new connection with a randomly drawn ISN, resolving the
    /// teacher's own open TODO to choose one instead of hard-coding zero.
    pub fn new(quad: Quad) -> Self {
        let isn = Wrap32::new(rand::random());
        TcpConnection {
            quad,
            sender: TCPSender::new(ByteStream::new(DEFAULT_CAPACITY), isn, DEFAULT_RTO_MS),
            receiver: TCPReceiver::new(DEFAULT_CAPACITY),
            linger_remaining_ms: None,
        }
    }

    pub fn quad(&self) -> Quad {
        self.quad
    }

    pub fn outbound_stream(&mut self) -> &mut ByteStream {
        self.sender.outbound_stream_mut()
    }

    pub fn inbound_stream(&self) -> &ByteStream {
        self.receiver.inbound_stream()
    }

    pub fn inbound_stream_mut(&mut self) -> &mut ByteStream {
        self.receiver.inbound_stream_mut()
    }

    /// Feeds an inbound segment's data half to the receiver and its ack half
    /// (the peer acking data we sent) to the sender, then returns our own
    /// fresh ack so the caller can decide whether a pure ack needs sending.
    pub fn on_segment(&mut self, seg: TCPSenderMessage, peer_ack: TCPReceiverMessage) -> TCPReceiverMessage {
        self.receiver.receive(seg);
        self.sender.receive(&peer_ack);
        self.receiver.send()
    }

    /// Drives the sender's segmentation over whatever is buffered in the
    /// outbound stream.
    pub fn push(&mut self, transmit: impl FnMut(&TCPSenderMessage)) {
        self.sender.push(transmit);
    }

    pub fn send_ack(&self) -> TCPReceiverMessage {
        self.receiver.send()
    }

    /// A zero-payload outbound segment for when an incoming segment needs
    /// acking but `push` had nothing of its own to send.
    pub fn ack_only_segment(&self) -> TCPSenderMessage {
        self.sender.empty_segment()
    }

    /// True once our receiver has observed the peer's SYN, i.e. the
    /// handshake's data-flow direction from peer to us is open.
    pub fn is_established(&self) -> bool {
        self.receiver.has_synced()
    }

    /// Advances the retransmission timer and, once both streams have finished,
    /// starts (and counts down) the linger period before the connection may be
    /// reaped.
    pub fn tick(&mut self, ms_since_last_tick: u64, transmit: impl FnMut(&TCPSenderMessage)) {
        self.sender.tick(ms_since_last_tick, transmit);

        if self.both_streams_finished() {
            let remaining = self.linger_remaining_ms.get_or_insert(LINGER_MS);
            *remaining = remaining.saturating_sub(ms_since_last_tick);
            if *remaining == 0 {
                debug!("connection {:?} finished lingering, ready to reap", self.quad);
            }
        }
    }

    fn both_streams_finished(&self) -> bool {
        self.sender.outbound_stream().is_finished() && self.receiver.inbound_stream().is_finished()
    }

    /// True once both streams are done and the sender has nothing left
    /// outstanding, and any linger period has fully elapsed.
    pub fn is_finished(&self) -> bool {
        self.both_streams_finished()
            && self.sender.sequence_numbers_in_flight() == 0
            && self.linger_remaining_ms == Some(0)
    }

    pub fn has_error(&self) -> bool {
        self.sender.outbound_stream().has_error() || self.receiver.inbound_stream().has_error()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::super::Dual;
    use super::*;

    fn quad() -> Quad {
        Quad {
            src: Dual { ipv4: Ipv4Addr::new(10, 0, 0, 1), port: 1000 },
            dst: Dual { ipv4: Ipv4Addr::new(10, 0, 0, 2), port: 80 },
        }
    }

    fn no_ack() -> TCPReceiverMessage {
        TCPReceiverMessage { ackno: None, window_size: 64, rst: false }
    }

    #[test]
    fn handshake_segment_produces_syn_ack() {
        let mut conn = TcpConnection::new(quad());
        let syn = TCPSenderMessage {
            seqno: Wrap32::new(42),
            syn: true,
            payload: Vec::new(),
            fin: false,
            rst: false,
        };
        let ack = conn.on_segment(syn, no_ack());
        assert_eq!(ack.ackno, Some(Wrap32::new(43)));
    }

    #[test]
    fn not_finished_until_both_sides_close_and_linger_elapses() {
        let mut conn = TcpConnection::new(quad());
        assert!(!conn.is_finished());

        conn.outbound_stream().close();
        let mut sent = Vec::new();
        conn.push(|m| sent.push(m.clone()));
        assert_eq!(sent.len(), 1);
        assert!(sent[0].syn);

        // Peer's SYN+FIN arrives, closing our receiver's inbound stream.
        conn.on_segment(
            TCPSenderMessage {
                seqno: Wrap32::new(0),
                syn: true,
                payload: Vec::new(),
                fin: true,
                rst: false,
            },
            no_ack(),
        );
        assert!(conn.inbound_stream().is_finished());

        // Peer acks our SYN and opens the window, then we flush FIN.
        let our_next = sent[0].seqno + sent[0].sequence_length() as u32;
        conn.on_segment(
            TCPSenderMessage {
                seqno: Wrap32::new(1),
                syn: false,
                payload: Vec::new(),
                fin: false,
                rst: false,
            },
            TCPReceiverMessage { ackno: Some(our_next), window_size: 64, rst: false },
        );
        sent.clear();
        conn.push(|m| sent.push(m.clone()));
        assert!(sent[0].fin);

        // Peer acks our FIN, draining the sender's outstanding queue.
        let final_seq = sent[0].seqno + sent[0].sequence_length() as u32;
        conn.on_segment(
            TCPSenderMessage {
                seqno: Wrap32::new(1),
                syn: false,
                payload: Vec::new(),
                fin: false,
                rst: false,
            },
            TCPReceiverMessage { ackno: Some(final_seq), window_size: 64, rst: false },
        );

        assert!(!conn.is_finished());
        conn.tick(LINGER_MS, |_| {});
        assert!(conn.is_finished());
    }
}
