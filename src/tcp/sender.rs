use std::collections::VecDeque;

use crate::byte_stream::ByteStream;
use crate::wrap32::Wrap32;

use super::timer::RetransmissionTimer;
use super::{TCPReceiverMessage, TCPSenderMessage, MAX_PAYLOAD_SIZE};

/// Segments outbound stream bytes honoring the peer's advertised window, keeps an
/// ordered outstanding-segment queue, and runs a single retransmission timer with
/// exponential backoff.
#[derive(Debug)]
pub struct TCPSender {
    input: ByteStream,
    isn: Wrap32,
    initial_rto_ms: u64,
    window_size: u16,

    syn_sent: bool,
    fin_sent: bool,

    stream_bytes_written: u64,
    consecutive_retransmissions: u64,
    sequence_numbers_in_flight: u64,
    timer: RetransmissionTimer,

    outstanding: VecDeque<TCPSenderMessage>,
}

impl TCPSender {
    pub fn new(input: ByteStream, isn: Wrap32, initial_rto_ms: u64) -> Self {
        TCPSender {
            input,
            isn,
            initial_rto_ms,
            window_size: 1,
            syn_sent: false,
            fin_sent: false,
            stream_bytes_written: 0,
            consecutive_retransmissions: 0,
            sequence_numbers_in_flight: 0,
            timer: RetransmissionTimer::new(initial_rto_ms),
            outstanding: VecDeque::new(),
        }
    }

    pub fn outbound_stream(&self) -> &ByteStream {
        &self.input
    }

    pub fn outbound_stream_mut(&mut self) -> &mut ByteStream {
        &mut self.input
    }

    pub fn sequence_numbers_in_flight(&self) -> u64 {
        self.sequence_numbers_in_flight
    }

    pub fn consecutive_retransmissions(&self) -> u64 {
        self.consecutive_retransmissions
    }

    fn next_seqno(&self) -> Wrap32 {
        self.isn + self.stream_bytes_written
    }

    /// A zero-payload segment carrying just the current sequence number and
    /// sticky RST flag, for when the caller only needs to piggyback an ack.
    pub fn empty_segment(&self) -> TCPSenderMessage {
        self.make_empty_message()
    }

    fn make_empty_message(&self) -> TCPSenderMessage {
        TCPSenderMessage {
            seqno: self.next_seqno(),
            syn: false,
            payload: Vec::new(),
            fin: false,
            rst: self.input.has_error(),
        }
    }

    /// Fills the window with as many segments as the peer's advertised window
    /// (or the zero-window probe floor of 1) allows.
    pub fn push(&mut self, mut transmit: impl FnMut(&TCPSenderMessage)) {
        let window = if self.window_size == 0 {
            1
        } else {
            self.window_size as u64
        };

        while window > self.sequence_numbers_in_flight {
            if self.fin_sent {
                break;
            }

            let mut msg = self.make_empty_message();
            if !self.syn_sent {
                msg.syn = true;
                self.syn_sent = true;
            }

            let available_space = window - self.sequence_numbers_in_flight;
            let payload_size =
                (MAX_PAYLOAD_SIZE as u64).min(available_space - msg.sequence_length()) as usize;

            while self.input.bytes_buffered() != 0 && msg.payload.len() < payload_size {
                let view = self.input.peek();
                let len = (payload_size - msg.payload.len()).min(view.len());
                msg.payload.extend_from_slice(&view[..len]);
                self.input.pop(len);
            }

            if !self.fin_sent
                && available_space > msg.sequence_length()
                && self.input.is_finished()
            {
                msg.fin = true;
                self.fin_sent = true;
            }

            if msg.sequence_length() == 0 {
                break;
            }

            transmit(&msg);
            if !self.timer.is_active() {
                self.timer.start();
            }
            self.stream_bytes_written += msg.sequence_length();
            self.sequence_numbers_in_flight += msg.sequence_length();
            self.outstanding.push_back(msg);
        }
    }

    pub fn receive(&mut self, msg: &TCPReceiverMessage) {
        if self.input.has_error() {
            return;
        }

        if msg.rst {
            self.input.set_error();
            return;
        }

        self.window_size = msg.window_size;

        let Some(ackno) = msg.ackno else {
            return;
        };

        let abs_ackno = ackno.unwrap(self.isn, self.stream_bytes_written);
        if abs_ackno > self.stream_bytes_written {
            // Ack for data we haven't sent yet.
            return;
        }

        let mut acknowledged_anything = false;
        while let Some(seg) = self.outstanding.front() {
            let seg_abs_seqno = seg.seqno.unwrap(self.isn, self.stream_bytes_written);
            let seg_end = seg_abs_seqno + seg.sequence_length();
            if seg_end <= abs_ackno {
                acknowledged_anything = true;
                self.sequence_numbers_in_flight -= seg.sequence_length();
                self.outstanding.pop_front();
            } else {
                break;
            }
        }

        if acknowledged_anything {
            self.consecutive_retransmissions = 0;
            self.timer.reload_rto(self.initial_rto_ms);
            if self.outstanding.is_empty() {
                self.timer.stop();
            } else {
                self.timer.start();
            }
        }
    }

    pub fn tick(&mut self, ms_since_last_tick: u64, mut transmit: impl FnMut(&TCPSenderMessage)) {
        self.timer.tick(ms_since_last_tick);
        if !self.timer.is_expired() {
            return;
        }

        let Some(head) = self.outstanding.front() else {
            return;
        };
        transmit(head);

        if self.window_size != 0 {
            self.consecutive_retransmissions += 1;
            self.timer.exponential_backoff();
        }
        self.timer.reset();
    }
}
