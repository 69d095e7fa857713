//! Builds and parses the IPv4+TCP byte layout a [`super::TcpConnection`] speaks
//! on the wire, bridging it to the `TCPSenderMessage`/`TCPReceiverMessage` pair
//! the core state machines exchange. Kept in the same manual byte-cursor style
//! as the teacher's original `generate_reset`/`generate_synack` helpers.

use std::io::Cursor;

use etherparse::{Ipv4Header, Ipv4HeaderSlice, TcpHeader, TcpHeaderSlice};

use crate::wrap32::Wrap32;

use super::{Dual, Quad, TCPReceiverMessage, TCPSenderMessage};

/// Builds the IPv4+TCP bytes for one outbound segment, piggybacking `seg`
/// (our data) and `ack` (our acknowledgement of the peer's data) in the
/// single physical segment, matching how a real TCP stream multiplexes both
/// onto one header.
pub fn build_segment(quad: &Quad, seg: &TCPSenderMessage, ack: &TCPReceiverMessage) -> Vec<u8> {
    let mut tcph = TcpHeader::new(quad.src.port, quad.dst.port, seg.seqno.raw_value(), ack.window_size);

    tcph.syn = seg.syn;
    tcph.fin = seg.fin;
    tcph.rst = seg.rst || ack.rst;
    if let Some(ackno) = ack.ackno {
        tcph.ack = true;
        tcph.acknowledgment_number = ackno.raw_value();
    }

    let ip4h = Ipv4Header::new(
        tcph.header_len() + seg.payload.len() as u16,
        64,
        6,
        quad.src.ipv4.octets(),
        quad.dst.ipv4.octets(),
    );

    tcph.checksum = tcph
        .calc_checksum_ipv4(&ip4h, &seg.payload)
        .expect("payload size fits in a u16 TCP segment");

    let mut cursor = Cursor::new(Vec::with_capacity(ip4h.header_len() + tcph.header_len() as usize + seg.payload.len()));
    ip4h.write(&mut cursor).expect("writing to an in-memory buffer never fails");
    tcph.write(&mut cursor).expect("writing to an in-memory buffer never fails");
    std::io::Write::write_all(&mut cursor, &seg.payload).expect("writing to an in-memory buffer never fails");
    cursor.into_inner()
}

/// Parses an inbound IPv4+TCP segment into the four-tuple identifying the
/// connection plus the data half and ack half a [`super::TcpConnection`]
/// expects. `Quad.src` is always the *local* endpoint and `Quad.dst` the
/// *remote* one (matching [`build_segment`]'s convention), which means the
/// wire's source/destination are swapped relative to this packet having just
/// arrived from the remote side.
pub fn parse_segment(bytes: &[u8]) -> Option<(Quad, TCPSenderMessage, TCPReceiverMessage)> {
    let ip4h = Ipv4HeaderSlice::from_slice(bytes).ok()?;
    let ihl = (ip4h.ihl() * 4) as usize;
    let tcph = TcpHeaderSlice::from_slice(&bytes[ihl..]).ok()?;
    let data_offset = (tcph.data_offset() * 4) as usize;
    let payload = bytes[ihl + data_offset..].to_vec();

    let quad = Quad {
        src: Dual { ipv4: ip4h.destination_addr(), port: tcph.destination_port() },
        dst: Dual { ipv4: ip4h.source_addr(), port: tcph.source_port() },
    };

    let seg = TCPSenderMessage {
        seqno: Wrap32::new(tcph.sequence_number()),
        syn: tcph.syn(),
        payload,
        fin: tcph.fin(),
        rst: tcph.rst(),
    };

    let ack = TCPReceiverMessage {
        ackno: tcph.ack().then(|| Wrap32::new(tcph.acknowledgment_number())),
        window_size: tcph.window_size(),
        rst: tcph.rst(),
    };

    Some((quad, seg, ack))
}

/// Builds a bare RST segment answering a segment that arrived for a
/// connection the manager has no record of, per RFC 9293 ("If the incoming
/// segment has the ACK bit set, the reset takes its sequence number from the
/// ACK field... otherwise the reset has sequence number zero").
pub fn build_reset(ip4h: &Ipv4HeaderSlice, tcph: &TcpHeaderSlice, data: &[u8]) -> Vec<u8> {
    let seqno = if tcph.ack() { tcph.acknowledgment_number() } else { 0 };
    let ackno = tcph.sequence_number() + data.len() as u32 + tcph.syn() as u32;

    let mut reset_tcph = TcpHeader::new(tcph.destination_port(), tcph.source_port(), seqno, 0);
    reset_tcph.ack = true;
    reset_tcph.rst = true;
    reset_tcph.acknowledgment_number = ackno;

    let reset_ip4h = Ipv4Header::new(reset_tcph.header_len(), 64, 6, ip4h.destination(), ip4h.source());
    reset_tcph.checksum = reset_tcph
        .calc_checksum_ipv4(&reset_ip4h, &[])
        .expect("empty payload always fits the checksum");

    let mut cursor = Cursor::new(Vec::with_capacity(reset_ip4h.header_len() + reset_tcph.header_len() as usize));
    reset_ip4h.write(&mut cursor).expect("writing to an in-memory buffer never fails");
    reset_tcph.write(&mut cursor).expect("writing to an in-memory buffer never fails");
    cursor.into_inner()
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn quad() -> Quad {
        Quad {
            src: Dual { ipv4: Ipv4Addr::new(10, 0, 0, 1), port: 1234 },
            dst: Dual { ipv4: Ipv4Addr::new(10, 0, 0, 2), port: 80 },
        }
    }

    #[test]
    fn build_then_parse_round_trips_data_and_ack() {
        // `q` is the connection as the remote peer sees it (their local, our
        // remote); the bytes it builds are what arrives at us, so parsing
        // them back should yield the quad with src/dst swapped.
        let q = quad();
        let seg = TCPSenderMessage {
            seqno: Wrap32::new(100),
            syn: false,
            payload: b"hello".to_vec(),
            fin: true,
            rst: false,
        };
        let ack = TCPReceiverMessage { ackno: Some(Wrap32::new(500)), window_size: 4096, rst: false };

        let bytes = build_segment(&q, &seg, &ack);
        let (parsed_quad, parsed_seg, parsed_ack) = parse_segment(&bytes).unwrap();

        assert_eq!(parsed_quad, Quad { src: q.dst, dst: q.src });
        assert_eq!(parsed_seg.seqno, seg.seqno);
        assert_eq!(parsed_seg.payload, seg.payload);
        assert!(parsed_seg.fin);
        assert_eq!(parsed_ack.ackno, ack.ackno);
        assert_eq!(parsed_ack.window_size, ack.window_size);
    }
}
