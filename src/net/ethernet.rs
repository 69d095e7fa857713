//! Ethernet frame header: `{dst[6], src[6], type[2 big-endian]}` followed by payload.
//!
//! Hand-rolled in the same byte-cursor style as the teacher's `tcp::ioutil`
//! segment builders rather than pulled in from a crate — neither `etherparse` nor
//! any other pack dependency models the link layer, so this follows the teacher's
//! own manual-encoding idiom instead of inventing a new one.

pub type EthernetAddress = [u8; 6];

pub const BROADCAST: EthernetAddress = [0xff; 6];

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;

const HEADER_LEN: usize = 14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: EthernetAddress,
    pub src: EthernetAddress,
    pub ethertype: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetFrame {
    pub header: EthernetHeader,
    pub payload: Vec<u8>,
}

impl EthernetFrame {
    pub fn new(dst: EthernetAddress, src: EthernetAddress, ethertype: u16, payload: Vec<u8>) -> Self {
        EthernetFrame {
            header: EthernetHeader { dst, src, ethertype },
            payload,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.header.dst);
        out.extend_from_slice(&self.header.src);
        out.extend_from_slice(&self.header.ethertype.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&bytes[0..6]);
        src.copy_from_slice(&bytes[6..12]);
        let ethertype = u16::from_be_bytes([bytes[12], bytes[13]]);
        Some(EthernetFrame {
            header: EthernetHeader { dst, src, ethertype },
            payload: bytes[HEADER_LEN..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_header_and_payload() {
        let frame = EthernetFrame::new([1; 6], [2; 6], ETHERTYPE_ARP, vec![9, 9, 9]);
        let bytes = frame.serialize();
        let parsed = EthernetFrame::parse(&bytes).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn rejects_short_buffers() {
        assert!(EthernetFrame::parse(&[0u8; 10]).is_none());
    }
}
