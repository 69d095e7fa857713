//! ARP message encode/decode.
//!
//! Field layout follows RFC 826: hardware type Ethernet (1), protocol type IPv4
//! (0x0800), hardware/protocol address lengths 6/4, a 2-byte opcode, then
//! sender/target hardware+protocol addresses. No crate in the retrieval pack
//! implements ARP; the byte layout here mirrors the one used by the kernel-level
//! network stack found alongside the teacher in the retrieval pack.

use super::ethernet::EthernetAddress;

pub const OPCODE_REQUEST: u16 = 1;
pub const OPCODE_REPLY: u16 = 2;

const HW_TYPE_ETHERNET: u16 = 1;
const PROTO_TYPE_IPV4: u16 = 0x0800;
const HW_ADDR_LEN: u8 = 6;
const PROTO_ADDR_LEN: u8 = 4;

pub const ARP_MESSAGE_LEN: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpMessage {
    pub opcode: u16,
    pub sender_ethernet_address: EthernetAddress,
    pub sender_ip_address: u32,
    pub target_ethernet_address: EthernetAddress,
    pub target_ip_address: u32,
}

impl ArpMessage {
    pub fn new(
        opcode: u16,
        sender_ethernet_address: EthernetAddress,
        sender_ip_address: u32,
        target_ethernet_address: EthernetAddress,
        target_ip_address: u32,
    ) -> Self {
        ArpMessage {
            opcode,
            sender_ethernet_address,
            sender_ip_address,
            target_ethernet_address,
            target_ip_address,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ARP_MESSAGE_LEN);
        out.extend_from_slice(&HW_TYPE_ETHERNET.to_be_bytes());
        out.extend_from_slice(&PROTO_TYPE_IPV4.to_be_bytes());
        out.push(HW_ADDR_LEN);
        out.push(PROTO_ADDR_LEN);
        out.extend_from_slice(&self.opcode.to_be_bytes());
        out.extend_from_slice(&self.sender_ethernet_address);
        out.extend_from_slice(&self.sender_ip_address.to_be_bytes());
        out.extend_from_slice(&self.target_ethernet_address);
        out.extend_from_slice(&self.target_ip_address.to_be_bytes());
        out
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < ARP_MESSAGE_LEN {
            return None;
        }
        let hw_type = u16::from_be_bytes([bytes[0], bytes[1]]);
        let proto_type = u16::from_be_bytes([bytes[2], bytes[3]]);
        if hw_type != HW_TYPE_ETHERNET || proto_type != PROTO_TYPE_IPV4 {
            return None;
        }
        if bytes[4] != HW_ADDR_LEN || bytes[5] != PROTO_ADDR_LEN {
            return None;
        }
        let opcode = u16::from_be_bytes([bytes[6], bytes[7]]);

        let mut sender_ethernet_address = [0u8; 6];
        sender_ethernet_address.copy_from_slice(&bytes[8..14]);
        let sender_ip_address = u32::from_be_bytes(bytes[14..18].try_into().unwrap());

        let mut target_ethernet_address = [0u8; 6];
        target_ethernet_address.copy_from_slice(&bytes[18..24]);
        let target_ip_address = u32::from_be_bytes(bytes[24..28].try_into().unwrap());

        Some(ArpMessage {
            opcode,
            sender_ethernet_address,
            sender_ip_address,
            target_ethernet_address,
            target_ip_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let msg = ArpMessage::new(OPCODE_REQUEST, [1; 6], 0x0A000001, [0; 6], 0x0A000002);
        let bytes = msg.serialize();
        assert_eq!(bytes.len(), ARP_MESSAGE_LEN);
        assert_eq!(ArpMessage::parse(&bytes), Some(msg));
    }

    #[test]
    fn rejects_wrong_hardware_or_protocol_type() {
        let mut bytes = ArpMessage::new(OPCODE_REPLY, [1; 6], 1, [2; 6], 2).serialize();
        bytes[1] = 0x02; // corrupt hardware type
        assert_eq!(ArpMessage::parse(&bytes), None);
    }
}
