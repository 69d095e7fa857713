use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;

use log::{debug, trace, warn};

use super::arp::{ArpMessage, OPCODE_REPLY, OPCODE_REQUEST};
use super::ethernet::{EthernetAddress, EthernetFrame, BROADCAST, ETHERTYPE_ARP, ETHERTYPE_IPV4};

/// Already-serialized IPv4 datagram bytes. Parsing/building the datagram itself is
/// delegated elsewhere (here, to `etherparse` at the call sites that need to read a
/// header field); the interface only ever moves the bytes around.
pub type InternetDatagram = Vec<u8>;

const ARP_CACHE_TTL_MS: u64 = 30_000;
const ARP_REQUEST_TIMEOUT_MS: u64 = 5_000;

fn ipv4_to_u32(addr: Ipv4Addr) -> u32 {
    u32::from_be_bytes(addr.octets())
}

/// Bridges IP datagrams and Ethernet frames: implements ARP request/reply, an ARP
/// cache with a 30s TTL, and a per-next-hop queue of datagrams awaiting resolution.
#[derive(Debug)]
pub struct NetworkInterface {
    ethernet_address: EthernetAddress,
    ip_address: Ipv4Addr,

    arp_cache: HashMap<u32, (EthernetAddress, u64)>,
    arp_requests: HashMap<u32, u64>,
    waiting_frames: HashMap<u32, VecDeque<InternetDatagram>>,

    current_time: u64,

    outbound: VecDeque<EthernetFrame>,
    inbound: VecDeque<InternetDatagram>,
}

impl NetworkInterface {
    pub fn new(ethernet_address: EthernetAddress, ip_address: Ipv4Addr) -> Self {
        debug!(
            "network interface up: ethernet={:02x?} ip={}",
            ethernet_address, ip_address
        );
        NetworkInterface {
            ethernet_address,
            ip_address,
            arp_cache: HashMap::new(),
            arp_requests: HashMap::new(),
            waiting_frames: HashMap::new(),
            current_time: 0,
            outbound: VecDeque::new(),
            inbound: VecDeque::new(),
        }
    }

    /// Drains and returns the frames ready for transmission, in FIFO order.
    pub fn drain_outbound(&mut self) -> Vec<EthernetFrame> {
        self.outbound.drain(..).collect()
    }

    /// Drains and returns the IPv4 datagrams received so far, in FIFO order.
    pub fn drain_inbound(&mut self) -> Vec<InternetDatagram> {
        self.inbound.drain(..).collect()
    }

    fn make_arp(
        &self,
        opcode: u16,
        target_ethernet_address: EthernetAddress,
        target_ip_address: u32,
    ) -> ArpMessage {
        ArpMessage::new(
            opcode,
            self.ethernet_address,
            ipv4_to_u32(self.ip_address),
            target_ethernet_address,
            target_ip_address,
        )
    }

    /// Sends `dgram` toward `next_hop`: transmits immediately if the next hop's MAC
    /// is cached, otherwise queues the datagram and (if no request is already
    /// outstanding) broadcasts an ARP request.
    pub fn send_datagram(&mut self, dgram: InternetDatagram, next_hop: Ipv4Addr) {
        let next_hop_ip = ipv4_to_u32(next_hop);

        if let Some(&(mac, _)) = self.arp_cache.get(&next_hop_ip) {
            let frame = EthernetFrame::new(mac, self.ethernet_address, ETHERTYPE_IPV4, dgram);
            self.outbound.push_back(frame);
            return;
        }

        self.waiting_frames
            .entry(next_hop_ip)
            .or_default()
            .push_back(dgram);

        if !self.arp_requests.contains_key(&next_hop_ip) {
            let arp_req = self.make_arp(OPCODE_REQUEST, [0; 6], next_hop_ip);
            let frame = EthernetFrame::new(
                BROADCAST,
                self.ethernet_address,
                ETHERTYPE_ARP,
                arp_req.serialize(),
            );
            self.arp_requests.insert(next_hop_ip, self.current_time);
            self.outbound.push_back(frame);
            trace!("arp request sent for {next_hop}");
        }
    }

    /// Processes an incoming Ethernet frame: drops frames not addressed to us,
    /// queues IPv4 payloads, and handles ARP request/reply bookkeeping.
    pub fn recv_frame(&mut self, frame: EthernetFrame) {
        if frame.header.dst != self.ethernet_address && frame.header.dst != BROADCAST {
            return;
        }

        match frame.header.ethertype {
            ETHERTYPE_IPV4 => {
                self.inbound.push_back(frame.payload);
            }
            ETHERTYPE_ARP => {
                let Some(arp_msg) = ArpMessage::parse(&frame.payload) else {
                    warn!("dropping malformed ARP payload");
                    return;
                };

                self.arp_cache.insert(
                    arp_msg.sender_ip_address,
                    (arp_msg.sender_ethernet_address, self.current_time),
                );

                if arp_msg.opcode == OPCODE_REPLY {
                    if let Some(mut queue) = self.waiting_frames.remove(&arp_msg.sender_ip_address)
                    {
                        while let Some(dgram) = queue.pop_front() {
                            let out = EthernetFrame::new(
                                arp_msg.sender_ethernet_address,
                                self.ethernet_address,
                                ETHERTYPE_IPV4,
                                dgram,
                            );
                            self.outbound.push_back(out);
                        }
                    }
                }

                if arp_msg.opcode == OPCODE_REQUEST
                    && arp_msg.target_ip_address == ipv4_to_u32(self.ip_address)
                {
                    let reply = self.make_arp(
                        OPCODE_REPLY,
                        arp_msg.sender_ethernet_address,
                        arp_msg.sender_ip_address,
                    );
                    let out = EthernetFrame::new(
                        arp_msg.sender_ethernet_address,
                        self.ethernet_address,
                        ETHERTYPE_ARP,
                        reply.serialize(),
                    );
                    self.outbound.push_back(out);
                }
            }
            _ => {}
        }
    }

    /// Advances the interface's clock, evicting stale ARP cache entries and
    /// abandoning ARP requests that never got a reply (dropping their waiting
    /// datagrams along with them).
    pub fn tick(&mut self, ms_since_last_tick: u64) {
        self.current_time += ms_since_last_tick;

        self.arp_cache
            .retain(|_, &mut (_, learned_at)| self.current_time - learned_at <= ARP_CACHE_TTL_MS);

        let expired: Vec<u32> = self
            .arp_requests
            .iter()
            .filter(|&(_, &sent_at)| self.current_time - sent_at > ARP_REQUEST_TIMEOUT_MS)
            .map(|(&ip, _)| ip)
            .collect();

        for ip in expired {
            self.arp_requests.remove(&ip);
            self.waiting_frames.remove(&ip);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUR_MAC: EthernetAddress = [0x02, 0, 0, 0, 0, 1];
    const PEER_MAC: EthernetAddress = [0x02, 0, 0, 0, 0, 2];

    fn iface() -> NetworkInterface {
        NetworkInterface::new(OUR_MAC, "10.0.0.1".parse().unwrap())
    }

    #[test]
    fn unresolved_next_hop_queues_and_broadcasts_arp_request() {
        let mut nic = iface();
        nic.send_datagram(vec![1, 2, 3], "10.0.0.2".parse().unwrap());

        let frames = nic.drain_outbound();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.dst, BROADCAST);
        assert_eq!(frames[0].header.ethertype, ETHERTYPE_ARP);
    }

    #[test]
    fn arp_reply_flushes_waiting_datagrams_in_order() {
        let mut nic = iface();
        let dst: Ipv4Addr = "10.0.0.2".parse().unwrap();
        nic.send_datagram(vec![1], dst);
        nic.send_datagram(vec![2], dst);
        nic.drain_outbound();

        let reply = ArpMessage::new(OPCODE_REPLY, PEER_MAC, ipv4_to_u32(dst), OUR_MAC, ipv4_to_u32("10.0.0.1".parse().unwrap()));
        nic.recv_frame(EthernetFrame::new(OUR_MAC, PEER_MAC, ETHERTYPE_ARP, reply.serialize()));

        let frames = nic.drain_outbound();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload, vec![1]);
        assert_eq!(frames[1].payload, vec![2]);
        assert!(frames.iter().all(|f| f.header.dst == PEER_MAC));
    }

    #[test]
    fn second_send_within_ttl_transmits_immediately_without_new_arp() {
        let mut nic = iface();
        let dst: Ipv4Addr = "10.0.0.2".parse().unwrap();
        nic.send_datagram(vec![1], dst);
        nic.drain_outbound();

        let reply = ArpMessage::new(OPCODE_REPLY, PEER_MAC, ipv4_to_u32(dst), OUR_MAC, ipv4_to_u32("10.0.0.1".parse().unwrap()));
        nic.recv_frame(EthernetFrame::new(OUR_MAC, PEER_MAC, ETHERTYPE_ARP, reply.serialize()));
        nic.drain_outbound();

        nic.send_datagram(vec![2], dst);
        let frames = nic.drain_outbound();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.ethertype, ETHERTYPE_IPV4);
    }

    #[test]
    fn arp_request_for_our_ip_gets_a_unicast_reply() {
        let mut nic = iface();
        let req = ArpMessage::new(
            OPCODE_REQUEST,
            PEER_MAC,
            ipv4_to_u32("10.0.0.2".parse().unwrap()),
            [0; 6],
            ipv4_to_u32("10.0.0.1".parse().unwrap()),
        );
        nic.recv_frame(EthernetFrame::new(BROADCAST, PEER_MAC, ETHERTYPE_ARP, req.serialize()));

        let frames = nic.drain_outbound();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.dst, PEER_MAC);
        let reply = ArpMessage::parse(&frames[0].payload).unwrap();
        assert_eq!(reply.opcode, OPCODE_REPLY);
    }

    #[test]
    fn frames_not_addressed_to_us_are_dropped() {
        let mut nic = iface();
        let other: EthernetAddress = [9; 6];
        nic.recv_frame(EthernetFrame::new(other, PEER_MAC, ETHERTYPE_IPV4, vec![1, 2]));
        assert!(nic.drain_inbound().is_empty());
    }

    #[test]
    fn arp_cache_entries_expire_after_ttl() {
        let mut nic = iface();
        let dst: Ipv4Addr = "10.0.0.2".parse().unwrap();
        let reply = ArpMessage::new(OPCODE_REPLY, PEER_MAC, ipv4_to_u32(dst), OUR_MAC, ipv4_to_u32("10.0.0.1".parse().unwrap()));
        nic.recv_frame(EthernetFrame::new(OUR_MAC, PEER_MAC, ETHERTYPE_ARP, reply.serialize()));

        nic.tick(30_001);
        nic.send_datagram(vec![1], dst);
        let frames = nic.drain_outbound();
        // Cache expired, so this should be a fresh ARP request, not an IPv4 frame.
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.ethertype, ETHERTYPE_ARP);
    }

    #[test]
    fn abandoned_arp_request_drops_waiting_datagrams() {
        let mut nic = iface();
        let dst: Ipv4Addr = "10.0.0.2".parse().unwrap();
        nic.send_datagram(vec![1], dst);
        nic.drain_outbound();

        nic.tick(5_001);

        let reply = ArpMessage::new(OPCODE_REPLY, PEER_MAC, ipv4_to_u32(dst), OUR_MAC, ipv4_to_u32("10.0.0.1".parse().unwrap()));
        nic.recv_frame(EthernetFrame::new(OUR_MAC, PEER_MAC, ETHERTYPE_ARP, reply.serialize()));
        // The waiting datagram was already dropped with the abandoned request, so
        // the reply should flush nothing.
        assert!(nic.drain_outbound().is_empty());
    }
}
