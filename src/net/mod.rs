//! Link-layer plumbing: Ethernet/ARP framing and the [`NetworkInterface`] that
//! bridges IP datagrams to them.

pub mod arp;
pub mod ethernet;
pub mod interface;

pub use ethernet::{EthernetAddress, EthernetFrame, EthernetHeader};
pub use interface::{InternetDatagram, NetworkInterface};
