use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write as _};
use std::net::Ipv4Addr;
use std::os::fd::AsRawFd;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use log::{debug, trace, warn};
use nix::poll::{poll, PollFd, PollFlags};
use rand::Rng;
use tidy_tuntap::Tun;

mod err;
pub use err::*;

pub mod byte_stream;
pub mod net;
pub mod reassembler;
pub mod tcp;
pub mod wrap32;

mod logging;
pub use logging::init_logger;

use net::{EthernetFrame, NetworkInterface};
use tcp::ioutil::{build_reset, build_segment, parse_segment};
use tcp::{Dual, Quad, TcpConnection, TcpListener, TcpStream};

/// How often the background loop advances every connection's clock, win a
/// tight poll/tick cadence without spinning the CPU. The same cadence drives
/// `NetworkInterface::tick`, aging its ARP cache and outstanding requests.
const TICK_MS: u64 = 1;
const POLL_TIMEOUT_MS: i32 = 1;

/// Largest Ethernet frame the tap device hands us: a full IPv4 datagram plus
/// the 14-byte Ethernet header.
const FRAME_BUF_LEN: usize = 1514;

#[derive(Debug)]
pub(crate) struct EstabElement {
    pub(crate) quad: Quad,
    pub(crate) rvar: Arc<Condvar>,
    pub(crate) wvar: Arc<Condvar>,
}

#[derive(Debug)]
pub(crate) struct EstabEntry {
    pub(crate) cvar: Arc<Condvar>,
    pub(crate) elts: Vec<EstabElement>,
}

#[derive(Debug)]
pub(crate) struct StreamEntry {
    pub(crate) conn: TcpConnection,
    pub(crate) rvar: Arc<Condvar>,
    pub(crate) wvar: Arc<Condvar>,
}

/// Owns every live connection and listening port, plus the shared link-layer
/// interface, behind a single lock, mirroring the teacher's original design of
/// one mutex guarding the whole stack rather than per-connection locks.
#[derive(Debug)]
pub struct Manager {
    pub(crate) bounded: HashSet<u16>,
    pub(crate) established: HashMap<u16, EstabEntry>,
    pub(crate) streams: HashMap<Quad, StreamEntry>,
    pub(crate) iface: NetworkInterface,
}

#[derive(Debug)]
pub struct NetStack {
    manager: Arc<Mutex<Manager>>,
    local_addr: Ipv4Addr,
    jh: thread::JoinHandle<()>,
}

/// Draws a locally-administered, unicast Ethernet address for this stack's
/// side of the tap device.
fn random_ethernet_address() -> net::EthernetAddress {
    let mut addr: net::EthernetAddress = rand::random();
    addr[0] = (addr[0] & 0xfe) | 0x02;
    addr
}

impl NetStack {
    pub fn new(name: &str, addr: Ipv4Addr, mask: Ipv4Addr) -> Result<Self, Error> {
        // `true` requests a tap device: the ARP resolution `NetworkInterface`
        // performs needs real Ethernet framing underneath, which a tun device
        // (IP packets only, no link layer) can't carry.
        let tun = Tun::new(name, true)?;
        tun.set_addr(addr)?;
        tun.set_netmask(mask)?;
        tun.bring_up()?;

        let ethernet_address = random_ethernet_address();
        let iface = NetworkInterface::new(ethernet_address, addr);
        let manager = Arc::new(Mutex::new(Manager {
            bounded: HashSet::new(),
            established: HashMap::new(),
            streams: HashMap::new(),
            iface,
        }));

        let jh = {
            let manager = manager.clone();
            thread::spawn(move || segment_loop(tun, manager))
        };

        debug!("net stack up on {name} ({addr}/{mask}), mac {ethernet_address:02x?}");

        Ok(NetStack { manager, local_addr: addr, jh })
    }

    pub fn bind(&mut self, port: u16) -> Result<TcpListener, Error> {
        let mut manager = self.manager.lock().unwrap();

        match manager.established.entry(port) {
            Entry::Occupied(_) => Err(Error::PortInUse(port)),
            Entry::Vacant(v) => {
                let cvar = Arc::new(Condvar::new());
                v.insert(EstabEntry { cvar: cvar.clone(), elts: Vec::new() });
                manager.bounded.insert(port);

                Ok(TcpListener { port, manager: self.manager.clone(), cvar })
            }
        }
    }

    /// Actively opens a connection to `(remote_ip, remote_port)` from a random
    /// unused local port, and blocks until the peer's SYN is observed.
    pub fn connect(&mut self, remote_ip: Ipv4Addr, remote_port: u16) -> Result<TcpStream, Error> {
        let mut manager = self.manager.lock().unwrap();

        let local_port = loop {
            let candidate: u16 = rand::thread_rng().gen_range(49152..=65535);
            let quad = Quad {
                src: Dual { ipv4: self.local_addr, port: candidate },
                dst: Dual { ipv4: remote_ip, port: remote_port },
            };
            if !manager.streams.contains_key(&quad) {
                break candidate;
            }
        };

        let quad = Quad {
            src: Dual { ipv4: self.local_addr, port: local_port },
            dst: Dual { ipv4: remote_ip, port: remote_port },
        };

        let conn = TcpConnection::new(quad);
        let rvar = Arc::new(Condvar::new());
        let wvar = Arc::new(Condvar::new());

        manager.streams.insert(quad, StreamEntry { conn, rvar: rvar.clone(), wvar: wvar.clone() });

        // Kick off the handshake: push() emits the SYN, which the tick loop
        // will actually write to the TUN device on its next pass.
        trace!("connecting to {remote_ip}:{remote_port} from local port {local_port}");

        manager = rvar
            .wait_while(manager, |manager| {
                manager
                    .streams
                    .get(&quad)
                    .map(|entry| !entry.conn.is_established() && !entry.conn.has_error())
                    .unwrap_or(false)
            })
            .unwrap();

        let entry = manager.streams.get(&quad).ok_or(Error::ConnectionReset)?;
        if entry.conn.has_error() {
            return Err(Error::ConnectionReset);
        }

        Ok(TcpStream { manager: self.manager.clone(), quad, rvar, wvar, write_closed: false })
    }

    pub fn join(self) {
        self.jh.join().unwrap();
    }
}

fn flush_outbound(tun: &mut Tun, iface: &mut NetworkInterface) {
    for frame in iface.drain_outbound() {
        if let Err(e) = tun.write_all(&frame.serialize()) {
            warn!("failed to write frame to tap device: {e}");
        }
    }
}

fn segment_loop(mut tun: Tun, manager: Arc<Mutex<Manager>>) -> ! {
    loop {
        {
            let mut manager = manager.lock().unwrap();
            let quads: Vec<Quad> = manager.streams.keys().copied().collect();

            let mut to_reap = Vec::new();
            for quad in quads {
                let mut outgoing = Vec::new();
                let entry = manager.streams.get_mut(&quad).unwrap();
                entry.conn.tick(TICK_MS, |msg| outgoing.push(msg.clone()));
                let ack = entry.conn.send_ack();
                let finished = entry.conn.is_finished();
                let rvar = entry.rvar.clone();
                let wvar = entry.wvar.clone();

                for msg in &outgoing {
                    let bytes = build_segment(&quad, msg, &ack);
                    manager.iface.send_datagram(bytes, quad.dst.ipv4);
                }
                if !outgoing.is_empty() {
                    wvar.notify_all();
                    rvar.notify_all();
                }
                if finished {
                    to_reap.push((quad, rvar, wvar));
                }
            }
            for (quad, rvar, wvar) in to_reap {
                manager.streams.remove(&quad);
                rvar.notify_all();
                wvar.notify_all();
                debug!("reaped finished connection {quad:?}");
            }

            manager.iface.tick(TICK_MS);
            flush_outbound(&mut tun, &mut manager.iface);
        }

        let mut pfd = [PollFd::new(tun.as_raw_fd(), PollFlags::POLLIN)];
        match poll(&mut pfd[..], POLL_TIMEOUT_MS) {
            Ok(0) | Err(_) => continue,
            Ok(_) => {}
        }

        let mut buf = [0u8; FRAME_BUF_LEN];
        let n = match tun.read(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                warn!("tap read failed: {e}");
                continue;
            }
        };

        let Some(frame) = EthernetFrame::parse(&buf[..n]) else {
            continue;
        };

        let mut manager = manager.lock().unwrap();
        manager.iface.recv_frame(frame);

        for dgram in manager.iface.drain_inbound() {
            let Some((quad, seg, peer_ack)) = parse_segment(&dgram) else {
                continue;
            };

            if let Some(entry) = manager.streams.get_mut(&quad) {
                let our_ack = entry.conn.on_segment(seg, peer_ack);
                let mut outgoing = Vec::new();
                entry.conn.push(|msg| outgoing.push(msg.clone()));

                let rvar = entry.rvar.clone();
                let wvar = entry.wvar.clone();

                if outgoing.is_empty() {
                    let bytes = build_segment(&quad, &entry.conn.ack_only_segment(), &our_ack);
                    manager.iface.send_datagram(bytes, quad.dst.ipv4);
                } else {
                    for msg in &outgoing {
                        let bytes = build_segment(&quad, msg, &our_ack);
                        manager.iface.send_datagram(bytes, quad.dst.ipv4);
                    }
                }

                rvar.notify_all();
                wvar.notify_all();
            } else if manager.bounded.contains(&quad.src.port) {
                if !seg.syn {
                    continue;
                }

                let mut conn = TcpConnection::new(quad);
                let our_ack = conn.on_segment(seg, peer_ack);
                let mut outgoing = Vec::new();
                conn.push(|msg| outgoing.push(msg.clone()));

                for msg in &outgoing {
                    let bytes = build_segment(&quad, msg, &our_ack);
                    manager.iface.send_datagram(bytes, quad.dst.ipv4);
                }

                let rvar = Arc::new(Condvar::new());
                let wvar = Arc::new(Condvar::new());
                manager.streams.insert(quad, StreamEntry { conn, rvar: rvar.clone(), wvar: wvar.clone() });

                if let Some(entry) = manager.established.get_mut(&quad.src.port) {
                    entry.elts.push(EstabElement { quad, rvar, wvar });
                    entry.cvar.notify_one();
                }
            } else {
                if seg.rst {
                    continue;
                }
                let Ok(ip4h) = etherparse::Ipv4HeaderSlice::from_slice(&dgram) else { continue };
                let ihl = (ip4h.ihl() * 4) as usize;
                let Ok(tcph) = etherparse::TcpHeaderSlice::from_slice(&dgram[ihl..]) else { continue };
                let data = &dgram[ihl + (tcph.data_offset() * 4) as usize..];
                let bytes = build_reset(&ip4h, &tcph, data);
                manager.iface.send_datagram(bytes, quad.dst.ipv4);
            }
        }

        flush_outbound(&mut tun, &mut manager.iface);
    }
}
