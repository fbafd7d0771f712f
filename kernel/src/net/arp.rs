//! ARP: IPv4-to-MAC resolution with a fixed-size cache.
//!
//! The cache holds 16 entries, at most one per IP; when full, the entry
//! with the oldest timestamp is replaced. Every incoming ARP packet
//! teaches us the sender's mapping; requests for our address get a
//! unicast reply.

use alloc::vec::Vec;

use super::ethernet::{self, ETHERTYPE_ARP};
use super::types::{Ipv4Addr, MacAddr};
use crate::arch::hal;
use crate::sync::spinlock::Spinlock;

pub const ARP_CACHE_SIZE: usize = 16;

const ARP_PACKET_LEN: usize = 28;
const HW_ETHERNET: u16 = 1;
const PROTO_IPV4: u16 = 0x0800;
const OP_REQUEST: u16 = 1;
const OP_REPLY: u16 = 2;

#[derive(Clone, Copy)]
struct ArpEntry {
    ip: Ipv4Addr,
    mac: MacAddr,
    timestamp: u32,
    valid: bool,
}

const EMPTY_ENTRY: ArpEntry = ArpEntry {
    ip: Ipv4Addr::ZERO,
    mac: MacAddr::ZERO,
    timestamp: 0,
    valid: false,
};

static CACHE: Spinlock<[ArpEntry; ARP_CACHE_SIZE]> =
    Spinlock::new([EMPTY_ENTRY; ARP_CACHE_SIZE]);

/// Flush the cache.
pub fn init() {
    let mut cache = CACHE.lock();
    for e in cache.iter_mut() {
        e.valid = false;
    }
}

/// Cached MAC for `ip`, if known.
pub fn lookup(ip: Ipv4Addr) -> Option<MacAddr> {
    let cache = CACHE.lock();
    cache
        .iter()
        .find(|e| e.valid && e.ip == ip)
        .map(|e| e.mac)
}

/// Learn (or refresh) a mapping. Replaces the oldest entry when full.
pub fn insert(ip: Ipv4Addr, mac: MacAddr) {
    let now = hal::get_ticks();
    let mut cache = CACHE.lock();

    if let Some(e) = cache.iter_mut().find(|e| e.valid && e.ip == ip) {
        e.mac = mac;
        e.timestamp = now;
        return;
    }

    let slot = cache
        .iter()
        .position(|e| !e.valid)
        .unwrap_or_else(|| {
            let mut oldest = 0;
            let mut oldest_time = u32::MAX;
            for (i, e) in cache.iter().enumerate() {
                if e.timestamp < oldest_time {
                    oldest_time = e.timestamp;
                    oldest = i;
                }
            }
            oldest
        });

    cache[slot] = ArpEntry {
        ip,
        mac,
        timestamp: now,
        valid: true,
    };
}

/// Snapshot of valid entries, for `narp`.
pub fn entries() -> Vec<(Ipv4Addr, MacAddr)> {
    let cache = CACHE.lock();
    cache
        .iter()
        .filter(|e| e.valid)
        .map(|e| (e.ip, e.mac))
        .collect()
}

fn build_packet(
    op: u16,
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) -> [u8; ARP_PACKET_LEN] {
    let mut pkt = [0u8; ARP_PACKET_LEN];
    pkt[0..2].copy_from_slice(&HW_ETHERNET.to_be_bytes());
    pkt[2..4].copy_from_slice(&PROTO_IPV4.to_be_bytes());
    pkt[4] = 6; // hardware address length
    pkt[5] = 4; // protocol address length
    pkt[6..8].copy_from_slice(&op.to_be_bytes());
    pkt[8..14].copy_from_slice(&sender_mac.0);
    pkt[14..18].copy_from_slice(&sender_ip.0);
    pkt[18..24].copy_from_slice(&target_mac.0);
    pkt[24..28].copy_from_slice(&target_ip.0);
    pkt
}

/// Broadcast a who-has request for `target_ip`.
pub fn request(target_ip: Ipv4Addr) {
    let cfg = super::config();
    let pkt = build_packet(OP_REQUEST, cfg.mac, cfg.ip, MacAddr::ZERO, target_ip);
    ethernet::send_frame(MacAddr::BROADCAST, ETHERTYPE_ARP, &pkt);
}

/// Resolve `ip` to a MAC, waiting up to `timeout_ms`.
///
/// Off-subnet destinations resolve to the configured gateway instead.
/// The wait loop polls the network until a reply lands in the cache.
pub fn resolve(ip: Ipv4Addr, timeout_ms: u32) -> Option<MacAddr> {
    if ip == Ipv4Addr::BROADCAST {
        return Some(MacAddr::BROADCAST);
    }

    let cfg = super::config();
    let target = if cfg.is_local(ip) || cfg.gateway == Ipv4Addr::ZERO {
        ip
    } else {
        cfg.gateway
    };

    if let Some(mac) = lookup(target) {
        return Some(mac);
    }

    request(target);

    let start = hal::get_ticks();
    let deadline = super::ms_to_ticks(timeout_ms);
    loop {
        super::poll();
        if let Some(mac) = lookup(target) {
            return Some(mac);
        }
        if hal::get_ticks().wrapping_sub(start) >= deadline {
            return None;
        }
        core::hint::spin_loop();
    }
}

/// Process one incoming ARP packet: learn the sender, answer requests
/// aimed at us.
pub fn handle(packet: &[u8]) {
    if packet.len() < ARP_PACKET_LEN {
        return;
    }

    let hw = u16::from_be_bytes([packet[0], packet[1]]);
    let proto = u16::from_be_bytes([packet[2], packet[3]]);
    if hw != HW_ETHERNET || proto != PROTO_IPV4 {
        return;
    }

    let op = u16::from_be_bytes([packet[6], packet[7]]);
    let sender_mac = MacAddr([
        packet[8], packet[9], packet[10], packet[11], packet[12], packet[13],
    ]);
    let sender_ip = Ipv4Addr([packet[14], packet[15], packet[16], packet[17]]);
    let target_ip = Ipv4Addr([packet[24], packet[25], packet[26], packet[27]]);

    // Every ARP packet teaches us the sender.
    insert(sender_ip, sender_mac);

    let cfg = super::config();
    if op == OP_REQUEST && target_ip == cfg.ip {
        let reply = build_packet(OP_REPLY, cfg.mac, cfg.ip, sender_mac, sender_ip);
        ethernet::send_frame(sender_mac, ETHERTYPE_ARP, &reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::netdev;

    fn setup() {
        netdev::register_test_nic();
        super::super::init();
    }

    #[test]
    fn cache_learns_from_requests_and_replies() {
        let _guard = crate::test_sync::lock();
        setup();

        let peer_ip = Ipv4Addr::new(10, 0, 0, 9);
        let peer_mac = MacAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

        // Request not aimed at us: still learned, no reply sent.
        let req = build_packet(
            OP_REQUEST,
            peer_mac,
            peer_ip,
            MacAddr::ZERO,
            Ipv4Addr::new(10, 0, 0, 50),
        );
        netdev::take_tx_frames();
        handle(&req);
        assert_eq!(lookup(peer_ip), Some(peer_mac));
        assert!(netdev::take_tx_frames().is_empty());

        // Reply from another peer: learned too.
        let peer2_ip = Ipv4Addr::new(10, 0, 0, 10);
        let peer2_mac = MacAddr([1, 1, 1, 1, 1, 1]);
        let rep = build_packet(OP_REPLY, peer2_mac, peer2_ip, super::super::config().mac, super::super::config().ip);
        handle(&rep);
        assert_eq!(lookup(peer2_ip), Some(peer2_mac));
    }

    #[test]
    fn request_for_our_ip_gets_unicast_reply() {
        let _guard = crate::test_sync::lock();
        setup();

        let peer_ip = Ipv4Addr::new(10, 0, 0, 7);
        let peer_mac = MacAddr([2, 2, 2, 2, 2, 2]);
        let req = build_packet(OP_REQUEST, peer_mac, peer_ip, MacAddr::ZERO, super::super::config().ip);

        netdev::take_tx_frames();
        handle(&req);

        let frames = netdev::take_tx_frames();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        // Unicast back to the asker
        assert_eq!(&frame[0..6], &peer_mac.0);
        // EtherType ARP, opcode reply, answering with our mapping
        assert_eq!(u16::from_be_bytes([frame[12], frame[13]]), ETHERTYPE_ARP);
        let arp = &frame[14..];
        assert_eq!(u16::from_be_bytes([arp[6], arp[7]]), OP_REPLY);
        assert_eq!(&arp[8..14], &super::super::config().mac.0);
        assert_eq!(&arp[14..18], &super::super::config().ip.0);
    }

    #[test]
    fn one_entry_per_ip_and_lru_replacement() {
        let _guard = crate::test_sync::lock();
        setup();

        let ip = Ipv4Addr::new(10, 0, 0, 3);
        insert(ip, MacAddr([1, 0, 0, 0, 0, 1]));
        insert(ip, MacAddr([2, 0, 0, 0, 0, 2]));
        assert_eq!(lookup(ip), Some(MacAddr([2, 0, 0, 0, 0, 2])));
        assert_eq!(entries().iter().filter(|(e, _)| *e == ip).count(), 1);

        // Fill the rest of the cache, then one more: the stalest goes.
        for i in 0..ARP_CACHE_SIZE as u8 {
            insert(Ipv4Addr::new(172, 16, 0, i), MacAddr([i; 6]));
        }
        assert_eq!(entries().len(), ARP_CACHE_SIZE);
        // The original entry was the oldest and has been evicted.
        assert_eq!(lookup(ip), None);
    }

    #[test]
    fn resolve_times_out_without_a_reply() {
        let _guard = crate::test_sync::lock();
        setup();

        let unanswered = Ipv4Addr::new(10, 0, 0, 200);
        assert_eq!(resolve(unanswered, 50), None);
        // A broadcast resolve needs no cache at all.
        assert_eq!(resolve(Ipv4Addr::BROADCAST, 50), Some(MacAddr::BROADCAST));
    }

    #[test]
    fn off_subnet_resolution_goes_through_gateway() {
        let _guard = crate::test_sync::lock();
        setup();

        let gw = super::super::config().gateway;
        let gw_mac = MacAddr([9, 9, 9, 9, 9, 9]);
        insert(gw, gw_mac);

        // 8.8.8.8 is off-subnet: the gateway's MAC answers for it.
        assert_eq!(resolve(Ipv4Addr::new(8, 8, 8, 8), 50), Some(gw_mac));
    }
}
