//! IPv4: header construction, routing, inbound filtering and dispatch.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use super::checksum;
use super::ethernet::{self, ETHERTYPE_IPV4};
use super::types::{Ipv4Addr, MacAddr};
use super::NetError;

pub const IPV4_HEADER_LEN: usize = 20;
/// Largest payload that fits one frame alongside the IP header.
pub const MAX_PAYLOAD: usize = 1480;

pub const PROTO_ICMP: u8 = 1;
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

static IP_ID: AtomicU32 = AtomicU32::new(0);

/// A parsed IPv4 packet borrowing the frame buffer.
pub struct Ipv4Packet<'a> {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: u8,
    pub ttl: u8,
    pub payload: &'a [u8],
}

/// Parse and validate version, IHL, and total length.
pub fn parse(data: &[u8]) -> Option<Ipv4Packet<'_>> {
    if data.len() < IPV4_HEADER_LEN {
        return None;
    }
    if data[0] >> 4 != 4 {
        return None;
    }
    let header_len = ((data[0] & 0x0F) as usize) * 4;
    if header_len < IPV4_HEADER_LEN || data.len() < header_len {
        return None;
    }
    let total_len = u16::from_be_bytes([data[2], data[3]]) as usize;
    if total_len < header_len || total_len > data.len() {
        return None;
    }

    Some(Ipv4Packet {
        src: Ipv4Addr([data[12], data[13], data[14], data[15]]),
        dst: Ipv4Addr([data[16], data[17], data[18], data[19]]),
        protocol: data[9],
        ttl: data[8],
        payload: &data[header_len..total_len],
    })
}

/// Route and transmit one datagram: resolve the next hop, prepend the
/// Ethernet + IPv4 headers, checksum, send.
pub fn send(dst: Ipv4Addr, protocol: u8, payload: &[u8]) -> Result<(), NetError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(NetError::TooLarge);
    }

    let cfg = super::config();
    let total_len = IPV4_HEADER_LEN + payload.len();

    let mut header = [0u8; IPV4_HEADER_LEN];
    header[0] = 0x45; // version 4, IHL 5
    header[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
    let id = IP_ID.fetch_add(1, Ordering::Relaxed) as u16;
    header[4..6].copy_from_slice(&id.to_be_bytes());
    header[6] = 0x40; // don't fragment
    header[8] = 64; // TTL
    header[9] = protocol;
    header[12..16].copy_from_slice(&cfg.ip.0);
    header[16..20].copy_from_slice(&dst.0);

    let cksum = checksum::internet_checksum(&header);
    header[10..12].copy_from_slice(&cksum.to_be_bytes());

    let dst_mac = if dst == Ipv4Addr::BROADCAST {
        MacAddr::BROADCAST
    } else {
        super::arp::resolve(dst, 1000).ok_or(NetError::ArpTimeout)?
    };

    let mut packet = Vec::with_capacity(total_len);
    packet.extend_from_slice(&header);
    packet.extend_from_slice(payload);

    if ethernet::send_frame(dst_mac, ETHERTYPE_IPV4, &packet) {
        Ok(())
    } else {
        Err(NetError::NoDriver)
    }
}

/// Inbound path: accept packets addressed to us (or broadcast), hand the
/// payload to the matching protocol.
pub fn handle(data: &[u8]) {
    let pkt = match parse(data) {
        Some(p) => p,
        None => return,
    };

    let cfg = super::config();
    if pkt.dst != cfg.ip && pkt.dst != Ipv4Addr::BROADCAST {
        return;
    }

    match pkt.protocol {
        PROTO_ICMP => super::icmp::handle(&pkt),
        PROTO_UDP => super::udp::handle(&pkt),
        PROTO_TCP => super::tcp::handle(&pkt),
        _ => {}
    }
}
