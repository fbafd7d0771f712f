//! Ethernet II framing: parse incoming frames, build and send outgoing
//! ones, dispatch by EtherType.

use alloc::vec::Vec;

use super::types::MacAddr;
use crate::drivers::netdev;

/// EtherType for ARP.
pub const ETHERTYPE_ARP: u16 = 0x0806;
/// EtherType for IPv4.
pub const ETHERTYPE_IPV4: u16 = 0x0800;

pub const ETH_HEADER_LEN: usize = 14;
/// Minimum frame size on the wire (before FCS); short frames are padded.
const MIN_FRAME: usize = 60;

/// A parsed frame borrowing the receive buffer.
pub struct EthFrame<'a> {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
    pub payload: &'a [u8],
}

/// Parse raw bytes. `None` when shorter than a header.
pub fn parse(data: &[u8]) -> Option<EthFrame<'_>> {
    if data.len() < ETH_HEADER_LEN {
        return None;
    }
    let dst = MacAddr([data[0], data[1], data[2], data[3], data[4], data[5]]);
    let src = MacAddr([data[6], data[7], data[8], data[9], data[10], data[11]]);
    let ethertype = u16::from_be_bytes([data[12], data[13]]);
    Some(EthFrame {
        dst,
        src,
        ethertype,
        payload: &data[ETH_HEADER_LEN..],
    })
}

/// Assemble a frame, zero-padding to the 60-byte minimum.
pub fn build_frame(dst: MacAddr, src: MacAddr, ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(ETH_HEADER_LEN + payload.len().max(MIN_FRAME));
    frame.extend_from_slice(&dst.0);
    frame.extend_from_slice(&src.0);
    frame.extend_from_slice(&ethertype.to_be_bytes());
    frame.extend_from_slice(payload);
    while frame.len() < MIN_FRAME {
        frame.push(0);
    }
    frame
}

/// Dispatch an incoming frame to the protocol handler for its EtherType.
pub fn handle_frame(data: &[u8]) {
    let frame = match parse(data) {
        Some(f) => f,
        None => return,
    };
    match frame.ethertype {
        ETHERTYPE_ARP => super::arp::handle(frame.payload),
        ETHERTYPE_IPV4 => super::ipv4::handle(frame.payload),
        _ => {}
    }
}

/// Build and transmit a frame from our station MAC.
pub fn send_frame(dst: MacAddr, ethertype: u16, payload: &[u8]) -> bool {
    let src = super::config().mac;
    let frame = build_frame(dst, src, ethertype, payload);
    netdev::transmit(&frame)
}
