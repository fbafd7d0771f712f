//! ICMP echo: outbound ping with RTT measurement, inbound echo mirror.
//!
//! The reply state (`received`/`seq`/`rtt`) is shared between the poll
//! loop and the RX path, so it lives in atomics.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::checksum;
use super::ipv4::{self, Ipv4Packet, PROTO_ICMP};
use super::types::Ipv4Addr;
use crate::arch::hal;

const ICMP_ECHO_REPLY: u8 = 0;
const ICMP_ECHO_REQUEST: u8 = 8;

/// Fixed identifier carried by our echo requests.
const ECHO_IDENT: u16 = 0x1234;
/// Echo payload: 4-byte send timestamp plus filler.
const ECHO_DATA_LEN: usize = 32;
/// How long `ping` waits for its reply.
const PING_TIMEOUT_MS: u32 = 3000;

static PING_RECEIVED: AtomicBool = AtomicBool::new(false);
static PING_SEQ: AtomicU32 = AtomicU32::new(0);
static PING_RTT: AtomicU32 = AtomicU32::new(0);

/// Ping failure stages, distinguishable by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PingError {
    /// Next-hop MAC never resolved.
    ArpFailed,
    /// No matching reply within the timeout.
    Timeout,
}

/// Send one echo request and wait for the matching reply.
/// Returns the round-trip time in milliseconds.
pub fn ping(dst: Ipv4Addr, seq: u16) -> Result<u32, PingError> {
    let mut icmp = [0u8; 8 + ECHO_DATA_LEN];
    icmp[0] = ICMP_ECHO_REQUEST;
    icmp[4..6].copy_from_slice(&ECHO_IDENT.to_be_bytes());
    icmp[6..8].copy_from_slice(&seq.to_be_bytes());

    // Payload: millisecond send timestamp, then alphabet filler.
    let sent_ms = super::now_ms();
    icmp[8..12].copy_from_slice(&sent_ms.to_be_bytes());
    for i in 4..ECHO_DATA_LEN {
        icmp[8 + i] = b'A' + (i % 26) as u8;
    }

    let cksum = checksum::internet_checksum(&icmp);
    icmp[2..4].copy_from_slice(&cksum.to_be_bytes());

    PING_RECEIVED.store(false, Ordering::SeqCst);
    PING_SEQ.store(seq as u32, Ordering::SeqCst);

    ipv4::send(dst, PROTO_ICMP, &icmp).map_err(|_| PingError::ArpFailed)?;

    let start = hal::get_ticks();
    let deadline = super::ms_to_ticks(PING_TIMEOUT_MS);
    loop {
        super::poll();
        if PING_RECEIVED.load(Ordering::SeqCst)
            && PING_SEQ.load(Ordering::SeqCst) == seq as u32
        {
            return Ok(PING_RTT.load(Ordering::SeqCst));
        }
        if hal::get_ticks().wrapping_sub(start) >= deadline {
            return Err(PingError::Timeout);
        }
        core::hint::spin_loop();
    }
}

/// Inbound ICMP: mirror echo requests, record echo replies.
pub fn handle(pkt: &Ipv4Packet<'_>) {
    let data = pkt.payload;
    if data.len() < 8 {
        return;
    }

    let icmp_type = data[0];
    let code = data[1];
    let seq = u16::from_be_bytes([data[6], data[7]]);

    match (icmp_type, code) {
        (ICMP_ECHO_REPLY, 0) => {
            let rtt = if data.len() >= 12 {
                let sent_ms =
                    u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
                super::now_ms().wrapping_sub(sent_ms)
            } else {
                0
            };
            PING_RTT.store(rtt, Ordering::SeqCst);
            PING_SEQ.store(seq as u32, Ordering::SeqCst);
            PING_RECEIVED.store(true, Ordering::SeqCst);
        }
        (ICMP_ECHO_REQUEST, 0) => {
            // Mirror the request: flip the type, redo the checksum.
            let mut reply = Vec::from(data);
            reply[0] = ICMP_ECHO_REPLY;
            reply[2] = 0;
            reply[3] = 0;
            let cksum = checksum::internet_checksum(&reply);
            reply[2..4].copy_from_slice(&cksum.to_be_bytes());
            let _ = ipv4::send(pkt.src, PROTO_ICMP, &reply);
        }
        _ => {}
    }
}
