//! Network stack coordinator.
//!
//! Owns the global interface configuration, drives the RX path from
//! blocking waits (`poll`), and exposes the per-protocol submodules.
//! RX is poll-driven by design: blocking socket operations call
//! [`poll`] in their wait loops instead of relying on NIC interrupts.

pub mod arp;
pub mod checksum;
pub mod dns;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod tcp;
pub mod types;
pub mod udp;

use crate::drivers::netdev;
use crate::sync::spinlock::Spinlock;
use types::{Ipv4Addr, MacAddr, NetConfig};

/// Errors surfaced by the stack. Callers map these to user-facing text;
/// each failure stage is distinguishable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetError {
    /// No NIC registered.
    NoDriver,
    /// Payload exceeds what one frame can carry.
    TooLarge,
    /// ARP resolution timed out.
    ArpTimeout,
    /// The operation's deadline passed.
    Timeout,
    /// Bad or unallocated socket handle.
    BadSocket,
    /// Socket table exhausted.
    TableFull,
    /// Operation requires an established connection.
    NotConnected,
}

static NET_CONFIG: Spinlock<NetConfig> = Spinlock::new(NetConfig::new());

/// Initialize the stack. Call after a NIC driver has registered.
pub fn init() {
    let mac = MacAddr(netdev::mac().unwrap_or([0; 6]));
    {
        let mut cfg = NET_CONFIG.lock();
        cfg.mac = mac;
        cfg.ip = Ipv4Addr::new(10, 0, 0, 2);
        cfg.mask = Ipv4Addr::new(255, 255, 255, 0);
        cfg.gateway = Ipv4Addr::new(10, 0, 0, 1);
        cfg.dns = Ipv4Addr::new(8, 8, 8, 8);
    }

    arp::init();
    udp::init();
    tcp::init();

    log::info!("network stack up (MAC={}, IP=10.0.0.2/24)", mac);
}

/// Snapshot of the interface configuration.
pub fn config() -> NetConfig {
    *NET_CONFIG.lock()
}

/// Replace addressing (e.g. `nifconfig ip ...`).
pub fn set_ip(ip: Ipv4Addr) {
    NET_CONFIG.lock().ip = ip;
}

pub fn set_gateway(gw: Ipv4Addr) {
    NET_CONFIG.lock().gateway = gw;
}

pub fn set_netmask(mask: Ipv4Addr) {
    NET_CONFIG.lock().mask = mask;
}

pub fn set_dns(server: Ipv4Addr) {
    NET_CONFIG.lock().dns = server;
}

/// Drain the NIC receive ring, dispatching every complete frame up the
/// stack. Safe to call re-entrantly (a protocol handler that needs an ARP
/// answer polls again while its own frame is being processed).
pub fn poll() {
    loop {
        let mut buf = [0u8; netdev::MAX_FRAME];
        match netdev::receive(&mut buf) {
            Some(len) => ethernet::handle_frame(&buf[..len]),
            None => break,
        }
    }
}

/// Convert a millisecond deadline to timer ticks (never zero).
pub(crate) fn ms_to_ticks(ms: u32) -> u32 {
    let ticks = ms / 10;
    if ticks == 0 {
        1
    } else {
        ticks
    }
}

/// Milliseconds since boot, for RTT stamps.
pub(crate) fn now_ms() -> u32 {
    crate::arch::hal::get_ticks().wrapping_mul(10)
}
