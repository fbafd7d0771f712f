//! UDP datagram sockets.
//!
//! A fixed pool of sockets, each bound to one local port with a single
//! datagram of receive buffering: a newly arrived datagram overwrites an
//! undelivered one (drop-oldest per socket). The checksum is transmitted
//! as zero, which IPv4 permits.

use super::ipv4::{self, Ipv4Packet, PROTO_UDP};
use super::types::Ipv4Addr;
use super::NetError;
use crate::arch::hal;
use crate::sync::spinlock::Spinlock;

pub const MAX_UDP_SOCKETS: usize = 8;
pub const UDP_RECV_BUF: usize = 512;

const UDP_HEADER_LEN: usize = 8;
/// Largest datagram payload fitting one frame.
const MAX_DATAGRAM: usize = 1472;

struct UdpSocket {
    local_port: u16,
    in_use: bool,
    has_data: bool,
    recv_len: usize,
    from_ip: Ipv4Addr,
    from_port: u16,
    recv_buf: [u8; UDP_RECV_BUF],
}

const EMPTY_SOCKET: UdpSocket = UdpSocket {
    local_port: 0,
    in_use: false,
    has_data: false,
    recv_len: 0,
    from_ip: Ipv4Addr::ZERO,
    from_port: 0,
    recv_buf: [0; UDP_RECV_BUF],
};

static SOCKETS: Spinlock<[UdpSocket; MAX_UDP_SOCKETS]> =
    Spinlock::new([EMPTY_SOCKET; MAX_UDP_SOCKETS]);

/// Release every socket.
pub fn init() {
    let mut sockets = SOCKETS.lock();
    for s in sockets.iter_mut() {
        s.in_use = false;
    }
}

/// Open a socket bound to `local_port`.
pub fn socket(local_port: u16) -> Result<usize, NetError> {
    let mut sockets = SOCKETS.lock();
    for (i, s) in sockets.iter_mut().enumerate() {
        if !s.in_use {
            s.in_use = true;
            s.local_port = local_port;
            s.has_data = false;
            s.recv_len = 0;
            return Ok(i);
        }
    }
    Err(NetError::TableFull)
}

/// Close a socket.
pub fn close(sock: usize) {
    let mut sockets = SOCKETS.lock();
    if sock < MAX_UDP_SOCKETS {
        sockets[sock].in_use = false;
    }
}

/// Send one datagram from the socket's bound port.
pub fn send(
    sock: usize,
    dst_ip: Ipv4Addr,
    dst_port: u16,
    data: &[u8],
) -> Result<(), NetError> {
    if data.len() > MAX_DATAGRAM {
        return Err(NetError::TooLarge);
    }
    let src_port = {
        let sockets = SOCKETS.lock();
        let s = sockets.get(sock).filter(|s| s.in_use).ok_or(NetError::BadSocket)?;
        s.local_port
    };

    let udp_len = UDP_HEADER_LEN + data.len();
    let mut dgram = alloc::vec::Vec::with_capacity(udp_len);
    dgram.extend_from_slice(&src_port.to_be_bytes());
    dgram.extend_from_slice(&dst_port.to_be_bytes());
    dgram.extend_from_slice(&(udp_len as u16).to_be_bytes());
    dgram.extend_from_slice(&0u16.to_be_bytes()); // checksum: legal zero
    dgram.extend_from_slice(data);

    ipv4::send(dst_ip, PROTO_UDP, &dgram)
}

/// Inbound path: deliver to the socket bound to the destination port,
/// overwriting any undelivered datagram.
pub fn handle(pkt: &Ipv4Packet<'_>) {
    let data = pkt.payload;
    if data.len() < UDP_HEADER_LEN {
        return;
    }

    let src_port = u16::from_be_bytes([data[0], data[1]]);
    let dst_port = u16::from_be_bytes([data[2], data[3]]);
    let udp_len = u16::from_be_bytes([data[4], data[5]]) as usize;
    if udp_len < UDP_HEADER_LEN || udp_len > data.len() {
        return;
    }

    let payload = &data[UDP_HEADER_LEN..udp_len];
    let copy_len = payload.len().min(UDP_RECV_BUF);

    let mut sockets = SOCKETS.lock();
    if let Some(s) = sockets.iter_mut().find(|s| s.in_use && s.local_port == dst_port) {
        s.recv_buf[..copy_len].copy_from_slice(&payload[..copy_len]);
        s.recv_len = copy_len;
        s.from_ip = pkt.src;
        s.from_port = src_port;
        s.has_data = true;
    }
}

/// Receive a datagram, polling the network until one arrives or
/// `timeout_ms` passes. Returns the byte count and the sender's address.
pub fn recv(
    sock: usize,
    buf: &mut [u8],
    timeout_ms: u32,
) -> Result<(usize, Ipv4Addr, u16), NetError> {
    {
        let sockets = SOCKETS.lock();
        sockets.get(sock).filter(|s| s.in_use).ok_or(NetError::BadSocket)?;
    }

    let start = hal::get_ticks();
    let deadline = super::ms_to_ticks(timeout_ms);
    loop {
        super::poll();

        {
            let mut sockets = SOCKETS.lock();
            let s = &mut sockets[sock];
            if s.has_data {
                let n = s.recv_len.min(buf.len());
                buf[..n].copy_from_slice(&s.recv_buf[..n]);
                s.has_data = false;
                return Ok((n, s.from_ip, s.from_port));
            }
        }

        if hal::get_ticks().wrapping_sub(start) >= deadline {
            return Err(NetError::Timeout);
        }
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::netdev;
    use crate::net::types::MacAddr;

    fn setup() {
        netdev::register_test_nic();
        crate::net::init();
    }

    fn udp_ip_packet(src: Ipv4Addr, src_port: u16, dst_port: u16, payload: &[u8]) -> alloc::vec::Vec<u8> {
        let udp_len = 8 + payload.len();
        let total = 20 + udp_len;
        let mut ip = alloc::vec![0u8; total];
        ip[0] = 0x45;
        ip[2..4].copy_from_slice(&(total as u16).to_be_bytes());
        ip[9] = PROTO_UDP;
        ip[12..16].copy_from_slice(&src.0);
        ip[16..20].copy_from_slice(&crate::net::config().ip.0);
        ip[20..22].copy_from_slice(&src_port.to_be_bytes());
        ip[22..24].copy_from_slice(&dst_port.to_be_bytes());
        ip[24..26].copy_from_slice(&(udp_len as u16).to_be_bytes());
        ip[28..].copy_from_slice(payload);
        ip
    }

    #[test]
    fn send_produces_zero_checksum_header() {
        let _guard = crate::test_sync::lock();
        setup();

        let dst = Ipv4Addr::new(10, 0, 0, 8);
        crate::net::arp::insert(dst, MacAddr([5, 5, 5, 5, 5, 5]));
        let sock = socket(4000).unwrap();
        netdev::take_tx_frames();

        send(sock, dst, 5000, b"hello udp").unwrap();

        let frames = netdev::take_tx_frames();
        assert_eq!(frames.len(), 1);
        let udp = &frames[0][34..];
        assert_eq!(u16::from_be_bytes([udp[0], udp[1]]), 4000);
        assert_eq!(u16::from_be_bytes([udp[2], udp[3]]), 5000);
        assert_eq!(u16::from_be_bytes([udp[4], udp[5]]), 17);
        assert_eq!(u16::from_be_bytes([udp[6], udp[7]]), 0);
        assert_eq!(&udp[8..17], b"hello udp");
        close(sock);
    }

    #[test]
    fn delivery_and_drop_oldest() {
        let _guard = crate::test_sync::lock();
        setup();

        let sock = socket(6000).unwrap();
        let peer = Ipv4Addr::new(10, 0, 0, 40);

        netdev::inject_rx_frame(&crate::net::ethernet::build_frame(
            crate::net::config().mac,
            MacAddr([6; 6]),
            crate::net::ethernet::ETHERTYPE_IPV4,
            &udp_ip_packet(peer, 1111, 6000, b"first"),
        ));
        netdev::inject_rx_frame(&crate::net::ethernet::build_frame(
            crate::net::config().mac,
            MacAddr([6; 6]),
            crate::net::ethernet::ETHERTYPE_IPV4,
            &udp_ip_packet(peer, 2222, 6000, b"second"),
        ));

        // Both frames arrive in one poll: the second overwrites the first.
        let mut buf = [0u8; 64];
        let (n, from_ip, from_port) = recv(sock, &mut buf, 100).unwrap();
        assert_eq!(&buf[..n], b"second");
        assert_eq!(from_ip, peer);
        assert_eq!(from_port, 2222);

        // Nothing further queued.
        assert_eq!(recv(sock, &mut buf, 30), Err(NetError::Timeout));
        close(sock);
    }

    #[test]
    fn unbound_port_is_dropped() {
        let _guard = crate::test_sync::lock();
        setup();
        let sock = socket(7000).unwrap();

        netdev::inject_rx_frame(&crate::net::ethernet::build_frame(
            crate::net::config().mac,
            MacAddr([6; 6]),
            crate::net::ethernet::ETHERTYPE_IPV4,
            &udp_ip_packet(Ipv4Addr::new(10, 0, 0, 41), 1, 9999, b"stray"),
        ));

        let mut buf = [0u8; 16];
        assert_eq!(recv(sock, &mut buf, 30), Err(NetError::Timeout));
        close(sock);
    }

    #[test]
    fn socket_pool_exhaustion() {
        let _guard = crate::test_sync::lock();
        setup();
        let mut socks = alloc::vec::Vec::new();
        for i in 0..MAX_UDP_SOCKETS as u16 {
            socks.push(socket(8000 + i).unwrap());
        }
        assert_eq!(socket(9000), Err(NetError::TableFull));
        for s in socks {
            close(s);
        }
    }

    #[test]
    fn bad_socket_operations_rejected() {
        let _guard = crate::test_sync::lock();
        setup();
        let mut buf = [0u8; 4];
        assert_eq!(recv(99, &mut buf, 10), Err(NetError::BadSocket));
        assert_eq!(
            send(99, Ipv4Addr::new(10, 0, 0, 1), 1, b"x"),
            Err(NetError::BadSocket)
        );
    }
}
