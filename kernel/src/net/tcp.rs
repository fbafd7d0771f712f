//! TCP with the reduced RFC 793 state machine.
//!
//! Fixed table of 16 sockets with bounded receive/send buffers. Supported:
//! active and passive open, data transfer with cumulative ACKs, orderly
//! close through FIN_WAIT1/2, CLOSE_WAIT and LAST_ACK. Deliberately
//! absent: retransmission, congestion control, and RST generation for
//! unmatched segments (they are dropped silently).
//!
//! Incoming segments are processed under the table lock, but every reply
//! segment is staged and transmitted after the lock is released: the send
//! path may block in ARP resolution, which itself polls the receive path.

use bitflags::bitflags;

use super::checksum;
use super::ipv4::{self, Ipv4Packet, PROTO_TCP};
use super::types::Ipv4Addr;
use super::NetError;
use crate::arch::hal;
use crate::sync::spinlock::Spinlock;
use core::sync::atomic::{AtomicU32, Ordering};

pub const MAX_TCP_SOCKETS: usize = 16;
/// Receive/send buffer size per socket.
pub const TCP_BUF_SIZE: usize = 4096;

const TCP_HEADER_LEN: usize = 20;
/// How long an active open waits for the handshake.
const CONNECT_TIMEOUT_MS: u32 = 5000;

bitflags! {
    /// TCP header flag bits.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct TcpFlags: u8 {
        const FIN = 0x01;
        const SYN = 0x02;
        const RST = 0x04;
        const PSH = 0x08;
        const ACK = 0x10;
        const URG = 0x20;
    }
}

/// Connection states (RFC 793, reduced set).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TcpState {
    Closed,
    Listen,
    SynSent,
    SynRcvd,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    LastAck,
    TimeWait,
}

struct TcpSocket {
    state: TcpState,
    local_port: u16,
    remote_ip: Ipv4Addr,
    remote_port: u16,
    /// Next sequence number we will send.
    seq_num: u32,
    /// Next sequence number expected from the peer.
    ack_num: u32,
    send_window: u32,
    recv_window: u32,
    recv_buf: [u8; TCP_BUF_SIZE],
    recv_len: usize,
    send_buf: [u8; TCP_BUF_SIZE],
    send_len: usize,
    in_use: bool,
}

const CLOSED_SOCKET: TcpSocket = TcpSocket {
    state: TcpState::Closed,
    local_port: 0,
    remote_ip: Ipv4Addr::ZERO,
    remote_port: 0,
    seq_num: 0,
    ack_num: 0,
    send_window: 0,
    recv_window: TCP_BUF_SIZE as u32,
    recv_buf: [0; TCP_BUF_SIZE],
    recv_len: 0,
    send_buf: [0; TCP_BUF_SIZE],
    send_len: 0,
    in_use: false,
};

static SOCKETS: Spinlock<[TcpSocket; MAX_TCP_SOCKETS]> =
    Spinlock::new([CLOSED_SOCKET; MAX_TCP_SOCKETS]);

/// Global initial-sequence-number counter, seeded from the timer so
/// concurrent connects do not collide.
static ISN: AtomicU32 = AtomicU32::new(0);

/// Reset the socket table and seed the ISN counter.
pub fn init() {
    let mut sockets = SOCKETS.lock();
    for s in sockets.iter_mut() {
        s.in_use = false;
        s.state = TcpState::Closed;
    }
    ISN.store(hal::get_ticks(), Ordering::SeqCst);
}

/// Allocate a socket. TIME_WAIT leftovers are recycled when nothing else
/// is free (there is no 2MSL timer to reap them).
pub fn tcp_socket() -> Result<usize, NetError> {
    let mut sockets = SOCKETS.lock();
    let slot = sockets
        .iter()
        .position(|s| !s.in_use)
        .or_else(|| {
            sockets
                .iter()
                .position(|s| s.in_use && s.state == TcpState::TimeWait)
        })
        .ok_or(NetError::TableFull)?;

    let s = &mut sockets[slot];
    *s = CLOSED_SOCKET;
    s.in_use = true;
    s.seq_num = ISN.fetch_add(1, Ordering::SeqCst);
    Ok(slot)
}

/// Bind to a local port.
pub fn tcp_bind(sock: usize, port: u16) -> Result<(), NetError> {
    let mut sockets = SOCKETS.lock();
    let s = sockets.get_mut(sock).filter(|s| s.in_use).ok_or(NetError::BadSocket)?;
    s.local_port = port;
    Ok(())
}

/// Passive open.
pub fn tcp_listen(sock: usize) -> Result<(), NetError> {
    let mut sockets = SOCKETS.lock();
    let s = sockets.get_mut(sock).filter(|s| s.in_use).ok_or(NetError::BadSocket)?;
    s.state = TcpState::Listen;
    Ok(())
}

/// Current connection state, if the socket is live.
pub fn status(sock: usize) -> Option<TcpState> {
    let sockets = SOCKETS.lock();
    sockets.get(sock).filter(|s| s.in_use).map(|s| s.state)
}

/// Connection listing for `nnetstat`.
pub struct TcpConnInfo {
    pub local_port: u16,
    pub remote_ip: Ipv4Addr,
    pub remote_port: u16,
    pub state: TcpState,
}

pub fn connections() -> alloc::vec::Vec<TcpConnInfo> {
    let sockets = SOCKETS.lock();
    sockets
        .iter()
        .filter(|s| s.in_use)
        .map(|s| TcpConnInfo {
            local_port: s.local_port,
            remote_ip: s.remote_ip,
            remote_port: s.remote_port,
            state: s.state,
        })
        .collect()
}

pub fn state_name(state: TcpState) -> &'static str {
    match state {
        TcpState::Closed => "CLOSED",
        TcpState::Listen => "LISTEN",
        TcpState::SynSent => "SYN_SENT",
        TcpState::SynRcvd => "SYN_RCVD",
        TcpState::Established => "ESTABLISHED",
        TcpState::FinWait1 => "FIN_WAIT1",
        TcpState::FinWait2 => "FIN_WAIT2",
        TcpState::CloseWait => "CLOSE_WAIT",
        TcpState::LastAck => "LAST_ACK",
        TcpState::TimeWait => "TIME_WAIT",
    }
}

// ── Segment transmission ────────────────────────────────────────────

/// Everything needed to emit one segment after the table lock is gone.
struct SegmentOut {
    local_port: u16,
    remote_ip: Ipv4Addr,
    remote_port: u16,
    seq: u32,
    ack: u32,
    flags: TcpFlags,
    window: u16,
}

fn send_segment(out: &SegmentOut, payload: &[u8]) -> Result<(), NetError> {
    let cfg = super::config();
    let mut segment = alloc::vec::Vec::with_capacity(TCP_HEADER_LEN + payload.len());
    segment.extend_from_slice(&out.local_port.to_be_bytes());
    segment.extend_from_slice(&out.remote_port.to_be_bytes());
    segment.extend_from_slice(&out.seq.to_be_bytes());
    segment.extend_from_slice(&out.ack.to_be_bytes());
    segment.push(0x50); // data offset 5, no options
    segment.push(out.flags.bits());
    segment.extend_from_slice(&out.window.to_be_bytes());
    segment.extend_from_slice(&[0, 0]); // checksum placeholder
    segment.extend_from_slice(&[0, 0]); // urgent pointer
    segment.extend_from_slice(payload);

    let cksum =
        checksum::transport_checksum(&cfg.ip.0, &out.remote_ip.0, PROTO_TCP, &segment);
    segment[16..18].copy_from_slice(&cksum.to_be_bytes());

    ipv4::send(out.remote_ip, PROTO_TCP, &segment)
}

fn segment_for(s: &TcpSocket, flags: TcpFlags) -> SegmentOut {
    SegmentOut {
        local_port: s.local_port,
        remote_ip: s.remote_ip,
        remote_port: s.remote_port,
        seq: s.seq_num,
        ack: s.ack_num,
        flags,
        window: s.recv_window.min(65535) as u16,
    }
}

fn advertised_window(s: &TcpSocket) -> u32 {
    (TCP_BUF_SIZE - s.recv_len) as u32
}

// ── Active open / data / close ──────────────────────────────────────

/// Connect to `remote_ip:remote_port`. Picks an ephemeral local port when
/// unbound, sends SYN, and polls for the handshake to complete.
pub fn tcp_connect(sock: usize, remote_ip: Ipv4Addr, remote_port: u16) -> Result<(), NetError> {
    let syn = {
        let mut sockets = SOCKETS.lock();
        let s = sockets.get_mut(sock).filter(|s| s.in_use).ok_or(NetError::BadSocket)?;
        s.remote_ip = remote_ip;
        s.remote_port = remote_port;
        if s.local_port == 0 {
            s.local_port = 49152 + (ISN.load(Ordering::SeqCst) % 16384) as u16;
        }
        s.state = TcpState::SynSent;
        let seg = segment_for(s, TcpFlags::SYN);
        s.seq_num = s.seq_num.wrapping_add(1); // SYN consumes one
        seg
    };

    if let Err(e) = send_segment(&syn, &[]) {
        let mut sockets = SOCKETS.lock();
        sockets[sock].state = TcpState::Closed;
        return Err(e);
    }

    let start = hal::get_ticks();
    let deadline = super::ms_to_ticks(CONNECT_TIMEOUT_MS);
    loop {
        super::poll();
        match status(sock) {
            Some(TcpState::Established) => return Ok(()),
            Some(_) => {}
            None => return Err(NetError::BadSocket),
        }
        if hal::get_ticks().wrapping_sub(start) >= deadline {
            let mut sockets = SOCKETS.lock();
            sockets[sock].state = TcpState::Closed;
            return Err(NetError::Timeout);
        }
        core::hint::spin_loop();
    }
}

/// Send data on an established connection. The sequence number advances
/// by the payload length.
pub fn tcp_send(sock: usize, data: &[u8]) -> Result<usize, NetError> {
    if data.len() > TCP_BUF_SIZE {
        return Err(NetError::TooLarge);
    }
    let seg = {
        let mut sockets = SOCKETS.lock();
        let s = sockets.get_mut(sock).filter(|s| s.in_use).ok_or(NetError::BadSocket)?;
        if s.state != TcpState::Established {
            return Err(NetError::NotConnected);
        }
        let seg = segment_for(s, TcpFlags::PSH | TcpFlags::ACK);
        s.seq_num = s.seq_num.wrapping_add(data.len() as u32);
        // Keep a copy of the unacknowledged tail for diagnostics.
        let n = data.len().min(TCP_BUF_SIZE);
        s.send_buf[..n].copy_from_slice(&data[..n]);
        s.send_len = n;
        seg
    };

    send_segment(&seg, data)?;
    Ok(data.len())
}

/// Drain buffered receive data after one poll of the network.
/// Returns 0 when nothing is buffered.
pub fn tcp_recv(sock: usize, buf: &mut [u8]) -> Result<usize, NetError> {
    super::poll();

    let mut sockets = SOCKETS.lock();
    let s = sockets.get_mut(sock).filter(|s| s.in_use).ok_or(NetError::BadSocket)?;
    if s.recv_len == 0 {
        return Ok(0);
    }
    let n = s.recv_len.min(buf.len());
    buf[..n].copy_from_slice(&s.recv_buf[..n]);
    // Shift the remainder down.
    s.recv_buf.copy_within(n..s.recv_len, 0);
    s.recv_len -= n;
    s.recv_window = advertised_window(s);
    Ok(n)
}

/// Close a connection. ESTABLISHED starts the FIN handshake, CLOSE_WAIT
/// finishes the passive close; anything else releases the slot.
pub fn tcp_close(sock: usize) -> Result<(), NetError> {
    let fin = {
        let mut sockets = SOCKETS.lock();
        let s = sockets.get_mut(sock).filter(|s| s.in_use).ok_or(NetError::BadSocket)?;
        match s.state {
            TcpState::Established => {
                let seg = segment_for(s, TcpFlags::FIN | TcpFlags::ACK);
                s.seq_num = s.seq_num.wrapping_add(1); // FIN consumes one
                s.state = TcpState::FinWait1;
                Some(seg)
            }
            TcpState::CloseWait => {
                let seg = segment_for(s, TcpFlags::FIN | TcpFlags::ACK);
                s.seq_num = s.seq_num.wrapping_add(1);
                s.state = TcpState::LastAck;
                Some(seg)
            }
            _ => {
                s.in_use = false;
                s.state = TcpState::Closed;
                None
            }
        }
    };

    if let Some(seg) = fin {
        send_segment(&seg, &[])?;
    }
    Ok(())
}

// ── Inbound state machine ───────────────────────────────────────────

/// Process one incoming segment. Unmatched segments are dropped without
/// a RST.
pub fn handle(pkt: &Ipv4Packet<'_>) {
    let data = pkt.payload;
    if data.len() < TCP_HEADER_LEN {
        return;
    }

    let src_port = u16::from_be_bytes([data[0], data[1]]);
    let dst_port = u16::from_be_bytes([data[2], data[3]]);
    let seq = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let _ack = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
    let data_offset = ((data[12] >> 4) as usize) * 4;
    let flags = TcpFlags::from_bits_truncate(data[13]);
    let window = u16::from_be_bytes([data[14], data[15]]);

    if data_offset < TCP_HEADER_LEN || data_offset > data.len() {
        return;
    }
    let payload = &data[data_offset..];

    let reply = {
        let mut sockets = SOCKETS.lock();

        let slot = sockets.iter().position(|s| {
            s.in_use
                && s.local_port == dst_port
                && (s.state == TcpState::Listen
                    || (s.remote_port == src_port && s.remote_ip == pkt.src))
        });
        let slot = match slot {
            Some(i) => i,
            None => return, // silent drop by design
        };
        let s = &mut sockets[slot];
        s.send_window = window as u32;

        let mut reply: Option<SegmentOut> = None;
        match s.state {
            TcpState::Listen => {
                if flags.contains(TcpFlags::SYN) {
                    s.remote_ip = pkt.src;
                    s.remote_port = src_port;
                    s.ack_num = seq.wrapping_add(1);
                    s.state = TcpState::SynRcvd;
                    reply = Some(segment_for(s, TcpFlags::SYN | TcpFlags::ACK));
                    s.seq_num = s.seq_num.wrapping_add(1);
                }
            }
            TcpState::SynSent => {
                if flags.contains(TcpFlags::SYN | TcpFlags::ACK) {
                    s.ack_num = seq.wrapping_add(1);
                    s.state = TcpState::Established;
                    reply = Some(segment_for(s, TcpFlags::ACK));
                }
            }
            TcpState::SynRcvd => {
                if flags.contains(TcpFlags::ACK) {
                    s.state = TcpState::Established;
                }
            }
            TcpState::Established => {
                if flags.contains(TcpFlags::FIN) {
                    s.ack_num = seq.wrapping_add(1);
                    s.state = TcpState::CloseWait;
                    reply = Some(segment_for(s, TcpFlags::ACK));
                } else if flags.contains(TcpFlags::ACK) && !payload.is_empty() {
                    let space = TCP_BUF_SIZE - s.recv_len;
                    let n = payload.len().min(space);
                    let at = s.recv_len;
                    s.recv_buf[at..at + n].copy_from_slice(&payload[..n]);
                    s.recv_len += n;
                    // Cumulative ack covers the whole segment even when the
                    // buffer truncated it; there is no retransmit to recover
                    // the tail anyway.
                    s.ack_num = s.ack_num.wrapping_add(payload.len() as u32);
                    s.recv_window = advertised_window(s);
                    reply = Some(segment_for(s, TcpFlags::ACK));
                }
            }
            TcpState::FinWait1 => {
                if flags.contains(TcpFlags::ACK) && !flags.contains(TcpFlags::FIN) {
                    s.state = TcpState::FinWait2;
                }
                if flags.contains(TcpFlags::FIN) {
                    s.ack_num = seq.wrapping_add(1);
                    s.state = TcpState::TimeWait;
                    reply = Some(segment_for(s, TcpFlags::ACK));
                }
            }
            TcpState::FinWait2 => {
                if flags.contains(TcpFlags::FIN) {
                    s.ack_num = seq.wrapping_add(1);
                    s.state = TcpState::TimeWait;
                    reply = Some(segment_for(s, TcpFlags::ACK));
                }
            }
            TcpState::LastAck => {
                if flags.contains(TcpFlags::ACK) {
                    s.state = TcpState::Closed;
                    s.in_use = false;
                }
            }
            TcpState::CloseWait | TcpState::TimeWait | TcpState::Closed => {}
        }
        reply
    };

    if let Some(seg) = reply {
        let _ = send_segment(&seg, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::netdev;
    use crate::net::types::MacAddr;

    const PEER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 99);
    const PEER_PORT: u16 = 5555;

    fn setup() {
        netdev::register_test_nic();
        crate::net::init();
        crate::net::arp::insert(PEER_IP, MacAddr([9, 8, 7, 6, 5, 4]));
    }

    /// Build an Ethernet+IP+TCP frame from the peer to us.
    fn peer_segment(
        dst_port: u16,
        seq: u32,
        ack: u32,
        flags: TcpFlags,
        payload: &[u8],
    ) -> alloc::vec::Vec<u8> {
        let cfg = crate::net::config();
        let mut tcp = alloc::vec::Vec::new();
        tcp.extend_from_slice(&PEER_PORT.to_be_bytes());
        tcp.extend_from_slice(&dst_port.to_be_bytes());
        tcp.extend_from_slice(&seq.to_be_bytes());
        tcp.extend_from_slice(&ack.to_be_bytes());
        tcp.push(0x50);
        tcp.push(flags.bits());
        tcp.extend_from_slice(&4096u16.to_be_bytes());
        tcp.extend_from_slice(&[0, 0, 0, 0]);
        tcp.extend_from_slice(payload);
        let cksum =
            checksum::transport_checksum(&PEER_IP.0, &cfg.ip.0, PROTO_TCP, &tcp);
        tcp[16..18].copy_from_slice(&cksum.to_be_bytes());

        let total = 20 + tcp.len();
        let mut ip = alloc::vec![0u8; 20];
        ip[0] = 0x45;
        ip[2..4].copy_from_slice(&(total as u16).to_be_bytes());
        ip[8] = 64;
        ip[9] = PROTO_TCP;
        ip[12..16].copy_from_slice(&PEER_IP.0);
        ip[16..20].copy_from_slice(&cfg.ip.0);
        ip.extend_from_slice(&tcp);

        crate::net::ethernet::build_frame(
            cfg.mac,
            MacAddr([9, 8, 7, 6, 5, 4]),
            crate::net::ethernet::ETHERTYPE_IPV4,
            &ip,
        )
    }

    /// Pull the TCP header fields out of a transmitted frame.
    fn parse_tx(frame: &[u8]) -> (u16, u16, u32, u32, TcpFlags, &[u8]) {
        let ip_total = u16::from_be_bytes([frame[16], frame[17]]) as usize;
        let tcp = &frame[34..14 + ip_total];
        (
            u16::from_be_bytes([tcp[0], tcp[1]]),
            u16::from_be_bytes([tcp[2], tcp[3]]),
            u32::from_be_bytes([tcp[4], tcp[5], tcp[6], tcp[7]]),
            u32::from_be_bytes([tcp[8], tcp[9], tcp[10], tcp[11]]),
            TcpFlags::from_bits_truncate(tcp[13]),
            &tcp[20..],
        )
    }

    fn seq_of(sock: usize) -> u32 {
        let sockets = SOCKETS.lock();
        sockets[sock].seq_num
    }

    #[test]
    fn passive_open_three_way_handshake() {
        let _guard = crate::test_sync::lock();
        setup();

        let sock = tcp_socket().unwrap();
        tcp_bind(sock, 9000).unwrap();
        tcp_listen(sock).unwrap();
        let iss = seq_of(sock);

        // Peer SYN arrives.
        netdev::take_tx_frames();
        netdev::inject_rx_frame(&peer_segment(9000, 1000, 0, TcpFlags::SYN, &[]));
        crate::net::poll();

        assert_eq!(status(sock), Some(TcpState::SynRcvd));
        assert_eq!(seq_of(sock), iss.wrapping_add(1));

        let frames = netdev::take_tx_frames();
        assert_eq!(frames.len(), 1);
        let (sport, dport, seq, ack, flags, _) = parse_tx(&frames[0]);
        assert_eq!((sport, dport), (9000, PEER_PORT));
        assert_eq!(seq, iss);
        assert_eq!(ack, 1001);
        assert!(flags.contains(TcpFlags::SYN | TcpFlags::ACK));

        // Peer ACK completes the handshake.
        netdev::inject_rx_frame(&peer_segment(
            9000,
            1001,
            iss.wrapping_add(1),
            TcpFlags::ACK,
            &[],
        ));
        crate::net::poll();
        assert_eq!(status(sock), Some(TcpState::Established));

        let _ = tcp_close(sock);
    }

    #[test]
    fn active_open_and_data_exchange() {
        let _guard = crate::test_sync::lock();
        setup();

        let sock = tcp_socket().unwrap();
        tcp_bind(sock, 39999).unwrap();

        // Queue the peer's SYN+ACK before connecting; the connect poll
        // loop will consume it.
        netdev::inject_rx_frame(&peer_segment(
            39999,
            7000,
            0,
            TcpFlags::SYN | TcpFlags::ACK,
            &[],
        ));
        tcp_connect(sock, PEER_IP, PEER_PORT).unwrap();
        assert_eq!(status(sock), Some(TcpState::Established));

        // Our side sent SYN then the final ACK of the handshake.
        let frames = netdev::take_tx_frames();
        let (_, _, _, _, syn_flags, _) = parse_tx(&frames[0]);
        assert!(syn_flags.contains(TcpFlags::SYN));
        let (_, _, _, ack_field, ack_flags, _) = parse_tx(&frames[frames.len() - 1]);
        assert!(ack_flags.contains(TcpFlags::ACK));
        assert_eq!(ack_field, 7001);

        // Send data: sequence advances by the payload length.
        let seq_before = seq_of(sock);
        assert_eq!(tcp_send(sock, b"ping!").unwrap(), 5);
        assert_eq!(seq_of(sock), seq_before.wrapping_add(5));

        // Peer data lands in the receive buffer and is acked.
        netdev::take_tx_frames();
        netdev::inject_rx_frame(&peer_segment(
            39999,
            7001,
            seq_of(sock),
            TcpFlags::ACK | TcpFlags::PSH,
            b"pong back",
        ));
        let mut buf = [0u8; 64];
        let n = tcp_recv(sock, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"pong back");

        let frames = netdev::take_tx_frames();
        let (_, _, _, ack, flags, _) = parse_tx(&frames[0]);
        assert!(flags.contains(TcpFlags::ACK));
        assert_eq!(ack, 7001 + 9);

        let _ = tcp_close(sock);
    }

    #[test]
    fn recv_shifts_remaining_bytes_down() {
        let _guard = crate::test_sync::lock();
        setup();

        let sock = tcp_socket().unwrap();
        tcp_bind(sock, 9100).unwrap();
        tcp_listen(sock).unwrap();
        netdev::inject_rx_frame(&peer_segment(9100, 500, 0, TcpFlags::SYN, &[]));
        crate::net::poll();
        netdev::inject_rx_frame(&peer_segment(9100, 501, seq_of(sock), TcpFlags::ACK, &[]));
        crate::net::poll();
        netdev::inject_rx_frame(&peer_segment(
            9100,
            501,
            seq_of(sock),
            TcpFlags::ACK,
            b"abcdef",
        ));
        crate::net::poll();

        let mut buf = [0u8; 4];
        assert_eq!(tcp_recv(sock, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(tcp_recv(sock, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(tcp_recv(sock, &mut buf).unwrap(), 0);

        let _ = tcp_close(sock);
    }

    #[test]
    fn active_close_walks_fin_states() {
        let _guard = crate::test_sync::lock();
        setup();

        let sock = tcp_socket().unwrap();
        tcp_bind(sock, 9200).unwrap();
        tcp_listen(sock).unwrap();
        netdev::inject_rx_frame(&peer_segment(9200, 100, 0, TcpFlags::SYN, &[]));
        crate::net::poll();
        netdev::inject_rx_frame(&peer_segment(9200, 101, seq_of(sock), TcpFlags::ACK, &[]));
        crate::net::poll();
        assert_eq!(status(sock), Some(TcpState::Established));

        tcp_close(sock).unwrap();
        assert_eq!(status(sock), Some(TcpState::FinWait1));

        netdev::inject_rx_frame(&peer_segment(9200, 101, seq_of(sock), TcpFlags::ACK, &[]));
        crate::net::poll();
        assert_eq!(status(sock), Some(TcpState::FinWait2));

        netdev::take_tx_frames();
        netdev::inject_rx_frame(&peer_segment(9200, 101, seq_of(sock), TcpFlags::FIN, &[]));
        crate::net::poll();
        assert_eq!(status(sock), Some(TcpState::TimeWait));
        // The final FIN got its ACK.
        let frames = netdev::take_tx_frames();
        let (_, _, _, ack, flags, _) = parse_tx(&frames[0]);
        assert!(flags.contains(TcpFlags::ACK));
        assert_eq!(ack, 102);

        let _ = tcp_close(sock);
    }

    #[test]
    fn passive_close_via_close_wait() {
        let _guard = crate::test_sync::lock();
        setup();

        let sock = tcp_socket().unwrap();
        tcp_bind(sock, 9300).unwrap();
        tcp_listen(sock).unwrap();
        netdev::inject_rx_frame(&peer_segment(9300, 100, 0, TcpFlags::SYN, &[]));
        crate::net::poll();
        netdev::inject_rx_frame(&peer_segment(9300, 101, seq_of(sock), TcpFlags::ACK, &[]));
        crate::net::poll();

        // Peer FIN: we ack and wait for the app to close.
        netdev::inject_rx_frame(&peer_segment(9300, 101, seq_of(sock), TcpFlags::FIN, &[]));
        crate::net::poll();
        assert_eq!(status(sock), Some(TcpState::CloseWait));

        tcp_close(sock).unwrap();
        assert_eq!(status(sock), Some(TcpState::LastAck));

        // Peer's ACK releases the slot.
        netdev::inject_rx_frame(&peer_segment(9300, 102, seq_of(sock), TcpFlags::ACK, &[]));
        crate::net::poll();
        assert_eq!(status(sock), None);
    }

    #[test]
    fn emitted_segments_have_valid_checksums() {
        let _guard = crate::test_sync::lock();
        setup();

        let sock = tcp_socket().unwrap();
        tcp_bind(sock, 9400).unwrap();
        tcp_listen(sock).unwrap();
        netdev::take_tx_frames();
        netdev::inject_rx_frame(&peer_segment(9400, 42, 0, TcpFlags::SYN, &[]));
        crate::net::poll();

        let frames = netdev::take_tx_frames();
        let frame = &frames[0];
        let ip_total = u16::from_be_bytes([frame[16], frame[17]]) as usize;
        let tcp = &frame[34..14 + ip_total];
        let src: [u8; 4] = frame[26..30].try_into().unwrap();
        let dst: [u8; 4] = frame[30..34].try_into().unwrap();
        // Recomputing over the emitted bytes (checksum field included)
        // folds to zero.
        assert_eq!(checksum::transport_checksum(&src, &dst, PROTO_TCP, tcp), 0);

        let _ = tcp_close(sock);
    }

    #[test]
    fn unmatched_segments_dropped_silently() {
        let _guard = crate::test_sync::lock();
        setup();

        netdev::take_tx_frames();
        netdev::inject_rx_frame(&peer_segment(31337, 1, 0, TcpFlags::SYN, &[]));
        crate::net::poll();
        assert!(netdev::take_tx_frames().is_empty());
    }

    #[test]
    fn send_requires_established() {
        let _guard = crate::test_sync::lock();
        setup();
        let sock = tcp_socket().unwrap();
        assert_eq!(tcp_send(sock, b"x"), Err(NetError::NotConnected));
        let _ = tcp_close(sock);
    }
}
