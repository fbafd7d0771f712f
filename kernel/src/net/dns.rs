//! Minimal DNS client: A-record lookups over UDP.
//!
//! Each failure stage gets its own error so callers can tell a socket
//! shortage from a timeout from a server that answered with garbage.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use super::types::Ipv4Addr;
use super::udp;

const DNS_PORT: u16 = 53;
const QUERY_TIMEOUT_MS: u32 = 3000;

static QUERY_ID: AtomicU32 = AtomicU32::new(1);

/// Lookup failure stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DnsError {
    /// No UDP socket available for the query.
    NoSocket,
    /// The query could not be transmitted.
    SendFailed,
    /// No response within the timeout.
    Timeout,
    /// Response was malformed or did not match the query.
    BadResponse,
    /// Well-formed response without an A record.
    NoRecord,
}

/// Encode a hostname as DNS labels.
fn encode_name(name: &str, out: &mut Vec<u8>) {
    for label in name.split('.') {
        let len = label.len().min(63);
        out.push(len as u8);
        out.extend_from_slice(&label.as_bytes()[..len]);
    }
    out.push(0);
}

/// Skip over a (possibly compressed) name in a response.
fn skip_name(data: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let len = *data.get(pos)? as usize;
        if len == 0 {
            return Some(pos + 1);
        }
        if len & 0xC0 == 0xC0 {
            return Some(pos + 2); // compression pointer ends the name
        }
        pos += 1 + len;
    }
}

/// Parse a response for the first A record answering `id`.
fn parse_response(data: &[u8], id: u16) -> Result<Ipv4Addr, DnsError> {
    if data.len() < 12 {
        return Err(DnsError::BadResponse);
    }
    if u16::from_be_bytes([data[0], data[1]]) != id {
        return Err(DnsError::BadResponse);
    }
    let flags = u16::from_be_bytes([data[2], data[3]]);
    if flags & 0x8000 == 0 {
        return Err(DnsError::BadResponse); // not a response
    }
    if flags & 0x000F != 0 {
        return Err(DnsError::NoRecord); // RCODE: NXDOMAIN and friends
    }
    let qdcount = u16::from_be_bytes([data[4], data[5]]) as usize;
    let ancount = u16::from_be_bytes([data[6], data[7]]) as usize;
    if ancount == 0 {
        return Err(DnsError::NoRecord);
    }

    // Skip the question section
    let mut pos = 12;
    for _ in 0..qdcount {
        pos = skip_name(data, pos).ok_or(DnsError::BadResponse)?;
        pos += 4; // QTYPE + QCLASS
    }

    // Walk the answers for the first A/IN record
    for _ in 0..ancount {
        pos = skip_name(data, pos).ok_or(DnsError::BadResponse)?;
        if pos + 10 > data.len() {
            return Err(DnsError::BadResponse);
        }
        let rtype = u16::from_be_bytes([data[pos], data[pos + 1]]);
        let rclass = u16::from_be_bytes([data[pos + 2], data[pos + 3]]);
        let rdlength = u16::from_be_bytes([data[pos + 8], data[pos + 9]]) as usize;
        pos += 10;
        if pos + rdlength > data.len() {
            return Err(DnsError::BadResponse);
        }
        if rtype == 1 && rclass == 1 && rdlength == 4 {
            return Ok(Ipv4Addr([
                data[pos],
                data[pos + 1],
                data[pos + 2],
                data[pos + 3],
            ]));
        }
        pos += rdlength;
    }
    Err(DnsError::NoRecord)
}

/// Resolve `hostname` against the configured server.
pub fn lookup(hostname: &str) -> Result<Ipv4Addr, DnsError> {
    let server = super::config().dns;
    let id = (QUERY_ID.fetch_add(1, Ordering::Relaxed) & 0xFFFF) as u16;

    let mut query = Vec::with_capacity(12 + hostname.len() + 6);
    query.extend_from_slice(&id.to_be_bytes());
    query.extend_from_slice(&0x0100u16.to_be_bytes()); // RD
    query.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    query.extend_from_slice(&[0; 6]); // AN/NS/AR counts
    encode_name(hostname, &mut query);
    query.extend_from_slice(&1u16.to_be_bytes()); // QTYPE A
    query.extend_from_slice(&1u16.to_be_bytes()); // QCLASS IN

    let local_port = 0xC000 | (id & 0x0FFF);
    let sock = udp::socket(local_port).map_err(|_| DnsError::NoSocket)?;

    let result = (|| {
        udp::send(sock, server, DNS_PORT, &query).map_err(|_| DnsError::SendFailed)?;

        let mut response = [0u8; 512];
        let (n, _, _) = udp::recv(sock, &mut response, QUERY_TIMEOUT_MS)
            .map_err(|_| DnsError::Timeout)?;
        parse_response(&response[..n], id)
    })();

    udp::close(sock);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_answer(id: u16, addr: [u8; 4]) -> Vec<u8> {
        let mut r = Vec::new();
        r.extend_from_slice(&id.to_be_bytes());
        r.extend_from_slice(&0x8180u16.to_be_bytes()); // response, RD+RA
        r.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
        r.extend_from_slice(&1u16.to_be_bytes()); // ANCOUNT
        r.extend_from_slice(&[0; 4]);
        encode_name("example.com", &mut r);
        r.extend_from_slice(&1u16.to_be_bytes());
        r.extend_from_slice(&1u16.to_be_bytes());
        // Answer: compressed name pointer to offset 12
        r.extend_from_slice(&0xC00Cu16.to_be_bytes());
        r.extend_from_slice(&1u16.to_be_bytes()); // TYPE A
        r.extend_from_slice(&1u16.to_be_bytes()); // CLASS IN
        r.extend_from_slice(&300u32.to_be_bytes()); // TTL
        r.extend_from_slice(&4u16.to_be_bytes()); // RDLENGTH
        r.extend_from_slice(&addr);
        r
    }

    #[test]
    fn parses_compressed_a_record() {
        let r = response_with_answer(77, [93, 184, 216, 34]);
        assert_eq!(
            parse_response(&r, 77),
            Ok(Ipv4Addr::new(93, 184, 216, 34))
        );
    }

    #[test]
    fn rejects_mismatched_id_and_truncation() {
        let r = response_with_answer(77, [1, 2, 3, 4]);
        assert_eq!(parse_response(&r, 78), Err(DnsError::BadResponse));
        assert_eq!(parse_response(&r[..10], 77), Err(DnsError::BadResponse));
    }

    #[test]
    fn nxdomain_maps_to_no_record() {
        let mut r = response_with_answer(5, [1, 2, 3, 4]);
        r[3] |= 0x03; // RCODE = NXDOMAIN
        assert_eq!(parse_response(&r, 5), Err(DnsError::NoRecord));
    }

    #[test]
    fn name_encoding_labels() {
        let mut out = Vec::new();
        encode_name("a.bc.def", &mut out);
        assert_eq!(out, alloc::vec![1, b'a', 2, b'b', b'c', 3, b'd', b'e', b'f', 0]);
    }
}
