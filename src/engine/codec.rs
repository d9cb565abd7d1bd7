//! Frame Codec: serializes outbound datagrams and parses inbound ones into
//! a sequence of typed payloads. The dispatch half (routing each parsed
//! payload to ACK/RESET/ALLOC handling) lives in
//! [`crate::engine::Engine::deliver_datagram`] — this module stays a pure,
//! state-free codec, shaped after `ioutil.rs`'s `generate_reset`/
//! `generate_synack` (building fixed headers into a `Cursor<[u8; 1500]>`),
//! generalized from TCP/IP headers to a flat 4-byte header plus variable
//! payload run.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use std::net::Ipv4Addr;

use super::hash::{fold16, keyed_hash};
use super::window::{AreqEntry, PktDesc};

/// IANA reserved-for-experimentation protocol numbers (RFC 3692); picked
/// arbitrarily since FastPass has no registered IP protocol number.
pub const IPPROTO_FASTPASS: u8 = 253;

pub const HEADER_LEN: usize = 4;
const RESET_LEN: usize = 8;
const ACK_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Reset { partial_epoch: u64 },
    Areq(Vec<AreqEntry>),
    Alloc {
        base_tslot: u16,
        dsts: Vec<u16>,
        slot_bytes: Vec<u8>,
    },
    Ack { ack_runlen: u32, ack_seq: u16 },
}

/// One decoded datagram: the sequence low bits from the header (already
/// checksum-verified by the caller) plus the payloads found in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub seq_low16: u16,
    pub payloads: Vec<Payload>,
}

/// Standard one's-complement pseudo-header checksum, seeded with
/// `H(seqno)` folded to 16 bits instead of the usual zero seed.
pub fn checksum(seqno: u64, src: Ipv4Addr, dst: Ipv4Addr, payload: &[u8]) -> u16 {
    let mut sum: u32 = fold16(keyed_hash(seqno)) as u32;
    for addr in [src, dst] {
        let o = addr.octets();
        sum += u16::from_be_bytes([o[0], o[1]]) as u32;
        sum += u16::from_be_bytes([o[2], o[3]]) as u32;
    }
    sum += IPPROTO_FASTPASS as u32;
    sum += payload.len() as u32;
    let mut chunks = payload.chunks_exact(2);
    for c in &mut chunks {
        sum += u16::from_be_bytes([c[0], c[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += u16::from_be_bytes([*last, 0]) as u32;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Builds the outbound datagram for a committed descriptor: header,
/// optional RESET, then A-REQ.
pub fn encode_packet(pd: &PktDesc, src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
    let capacity = HEADER_LEN + if pd.send_reset { RESET_LEN } else { 0 } + 2 + 4 * pd.areq.len();
    let mut buf = Cursor::new(Vec::with_capacity(capacity));

    buf.write_u16::<BigEndian>((pd.seqno & 0xFFFF) as u16).unwrap();
    buf.write_u16::<BigEndian>(0).unwrap(); // checksum placeholder

    if pd.send_reset {
        let word1 = ((0x0u32) << 28) | ((pd.reset_timestamp >> 32) as u32 & 0x00FF_FFFF);
        let word2 = (pd.reset_timestamp & 0xFFFF_FFFF) as u32;
        buf.write_u32::<BigEndian>(word1).unwrap();
        buf.write_u32::<BigEndian>(word2).unwrap();
    }

    let areq_header = ((0x1u16) << 12) | (pd.areq.len() as u16 & 0x3F);
    buf.write_u16::<BigEndian>(areq_header).unwrap();
    for entry in &pd.areq {
        buf.write_u16::<BigEndian>(entry.src_dst_key).unwrap();
        buf.write_u16::<BigEndian>(entry.tslots).unwrap();
    }

    let mut datagram = buf.into_inner();
    let sum = checksum(pd.seqno, src, dst, &datagram);
    datagram[2..4].copy_from_slice(&sum.to_be_bytes());
    datagram
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStat {
    TooShortHeader,
    TruncatedPayload,
    UnknownPayloadType(u8),
}

/// Parses an inbound datagram into its header and payload sequence. On a
/// truncated or unrecognized payload, the remainder of the datagram is
/// dropped and the reason is reported via `on_stat` — these are
/// statistics-only outcomes, never fatal.
pub fn parse_datagram(buf: &[u8], mut on_stat: impl FnMut(ParseStat)) -> Option<Frame> {
    if buf.len() < HEADER_LEN {
        on_stat(ParseStat::TooShortHeader);
        return None;
    }
    let mut cur = Cursor::new(buf);
    let seq_low16 = cur.read_u16::<BigEndian>().unwrap();
    let _checksum = cur.read_u16::<BigEndian>().unwrap();

    let mut payloads = Vec::new();
    let mut offset = HEADER_LEN;

    while offset < buf.len() {
        let type_nibble = buf[offset] >> 4;
        match type_nibble {
            0x0 => {
                if buf.len() - offset < RESET_LEN {
                    on_stat(ParseStat::TruncatedPayload);
                    break;
                }
                let word1 = u32::from_be_bytes(buf[offset..offset + 4].try_into().unwrap());
                let word2 = u32::from_be_bytes(buf[offset + 4..offset + 8].try_into().unwrap());
                let partial_epoch = ((word1 & 0x00FF_FFFF) as u64) << 32 | word2 as u64;
                payloads.push(Payload::Reset { partial_epoch });
                offset += RESET_LEN;
            }
            0x1 => {
                if buf.len() - offset < 2 {
                    on_stat(ParseStat::TruncatedPayload);
                    break;
                }
                let h0 = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
                let n = (h0 & 0x3F) as usize;
                let total = 2 + 4 * n;
                if buf.len() - offset < total {
                    on_stat(ParseStat::TruncatedPayload);
                    break;
                }
                let mut entries = Vec::with_capacity(n);
                let mut p = offset + 2;
                for _ in 0..n {
                    let src_dst_key = u16::from_be_bytes([buf[p], buf[p + 1]]);
                    let tslots = u16::from_be_bytes([buf[p + 2], buf[p + 3]]);
                    entries.push(AreqEntry { src_dst_key, tslots });
                    p += 4;
                }
                payloads.push(Payload::Areq(entries));
                offset += total;
            }
            0x2 => {
                if buf.len() - offset < 4 {
                    on_stat(ParseStat::TruncatedPayload);
                    break;
                }
                let h0 = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
                let n_dst = ((h0 >> 8) & 0xF) as usize;
                let n_tslots_half = (h0 & 0x3F) as usize;
                let slot_bytes_len = 2 * n_tslots_half;
                let base_tslot = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]) >> 4;

                let total = 4 + 2 * n_dst + slot_bytes_len;
                if buf.len() - offset < total {
                    on_stat(ParseStat::TruncatedPayload);
                    break;
                }
                let mut dsts = Vec::with_capacity(n_dst);
                let mut p = offset + 4;
                for _ in 0..n_dst {
                    dsts.push(u16::from_be_bytes([buf[p], buf[p + 1]]));
                    p += 2;
                }
                let slot_bytes = buf[p..p + slot_bytes_len].to_vec();
                payloads.push(Payload::Alloc {
                    base_tslot,
                    dsts,
                    slot_bytes,
                });
                offset += total;
            }
            0x3 => {
                if buf.len() - offset < ACK_LEN {
                    on_stat(ParseStat::TruncatedPayload);
                    break;
                }
                let ack_runlen = u32::from_be_bytes(buf[offset..offset + 4].try_into().unwrap());
                let ack_seq = u16::from_be_bytes([buf[offset + 4], buf[offset + 5]]);
                payloads.push(Payload::Ack { ack_runlen, ack_seq });
                offset += ACK_LEN;
            }
            other => {
                on_stat(ParseStat::UnknownPayloadType(other));
                break;
            }
        }
    }

    Some(Frame { seq_low16, payloads })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_parse_areq_only() {
        let mut pd = PktDesc::new(vec![
            AreqEntry { src_dst_key: 7, tslots: 3 },
            AreqEntry { src_dst_key: 8, tslots: 1 },
        ]);
        pd.seqno = 42;
        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        let bytes = encode_packet(&pd, src, dst);

        let frame = parse_datagram(&bytes, |s| panic!("unexpected stat {s:?}")).unwrap();
        assert_eq!(frame.seq_low16, 42);
        assert_eq!(
            frame.payloads,
            vec![Payload::Areq(vec![
                AreqEntry { src_dst_key: 7, tslots: 3 },
                AreqEntry { src_dst_key: 8, tslots: 1 },
            ])]
        );
    }

    #[test]
    fn encode_with_reset_then_parse() {
        let mut pd = PktDesc::new(vec![AreqEntry { src_dst_key: 1, tslots: 1 }]);
        pd.seqno = 99;
        pd.send_reset = true;
        pd.reset_timestamp = 0x00AB_CDEF_0123_4567 & ((1u64 << 56) - 1);
        let bytes = encode_packet(&pd, Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST);

        let frame = parse_datagram(&bytes, |s| panic!("unexpected stat {s:?}")).unwrap();
        assert_eq!(frame.seq_low16, 99);
        assert_eq!(
            frame.payloads[0],
            Payload::Reset { partial_epoch: pd.reset_timestamp }
        );
    }

    #[test]
    fn unknown_payload_type_drops_remainder() {
        let mut buf = vec![0u8; HEADER_LEN];
        buf.push(0xE0); // type nibble 0xE, unknown
        buf.push(0xAA);
        let mut stats = Vec::new();
        let frame = parse_datagram(&buf, |s| stats.push(s)).unwrap();
        assert!(frame.payloads.is_empty());
        assert_eq!(stats, vec![ParseStat::UnknownPayloadType(0xE)]);
    }

    #[test]
    fn too_short_header_is_dropped() {
        let buf = [0u8; 2];
        let mut stats = Vec::new();
        let frame = parse_datagram(&buf, |s| stats.push(s));
        assert!(frame.is_none());
        assert_eq!(stats, vec![ParseStat::TooShortHeader]);
    }
}
