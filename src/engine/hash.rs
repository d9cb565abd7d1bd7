//! The one keyed 32-bit hash shared by the reset handshake (seq.rs) and the
//! checksum seed (codec.rs). Not security-sensitive: any stable mixing
//! function works, so this is Bob Jenkins' one-at-a-time hash over the
//! little-endian bytes of the input, salted with a fixed key so two
//! independently-restarted engines still agree on `H`.

const SALT: u64 = 0x9e37_79b9_7f4a_7c15;

pub fn keyed_hash(input: u64) -> u32 {
    let mut hash: u32 = 0;
    for byte in (input ^ SALT).to_le_bytes() {
        hash = hash.wrapping_add(byte as u32);
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash = hash.wrapping_add(hash << 15);
    hash
}

/// Folds a 32-bit value into 16 bits, one's-complement style, the way a
/// checksum accumulator folds its carry back in.
pub fn fold16(mut v: u32) -> u16 {
    while v >> 16 != 0 {
        v = (v & 0xFFFF) + (v >> 16);
    }
    v as u16
}
