//! FNV-1a hashing.
//!
//! Two variants are used by the index layer: the 64-bit hash selects a
//! bucket for a key, and the 256-bit hash condenses tag values longer than
//! the fixed 32-byte key slot into exactly 32 bytes.

/// FNV-1a 64-bit offset basis.
const FNV64_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
/// FNV-1a 64-bit prime.
const FNV64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a 256-bit offset basis, least-significant limb first.
const FNV256_BASIS: [u64; 4] = [
    0x1023_b4c8_caee_0535,
    0xc8b1_5368_47b6_bbb3,
    0x2d98_c384_c4e5_76cc,
    0xdd26_8dbc_aac5_5036,
];

/// Hash `data` with FNV-1a 64-bit.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash = FNV64_BASIS;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV64_PRIME);
    }
    hash
}

/// Hash `data` with FNV-1a 256-bit and return the digest big-endian.
///
/// The 256-bit FNV prime is 2^168 + 2^8 + 0x63, so the modular multiply
/// reduces to two limb shifts and one small scalar multiply.
pub fn fnv1a_256(data: &[u8]) -> [u8; 32] {
    let mut hash = FNV256_BASIS;
    for &byte in data {
        hash[0] ^= byte as u64;
        hash = mul_fnv256_prime(hash);
    }

    let mut out = [0u8; 32];
    for (i, limb) in hash.iter().rev().enumerate() {
        out[i * 8..(i + 1) * 8].copy_from_slice(&limb.to_be_bytes());
    }
    out
}

/// Multiply a 256-bit value by the FNV-256 prime, mod 2^256.
fn mul_fnv256_prime(h: [u64; 4]) -> [u64; 4] {
    let a = shl256(h, 168);
    let b = shl256(h, 8);
    let c = mul256_small(h, 0x63);
    add256(add256(a, b), c)
}

fn shl256(h: [u64; 4], bits: u32) -> [u64; 4] {
    let limb_shift = (bits / 64) as usize;
    let bit_shift = bits % 64;
    let mut out = [0u64; 4];
    for i in limb_shift..4 {
        let mut limb = h[i - limb_shift] << bit_shift;
        if bit_shift > 0 && i > limb_shift {
            limb |= h[i - limb_shift - 1] >> (64 - bit_shift);
        }
        out[i] = limb;
    }
    out
}

fn mul256_small(h: [u64; 4], m: u64) -> [u64; 4] {
    let mut out = [0u64; 4];
    let mut carry: u64 = 0;
    for i in 0..4 {
        let wide = (h[i] as u128) * (m as u128) + carry as u128;
        out[i] = wide as u64;
        carry = (wide >> 64) as u64;
    }
    out
}

fn add256(a: [u64; 4], b: [u64; 4]) -> [u64; 4] {
    let mut out = [0u64; 4];
    let mut carry: u64 = 0;
    for i in 0..4 {
        let (sum, c1) = a[i].overflowing_add(b[i]);
        let (sum, c2) = sum.overflowing_add(carry);
        out[i] = sum;
        carry = (c1 as u64) + (c2 as u64);
    }
    out
}
