//! Jenkins lookup3 hash for bucket selection.
//!
//! This is Bob Jenkins' 1996/2006 `hashlittle` function: the key is consumed
//! in 12-byte blocks read as three little-endian `u32` accumulators, each
//! block is mixed, and the 0..=12 byte tail is folded in byte-wise before a
//! final avalanche. The reading strategy is fixed little-endian regardless
//! of host byte order; hash values are never persisted, so this only has to
//! be consistent within one process.
//!
//! The transform is reproduced bit-for-bit so the upstream test vectors
//! match. Do not use for cryptographic purposes.

#[inline]
fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

/// Mixes three 32-bit accumulators reversibly.
#[inline]
fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(4);
    *c = c.wrapping_add(*b);

    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(6);
    *a = a.wrapping_add(*c);

    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(8);
    *b = b.wrapping_add(*a);

    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(16);
    *c = c.wrapping_add(*b);

    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(19);
    *a = a.wrapping_add(*c);

    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(4);
    *b = b.wrapping_add(*a);
}

/// Final avalanche of the three accumulators into `c`.
#[inline]
fn final_mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(14));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(11));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(25));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(16));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(4));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(14));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(24));
}

/// Hash a variable-length key into a 32-bit value.
///
/// Every bit of the key affects every bit of the result; two keys differing
/// by one or two bits will have totally different hash values. Table sizes
/// should be powers of two so the result can be masked down.
pub fn hash(key: &[u8], seed: u32) -> u32 {
    let init = 0xdead_beef_u32
        .wrapping_add(key.len() as u32)
        .wrapping_add(seed);
    let (mut a, mut b, mut c) = (init, init, init);

    let mut k = key;
    while k.len() > 12 {
        a = a.wrapping_add(read_u32(k, 0));
        b = b.wrapping_add(read_u32(k, 4));
        c = c.wrapping_add(read_u32(k, 8));
        mix(&mut a, &mut b, &mut c);
        k = &k[12..];
    }

    // Last (possibly partial) block. All arms fall through conceptually:
    // byte i lands in accumulator i/4 shifted by (i%4)*8 bits.
    match k.len() {
        12 => {
            a = a.wrapping_add(read_u32(k, 0));
            b = b.wrapping_add(read_u32(k, 4));
            c = c.wrapping_add(read_u32(k, 8));
        }
        n @ 9..=11 => {
            a = a.wrapping_add(read_u32(k, 0));
            b = b.wrapping_add(read_u32(k, 4));
            for i in 8..n {
                c = c.wrapping_add((k[i] as u32) << ((i - 8) * 8));
            }
        }
        8 => {
            a = a.wrapping_add(read_u32(k, 0));
            b = b.wrapping_add(read_u32(k, 4));
        }
        n @ 5..=7 => {
            a = a.wrapping_add(read_u32(k, 0));
            for i in 4..n {
                b = b.wrapping_add((k[i] as u32) << ((i - 4) * 8));
            }
        }
        4 => {
            a = a.wrapping_add(read_u32(k, 0));
        }
        n @ 1..=3 => {
            for i in 0..n {
                a = a.wrapping_add((k[i] as u32) << (i * 8));
            }
        }
        // zero length strings require no mixing
        _ => return c,
    }

    final_mix(&mut a, &mut b, &mut c);
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_sequence() {
        // Repeated mixing of a fixed state, first four steps of the
        // upstream vector.
        let expected = [
            (0x8d81d516u32, 0x05697933u32, 0xe753edd5u32),
            (0x44efe5ba, 0xb5c7c81d, 0xb953e0b5),
            (0x9d8725dd, 0x05a0f784, 0x6f384c10),
            (0x11846de8, 0xfe0d5bcd, 0xc241ad85),
        ];
        let (mut a, mut b, mut c) = (0x11111111, 0x22222222, 0x33333333);
        for &(ea, eb, ec) in &expected {
            mix(&mut a, &mut b, &mut c);
            assert_eq!((a, b, c), (ea, eb, ec));
        }
    }

    #[test]
    fn test_final_mix_sequence() {
        let expected = [
            (0xbdba5845u32, 0xdd652d2bu32, 0x3024eb75u32),
            (0xd348db8a, 0x4fca90fa, 0x1fb6a114),
            (0x35d01f3f, 0x802b2a9e, 0x1842b70f),
            (0x6d2892aa, 0x9a6c35dc, 0x698471dc),
        ];
        let (mut a, mut b, mut c) = (0x11111111, 0x22222222, 0x33333333);
        for &(ea, eb, ec) in &expected {
            final_mix(&mut a, &mut b, &mut c);
            assert_eq!((a, b, c), (ea, eb, ec));
        }
    }

    #[test]
    fn test_hash_vectors() {
        // Upstream little-endian vector: the test string truncated to
        // lengths 0..32.
        let results: [u32; 32] = [
            0xdeadbeef, 0x58d68708, 0xfbb3a8df, 0x0e397631, //
            0xb5f4889c, 0x026d72de, 0xd6fa502e, 0xb11ad4a5, //
            0x2995c3be, 0xac6572b4, 0x8bf7d2ef, 0x5f61edf8, //
            0x4012f87b, 0x928128f9, 0x2bb84ef8, 0xa9ce8fb6, //
            0x11347272, 0x8938634e, 0x1ceaf360, 0x02a80e47, //
            0x372707b2, 0xdfa3b04b, 0xa9752892, 0x4e25bfff, //
            0x1b631fea, 0x6c29c5e2, 0x7538b5bd, 0x71b486e3, //
            0xbbe9d659, 0xdf3e4991, 0xd6863a03, 0xc100125d,
        ];

        let data = b"abcdefghijklmnopqrstuvwxyz023456789";
        for (len, &expected) in results.iter().enumerate() {
            assert_eq!(
                hash(&data[..len], 0),
                expected,
                "mismatch at length {len}"
            );
        }
    }

    #[test]
    fn test_hash_deterministic() {
        let key = b"some-cache-key";
        assert_eq!(hash(key, 0), hash(key, 0));
        assert_ne!(hash(key, 0), hash(key, 1));
    }

    #[test]
    fn test_hash_avalanche() {
        // Keys differing in one byte should not collide.
        assert_ne!(hash(b"key0", 0), hash(b"key1", 0));
        assert_ne!(hash(b"aaaaaaaaaaaaaaaaaaaaaaaa", 0), hash(b"aaaaaaaaaaaaaaaaaaaaaaab", 0));
    }
}
