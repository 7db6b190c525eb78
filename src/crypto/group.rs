//! Arithmetic in the hash group.
//!
//! Hash values live in the additive group of integers modulo a fixed
//! 256-bit prime. The modulus is the secp256k1 group order and is a
//! compile-time constant: every node in a deployment computes in the same
//! group, so cross-node edges verify. Values are plain `Copy` data, four
//! 64-bit limbs, rather than heap big integers.
//!
//! The arithmetic is not constant-time. Nothing here is secret; the hash
//! provides integrity, not confidentiality.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::Error;

/// Length in bytes of the canonical hash encoding.
pub const HASH_LEN: usize = 32;

/// The group modulus as little-endian 64-bit limbs.
///
/// This is the order of the secp256k1 curve group,
/// `0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141`.
/// Since the modulus exceeds 2^255, any 256-bit value is reduced by at
/// most one subtraction.
const MODULUS: [u64; 4] = [
    0xBFD2_5E8C_D036_4141,
    0xBAAE_DCE6_AF48_A03B,
    0xFFFF_FFFF_FFFF_FFFE,
    0xFFFF_FFFF_FFFF_FFFF,
];

/// An element of the hash group: a non-negative integer strictly below
/// the modulus.
///
/// Stored as little-endian limbs, always fully reduced, so equality is
/// plain limb equality. The additive identity is [`GroupHash::ZERO`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GroupHash {
    limbs: [u64; 4],
}

impl GroupHash {
    /// The identity element (zero). This is the hash of the empty set.
    pub const ZERO: GroupHash = GroupHash { limbs: [0; 4] };

    /// Reduces a 256-bit big-endian value into the group.
    pub fn reduce(bytes: [u8; HASH_LEN]) -> GroupHash {
        let mut limbs = limbs_from_be(&bytes);
        if ge(&limbs, &MODULUS) {
            limbs = sub(&limbs, &MODULUS);
        }
        GroupHash { limbs }
    }

    /// Adds two group elements modulo the group order.
    pub fn add(&self, other: &GroupHash) -> GroupHash {
        let (mut sum, carry) = add_wide(&self.limbs, &other.limbs);
        // Both inputs are reduced, so the true sum is below 2*MODULUS and
        // a single subtraction completes the reduction. When the addition
        // carried out of 256 bits, the wrapping subtraction cancels the
        // carry and still yields the right residue.
        if carry || ge(&sum, &MODULUS) {
            sum = sub(&sum, &MODULUS);
        }
        GroupHash { limbs: sum }
    }

    /// Returns `true` for the identity element.
    pub fn is_zero(&self) -> bool {
        self.limbs == [0; 4]
    }

    /// Canonical 32-byte big-endian encoding, zero-padded on the high side.
    pub fn to_bytes(&self) -> [u8; HASH_LEN] {
        let mut out = [0u8; HASH_LEN];
        for (i, limb) in self.limbs.iter().rev().enumerate() {
            out[i * 8..(i + 1) * 8].copy_from_slice(&limb.to_be_bytes());
        }
        out
    }

    /// Decodes a big-endian byte string of at most 32 bytes, reducing the
    /// value into the group.
    pub fn from_bytes(data: &[u8]) -> Result<GroupHash, Error> {
        if data.len() > HASH_LEN {
            return Err(Error::InvalidEncoding(format!(
                "hash encoding is {} bytes, expected at most {HASH_LEN}",
                data.len()
            )));
        }
        let mut padded = [0u8; HASH_LEN];
        padded[HASH_LEN - data.len()..].copy_from_slice(data);
        Ok(GroupHash::reduce(padded))
    }

    /// Lowercase hex encoding of [`GroupHash::to_bytes`]. Never prefixed.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Parses a hex string, tolerating an optional `0x` prefix and an odd
    /// or short digit count. The value is reduced into the group.
    pub fn from_hex(s: &str) -> Result<GroupHash, Error> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.is_empty() {
            return Err(Error::InvalidEncoding("empty hex string".to_string()));
        }
        if digits.len() > 2 * HASH_LEN {
            return Err(Error::InvalidEncoding(format!(
                "hex string has {} digits, expected at most {}",
                digits.len(),
                2 * HASH_LEN
            )));
        }
        let even = if digits.len() % 2 == 1 {
            format!("0{digits}")
        } else {
            digits.to_string()
        };
        let bytes = hex::decode(&even)
            .map_err(|e| Error::InvalidEncoding(format!("invalid hex string {s:?}: {e}")))?;
        GroupHash::from_bytes(&bytes)
    }
}

impl fmt::Display for GroupHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for GroupHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupHash({})", self.to_hex())
    }
}

impl Serialize for GroupHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for GroupHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<GroupHash, D::Error> {
        let s = String::deserialize(deserializer)?;
        GroupHash::from_hex(&s).map_err(de::Error::custom)
    }
}

fn limbs_from_be(bytes: &[u8; HASH_LEN]) -> [u64; 4] {
    let mut limbs = [0u64; 4];
    for i in 0..4 {
        let start = HASH_LEN - (i + 1) * 8;
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[start..start + 8]);
        limbs[i] = u64::from_be_bytes(word);
    }
    limbs
}

/// Limbwise addition returning the 256-bit sum and the carry out.
fn add_wide(a: &[u64; 4], b: &[u64; 4]) -> ([u64; 4], bool) {
    let mut out = [0u64; 4];
    let mut carry = false;
    for i in 0..4 {
        let (s1, c1) = a[i].overflowing_add(b[i]);
        let (s2, c2) = s1.overflowing_add(carry as u64);
        out[i] = s2;
        carry = c1 || c2;
    }
    (out, carry)
}

/// Limbwise wrapping subtraction `a - b` over 256 bits.
fn sub(a: &[u64; 4], b: &[u64; 4]) -> [u64; 4] {
    let mut out = [0u64; 4];
    let mut borrow = false;
    for i in 0..4 {
        let (d1, b1) = a[i].overflowing_sub(b[i]);
        let (d2, b2) = d1.overflowing_sub(borrow as u64);
        out[i] = d2;
        borrow = b1 || b2;
    }
    out
}

/// Returns `true` when `a >= b`, comparing as 256-bit integers.
fn ge(a: &[u64; 4], b: &[u64; 4]) -> bool {
    for i in (0..4).rev() {
        if a[i] != b[i] {
            return a[i] > b[i];
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULUS_HEX: &str = "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141";
    const MODULUS_MINUS_ONE_HEX: &str =
        "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364140";

    #[test]
    fn zero_is_default_and_identity() {
        assert_eq!(GroupHash::default(), GroupHash::ZERO);
        assert!(GroupHash::ZERO.is_zero());

        let h = GroupHash::from_hex("2a").unwrap();
        assert_eq!(h.add(&GroupHash::ZERO), h);
        assert_eq!(GroupHash::ZERO.add(&h), h);
    }

    #[test]
    fn bytes_are_padded_to_32() {
        let h = GroupHash::from_hex("2a").unwrap();
        let bytes = h.to_bytes();
        assert_eq!(bytes.len(), HASH_LEN);
        assert_eq!(bytes[HASH_LEN - 1], 42);
        assert!(bytes[..HASH_LEN - 1].iter().all(|&b| b == 0));
    }

    #[test]
    fn hex_roundtrip() {
        let h = GroupHash::from_hex("deadbeef").unwrap();
        let recovered = GroupHash::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, recovered);
        assert_eq!(h.to_hex().len(), 2 * HASH_LEN);
    }

    #[test]
    fn hex_accepts_0x_prefix_and_odd_length() {
        let plain = GroupHash::from_hex("f").unwrap();
        let prefixed = GroupHash::from_hex("0xf").unwrap();
        assert_eq!(plain, prefixed);
        assert_eq!(plain.to_bytes()[HASH_LEN - 1], 15);
    }

    #[test]
    fn hex_output_is_never_prefixed() {
        let h = GroupHash::from_hex("0xabc").unwrap();
        assert!(!h.to_hex().starts_with("0x"));
    }

    #[test]
    fn overlong_encodings_are_rejected() {
        let too_long = "ff".repeat(HASH_LEN + 1);
        assert!(GroupHash::from_hex(&too_long).is_err());
        assert!(GroupHash::from_bytes(&[0u8; HASH_LEN + 1]).is_err());
        assert!(GroupHash::from_hex("").is_err());
        assert!(GroupHash::from_hex("xyz").is_err());
    }

    #[test]
    fn bytes_roundtrip() {
        let h = GroupHash::from_hex("0123456789abcdef").unwrap();
        let recovered = GroupHash::from_bytes(&h.to_bytes()).unwrap();
        assert_eq!(h, recovered);
    }

    #[test]
    fn values_are_reduced_modulo_the_group_order() {
        // The modulus itself reduces to zero.
        let p = GroupHash::from_hex(MODULUS_HEX).unwrap();
        assert!(p.is_zero());

        // 2^256 - 1 reduces to 2^256 - 1 - p.
        let max = GroupHash::from_bytes(&[0xff; HASH_LEN]).unwrap();
        assert!(!max.is_zero());
    }

    #[test]
    fn addition_wraps_at_the_group_order() {
        let p_minus_one = GroupHash::from_hex(MODULUS_MINUS_ONE_HEX).unwrap();
        let one = GroupHash::from_hex("1").unwrap();
        assert!(p_minus_one.add(&one).is_zero());

        let two = one.add(&one);
        assert_eq!(p_minus_one.add(&two), one);
    }

    #[test]
    fn serde_uses_hex_strings() {
        let h = GroupHash::from_hex("cafe").unwrap();
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", h.to_hex()));

        let back: GroupHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);

        // Input with prefix is accepted.
        let prefixed: GroupHash = serde_json::from_str("\"0xcafe\"").unwrap();
        assert_eq!(prefixed, h);
    }
}
