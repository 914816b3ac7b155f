//! Arbitrary-precision chain positions.
//!
//! Block heights and slots have different magnitudes on different chains, so a
//! [`Cursor`] is never bounded by a fixed-width integer. It travels over the
//! wire as a base-10 string and only supports what the streaming engine needs:
//! parsing, formatting, total ordering and `+1`.

use crate::error::ParseCursorError;
use std::{cmp::Ordering, fmt, str::FromStr};

/// Each limb holds nine decimal digits, which keeps `Display` trivial.
const LIMB_BASE: u64 = 1_000_000_000;
const LIMB_DIGITS: usize = 9;

/// A non-negative integer identifying a position in an append-only chain.
///
/// Limbs are stored least significant first and never carry trailing zero
/// limbs, so zero is the empty vector and derived equality is value equality.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Cursor {
    limbs: Vec<u32>,
}

impl Cursor {
    /// The zero cursor.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.limbs.is_empty()
    }

    /// Returns `self + 1`, leaving `self` untouched.
    pub fn next(&self) -> Self {
        let mut next = self.clone();
        next.increment();
        next
    }

    /// Adds one in place.
    pub fn increment(&mut self) {
        for limb in self.limbs.iter_mut() {
            if u64::from(*limb) + 1 < LIMB_BASE {
                *limb += 1;
                return;
            }
            *limb = 0;
        }
        self.limbs.push(1);
    }

    /// Returns `self - 1`, or `None` for zero.
    pub fn prev(&self) -> Option<Self> {
        if self.is_zero() {
            return None;
        }
        let mut prev = self.clone();
        for limb in prev.limbs.iter_mut() {
            if *limb > 0 {
                *limb -= 1;
                break;
            }
            *limb = (LIMB_BASE - 1) as u32;
        }
        if prev.limbs.last() == Some(&0) {
            prev.limbs.pop();
        }
        Some(prev)
    }

    /// Returns the value as a `u64`, or `None` if it does not fit.
    pub fn to_u64(&self) -> Option<u64> {
        self.limbs.iter().rev().try_fold(0u64, |acc, limb| {
            acc.checked_mul(LIMB_BASE)?.checked_add(u64::from(*limb))
        })
    }

    /// Parses a cursor written in the given radix.
    ///
    /// For radix 16 an optional `0x`/`0X` prefix is accepted, which is how
    /// JSON-RPC nodes encode quantities. Signs and separators are rejected.
    pub fn from_str_radix(s: &str, radix: u32) -> Result<Self, ParseCursorError> {
        if !(2..=36).contains(&radix) {
            return Err(ParseCursorError::UnsupportedRadix(radix));
        }

        let digits = if radix == 16 {
            s.strip_prefix("0x")
                .or_else(|| s.strip_prefix("0X"))
                .unwrap_or(s)
        } else {
            s
        };
        if digits.is_empty() {
            return Err(ParseCursorError::Empty);
        }

        let offset = s.len() - digits.len();
        let chunk_len = chunk_len(radix);
        let mut cursor = Cursor::zero();
        let (mut chunk, mut scale, mut filled) = (0u32, 1u32, 0usize);
        for (index, found) in digits.char_indices() {
            let digit = found
                .to_digit(radix)
                .ok_or(ParseCursorError::InvalidDigit {
                    index: index + offset,
                    found,
                })?;
            chunk = chunk * radix + digit;
            scale *= radix;
            filled += 1;
            if filled == chunk_len {
                cursor.mul_add(scale, chunk);
                (chunk, scale, filled) = (0, 1, 0);
            }
        }
        if filled > 0 {
            cursor.mul_add(scale, chunk);
        }
        Ok(cursor)
    }

    /// `self = self * mul + add`, with both operands at most one limb base.
    fn mul_add(&mut self, mul: u32, add: u32) {
        let mut carry = u64::from(add);
        for limb in self.limbs.iter_mut() {
            let value = u64::from(*limb) * u64::from(mul) + carry;
            *limb = (value % LIMB_BASE) as u32;
            carry = value / LIMB_BASE;
        }
        while carry > 0 {
            self.limbs.push((carry % LIMB_BASE) as u32);
            carry /= LIMB_BASE;
        }
    }
}

/// How many digits of `radix` are folded into the cursor at once: the most
/// whose value still fits in one limb.
fn chunk_len(radix: u32) -> usize {
    let radix = u64::from(radix);
    let (mut len, mut scale) = (0, 1u64);
    while scale * radix <= LIMB_BASE {
        scale *= radix;
        len += 1;
    }
    len
}

impl From<u64> for Cursor {
    fn from(mut value: u64) -> Self {
        let mut limbs = Vec::new();
        while value > 0 {
            limbs.push((value % LIMB_BASE) as u32);
            value /= LIMB_BASE;
        }
        Self { limbs }
    }
}

impl FromStr for Cursor {
    type Err = ParseCursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_radix(s, 10)
    }
}

impl Ord for Cursor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.limbs
            .len()
            .cmp(&other.limbs.len())
            .then_with(|| self.limbs.iter().rev().cmp(other.limbs.iter().rev()))
    }
}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut limbs = self.limbs.iter().rev();
        match limbs.next() {
            None => f.write_str("0"),
            Some(head) => {
                write!(f, "{head}")?;
                for limb in limbs {
                    write!(f, "{limb:0width$}", width = LIMB_DIGITS)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cursor({self})")
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    use super::Cursor;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    impl Serialize for Cursor {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_str(self)
        }
    }

    impl<'de> Deserialize<'de> for Cursor {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        }
    }
}
