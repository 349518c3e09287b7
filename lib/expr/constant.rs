//! A `Constant` holds a single fixed-width integer value.
//!
//! Constants are arbitrary width, which lets the same type hold an 8-bit
//! immediate, a 80-bit x87 value, or a 128-bit xmm value. Values are always
//! kept reduced modulo `2^bits`.

use crate::Error;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A constant value.
///
/// The `signed` flag is a presentation hint, recording that the value was
/// produced from a signed quantity (a sign-extended immediate, for example).
/// Two constants with the same width and value are equal regardless of the
/// flag.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(try_from = "Parts")]
pub struct Constant {
    value: BigUint,
    bits: usize,
    signed: bool,
}

/// A serialized `Constant`, checked before it becomes one.
#[derive(Deserialize)]
struct Parts {
    value: BigUint,
    bits: usize,
    signed: bool,
}

impl TryFrom<Parts> for Constant {
    type Error = Error;

    fn try_from(parts: Parts) -> Result<Constant, Error> {
        Ok(Constant::checked(parts.value, parts.bits)?.with_signed(parts.signed))
    }
}

fn modulus(bits: usize) -> BigUint {
    BigUint::one() << bits
}

fn ones(bits: usize) -> BigUint {
    modulus(bits) - BigUint::one()
}

fn wrap(value: &BigInt, bits: usize) -> BigUint {
    let modulus = BigInt::one() << bits;
    let mut value = value % &modulus;
    if value.sign() == Sign::Minus {
        value += &modulus;
    }
    value.to_biguint().unwrap_or_default()
}

impl Constant {
    /// Create a new `Constant` with the given value and bitness.
    pub fn new(value: u64, bits: usize) -> Constant {
        Constant::new_big(BigUint::from(value), bits)
    }

    /// Create a new `Constant` from a `BigUint`.
    pub fn new_big(value: BigUint, bits: usize) -> Constant {
        Constant {
            value: value & ones(bits),
            bits,
            signed: false,
        }
    }

    /// Create a `Constant` from a width which is not known to be valid,
    /// such as one read from outside the crate.
    pub fn checked(value: BigUint, bits: usize) -> Result<Constant, Error> {
        if bits == 0 {
            return Err(Error::ZeroWidth);
        }
        Ok(Constant::new_big(value, bits))
    }

    /// Create a signed `Constant`, stored in two's complement.
    pub fn from_i64(value: i64, bits: usize) -> Constant {
        Constant {
            value: wrap(&BigInt::from(value), bits),
            bits,
            signed: true,
        }
    }

    fn from_bigint(value: &BigInt, bits: usize) -> Constant {
        Constant {
            value: wrap(value, bits),
            bits,
            signed: false,
        }
    }

    /// A constant of the given width with every bit set.
    pub fn ones(bits: usize) -> Constant {
        Constant::new_big(ones(bits), bits)
    }

    /// Returns this constant with the signedness hint set.
    pub fn with_signed(mut self, signed: bool) -> Constant {
        self.signed = signed;
        self
    }

    /// Get the value of this `Constant`.
    pub fn value(&self) -> &BigUint {
        &self.value
    }

    /// Get the value as a `u64`, if it fits.
    pub fn value_u64(&self) -> Option<u64> {
        self.value.to_u64()
    }

    /// Get the value, interpreted in two's complement, as an `i64`.
    pub fn value_i64(&self) -> Option<i64> {
        self.signed_value().to_i64()
    }

    /// Get the value interpreted in two's complement.
    pub fn signed_value(&self) -> BigInt {
        if self.msb() {
            BigInt::from(self.value.clone()) - (BigInt::one() << self.bits)
        } else {
            BigInt::from(self.value.clone())
        }
    }

    /// Get the number of bits for this `Constant`.
    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_one(&self) -> bool {
        self.value.is_one()
    }

    /// True if every bit of this constant is set.
    pub fn is_ones(&self) -> bool {
        self.value == ones(self.bits)
    }

    /// The most significant bit.
    pub fn msb(&self) -> bool {
        match self.bits.checked_sub(1) {
            Some(bit) => self.bit(bit),
            None => false,
        }
    }

    pub fn bit(&self, bit: usize) -> bool {
        ((&self.value >> bit) & BigUint::one()).is_one()
    }

    pub fn add(&self, rhs: &Constant) -> Constant {
        Constant::new_big(&self.value + &rhs.value, self.bits)
    }

    pub fn sub(&self, rhs: &Constant) -> Constant {
        Constant::new_big(&self.value + modulus(self.bits) - &rhs.value, self.bits)
    }

    pub fn mul(&self, rhs: &Constant) -> Constant {
        Constant::new_big(&self.value * &rhs.value, self.bits)
    }

    /// Unsigned division, `None` when dividing by zero.
    pub fn divu(&self, rhs: &Constant) -> Option<Constant> {
        if rhs.is_zero() {
            return None;
        }
        Some(Constant::new_big(&self.value / &rhs.value, self.bits))
    }

    pub fn modu(&self, rhs: &Constant) -> Option<Constant> {
        if rhs.is_zero() {
            return None;
        }
        Some(Constant::new_big(&self.value % &rhs.value, self.bits))
    }

    /// Signed division, truncating toward zero.
    pub fn divs(&self, rhs: &Constant) -> Option<Constant> {
        if rhs.is_zero() {
            return None;
        }
        let quotient = self.signed_value() / rhs.signed_value();
        Some(Constant::from_bigint(&quotient, self.bits))
    }

    pub fn mods(&self, rhs: &Constant) -> Option<Constant> {
        if rhs.is_zero() {
            return None;
        }
        let remainder = self.signed_value() % rhs.signed_value();
        Some(Constant::from_bigint(&remainder, self.bits))
    }

    pub fn and(&self, rhs: &Constant) -> Constant {
        Constant::new_big(&self.value & &rhs.value, self.bits)
    }

    pub fn or(&self, rhs: &Constant) -> Constant {
        Constant::new_big(&self.value | &rhs.value, self.bits)
    }

    pub fn xor(&self, rhs: &Constant) -> Constant {
        Constant::new_big(&self.value ^ &rhs.value, self.bits)
    }

    // Shift counts at or beyond the width saturate.
    fn shift_count(&self, rhs: &Constant) -> usize {
        match rhs.value.to_usize() {
            Some(count) if count < self.bits => count,
            _ => self.bits,
        }
    }

    pub fn shl(&self, rhs: &Constant) -> Constant {
        let count = self.shift_count(rhs);
        Constant::new_big(&self.value << count, self.bits)
    }

    pub fn shr(&self, rhs: &Constant) -> Constant {
        let count = self.shift_count(rhs);
        Constant::new_big(&self.value >> count, self.bits)
    }

    pub fn sar(&self, rhs: &Constant) -> Constant {
        let count = self.shift_count(rhs);
        Constant::from_bigint(&(self.signed_value() >> count), self.bits)
    }

    pub fn neg(&self) -> Constant {
        Constant::from_bigint(&-self.signed_value(), self.bits)
    }

    pub fn not(&self) -> Constant {
        Constant::new_big(&self.value ^ ones(self.bits), self.bits)
    }

    /// 1 when the low byte holds an even number of set bits.
    pub fn parity(&self) -> Constant {
        let low = (&self.value & BigUint::from(0xffu32))
            .to_u8()
            .unwrap_or_default();
        Constant::from_bool(low.count_ones() % 2 == 0)
    }

    pub fn from_bool(value: bool) -> Constant {
        Constant::new(if value { 1 } else { 0 }, 1)
    }

    pub fn cmpeq(&self, rhs: &Constant) -> Constant {
        Constant::from_bool(self.value == rhs.value)
    }

    pub fn cmpneq(&self, rhs: &Constant) -> Constant {
        Constant::from_bool(self.value != rhs.value)
    }

    pub fn cmpltu(&self, rhs: &Constant) -> Constant {
        Constant::from_bool(self.value < rhs.value)
    }

    pub fn cmpleu(&self, rhs: &Constant) -> Constant {
        Constant::from_bool(self.value <= rhs.value)
    }

    pub fn cmplts(&self, rhs: &Constant) -> Constant {
        Constant::from_bool(self.signed_value() < rhs.signed_value())
    }

    pub fn cmples(&self, rhs: &Constant) -> Constant {
        Constant::from_bool(self.signed_value() <= rhs.signed_value())
    }

    /// Take `bits` bits starting at bit `offset`.
    pub fn extract(&self, offset: usize, bits: usize) -> Constant {
        Constant::new_big(&self.value >> offset, bits)
    }

    /// Place `high` above `self`.
    pub fn concat(&self, high: &Constant) -> Constant {
        Constant::new_big(
            &self.value | (&high.value << self.bits),
            self.bits + high.bits,
        )
    }

    /// Zero-extend or truncate to the given width.
    pub fn resize(&self, bits: usize) -> Constant {
        Constant::new_big(self.value.clone(), bits)
    }

    /// Sign-extend or truncate to the given width.
    pub fn sign_resize(&self, bits: usize) -> Constant {
        Constant::from_bigint(&self.signed_value(), bits).with_signed(self.signed)
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Constant) -> bool {
        self.bits == other.bits && self.value == other.value
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
        self.value.hash(state);
    }
}

impl PartialOrd for Constant {
    fn partial_cmp(&self, other: &Constant) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Constant {
    fn cmp(&self, other: &Constant) -> Ordering {
        self.bits
            .cmp(&other.bits)
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.signed && self.msb() {
            write!(f, "-0x{:x}", modulus(self.bits) - &self.value)
        } else {
            write!(f, "0x{:x}", self.value)
        }
    }
}
