//! 32-bit pin masks.
//!
//! A mask is an unsigned bitmap where bit `n` is the state of pin `n`. Devices and
//! older clients transport masks as JSON numbers that were produced by signed 32-bit
//! arithmetic, so a mask with bit 31 set can arrive as a negative number, or as a
//! large positive number carried in a wider numeric type. Reads keep only the low
//! 32 bits of whatever arrives; writes always produce an unsigned number.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of pins carried by one mask
pub const MASK_WIDTH: u8 = 32;

const MASK_MODULUS: f64 = 4_294_967_296.0;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MaskParseError {
    #[error("Empty mask value")]
    Empty,

    #[error("Invalid mask value: {0}")]
    Invalid(String),
}

/// Pin state bitmap for one I/O bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Mask(u32);

impl Mask {
    pub const EMPTY: Mask = Mask(0);

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Interpret a signed wire value as two's-complement and keep its low 32 bits
    pub fn from_wire(value: i64) -> Self {
        Self(value as u32)
    }

    /// True if pin `bit` is high. Bits outside 0..32 read as low.
    pub fn test(self, bit: u8) -> bool {
        self.0 & bit_value(bit) != 0
    }

    /// Copy of the mask with pin `bit` forced high
    #[must_use]
    pub fn with(self, bit: u8) -> Self {
        Self(self.0 | bit_value(bit))
    }

    /// Copy of the mask with pin `bit` forced low
    #[must_use]
    pub fn without(self, bit: u8) -> Self {
        Self(self.0 & !bit_value(bit))
    }

    /// Copy of the mask with pin `bit` flipped
    #[must_use]
    pub fn toggled(self, bit: u8) -> Self {
        if self.test(bit) {
            self.without(bit)
        } else {
            self.with(bit)
        }
    }

    /// Indices of all high pins, ascending
    pub fn high_pins(self) -> impl Iterator<Item = u8> {
        (0..MASK_WIDTH).filter(move |bit| self.test(*bit))
    }

    /// Pins that went high and pins that went low going from `self` to `next`
    pub fn changes_to(self, next: Mask) -> (Vec<u8>, Vec<u8>) {
        let changed = Mask(self.0 ^ next.0);
        let mut set_bits = Vec::new();
        let mut cleared_bits = Vec::new();
        for bit in changed.high_pins() {
            if next.test(bit) {
                set_bits.push(bit);
            } else {
                cleared_bits.push(bit);
            }
        }
        (set_bits, cleared_bits)
    }
}

/// Single-bit value for `bit`, zero when the index does not address a pin
fn bit_value(bit: u8) -> u32 {
    1u32.checked_shl(bit as u32).unwrap_or(0)
}

pub fn test(mask: Mask, bit: u8) -> bool {
    mask.test(bit)
}

pub fn set(mask: Mask, bit: u8) -> Mask {
    mask.with(bit)
}

pub fn clear(mask: Mask, bit: u8) -> Mask {
    mask.without(bit)
}

pub fn toggle(mask: Mask, bit: u8) -> Mask {
    mask.toggled(bit)
}

impl From<u32> for Mask {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl From<Mask> for u32 {
    fn from(mask: Mask) -> Self {
        mask.0
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl fmt::Binary for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Binary::fmt(&self.0, f)
    }
}

impl FromStr for Mask {
    type Err = MaskParseError;

    /// Accepts `0x`-prefixed hex of any length or a decimal number within 128 bits,
    /// signed or unsigned
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MaskParseError::Empty);
        }

        if let Some(hex_str) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            if hex_str.is_empty() || !hex_str.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(MaskParseError::Invalid(s.to_string()));
            }
            // The last eight digits are the low 32 bits
            let low = &hex_str[hex_str.len().saturating_sub(8)..];
            return u32::from_str_radix(low, 16)
                .map(Mask)
                .map_err(|_| MaskParseError::Invalid(s.to_string()));
        }

        s.parse::<i128>()
            .map(|value| Mask(value as u32))
            .map_err(|_| MaskParseError::Invalid(s.to_string()))
    }
}

impl Serialize for Mask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

struct MaskVisitor;

impl<'de> Visitor<'de> for MaskVisitor {
    type Value = Mask;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an integer, an integral float or a decimal/hex string")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Mask, E> {
        Ok(Mask::from_wire(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Mask, E> {
        Ok(Mask(value as u32))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Mask, E> {
        if !value.is_finite() || value.fract() != 0.0 {
            return Err(E::custom(format!("mask is not an integer: {}", value)));
        }
        // Exact for every finite float, negative values wrap as two's complement
        Ok(Mask(value.rem_euclid(MASK_MODULUS) as u32))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Mask, E> {
        value.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Mask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MaskVisitor)
    }
}
