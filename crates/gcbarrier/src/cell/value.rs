//! Tagged slot values
//!
//! A slot holds one 64-bit word. The tag lives above the 48 address bits:
//!
//! ```text
//! ┌────────────┬──────────┬──────────────────────────────────┐
//! │   unused   │   Tag    │   Payload (address / int / bool) │
//! │   63-52    │  51-48   │              47-0                │
//! └────────────┴──────────┴──────────────────────────────────┘
//! ```
//!
//! The all-zero word is `undefined`, so a fresh slot needs no initialisation.

use super::CellAddr;

const TAG_SHIFT: u64 = 48;
const TAG_MASK: u64 = 0xF << TAG_SHIFT;
const PAYLOAD_MASK: u64 = (1 << TAG_SHIFT) - 1;

const TAG_UNDEFINED: u64 = 0;
const TAG_NULL: u64 = 1;
const TAG_BOOLEAN: u64 = 2;
const TAG_INT32: u64 = 3;
const TAG_CELL: u64 = 4;

/// Value - contents of a heap slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Int32(i32),
    Cell(CellAddr),
}

impl Value {
    /// Cell reference, or `None` for primitives
    #[inline]
    pub fn as_cell(&self) -> Option<CellAddr> {
        match self {
            Value::Cell(addr) => Some(*addr),
            _ => None,
        }
    }

    #[inline]
    pub fn is_cell(&self) -> bool {
        matches!(self, Value::Cell(_))
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Encode into a slot word
    pub fn to_bits(self) -> u64 {
        match self {
            Value::Undefined => TAG_UNDEFINED << TAG_SHIFT,
            Value::Null => TAG_NULL << TAG_SHIFT,
            Value::Boolean(b) => (TAG_BOOLEAN << TAG_SHIFT) | b as u64,
            Value::Int32(i) => (TAG_INT32 << TAG_SHIFT) | (i as u32 as u64),
            Value::Cell(addr) => {
                debug_assert!(addr.get() as u64 <= PAYLOAD_MASK);
                (TAG_CELL << TAG_SHIFT) | (addr.get() as u64 & PAYLOAD_MASK)
            }
        }
    }

    /// Decode a slot word produced by [`Value::to_bits`]
    pub fn from_bits(bits: u64) -> Self {
        let payload = bits & PAYLOAD_MASK;
        match (bits & TAG_MASK) >> TAG_SHIFT {
            TAG_NULL => Value::Null,
            TAG_BOOLEAN => Value::Boolean(payload != 0),
            TAG_INT32 => Value::Int32(payload as u32 as i32),
            TAG_CELL => match CellAddr::new(payload as usize) {
                Some(addr) => Value::Cell(addr),
                None => Value::Null,
            },
            _ => Value::Undefined,
        }
    }
}

impl From<CellAddr> for Value {
    fn from(addr: CellAddr) -> Self {
        Value::Cell(addr)
    }
}

impl From<Option<CellAddr>> for Value {
    fn from(addr: Option<CellAddr>) -> Self {
        addr.map_or(Value::Null, Value::Cell)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int32(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_word_is_undefined() {
        assert_eq!(Value::from_bits(0), Value::Undefined);
        assert_eq!(Value::Undefined.to_bits(), 0);
    }

    #[test]
    fn test_negative_int_survives_encoding() {
        let v = Value::Int32(-42);
        assert_eq!(Value::from_bits(v.to_bits()), v);
    }

    #[test]
    fn test_cell_encoding_keeps_full_address() {
        let addr = CellAddr::new(0x7FFF_0000_1230).unwrap();
        let v = Value::Cell(addr);
        assert_eq!(Value::from_bits(v.to_bits()).as_cell(), Some(addr));
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<CellAddr>), Value::Null);
        assert!(Value::from(CellAddr::new(16)).is_cell());
    }
}
