//! Typed cell references
//!
//! [`CellRef`] is implemented by every typed pointer the barrier surface
//! accepts; [`GcThing`] is anything that can sit in a barriered slot
//! (nullable typed pointers and tagged values).

use super::{CellAddr, CellKind, Value};
use std::fmt;

/// A non-null typed reference to a heap cell
pub trait CellRef: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Kind this reference points to, `None` for untyped addresses
    const KIND: Option<CellKind>;

    fn from_addr(addr: CellAddr) -> Self;

    fn addr(self) -> CellAddr;
}

impl CellRef for CellAddr {
    const KIND: Option<CellKind> = None;

    #[inline]
    fn from_addr(addr: CellAddr) -> Self {
        addr
    }

    #[inline]
    fn addr(self) -> CellAddr {
        self
    }
}

macro_rules! typed_cell_ref {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(CellAddr);

        impl CellRef for $name {
            const KIND: Option<CellKind> = Some($kind);

            #[inline]
            fn from_addr(addr: CellAddr) -> Self {
                $name(addr)
            }

            #[inline]
            fn addr(self) -> CellAddr {
                self.0
            }
        }

        impl From<$name> for Value {
            fn from(r: $name) -> Self {
                Value::Cell(r.0)
            }
        }
    };
}

typed_cell_ref!(
    /// Reference to an object cell
    ObjectRef,
    CellKind::Object
);
typed_cell_ref!(
    /// Reference to a string cell
    StringRef,
    CellKind::String
);
typed_cell_ref!(
    /// Reference to an arbitrary-precision integer cell
    BigIntRef,
    CellKind::BigInt
);
typed_cell_ref!(
    /// Reference to a compiled-script cell
    ScriptRef,
    CellKind::Script
);

/// Anything that can be stored in a barriered slot
pub trait GcThing: Copy + fmt::Debug {
    /// Cell this thing references, if any
    fn as_cell(&self) -> Option<CellAddr>;

    fn into_value(self) -> Value;
}

impl GcThing for Value {
    #[inline]
    fn as_cell(&self) -> Option<CellAddr> {
        Value::as_cell(self)
    }

    #[inline]
    fn into_value(self) -> Value {
        self
    }
}

impl<T: CellRef> GcThing for Option<T> {
    #[inline]
    fn as_cell(&self) -> Option<CellAddr> {
        self.map(CellRef::addr)
    }

    #[inline]
    fn into_value(self) -> Value {
        self.map_or(Value::Null, |r| Value::Cell(r.addr()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_ref_round_trip() {
        let addr = CellAddr::new(0x100).unwrap();
        let obj = ObjectRef::from_addr(addr);
        assert_eq!(obj.addr(), addr);
        assert_eq!(ObjectRef::KIND, Some(CellKind::Object));
        assert_eq!(CellAddr::KIND, None);
    }

    #[test]
    fn test_null_pointer_is_null_value() {
        let none: Option<StringRef> = None;
        assert_eq!(none.as_cell(), None);
        assert_eq!(none.into_value(), Value::Null);
    }

    #[test]
    fn test_primitive_value_has_no_cell() {
        assert_eq!(GcThing::as_cell(&Value::Int32(3)), None);
        assert_eq!(GcThing::as_cell(&Value::Undefined), None);
    }
}
