use core::fmt;

use lazy_static::lazy_static;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use super::types::Type;

/// Size of a memory cell in bytes. Addresses are byte-granular, but every
/// load and store moves exactly one cell.
pub const CELL_BYTES: u64 = 32;

lazy_static! {
    pub static ref INT_0: BigInt = BigInt::from(0);
    pub static ref INT_CELL: BigInt = BigInt::from(CELL_BYTES);
}

/// A constant value in the intermediate representation.
///
/// Integer constants are full 256-bit cells, so they are kept as `BigInt`
/// rather than a machine integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Const {
    Int(BigInt),
    Bool(bool),
}

impl Const {
    pub fn int(value: impl Into<BigInt>) -> Self {
        Const::Int(value.into())
    }

    pub fn ty(&self) -> Type {
        match self {
            Const::Int(_) => Type::Cell,
            Const::Bool(_) => Type::Bool,
        }
    }

    /// Narrows an integer constant to `i64`, if it is one and it fits.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Const::Int(i) => i.to_i64(),
            Const::Bool(_) => None,
        }
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Int(i) => write!(f, "{}", i),
            Const::Bool(b) => write!(f, "{}", b),
        }
    }
}
