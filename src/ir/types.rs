use core::fmt;

/// A value type in the intermediate representation.
///
/// The machine is word-oriented: every scalar, including an address, is a
/// 256-bit cell. `Bool` exists only as the result of comparisons and the
/// operand of conditional branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Cell,
    Bool,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Cell => write!(f, "cell"),
            Type::Bool => write!(f, "bool"),
        }
    }
}
