//! Ternary logic values with truth-table-based operators.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};

/// A single ternary logic value.
///
/// The three states represent:
/// - `Zero` — logic low (driven 0)
/// - `One` — logic high (driven 1)
/// - `X` — unknown or uninitialized value
///
/// Unlike 4-state HDL logic there is no high-impedance state: production
/// rules hold a node at its last driven value when neither pull is active.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[repr(u8)]
pub enum Tri {
    /// Logic low (0).
    Zero = 0,
    /// Logic high (1).
    One = 1,
    /// Unknown or uninitialized.
    X = 2,
}

impl Tri {
    /// Converts a character to a [`Tri`] value.
    ///
    /// Accepts '0', '1', and 'x'/'X'.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Tri::Zero),
            '1' => Some(Tri::One),
            'x' | 'X' => Some(Tri::X),
            _ => None,
        }
    }

    /// Returns `true` if the value is definite (0 or 1).
    pub fn is_known(self) -> bool {
        self != Tri::X
    }
}

impl From<bool> for Tri {
    fn from(b: bool) -> Self {
        if b {
            Tri::One
        } else {
            Tri::Zero
        }
    }
}

impl fmt::Display for Tri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tri::Zero => write!(f, "0"),
            Tri::One => write!(f, "1"),
            Tri::X => write!(f, "X"),
        }
    }
}

/// Ternary AND truth table:
/// ```text
///     0  1  X
/// 0 | 0  0  0
/// 1 | 0  1  X
/// X | 0  X  X
/// ```
impl BitAnd for Tri {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        use Tri::*;
        match (self, rhs) {
            (Zero, _) | (_, Zero) => Zero,
            (One, One) => One,
            _ => X,
        }
    }
}

/// Ternary OR truth table:
/// ```text
///     0  1  X
/// 0 | 0  1  X
/// 1 | 1  1  1
/// X | X  1  X
/// ```
impl BitOr for Tri {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        use Tri::*;
        match (self, rhs) {
            (One, _) | (_, One) => One,
            (Zero, Zero) => Zero,
            _ => X,
        }
    }
}

/// Ternary XOR: any X operand yields X.
impl BitXor for Tri {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        use Tri::*;
        match (self, rhs) {
            (Zero, Zero) | (One, One) => Zero,
            (Zero, One) | (One, Zero) => One,
            _ => X,
        }
    }
}

/// Ternary NOT: `!0 = 1`, `!1 = 0`, `!X = X`.
impl Not for Tri {
    type Output = Self;

    fn not(self) -> Self {
        use Tri::*;
        match self {
            Zero => One,
            One => Zero,
            X => X,
        }
    }
}
