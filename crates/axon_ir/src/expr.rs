//! Expression trees over process-local state.
//!
//! Expressions read Boolean and integer slots by their process-local offset
//! and may probe channels (`#C`). Typing is dynamic: the evaluator in the
//! simulator rejects operand mismatches at run time, the way the original
//! interpreter does.

use axon_common::{BigInt, Tri};
use serde::{Deserialize, Serialize};

/// A binary operator.
///
/// `And`/`Or`/`Xor` apply to two Booleans (ternary truth tables) or two
/// integers (bitwise). The arithmetic and shift operators are
/// integer-only; the comparisons take two integers and yield a Boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Conjunction / bitwise AND.
    And,
    /// Disjunction / bitwise OR.
    Or,
    /// Exclusive or / bitwise XOR.
    Xor,
    /// Addition.
    Add,
    /// Subtraction (modulo the operand width).
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Remainder.
    Mod,
    /// Left shift by an integer amount.
    Shl,
    /// Logical right shift by an integer amount.
    Shr,
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

/// The side from which a channel probe is evaluated.
///
/// `#C` is true iff a peer is blocked on the opposite side, so the prober's
/// own side determines which phase satisfies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeSide {
    /// The prober would send: true iff a receiver is waiting.
    Sender,
    /// The prober would receive: true iff a sender is waiting.
    Receiver,
}

/// An expression over a process's local slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    /// Read of a local Boolean slot.
    Bool(usize),
    /// Read of a local integer slot.
    Int(usize),
    /// Channel probe `#C`: true iff a peer is blocked on the far side of
    /// the local channel slot.
    Probe {
        /// Local channel offset.
        chan: usize,
        /// The prober's side of the channel.
        side: ProbeSide,
    },
    /// A ternary literal.
    TriConst(Tri),
    /// An integer literal.
    IntConst(BigInt),
    /// Negation: ternary NOT on Booleans, bitwise complement on integers.
    Not(Box<Expr>),
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// The left-hand side.
        lhs: Box<Expr>,
        /// The right-hand side.
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// The literal `true`.
    pub fn truth() -> Self {
        Expr::TriConst(Tri::One)
    }

    /// Builds a binary operation, boxing both operands.
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Builds a negation.
    pub fn not(operand: Expr) -> Self {
        Expr::Not(Box::new(operand))
    }

    /// Builds an integer literal from a `u64`.
    pub fn int_const(v: u64) -> Self {
        Expr::IntConst(BigInt::from_u64(v))
    }

    /// Builds a receiver-side probe of a local channel.
    pub fn probe(chan: usize) -> Self {
        Expr::Probe {
            chan,
            side: ProbeSide::Receiver,
        }
    }

    /// Collects every local slot this expression reads.
    pub fn collect_inputs(&self, into: &mut ExprInputs) {
        match self {
            Expr::Bool(off) => into.bools.push(*off),
            Expr::Int(off) => into.ints.push(*off),
            Expr::Probe { chan, side } => into.probes.push((*chan, *side)),
            Expr::TriConst(_) | Expr::IntConst(_) => {}
            Expr::Not(inner) => inner.collect_inputs(into),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_inputs(into);
                rhs.collect_inputs(into);
            }
        }
    }

    /// Returns all slots read by this expression.
    pub fn inputs(&self) -> ExprInputs {
        let mut inputs = ExprInputs::default();
        self.collect_inputs(&mut inputs);
        inputs
    }
}

/// The local slots read by an expression, by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExprInputs {
    /// Local Boolean offsets.
    pub bools: Vec<usize>,
    /// Local integer offsets.
    pub ints: Vec<usize>,
    /// Local channel offsets appearing under a probe, with the probing side.
    pub probes: Vec<(usize, ProbeSide)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders() {
        let e = Expr::binary(BinaryOp::And, Expr::Bool(0), Expr::not(Expr::Bool(1)));
        match e {
            Expr::Binary { op, lhs, rhs } => {
                assert_eq!(op, BinaryOp::And);
                assert!(matches!(*lhs, Expr::Bool(0)));
                assert!(matches!(*rhs, Expr::Not(_)));
            }
            _ => panic!("expected Binary"),
        }
    }

    #[test]
    fn truth_is_one() {
        assert!(matches!(Expr::truth(), Expr::TriConst(Tri::One)));
    }

    #[test]
    fn collect_inputs_all_kinds() {
        let e = Expr::binary(
            BinaryOp::Or,
            Expr::binary(BinaryOp::Eq, Expr::Int(3), Expr::int_const(5)),
            Expr::binary(BinaryOp::And, Expr::Bool(1), Expr::probe(2)),
        );
        let inputs = e.inputs();
        assert_eq!(inputs.bools, vec![1]);
        assert_eq!(inputs.ints, vec![3]);
        assert_eq!(inputs.probes, vec![(2, ProbeSide::Receiver)]);
    }

    #[test]
    fn constants_have_no_inputs() {
        assert_eq!(Expr::truth().inputs(), ExprInputs::default());
        assert_eq!(Expr::int_const(9).inputs(), ExprInputs::default());
    }

    #[test]
    fn serde_roundtrip() {
        let e = Expr::binary(BinaryOp::Lt, Expr::Int(0), Expr::int_const(16));
        let json = serde_json::to_string(&e).unwrap();
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(back.inputs().ints, vec![0]);
    }
}
