//! Expression evaluation over the flat state store.
//!
//! Expressions reference process-local slots; a [`Scope`] carries the
//! instance's local-to-global maps. Typing is dynamic: operand mismatches
//! are reported as domain errors at evaluation time.

use axon_common::{BigInt, Tri};
use axon_ir::{BinaryOp, Expr};

use crate::error::SimError;
use crate::state::StateStore;

/// A runtime value: a ternary Boolean or an unsigned integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A ternary Boolean.
    Bool(Tri),
    /// An unsigned integer.
    Int(BigInt),
}

impl Value {
    /// Display form used by logs and traces.
    pub fn display(&self) -> String {
        match self {
            Value::Bool(t) => t.to_string(),
            Value::Int(v) => v.to_string(),
        }
    }
}

/// An instance's view of the store: local offset → global offset, per class.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    /// Local Boolean offsets to global.
    pub bools: &'a [usize],
    /// Local integer offsets to global.
    pub ints: &'a [usize],
    /// Local channel offsets to global.
    pub chans: &'a [usize],
}

impl Scope<'_> {
    /// Resolves a local Boolean offset.
    pub fn global_bool(&self, local: usize) -> Result<usize, SimError> {
        self.bools
            .get(local)
            .copied()
            .ok_or_else(|| SimError::fatal(format!("local bool {local} unmapped")))
    }

    /// Resolves a local integer offset.
    pub fn global_int(&self, local: usize) -> Result<usize, SimError> {
        self.ints
            .get(local)
            .copied()
            .ok_or_else(|| SimError::fatal(format!("local int {local} unmapped")))
    }

    /// Resolves a local channel offset.
    pub fn global_chan(&self, local: usize) -> Result<usize, SimError> {
        self.chans
            .get(local)
            .copied()
            .ok_or_else(|| SimError::fatal(format!("local channel {local} unmapped")))
    }
}

/// Evaluates an expression in the given scope.
pub fn eval(expr: &Expr, scope: &Scope<'_>, store: &StateStore) -> Result<Value, SimError> {
    match expr {
        Expr::Bool(local) => {
            let g = scope.global_bool(*local)?;
            Ok(Value::Bool(store.bool_slot(g)?.value))
        }
        Expr::Int(local) => {
            let g = scope.global_int(*local)?;
            Ok(Value::Int(store.int_slot(g)?.value.clone()))
        }
        Expr::Probe { chan, side } => {
            let g = scope.global_chan(*chan)?;
            Ok(Value::Bool(Tri::from(store.chan_slot(g)?.probe(*side))))
        }
        Expr::TriConst(t) => Ok(Value::Bool(*t)),
        Expr::IntConst(v) => Ok(Value::Int(v.clone())),
        Expr::Not(inner) => match eval(inner, scope, store)? {
            Value::Bool(t) => Ok(Value::Bool(!t)),
            Value::Int(v) => Ok(Value::Int(v.not_within_width())),
        },
        Expr::Binary { op, lhs, rhs } => {
            let lhs = eval(lhs, scope, store)?;
            let rhs = eval(rhs, scope, store)?;
            eval_binary(*op, lhs, rhs)
        }
    }
}

/// Evaluates a guard, which must produce a Boolean.
pub fn eval_guard(expr: &Expr, scope: &Scope<'_>, store: &StateStore) -> Result<Tri, SimError> {
    match eval(expr, scope, store)? {
        Value::Bool(t) => Ok(t),
        Value::Int(_) => Err(SimError::type_domain("guard must be a Boolean expression")),
    }
}

fn eval_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, SimError> {
    use BinaryOp::*;
    match (op, lhs, rhs) {
        (And, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a & b)),
        (Or, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a | b)),
        (Xor, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a ^ b)),
        (And, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.bitand(&b))),
        (Or, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.bitor(&b))),
        (Xor, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.bitxor(&b))),

        (Eq, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(tri_eq(a, b))),
        (Ne, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(!tri_eq(a, b))),

        (Add, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.add(&b))),
        (Sub, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.sub_wrap(&b))),
        (Mul, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.mul(&b))),
        (Div, Value::Int(a), Value::Int(b)) => {
            let (q, _) = a.div_rem(&b).ok_or(SimError::DivisionByZero)?;
            Ok(Value::Int(q))
        }
        (Mod, Value::Int(a), Value::Int(b)) => {
            let (_, r) = a.div_rem(&b).ok_or(SimError::DivisionByZero)?;
            Ok(Value::Int(r))
        }
        (Shl, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.shl(shift_amount(&b)?))),
        (Shr, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.shr(shift_amount(&b)?))),

        (Eq, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(Tri::from(a == b))),
        (Ne, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(Tri::from(a != b))),
        (Lt, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(Tri::from(a < b))),
        (Le, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(Tri::from(a <= b))),
        (Gt, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(Tri::from(a > b))),
        (Ge, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(Tri::from(a >= b))),

        (op, lhs, rhs) => Err(SimError::type_domain(format!(
            "operator {op:?} cannot be applied to {} and {}",
            kind_name(&lhs),
            kind_name(&rhs)
        ))),
    }
}

/// Ternary equality: X compared with anything is X.
fn tri_eq(a: Tri, b: Tri) -> Tri {
    if a == Tri::X || b == Tri::X {
        Tri::X
    } else {
        Tri::from(a == b)
    }
}

fn shift_amount(v: &BigInt) -> Result<u32, SimError> {
    v.to_u64()
        .filter(|&n| n <= u32::MAX as u64)
        .map(|n| n as u32)
        .ok_or_else(|| SimError::type_domain("shift amount too large"))
}

fn kind_name(v: &Value) -> &'static str {
    match v {
        Value::Bool(_) => "a Boolean",
        Value::Int(_) => "an integer",
    }
}
