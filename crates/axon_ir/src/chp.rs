//! CHP/HSE statement trees.
//!
//! [`ChpStmt`] is the behavioral description of a process: sequencing,
//! parallel composition, guarded selection (deterministic and
//! non-deterministic), loops, channel communication, and assignment. The
//! simulator lowers these trees into an explicit program graph before
//! execution; labels and gotos are resolved during that lowering.

use crate::expr::Expr;
use serde::{Deserialize, Serialize};

/// A writable process-local variable reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarRef {
    /// A local Boolean slot.
    Bool(usize),
    /// A local integer slot.
    Int(usize),
}

/// One arm of a guarded selection or loop: `G -> S`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardedCmd {
    /// The guard expression (must evaluate to a Boolean).
    pub guard: Expr,
    /// The body executed when the guard is chosen.
    pub body: ChpStmt,
}

/// A CHP/HSE statement.
///
/// Delays on the communication and assignment forms override the
/// simulator's default action delay; `None` defers to the timing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChpStmt {
    /// `skip` — no effect.
    Skip,
    /// `v := e` — evaluate and store.
    Assign {
        /// The target variable.
        var: VarRef,
        /// The value expression.
        expr: Expr,
        /// Optional delay override in ticks.
        delay: Option<u64>,
    },
    /// `C!e` — send on a channel (dataless when `expr` is `None`).
    Send {
        /// Local channel offset.
        chan: usize,
        /// The value to send, if the channel carries data.
        expr: Option<Expr>,
        /// Optional delay override in ticks.
        delay: Option<u64>,
    },
    /// `C?v` — receive from a channel (dataless when `var` is `None`).
    Recv {
        /// Local channel offset.
        chan: usize,
        /// The variable bound to the received value, if any.
        var: Option<VarRef>,
        /// Optional delay override in ticks.
        delay: Option<u64>,
    },
    /// `S1; S2; ...` — sequential composition.
    Seq(Vec<ChpStmt>),
    /// `S1, S2, ...` — parallel composition; completes when every branch
    /// completes.
    Par(Vec<ChpStmt>),
    /// `[ G1 -> S1 [] ... ]` — deterministic selection: guards are
    /// evaluated in declaration order, the first true one wins, and the
    /// statement blocks until some guard holds.
    DetSel(Vec<GuardedCmd>),
    /// `[ G1 -> S1 : ... ]` — non-deterministic selection with an optional
    /// `else`. Blocks when no guard holds and there is no `else`.
    NondetSel {
        /// The guarded arms.
        arms: Vec<GuardedCmd>,
        /// The `else` body taken when no guard holds.
        else_body: Option<Box<ChpStmt>>,
    },
    /// `*[ G1 -> S1 [] ... ]` — guarded loop; exits when all guards are
    /// false.
    WhileLoop(Vec<GuardedCmd>),
    /// `*[ S ]` — infinite repetition.
    Forever(Box<ChpStmt>),
    /// A labeled statement, targetable by [`ChpStmt::Goto`] and the
    /// `goto` command.
    Label {
        /// The label name.
        name: String,
        /// The labeled statement.
        body: Box<ChpStmt>,
    },
    /// Transfer control to a label. Only legal while the process has a
    /// single live thread.
    Goto(String),
}
