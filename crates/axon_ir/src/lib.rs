//! Intermediate representation for the axon asynchronous-circuit simulator.
//!
//! A [`Design`] is a set of process types. Each process type declares its
//! local state slots (Booleans, fixed-width integers, rendezvous channels),
//! an optional behavior (a CHP or HSE statement tree, or a production-rule
//! set), and sub-instances whose ports alias slots of the parent. The
//! simulator flattens this hierarchy and interprets the bodies.
//!
//! All types serialize with `serde`, so elaborated designs can be stored and
//! reloaded without a language frontend.

#![warn(missing_docs)]

pub mod arena;
pub mod chp;
pub mod expr;
pub mod ids;
pub mod process;
pub mod prs;

pub use arena::{Arena, ArenaId};
pub use chp::{ChpStmt, GuardedCmd, VarRef};
pub use expr::{BinaryOp, Expr, ExprInputs, ProbeSide};
pub use ids::{ChpNodeId, ProcId};
pub use process::{Conn, Design, ProcBody, ProcType, SlotClass, SlotKind, SlotRef, SubInst, VarDecl};
pub use prs::{ExclGroup, PrsRule, RuleDir};
