//! Process types, port connections, and whole designs.
//!
//! A [`ProcType`] declares local state slots and an optional behavior, plus
//! sub-instances of other process types. Port connections alias a child's
//! local slot onto one of the parent's slots; the simulator's flattener
//! resolves these into shared global offsets.

use crate::arena::Arena;
use crate::chp::ChpStmt;
use crate::ids::ProcId;
use crate::prs::{ExclGroup, PrsRule};
use serde::{Deserialize, Serialize};

/// The three classes of simulation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotClass {
    /// Ternary Boolean nodes.
    Bool,
    /// Fixed-width unsigned integers.
    Int,
    /// Rendezvous channels.
    Chan,
}

impl std::fmt::Display for SlotClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotClass::Bool => write!(f, "bool"),
            SlotClass::Int => write!(f, "int"),
            SlotClass::Chan => write!(f, "channel"),
        }
    }
}

/// A declared slot kind, carrying the width where one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotKind {
    /// A ternary Boolean node.
    Bool,
    /// An unsigned integer of the given bit width.
    Int {
        /// Declared bit width; stored values stay in `[0, 2^width)`.
        width: u32,
    },
    /// A rendezvous channel carrying values of the given bit width
    /// (width 0 for dataless channels).
    Chan {
        /// Data width of the channel.
        width: u32,
    },
}

impl SlotKind {
    /// The class this kind belongs to.
    pub fn class(&self) -> SlotClass {
        match self {
            SlotKind::Bool => SlotClass::Bool,
            SlotKind::Int { .. } => SlotClass::Int,
            SlotKind::Chan { .. } => SlotClass::Chan,
        }
    }
}

/// A named local state declaration; `count > 1` declares an array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarDecl {
    /// The declared identifier.
    pub name: String,
    /// The slot kind.
    pub kind: SlotKind,
    /// Array length (1 for scalars).
    pub count: u32,
}

impl VarDecl {
    /// A scalar declaration.
    pub fn scalar(name: impl Into<String>, kind: SlotKind) -> Self {
        Self {
            name: name.into(),
            kind,
            count: 1,
        }
    }

    /// An array declaration.
    pub fn array(name: impl Into<String>, kind: SlotKind, count: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            count,
        }
    }
}

/// The behavior of a process type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProcBody {
    /// A CHP program.
    Chp(ChpStmt),
    /// A handshaking-expansion program — same statement language as CHP
    /// over Booleans, but dispatched during reset mode.
    Hse(ChpStmt),
    /// A production-rule network.
    Prs {
        /// The rules.
        rules: Vec<PrsRule>,
        /// Declared exclusive-high/low groups.
        excl_groups: Vec<ExclGroup>,
    },
}

/// A reference to a local slot by class and offset within that class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRef {
    /// The slot class.
    pub class: SlotClass,
    /// Offset within the class's local array.
    pub offset: usize,
}

impl SlotRef {
    /// A Boolean slot reference.
    pub fn bool(offset: usize) -> Self {
        Self {
            class: SlotClass::Bool,
            offset,
        }
    }

    /// An integer slot reference.
    pub fn int(offset: usize) -> Self {
        Self {
            class: SlotClass::Int,
            offset,
        }
    }

    /// A channel slot reference.
    pub fn chan(offset: usize) -> Self {
        Self {
            class: SlotClass::Chan,
            offset,
        }
    }
}

/// A port connection: the child's local slot aliases the parent's.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Conn {
    /// Slot in the child instance.
    pub child: SlotRef,
    /// Slot in the parent (same class).
    pub parent: SlotRef,
}

/// A named sub-instance of another process type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubInst {
    /// Instance name (one path segment).
    pub name: String,
    /// The instantiated process type.
    pub proc: ProcId,
    /// Port connections into the parent.
    pub conns: Vec<Conn>,
}

/// A process type: declarations, optional behavior, sub-instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcType {
    /// The type name (used by `initialize` and diagnostics).
    pub name: String,
    /// Local state declarations, in declaration order.
    pub decls: Vec<VarDecl>,
    /// The behavior, if this type is a leaf with one.
    pub body: Option<ProcBody>,
    /// Child instances.
    pub insts: Vec<SubInst>,
}

impl ProcType {
    /// An empty process type with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            decls: Vec::new(),
            body: None,
            insts: Vec::new(),
        }
    }

    /// Number of local slots of the given class (arrays flattened).
    pub fn slot_count(&self, class: SlotClass) -> usize {
        self.decls
            .iter()
            .filter(|d| d.kind.class() == class)
            .map(|d| d.count as usize)
            .sum()
    }

    /// Looks up a declared identifier, returning its kind, base offset
    /// within its class, and array length.
    pub fn lookup(&self, name: &str) -> Option<(SlotKind, usize, u32)> {
        let mut offsets = [0usize; 3];
        for decl in &self.decls {
            let idx = decl.kind.class() as usize;
            if decl.name == name {
                return Some((decl.kind, offsets[idx], decl.count));
            }
            offsets[idx] += decl.count as usize;
        }
        None
    }
}

/// A complete elaborated design: process types plus the default top.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Design {
    /// All process types.
    pub procs: Arena<ProcId, ProcType>,
    /// The default top-level process type.
    pub top: ProcId,
}

impl Design {
    /// Finds a process type by name.
    pub fn find_proc(&self, name: &str) -> Option<ProcId> {
        self.procs
            .iter()
            .find(|(_, p)| p.name == name)
            .map(|(id, _)| id)
    }
}
