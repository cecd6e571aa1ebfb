//! Lowering of CHP statement trees into executable program graphs.
//!
//! The interpreter does not walk statement trees; each process instance
//! gets a [`ChpGraph`] whose nodes carry an explicit successor edge. A
//! thread's program counter is a node ID, so suspension and resumption are
//! plain state transitions. Selections and loops hold `(guard, target)`
//! arms; parallel composition lowers to a fork node and an arity-counting
//! join node; labels and gotos are resolved here, at lowering time.

use std::collections::HashMap;

use axon_ir::{Arena, ChpNodeId, ChpStmt, Expr, VarRef};

use crate::error::SimError;

/// How a selection chooses among simultaneously true guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelKind {
    /// Deterministic: guards evaluate in declaration order, first true
    /// wins.
    Det,
    /// Non-deterministic: the choice among true guards follows the
    /// kernel's random-choice policy.
    Nondet,
}

/// One `(guard, target)` arm of a selection or loop node.
#[derive(Debug, Clone)]
pub struct SelArm {
    /// The guard expression.
    pub guard: Expr,
    /// Entry node of the arm's body.
    pub target: ChpNodeId,
}

/// The operation a graph node performs.
#[derive(Debug, Clone)]
pub enum ChpNodeKind {
    /// No effect.
    Skip,
    /// Evaluate and store into a local variable.
    Assign {
        /// The target variable.
        var: VarRef,
        /// The value expression.
        expr: Expr,
        /// Declared delay override.
        delay: Option<u64>,
    },
    /// Send on a local channel.
    Send {
        /// Local channel offset.
        chan: usize,
        /// The sent value, if the channel carries data.
        expr: Option<Expr>,
        /// Declared delay override.
        delay: Option<u64>,
    },
    /// Receive from a local channel.
    Recv {
        /// Local channel offset.
        chan: usize,
        /// The bound variable, if any.
        var: Option<VarRef>,
        /// Declared delay override.
        delay: Option<u64>,
    },
    /// Guarded selection; blocks while no guard holds (unless `else_to`).
    Select {
        /// Choice discipline.
        kind: SelKind,
        /// The guarded arms.
        arms: Vec<SelArm>,
        /// Entry of the `else` body, if any.
        else_to: Option<ChpNodeId>,
    },
    /// Guarded loop head: a true guard enters its arm (whose body edges
    /// back here); all-false exits through `next`.
    Loop {
        /// The guarded arms.
        arms: Vec<SelArm>,
    },
    /// Fork child threads; the forking thread dies and the continuation
    /// resumes from the join.
    Fork {
        /// Entry nodes of the child threads.
        children: Vec<ChpNodeId>,
        /// The matching join node.
        join: ChpNodeId,
    },
    /// Join barrier: the last arriving child continues through `next`.
    Join {
        /// Number of children that must arrive.
        arity: usize,
    },
}

/// A graph node: an operation and its successor edge.
#[derive(Debug, Clone)]
pub struct ChpNode {
    /// The operation.
    pub kind: ChpNodeKind,
    /// The successor, `None` at the end of a thread's path.
    pub next: Option<ChpNodeId>,
}

/// A compiled CHP program.
#[derive(Debug, Clone)]
pub struct ChpGraph {
    /// All nodes.
    pub nodes: Arena<ChpNodeId, ChpNode>,
    /// The entry node.
    pub entry: ChpNodeId,
    /// Label name → labeled node.
    pub labels: HashMap<String, ChpNodeId>,
}

impl ChpGraph {
    /// The node with the given ID.
    pub fn node(&self, id: ChpNodeId) -> &ChpNode {
        self.nodes.get(id)
    }
}

/// Lowers a statement tree into a program graph.
pub fn compile(stmt: &ChpStmt) -> Result<ChpGraph, SimError> {
    let mut lowering = Lowering {
        nodes: Arena::new(),
        labels: HashMap::new(),
        gotos: Vec::new(),
    };
    let entry = lowering.lower(stmt, None)?;
    for (node, label) in lowering.gotos {
        let target = lowering.labels.get(&label).ok_or_else(|| {
            SimError::resolution(format!("goto target label `{label}` not found"))
        })?;
        lowering.nodes.get_mut(node).next = Some(*target);
    }
    Ok(ChpGraph {
        nodes: lowering.nodes,
        entry,
        labels: lowering.labels,
    })
}

struct Lowering {
    nodes: Arena<ChpNodeId, ChpNode>,
    labels: HashMap<String, ChpNodeId>,
    gotos: Vec<(ChpNodeId, String)>,
}

impl Lowering {
    fn alloc(&mut self, kind: ChpNodeKind, next: Option<ChpNodeId>) -> ChpNodeId {
        self.nodes.alloc(ChpNode { kind, next })
    }

    fn lower(
        &mut self,
        stmt: &ChpStmt,
        next: Option<ChpNodeId>,
    ) -> Result<ChpNodeId, SimError> {
        match stmt {
            ChpStmt::Skip => Ok(self.alloc(ChpNodeKind::Skip, next)),
            ChpStmt::Assign { var, expr, delay } => Ok(self.alloc(
                ChpNodeKind::Assign {
                    var: *var,
                    expr: expr.clone(),
                    delay: *delay,
                },
                next,
            )),
            ChpStmt::Send { chan, expr, delay } => Ok(self.alloc(
                ChpNodeKind::Send {
                    chan: *chan,
                    expr: expr.clone(),
                    delay: *delay,
                },
                next,
            )),
            ChpStmt::Recv { chan, var, delay } => Ok(self.alloc(
                ChpNodeKind::Recv {
                    chan: *chan,
                    var: *var,
                    delay: *delay,
                },
                next,
            )),
            ChpStmt::Seq(stmts) => {
                let mut cur = next;
                for s in stmts.iter().rev() {
                    cur = Some(self.lower(s, cur)?);
                }
                Ok(match cur {
                    Some(id) if !stmts.is_empty() => id,
                    _ => self.alloc(ChpNodeKind::Skip, next),
                })
            }
            ChpStmt::Par(branches) => {
                if branches.is_empty() {
                    return Ok(self.alloc(ChpNodeKind::Skip, next));
                }
                let join = self.alloc(
                    ChpNodeKind::Join {
                        arity: branches.len(),
                    },
                    next,
                );
                let mut children = Vec::with_capacity(branches.len());
                for b in branches {
                    children.push(self.lower(b, Some(join))?);
                }
                Ok(self.alloc(ChpNodeKind::Fork { children, join }, None))
            }
            ChpStmt::DetSel(arms) => {
                let mut lowered = Vec::with_capacity(arms.len());
                for arm in arms {
                    let target = self.lower(&arm.body, next)?;
                    lowered.push(SelArm {
                        guard: arm.guard.clone(),
                        target,
                    });
                }
                Ok(self.alloc(
                    ChpNodeKind::Select {
                        kind: SelKind::Det,
                        arms: lowered,
                        else_to: None,
                    },
                    next,
                ))
            }
            ChpStmt::NondetSel { arms, else_body } => {
                let mut lowered = Vec::with_capacity(arms.len());
                for arm in arms {
                    let target = self.lower(&arm.body, next)?;
                    lowered.push(SelArm {
                        guard: arm.guard.clone(),
                        target,
                    });
                }
                let else_to = match else_body {
                    Some(body) => Some(self.lower(body, next)?),
                    None => None,
                };
                Ok(self.alloc(
                    ChpNodeKind::Select {
                        kind: SelKind::Nondet,
                        arms: lowered,
                        else_to,
                    },
                    next,
                ))
            }
            ChpStmt::WhileLoop(arms) => {
                let head = self.alloc(ChpNodeKind::Loop { arms: Vec::new() }, next);
                let mut lowered = Vec::with_capacity(arms.len());
                for arm in arms {
                    let target = self.lower(&arm.body, Some(head))?;
                    lowered.push(SelArm {
                        guard: arm.guard.clone(),
                        target,
                    });
                }
                self.nodes.get_mut(head).kind = ChpNodeKind::Loop { arms: lowered };
                Ok(head)
            }
            ChpStmt::Forever(body) => {
                let head = self.alloc(ChpNodeKind::Loop { arms: Vec::new() }, None);
                let target = self.lower(body, Some(head))?;
                self.nodes.get_mut(head).kind = ChpNodeKind::Loop {
                    arms: vec![SelArm {
                        guard: Expr::truth(),
                        target,
                    }],
                };
                Ok(head)
            }
            ChpStmt::Label { name, body } => {
                let id = self.lower(body, next)?;
                if self.labels.insert(name.clone(), id).is_some() {
                    return Err(SimError::resolution(format!(
                        "label `{name}` defined more than once"
                    )));
                }
                Ok(id)
            }
            ChpStmt::Goto(name) => {
                let id = self.alloc(ChpNodeKind::Skip, None);
                self.gotos.push((id, name.clone()));
                Ok(id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_ir::{BinaryOp, GuardedCmd};

    fn assign(var: usize, val: u64) -> ChpStmt {
        ChpStmt::Assign {
            var: VarRef::Int(var),
            expr: Expr::int_const(val),
            delay: None,
        }
    }

    #[test]
    fn seq_chains_in_order() {
        let g = compile(&ChpStmt::Seq(vec![assign(0, 1), assign(0, 2)])).unwrap();
        let first = g.node(g.entry);
        assert!(matches!(first.kind, ChpNodeKind::Assign { .. }));
        let second = g.node(first.next.unwrap());
        match &second.kind {
            ChpNodeKind::Assign { expr, .. } => {
                assert!(matches!(expr, Expr::IntConst(v) if v.to_u64() == Some(2)));
            }
            other => panic!("expected Assign, got {other:?}"),
        }
        assert!(second.next.is_none());
    }

    #[test]
    fn empty_seq_is_skip() {
        let g = compile(&ChpStmt::Seq(vec![])).unwrap();
        assert!(matches!(g.node(g.entry).kind, ChpNodeKind::Skip));
    }

    #[test]
    fn forever_loops_back() {
        let g = compile(&ChpStmt::Forever(Box::new(assign(0, 1)))).unwrap();
        let head = g.node(g.entry);
        let ChpNodeKind::Loop { arms } = &head.kind else {
            panic!("expected Loop head");
        };
        assert_eq!(arms.len(), 1);
        let body = g.node(arms[0].target);
        // body edges back to the loop head
        assert_eq!(body.next, Some(g.entry));
        // forever has no exit
        assert!(head.next.is_none());
    }

    #[test]
    fn while_loop_has_exit() {
        let arms = vec![GuardedCmd {
            guard: Expr::binary(BinaryOp::Lt, Expr::Int(0), Expr::int_const(10)),
            body: assign(0, 1),
        }];
        let g = compile(&ChpStmt::Seq(vec![
            ChpStmt::WhileLoop(arms),
            assign(0, 99),
        ]))
        .unwrap();
        let head = g.node(g.entry);
        assert!(matches!(head.kind, ChpNodeKind::Loop { .. }));
        // exit edge goes to the trailing assignment
        let exit = g.node(head.next.unwrap());
        assert!(matches!(exit.kind, ChpNodeKind::Assign { .. }));
    }

    #[test]
    fn par_forks_and_joins() {
        let g = compile(&ChpStmt::Par(vec![assign(0, 1), assign(1, 2)])).unwrap();
        let ChpNodeKind::Fork { children, join } = &g.node(g.entry).kind else {
            panic!("expected Fork entry");
        };
        assert_eq!(children.len(), 2);
        let ChpNodeKind::Join { arity } = g.node(*join).kind else {
            panic!("expected Join");
        };
        assert_eq!(arity, 2);
        for &child in children {
            assert_eq!(g.node(child).next, Some(*join));
        }
    }

    #[test]
    fn selection_arms_share_continuation() {
        let sel = ChpStmt::DetSel(vec![
            GuardedCmd {
                guard: Expr::Bool(0),
                body: assign(0, 1),
            },
            GuardedCmd {
                guard: Expr::not(Expr::Bool(0)),
                body: assign(0, 2),
            },
        ]);
        let g = compile(&ChpStmt::Seq(vec![sel, assign(0, 3)])).unwrap();
        let ChpNodeKind::Select { arms, .. } = &g.node(g.entry).kind else {
            panic!("expected Select entry");
        };
        let cont0 = g.node(arms[0].target).next;
        let cont1 = g.node(arms[1].target).next;
        assert_eq!(cont0, cont1);
        assert_eq!(cont0, g.node(g.entry).next);
    }

    #[test]
    fn goto_resolves_to_label() {
        let stmt = ChpStmt::Seq(vec![
            ChpStmt::Label {
                name: "top".into(),
                body: Box::new(assign(0, 1)),
            },
            ChpStmt::Goto("top".into()),
        ]);
        let g = compile(&stmt).unwrap();
        let label_node = *g.labels.get("top").unwrap();
        assert_eq!(label_node, g.entry);
        // the goto node's next points back at the label
        let goto_node = g.node(g.node(g.entry).next.unwrap());
        assert!(matches!(goto_node.kind, ChpNodeKind::Skip));
        assert_eq!(goto_node.next, Some(label_node));
    }

    #[test]
    fn unknown_goto_label_rejected() {
        let stmt = ChpStmt::Goto("nowhere".into());
        assert!(matches!(compile(&stmt), Err(SimError::Resolution(_))));
    }

    #[test]
    fn duplicate_label_rejected() {
        let stmt = ChpStmt::Seq(vec![
            ChpStmt::Label {
                name: "l".into(),
                body: Box::new(ChpStmt::Skip),
            },
            ChpStmt::Label {
                name: "l".into(),
                body: Box::new(ChpStmt::Skip),
            },
        ]);
        assert!(matches!(compile(&stmt), Err(SimError::Resolution(_))));
    }

    #[test]
    fn nondet_else_shares_continuation() {
        let stmt = ChpStmt::Seq(vec![
            ChpStmt::NondetSel {
                arms: vec![GuardedCmd {
                    guard: Expr::Bool(0),
                    body: assign(0, 1),
                }],
                else_body: Some(Box::new(ChpStmt::Skip)),
            },
            assign(0, 9),
        ]);
        let g = compile(&stmt).unwrap();
        let ChpNodeKind::Select { arms, else_to, .. } = &g.node(g.entry).kind else {
            panic!("expected Select");
        };
        let else_node = g.node(else_to.unwrap());
        assert_eq!(else_node.next, g.node(arms[0].target).next);
    }
}
