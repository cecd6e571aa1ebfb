//! The CHP/HSE interpreter.
//!
//! Each process instance runs one or more threads over its compiled program
//! graph. A thread is an explicit `{pc, wait}` record re-entered by the
//! kernel: suspension is a state transition, never a stack capture. A
//! thread executes graph nodes until it performs a delayed action (assign,
//! send, recv), blocks on a rendezvous or a guard set, or ends.

use std::collections::HashMap;

use axon_common::{BigInt, Tri};
use axon_ir::{ChpNodeId, ProbeSide, ProcId, VarRef};

use crate::channel::{Endpoint, RecvBinding, RecvOutcome, SendOutcome};
use crate::error::SimError;
use crate::eval::{eval, eval_guard, Scope, Value};
use crate::event::{EventHandle, EventKind};
use crate::graph::{ChpGraph, ChpNodeKind, SelArm, SelKind};
use crate::kernel::SimCore;

/// Why a thread is not currently executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitReason {
    /// Runnable; an event for it is in flight or it is mid-dispatch.
    Ready,
    /// Sleeping out an action delay; the handle cancels the wakeup.
    Delay(EventHandle),
    /// Suspended on a rendezvous at the given global channel offset.
    Chan(usize),
    /// Blocked on a selection whose guards are all false.
    Guards {
        /// The selection node.
        node: ChpNodeId,
        /// Probed channels (global offset, probing side) in the guards.
        probes: Vec<(usize, ProbeSide)>,
    },
    /// The thread has ended.
    Done,
}

/// One live thread of a process instance.
#[derive(Debug, Clone)]
pub struct ChpThread {
    /// Current program-counter node, `None` once ended.
    pub pc: Option<ChpNodeId>,
    /// Why the thread is suspended.
    pub wait: WaitReason,
}

/// A flattened CHP or HSE process instance.
#[derive(Debug)]
pub struct ChpInstance {
    /// Dotted instance path.
    pub name: String,
    /// The process type.
    pub proc: ProcId,
    /// HSE instances stay dispatchable in reset mode.
    pub is_hse: bool,
    /// The compiled program graph.
    pub graph: ChpGraph,
    /// All threads, live and dead; slots are reused.
    pub threads: Vec<ChpThread>,
    /// Arrival counts for active join barriers.
    join_counts: HashMap<ChpNodeId, usize>,
    /// Local Boolean offset → global offset.
    pub bool_map: Vec<usize>,
    /// Local integer offset → global offset.
    pub int_map: Vec<usize>,
    /// Local channel offset → global offset.
    pub chan_map: Vec<usize>,
    /// Per-selection taken counts, one per arm.
    pub coverage: HashMap<ChpNodeId, Vec<u64>>,
    /// Set when every live thread is guard-blocked and a re-check made no
    /// progress; cleared as soon as any thread runs.
    pub deadlocked: bool,
}

impl ChpInstance {
    /// Creates an instance over a compiled graph and its slot maps.
    pub fn new(
        name: String,
        proc: ProcId,
        is_hse: bool,
        graph: ChpGraph,
        bool_map: Vec<usize>,
        int_map: Vec<usize>,
        chan_map: Vec<usize>,
    ) -> Self {
        let mut coverage = HashMap::new();
        for (id, node) in graph.nodes.iter() {
            match &node.kind {
                ChpNodeKind::Select { arms, .. } | ChpNodeKind::Loop { arms } => {
                    coverage.insert(id, vec![0; arms.len()]);
                }
                _ => {}
            }
        }
        Self {
            name,
            proc,
            is_hse,
            graph,
            threads: Vec::new(),
            join_counts: HashMap::new(),
            bool_map,
            int_map,
            chan_map,
            coverage,
            deadlocked: false,
        }
    }

    fn scope(&self) -> Scope<'_> {
        Scope {
            bools: &self.bool_map,
            ints: &self.int_map,
            chans: &self.chan_map,
        }
    }

    /// Number of threads that have not ended.
    pub fn live_threads(&self) -> usize {
        self.threads
            .iter()
            .filter(|t| !matches!(t.wait, WaitReason::Done))
            .count()
    }

    fn spawn(&mut self, entry: ChpNodeId) -> usize {
        let thread = ChpThread {
            pc: Some(entry),
            wait: WaitReason::Ready,
        };
        if let Some(free) = self
            .threads
            .iter()
            .position(|t| matches!(t.wait, WaitReason::Done))
        {
            self.threads[free] = thread;
            free
        } else {
            self.threads.push(thread);
            self.threads.len() - 1
        }
    }

    fn end_thread(&mut self, tid: usize) {
        self.threads[tid].pc = None;
        self.threads[tid].wait = WaitReason::Done;
    }

    /// Registers static fanout subscriptions: every slot read by a
    /// selection or loop guard wakes this object when it changes.
    pub fn register_subscriptions(
        &self,
        me: usize,
        core: &mut SimCore,
    ) -> Result<(), SimError> {
        for (_, node) in self.graph.nodes.iter() {
            let arms = match &node.kind {
                ChpNodeKind::Select { arms, .. } | ChpNodeKind::Loop { arms } => arms,
                _ => continue,
            };
            for arm in arms {
                let inputs = arm.guard.inputs();
                for local in inputs.bools {
                    let g = self.scope().global_bool(local)?;
                    core.store.subscribe_bool(g, me)?;
                }
                for local in inputs.ints {
                    let g = self.scope().global_int(local)?;
                    core.store.subscribe_int(g, me)?;
                }
                for (local, _) in inputs.probes {
                    let g = self.scope().global_chan(local)?;
                    core.store.chan_slot_mut(g)?.subscribe_probe(me);
                }
            }
        }
        Ok(())
    }

    /// Dispatches one kernel event targeted at this instance.
    pub fn handle_event(
        &mut self,
        me: usize,
        kind: &EventKind,
        core: &mut SimCore,
    ) -> Result<(), SimError> {
        match kind {
            EventKind::Init => {
                let tid = self.spawn(self.graph.entry);
                self.run_thread(me, tid, core)
            }
            EventKind::Resume { thread } => {
                let tid = *thread;
                match self.threads.get(tid).map(|t| &t.wait) {
                    Some(WaitReason::Ready) | Some(WaitReason::Delay(_)) => {
                        self.threads[tid].wait = WaitReason::Ready;
                        self.run_thread(me, tid, core)
                    }
                    _ => Ok(()),
                }
            }
            EventKind::ChanWake { thread } => {
                let tid = *thread;
                if !matches!(
                    self.threads.get(tid).map(|t| &t.wait),
                    Some(WaitReason::Chan(_))
                ) {
                    return Ok(());
                }
                let Some(pc) = self.threads[tid].pc else {
                    return Ok(());
                };
                // The communication node completed; continue past it.
                match self.graph.node(pc).next {
                    Some(next) => {
                        self.threads[tid].pc = Some(next);
                        self.threads[tid].wait = WaitReason::Ready;
                        self.run_thread(me, tid, core)
                    }
                    None => {
                        self.end_thread(tid);
                        Ok(())
                    }
                }
            }
            EventKind::GuardRecheck { thread } => self.recheck_guards(me, *thread, core),
            EventKind::NodeFire { .. } | EventKind::Monitor { .. } => Err(SimError::fatal(
                format!("PRS event routed to CHP instance `{}`", self.name),
            )),
        }
    }

    fn recheck_guards(
        &mut self,
        me: usize,
        thread: Option<usize>,
        core: &mut SimCore,
    ) -> Result<(), SimError> {
        let targets: Vec<usize> = match thread {
            Some(t) => vec![t],
            None => (0..self.threads.len())
                .filter(|&i| matches!(self.threads[i].wait, WaitReason::Guards { .. }))
                .collect(),
        };
        let mut progressed = false;
        for tid in targets {
            let WaitReason::Guards { node, .. } = self.threads[tid].wait.clone() else {
                continue;
            };
            self.threads[tid].wait = WaitReason::Ready;
            self.run_thread(me, tid, core)?;
            let still_blocked = matches!(
                &self.threads[tid].wait,
                WaitReason::Guards { node: n, .. } if *n == node
            );
            if !still_blocked {
                progressed = true;
            }
        }
        if !progressed {
            let live: Vec<&ChpThread> = self
                .threads
                .iter()
                .filter(|t| !matches!(t.wait, WaitReason::Done))
                .collect();
            self.deadlocked = !live.is_empty()
                && live
                    .iter()
                    .all(|t| matches!(t.wait, WaitReason::Guards { .. }));
        }
        Ok(())
    }

    /// Executes a thread until it blocks, sleeps, or ends.
    fn run_thread(&mut self, me: usize, tid: usize, core: &mut SimCore) -> Result<(), SimError> {
        loop {
            if matches!(self.threads[tid].wait, WaitReason::Done) {
                return Ok(());
            }
            let Some(pc) = self.threads[tid].pc else {
                self.end_thread(tid);
                return Ok(());
            };
            self.deadlocked = false;
            let node = self.graph.node(pc).clone();
            match node.kind {
                ChpNodeKind::Skip => {
                    if !self.step_to(tid, node.next) {
                        return Ok(());
                    }
                }
                ChpNodeKind::Assign { var, expr, delay } => {
                    let value = eval(&expr, &self.scope(), &core.store)?;
                    self.write_var(var, value, core)?;
                    self.finish_action(me, tid, node.next, delay, core);
                    return Ok(());
                }
                ChpNodeKind::Send { chan, expr, delay } => {
                    let g = self.scope().global_chan(chan)?;
                    let value = match &expr {
                        Some(e) => match eval(e, &self.scope(), &core.store)? {
                            Value::Int(v) => v,
                            Value::Bool(Tri::Zero) => BigInt::zero(),
                            Value::Bool(Tri::One) => BigInt::from_u64(1),
                            Value::Bool(Tri::X) => {
                                return Err(SimError::type_domain(format!(
                                    "sending unknown (X) value on `{}`",
                                    core.store.chan_slot(g)?.name
                                )))
                            }
                        },
                        None => BigInt::zero(),
                    };
                    let endpoint = Endpoint { obj: me, thread: tid };
                    let outcome = core.store.chan_slot_mut(g)?.start_send(value, endpoint)?;
                    core.wake_probers(g)?;
                    match outcome {
                        SendOutcome::Suspended => {
                            self.threads[tid].wait = WaitReason::Chan(g);
                            return Ok(());
                        }
                        SendOutcome::Completed { peer, binding } => {
                            let delivered = core.store.chan_slot(g)?.data.clone();
                            let name = self.name.clone();
                            core.deliver_recv(binding, &delivered, &name)?;
                            core.note_chan_completion(g, &delivered, &name)?;
                            core.post(peer.obj, 0, EventKind::ChanWake { thread: peer.thread });
                            self.finish_action(me, tid, node.next, delay, core);
                            return Ok(());
                        }
                    }
                }
                ChpNodeKind::Recv { chan, var, delay } => {
                    let g = self.scope().global_chan(chan)?;
                    let binding = match var {
                        None => RecvBinding::None,
                        Some(VarRef::Bool(local)) => {
                            RecvBinding::Bool(self.scope().global_bool(local)?)
                        }
                        Some(VarRef::Int(local)) => {
                            RecvBinding::Int(self.scope().global_int(local)?)
                        }
                    };
                    let endpoint = Endpoint { obj: me, thread: tid };
                    let outcome = core.store.chan_slot_mut(g)?.start_recv(endpoint, binding)?;
                    core.wake_probers(g)?;
                    match outcome {
                        RecvOutcome::Suspended => {
                            self.threads[tid].wait = WaitReason::Chan(g);
                            return Ok(());
                        }
                        RecvOutcome::Completed { peer, value } => {
                            let name = self.name.clone();
                            core.deliver_recv(binding, &value, &name)?;
                            core.note_chan_completion(g, &value, &name)?;
                            core.post(peer.obj, 0, EventKind::ChanWake { thread: peer.thread });
                            self.finish_action(me, tid, node.next, delay, core);
                            return Ok(());
                        }
                    }
                }
                ChpNodeKind::Select {
                    kind,
                    ref arms,
                    else_to,
                } => {
                    let chosen = self.choose_arm(kind, arms, core)?;
                    match chosen {
                        Some(idx) => {
                            self.leave_probe_waits(arms, core)?;
                            if let Some(counts) = self.coverage.get_mut(&pc) {
                                counts[idx] += 1;
                            }
                            self.threads[tid].pc = Some(arms[idx].target);
                            self.threads[tid].wait = WaitReason::Ready;
                        }
                        None => match else_to {
                            Some(else_target) => {
                                self.leave_probe_waits(arms, core)?;
                                self.threads[tid].pc = Some(else_target);
                                self.threads[tid].wait = WaitReason::Ready;
                            }
                            None => {
                                self.block_on_guards(me, tid, pc, arms, core)?;
                                return Ok(());
                            }
                        },
                    }
                }
                ChpNodeKind::Loop { ref arms } => {
                    // A guarded loop never blocks: all-false exits.
                    let chosen = self.choose_arm(SelKind::Det, arms, core)?;
                    match chosen {
                        Some(idx) => {
                            if let Some(counts) = self.coverage.get_mut(&pc) {
                                counts[idx] += 1;
                            }
                            self.threads[tid].pc = Some(arms[idx].target);
                            self.threads[tid].wait = WaitReason::Ready;
                        }
                        None => {
                            if !self.step_to(tid, node.next) {
                                return Ok(());
                            }
                        }
                    }
                }
                ChpNodeKind::Fork { children, .. } => {
                    for child in children {
                        let spawned = self.spawn(child);
                        core.post(me, 0, EventKind::Resume { thread: spawned });
                    }
                    self.end_thread(tid);
                    return Ok(());
                }
                ChpNodeKind::Join { arity } => {
                    let count = self.join_counts.entry(pc).or_insert(0);
                    *count += 1;
                    if *count >= arity {
                        self.join_counts.remove(&pc);
                        if !self.step_to(tid, node.next) {
                            return Ok(());
                        }
                    } else {
                        self.end_thread(tid);
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Moves the pc to `next`, ending the thread at a path end. Returns
    /// whether the thread is still live.
    fn step_to(&mut self, tid: usize, next: Option<ChpNodeId>) -> bool {
        match next {
            Some(n) => {
                self.threads[tid].pc = Some(n);
                self.threads[tid].wait = WaitReason::Ready;
                true
            }
            None => {
                self.end_thread(tid);
                false
            }
        }
    }

    /// Completes a delayed action: advance the pc and sleep out the delay.
    fn finish_action(
        &mut self,
        me: usize,
        tid: usize,
        next: Option<ChpNodeId>,
        delay: Option<u64>,
        core: &mut SimCore,
    ) {
        match next {
            Some(n) => {
                self.threads[tid].pc = Some(n);
                let d = core.effective_delay(delay);
                let handle = core.post(me, d, EventKind::Resume { thread: tid });
                self.threads[tid].wait = WaitReason::Delay(handle);
            }
            None => self.end_thread(tid),
        }
    }

    fn write_var(
        &mut self,
        var: VarRef,
        value: Value,
        core: &mut SimCore,
    ) -> Result<(), SimError> {
        let cause = self.name.clone();
        match (var, value) {
            (VarRef::Bool(local), Value::Bool(t)) => {
                let g = self.scope().global_bool(local)?;
                core.write_bool(g, t, &cause)?;
                Ok(())
            }
            (VarRef::Int(local), Value::Int(v)) => {
                let g = self.scope().global_int(local)?;
                core.write_int(g, v, &cause)?;
                Ok(())
            }
            (VarRef::Bool(_), Value::Int(_)) => Err(SimError::type_domain(
                "assigning an integer to a Boolean variable",
            )),
            (VarRef::Int(_), Value::Bool(_)) => Err(SimError::type_domain(
                "assigning a Boolean to an integer variable",
            )),
        }
    }

    /// Evaluates arm guards and picks one, honoring the choice policy.
    fn choose_arm(
        &self,
        kind: SelKind,
        arms: &[SelArm],
        core: &mut SimCore,
    ) -> Result<Option<usize>, SimError> {
        let mut enabled = Vec::new();
        for (i, arm) in arms.iter().enumerate() {
            if eval_guard(&arm.guard, &self.scope(), &core.store)? == Tri::One {
                enabled.push(i);
            }
        }
        Ok(match enabled.len() {
            0 => None,
            1 => Some(enabled[0]),
            _ if kind == SelKind::Nondet && core.random_choice => {
                Some(enabled[core.choose(enabled.len())])
            }
            _ => Some(enabled[0]),
        })
    }

    fn guard_probes(&self, arms: &[SelArm]) -> Result<Vec<(usize, ProbeSide)>, SimError> {
        let mut probes = Vec::new();
        for arm in arms {
            for (local, side) in arm.guard.inputs().probes {
                let g = self.scope().global_chan(local)?;
                if !probes.contains(&(g, side)) {
                    probes.push((g, side));
                }
            }
        }
        Ok(probes)
    }

    fn block_on_guards(
        &mut self,
        me: usize,
        tid: usize,
        node: ChpNodeId,
        arms: &[SelArm],
        core: &mut SimCore,
    ) -> Result<(), SimError> {
        let probes = self.guard_probes(arms)?;
        for &(g, side) in &probes {
            let ch = core.store.chan_slot_mut(g)?;
            ch.subscribe_probe(me);
            ch.begin_probe_wait(side);
        }
        self.threads[tid].wait = WaitReason::Guards { node, probes };
        Ok(())
    }

    /// Clears probe-wait phases entered while this selection was blocked.
    fn leave_probe_waits(&self, arms: &[SelArm], core: &mut SimCore) -> Result<(), SimError> {
        for (g, side) in self.guard_probes(arms)? {
            core.store.chan_slot_mut(g)?.end_probe_wait(side);
        }
        Ok(())
    }

    /// Forces a fresh guard evaluation on every guard-blocked thread
    /// (the `gc-retry` command).
    pub fn gc_retry(&mut self, me: usize, core: &mut SimCore) -> Result<(), SimError> {
        self.deadlocked = false;
        self.recheck_guards(me, None, core)
    }

    /// Moves the single live thread to a label (the `goto` command).
    pub fn jump_to_label(
        &mut self,
        me: usize,
        label: &str,
        core: &mut SimCore,
    ) -> Result<(), SimError> {
        if self.live_threads() != 1 {
            return Err(SimError::state_illegal(format!(
                "`{}` has {} live threads; goto needs exactly one",
                self.name,
                self.live_threads()
            )));
        }
        let target = *self.graph.labels.get(label).ok_or_else(|| {
            SimError::resolution(format!("label `{label}` not found in `{}`", self.name))
        })?;
        let tid = self
            .threads
            .iter()
            .position(|t| !matches!(t.wait, WaitReason::Done))
            .ok_or_else(|| SimError::fatal("live thread count changed underfoot"))?;
        match self.threads[tid].wait.clone() {
            WaitReason::Chan(g) => {
                let name = core.store.chan_slot(g)?.name.clone();
                return Err(SimError::state_illegal(format!(
                    "`{}` is blocked on channel `{name}`; cannot jump",
                    self.name
                )));
            }
            WaitReason::Delay(handle) => core.cancel_event(handle),
            WaitReason::Guards { probes, .. } => {
                for (g, side) in probes {
                    core.store.chan_slot_mut(g)?.end_probe_wait(side);
                }
            }
            WaitReason::Ready | WaitReason::Done => {}
        }
        self.threads[tid].pc = Some(target);
        self.threads[tid].wait = WaitReason::Ready;
        core.post(me, 0, EventKind::Resume { thread: tid });
        Ok(())
    }

    /// Resumes a thread whose pending channel action was skipped: it
    /// continues at the statement after the communication, with no effect.
    pub fn resume_skipped(
        &mut self,
        me: usize,
        tid: usize,
        core: &mut SimCore,
    ) -> Result<(), SimError> {
        if !matches!(self.threads.get(tid).map(|t| &t.wait), Some(WaitReason::Chan(_))) {
            return Err(SimError::state_illegal(format!(
                "thread {tid} of `{}` is not blocked on a channel",
                self.name
            )));
        }
        let Some(pc) = self.threads[tid].pc else {
            return Err(SimError::fatal("channel-blocked thread has no pc"));
        };
        match self.graph.node(pc).next {
            Some(next) => {
                self.threads[tid].pc = Some(next);
                self.threads[tid].wait = WaitReason::Ready;
                core.post(me, 0, EventKind::Resume { thread: tid });
            }
            None => self.end_thread(tid),
        }
        Ok(())
    }

    /// One status line per thread, for `procinfo`.
    pub fn describe(&self, out: &mut String) {
        use std::fmt::Write as _;
        let _ = writeln!(
            out,
            "{} [{}]{}",
            self.name,
            if self.is_hse { "hse" } else { "chp" },
            if self.deadlocked { "  (deadlocked)" } else { "" }
        );
        for (i, t) in self.threads.iter().enumerate() {
            let state = match &t.wait {
                WaitReason::Ready => "runnable".to_string(),
                WaitReason::Delay(_) => "sleeping".to_string(),
                WaitReason::Chan(g) => format!("blocked on channel #{g}"),
                WaitReason::Guards { .. } => "waiting on guards".to_string(),
                WaitReason::Done => "done".to_string(),
            };
            let pc = match t.pc {
                Some(id) => format!("{}", id.as_raw()),
                None => "-".to_string(),
            };
            let _ = writeln!(out, "  thread {i}: pc={pc} {state}");
        }
    }

    /// Per-arm taken counts for every selection and loop, for `coverage`.
    pub fn coverage_report(&self, out: &mut String) {
        use std::fmt::Write as _;
        let _ = writeln!(out, "{}:", self.name);
        let mut ids: Vec<_> = self.coverage.keys().copied().collect();
        ids.sort_by_key(|id| id.as_raw());
        for id in ids {
            let counts = &self.coverage[&id];
            let total: u64 = counts.iter().sum();
            let taken = counts.iter().filter(|&&c| c > 0).count();
            let _ = writeln!(
                out,
                "  node {}: {}/{} arms taken, {} executions {:?}",
                id.as_raw(),
                taken,
                counts.len(),
                total,
                counts
            );
        }
    }
}
