//! The simulation kernel: global time, the dispatch loop, hierarchy
//! flattening, and the shared mutable core.
//!
//! [`Simulator`] owns everything: the event queue, the flat state store,
//! the behavioral objects, the instance tree, watchpoints, traces, and the
//! timing policy. Dispatch pops the earliest event (optionally filtered by
//! reset mode), advances `now` to its deadline, routes it to its target by
//! tag, and then propagates any slot mutations to their fanout before the
//! next pop. All randomness flows through one seeded PRNG so runs are
//! reproducible.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axon_common::{BigInt, Tri};
use axon_ir::{Design, ProcBody, ProcId, SlotClass, SlotKind};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::channel::RecvBinding;
use crate::chp::ChpInstance;
use crate::error::SimError;
use crate::event::{Event, EventHandle, EventKind, EventQueue, SimObjKind};
use crate::graph;
use crate::instance::{InstanceNode, InstanceTree, ResolvedSlot};
use crate::prs::PrsInstance;
use crate::state::StateStore;
use crate::trace::{TraceRegistry, TraceSignal, TraceValue};
use crate::watch::WatchBreak;

/// How action delays are chosen at event-posting time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingMode {
    /// Use the declared delay (or the default) exactly.
    Deterministic,
    /// Every delay is uniform in `[min, max]`.
    Random {
        /// Lower bound in ticks.
        min: u64,
        /// Upper bound in ticks.
        max: u64,
    },
    /// Only delays the graph left unspecified are randomized.
    RandomUnspecified {
        /// Lower bound in ticks.
        min: u64,
        /// Upper bound in ticks.
        max: u64,
    },
}

/// What happens when a warning fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarnPolicy {
    /// Log and continue.
    Resume,
    /// Log and stop the current run loop.
    Break,
    /// Log and request process exit with code 2.
    Exit,
}

/// Construction-time configuration.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Delay in ticks for actions with no declared delay.
    pub default_delay: u64,
    /// Initial PRNG seed.
    pub seed: u64,
    /// Whether exclusive-high/low monitor groups are enforced.
    pub enable_monitors: bool,
    /// Seconds per tick, display only.
    pub timescale: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            default_delay: 10,
            seed: 0,
            enable_monitors: false,
            timescale: 10e-12,
        }
    }
}

/// Default bounds for `random` without explicit limits.
pub const DEFAULT_RANDOM_MIN: u64 = 1;
/// Upper default bound for `random` without explicit limits.
pub const DEFAULT_RANDOM_MAX: u64 = 100;

/// A behavioral object, dispatched by tag.
#[derive(Debug)]
pub enum SimObject {
    /// A CHP or HSE process instance.
    Chp(ChpInstance),
    /// A production-rule network instance.
    Prs(PrsInstance),
}

/// The mutable core shared with object step functions during dispatch.
///
/// Holds everything except the objects themselves, so an object can mutate
/// state, schedule events, and log while it is being stepped.
pub struct SimCore {
    /// Current simulation time in ticks; non-decreasing.
    pub now: BigInt,
    /// The event queue.
    pub queue: EventQueue,
    /// The flat state arrays.
    pub store: StateStore,
    /// Watch/breakpoint registries and the log sink.
    pub watch: WatchBreak,
    /// Trace backends.
    pub traces: TraceRegistry,
    /// Object index → kind, for event origins and reset filtering.
    pub obj_kinds: Vec<SimObjKind>,
    rng: ChaCha8Rng,
    /// Delay policy.
    pub timing: TimingMode,
    /// Whether non-deterministic selections draw from the PRNG.
    pub random_choice: bool,
    /// Delay for actions with no declared delay.
    pub default_delay: u64,
    /// Whether exclusive monitor groups are enforced.
    pub monitors_enabled: bool,
    /// Seconds per tick, display only.
    pub timescale: f64,
    /// Reset mode restricts dispatch to HSE/PRS events.
    pub reset_mode: bool,
    /// Set by breakpoints and break-on-warn; stops the current run loop.
    pub break_flag: bool,
    /// Set by exit-on-warn; the command layer turns it into exit code 2.
    pub exit_flag: bool,
    /// The warning policy.
    pub warn_policy: WarnPolicy,
    /// Warnings emitted so far.
    pub warning_count: u64,
    interrupt: Arc<AtomicBool>,
    pending_notifies: VecDeque<(SlotClass, usize)>,
}

impl SimCore {
    fn new(config: &SimConfig) -> Self {
        Self {
            now: BigInt::zero(),
            queue: EventQueue::new(),
            store: StateStore::new(),
            watch: WatchBreak::new(),
            traces: TraceRegistry::with_builtin(),
            obj_kinds: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            timing: TimingMode::Deterministic,
            random_choice: false,
            default_delay: config.default_delay,
            monitors_enabled: config.enable_monitors,
            timescale: config.timescale,
            reset_mode: false,
            break_flag: false,
            exit_flag: false,
            warn_policy: WarnPolicy::Resume,
            warning_count: 0,
            interrupt: Arc::new(AtomicBool::new(false)),
            pending_notifies: VecDeque::new(),
        }
    }

    /// The cancellation token polled between dispatches. A signal handler
    /// may set it from another thread.
    pub fn interrupt_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Whether an interrupt was requested.
    pub fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    /// Clears the interrupt token.
    pub fn clear_interrupt(&self) {
        self.interrupt.store(false, Ordering::Relaxed);
    }

    /// Schedules an event for `obj` at `now + delay`, returning the
    /// cancellation handle.
    pub fn post(&mut self, obj: usize, delay: u64, kind: EventKind) -> EventHandle {
        let deadline = self.now.add_u64(delay);
        let origin = self
            .obj_kinds
            .get(obj)
            .copied()
            .unwrap_or(SimObjKind::Chp);
        self.queue.push(deadline, origin, Event { target: obj, kind })
    }

    /// Cancels a previously posted event.
    pub fn cancel_event(&mut self, handle: EventHandle) {
        self.queue.cancel(handle);
    }

    /// Reseeds the PRNG (`random_seed`).
    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    /// The effective delay for an action, per the timing policy.
    pub fn effective_delay(&mut self, declared: Option<u64>) -> u64 {
        match self.timing {
            TimingMode::Deterministic => declared.unwrap_or(self.default_delay),
            TimingMode::Random { min, max } => self.rng.gen_range(min..=max),
            TimingMode::RandomUnspecified { min, max } => {
                declared.unwrap_or_else(|| self.rng.gen_range(min..=max))
            }
        }
    }

    /// Uniform choice among `n` alternatives.
    pub fn choose(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }

    /// Emits a warning and applies the warning policy.
    pub fn warning(&mut self, msg: &str) -> Result<(), SimError> {
        self.watch.log_warning(msg)?;
        self.warning_count += 1;
        match self.warn_policy {
            WarnPolicy::Resume => {}
            WarnPolicy::Break => self.break_flag = true,
            WarnPolicy::Exit => self.exit_flag = true,
        }
        Ok(())
    }

    /// Writes a Boolean slot, handling the suppress-unchanged rule,
    /// watch/breakpoint checks, trace emission, and fanout queueing.
    /// Returns whether the value changed.
    pub fn write_bool(
        &mut self,
        global: usize,
        value: Tri,
        cause: &str,
    ) -> Result<bool, SimError> {
        let slot = self.store.bool_slot_mut(global)?;
        if slot.value == value {
            return Ok(false);
        }
        slot.value = value;
        if let Some(entry) = self.watch.entry(SlotClass::Bool, global) {
            let watch_name = entry.name.clone();
            if entry.breakpoint {
                self.break_flag = true;
            }
            self.watch
                .log_change(&self.now, cause, &watch_name, &value.to_string())?;
            if self.traces.any_active() {
                self.traces
                    .emit_all(&self.now, SlotClass::Bool, global, TraceValue::Bool(value))?;
            }
        }
        self.pending_notifies.push_back((SlotClass::Bool, global));
        Ok(true)
    }

    /// Writes an integer slot (masked to its declared width). Returns
    /// whether the value changed.
    pub fn write_int(
        &mut self,
        global: usize,
        value: BigInt,
        cause: &str,
    ) -> Result<bool, SimError> {
        let slot = self.store.int_slot_mut(global)?;
        let masked = value.with_width(slot.width.max(1));
        if slot.value == masked {
            return Ok(false);
        }
        slot.value = masked.clone();
        if let Some(entry) = self.watch.entry(SlotClass::Int, global) {
            let watch_name = entry.name.clone();
            if entry.breakpoint {
                self.break_flag = true;
            }
            self.watch.log_change(
                &self.now,
                cause,
                &watch_name,
                &format!("{masked}  (0x{masked:x})"),
            )?;
            if self.traces.any_active() {
                self.traces.emit_all(
                    &self.now,
                    SlotClass::Int,
                    global,
                    TraceValue::Int(&masked),
                )?;
            }
        }
        self.pending_notifies.push_back((SlotClass::Int, global));
        Ok(true)
    }

    /// Stores a delivered channel value into the receiver's binding.
    pub fn deliver_recv(
        &mut self,
        binding: RecvBinding,
        value: &BigInt,
        cause: &str,
    ) -> Result<(), SimError> {
        match binding {
            RecvBinding::None => Ok(()),
            RecvBinding::Int(global) => {
                self.write_int(global, value.clone(), cause)?;
                Ok(())
            }
            RecvBinding::Bool(global) => {
                let t = match value.to_u64() {
                    Some(0) => Tri::Zero,
                    Some(1) => Tri::One,
                    _ => {
                        return Err(SimError::type_domain(
                            "channel value does not fit a Boolean variable",
                        ))
                    }
                };
                self.write_bool(global, t, cause)?;
                Ok(())
            }
        }
    }

    /// Logs and traces a completed rendezvous on a watched channel.
    pub fn note_chan_completion(
        &mut self,
        global: usize,
        value: &BigInt,
        cause: &str,
    ) -> Result<(), SimError> {
        if let Some(entry) = self.watch.entry(SlotClass::Chan, global) {
            let watch_name = entry.name.clone();
            self.watch
                .log_change(&self.now, cause, &watch_name, &value.to_string())?;
            if self.traces.any_active() {
                self.traces
                    .emit_all(&self.now, SlotClass::Chan, global, TraceValue::Int(value))?;
            }
        }
        Ok(())
    }

    /// Posts guard re-checks to every probe subscriber of a channel.
    /// Called on every phase change.
    pub fn wake_probers(&mut self, chan_global: usize) -> Result<(), SimError> {
        let subs = self.store.chan_slot(chan_global)?.probe_subscribers.clone();
        for obj in subs {
            self.post(obj, 0, EventKind::GuardRecheck { thread: None });
        }
        Ok(())
    }

    fn take_notify(&mut self) -> Option<(SlotClass, usize)> {
        self.pending_notifies.pop_front()
    }
}

/// The complete simulator for one elaborated design.
pub struct Simulator {
    /// The shared mutable core.
    pub core: SimCore,
    /// All behavioral objects, indexed by the event target tag.
    pub objects: Vec<SimObject>,
    /// The instance tree.
    pub tree: InstanceTree,
    /// The design being simulated.
    pub design: Arc<Design>,
}

impl Simulator {
    /// Flattens the hierarchy rooted at `top` and posts every behavioral
    /// instance's entry event.
    pub fn new(design: Arc<Design>, top: ProcId, config: &SimConfig) -> Result<Self, SimError> {
        if design.procs.get_opt(top).is_none() {
            return Err(SimError::resolution("top process type not in design"));
        }
        let mut core = SimCore::new(config);
        let mut objects = Vec::new();
        let mut flattener = Flattener {
            design: &design,
            core: &mut core,
            objects: &mut objects,
            nodes: Vec::new(),
        };
        flattener.flatten(top, "", HashMap::new())?;
        let nodes = flattener.nodes;
        Ok(Self {
            core,
            objects,
            tree: InstanceTree { nodes },
            design,
        })
    }

    /// Dispatches the earliest event allowed by the current mode filter.
    /// Returns whether an event fired.
    pub fn dispatch_one(&mut self) -> Result<bool, SimError> {
        let reset = self.core.reset_mode;
        let popped = self
            .core
            .queue
            .pop_matching(|k| !reset || k.runs_in_reset());
        let Some((deadline, _origin, ev)) = popped else {
            return Ok(false);
        };
        if deadline < self.core.now {
            return Err(SimError::fatal("event deadline precedes current time"));
        }
        self.core.now = deadline;
        match self.objects.get_mut(ev.target) {
            Some(SimObject::Chp(inst)) => inst.handle_event(ev.target, &ev.kind, &mut self.core)?,
            Some(SimObject::Prs(inst)) => inst.handle_event(ev.target, &ev.kind, &mut self.core)?,
            None => {
                return Err(SimError::fatal(format!(
                    "event targets unknown object {}",
                    ev.target
                )))
            }
        }
        self.drain_notifies()?;
        Ok(true)
    }

    /// Propagates queued slot mutations to their fanout: PRS instances
    /// re-evaluate synchronously, CHP instances get guard re-check events.
    /// Completes before the next event pops.
    fn drain_notifies(&mut self) -> Result<(), SimError> {
        while let Some((class, global)) = self.core.take_notify() {
            let subs = match class {
                SlotClass::Bool => self.core.store.bool_slot(global)?.fanout.clone(),
                SlotClass::Int => self.core.store.int_slot(global)?.fanout.clone(),
                SlotClass::Chan => continue,
            };
            for obj in subs {
                match self.objects.get_mut(obj) {
                    Some(SimObject::Prs(p)) if class == SlotClass::Bool => {
                        p.on_input_change(obj, global, &mut self.core)?;
                    }
                    Some(SimObject::Prs(_)) => {}
                    Some(SimObject::Chp(_)) => {
                        self.core
                            .post(obj, 0, EventKind::GuardRecheck { thread: None });
                    }
                    None => {}
                }
            }
        }
        Ok(())
    }

    fn stop_requested(&self) -> bool {
        self.core.interrupted() || self.core.break_flag || self.core.exit_flag
    }

    /// Dispatches up to `n` events, honoring interrupts and breakpoints.
    /// Returns whether events remain.
    pub fn step(&mut self, n: u64) -> Result<bool, SimError> {
        self.core.break_flag = false;
        for _ in 0..n {
            if self.stop_requested() || !self.dispatch_one()? {
                break;
            }
        }
        Ok(!self.core.queue.is_empty())
    }

    /// Runs all events with deadline at most `now + delta`, then advances
    /// `now` to that target even if nothing fired. Returns whether events
    /// remain.
    pub fn advance(&mut self, delta: u64) -> Result<bool, SimError> {
        self.core.break_flag = false;
        let target = self.core.now.add_u64(delta);
        loop {
            if self.stop_requested() {
                break;
            }
            let reset = self.core.reset_mode;
            let next = self
                .core
                .queue
                .next_matching_deadline(|k| !reset || k.runs_in_reset());
            match next {
                Some(t) if t <= target => {
                    self.dispatch_one()?;
                }
                _ => break,
            }
        }
        if self.core.now < target {
            self.core.now = target;
        }
        Ok(!self.core.queue.is_empty())
    }

    /// Runs until the (filtered) queue drains, a breakpoint trips, or an
    /// interrupt arrives.
    pub fn run(&mut self) -> Result<(), SimError> {
        self.core.break_flag = false;
        loop {
            if self.stop_requested() || !self.dispatch_one()? {
                return Ok(());
            }
        }
    }

    /// Switches between reset and run dispatch. The queue is never
    /// flushed; only the filter predicate changes.
    pub fn set_reset_mode(&mut self, on: bool) {
        self.core.reset_mode = on;
    }

    /// Resolves an identifier against the instance tree.
    pub fn resolve(&self, name: &str) -> Result<ResolvedSlot, SimError> {
        self.tree.resolve(&self.design, name)
    }

    /// Assigns a slot from command text. Channels are rejected; Booleans
    /// accept `0|#f`, `1|#t`, `X`; integers must be unsigned and fit the
    /// declared width.
    pub fn set_value(&mut self, name: &str, raw: &str) -> Result<(), SimError> {
        let slot = self.resolve(name)?;
        match slot.class {
            SlotClass::Chan => Err(SimError::resolution(format!(
                "`{name}` is a channel; not currently supported"
            ))),
            SlotClass::Bool => {
                let value = match raw {
                    "0" | "#f" => Tri::Zero,
                    "1" | "#t" => Tri::One,
                    "X" | "x" => Tri::X,
                    _ => {
                        return Err(SimError::type_domain(
                            "Boolean must be set to either 0, 1, or X",
                        ))
                    }
                };
                self.core.write_bool(slot.global, value, "env")?;
                self.drain_notifies()
            }
            SlotClass::Int => {
                let value = BigInt::parse(raw).map_err(|e| match e {
                    axon_common::ParseBigIntError::Negative => {
                        SimError::type_domain("Integers are unsigned.")
                    }
                    other => SimError::type_domain(other.to_string()),
                })?;
                let SlotKind::Int { width } = slot.kind else {
                    return Err(SimError::fatal("int slot with non-int kind"));
                };
                if !value.fits_width(width) {
                    return Err(SimError::type_domain(
                        "Value does not fit into variable's bitwidth.",
                    ));
                }
                self.core.write_int(slot.global, value, "env")?;
                self.drain_notifies()
            }
        }
    }

    /// Reads a slot. Only meaningful between run commands, when the
    /// kernel is quiescent.
    pub fn get_value(&self, name: &str) -> Result<SlotValue, SimError> {
        let slot = self.resolve(name)?;
        match slot.class {
            SlotClass::Bool => Ok(SlotValue::Bool(self.core.store.bool_slot(slot.global)?.value)),
            SlotClass::Int => Ok(SlotValue::Int(
                self.core.store.int_slot(slot.global)?.value.clone(),
            )),
            SlotClass::Chan => {
                let ch = self.core.store.chan_slot(slot.global)?;
                Ok(SlotValue::Chan {
                    code: ch.phase.code(),
                    label: ch.phase.label(),
                    count: ch.completed_count,
                })
            }
        }
    }

    /// Completed-rendezvous count of a channel.
    pub fn chcount(&self, name: &str) -> Result<u64, SimError> {
        let slot = self.resolve(name)?;
        if slot.class != SlotClass::Chan {
            return Err(SimError::resolution(format!(
                "`{name}` is not of channel type"
            )));
        }
        Ok(self.core.store.chan_slot(slot.global)?.completed_count)
    }

    /// Compares a slot against an expected value; a mismatch is a warning
    /// under the warning policy. Returns whether the assertion held.
    pub fn assert_value(&mut self, name: &str, expected: &BigInt) -> Result<bool, SimError> {
        let matched = match self.get_value(name)? {
            SlotValue::Bool(actual) => {
                let code = expected.to_u64();
                if !matches!(code, Some(0..=2)) {
                    return Err(SimError::type_domain(
                        "a Boolean value should only be asserted to be 0, 1, or 2 (X)",
                    ));
                }
                let actual_code = match actual {
                    Tri::Zero => 0,
                    Tri::One => 1,
                    Tri::X => 2,
                };
                if Some(actual_code) == code {
                    true
                } else {
                    self.core.warning(&format!(
                        "WRONG ASSERT: \"{name}\" has value {actual} and not {}",
                        expected
                    ))?;
                    false
                }
            }
            SlotValue::Int(actual) => {
                if actual == *expected {
                    true
                } else {
                    self.core.warning(&format!(
                        "WRONG ASSERT: \"{name}\" has value {actual} and not {expected}"
                    ))?;
                    false
                }
            }
            SlotValue::Chan { code, label, .. } => {
                if expected.to_u64() == Some(code) {
                    true
                } else {
                    self.core.warning(&format!(
                        "WRONG ASSERT: \"{name}\" has state {code} ({label}) and not {expected}"
                    ))?;
                    false
                }
            }
        };
        Ok(matched)
    }

    /// Adds watchpoints for a name (the user's spelling is echoed in log
    /// lines).
    pub fn watch_signal(&mut self, name: &str) -> Result<(), SimError> {
        let slot = self.resolve(name)?;
        self.core.watch.watch(slot.class, slot.global, name);
        Ok(())
    }

    /// Removes a watchpoint.
    pub fn unwatch_signal(&mut self, name: &str) -> Result<bool, SimError> {
        let slot = self.resolve(name)?;
        Ok(self.core.watch.unwatch(slot.class, slot.global))
    }

    /// Toggles a breakpoint; returns its new state.
    pub fn toggle_breakpoint(&mut self, name: &str) -> Result<bool, SimError> {
        let slot = self.resolve(name)?;
        Ok(self
            .core
            .watch
            .toggle_breakpoint(slot.class, slot.global, name))
    }

    /// Drops the pending action on a channel and resumes the blocked
    /// thread past its communication (the `skip-comm` command).
    pub fn skip_comm(&mut self, name: &str) -> Result<crate::channel::SkippedSide, SimError> {
        let slot = self.resolve(name)?;
        if slot.class != SlotClass::Chan {
            return Err(SimError::resolution(format!(
                "`{name}` is not a channel"
            )));
        }
        let (peer, side) = self.core.store.chan_slot_mut(slot.global)?.skip_pending()?;
        self.core.wake_probers(slot.global)?;
        match self.objects.get_mut(peer.obj) {
            Some(SimObject::Chp(inst)) => {
                inst.resume_skipped(peer.obj, peer.thread, &mut self.core)?
            }
            _ => return Err(SimError::fatal("channel endpoint is not a CHP instance")),
        }
        Ok(side)
    }

    fn chp_object(&mut self, inst_path: &str) -> Result<usize, SimError> {
        let node = self.tree.find_instance(inst_path)?;
        let obj = self.tree.nodes[node].obj.ok_or_else(|| {
            SimError::resolution("only supported for CHP/HSE components")
        })?;
        match self.objects.get(obj) {
            Some(SimObject::Chp(_)) => Ok(obj),
            _ => Err(SimError::resolution("only supported for CHP/HSE components")),
        }
    }

    /// Forces fresh guard evaluation in a deadlocked process
    /// (the `gc-retry` command).
    pub fn gc_retry(&mut self, inst_path: &str) -> Result<(), SimError> {
        let obj = self.chp_object(inst_path)?;
        match self.objects.get_mut(obj) {
            Some(SimObject::Chp(inst)) => inst.gc_retry(obj, &mut self.core),
            _ => Err(SimError::fatal("object table changed underfoot")),
        }
    }

    /// Jumps a single-threaded process to a label (the `goto` command).
    pub fn goto_label(&mut self, inst_path: &str, label: &str) -> Result<(), SimError> {
        let obj = self.chp_object(inst_path)?;
        match self.objects.get_mut(obj) {
            Some(SimObject::Chp(inst)) => inst.jump_to_label(obj, label, &mut self.core),
            _ => Err(SimError::fatal("object table changed underfoot")),
        }
    }

    /// Names of all Boolean nodes currently holding `value`.
    pub fn status_report(&self, value: Tri) -> String {
        let mut out = String::new();
        for slot in &self.core.store.bools {
            if slot.value == value {
                out.push_str(&slot.name);
                out.push('\n');
            }
        }
        if out.is_empty() {
            out.push_str("(none)\n");
        }
        out
    }

    fn subtree(&self, start: usize) -> Vec<usize> {
        let mut all = Vec::new();
        let mut stack = vec![start];
        while let Some(n) = stack.pop() {
            all.push(n);
            let mut kids: Vec<usize> = self.tree.nodes[n].children.values().copied().collect();
            kids.sort_unstable();
            stack.extend(kids.into_iter().rev());
        }
        all
    }

    /// Thread and pc state of every process under an instance
    /// (the `procinfo` command).
    pub fn procinfo(&self, inst_path: &str) -> Result<String, SimError> {
        let start = self.tree.find_instance(inst_path)?;
        let mut out = String::new();
        for n in self.subtree(start) {
            if let Some(obj) = self.tree.nodes[n].obj {
                match &self.objects[obj] {
                    SimObject::Chp(inst) => inst.describe(&mut out),
                    SimObject::Prs(inst) => inst.describe(&mut out),
                }
            }
        }
        Ok(out)
    }

    /// Guard coverage of every CHP process under an instance
    /// (the `coverage` command).
    pub fn coverage(&self, inst_path: &str) -> Result<String, SimError> {
        let start = self.tree.find_instance(inst_path)?;
        let mut out = String::new();
        for n in self.subtree(start) {
            if let Some(obj) = self.tree.nodes[n].obj {
                if let SimObject::Chp(inst) = &self.objects[obj] {
                    inst.coverage_report(&mut out);
                }
            }
        }
        Ok(out)
    }

    /// A printable dump of the pending event queue.
    pub fn pending_report(&self) -> String {
        let mut out = String::new();
        for (deadline, seq, origin, ev) in self.core.queue.snapshot() {
            let kind = match &ev.kind {
                EventKind::Init => "init".to_string(),
                EventKind::Resume { thread } => format!("resume thread {thread}"),
                EventKind::ChanWake { thread } => format!("channel wake thread {thread}"),
                EventKind::GuardRecheck { thread } => match thread {
                    Some(t) => format!("guard re-check thread {t}"),
                    None => "guard re-check".to_string(),
                },
                EventKind::NodeFire { local, value } => {
                    format!("node {local} := {value}")
                }
                EventKind::Monitor { group } => format!("monitor group {group}"),
            };
            let origin = match origin {
                SimObjKind::Chp => "chp",
                SimObjKind::Hse => "hse",
                SimObjKind::Prs => "prs",
            };
            out.push_str(&format!(
                "  [{deadline}] #{seq} {origin} obj {}: {kind}\n",
                ev.target
            ));
        }
        if out.is_empty() {
            out.push_str("  (no pending events)\n");
        }
        out
    }

    /// Opens a trace of the given format covering all watched signals.
    pub fn trace_start(&mut self, fmt: &str, path: &Path) -> Result<(), SimError> {
        let mut signals = Vec::new();
        for (class, offset, name) in self.core.watch.watched() {
            let width = match class {
                SlotClass::Bool => 1,
                SlotClass::Int => self.core.store.int_slot(offset)?.width,
                SlotClass::Chan => self.core.store.chan_slot(offset)?.width,
            };
            signals.push(TraceSignal {
                class,
                offset,
                name,
                width,
            });
        }
        let timescale = self.core.timescale;
        self.core.traces.start(fmt, path, timescale, &signals)
    }

    /// Closes the open trace of the given format.
    pub fn trace_stop(&mut self, fmt: &str) -> Result<(), SimError> {
        self.core.traces.stop(fmt)
    }

    /// Current time scaled for display, in picoseconds.
    pub fn sim_time_ps(&self) -> f64 {
        let ticks = self.core.now.to_u64().unwrap_or(u64::MAX) as f64;
        ticks * self.core.timescale * 1e12
    }
}

/// A read slot value, typed for the command boundary.
#[derive(Debug, Clone)]
pub enum SlotValue {
    /// A Boolean node value.
    Bool(Tri),
    /// An integer value.
    Int(BigInt),
    /// A channel's phase and completion count.
    Chan {
        /// Phase code (0 idle, 1 sender, 2 send probe, 3 receiver,
        /// 4 recv probe).
        code: u64,
        /// Phase label.
        label: &'static str,
        /// Completed rendezvous count.
        count: u64,
    },
}

struct Flattener<'a> {
    design: &'a Design,
    core: &'a mut SimCore,
    objects: &'a mut Vec<SimObject>,
    nodes: Vec<InstanceNode>,
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

impl Flattener<'_> {
    fn flatten(
        &mut self,
        proc_id: ProcId,
        prefix: &str,
        bindings: HashMap<(SlotClass, usize), usize>,
    ) -> Result<usize, SimError> {
        let proc = self
            .design
            .procs
            .get_opt(proc_id)
            .ok_or_else(|| SimError::fatal("instance references unknown process type"))?
            .clone();

        let mut bool_map = Vec::new();
        let mut int_map = Vec::new();
        let mut chan_map = Vec::new();
        let mut counters = [0usize; 3];
        for decl in &proc.decls {
            for i in 0..decl.count {
                let label = if decl.count == 1 {
                    decl.name.clone()
                } else {
                    format!("{}[{i}]", decl.name)
                };
                let full = join_path(prefix, &label);
                let class = decl.kind.class();
                let local = counters[class as usize];
                counters[class as usize] += 1;
                let global = match bindings.get(&(class, local)) {
                    Some(&g) => g,
                    None => match decl.kind {
                        SlotKind::Bool => self.core.store.alloc_bool(full),
                        SlotKind::Int { width } => self.core.store.alloc_int(full, width),
                        SlotKind::Chan { width } => self.core.store.alloc_chan(full, width),
                    },
                };
                match class {
                    SlotClass::Bool => bool_map.push(global),
                    SlotClass::Int => int_map.push(global),
                    SlotClass::Chan => chan_map.push(global),
                }
            }
        }

        let node_idx = self.nodes.len();
        self.nodes.push(InstanceNode {
            path: prefix.to_string(),
            proc: proc_id,
            obj: None,
            bool_map: bool_map.clone(),
            int_map: int_map.clone(),
            chan_map: chan_map.clone(),
            children: HashMap::new(),
        });

        for inst in &proc.insts {
            let mut child_bindings = HashMap::new();
            for conn in &inst.conns {
                if conn.child.class != conn.parent.class {
                    return Err(SimError::fatal(format!(
                        "connection class mismatch on `{}`",
                        join_path(prefix, &inst.name)
                    )));
                }
                let parent_map = match conn.parent.class {
                    SlotClass::Bool => &bool_map,
                    SlotClass::Int => &int_map,
                    SlotClass::Chan => &chan_map,
                };
                let global = *parent_map.get(conn.parent.offset).ok_or_else(|| {
                    SimError::fatal(format!(
                        "connection references undeclared parent slot in `{}`",
                        join_path(prefix, &inst.name)
                    ))
                })?;
                child_bindings.insert((conn.child.class, conn.child.offset), global);
            }
            let child_prefix = join_path(prefix, &inst.name);
            let child_idx = self.flatten(inst.proc, &child_prefix, child_bindings)?;
            self.nodes[node_idx].children.insert(inst.name.clone(), child_idx);
        }

        if let Some(body) = &proc.body {
            let display = if prefix.is_empty() {
                "-top-".to_string()
            } else {
                prefix.to_string()
            };
            let obj_idx = self.objects.len();
            match body {
                ProcBody::Chp(stmt) | ProcBody::Hse(stmt) => {
                    let is_hse = matches!(body, ProcBody::Hse(_));
                    let compiled = graph::compile(stmt)?;
                    let inst = ChpInstance::new(
                        display, proc_id, is_hse, compiled, bool_map, int_map, chan_map,
                    );
                    self.core.obj_kinds.push(if is_hse {
                        SimObjKind::Hse
                    } else {
                        SimObjKind::Chp
                    });
                    inst.register_subscriptions(obj_idx, self.core)?;
                    self.objects.push(SimObject::Chp(inst));
                }
                ProcBody::Prs { rules, excl_groups } => {
                    let inst = PrsInstance::new(
                        display,
                        proc_id,
                        rules.clone(),
                        excl_groups.clone(),
                        bool_map,
                    );
                    self.core.obj_kinds.push(SimObjKind::Prs);
                    inst.register_subscriptions(obj_idx, self.core)?;
                    self.objects.push(SimObject::Prs(inst));
                }
            }
            self.nodes[node_idx].obj = Some(obj_idx);
            self.core.post(obj_idx, 0, EventKind::Init);
        }

        Ok(node_idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_ir::{
        Arena, BinaryOp, ChpStmt, Conn, Expr, PrsRule, ProcType, RuleDir, SlotRef, SubInst,
        VarDecl, VarRef,
    };

    /// `P: *[ C!1 ]` and `Q: *[ C?x ]` wired on channel `C`.
    fn handshake_design() -> Design {
        let mut procs = Arena::new();

        let mut producer = ProcType::new("producer");
        producer.decls = vec![VarDecl::scalar("c", SlotKind::Chan { width: 8 })];
        producer.body = Some(ProcBody::Chp(ChpStmt::Forever(Box::new(ChpStmt::Send {
            chan: 0,
            expr: Some(Expr::int_const(1)),
            delay: None,
        }))));
        let producer_id = procs.alloc(producer);

        let mut consumer = ProcType::new("consumer");
        consumer.decls = vec![
            VarDecl::scalar("c", SlotKind::Chan { width: 8 }),
            VarDecl::scalar("x", SlotKind::Int { width: 8 }),
        ];
        consumer.body = Some(ProcBody::Chp(ChpStmt::Forever(Box::new(ChpStmt::Recv {
            chan: 0,
            var: Some(VarRef::Int(0)),
            delay: None,
        }))));
        let consumer_id = procs.alloc(consumer);

        let mut top = ProcType::new("main");
        top.decls = vec![VarDecl::scalar("C", SlotKind::Chan { width: 8 })];
        top.insts = vec![
            SubInst {
                name: "p".into(),
                proc: producer_id,
                conns: vec![Conn {
                    child: SlotRef::chan(0),
                    parent: SlotRef::chan(0),
                }],
            },
            SubInst {
                name: "q".into(),
                proc: consumer_id,
                conns: vec![Conn {
                    child: SlotRef::chan(0),
                    parent: SlotRef::chan(0),
                }],
            },
        ];
        let top_id = procs.alloc(top);

        Design {
            procs,
            top: top_id,
        }
    }

    fn new_sim(design: Design) -> Simulator {
        let top = design.top;
        let mut sim = Simulator::new(Arc::new(design), top, &SimConfig::default()).unwrap();
        sim.core.watch = WatchBreak::in_memory();
        sim
    }

    #[test]
    fn handshake_counts_rendezvous() {
        let mut sim = new_sim(handshake_design());
        sim.step(200).unwrap();
        let count = sim.chcount("C").unwrap();
        assert!(count >= 10, "only {count} rendezvous completed");
        // The consumer observed the sent value.
        match sim.get_value("q.x").unwrap() {
            SlotValue::Int(v) => assert_eq!(v.to_u64(), Some(1)),
            other => panic!("expected Int, got {other:?}"),
        }
        // Channel aliasing: p.c, q.c and C are the same slot.
        assert_eq!(sim.chcount("p.c").unwrap(), count);
        assert_eq!(sim.chcount("q.c").unwrap(), count);
    }

    #[test]
    fn time_is_monotonic() {
        let mut sim = new_sim(handshake_design());
        let mut last = sim.core.now.clone();
        for _ in 0..50 {
            sim.step(1).unwrap();
            assert!(sim.core.now >= last);
            last = sim.core.now.clone();
        }
    }

    #[test]
    fn advance_moves_time_even_without_events() {
        let mut procs = Arena::new();
        let top_id = procs.alloc(ProcType::new("empty"));
        let mut sim = new_sim(Design {
            procs,
            top: top_id,
        });
        assert!(!sim.advance(25).unwrap());
        assert_eq!(sim.core.now, BigInt::from_u64(25));
        assert!(!sim.advance(5).unwrap());
        assert_eq!(sim.core.now, BigInt::from_u64(30));
    }

    #[test]
    fn reset_mode_defers_chp_events() {
        let mut sim = new_sim(handshake_design());
        sim.set_reset_mode(true);
        sim.run().unwrap();
        assert_eq!(sim.chcount("C").unwrap(), 0);
        // The CHP entry events are still queued.
        assert!(!sim.core.queue.is_empty());
        sim.set_reset_mode(false);
        sim.step(50).unwrap();
        assert!(sim.chcount("C").unwrap() > 0);
    }

    #[test]
    fn identical_seeds_reproduce_state() {
        let run = |seed: u64| -> (u64, Option<u64>) {
            let design = handshake_design();
            let top = design.top;
            let mut sim = Simulator::new(
                Arc::new(design),
                top,
                &SimConfig {
                    seed,
                    ..SimConfig::default()
                },
            )
            .unwrap();
            sim.core.watch = WatchBreak::in_memory();
            sim.core.timing = TimingMode::Random { min: 1, max: 20 };
            sim.step(100).unwrap();
            let count = sim.chcount("C").unwrap();
            let now = sim.core.now.to_u64();
            (count, now)
        };
        assert_eq!(run(42), run(42));
    }

    fn inverter_design() -> Design {
        let mut procs = Arena::new();
        let mut inv = ProcType::new("inv");
        inv.decls = vec![
            VarDecl::scalar("i", SlotKind::Bool),
            VarDecl::scalar("o", SlotKind::Bool),
        ];
        inv.body = Some(ProcBody::Prs {
            rules: vec![
                PrsRule {
                    guard: Expr::not(Expr::Bool(0)),
                    target: 1,
                    dir: RuleDir::Up,
                    delay: None,
                },
                PrsRule {
                    guard: Expr::Bool(0),
                    target: 1,
                    dir: RuleDir::Down,
                    delay: None,
                },
            ],
            excl_groups: Vec::new(),
        });
        let top_id = procs.alloc(inv);
        Design {
            procs,
            top: top_id,
        }
    }

    #[test]
    fn inverter_follows_input() {
        let mut sim = new_sim(inverter_design());
        sim.run().unwrap();
        sim.set_value("i", "0").unwrap();
        sim.run().unwrap();
        match sim.get_value("o").unwrap() {
            SlotValue::Bool(v) => assert_eq!(v, Tri::One),
            other => panic!("expected Bool, got {other:?}"),
        }
        sim.set_value("i", "1").unwrap();
        sim.run().unwrap();
        match sim.get_value("o").unwrap() {
            SlotValue::Bool(v) => assert_eq!(v, Tri::Zero),
            other => panic!("expected Bool, got {other:?}"),
        }
    }

    #[test]
    fn inertial_delay_cancels_revoked_transition() {
        let mut sim = new_sim(inverter_design());
        sim.run().unwrap();
        sim.set_value("i", "0").unwrap();
        sim.run().unwrap(); // o = 1
        // Pulse shorter than the gate delay: schedule o↓, revoke it.
        sim.set_value("i", "1").unwrap();
        sim.set_value("i", "0").unwrap();
        sim.run().unwrap();
        match sim.get_value("o").unwrap() {
            SlotValue::Bool(v) => assert_eq!(v, Tri::One),
            other => panic!("expected Bool, got {other:?}"),
        }
    }

    #[test]
    fn width_overflow_rejected() {
        let mut procs = Arena::new();
        let mut top = ProcType::new("t");
        top.decls = vec![VarDecl::scalar("x", SlotKind::Int { width: 4 })];
        let top_id = procs.alloc(top);
        let mut sim = new_sim(Design {
            procs,
            top: top_id,
        });
        assert!(sim.set_value("x", "15").is_ok());
        let err = sim.set_value("x", "16").unwrap_err();
        assert!(matches!(err, SimError::TypeDomain(_)));
        assert_eq!(
            err.to_string(),
            "Value does not fit into variable's bitwidth."
        );
        // State unchanged by the failed set.
        match sim.get_value("x").unwrap() {
            SlotValue::Int(v) => assert_eq!(v.to_u64(), Some(15)),
            other => panic!("expected Int, got {other:?}"),
        }
        let err = sim.set_value("x", "-3").unwrap_err();
        assert_eq!(err.to_string(), "Integers are unsigned.");
    }

    #[test]
    fn set_rejected_on_channel() {
        let mut sim = new_sim(handshake_design());
        assert!(matches!(
            sim.set_value("C", "1"),
            Err(SimError::Resolution(_))
        ));
    }

    #[test]
    fn watch_suppresses_unchanged_writes() {
        let mut procs = Arena::new();
        let mut top = ProcType::new("t");
        top.decls = vec![VarDecl::scalar("n", SlotKind::Bool)];
        let top_id = procs.alloc(top);
        let mut sim = new_sim(Design {
            procs,
            top: top_id,
        });
        sim.watch_signal("n").unwrap();
        sim.set_value("n", "1").unwrap();
        sim.set_value("n", "1").unwrap();
        sim.set_value("n", "0").unwrap();
        let log = sim.core.watch.take_memory();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("n := 1"));
        assert!(lines[1].contains("n := 0"));
    }

    #[test]
    fn breakpoint_stops_run() {
        let mut sim = new_sim(handshake_design());
        sim.watch_signal("q.x").unwrap();
        sim.toggle_breakpoint("q.x").unwrap();
        // cycle would run forever without the breakpoint
        sim.run().unwrap();
        assert!(sim.core.break_flag);
        assert!(sim.chcount("C").unwrap() >= 1);
    }

    #[test]
    fn assert_mismatch_is_policy_warning() {
        let mut sim = new_sim(handshake_design());
        sim.step(20).unwrap();
        assert!(sim
            .assert_value("q.x", &BigInt::from_u64(1))
            .unwrap());
        assert!(!sim
            .assert_value("q.x", &BigInt::from_u64(7))
            .unwrap());
        assert_eq!(sim.core.warning_count, 1);
        assert!(sim.core.watch.take_memory().contains("WRONG ASSERT"));
    }

    #[test]
    fn exit_on_warn_sets_exit_flag() {
        let mut sim = new_sim(handshake_design());
        sim.core.warn_policy = WarnPolicy::Exit;
        sim.step(20).unwrap();
        sim.assert_value("q.x", &BigInt::from_u64(9)).unwrap();
        assert!(sim.core.exit_flag);
    }

    #[test]
    fn deterministic_selection_takes_first_true() {
        // *[ [ #A -> B!1 [] #A -> B!0 ] ] with a sender on A: first arm
        // always wins when random choice is off.
        let mut procs = Arena::new();

        let mut src = ProcType::new("src");
        src.decls = vec![VarDecl::scalar("a", SlotKind::Chan { width: 1 })];
        src.body = Some(ProcBody::Chp(ChpStmt::Forever(Box::new(ChpStmt::Send {
            chan: 0,
            expr: Some(Expr::int_const(1)),
            delay: None,
        }))));
        let src_id = procs.alloc(src);

        let mut chooser = ProcType::new("chooser");
        chooser.decls = vec![
            VarDecl::scalar("a", SlotKind::Chan { width: 1 }),
            VarDecl::scalar("hi", SlotKind::Int { width: 8 }),
            VarDecl::scalar("lo", SlotKind::Int { width: 8 }),
        ];
        chooser.body = Some(ProcBody::Chp(ChpStmt::Forever(Box::new(
            ChpStmt::NondetSel {
                arms: vec![
                    axon_ir::GuardedCmd {
                        guard: Expr::probe(0),
                        body: ChpStmt::Seq(vec![
                            ChpStmt::Recv {
                                chan: 0,
                                var: None,
                                delay: None,
                            },
                            ChpStmt::Assign {
                                var: VarRef::Int(0),
                                expr: Expr::binary(
                                    BinaryOp::Add,
                                    Expr::Int(0),
                                    Expr::int_const(1),
                                ),
                                delay: None,
                            },
                        ]),
                    },
                    axon_ir::GuardedCmd {
                        guard: Expr::probe(0),
                        body: ChpStmt::Seq(vec![
                            ChpStmt::Recv {
                                chan: 0,
                                var: None,
                                delay: None,
                            },
                            ChpStmt::Assign {
                                var: VarRef::Int(1),
                                expr: Expr::binary(
                                    BinaryOp::Add,
                                    Expr::Int(1),
                                    Expr::int_const(1),
                                ),
                                delay: None,
                            },
                        ]),
                    },
                ],
                else_body: None,
            },
        ))));
        let chooser_id = procs.alloc(chooser);

        let mut top = ProcType::new("main");
        top.decls = vec![VarDecl::scalar("A", SlotKind::Chan { width: 1 })];
        top.insts = vec![
            SubInst {
                name: "s".into(),
                proc: src_id,
                conns: vec![Conn {
                    child: SlotRef::chan(0),
                    parent: SlotRef::chan(0),
                }],
            },
            SubInst {
                name: "t".into(),
                proc: chooser_id,
                conns: vec![Conn {
                    child: SlotRef::chan(0),
                    parent: SlotRef::chan(0),
                }],
            },
        ];
        let top_id = procs.alloc(top);

        let mut sim = new_sim(Design {
            procs,
            top: top_id,
        });
        sim.step(300).unwrap();
        let hi = match sim.get_value("t.hi").unwrap() {
            SlotValue::Int(v) => v.to_u64().unwrap(),
            _ => unreachable!(),
        };
        let lo = match sim.get_value("t.lo").unwrap() {
            SlotValue::Int(v) => v.to_u64().unwrap(),
            _ => unreachable!(),
        };
        assert!(hi >= 3);
        assert_eq!(lo, 0);
    }

    #[test]
    fn par_joins_before_continuation() {
        // a := 1, b := 2 in parallel; then s := a + b.
        let mut procs = Arena::new();
        let mut top = ProcType::new("t");
        top.decls = vec![
            VarDecl::scalar("a", SlotKind::Int { width: 8 }),
            VarDecl::scalar("b", SlotKind::Int { width: 8 }),
            VarDecl::scalar("s", SlotKind::Int { width: 8 }),
        ];
        let assign = |var: usize, v: u64| ChpStmt::Assign {
            var: VarRef::Int(var),
            expr: Expr::int_const(v),
            delay: None,
        };
        top.body = Some(ProcBody::Chp(ChpStmt::Seq(vec![
            ChpStmt::Par(vec![assign(0, 1), assign(1, 2)]),
            ChpStmt::Assign {
                var: VarRef::Int(2),
                expr: Expr::binary(BinaryOp::Add, Expr::Int(0), Expr::Int(1)),
                delay: None,
            },
        ])));
        let top_id = procs.alloc(top);
        let mut sim = new_sim(Design {
            procs,
            top: top_id,
        });
        sim.run().unwrap();
        match sim.get_value("s").unwrap() {
            SlotValue::Int(v) => assert_eq!(v.to_u64(), Some(3)),
            other => panic!("expected Int, got {other:?}"),
        }
        assert!(sim.core.queue.is_empty());
    }

    #[test]
    fn guarded_loop_exits_when_false() {
        // *[ x < 10 -> x := x + 1 ] terminates with x = 10.
        let mut procs = Arena::new();
        let mut top = ProcType::new("t");
        top.decls = vec![VarDecl::scalar("x", SlotKind::Int { width: 8 })];
        top.body = Some(ProcBody::Chp(ChpStmt::WhileLoop(vec![
            axon_ir::GuardedCmd {
                guard: Expr::binary(BinaryOp::Lt, Expr::Int(0), Expr::int_const(10)),
                body: ChpStmt::Assign {
                    var: VarRef::Int(0),
                    expr: Expr::binary(BinaryOp::Add, Expr::Int(0), Expr::int_const(1)),
                    delay: None,
                },
            },
        ])));
        let top_id = procs.alloc(top);
        let mut sim = new_sim(Design {
            procs,
            top: top_id,
        });
        sim.run().unwrap();
        match sim.get_value("x").unwrap() {
            SlotValue::Int(v) => assert_eq!(v.to_u64(), Some(10)),
            other => panic!("expected Int, got {other:?}"),
        }
        assert!(sim.core.queue.is_empty());
    }

    #[test]
    fn hse_dispatches_in_reset_mode() {
        let mut procs = Arena::new();
        let mut top = ProcType::new("t");
        top.decls = vec![VarDecl::scalar("r", SlotKind::Bool)];
        top.body = Some(ProcBody::Hse(ChpStmt::Assign {
            var: VarRef::Bool(0),
            expr: Expr::TriConst(Tri::One),
            delay: None,
        }));
        let top_id = procs.alloc(top);
        let mut sim = new_sim(Design {
            procs,
            top: top_id,
        });
        sim.set_reset_mode(true);
        sim.run().unwrap();
        match sim.get_value("r").unwrap() {
            SlotValue::Bool(v) => assert_eq!(v, Tri::One),
            other => panic!("expected Bool, got {other:?}"),
        }
    }

    #[test]
    fn goto_rejected_with_multiple_threads() {
        let mut procs = Arena::new();
        let mut top = ProcType::new("t");
        top.decls = vec![
            VarDecl::scalar("a", SlotKind::Int { width: 8 }),
            VarDecl::scalar("b", SlotKind::Int { width: 8 }),
        ];
        // two parallel counting loops, plus a label before them
        let count = |var: usize| {
            ChpStmt::Forever(Box::new(ChpStmt::Assign {
                var: VarRef::Int(var),
                expr: Expr::binary(
                    BinaryOp::Add,
                    Expr::Int(var),
                    Expr::int_const(1),
                ),
                delay: None,
            }))
        };
        top.body = Some(ProcBody::Chp(ChpStmt::Seq(vec![
            ChpStmt::Label {
                name: "start".into(),
                body: Box::new(ChpStmt::Skip),
            },
            ChpStmt::Par(vec![count(0), count(1)]),
        ])));
        let top_id = procs.alloc(top);
        let mut sim = new_sim(Design {
            procs,
            top: top_id,
        });
        sim.step(20).unwrap();
        let err = sim.goto_label("", "start").unwrap_err();
        assert!(matches!(err, SimError::StateIllegal(_)));
    }

    #[test]
    fn guard_wakeup_after_external_set() {
        // [ x -> y := 1 ]  blocks until `set x 1` arrives (scenario: a
        // deadlocked guard woken by the environment).
        let mut procs = Arena::new();
        let mut top = ProcType::new("t");
        top.decls = vec![
            VarDecl::scalar("x", SlotKind::Bool),
            VarDecl::scalar("y", SlotKind::Int { width: 8 }),
        ];
        top.body = Some(ProcBody::Chp(ChpStmt::DetSel(vec![axon_ir::GuardedCmd {
            guard: Expr::Bool(0),
            body: ChpStmt::Assign {
                var: VarRef::Int(0),
                expr: Expr::int_const(1),
                delay: None,
            },
        }])));
        let top_id = procs.alloc(top);
        let mut sim = new_sim(Design {
            procs,
            top: top_id,
        });
        sim.run().unwrap();
        match sim.get_value("y").unwrap() {
            SlotValue::Int(v) => assert_eq!(v.to_u64(), Some(0)),
            _ => unreachable!(),
        }
        sim.set_value("x", "1").unwrap();
        // The set itself only queues the wakeup; it is visible at once...
        match sim.get_value("x").unwrap() {
            SlotValue::Bool(v) => assert_eq!(v, Tri::One),
            _ => unreachable!(),
        }
        // ...and the next run advances the process past the selection.
        sim.run().unwrap();
        match sim.get_value("y").unwrap() {
            SlotValue::Int(v) => assert_eq!(v.to_u64(), Some(1)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn skip_comm_resumes_sender_without_count() {
        // One process blocked sending with no receiver.
        let mut procs = Arena::new();
        let mut top = ProcType::new("t");
        top.decls = vec![
            VarDecl::scalar("c", SlotKind::Chan { width: 8 }),
            VarDecl::scalar("done", SlotKind::Int { width: 8 }),
        ];
        top.body = Some(ProcBody::Chp(ChpStmt::Seq(vec![
            ChpStmt::Send {
                chan: 0,
                expr: Some(Expr::int_const(5)),
                delay: None,
            },
            ChpStmt::Assign {
                var: VarRef::Int(0),
                expr: Expr::int_const(1),
                delay: None,
            },
        ])));
        let top_id = procs.alloc(top);
        let mut sim = new_sim(Design {
            procs,
            top: top_id,
        });
        sim.run().unwrap();
        // Blocked sending; nothing completed.
        assert_eq!(sim.chcount("c").unwrap(), 0);
        match sim.get_value("c").unwrap() {
            SlotValue::Chan { code, .. } => assert_eq!(code, 1),
            _ => unreachable!(),
        }
        sim.skip_comm("c").unwrap();
        sim.run().unwrap();
        assert_eq!(sim.chcount("c").unwrap(), 0);
        match sim.get_value("c").unwrap() {
            SlotValue::Chan { code, .. } => assert_eq!(code, 0),
            _ => unreachable!(),
        }
        match sim.get_value("done").unwrap() {
            SlotValue::Int(v) => assert_eq!(v.to_u64(), Some(1)),
            _ => unreachable!(),
        }
        // A second skip on the now-idle channel is illegal.
        assert!(matches!(
            sim.skip_comm("c"),
            Err(SimError::StateIllegal(_))
        ));
    }
}
