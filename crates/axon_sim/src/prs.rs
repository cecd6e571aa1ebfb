//! The production-rule network simulator.
//!
//! Rules are indexed by the Boolean nodes appearing in their guards, so a
//! guard is re-evaluated exactly when one of its inputs changes. Node
//! transitions use an inertial-delay model: a scheduled transition is
//! cancelled when the driving pull is no longer producing that value at
//! fire time. Pull-up/pull-down interference drives X and raises a
//! warning; declared exclusive-high/low groups are checked when monitoring
//! is enabled.

use std::collections::HashMap;

use axon_common::Tri;
use axon_ir::{ExclGroup, PrsRule, ProcId, RuleDir};

use crate::error::SimError;
use crate::eval::{eval_guard, Scope};
use crate::event::{EventHandle, EventKind};
use crate::kernel::SimCore;

#[derive(Debug, Clone, Copy)]
struct PendingFire {
    handle: EventHandle,
    value: Tri,
}

/// A flattened production-rule network instance.
#[derive(Debug)]
pub struct PrsInstance {
    /// Dotted instance path.
    pub name: String,
    /// The process type.
    pub proc: ProcId,
    rules: Vec<PrsRule>,
    /// Local target node → (pull-up rule indices, pull-down rule indices).
    targets: HashMap<usize, (Vec<usize>, Vec<usize>)>,
    /// Local input node → local targets whose guards read it, sorted.
    input_to_targets: HashMap<usize, Vec<usize>>,
    /// Scheduled transitions awaiting their fire event.
    pending: HashMap<usize, PendingFire>,
    /// Local Boolean offset → global offset.
    pub bool_map: Vec<usize>,
    global_to_local: HashMap<usize, usize>,
    excl_groups: Vec<ExclGroup>,
}

impl PrsInstance {
    /// Builds the rule indexes for an instance.
    pub fn new(
        name: String,
        proc: ProcId,
        rules: Vec<PrsRule>,
        excl_groups: Vec<ExclGroup>,
        bool_map: Vec<usize>,
    ) -> Self {
        let mut targets: HashMap<usize, (Vec<usize>, Vec<usize>)> = HashMap::new();
        let mut input_to_targets: HashMap<usize, Vec<usize>> = HashMap::new();
        for (i, rule) in rules.iter().enumerate() {
            let entry = targets.entry(rule.target).or_default();
            match rule.dir {
                RuleDir::Up => entry.0.push(i),
                RuleDir::Down => entry.1.push(i),
            }
            for input in rule.guard.inputs().bools {
                let slot = input_to_targets.entry(input).or_default();
                if !slot.contains(&rule.target) {
                    slot.push(rule.target);
                }
            }
        }
        for list in input_to_targets.values_mut() {
            list.sort_unstable();
        }
        let global_to_local = bool_map
            .iter()
            .enumerate()
            .map(|(local, &global)| (global, local))
            .collect();
        Self {
            name,
            proc,
            rules,
            targets,
            input_to_targets,
            pending: HashMap::new(),
            bool_map,
            global_to_local,
            excl_groups,
        }
    }

    fn scope(&self) -> Scope<'_> {
        Scope {
            bools: &self.bool_map,
            ints: &[],
            chans: &[],
        }
    }

    /// Subscribes this instance to every node its guards read.
    pub fn register_subscriptions(&self, me: usize, core: &mut SimCore) -> Result<(), SimError> {
        for rule in &self.rules {
            for local in rule.guard.inputs().bools {
                let global = *self.bool_map.get(local).ok_or_else(|| {
                    SimError::fatal(format!("local node {local} unmapped in `{}`", self.name))
                })?;
                core.store.subscribe_bool(global, me)?;
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
                let mut all: Vec<usize> = self.targets.keys().copied().collect();
                all.sort_unstable();
                for target in all {
                    self.reevaluate(me, target, core)?;
                }
                Ok(())
            }
            EventKind::NodeFire { local, value } => self.fire(me, *local, *value, core),
            EventKind::Monitor { group } => {
                let msg = self.monitor_message(*group, core)?;
                core.warning(&msg)
            }
            // Probe/guard wakeups can reach a PRS object through shared
            // channels of a parent scope; they carry nothing for rules.
            EventKind::GuardRecheck { .. } => Ok(()),
            EventKind::Resume { .. } | EventKind::ChanWake { .. } => Err(SimError::fatal(
                format!("CHP event routed to PRS instance `{}`", self.name),
            )),
        }
    }

    /// Called synchronously when a subscribed node changes.
    pub fn on_input_change(
        &mut self,
        me: usize,
        global: usize,
        core: &mut SimCore,
    ) -> Result<(), SimError> {
        let Some(&local) = self.global_to_local.get(&global) else {
            return Ok(());
        };
        let affected = match self.input_to_targets.get(&local) {
            Some(list) => list.clone(),
            None => return Ok(()),
        };
        for target in affected {
            self.reevaluate(me, target, core)?;
        }
        Ok(())
    }

    /// Computes both pulls of a target and reconciles the scheduled
    /// transition with them.
    fn reevaluate(&mut self, me: usize, target: usize, core: &mut SimCore) -> Result<(), SimError> {
        let (ups, downs) = match self.targets.get(&target) {
            Some(t) => t.clone(),
            None => return Ok(()),
        };
        let up = self.pull_value(&ups, core)?;
        let down = self.pull_value(&downs, core)?;
        let global = *self.bool_map.get(target).ok_or_else(|| {
            SimError::fatal(format!("local node {target} unmapped in `{}`", self.name))
        })?;
        let current = core.store.bool_slot(global)?.value;
        let node_name = core.store.bool_slot(global)?.name.clone();

        let desired = match (up, down) {
            (Tri::One, Tri::One) => {
                core.warning(&format!(
                    "interference on `{node_name}`: pull-up and pull-down both active"
                ))?;
                Some(Tri::X)
            }
            (Tri::One, Tri::Zero) => Some(Tri::One),
            (Tri::Zero, Tri::One) => Some(Tri::Zero),
            (Tri::Zero, Tri::Zero) => None,
            (Tri::One, Tri::X) | (Tri::X, Tri::One) => {
                core.warning(&format!(
                    "weak interference on `{node_name}`: opposing pull is unknown"
                ))?;
                Some(Tri::X)
            }
            (Tri::X, _) | (_, Tri::X) => Some(Tri::X),
        };

        match desired {
            None => {
                // Neither pull active: the node holds. An in-flight
                // transition whose driver vanished is cancelled.
                if let Some(p) = self.pending.remove(&target) {
                    core.cancel_event(p.handle);
                }
            }
            Some(value) => {
                if let Some(p) = self.pending.get(&target) {
                    if p.value == value {
                        return Ok(());
                    }
                    let p = self.pending.remove(&target).ok_or_else(|| {
                        SimError::fatal("pending transition vanished during reevaluation")
                    })?;
                    core.cancel_event(p.handle);
                }
                if value == current {
                    return Ok(());
                }
                let declared = self.transition_delay(&ups, &downs, value);
                let delay = core.effective_delay(declared);
                let handle = core.post(
                    me,
                    delay,
                    EventKind::NodeFire {
                        local: target,
                        value,
                    },
                );
                self.pending.insert(target, PendingFire { handle, value });
            }
        }
        Ok(())
    }

    fn pull_value(&self, rule_idxs: &[usize], core: &SimCore) -> Result<Tri, SimError> {
        let mut acc = Tri::Zero;
        for &i in rule_idxs {
            acc = acc | eval_guard(&self.rules[i].guard, &self.scope(), &core.store)?;
            if acc == Tri::One {
                break;
            }
        }
        Ok(acc)
    }

    /// The declared delay of the firing direction, if any rule has one.
    fn transition_delay(&self, ups: &[usize], downs: &[usize], value: Tri) -> Option<u64> {
        let dir = match value {
            Tri::One => ups,
            Tri::Zero => downs,
            Tri::X => return None,
        };
        dir.iter().find_map(|&i| self.rules[i].delay)
    }

    /// A scheduled transition fires: drive the node and check monitors.
    fn fire(&mut self, me: usize, local: usize, value: Tri, core: &mut SimCore) -> Result<(), SimError> {
        self.pending.remove(&local);
        let global = *self.bool_map.get(local).ok_or_else(|| {
            SimError::fatal(format!("local node {local} unmapped in `{}`", self.name))
        })?;
        let cause = self.name.clone();
        core.write_bool(global, value, &cause)?;
        if core.monitors_enabled && value != Tri::X {
            for (gi, group) in self.excl_groups.iter().enumerate() {
                let active = Tri::from(group.active_high);
                if value != active || !group.nodes.contains(&local) {
                    continue;
                }
                let mut active_count = 0;
                for &n in &group.nodes {
                    let g = *self.bool_map.get(n).ok_or_else(|| {
                        SimError::fatal(format!("local node {n} unmapped in `{}`", self.name))
                    })?;
                    if core.store.bool_slot(g)?.value == active {
                        active_count += 1;
                    }
                }
                if active_count > 1 {
                    core.post(me, 0, EventKind::Monitor { group: gi });
                }
            }
        }
        Ok(())
    }

    fn monitor_message(&self, group: usize, core: &SimCore) -> Result<String, SimError> {
        let g = self.excl_groups.get(group).ok_or_else(|| {
            SimError::fatal(format!("monitor group {group} out of range in `{}`", self.name))
        })?;
        let mut names = Vec::new();
        for &n in &g.nodes {
            let global = *self.bool_map.get(n).ok_or_else(|| {
                SimError::fatal(format!("local node {n} unmapped in `{}`", self.name))
            })?;
            names.push(core.store.bool_slot(global)?.name.clone());
        }
        Ok(format!(
            "exclusive-{} violation in `{}`: {}",
            if g.active_high { "high" } else { "low" },
            self.name,
            names.join(", ")
        ))
    }

    /// One status line for `procinfo`.
    pub fn describe(&self, out: &mut String) {
        use std::fmt::Write as _;
        let _ = writeln!(
            out,
            "{} [prs]  {} rules, {} pending transitions",
            self.name,
            self.rules.len(),
            self.pending.len()
        );
    }
}
