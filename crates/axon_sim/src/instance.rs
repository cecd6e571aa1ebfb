//! The hierarchical instance tree and identifier resolution.
//!
//! Every instance — with or without behavior — carries the local→global
//! slot maps built by the flattener, so a dotted identifier resolves to a
//! `(class, local offset)` within its owning instance and from there to
//! the global offset used by watchpoints, traces, and the state store.
//! Array references canonicalize by adding the subscript to the
//! declaration's base offset.

use std::collections::HashMap;

use axon_ir::{Design, ProcId, SlotClass, SlotKind};

use crate::error::SimError;

/// One node of the instance tree.
#[derive(Debug)]
pub struct InstanceNode {
    /// Full dotted path; empty for the root.
    pub path: String,
    /// The process type instantiated here.
    pub proc: ProcId,
    /// Index of the behavioral object, if this instance has one.
    pub obj: Option<usize>,
    /// Local Boolean offset → global offset.
    pub bool_map: Vec<usize>,
    /// Local integer offset → global offset.
    pub int_map: Vec<usize>,
    /// Local channel offset → global offset.
    pub chan_map: Vec<usize>,
    /// Child instance name → node index.
    pub children: HashMap<String, usize>,
}

/// A fully resolved identifier.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedSlot {
    /// The owning instance node.
    pub node: usize,
    /// The slot kind (carries the declared width).
    pub kind: SlotKind,
    /// Class of the slot.
    pub class: SlotClass,
    /// Process-local offset within the class.
    pub local: usize,
    /// Global offset within the class's flat array.
    pub global: usize,
}

/// The tree of flattened instances.
#[derive(Debug, Default)]
pub struct InstanceTree {
    /// All nodes; index 0 is the root once built.
    pub nodes: Vec<InstanceNode>,
}

impl InstanceTree {
    /// The root node index.
    pub fn root(&self) -> usize {
        0
    }

    /// Resolves a dotted instance path (`a.b`) to a node. An empty path
    /// is the root.
    pub fn find_instance(&self, path: &str) -> Result<usize, SimError> {
        let mut cur = self.root();
        if path.is_empty() {
            return Ok(cur);
        }
        for seg in path.split('.') {
            cur = *self.nodes[cur].children.get(seg).ok_or_else(|| {
                SimError::resolution(format!("could not find instance `{path}`"))
            })?;
        }
        Ok(cur)
    }

    /// Resolves a hierarchical identifier (`a.b[3].c` style) to a slot.
    ///
    /// Leading segments matching child instances descend the tree; the
    /// final segment names a declaration of the owning instance, with an
    /// optional array subscript.
    pub fn resolve(&self, design: &Design, name: &str) -> Result<ResolvedSlot, SimError> {
        if name.is_empty() {
            return Err(SimError::usage("empty identifier"));
        }
        let segments: Vec<&str> = name.split('.').collect();
        let mut cur = self.root();
        let mut idx = 0;
        while idx + 1 < segments.len() {
            match self.nodes[cur].children.get(segments[idx]) {
                Some(&child) => {
                    cur = child;
                    idx += 1;
                }
                None => break,
            }
        }
        if idx + 1 != segments.len() {
            return Err(SimError::resolution(format!(
                "could not find `{name}` in the simulation"
            )));
        }
        let (base_name, subscript) = parse_subscript(segments[idx])?;
        let node = &self.nodes[cur];
        let proc = design
            .procs
            .get_opt(node.proc)
            .ok_or_else(|| SimError::fatal("instance references unknown process type"))?;
        let (kind, base, count) = proc.lookup(base_name).ok_or_else(|| {
            SimError::resolution(format!(
                "could not find identifier `{name}` within process `{}`",
                proc.name
            ))
        })?;
        let local = match subscript {
            None if count > 1 => {
                return Err(SimError::resolution(format!(
                    "array index is missing in `{name}`"
                )))
            }
            None => base,
            Some(_) if count == 1 => {
                return Err(SimError::resolution(format!(
                    "`{base_name}` is not an array in `{name}`"
                )))
            }
            Some(i) if i as u32 >= count => {
                return Err(SimError::resolution(format!(
                    "array index is out of bounds in `{name}`"
                )))
            }
            Some(i) => base + i,
        };
        let class = kind.class();
        let map = match class {
            SlotClass::Bool => &node.bool_map,
            SlotClass::Int => &node.int_map,
            SlotClass::Chan => &node.chan_map,
        };
        let global = *map.get(local).ok_or_else(|| {
            SimError::fatal(format!("local offset {local} unmapped in `{name}`"))
        })?;
        Ok(ResolvedSlot {
            node: cur,
            kind,
            class,
            local,
            global,
        })
    }
}

/// Splits `x[3]` into `("x", Some(3))`; plain names pass through.
fn parse_subscript(segment: &str) -> Result<(&str, Option<usize>), SimError> {
    match segment.find('[') {
        None => Ok((segment, None)),
        Some(open) => {
            let rest = &segment[open + 1..];
            let close = rest
                .find(']')
                .ok_or_else(|| SimError::usage(format!("malformed subscript in `{segment}`")))?;
            if close + 1 != rest.len() {
                return Err(SimError::usage(format!(
                    "malformed subscript in `{segment}`"
                )));
            }
            let index: usize = rest[..close].parse().map_err(|_| {
                SimError::usage(format!("malformed subscript in `{segment}`"))
            })?;
            Ok((&segment[..open], Some(index)))
        }
    }
}
