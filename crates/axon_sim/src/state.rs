//! Flat simulation state: dense arrays of Boolean, integer, and channel
//! slots addressed by global offset.
//!
//! Global offsets are the primary key used by watchpoints, tracing, and
//! fanout propagation. Each slot carries its canonical hierarchical name
//! (assigned once by the flattener, by the instance that allocated it) and
//! the list of simulator objects subscribed to changes of that slot.

use axon_common::{BigInt, Tri};

use crate::channel::ChannelState;
use crate::error::SimError;

/// A ternary circuit node.
#[derive(Debug)]
pub struct BoolSlot {
    /// Current value; nodes start unknown.
    pub value: Tri,
    /// Canonical hierarchical name.
    pub name: String,
    /// Object indices to notify when the value changes.
    pub fanout: Vec<usize>,
}

/// A fixed-width unsigned integer variable.
#[derive(Debug)]
pub struct IntSlot {
    /// Current value, always in `[0, 2^width)`.
    pub value: BigInt,
    /// Declared bit width.
    pub width: u32,
    /// Canonical hierarchical name.
    pub name: String,
    /// Object indices to notify when the value changes.
    pub fanout: Vec<usize>,
}

/// The flat per-design state arrays.
#[derive(Debug, Default)]
pub struct StateStore {
    /// All Boolean slots.
    pub bools: Vec<BoolSlot>,
    /// All integer slots.
    pub ints: Vec<IntSlot>,
    /// All channel slots.
    pub chans: Vec<ChannelState>,
}

impl StateStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a Boolean slot initialized to X.
    pub fn alloc_bool(&mut self, name: String) -> usize {
        self.bools.push(BoolSlot {
            value: Tri::X,
            name,
            fanout: Vec::new(),
        });
        self.bools.len() - 1
    }

    /// Allocates an integer slot of the given width initialized to 0.
    pub fn alloc_int(&mut self, name: String, width: u32) -> usize {
        self.ints.push(IntSlot {
            value: BigInt::from_u64_width(0, width.max(1)),
            width,
            name,
            fanout: Vec::new(),
        });
        self.ints.len() - 1
    }

    /// Allocates an idle channel slot of the given data width.
    pub fn alloc_chan(&mut self, name: String, width: u32) -> usize {
        self.chans.push(ChannelState::new(name, width));
        self.chans.len() - 1
    }

    /// The Boolean slot at `off`.
    pub fn bool_slot(&self, off: usize) -> Result<&BoolSlot, SimError> {
        self.bools
            .get(off)
            .ok_or_else(|| SimError::fatal(format!("bool offset {off} out of range")))
    }

    /// The Boolean slot at `off`, mutably.
    pub fn bool_slot_mut(&mut self, off: usize) -> Result<&mut BoolSlot, SimError> {
        self.bools
            .get_mut(off)
            .ok_or_else(|| SimError::fatal(format!("bool offset {off} out of range")))
    }

    /// The integer slot at `off`.
    pub fn int_slot(&self, off: usize) -> Result<&IntSlot, SimError> {
        self.ints
            .get(off)
            .ok_or_else(|| SimError::fatal(format!("int offset {off} out of range")))
    }

    /// The integer slot at `off`, mutably.
    pub fn int_slot_mut(&mut self, off: usize) -> Result<&mut IntSlot, SimError> {
        self.ints
            .get_mut(off)
            .ok_or_else(|| SimError::fatal(format!("int offset {off} out of range")))
    }

    /// The channel slot at `off`.
    pub fn chan_slot(&self, off: usize) -> Result<&ChannelState, SimError> {
        self.chans
            .get(off)
            .ok_or_else(|| SimError::fatal(format!("channel offset {off} out of range")))
    }

    /// The channel slot at `off`, mutably.
    pub fn chan_slot_mut(&mut self, off: usize) -> Result<&mut ChannelState, SimError> {
        self.chans
            .get_mut(off)
            .ok_or_else(|| SimError::fatal(format!("channel offset {off} out of range")))
    }

    /// Subscribes an object to changes of a Boolean slot.
    pub fn subscribe_bool(&mut self, off: usize, obj: usize) -> Result<(), SimError> {
        let slot = self.bool_slot_mut(off)?;
        if !slot.fanout.contains(&obj) {
            slot.fanout.push(obj);
        }
        Ok(())
    }

    /// Subscribes an object to changes of an integer slot.
    pub fn subscribe_int(&mut self, off: usize, obj: usize) -> Result<(), SimError> {
        let slot = self.int_slot_mut(off)?;
        if !slot.fanout.contains(&obj) {
            slot.fanout.push(obj);
        }
        Ok(())
    }
}
