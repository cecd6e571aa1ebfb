//! The time-ordered event queue.
//!
//! Events are ordered lexicographically by `(deadline, seq)` where `seq` is
//! a monotonically increasing sequence number assigned at insertion, so
//! events at the same deadline fire in FIFO order. Cancellation is a lazy
//! tombstone: cancelled entries stay in the heap and are skipped at pop
//! time. Reset-mode dispatch uses the predicate variants, which pop the
//! earliest event whose *origin* matches while leaving the rest of the
//! queue (and its ordering) untouched.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use axon_common::{BigInt, Tri};

/// Handle returned by [`EventQueue::push`], used for cancellation.
pub type EventHandle = u64;

/// Classification of the simulator object an event targets.
///
/// Reset mode dispatches only events whose origin is `Hse` or `Prs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimObjKind {
    /// A CHP process instance.
    Chp,
    /// A handshaking-expansion process instance.
    Hse,
    /// A production-rule network instance.
    Prs,
}

impl SimObjKind {
    /// Whether events of this origin are dispatched in reset mode.
    pub fn runs_in_reset(self) -> bool {
        matches!(self, SimObjKind::Hse | SimObjKind::Prs)
    }
}

/// What a scheduled wakeup asks its target to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Start the process's entry thread (CHP) or evaluate every rule
    /// target (PRS). Posted once per behavioral instance at `init`.
    Init,
    /// Resume a CHP thread whose action delay has elapsed.
    Resume {
        /// The thread index within the instance.
        thread: usize,
    },
    /// A channel rendezvous completed; resume the suspended peer thread.
    ChanWake {
        /// The thread index within the instance.
        thread: usize,
    },
    /// Re-evaluate guards of blocked threads. `thread` narrows the check
    /// to one thread; `None` re-checks every guard-blocked thread.
    GuardRecheck {
        /// The thread to re-check, or all when `None`.
        thread: Option<usize>,
    },
    /// Drive a PRS node to a value (the scheduled half of an inertial
    /// transition).
    NodeFire {
        /// Instance-local Boolean offset of the node.
        local: usize,
        /// The value to drive.
        value: Tri,
    },
    /// An exclusive-monitor group reported a violation.
    Monitor {
        /// Index of the violated group within the instance.
        group: usize,
    },
}

/// A scheduled wakeup for one simulator object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Index of the target object in the simulator's object table.
    pub target: usize,
    /// What the target should do.
    pub kind: EventKind,
}

#[derive(Debug, Clone)]
struct QueuedEvent {
    deadline: BigInt,
    seq: u64,
    origin: SimObjKind,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Min-heap of scheduled events keyed by `(deadline, seq)`.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<QueuedEvent>>,
    next_seq: u64,
    /// Sequence numbers currently queued and live.
    pending: HashSet<u64>,
    /// Sequence numbers cancelled while still in the heap.
    dead: HashSet<u64>,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules an event, assigning the next sequence number.
    pub fn push(&mut self, deadline: BigInt, origin: SimObjKind, event: Event) -> EventHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(seq);
        self.heap.push(Reverse(QueuedEvent {
            deadline,
            seq,
            origin,
            event,
        }));
        seq
    }

    /// Re-inserts an entry popped by a predicate scan, keeping its
    /// original sequence number (and thus its FIFO position).
    fn push_back(&mut self, qe: QueuedEvent) {
        self.heap.push(Reverse(qe));
    }

    /// Cancels a scheduled event. A handle that already fired is ignored.
    pub fn cancel(&mut self, handle: EventHandle) {
        if self.pending.remove(&handle) {
            self.dead.insert(handle);
        }
    }

    /// Number of live (non-cancelled) events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no live events remain.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pops the earliest live event.
    pub fn pop(&mut self) -> Option<(BigInt, SimObjKind, Event)> {
        while let Some(Reverse(qe)) = self.heap.pop() {
            if self.dead.remove(&qe.seq) {
                continue;
            }
            self.pending.remove(&qe.seq);
            return Some((qe.deadline, qe.origin, qe.event));
        }
        None
    }

    /// Pops the earliest live event whose origin satisfies `pred`, leaving
    /// all other entries queued in their original order.
    pub fn pop_matching(
        &mut self,
        pred: impl Fn(SimObjKind) -> bool,
    ) -> Option<(BigInt, SimObjKind, Event)> {
        let mut skipped = Vec::new();
        let mut found = None;
        while let Some(Reverse(qe)) = self.heap.pop() {
            if self.dead.remove(&qe.seq) {
                continue;
            }
            if pred(qe.origin) {
                self.pending.remove(&qe.seq);
                found = Some((qe.deadline, qe.origin, qe.event));
                break;
            }
            skipped.push(qe);
        }
        for qe in skipped {
            self.push_back(qe);
        }
        found
    }

    /// Deadline of the earliest live event satisfying `pred`.
    pub fn next_matching_deadline(&self, pred: impl Fn(SimObjKind) -> bool) -> Option<BigInt> {
        self.heap
            .iter()
            .filter(|Reverse(qe)| self.pending.contains(&qe.seq) && pred(qe.origin))
            .map(|Reverse(qe)| qe.deadline.clone())
            .min()
    }

    /// Whether any live event satisfies `pred`.
    pub fn has_matching(&self, pred: impl Fn(SimObjKind) -> bool) -> bool {
        self.heap
            .iter()
            .any(|Reverse(qe)| self.pending.contains(&qe.seq) && pred(qe.origin))
    }

    /// A time-ordered snapshot of all live events, for display.
    pub fn snapshot(&self) -> Vec<(BigInt, u64, SimObjKind, Event)> {
        let mut entries: Vec<_> = self
            .heap
            .iter()
            .filter(|Reverse(qe)| self.pending.contains(&qe.seq))
            .map(|Reverse(qe)| (qe.deadline.clone(), qe.seq, qe.origin, qe.event.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        entries
    }
}
