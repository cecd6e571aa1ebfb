//! The rendezvous channel state machine.
//!
//! A synchronous channel completes a communication only when a send `C!v`
//! and a receive `C?x` have both arrived; the first side to arrive suspends.
//! The two probe-wait phases record a process blocked on a probe guard
//! (`#C`) so the peer's arrival can re-wake it. At most one of the waiting
//! phases holds at any time.

use axon_common::BigInt;
use axon_ir::ProbeSide;

use crate::error::SimError;

/// The phase of a rendezvous channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanPhase {
    /// No pending action.
    Idle,
    /// A sender has latched data and is suspended.
    WaitingSender,
    /// A receiver is suspended.
    WaitingReceiver,
    /// A would-be sender is blocked on a probe guard.
    WaitingSendProbe,
    /// A would-be receiver is blocked on a probe guard.
    WaitingRecvProbe,
}

impl ChanPhase {
    /// The numeric code reported by `get` and compared by `assert`.
    pub fn code(self) -> u64 {
        match self {
            ChanPhase::Idle => 0,
            ChanPhase::WaitingSender => 1,
            ChanPhase::WaitingSendProbe => 2,
            ChanPhase::WaitingReceiver => 3,
            ChanPhase::WaitingRecvProbe => 4,
        }
    }

    /// Human-readable phase label.
    pub fn label(self) -> &'static str {
        match self {
            ChanPhase::Idle => "idle",
            ChanPhase::WaitingSender => "waiting sender",
            ChanPhase::WaitingSendProbe => "waiting sender probe",
            ChanPhase::WaitingReceiver => "waiting receiver",
            ChanPhase::WaitingRecvProbe => "waiting receiver probe",
        }
    }
}

/// The suspended side's resume continuation: which object and thread to
/// wake when the rendezvous completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Simulator object index.
    pub obj: usize,
    /// Thread index within that object.
    pub thread: usize,
}

/// Where a completed receive stores its value (global offsets).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvBinding {
    /// Dataless receive.
    None,
    /// Store into a global Boolean slot.
    Bool(usize),
    /// Store into a global integer slot.
    Int(usize),
}

/// Result of a send arriving at the channel.
#[derive(Debug)]
pub enum SendOutcome {
    /// No receiver yet; the sender suspends.
    Suspended,
    /// A receiver was waiting: the rendezvous completed.
    Completed {
        /// The receiver to wake.
        peer: Endpoint,
        /// Where the receiver binds the delivered value.
        binding: RecvBinding,
    },
}

/// Result of a receive arriving at the channel.
#[derive(Debug)]
pub enum RecvOutcome {
    /// No sender yet; the receiver suspends.
    Suspended,
    /// A sender was waiting: the rendezvous completed.
    Completed {
        /// The sender to wake.
        peer: Endpoint,
        /// The delivered value.
        value: BigInt,
    },
}

/// The side whose pending action `skip-comm` dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkippedSide {
    /// A pending send was dropped.
    Sender,
    /// A pending receive was dropped.
    Receiver,
}

/// Runtime state of one rendezvous channel slot.
#[derive(Debug)]
pub struct ChannelState {
    /// Canonical hierarchical name.
    pub name: String,
    /// Data width in bits (0 for dataless channels).
    pub width: u32,
    /// Current phase.
    pub phase: ChanPhase,
    /// Latched data while a sender waits.
    pub data: BigInt,
    /// Continuation for a suspended sender.
    pub sender_resume: Option<Endpoint>,
    /// Continuation for a suspended receiver.
    pub receiver_resume: Option<Endpoint>,
    /// Binding recorded by a suspended receiver.
    pub recv_binding: RecvBinding,
    /// Completed rendezvous count; monotonic.
    pub completed_count: u64,
    /// Objects to re-wake on any phase change (probe guards).
    pub probe_subscribers: Vec<usize>,
}

impl ChannelState {
    /// A fresh idle channel.
    pub fn new(name: String, width: u32) -> Self {
        Self {
            name,
            width,
            phase: ChanPhase::Idle,
            data: BigInt::zero(),
            sender_resume: None,
            receiver_resume: None,
            recv_binding: RecvBinding::None,
            completed_count: 0,
            probe_subscribers: Vec::new(),
        }
    }

    /// Evaluates `#C` from the given side: true iff a peer is blocked on
    /// the opposite side with a real action pending.
    pub fn probe(&self, side: ProbeSide) -> bool {
        match side {
            ProbeSide::Receiver => self.phase == ChanPhase::WaitingSender,
            ProbeSide::Sender => self.phase == ChanPhase::WaitingReceiver,
        }
    }

    /// Registers an object to re-wake on phase changes.
    pub fn subscribe_probe(&mut self, obj: usize) {
        if !self.probe_subscribers.contains(&obj) {
            self.probe_subscribers.push(obj);
        }
    }

    /// A send `C!v` arrives from `me`.
    pub fn start_send(&mut self, value: BigInt, me: Endpoint) -> Result<SendOutcome, SimError> {
        let value = value.with_width(self.width.max(1));
        match self.phase {
            ChanPhase::Idle | ChanPhase::WaitingRecvProbe => {
                self.data = value;
                self.phase = ChanPhase::WaitingSender;
                self.sender_resume = Some(me);
                Ok(SendOutcome::Suspended)
            }
            ChanPhase::WaitingReceiver => {
                let peer = self.receiver_resume.take().ok_or_else(|| {
                    SimError::fatal(format!("channel `{}` lost its receiver", self.name))
                })?;
                let binding = self.recv_binding;
                self.recv_binding = RecvBinding::None;
                self.data = value;
                self.phase = ChanPhase::Idle;
                self.completed_count += 1;
                Ok(SendOutcome::Completed { peer, binding })
            }
            ChanPhase::WaitingSender | ChanPhase::WaitingSendProbe => Err(SimError::state_illegal(
                format!("channel `{}` already has a pending sender", self.name),
            )),
        }
    }

    /// A receive `C?x` arrives from `me`, binding into `binding`.
    pub fn start_recv(
        &mut self,
        me: Endpoint,
        binding: RecvBinding,
    ) -> Result<RecvOutcome, SimError> {
        match self.phase {
            ChanPhase::Idle | ChanPhase::WaitingSendProbe => {
                self.phase = ChanPhase::WaitingReceiver;
                self.receiver_resume = Some(me);
                self.recv_binding = binding;
                Ok(RecvOutcome::Suspended)
            }
            ChanPhase::WaitingSender => {
                let peer = self.sender_resume.take().ok_or_else(|| {
                    SimError::fatal(format!("channel `{}` lost its sender", self.name))
                })?;
                self.phase = ChanPhase::Idle;
                self.completed_count += 1;
                Ok(RecvOutcome::Completed {
                    peer,
                    value: self.data.clone(),
                })
            }
            ChanPhase::WaitingReceiver | ChanPhase::WaitingRecvProbe => {
                Err(SimError::state_illegal(format!(
                    "channel `{}` already has a pending receiver",
                    self.name
                )))
            }
        }
    }

    /// Marks an idle channel as probe-waited from the given side.
    pub fn begin_probe_wait(&mut self, side: ProbeSide) {
        if self.phase == ChanPhase::Idle {
            self.phase = match side {
                ProbeSide::Sender => ChanPhase::WaitingSendProbe,
                ProbeSide::Receiver => ChanPhase::WaitingRecvProbe,
            };
        }
    }

    /// Clears a probe-wait previously entered from the given side.
    pub fn end_probe_wait(&mut self, side: ProbeSide) {
        let waiting = match side {
            ProbeSide::Sender => ChanPhase::WaitingSendProbe,
            ProbeSide::Receiver => ChanPhase::WaitingRecvProbe,
        };
        if self.phase == waiting {
            self.phase = ChanPhase::Idle;
        }
    }

    /// Forcibly drops the pending action (`skip-comm`).
    ///
    /// Only legal while a real send or receive is suspended; probe waits
    /// and the idle phase are rejected. The completed-action count is not
    /// changed.
    pub fn skip_pending(&mut self) -> Result<(Endpoint, SkippedSide), SimError> {
        match self.phase {
            ChanPhase::WaitingSender => {
                let peer = self.sender_resume.take().ok_or_else(|| {
                    SimError::fatal(format!("channel `{}` lost its sender", self.name))
                })?;
                self.phase = ChanPhase::Idle;
                self.data = BigInt::zero();
                Ok((peer, SkippedSide::Sender))
            }
            ChanPhase::WaitingReceiver => {
                let peer = self.receiver_resume.take().ok_or_else(|| {
                    SimError::fatal(format!("channel `{}` lost its receiver", self.name))
                })?;
                self.recv_binding = RecvBinding::None;
                self.phase = ChanPhase::Idle;
                Ok((peer, SkippedSide::Receiver))
            }
            ChanPhase::WaitingSendProbe | ChanPhase::WaitingRecvProbe => {
                Err(SimError::state_illegal(format!(
                    "channel `{}` is blocked on a probe and cannot be skipped",
                    self.name
                )))
            }
            ChanPhase::Idle => Err(SimError::state_illegal(format!(
                "channel `{}` is not in a state where it can be skipped",
                self.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chan() -> ChannelState {
        ChannelState::new("top.c".into(), 8)
    }

    fn me(obj: usize) -> Endpoint {
        Endpoint { obj, thread: 0 }
    }

    #[test]
    fn send_first_suspends() {
        let mut c = chan();
        let out = c.start_send(BigInt::from_u64(5), me(0)).unwrap();
        assert!(matches!(out, SendOutcome::Suspended));
        assert_eq!(c.phase, ChanPhase::WaitingSender);
        assert_eq!(c.data.to_u64(), Some(5));
        assert_eq!(c.completed_count, 0);
    }

    #[test]
    fn recv_completes_pending_send() {
        let mut c = chan();
        c.start_send(BigInt::from_u64(5), me(0)).unwrap();
        let out = c.start_recv(me(1), RecvBinding::Int(3)).unwrap();
        match out {
            RecvOutcome::Completed { peer, value } => {
                assert_eq!(peer, me(0));
                assert_eq!(value.to_u64(), Some(5));
            }
            RecvOutcome::Suspended => panic!("expected completion"),
        }
        assert_eq!(c.phase, ChanPhase::Idle);
        assert_eq!(c.completed_count, 1);
    }

    #[test]
    fn recv_first_then_send_completes() {
        let mut c = chan();
        let out = c.start_recv(me(1), RecvBinding::Int(3)).unwrap();
        assert!(matches!(out, RecvOutcome::Suspended));
        assert_eq!(c.phase, ChanPhase::WaitingReceiver);

        let out = c.start_send(BigInt::from_u64(9), me(0)).unwrap();
        match out {
            SendOutcome::Completed { peer, binding } => {
                assert_eq!(peer, me(1));
                assert_eq!(binding, RecvBinding::Int(3));
            }
            SendOutcome::Suspended => panic!("expected completion"),
        }
        assert_eq!(c.data.to_u64(), Some(9));
        assert_eq!(c.completed_count, 1);
    }

    #[test]
    fn data_masked_to_width() {
        let mut c = ChannelState::new("top.c".into(), 4);
        c.start_send(BigInt::from_u64(0xFF), me(0)).unwrap();
        assert_eq!(c.data.to_u64(), Some(0xF));
    }

    #[test]
    fn double_sender_rejected() {
        let mut c = chan();
        c.start_send(BigInt::from_u64(1), me(0)).unwrap();
        assert!(matches!(
            c.start_send(BigInt::from_u64(2), me(2)),
            Err(SimError::StateIllegal(_))
        ));
    }

    #[test]
    fn double_receiver_rejected() {
        let mut c = chan();
        c.start_recv(me(0), RecvBinding::None).unwrap();
        assert!(matches!(
            c.start_recv(me(1), RecvBinding::None),
            Err(SimError::StateIllegal(_))
        ));
    }

    #[test]
    fn probe_sides() {
        let mut c = chan();
        assert!(!c.probe(ProbeSide::Receiver));
        assert!(!c.probe(ProbeSide::Sender));

        c.start_send(BigInt::from_u64(1), me(0)).unwrap();
        assert!(c.probe(ProbeSide::Receiver));
        assert!(!c.probe(ProbeSide::Sender));
    }

    #[test]
    fn probe_wait_phases() {
        let mut c = chan();
        c.begin_probe_wait(ProbeSide::Receiver);
        assert_eq!(c.phase, ChanPhase::WaitingRecvProbe);
        assert_eq!(c.phase.code(), 4);

        // A send arriving at a probe-waited channel latches and waits.
        let out = c.start_send(BigInt::from_u64(3), me(0)).unwrap();
        assert!(matches!(out, SendOutcome::Suspended));
        assert_eq!(c.phase, ChanPhase::WaitingSender);
    }

    #[test]
    fn end_probe_wait_only_clears_matching_side() {
        let mut c = chan();
        c.begin_probe_wait(ProbeSide::Sender);
        assert_eq!(c.phase, ChanPhase::WaitingSendProbe);
        c.end_probe_wait(ProbeSide::Receiver);
        assert_eq!(c.phase, ChanPhase::WaitingSendProbe);
        c.end_probe_wait(ProbeSide::Sender);
        assert_eq!(c.phase, ChanPhase::Idle);
    }

    #[test]
    fn skip_pending_send() {
        let mut c = chan();
        c.start_send(BigInt::from_u64(5), me(0)).unwrap();
        let (peer, side) = c.skip_pending().unwrap();
        assert_eq!(peer, me(0));
        assert_eq!(side, SkippedSide::Sender);
        assert_eq!(c.phase, ChanPhase::Idle);
        assert_eq!(c.completed_count, 0);
    }

    #[test]
    fn skip_idle_rejected() {
        let mut c = chan();
        assert!(matches!(c.skip_pending(), Err(SimError::StateIllegal(_))));
    }

    #[test]
    fn skip_probe_wait_rejected() {
        let mut c = chan();
        c.begin_probe_wait(ProbeSide::Receiver);
        assert!(matches!(c.skip_pending(), Err(SimError::StateIllegal(_))));
    }

    #[test]
    fn phase_codes_match_reporting_contract() {
        assert_eq!(ChanPhase::Idle.code(), 0);
        assert_eq!(ChanPhase::WaitingSender.code(), 1);
        assert_eq!(ChanPhase::WaitingSendProbe.code(), 2);
        assert_eq!(ChanPhase::WaitingReceiver.code(), 3);
        assert_eq!(ChanPhase::WaitingRecvProbe.code(), 4);
    }

    #[test]
    fn subscribe_probe_dedups() {
        let mut c = chan();
        c.subscribe_probe(7);
        c.subscribe_probe(7);
        assert_eq!(c.probe_subscribers, vec![7]);
    }
}
