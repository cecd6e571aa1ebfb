//! Discrete-event simulation kernel for asynchronous circuits described as
//! CHP/HSE processes and production-rule networks.
//!
//! The simulator flattens a hierarchy of process instances into dense
//! global state arrays, then interprets each instance's behavior under a
//! single time-ordered event queue. CHP threads rendezvous over
//! synchronous channels and block on guarded selections; production rules
//! drive ternary nodes with inertial delays. Watchpoints, breakpoints,
//! trace backends, and a typed command surface sit on top.
//!
//! # Architecture
//!
//! - `error` — error kinds
//! - `event` — the `(deadline, seq)` event queue with lazy cancellation
//! - `state` — flat Boolean/integer/channel slot arrays
//! - `channel` — the rendezvous channel state machine
//! - `eval` — expression evaluation over the store
//! - `graph` — lowering of statement trees to program graphs
//! - `chp` — the CHP/HSE interpreter
//! - `prs` — the production-rule network
//! - `watch` — watch/breakpoint registries and the log sink
//! - `trace` — trace backend registry, VCD and compressed writers
//! - `instance` — the instance tree and identifier resolution
//! - `kernel` — global time, dispatch, timing policy, the `Simulator`
//! - `command` — the typed command surface and interactive loop
//!
//! # Usage
//!
//! ```ignore
//! use axon_sim::{CommandEngine, SimConfig};
//!
//! let mut engine = CommandEngine::new(design, SimConfig::default());
//! let code = engine.run_repl(&mut stdin.lock(), &mut stdout)?;
//! ```

#![warn(missing_docs)]

pub mod channel;
pub mod chp;
pub mod command;
pub mod error;
pub mod eval;
pub mod event;
pub mod graph;
pub mod instance;
pub mod kernel;
pub mod prs;
pub mod state;
pub mod trace;
pub mod watch;

pub use channel::{ChanPhase, ChannelState};
pub use command::{parse_command, CommandEngine, CommandResult, SimCommand};
pub use error::SimError;
pub use event::{Event, EventKind, EventQueue, SimObjKind};
pub use kernel::{SimConfig, SimObject, Simulator, SlotValue, TimingMode, WarnPolicy};
pub use trace::{TraceRegistry, TraceSignal, TraceWriter};
pub use watch::WatchBreak;
