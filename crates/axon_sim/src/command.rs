//! The typed command surface and interactive loop.
//!
//! Commands parse into [`SimCommand`], execute against a [`CommandEngine`]
//! holding the current [`Simulator`], and return a typed
//! [`CommandResult`]. Invalid arguments are reported as errors and leave
//! simulator state untouched. [`CommandEngine::run_repl`] wraps this in a
//! line-oriented prompt loop; exit code 2 signals a warning under the
//! `exit-on-warn` policy.

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use axon_common::{BigInt, Tri};
use axon_ir::Design;

use crate::channel::SkippedSide;
use crate::error::SimError;
use crate::kernel::{
    SimConfig, Simulator, SlotValue, TimingMode, WarnPolicy, DEFAULT_RANDOM_MAX,
    DEFAULT_RANDOM_MIN,
};

/// A parsed simulator command.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCommand {
    /// `initialize [<process>]` — reset and rebuild the simulator.
    Initialize {
        /// Process type name; the design's default top when absent.
        proc: Option<String>,
    },
    /// `step [n]` — dispatch up to `n` events.
    Step {
        /// Number of events.
        n: u64,
    },
    /// `advance <delay>` — run events within a time window.
    Advance {
        /// Window in ticks.
        delta: u64,
    },
    /// `cycle` — run until the queue drains or something stops the run.
    Cycle,
    /// `pending` — dump the event queue.
    Pending,
    /// `set <name> <val>` — assign a Boolean or integer slot.
    Set {
        /// Target identifier.
        name: String,
        /// Value text.
        value: String,
    },
    /// `get <name> [#f]` — read a slot.
    Get {
        /// Identifier.
        name: String,
        /// Suppress display text.
        quiet: bool,
    },
    /// `mget <n1> <n2> ...` — read several slots.
    MGet {
        /// Identifiers.
        names: Vec<String>,
    },
    /// `chcount <ch> [#f]` — completed actions on a channel.
    ChCount {
        /// Channel identifier.
        name: String,
        /// Suppress display text.
        quiet: bool,
    },
    /// `assert <name> <value>` — compare a slot against an expectation.
    Assert {
        /// Identifier.
        name: String,
        /// Expected value text.
        value: String,
    },
    /// `watch <n1> ...` — add watchpoints.
    Watch {
        /// Identifiers.
        names: Vec<String>,
    },
    /// `unwatch <n1> ...` — remove watchpoints.
    Unwatch {
        /// Identifiers.
        names: Vec<String>,
    },
    /// `breakpt <n>` / `break <n>` — toggle a breakpoint.
    BreakPt {
        /// Identifier.
        name: String,
    },
    /// `mode reset|run` — set the dispatch filter.
    Mode {
        /// `true` for reset mode.
        reset: bool,
    },
    /// `random [-u] [min max]` — randomize timings.
    Random {
        /// Randomize only unspecified delays.
        unspecified_only: bool,
        /// Explicit bounds.
        bounds: Option<(u64, u64)>,
    },
    /// `norandom` — deterministic timing.
    NoRandom,
    /// `random_seed <val>` — reseed the PRNG.
    RandomSeed {
        /// The seed.
        seed: u64,
    },
    /// `random_choice on|off` — randomize non-deterministic choices.
    RandomChoice {
        /// Enabled state.
        on: bool,
    },
    /// `break-on-warn` / `exit-on-warn` / `resume-on-warn`.
    WarnPolicySet(WarnPolicy),
    /// `status 0|1|X` — list nodes with the given value.
    Status {
        /// The value to match.
        value: Tri,
    },
    /// `procinfo [<inst>]` — dump process program counters.
    ProcInfo {
        /// Instance path; everything when absent.
        inst: Option<String>,
    },
    /// `coverage [<inst>]` — dump guard coverage.
    Coverage {
        /// Instance path; everything when absent.
        inst: Option<String>,
    },
    /// `goto [<inst>] <label>` — jump a single-threaded process.
    Goto {
        /// Instance path; the top process when absent.
        inst: Option<String>,
        /// Label name.
        label: String,
    },
    /// `gc-retry <inst>` — re-try guards in a deadlocked process.
    GcRetry {
        /// Instance path.
        inst: String,
    },
    /// `skip-comm <ch>` — drop a pending channel action.
    SkipComm {
        /// Channel identifier.
        name: String,
    },
    /// `timescale <t>` — set the display timescale in picoseconds.
    Timescale {
        /// Picoseconds per tick.
        ps: f64,
    },
    /// `get_sim_time` — current time in picoseconds.
    GetSimTime,
    /// `get_sim_itime` — current integer tick count.
    GetSimITime,
    /// `vcd_start` / `lxt2_start` / `trace_start [-fmt] <file>`.
    TraceStart {
        /// Backend format name.
        fmt: String,
        /// Output path.
        file: String,
    },
    /// `vcd_stop` / `lxt2_stop` / `trace_stop [-fmt]`.
    TraceStop {
        /// Backend format name.
        fmt: String,
    },
    /// `filter <regexp>` — restrict watch log lines.
    Filter {
        /// The expression.
        regexp: String,
    },
    /// `logfile <file>` — redirect the log sink.
    LogFile {
        /// Output path.
        file: String,
    },
    /// `help`.
    Help,
    /// `quit`.
    Quit,
}

/// The typed result of executing a command.
#[derive(Debug)]
pub enum CommandResult {
    /// Text output with no interesting value.
    Output(String),
    /// An integer-valued result.
    Int {
        /// The value.
        value: BigInt,
        /// Display text (may be empty).
        text: String,
    },
    /// A float-valued result (`get_sim_time`).
    Float {
        /// The value.
        value: f64,
        /// Display text.
        text: String,
    },
    /// A Boolean-valued result (run commands report whether events
    /// remain; `assert` reports whether it held).
    Flag {
        /// The value.
        value: bool,
        /// Display text (may be empty).
        text: String,
    },
    /// Leave the interactive loop.
    Quit,
    /// Terminate with the given exit code (`exit-on-warn`).
    Exit(i32),
}

/// Parses one command line.
pub fn parse_command(input: &str) -> Result<SimCommand, SimError> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    let Some((&cmd, args)) = parts.split_first() else {
        return Err(SimError::usage("empty command"));
    };

    let usage = |msg: &str| SimError::usage(format!("Usage: {msg}"));

    match cmd {
        "initialize" => match args {
            [] => Ok(SimCommand::Initialize { proc: None }),
            [p] => Ok(SimCommand::Initialize {
                proc: Some(p.to_string()),
            }),
            _ => Err(usage("initialize [<process>]")),
        },
        "step" => match args {
            [] => Ok(SimCommand::Step { n: 1 }),
            [n] => {
                let n: u64 = n.parse().map_err(|_| usage("step [n]"))?;
                if n == 0 {
                    return Err(SimError::usage("step: zero/negative steps?"));
                }
                Ok(SimCommand::Step { n })
            }
            _ => Err(usage("step [n]")),
        },
        "advance" => match args {
            [d] => {
                let delta: u64 = d.parse().map_err(|_| usage("advance <delay>"))?;
                if delta == 0 {
                    return Err(SimError::usage("advance: zero/negative delay?"));
                }
                Ok(SimCommand::Advance { delta })
            }
            _ => Err(usage("advance <delay>")),
        },
        "cycle" => no_args(args, SimCommand::Cycle, "cycle"),
        "pending" => no_args(args, SimCommand::Pending, "pending"),
        "set" => match args {
            [name, value] => Ok(SimCommand::Set {
                name: name.to_string(),
                value: value.to_string(),
            }),
            _ => Err(usage("set <name> <val>")),
        },
        "get" => match args {
            [name] => Ok(SimCommand::Get {
                name: name.to_string(),
                quiet: false,
            }),
            [name, "#f"] => Ok(SimCommand::Get {
                name: name.to_string(),
                quiet: true,
            }),
            _ => Err(usage("get <name> [#f]")),
        },
        "mget" => {
            if args.is_empty() {
                return Err(usage("mget <name1> <name2> ..."));
            }
            Ok(SimCommand::MGet {
                names: args.iter().map(|s| s.to_string()).collect(),
            })
        }
        "chcount" => match args {
            [name] => Ok(SimCommand::ChCount {
                name: name.to_string(),
                quiet: false,
            }),
            [name, "#f"] => Ok(SimCommand::ChCount {
                name: name.to_string(),
                quiet: true,
            }),
            _ => Err(usage("chcount <ch> [#f]")),
        },
        "assert" => match args {
            [name, value] => Ok(SimCommand::Assert {
                name: name.to_string(),
                value: value.to_string(),
            }),
            _ => Err(usage("assert <name> <value>")),
        },
        "watch" => {
            if args.is_empty() {
                return Err(usage("watch <n1> <n2> ..."));
            }
            Ok(SimCommand::Watch {
                names: args.iter().map(|s| s.to_string()).collect(),
            })
        }
        "unwatch" => {
            if args.is_empty() {
                return Err(usage("unwatch <n1> <n2> ..."));
            }
            Ok(SimCommand::Unwatch {
                names: args.iter().map(|s| s.to_string()).collect(),
            })
        }
        "breakpt" | "break" => match args {
            [name] => Ok(SimCommand::BreakPt {
                name: name.to_string(),
            }),
            _ => Err(usage("breakpt <name>")),
        },
        "mode" => match args {
            ["reset"] => Ok(SimCommand::Mode { reset: true }),
            ["run"] => Ok(SimCommand::Mode { reset: false }),
            _ => Err(usage("mode reset|run")),
        },
        "random" => {
            let (unspecified_only, rest) = match args {
                ["-u", rest @ ..] => (true, rest),
                rest => (false, rest),
            };
            match rest {
                [] => Ok(SimCommand::Random {
                    unspecified_only,
                    bounds: None,
                }),
                [min, max] => {
                    let min: u64 = min.parse().map_err(|_| usage("random [-u] [min max]"))?;
                    let max: u64 = max.parse().map_err(|_| usage("random [-u] [min max]"))?;
                    if min > max {
                        return Err(SimError::usage("random: min exceeds max"));
                    }
                    Ok(SimCommand::Random {
                        unspecified_only,
                        bounds: Some((min, max)),
                    })
                }
                _ => Err(usage("random [-u] [min max]")),
            }
        }
        "norandom" => no_args(args, SimCommand::NoRandom, "norandom"),
        "random_seed" => match args {
            [s] => {
                let seed: u64 = s.parse().map_err(|_| usage("random_seed <val>"))?;
                Ok(SimCommand::RandomSeed { seed })
            }
            _ => Err(usage("random_seed <val>")),
        },
        "random_choice" => match args {
            ["on"] => Ok(SimCommand::RandomChoice { on: true }),
            ["off"] => Ok(SimCommand::RandomChoice { on: false }),
            _ => Err(usage("random_choice on|off")),
        },
        "break-on-warn" => no_args(args, SimCommand::WarnPolicySet(WarnPolicy::Break), cmd),
        "exit-on-warn" => no_args(args, SimCommand::WarnPolicySet(WarnPolicy::Exit), cmd),
        "resume-on-warn" => no_args(args, SimCommand::WarnPolicySet(WarnPolicy::Resume), cmd),
        "status" => match args {
            [v] => {
                let value = match *v {
                    "0" => Tri::Zero,
                    "1" => Tri::One,
                    "X" | "U" => Tri::X,
                    _ => return Err(usage("status 0|1|X")),
                };
                Ok(SimCommand::Status { value })
            }
            _ => Err(usage("status 0|1|X")),
        },
        "procinfo" => match args {
            [] => Ok(SimCommand::ProcInfo { inst: None }),
            [i] => Ok(SimCommand::ProcInfo {
                inst: Some(i.to_string()),
            }),
            _ => Err(usage("procinfo [<inst-name>]")),
        },
        "coverage" => match args {
            [] => Ok(SimCommand::Coverage { inst: None }),
            [i] => Ok(SimCommand::Coverage {
                inst: Some(i.to_string()),
            }),
            _ => Err(usage("coverage [<inst-name>]")),
        },
        "goto" => match args {
            [label] => Ok(SimCommand::Goto {
                inst: None,
                label: label.to_string(),
            }),
            [inst, label] => Ok(SimCommand::Goto {
                inst: Some(inst.to_string()),
                label: label.to_string(),
            }),
            _ => Err(usage("goto [<inst-name>] <label>")),
        },
        "gc-retry" => match args {
            [] => Ok(SimCommand::GcRetry {
                inst: String::new(),
            }),
            [inst] => Ok(SimCommand::GcRetry {
                inst: inst.to_string(),
            }),
            _ => Err(usage("gc-retry [<name>]")),
        },
        "skip-comm" => match args {
            [name] => Ok(SimCommand::SkipComm {
                name: name.to_string(),
            }),
            _ => Err(usage("skip-comm <name>")),
        },
        "timescale" => match args {
            [t] => {
                let ps: f64 = t.parse().map_err(|_| usage("timescale <t>"))?;
                if ps <= 0.0 {
                    return Err(SimError::usage("timescale value has to be positive"));
                }
                Ok(SimCommand::Timescale { ps })
            }
            _ => Err(usage("timescale <t>")),
        },
        "get_sim_time" => no_args(args, SimCommand::GetSimTime, cmd),
        "get_sim_itime" => no_args(args, SimCommand::GetSimITime, cmd),
        "vcd_start" => match args {
            [file] => Ok(SimCommand::TraceStart {
                fmt: "vcd".into(),
                file: file.to_string(),
            }),
            _ => Err(usage("vcd_start <file>")),
        },
        "vcd_stop" => no_args(
            args,
            SimCommand::TraceStop { fmt: "vcd".into() },
            "vcd_stop",
        ),
        "lxt2_start" => match args {
            [file] => Ok(SimCommand::TraceStart {
                fmt: "lxt2".into(),
                file: file.to_string(),
            }),
            _ => Err(usage("lxt2_start <file>")),
        },
        "lxt2_stop" => no_args(
            args,
            SimCommand::TraceStop { fmt: "lxt2".into() },
            "lxt2_stop",
        ),
        "trace_start" => match args {
            [file] => Ok(SimCommand::TraceStart {
                fmt: "vcd".into(),
                file: file.to_string(),
            }),
            [fmt, file] if fmt.starts_with('-') => Ok(SimCommand::TraceStart {
                fmt: fmt[1..].to_string(),
                file: file.to_string(),
            }),
            _ => Err(usage("trace_start [-fmt] <file>")),
        },
        "trace_stop" => match args {
            [] => Ok(SimCommand::TraceStop { fmt: "vcd".into() }),
            [fmt] if fmt.starts_with('-') => Ok(SimCommand::TraceStop {
                fmt: fmt[1..].to_string(),
            }),
            _ => Err(usage("trace_stop [-fmt]")),
        },
        "filter" => match args {
            [re] => Ok(SimCommand::Filter {
                regexp: re.to_string(),
            }),
            _ => Err(usage("filter <regexp>")),
        },
        "logfile" => match args {
            [file] => Ok(SimCommand::LogFile {
                file: file.to_string(),
            }),
            _ => Err(usage("logfile <file>")),
        },
        "help" => no_args(args, SimCommand::Help, "help"),
        "quit" => no_args(args, SimCommand::Quit, "quit"),
        other => Err(SimError::usage(format!("unknown command `{other}`"))),
    }
}

fn no_args(args: &[&str], cmd: SimCommand, name: &str) -> Result<SimCommand, SimError> {
    if args.is_empty() {
        Ok(cmd)
    } else {
        Err(SimError::usage(format!("Usage: {name}")))
    }
}

/// Holds the design and the current simulation, executing commands
/// against it.
pub struct CommandEngine {
    design: Arc<Design>,
    config: SimConfig,
    sim: Option<Simulator>,
}

impl CommandEngine {
    /// An engine with no simulation yet; `initialize` builds one.
    pub fn new(design: Arc<Design>, config: SimConfig) -> Self {
        Self {
            design,
            config,
            sim: None,
        }
    }

    /// The current simulator, if initialized.
    pub fn sim(&self) -> Option<&Simulator> {
        self.sim.as_ref()
    }

    /// The current simulator, mutably, if initialized.
    pub fn sim_mut(&mut self) -> Option<&mut Simulator> {
        self.sim.as_mut()
    }

    fn require_sim(&mut self) -> Result<&mut Simulator, SimError> {
        self.sim
            .as_mut()
            .ok_or_else(|| SimError::state_illegal("no simulation; run `initialize` first"))
    }

    /// Executes one command. Errors leave simulator state unchanged.
    pub fn execute(&mut self, cmd: &SimCommand) -> Result<CommandResult, SimError> {
        match cmd {
            SimCommand::Initialize { proc } => {
                let top = match proc {
                    Some(name) => self.design.find_proc(name).ok_or_else(|| {
                        SimError::resolution(format!("could not find process `{name}`"))
                    })?,
                    None => self.design.top,
                };
                self.sim = Some(Simulator::new(
                    Arc::clone(&self.design),
                    top,
                    &self.config,
                )?);
                let name = &self.design.procs.get(top).name;
                Ok(CommandResult::Output(format!(
                    "simulation initialized for `{name}`"
                )))
            }
            SimCommand::Step { n } => {
                let sim = self.require_sim()?;
                let remain = sim.step(*n)?;
                Ok(finish_run(sim, remain))
            }
            SimCommand::Advance { delta } => {
                let sim = self.require_sim()?;
                let remain = sim.advance(*delta)?;
                Ok(finish_run(sim, remain))
            }
            SimCommand::Cycle => {
                let sim = self.require_sim()?;
                if sim.core.queue.is_empty() {
                    return Ok(CommandResult::Output("no pending events".into()));
                }
                sim.run()?;
                let remain = !sim.core.queue.is_empty();
                Ok(finish_run(sim, remain))
            }
            SimCommand::Pending => {
                let sim = self.require_sim()?;
                if sim.core.queue.is_empty() {
                    Ok(CommandResult::Flag {
                        value: false,
                        text: "no pending events".into(),
                    })
                } else {
                    Ok(CommandResult::Output(sim.pending_report()))
                }
            }
            SimCommand::Set { name, value } => {
                self.require_sim()?.set_value(name, value)?;
                Ok(CommandResult::Output(String::new()))
            }
            SimCommand::Get { name, quiet } => {
                let sim = self.require_sim()?;
                let (value, text) = format_get(name, &sim.get_value(name)?);
                Ok(CommandResult::Int {
                    value,
                    text: if *quiet { String::new() } else { text },
                })
            }
            SimCommand::MGet { names } => {
                let sim = self.require_sim()?;
                let mut out = String::new();
                for name in names {
                    match sim.get_value(name)? {
                        SlotValue::Chan { .. } => {
                            return Err(SimError::resolution(format!(
                                "`{name}` is a channel; not currently supported"
                            )))
                        }
                        value => {
                            let (_, text) = format_get(name, &value);
                            out.push_str(&text);
                            out.push('\n');
                        }
                    }
                }
                Ok(CommandResult::Output(out))
            }
            SimCommand::ChCount { name, quiet } => {
                let sim = self.require_sim()?;
                let count = sim.chcount(name)?;
                Ok(CommandResult::Int {
                    value: BigInt::from_u64(count),
                    text: if *quiet {
                        String::new()
                    } else {
                        format!("Channel {name}: completed actions {count}")
                    },
                })
            }
            SimCommand::Assert { name, value } => {
                let expected = BigInt::parse(value)
                    .map_err(|e| SimError::type_domain(e.to_string()))?;
                let sim = self.require_sim()?;
                let held = sim.assert_value(name, &expected)?;
                if sim.core.exit_flag {
                    return Ok(CommandResult::Exit(2));
                }
                Ok(CommandResult::Flag {
                    value: held,
                    text: String::new(),
                })
            }
            SimCommand::Watch { names } => {
                let sim = self.require_sim()?;
                for name in names {
                    sim.watch_signal(name)?;
                }
                Ok(CommandResult::Output(String::new()))
            }
            SimCommand::Unwatch { names } => {
                let sim = self.require_sim()?;
                for name in names {
                    sim.unwatch_signal(name)?;
                }
                Ok(CommandResult::Output(String::new()))
            }
            SimCommand::BreakPt { name } => {
                let sim = self.require_sim()?;
                let on = sim.toggle_breakpoint(name)?;
                Ok(CommandResult::Output(format!(
                    "breakpoint {} on `{name}`",
                    if on { "set" } else { "cleared" }
                )))
            }
            SimCommand::Mode { reset } => {
                self.require_sim()?.set_reset_mode(*reset);
                Ok(CommandResult::Output(String::new()))
            }
            SimCommand::Random {
                unspecified_only,
                bounds,
            } => {
                let (min, max) = bounds.unwrap_or((DEFAULT_RANDOM_MIN, DEFAULT_RANDOM_MAX));
                let sim = self.require_sim()?;
                sim.core.timing = if *unspecified_only {
                    TimingMode::RandomUnspecified { min, max }
                } else {
                    TimingMode::Random { min, max }
                };
                Ok(CommandResult::Output(String::new()))
            }
            SimCommand::NoRandom => {
                self.require_sim()?.core.timing = TimingMode::Deterministic;
                Ok(CommandResult::Output(String::new()))
            }
            SimCommand::RandomSeed { seed } => {
                self.require_sim()?.core.reseed(*seed);
                Ok(CommandResult::Output(String::new()))
            }
            SimCommand::RandomChoice { on } => {
                self.require_sim()?.core.random_choice = *on;
                Ok(CommandResult::Output(String::new()))
            }
            SimCommand::WarnPolicySet(policy) => {
                self.require_sim()?.core.warn_policy = *policy;
                Ok(CommandResult::Output(String::new()))
            }
            SimCommand::Status { value } => {
                let sim = self.require_sim()?;
                Ok(CommandResult::Output(sim.status_report(*value)))
            }
            SimCommand::ProcInfo { inst } => {
                let sim = self.require_sim()?;
                Ok(CommandResult::Output(
                    sim.procinfo(inst.as_deref().unwrap_or(""))?,
                ))
            }
            SimCommand::Coverage { inst } => {
                let sim = self.require_sim()?;
                Ok(CommandResult::Output(
                    sim.coverage(inst.as_deref().unwrap_or(""))?,
                ))
            }
            SimCommand::Goto { inst, label } => {
                let sim = self.require_sim()?;
                sim.goto_label(inst.as_deref().unwrap_or(""), label)?;
                Ok(CommandResult::Output(String::new()))
            }
            SimCommand::GcRetry { inst } => {
                self.require_sim()?.gc_retry(inst)?;
                Ok(CommandResult::Output(String::new()))
            }
            SimCommand::SkipComm { name } => {
                let sim = self.require_sim()?;
                let side = sim.skip_comm(name)?;
                Ok(CommandResult::Output(format!(
                    "skipped pending {} on `{name}`",
                    match side {
                        SkippedSide::Sender => "send",
                        SkippedSide::Receiver => "receive",
                    }
                )))
            }
            SimCommand::Timescale { ps } => {
                self.require_sim()?.core.timescale = ps * 1e-12;
                Ok(CommandResult::Output(String::new()))
            }
            SimCommand::GetSimTime => {
                let sim = self.require_sim()?;
                let ps = sim.sim_time_ps();
                Ok(CommandResult::Float {
                    value: ps,
                    text: format!("{ps} ps"),
                })
            }
            SimCommand::GetSimITime => {
                let sim = self.require_sim()?;
                let now = sim.core.now.clone();
                let text = now.to_string();
                Ok(CommandResult::Int { value: now, text })
            }
            SimCommand::TraceStart { fmt, file } => {
                self.require_sim()?.trace_start(fmt, Path::new(file))?;
                Ok(CommandResult::Output(String::new()))
            }
            SimCommand::TraceStop { fmt } => {
                self.require_sim()?.trace_stop(fmt)?;
                Ok(CommandResult::Output(String::new()))
            }
            SimCommand::Filter { regexp } => {
                let re = regex::Regex::new(regexp)
                    .map_err(|e| SimError::usage(format!("bad filter expression: {e}")))?;
                self.require_sim()?.core.watch.set_filter(Some(re));
                Ok(CommandResult::Output(String::new()))
            }
            SimCommand::LogFile { file } => {
                let f = std::fs::File::create(file)?;
                self.require_sim()?.core.watch.set_logfile(f);
                Ok(CommandResult::Output(String::new()))
            }
            SimCommand::Help => Ok(CommandResult::Output(help_text())),
            SimCommand::Quit => Ok(CommandResult::Quit),
        }
    }

    /// The interactive prompt loop. Returns the process exit code.
    pub fn run_repl<R: BufRead, W: Write>(
        &mut self,
        input: &mut R,
        output: &mut W,
    ) -> Result<i32, SimError> {
        writeln!(output, "axon asynchronous-circuit simulator")?;
        writeln!(output, "Type `help` for available commands.")?;
        let mut line = String::new();
        loop {
            write!(output, "axon> ")?;
            output.flush()?;
            line.clear();
            if input.read_line(&mut line)? == 0 {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let result = parse_command(trimmed).and_then(|cmd| self.execute(&cmd));
            match result {
                Ok(CommandResult::Quit) => return Ok(0),
                Ok(CommandResult::Exit(code)) => {
                    writeln!(output, "exiting on warning")?;
                    return Ok(code);
                }
                Ok(CommandResult::Output(text))
                | Ok(CommandResult::Int { text, .. })
                | Ok(CommandResult::Float { text, .. })
                | Ok(CommandResult::Flag { text, .. }) => {
                    let text = text.trim_end();
                    if !text.is_empty() {
                        writeln!(output, "{text}")?;
                    }
                }
                Err(e @ SimError::Fatal(_)) => return Err(e),
                Err(e) => writeln!(output, "Error: {e}")?,
            }
            if let Some(sim) = &self.sim {
                if sim.core.interrupted() {
                    writeln!(output, " *** interrupted")?;
                    sim.core.clear_interrupt();
                }
            }
        }
        Ok(0)
    }
}

/// Converts run-loop completion into a result, honoring `exit-on-warn`.
fn finish_run(sim: &Simulator, events_remain: bool) -> CommandResult {
    if sim.core.exit_flag {
        CommandResult::Exit(2)
    } else {
        CommandResult::Flag {
            value: events_remain,
            text: String::new(),
        }
    }
}

/// Formats a `get` result as `(integer value, display text)`.
fn format_get(name: &str, value: &SlotValue) -> (BigInt, String) {
    match value {
        SlotValue::Bool(t) => {
            let code = match t {
                Tri::Zero => 0,
                Tri::One => 1,
                Tri::X => 2,
            };
            (BigInt::from_u64(code), format!("{name}: {t}"))
        }
        SlotValue::Int(v) => (v.clone(), format!("{name}: {v}  (0x{v:x})")),
        SlotValue::Chan { code, label, .. } => {
            (BigInt::from_u64(*code), format!("{name}: {label}"))
        }
    }
}

fn help_text() -> String {
    "\
Initialization and setup:
  initialize [<proc>]        reset and build the simulation
  mode reset|run             set the dispatch mode
  random [-u] [min max]      randomize timings (-u: unspecified only)
  norandom                   deterministic timing
  random_seed <val>          set the random seed
  random_choice on|off       randomize non-deterministic choices

Running:
  step [n]                   dispatch up to n events
  advance <delay>            run for <delay> ticks
  cycle                      run until the simulation stops
  pending                    dump pending events

State:
  set <name> <val>           set a Boolean or integer
  get <name> [#f]            read a value
  mget <n1> <n2> ...         read several values
  chcount <ch> [#f]          completed actions on a channel
  assert <name> <val>        compare a value against an expectation
  status 0|1|X               list nodes with the given value

Watchpoints and tracing:
  watch / unwatch <n1> ...   add or remove watchpoints
  breakpt <n>                toggle a breakpoint
  vcd_start|vcd_stop <file>  VCD trace of watched signals
  lxt2_start|lxt2_stop       compressed trace of watched signals
  trace_start [-fmt] <file>  trace in a named format
  filter <regexp>            restrict log lines
  logfile <file>             redirect the log

Warnings:
  break-on-warn | exit-on-warn | resume-on-warn

Process surgery:
  gc-retry <inst>            re-try guards in a deadlocked process
  skip-comm <ch>             drop a pending channel action
  goto [<inst>] <label>      jump a single-threaded process
  procinfo [<inst>]          dump program counters
  coverage [<inst>]          dump guard coverage

Time:
  timescale <t>              display timescale in picoseconds
  get_sim_time               current time in picoseconds
  get_sim_itime              current integer time

  help                       this text
  quit                       leave the simulator"
        .to_string()
}
