//! Watchpoint and breakpoint registries plus the log sink.
//!
//! Both registries are keyed by `(slot class, global offset)`. Every
//! observed mutation of a watched slot with a changed value produces one
//! time-stamped log line; writes that leave the value unchanged are
//! suppressed. Breakpoint entries additionally raise the kernel's break
//! flag so the run loop stops at the next dispatch boundary. Log lines can
//! be filtered by a regular expression and redirected to a file.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};

use axon_common::BigInt;
use axon_ir::SlotClass;
use regex::Regex;

/// One watched signal.
#[derive(Debug, Clone)]
pub struct WatchEntry {
    /// The name the user registered (echoed in log lines).
    pub name: String,
    /// Whether a change also trips the breakpoint flag.
    pub breakpoint: bool,
}

/// Where log lines go.
pub enum LogSink {
    /// Standard output.
    Stdout,
    /// A log file (`logfile <file>`).
    File(BufWriter<File>),
    /// An in-memory buffer, used by tests.
    Memory(Vec<u8>),
}

impl LogSink {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        match self {
            LogSink::Stdout => {
                let mut out = io::stdout().lock();
                writeln!(out, "{line}")
            }
            LogSink::File(w) => {
                writeln!(w, "{line}")?;
                w.flush()
            }
            LogSink::Memory(buf) => writeln!(buf, "{line}"),
        }
    }
}

/// Watch/breakpoint registry and log-line fanout.
pub struct WatchBreak {
    entries: HashMap<(SlotClass, usize), WatchEntry>,
    filter: Option<Regex>,
    sink: LogSink,
}

impl Default for WatchBreak {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchBreak {
    /// An empty registry logging to stdout.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            filter: None,
            sink: LogSink::Stdout,
        }
    }

    /// An empty registry logging to memory (tests).
    pub fn in_memory() -> Self {
        Self {
            entries: HashMap::new(),
            filter: None,
            sink: LogSink::Memory(Vec::new()),
        }
    }

    /// Registers a watchpoint. An existing entry keeps its breakpoint
    /// flag.
    pub fn watch(&mut self, class: SlotClass, offset: usize, name: &str) {
        self.entries
            .entry((class, offset))
            .or_insert_with(|| WatchEntry {
                name: String::new(),
                breakpoint: false,
            })
            .name = name.to_string();
    }

    /// Removes a watchpoint (and its breakpoint flag). Returns whether an
    /// entry existed.
    pub fn unwatch(&mut self, class: SlotClass, offset: usize) -> bool {
        self.entries.remove(&(class, offset)).is_some()
    }

    /// Toggles the breakpoint flag, creating the watch entry if needed.
    /// Returns the new breakpoint state.
    pub fn toggle_breakpoint(&mut self, class: SlotClass, offset: usize, name: &str) -> bool {
        let entry = self
            .entries
            .entry((class, offset))
            .or_insert_with(|| WatchEntry {
                name: name.to_string(),
                breakpoint: false,
            });
        entry.breakpoint = !entry.breakpoint;
        entry.breakpoint
    }

    /// The entry watching a slot, if any.
    pub fn entry(&self, class: SlotClass, offset: usize) -> Option<&WatchEntry> {
        self.entries.get(&(class, offset))
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All watched slots, sorted for deterministic iteration.
    pub fn watched(&self) -> Vec<(SlotClass, usize, String)> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|(&(class, off), e)| (class, off, e.name.clone()))
            .collect();
        all.sort_by(|a, b| (a.0 as usize, a.1).cmp(&(b.0 as usize, b.1)));
        all
    }

    /// Restricts watch log lines to names matching the expression.
    pub fn set_filter(&mut self, filter: Option<Regex>) {
        self.filter = filter;
    }

    /// Redirects log output to a file.
    pub fn set_logfile(&mut self, file: File) {
        self.sink = LogSink::File(BufWriter::new(file));
    }

    /// Restores logging to stdout.
    pub fn log_to_stdout(&mut self) {
        self.sink = LogSink::Stdout;
    }

    /// Drains the in-memory sink (tests).
    pub fn take_memory(&mut self) -> String {
        match &mut self.sink {
            LogSink::Memory(buf) => String::from_utf8_lossy(&std::mem::take(buf)).into_owned(),
            _ => String::new(),
        }
    }

    /// Emits one `name := value` line for a watched mutation.
    pub fn log_change(
        &mut self,
        now: &BigInt,
        cause: &str,
        name: &str,
        value: &str,
    ) -> io::Result<()> {
        if let Some(re) = &self.filter {
            if !re.is_match(name) {
                return Ok(());
            }
        }
        let line = format!("[{:>20}] <[{cause}]> {name} := {value}", now.to_string());
        self.sink.write_line(&line)
    }

    /// Emits a warning line; warnings bypass the name filter.
    pub fn log_warning(&mut self, msg: &str) -> io::Result<()> {
        self.sink.write_line(&format!("WARNING: {msg}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_unwatch_roundtrip() {
        let mut wb = WatchBreak::new();
        wb.watch(SlotClass::Bool, 3, "top.n");
        assert!(wb.entry(SlotClass::Bool, 3).is_some());
        assert!(wb.unwatch(SlotClass::Bool, 3));
        assert!(wb.entry(SlotClass::Bool, 3).is_none());
        assert!(!wb.unwatch(SlotClass::Bool, 3));
        assert!(wb.is_empty());
    }

    #[test]
    fn toggle_breakpoint_creates_entry() {
        let mut wb = WatchBreak::new();
        assert!(wb.toggle_breakpoint(SlotClass::Bool, 0, "top.n"));
        assert!(wb.entry(SlotClass::Bool, 0).unwrap().breakpoint);
        assert!(!wb.toggle_breakpoint(SlotClass::Bool, 0, "top.n"));
        assert!(!wb.entry(SlotClass::Bool, 0).unwrap().breakpoint);
    }

    #[test]
    fn watch_preserves_breakpoint_flag() {
        let mut wb = WatchBreak::new();
        wb.toggle_breakpoint(SlotClass::Int, 1, "top.x");
        wb.watch(SlotClass::Int, 1, "top.x");
        assert!(wb.entry(SlotClass::Int, 1).unwrap().breakpoint);
    }

    #[test]
    fn classes_keyed_separately() {
        let mut wb = WatchBreak::new();
        wb.watch(SlotClass::Bool, 0, "b");
        assert!(wb.entry(SlotClass::Int, 0).is_none());
    }

    #[test]
    fn log_line_format() {
        let mut wb = WatchBreak::in_memory();
        wb.log_change(&BigInt::from_u64(42), "env", "top.n", "1")
            .unwrap();
        let out = wb.take_memory();
        assert_eq!(
            out,
            format!("[{:>20}] <[env]> top.n := 1\n", "42")
        );
    }

    #[test]
    fn filter_suppresses_nonmatching() {
        let mut wb = WatchBreak::in_memory();
        wb.set_filter(Some(Regex::new("^top\\.a").unwrap()));
        wb.log_change(&BigInt::zero(), "env", "top.a.x", "1").unwrap();
        wb.log_change(&BigInt::zero(), "env", "top.b.x", "1").unwrap();
        let out = wb.take_memory();
        assert!(out.contains("top.a.x"));
        assert!(!out.contains("top.b.x"));
    }

    #[test]
    fn warnings_bypass_filter() {
        let mut wb = WatchBreak::in_memory();
        wb.set_filter(Some(Regex::new("^nothing$").unwrap()));
        wb.log_warning("interference on `n`").unwrap();
        assert!(wb.take_memory().contains("WARNING: interference"));
    }

    #[test]
    fn watched_is_sorted() {
        let mut wb = WatchBreak::new();
        wb.watch(SlotClass::Int, 2, "x2");
        wb.watch(SlotClass::Bool, 5, "b5");
        wb.watch(SlotClass::Bool, 1, "b1");
        let names: Vec<String> = wb.watched().into_iter().map(|(_, _, n)| n).collect();
        assert_eq!(names, vec!["b1", "b5", "x2"]);
    }
}
