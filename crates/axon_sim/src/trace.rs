//! Trace emission: backend registry and the built-in writers.
//!
//! A trace backend registers under a short format name (`vcd`, `lxt2`).
//! Opening a trace takes the watched-signal list and the display
//! timescale; the kernel then calls [`TraceRegistry::emit_all`] on every
//! mutation of a watched signal during dispatch. The `vcd` backend writes
//! IEEE 1364 value-change-dump text; the `lxt2` backend writes the same
//! change stream gzip-compressed.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use axon_common::{BigInt, Tri};
use axon_ir::SlotClass;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::SimError;

/// A signal registered with a trace backend at open time.
#[derive(Debug, Clone)]
pub struct TraceSignal {
    /// Slot class.
    pub class: SlotClass,
    /// Global offset within the class.
    pub offset: usize,
    /// Display name.
    pub name: String,
    /// Bit width (1 for Booleans).
    pub width: u32,
}

/// A value handed to a backend on mutation.
#[derive(Debug, Clone, Copy)]
pub enum TraceValue<'a> {
    /// A ternary node value.
    Bool(Tri),
    /// An integer or channel-data value.
    Int(&'a BigInt),
}

/// An open trace file.
pub trait TraceWriter {
    /// Records a value change of a registered signal.
    fn emit(
        &mut self,
        time: &BigInt,
        class: SlotClass,
        offset: usize,
        value: TraceValue<'_>,
    ) -> Result<(), SimError>;

    /// Flushes and finalizes the output.
    fn close(&mut self) -> Result<(), SimError>;
}

/// Opens a trace file for a backend.
pub type TraceOpenFn =
    fn(&Path, f64, &[TraceSignal]) -> Result<Box<dyn TraceWriter>, SimError>;

/// The set of known backends and the currently open traces.
pub struct TraceRegistry {
    formats: Vec<(String, TraceOpenFn)>,
    active: Vec<(String, Box<dyn TraceWriter>)>,
}

impl Default for TraceRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl TraceRegistry {
    /// A registry with the built-in `vcd` and `lxt2` backends.
    pub fn with_builtin() -> Self {
        let mut reg = Self {
            formats: Vec::new(),
            active: Vec::new(),
        };
        reg.register("vcd", open_vcd);
        reg.register("lxt2", open_lxt2);
        reg
    }

    /// Registers (or replaces) a backend under a short name.
    pub fn register(&mut self, name: &str, open: TraceOpenFn) {
        if let Some(slot) = self.formats.iter_mut().find(|(n, _)| n == name) {
            slot.1 = open;
        } else {
            self.formats.push((name.to_string(), open));
        }
    }

    /// Whether a backend with this name exists.
    pub fn knows(&self, name: &str) -> bool {
        self.formats.iter().any(|(n, _)| n == name)
    }

    /// Whether a trace of this format is currently open.
    pub fn is_active(&self, name: &str) -> bool {
        self.active.iter().any(|(n, _)| n == name)
    }

    /// Opens a trace, closing any current one of the same format first.
    pub fn start(
        &mut self,
        name: &str,
        path: &Path,
        timescale: f64,
        signals: &[TraceSignal],
    ) -> Result<(), SimError> {
        let open = self
            .formats
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| *f)
            .ok_or_else(|| {
                SimError::resolution(format!("no trace format `{name}` is registered"))
            })?;
        if self.is_active(name) {
            self.stop(name)?;
        }
        let writer = open(path, timescale, signals)?;
        self.active.push((name.to_string(), writer));
        Ok(())
    }

    /// Closes the open trace of the given format.
    pub fn stop(&mut self, name: &str) -> Result<(), SimError> {
        let pos = self
            .active
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| {
                SimError::state_illegal(format!("no current `{name}` trace file"))
            })?;
        let (_, mut writer) = self.active.remove(pos);
        writer.close()
    }

    /// Forwards a mutation to every open trace.
    pub fn emit_all(
        &mut self,
        time: &BigInt,
        class: SlotClass,
        offset: usize,
        value: TraceValue<'_>,
    ) -> Result<(), SimError> {
        for (_, writer) in &mut self.active {
            writer.emit(time, class, offset, value)?;
        }
        Ok(())
    }

    /// Whether any trace is open (fast path for the mutation hook).
    pub fn any_active(&self) -> bool {
        !self.active.is_empty()
    }
}

fn open_vcd(
    path: &Path,
    timescale: f64,
    signals: &[TraceSignal],
) -> Result<Box<dyn TraceWriter>, SimError> {
    let file = BufWriter::new(File::create(path)?);
    Ok(Box::new(VcdTrace::new(file, timescale, signals)?))
}

fn open_lxt2(
    path: &Path,
    timescale: f64,
    signals: &[TraceSignal],
) -> Result<Box<dyn TraceWriter>, SimError> {
    let file = GzEncoder::new(BufWriter::new(File::create(path)?), Compression::default());
    Ok(Box::new(VcdTrace::new(file, timescale, signals)?))
}

/// Value-change-dump writer over any byte sink.
///
/// Signal identifier codes use printable ASCII starting from `!` (0x21),
/// with multi-character codes past 94 signals.
pub struct VcdTrace<W: Write> {
    writer: W,
    codes: HashMap<(SlotClass, usize), (String, u32)>,
    last_time: Option<BigInt>,
}

impl<W: Write> VcdTrace<W> {
    /// Writes the VCD header and variable declarations.
    pub fn new(mut writer: W, timescale: f64, signals: &[TraceSignal]) -> Result<Self, SimError> {
        writeln!(writer, "$version")?;
        writeln!(writer, "  axon circuit simulator")?;
        writeln!(writer, "$end")?;
        writeln!(writer, "$timescale")?;
        writeln!(writer, "  {} $end", format_timescale(timescale))?;
        writeln!(writer, "$scope module axon $end")?;
        let mut codes = HashMap::new();
        for (i, sig) in signals.iter().enumerate() {
            let code = make_id_code(i as u32);
            writeln!(
                writer,
                "$var wire {} {} {} $end",
                sig.width.max(1),
                code,
                sig.name
            )?;
            codes.insert((sig.class, sig.offset), (code, sig.width.max(1)));
        }
        writeln!(writer, "$upscope $end")?;
        writeln!(writer, "$enddefinitions $end")?;
        writeln!(writer, "$dumpvars")?;
        Ok(Self {
            writer,
            codes,
            last_time: None,
        })
    }

    /// The underlying writer (tests).
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TraceWriter for VcdTrace<W> {
    fn emit(
        &mut self,
        time: &BigInt,
        class: SlotClass,
        offset: usize,
        value: TraceValue<'_>,
    ) -> Result<(), SimError> {
        let Some((code, width)) = self.codes.get(&(class, offset)) else {
            return Ok(());
        };
        if self.last_time.as_ref() != Some(time) {
            writeln!(self.writer, "#{time}")?;
            self.last_time = Some(time.clone());
        }
        match value {
            TraceValue::Bool(t) => {
                let c = match t {
                    Tri::Zero => '0',
                    Tri::One => '1',
                    Tri::X => 'x',
                };
                writeln!(self.writer, "{c}{code}")?;
            }
            TraceValue::Int(v) => {
                let mut bits = String::with_capacity(*width as usize);
                for i in (0..*width).rev() {
                    bits.push(if v.bit(i) { '1' } else { '0' });
                }
                writeln!(self.writer, "b{bits} {code}")?;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SimError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// VCD identifier code for a sequential index.
fn make_id_code(index: u32) -> String {
    let mut result = String::new();
    let mut idx = index;
    loop {
        result.push((b'!' + (idx % 94) as u8) as char);
        idx /= 94;
        if idx == 0 {
            break;
        }
        idx -= 1;
    }
    result
}

/// Renders a seconds-per-tick timescale as a VCD unit string.
fn format_timescale(seconds: f64) -> String {
    const UNITS: [(f64, &str); 5] = [
        (1e-15, "fs"),
        (1e-12, "ps"),
        (1e-9, "ns"),
        (1e-6, "us"),
        (1e-3, "ms"),
    ];
    for (scale, unit) in UNITS.iter().rev() {
        let in_unit = seconds / scale;
        if in_unit >= 1.0 && (in_unit - in_unit.round()).abs() < 1e-9 {
            return format!("{} {unit}", in_unit.round() as u64);
        }
    }
    "1 ps".to_string()
}
