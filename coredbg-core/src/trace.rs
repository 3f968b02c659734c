//! Per-instruction trace records and the text rendering used by trace
//! files: `step: pc: mnemonic` with indented register and memory side
//! effects.

use std::collections::VecDeque;
use std::fmt::Write as _;

/// One memory side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemTrace {
    /// `true` for stores.
    pub write: bool,
    /// Byte address.
    pub addr: u64,
    /// Access width in bytes.
    pub size: u8,
    /// Data moved.
    pub data: u64,
}

/// Everything one instruction did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    /// Step counter value at commit.
    pub step: u64,
    /// Fetch address.
    pub pc: u64,
    /// Raw instruction word (low half only for 16-bit encodings).
    pub raw: u32,
    /// Encoding length in bytes.
    pub len: u8,
    /// Rendered mnemonic.
    pub mnemonic: String,
    /// Register commits as (name, old, new).
    pub reg_writes: Vec<(String, u64, u64)>,
    /// Memory operations in program order.
    pub mem_ops: Vec<MemTrace>,
}

impl TraceRecord {
    /// Render in the trace-file format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}: {:08x}: {}", self.step, self.pc, self.mnemonic);
        for (name, old, new) in &self.reg_writes {
            let _ = writeln!(out, "    {name} {old:016x} => {new:016x}");
        }
        for m in &self.mem_ops {
            let dir = if m.write { "wr" } else { "rd" };
            let _ = writeln!(out, "    [{:08x}] {dir}{} {:x}", m.addr, m.size, m.data);
        }
        out
    }
}

/// Bounded ring of the most recent records.
#[derive(Debug, Default)]
pub struct TraceBuffer {
    records: VecDeque<TraceRecord>,
    depth: usize,
}

impl TraceBuffer {
    /// Buffer keeping the last `depth` records; zero disables tracing.
    pub fn new(depth: usize) -> Self {
        Self { records: VecDeque::with_capacity(depth.min(4096)), depth }
    }

    /// `true` when records are being collected.
    pub fn enabled(&self) -> bool {
        self.depth > 0
    }

    /// Append one record, evicting the oldest beyond the depth.
    pub fn push(&mut self, record: TraceRecord) {
        if self.depth == 0 {
            return;
        }
        if self.records.len() == self.depth {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Most recent record, if any.
    pub fn last(&self) -> Option<&TraceRecord> {
        self.records.back()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &TraceRecord> {
        self.records.iter()
    }

    /// Render the whole buffer as trace-file text.
    pub fn render(&self) -> String {
        self.records.iter().map(TraceRecord::render).collect()
    }

    /// Write the buffer to a trace file (or any sink).
    pub fn write_to(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        for record in &self.records {
            out.write_all(record.render().as_bytes())?;
        }
        Ok(())
    }
}

/// Call/return edges recorded for the `stack` command.
///
/// Each entry is (from_pc, to_pc); returns pop the matching call instead
/// of growing the buffer without bound.
#[derive(Debug, Default)]
pub struct StackTraceBuffer {
    entries: Vec<(u64, u64)>,
}

impl StackTraceBuffer {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a call edge.
    pub fn push_call(&mut self, from_pc: u64, to_pc: u64) {
        if self.entries.len() < 4096 {
            self.entries.push((from_pc, to_pc));
        }
    }

    /// Record a return: drops the innermost call.
    pub fn pop_return(&mut self) {
        self.entries.pop();
    }

    /// Innermost-first listing of up to `max` entries.
    pub fn entries(&self, max: usize) -> Vec<(u64, u64)> {
        self.entries.iter().rev().take(max).copied().collect()
    }

    /// Forget everything (on reset).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
