//! Synthetic frame descriptors.
//!
//! Natively compiled code has no bytecode the host could map back to source
//! lines, so every compiled method, block, class body and exception region
//! gets a descriptor with one line entry and one placeholder `nop` per source
//! line. The host's backtrace, debugger and coverage machinery resolve program
//! counters through that table exactly as they would for interpreted code.
//! The placeholders are never executed.
use std::fmt;

use log::{debug, trace};

use crate::{Error, Host, Result, SymbolId, Value, Visitable, Visitor};

/// Name of the single local a rescue or ensure frame binds: the exception
/// currently being handled.
pub const EXCEPTION_LOCAL: &str = "#$!";

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Top,
    Method,
    Block,
    Class,
    Rescue,
    Ensure,
    Eval,
    Main,
    Plain,
    DefinedGuard,
}

impl FrameKind {
    pub const COUNT: usize = 10;

    /// Rescue and ensure frames bind the exception being handled.
    pub fn binds_exception(self) -> bool {
        matches!(self, FrameKind::Rescue | FrameKind::Ensure)
    }

    pub fn name(self) -> &'static str {
        match self {
            FrameKind::Top => "top",
            FrameKind::Method => "method",
            FrameKind::Block => "block",
            FrameKind::Class => "class",
            FrameKind::Rescue => "rescue",
            FrameKind::Ensure => "ensure",
            FrameKind::Eval => "eval",
            FrameKind::Main => "main",
            FrameKind::Plain => "plain",
            FrameKind::DefinedGuard => "defined_guard",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LineInfo {
    pub line: u32,
}

/// Instruction slot of a synthesized frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Insn {
    Nop,
}

/// Program-counter to source-line mapping of a frame.
///
/// `entries[i]` describes the instruction at `positions[i]`; `insns` holds
/// the instruction slots themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineTable {
    pub entries: Vec<LineInfo>,
    pub positions: Vec<u32>,
    pub insns: Vec<Insn>,
}

impl LineTable {
    /// One entry and one `nop` per line in `start..=end`.
    /// Even a frame on a single line gets one entry.
    pub fn spanning(start: u32, end: u32) -> Self {
        let len = end.saturating_sub(start) as usize + 1;
        let mut table = Self {
            entries: Vec::with_capacity(len),
            positions: Vec::with_capacity(len),
            insns: Vec::with_capacity(len),
        };
        for (pc, line) in (start..=end).enumerate() {
            table.entries.push(LineInfo { line });
            table.positions.push(pc as u32);
            table.insns.push(Insn::Nop);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Source line of the instruction at `pc`. A pc past the last position
    /// resolves to the last line.
    pub fn line_for_pc(&self, pc: usize) -> Option<u32> {
        let Ok(pc) = u32::try_from(pc) else {
            return self.last_line();
        };
        let index = match self.positions.binary_search(&pc) {
            Ok(index) => index,
            Err(index) => index.checked_sub(1)?,
        };
        self.entries.get(index).map(|entry| entry.line)
    }

    pub fn first_line(&self) -> Option<u32> {
        self.entries.first().map(|entry| entry.line)
    }

    pub fn last_line(&self) -> Option<u32> {
        self.entries.last().map(|entry| entry.line)
    }
}

/// Identity of a frame, everything the host needs to construct it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub name: Value,
    pub qualified: SymbolId,
    pub path: Value,
    pub real_path: Value,
    /// Structural link for backtrace walks. Does not keep the parent alive.
    pub parent: Option<Value>,
    pub kind: FrameKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub header: FrameHeader,
    pub lines: LineTable,
    pub locals: Vec<SymbolId>,
    pub stack_max: usize,
}

impl FrameDescriptor {
    pub fn new(header: FrameHeader) -> Self {
        Self {
            header,
            lines: LineTable::default(),
            locals: Vec::new(),
            stack_max: 0,
        }
    }

    pub fn kind(&self) -> FrameKind {
        self.header.kind
    }

    pub fn parent(&self) -> Option<Value> {
        self.header.parent
    }
}

impl Visitable for FrameDescriptor {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        // the parent link is structural only
        visitor.visit(self.header.name);
        visitor.visit(self.header.path);
        visitor.visit(self.header.real_path);
    }
}

/// Arguments of [`allocate_frame`].
#[derive(Debug, Clone)]
pub struct FrameCreateInfo<'a> {
    pub name: Value,
    pub qualified: SymbolId,
    pub path: Value,
    pub real_path: Value,
    pub parent: Option<Value>,
    pub kind: FrameKind,
    pub start_line: u32,
    pub end_line: u32,
    pub locals: &'a [SymbolId],
    pub stack_max: usize,
}

impl<'a> FrameCreateInfo<'a> {
    pub fn new(
        kind: FrameKind,
        name: Value,
        qualified: SymbolId,
        path: Value,
        real_path: Value,
        lines: std::ops::RangeInclusive<u32>,
    ) -> Self {
        Self {
            name,
            qualified,
            path,
            real_path,
            parent: None,
            kind,
            start_line: *lines.start(),
            end_line: *lines.end(),
            locals: &[],
            stack_max: 0,
        }
    }

    pub fn with_parent(mut self, parent: Value) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_locals(mut self, locals: &'a [SymbolId]) -> Self {
        self.locals = locals;
        self
    }

    pub fn with_stack_max(mut self, stack_max: usize) -> Self {
        self.stack_max = stack_max;
        self
    }

    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            name: self.name,
            qualified: self.qualified,
            path: self.path,
            real_path: self.real_path,
            parent: self.parent,
            kind: self.kind,
        }
    }

    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) as usize + 1
    }
}

/// Build a frame descriptor and register it as a permanent root.
///
/// The name and path values must be kept alive by the caller until this
/// returns; afterwards the frame holds on to them.
pub fn allocate_frame<H: Host>(
    host: &mut H,
    info: &FrameCreateInfo<'_>,
) -> Result<Value> {
    if info.end_line < info.start_line {
        let name = host.render(info.name);
        return Err(Error::Runtime(format!(
            "invalid line range {}..{} for frame {}",
            info.start_line, info.end_line, name
        )));
    }

    let frame = host.construct_frame(info.header());
    // permanent, frames are never reclaimed
    host.register_root(frame);

    host.set_line_table(
        frame,
        LineTable::spanning(info.start_line, info.end_line),
    );

    if info.kind.binds_exception() {
        let exception = host.intern(EXCEPTION_LOCAL);
        host.set_local_table(frame, vec![exception]);
    } else if info.kind == FrameKind::Method && !info.locals.is_empty() {
        host.set_local_table(frame, info.locals.to_vec());
    }

    host.set_stack_max(frame, info.stack_max);

    trace!(
        "allocated {} frame {:?} for lines {}..={}",
        info.kind,
        frame,
        info.start_line,
        info.end_line
    );
    Ok(frame)
}

/// Counts of every frame synthesized so far. Frames are never reclaimed, so
/// this is also the amount of frame memory pinned for the life of the host.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrameRegistry {
    by_kind: [usize; FrameKind::COUNT],
    lines: usize,
}

impl FrameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: FrameKind, lines: usize) {
        self.by_kind[kind as usize] += 1;
        self.lines += lines;
        debug!(
            "registered {kind} frame, {} frames / {} lines pinned",
            self.frames(),
            self.lines
        );
    }

    pub fn frames(&self) -> usize {
        self.by_kind.iter().sum()
    }

    pub fn frames_of(&self, kind: FrameKind) -> usize {
        self.by_kind[kind as usize]
    }

    pub fn lines(&self) -> usize {
        self.lines
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktraceEntry {
    pub label: String,
    pub path: String,
    pub line: u32,
}

impl fmt::Display for BacktraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:in '{}'", self.path, self.line, self.label)
    }
}

/// Walk the parent chain starting at `frame`, innermost first.
///
/// The innermost entry reports the line `pc` maps to, enclosing frames
/// report their first line.
pub fn backtrace<H: Host>(
    host: &H,
    frame: Value,
    pc: usize,
) -> Vec<BacktraceEntry> {
    let mut entries = Vec::new();
    let mut current = Some(frame);

    while let Some(value) = current {
        let Some(descriptor) = host.frame(value) else {
            break;
        };
        let line = if entries.is_empty() {
            descriptor.lines.line_for_pc(pc)
        } else {
            descriptor.lines.first_line()
        };
        let header = descriptor.header;
        let path = if header.real_path.is_nil() {
            header.path
        } else {
            header.real_path
        };

        entries.push(BacktraceEntry {
            label: text_of(host, header.name),
            path: text_of(host, path),
            line: line.unwrap_or(0),
        });
        current = header.parent;
    }

    entries
}

fn text_of<H: Host>(host: &H, value: Value) -> String {
    match host.string_value(value) {
        Some(text) => text.to_owned(),
        None => host.inspect(value),
    }
}
