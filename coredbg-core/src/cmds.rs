//! Handlers for the debugger's command surface: `br`, `stack`, `disas`,
//! `reg`. They return typed values; presentation belongs to the shell.

use coredbg_bus::MemoryBus;

use crate::breakpoints::BreakpointKind;
use crate::config::CoreIsa;
use crate::disas_svc::{disassemble, DisasLine};
use crate::riscv::RiscvCore;
use crate::SimContext;

/// Command-level failures reported back to the shell.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Symbol name not present in the table.
    #[error("symbol {0:?} not found")]
    UnknownSymbol(String),
    /// Argument is neither an address nor a known symbol.
    #[error("cannot resolve {0:?} to an address")]
    BadAddress(String),
    /// No breakpoint at the given location.
    #[error("no breakpoint at {0:#x}")]
    NoBreakpoint(u64),
    /// Register name not recognized.
    #[error("unknown register {0:?}")]
    UnknownRegister(String),
    /// The underlying memory access failed.
    #[error(transparent)]
    Bus(#[from] coredbg_bus::BusError),
}

/// One row of `br` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrEntry {
    /// Breakpoint address.
    pub addr: u64,
    /// `true` for hardware breakpoints.
    pub hw: bool,
    /// Symbol covering the address, when known.
    pub symbol: Option<String>,
}

/// One row of `stack` output: a call edge with resolved symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEntry {
    /// Call-site PC.
    pub from_pc: u64,
    /// Symbol and offset of the call site.
    pub from_sym: Option<(String, u64)>,
    /// Call target PC.
    pub to_pc: u64,
    /// Symbol and offset of the target.
    pub to_sym: Option<(String, u64)>,
}

/// Resolve a user-supplied location: `0x` hex, bare hex, or a (possibly
/// quoted) symbol name.
pub fn resolve_location<B: MemoryBus>(
    ctx: &SimContext<B>,
    spec: &str,
) -> Result<u64, CommandError> {
    let trimmed = spec.trim_matches('\'');
    let hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if let Ok(addr) = u64::from_str_radix(hex, 16) {
        return Ok(addr);
    }
    let symbols = ctx.symbols.read().expect("symbol lock");
    if let Some(sym) = symbols.by_name(trimmed) {
        return Ok(sym.addr);
    }
    if trimmed != spec {
        // The argument was quoted: it can only name a symbol.
        return Err(CommandError::UnknownSymbol(trimmed.to_string()));
    }
    Err(CommandError::BadAddress(spec.to_string()))
}

/// `br` — list breakpoints.
pub fn cmd_br_list<B: MemoryBus>(ctx: &SimContext<B>) -> Vec<BrEntry> {
    let symbols = ctx.symbols.read().expect("symbol lock");
    ctx.breakpoints
        .lock()
        .expect("breakpoint lock")
        .iter()
        .map(|bp| BrEntry {
            addr: bp.addr,
            hw: bp.kind == BreakpointKind::Hardware,
            symbol: symbols.by_addr(bp.addr).map(|(s, _)| s.name.clone()),
        })
        .collect()
}

/// `br add <loc> [hw]` — set a breakpoint.
pub fn cmd_br_add<B: MemoryBus>(
    ctx: &SimContext<B>,
    spec: &str,
    hw: bool,
) -> Result<u64, CommandError> {
    let addr = resolve_location(ctx, spec)?;
    let kind = if hw { BreakpointKind::Hardware } else { BreakpointKind::Software };
    ctx.breakpoints
        .lock()
        .expect("breakpoint lock")
        .add(ctx.bus.as_ref(), addr, kind, |word| if word & 3 == 3 { 4 } else { 2 })?;
    Ok(addr)
}

/// `br rm <loc>` — remove a breakpoint.
pub fn cmd_br_rm<B: MemoryBus>(ctx: &SimContext<B>, spec: &str) -> Result<(), CommandError> {
    let addr = resolve_location(ctx, spec)?;
    let removed = ctx
        .breakpoints
        .lock()
        .expect("breakpoint lock")
        .remove(ctx.bus.as_ref(), addr)?;
    if removed {
        Ok(())
    } else {
        Err(CommandError::NoBreakpoint(addr))
    }
}

/// `stack [N]` — most recent call edges, innermost first.
pub fn cmd_stack<B: MemoryBus>(core: &RiscvCore<B>, max: usize) -> Vec<StackEntry> {
    let ctx = core.context();
    let symbols = ctx.symbols.read().expect("symbol lock");
    let lookup = |pc: u64| symbols.by_addr(pc).map(|(s, off)| (s.name.clone(), off));
    core.stack_trace()
        .entries(max)
        .into_iter()
        .map(|(from_pc, to_pc)| StackEntry {
            from_pc,
            from_sym: lookup(from_pc),
            to_pc,
            to_sym: lookup(to_pc),
        })
        .collect()
}

/// `disas <addr> <bytes>`.
pub fn cmd_disas<B: MemoryBus>(
    ctx: &SimContext<B>,
    isa: CoreIsa,
    spec: &str,
    bytes: u64,
) -> Result<Vec<DisasLine>, CommandError> {
    let addr = resolve_location(ctx, spec)?;
    Ok(disassemble(ctx, isa, addr, bytes))
}

/// `reg <name>` — read a register on the selected hart.
pub fn cmd_reg_read<B: MemoryBus>(core: &RiscvCore<B>, name: &str) -> Result<u64, CommandError> {
    core.reg_by_name(name)
        .ok_or_else(|| CommandError::UnknownRegister(name.to_string()))
}

/// `reg <name> <value>` — write a register on the selected hart.
pub fn cmd_reg_write<B: MemoryBus>(
    core: &mut RiscvCore<B>,
    name: &str,
    value: u64,
) -> Result<(), CommandError> {
    if core.write_reg_by_name(name, value) {
        Ok(())
    } else {
        Err(CommandError::UnknownRegister(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use coredbg_bus::SramModel;
    use std::sync::Arc;

    fn setup() -> (SimContext<SramModel>, RiscvCore<SramModel>) {
        let sram = Arc::new(SramModel::new(0x0, 0x4000));
        let ctx = SimContext::new(sram);
        let core = RiscvCore::new(CoreConfig::default(), ctx.clone());
        (ctx, core)
    }

    #[test]
    fn br_add_by_symbol_and_list() {
        let (ctx, _core) = setup();
        ctx.symbols.write().unwrap().add("main", 0x1000, 0x100);
        ctx.bus.load(0x1000, &0x00c5_8533u32.to_le_bytes());

        cmd_br_add(&ctx, "'main'", false).unwrap();
        let list = cmd_br_list(&ctx);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].addr, 0x1000);
        assert_eq!(list[0].symbol.as_deref(), Some("main"));
        assert!(!list[0].hw);
    }

    #[test]
    fn br_add_unknown_symbol_errors() {
        let (ctx, _core) = setup();
        assert_eq!(
            cmd_br_add(&ctx, "'nothere'", false),
            Err(CommandError::UnknownSymbol("nothere".into()))
        );
    }

    #[test]
    fn br_rm_requires_existing_entry() {
        let (ctx, _core) = setup();
        assert_eq!(cmd_br_rm(&ctx, "0x2000"), Err(CommandError::NoBreakpoint(0x2000)));
    }

    #[test]
    fn reg_read_write_by_name() {
        let (_ctx, mut core) = setup();
        cmd_reg_write(&mut core, "a0", 0x1234).unwrap();
        assert_eq!(cmd_reg_read(&core, "a0").unwrap(), 0x1234);
        assert_eq!(cmd_reg_read(&core, "zero").unwrap(), 0);
        assert!(cmd_reg_read(&core, "r42").is_err());
    }

    #[test]
    fn hw_breakpoint_flag_round_trips() {
        let (ctx, _core) = setup();
        ctx.bus.load(0x1000, &0x00c5_8533u32.to_le_bytes());
        cmd_br_add(&ctx, "1000", true).unwrap();
        assert!(cmd_br_list(&ctx)[0].hw);
    }
}
