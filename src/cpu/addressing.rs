//! Addressing-mode helpers shared by the opcode tables.

use super::{Cpu, MemoryBus};

/// Addressing mode tag, kept for disassembly/debugging use; instruction
/// dispatch in `mod.rs` calls the per-mode helper methods directly rather
/// than branching on this enum.
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub enum AddressingMode {
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    /// (zp) indirect without index — 65C02 only.
    IndirectZeroPage,
    Relative,
    Implied,
}

impl Cpu {
    pub(super) fn get_immediate<M: MemoryBus>(&mut self, memory: &mut M) -> u8 {
        let value = memory.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.cycles += 1;
        value
    }

    pub(super) fn get_zeropage_addr<M: MemoryBus>(&mut self, memory: &mut M) -> u16 {
        let addr = memory.read(self.regs.pc) as u16;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.cycles += 1;
        addr
    }

    pub(super) fn get_zeropage_x_addr<M: MemoryBus>(&mut self, memory: &mut M) -> u16 {
        let base = memory.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.cycles += 2; // +1 zero-page fetch, +1 index add
        base.wrapping_add(self.regs.x) as u16
    }

    pub(super) fn get_zeropage_y_addr<M: MemoryBus>(&mut self, memory: &mut M) -> u16 {
        let base = memory.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.cycles += 2;
        base.wrapping_add(self.regs.y) as u16
    }

    pub(super) fn get_absolute_addr<M: MemoryBus>(&mut self, memory: &mut M) -> u16 {
        let low = memory.read(self.regs.pc) as u16;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let high = memory.read(self.regs.pc) as u16;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.cycles += 2;
        (high << 8) | low
    }

    /// `write` forces the page-cross penalty cycle unconditionally, matching
    /// real 6502 behavior: RMW and store addressing always take the extra
    /// cycle, read-only addressing only takes it when a page is actually
    /// crossed.
    pub(super) fn get_absolute_x_addr<M: MemoryBus>(&mut self, memory: &mut M, write: bool) -> u16 {
        let low = memory.read(self.regs.pc) as u16;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let high = memory.read(self.regs.pc) as u16;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let base = (high << 8) | low;
        let addr = base.wrapping_add(self.regs.x as u16);
        self.cycles += 2;
        if write || (base & 0xFF00) != (addr & 0xFF00) {
            self.cycles += 1;
        }
        addr
    }

    pub(super) fn get_absolute_y_addr<M: MemoryBus>(&mut self, memory: &mut M, write: bool) -> u16 {
        let low = memory.read(self.regs.pc) as u16;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let high = memory.read(self.regs.pc) as u16;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let base = (high << 8) | low;
        let addr = base.wrapping_add(self.regs.y as u16);
        self.cycles += 2;
        if write || (base & 0xFF00) != (addr & 0xFF00) {
            self.cycles += 1;
        }
        addr
    }

    pub(super) fn get_indirect_x_addr<M: MemoryBus>(&mut self, memory: &mut M) -> u16 {
        let base = memory.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let ptr = base.wrapping_add(self.regs.x);
        let low = memory.read(ptr as u16) as u16;
        let high = memory.read(ptr.wrapping_add(1) as u16) as u16;
        self.cycles += 4;
        (high << 8) | low
    }

    pub(super) fn get_indirect_y_addr<M: MemoryBus>(&mut self, memory: &mut M, write: bool) -> u16 {
        let ptr = memory.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let low = memory.read(ptr as u16) as u16;
        let high = memory.read(ptr.wrapping_add(1) as u16) as u16;
        let base = (high << 8) | low;
        let addr = base.wrapping_add(self.regs.y as u16);
        self.cycles += 3;
        if write || (base & 0xFF00) != (addr & 0xFF00) {
            self.cycles += 1;
        }
        addr
    }

    /// (zp) — 65C02-only indirect addressing with no index register.
    pub(super) fn get_indirect_zp_addr<M: MemoryBus>(&mut self, memory: &mut M) -> u16 {
        let ptr = memory.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let low = memory.read(ptr as u16) as u16;
        let high = memory.read(ptr.wrapping_add(1) as u16) as u16;
        self.cycles += 3;
        (high << 8) | low
    }

    #[allow(dead_code)]
    pub(super) fn get_relative_addr<M: MemoryBus>(&mut self, memory: &mut M) -> u16 {
        let offset = memory.read(self.regs.pc) as i8;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.cycles += 1;
        self.regs.pc.wrapping_add(offset as u16)
    }

    /// Shared branch logic: always consumes the opcode's operand byte, adds
    /// a cycle when the branch is taken, and a further cycle when the
    /// taken branch crosses a page boundary.
    pub(super) fn branch<M: MemoryBus>(&mut self, memory: &mut M, condition: bool) {
        let offset = memory.read(self.regs.pc) as i8;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.cycles += 1;

        if condition {
            let old_pc = self.regs.pc;
            self.regs.pc = self.regs.pc.wrapping_add(offset as u16);
            self.cycles += 1;
            if (old_pc & 0xFF00) != (self.regs.pc & 0xFF00) {
                self.cycles += 1;
            }
        }
    }
}
