//! MOS 6502 / 65C02 CPU core.
//!
//! The instruction set is split across three files the way the reference
//! implementation this was grown from split it: `addressing.rs` holds the
//! addressing-mode helpers, `opcodes.rs` holds load/store/transfer/stack/
//! ADC/SBC, and `opcodes2.rs` holds compare/inc-dec/logical/shift/BIT/
//! TRB-TSB/branch/jump/interrupt/flag instructions plus the 65C02 bit
//! manipulation extensions. `execute_opcode` below ties the three together
//! into one dispatch table.

mod opcodes;
mod opcodes2;
pub mod addressing;

use serde::{Deserialize, Serialize};

/// Status register flag bits.
pub mod flags {
    pub const CARRY: u8 = 0b0000_0001;
    pub const ZERO: u8 = 0b0000_0010;
    pub const IRQ_DISABLE: u8 = 0b0000_0100;
    pub const DECIMAL: u8 = 0b0000_1000;
    pub const BREAK: u8 = 0b0001_0000;
    pub const UNUSED: u8 = 0b0010_0000;
    pub const OVERFLOW: u8 = 0b0100_0000;
    pub const NEGATIVE: u8 = 0b1000_0000;
}

/// Which instruction set the core decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuType {
    /// Original NMOS 6502 (Apple II, II+).
    Cpu6502,
    /// CMOS 65C02 (Apple IIe Enhanced, IIc).
    Cpu65C02,
}

/// CPU register file.
#[derive(Debug, Clone)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub status: u8,
}

impl Default for Registers {
    fn default() -> Self {
        Registers {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            pc: 0,
            status: flags::UNUSED | flags::IRQ_DISABLE,
        }
    }
}

impl Registers {
    pub fn set_flag(&mut self, flag: u8, value: bool) {
        if value {
            self.status |= flag;
        } else {
            self.status &= !flag;
        }
    }

    pub fn get_flag(&self, flag: u8) -> bool {
        (self.status & flag) != 0
    }

    pub fn update_zero_negative_flags(&mut self, value: u8) {
        self.set_flag(flags::ZERO, value == 0);
        self.set_flag(flags::NEGATIVE, (value & 0x80) != 0);
    }
}

/// Register file and cycle counter as captured by `Cpu::get_state`, plain
/// enough to embed directly in `savestate::SaveState`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub status: u8,
    pub total_cycles: u64,
    pub irq_pending: bool,
    pub nmi_pending: bool,
}

/// What the CPU needs from the rest of the machine: a flat 64K address
/// space. The page-handler bus (`crate::bus::Bus`) is the production
/// implementation; tests can substitute a plain `Vec<u8>`-backed stub.
pub trait MemoryBus {
    fn read(&mut self, address: u16) -> u8;
    fn write(&mut self, address: u16, value: u8);
}

/// 6502/65C02 instruction core.
#[derive(Debug, Clone)]
pub struct Cpu {
    pub regs: Registers,
    pub cpu_type: CpuType,
    /// Cycles executed since power-on.
    pub total_cycles: u64,
    /// Cycles consumed by the instruction (or interrupt) currently stepping.
    pub cycles: u32,
    /// IRQ line level (asserted by a device until it is serviced or deasserted).
    pub irq_pending: bool,
    /// NMI line level; only the falling edge triggers service.
    pub nmi_pending: bool,
    nmi_edge_detected: bool,
    prev_nmi: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(CpuType::Cpu6502)
    }
}

impl Cpu {
    pub fn new(cpu_type: CpuType) -> Self {
        Cpu {
            regs: Registers::default(),
            cpu_type,
            total_cycles: 0,
            cycles: 0,
            irq_pending: false,
            nmi_pending: false,
            nmi_edge_detected: false,
            prev_nmi: false,
        }
    }

    /// Loads PC from the reset vector ($FFFC/$FFFD) and charges the 7-cycle
    /// reset sequence.
    pub fn reset<M: MemoryBus>(&mut self, memory: &mut M) {
        self.regs = Registers::default();
        let low = memory.read(0xFFFC) as u16;
        let high = memory.read(0xFFFD) as u16;
        self.regs.pc = (high << 8) | low;
        self.cycles = 7;
        self.total_cycles += 7;
    }

    fn handle_nmi<M: MemoryBus>(&mut self, memory: &mut M) {
        self.push_word(memory, self.regs.pc);
        let status = (self.regs.status | flags::UNUSED) & !flags::BREAK;
        self.push_byte(memory, status);
        self.regs.set_flag(flags::IRQ_DISABLE, true);
        let low = memory.read(0xFFFA) as u16;
        let high = memory.read(0xFFFB) as u16;
        self.regs.pc = (high << 8) | low;
        self.cycles += 7;
        self.nmi_edge_detected = false;
    }

    fn handle_irq<M: MemoryBus>(&mut self, memory: &mut M) {
        if self.regs.get_flag(flags::IRQ_DISABLE) {
            return;
        }
        self.push_word(memory, self.regs.pc);
        let status = (self.regs.status | flags::UNUSED) & !flags::BREAK;
        self.push_byte(memory, status);
        self.regs.set_flag(flags::IRQ_DISABLE, true);
        let low = memory.read(0xFFFE) as u16;
        let high = memory.read(0xFFFF) as u16;
        self.regs.pc = (high << 8) | low;
        self.cycles += 7;
    }

    /// Services a pending interrupt or executes one instruction, returning
    /// the number of cycles consumed. NMI takes priority over IRQ; IRQ is
    /// masked by the I flag, NMI never is.
    pub fn step<M: MemoryBus>(&mut self, memory: &mut M) -> u32 {
        self.cycles = 0;

        if self.nmi_pending && !self.prev_nmi {
            self.nmi_edge_detected = true;
        }
        self.prev_nmi = self.nmi_pending;

        if self.nmi_edge_detected {
            self.handle_nmi(memory);
            self.total_cycles += self.cycles as u64;
            return self.cycles;
        }

        if self.irq_pending && !self.regs.get_flag(flags::IRQ_DISABLE) {
            self.handle_irq(memory);
            self.total_cycles += self.cycles as u64;
            return self.cycles;
        }

        let opcode = self.fetch_byte(memory);
        self.execute_opcode(memory, opcode);

        self.total_cycles += self.cycles as u64;
        self.cycles
    }

    /// Executes whole instructions until cumulative cycles advance by at
    /// least `n`. May overshoot by up to 7 cycles (the cost of the longest
    /// single step: an interrupt service). Returns the cycles actually
    /// executed.
    pub fn step_cycles<M: MemoryBus>(&mut self, memory: &mut M, n: u32) -> u32 {
        let start = self.total_cycles;
        let target = start + n as u64;
        while self.total_cycles < target {
            self.step(memory);
        }
        (self.total_cycles - start) as u32
    }

    /// As `step_cycles`, invoking `callback` after each instruction with a
    /// one-line trace: PC, opcode byte, and the register file at the point
    /// of execution.
    pub fn step_cycles_debug<M: MemoryBus>(
        &mut self,
        memory: &mut M,
        n: u32,
        mut callback: impl FnMut(&str),
    ) -> u32 {
        let start = self.total_cycles;
        let target = start + n as u64;
        while self.total_cycles < target {
            let pc = self.regs.pc;
            let opcode = memory.read(pc);
            self.step(memory);
            callback(&format!(
                "{:04X}  {:02X}        A={:02X} X={:02X} Y={:02X} SP={:02X} P={:02X}",
                pc, opcode, self.regs.a, self.regs.x, self.regs.y, self.regs.sp, self.regs.status
            ));
        }
        (self.total_cycles - start) as u32
    }

    /// Asserts the IRQ line. Level-triggered: stays pending until a device
    /// deasserts it or it is serviced with I clear.
    pub fn irq(&mut self) {
        self.irq_pending = true;
    }

    /// Clears the IRQ line (device deasserting its interrupt request).
    pub fn irq_clear(&mut self) {
        self.irq_pending = false;
    }

    /// Asserts NMI. Edge-triggered: only the transition from clear to set
    /// schedules service, so callers should clear it after one `step`
    /// unless the device intends to hold a fresh edge.
    pub fn nmi(&mut self) {
        self.nmi_pending = true;
    }

    pub fn nmi_clear(&mut self) {
        self.nmi_pending = false;
    }

    /// Snapshots the register file and cycle counter.
    pub fn get_state(&self) -> CpuSnapshot {
        CpuSnapshot {
            a: self.regs.a,
            x: self.regs.x,
            y: self.regs.y,
            sp: self.regs.sp,
            pc: self.regs.pc,
            status: self.regs.status,
            total_cycles: self.total_cycles,
            irq_pending: self.irq_pending,
            nmi_pending: self.nmi_pending,
        }
    }

    /// Restores a snapshot taken by `get_state`.
    pub fn set_state(&mut self, state: &CpuSnapshot) {
        self.regs.a = state.a;
        self.regs.x = state.x;
        self.regs.y = state.y;
        self.regs.sp = state.sp;
        self.regs.pc = state.pc;
        self.regs.status = state.status;
        self.total_cycles = state.total_cycles;
        self.irq_pending = state.irq_pending;
        self.nmi_pending = state.nmi_pending;
        self.prev_nmi = state.nmi_pending;
        self.nmi_edge_detected = false;
    }

    fn fetch_byte<M: MemoryBus>(&mut self, memory: &mut M) -> u8 {
        let value = memory.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.cycles += 1;
        value
    }

    #[allow(dead_code)]
    fn fetch_word<M: MemoryBus>(&mut self, memory: &mut M) -> u16 {
        let low = self.fetch_byte(memory) as u16;
        let high = self.fetch_byte(memory) as u16;
        (high << 8) | low
    }

    fn push_byte<M: MemoryBus>(&mut self, memory: &mut M, value: u8) {
        memory.write(0x0100 | self.regs.sp as u16, value);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
    }

    fn pop_byte<M: MemoryBus>(&mut self, memory: &mut M) -> u8 {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        memory.read(0x0100 | self.regs.sp as u16)
    }

    fn push_word<M: MemoryBus>(&mut self, memory: &mut M, value: u16) {
        self.push_byte(memory, (value >> 8) as u8);
        self.push_byte(memory, value as u8);
    }

    fn pop_word<M: MemoryBus>(&mut self, memory: &mut M) -> u16 {
        let low = self.pop_byte(memory) as u16;
        let high = self.pop_byte(memory) as u16;
        (high << 8) | low
    }

    fn execute_opcode<M: MemoryBus>(&mut self, memory: &mut M, opcode: u8) {
        match opcode {
            // LDA
            0xA9 => self.lda_immediate(memory),
            0xA5 => self.lda_zeropage(memory),
            0xB5 => self.lda_zeropage_x(memory),
            0xAD => self.lda_absolute(memory),
            0xBD => self.lda_absolute_x(memory),
            0xB9 => self.lda_absolute_y(memory),
            0xA1 => self.lda_indirect_x(memory),
            0xB1 => self.lda_indirect_y(memory),

            // LDX
            0xA2 => self.ldx_immediate(memory),
            0xA6 => self.ldx_zeropage(memory),
            0xB6 => self.ldx_zeropage_y(memory),
            0xAE => self.ldx_absolute(memory),
            0xBE => self.ldx_absolute_y(memory),

            // LDY
            0xA0 => self.ldy_immediate(memory),
            0xA4 => self.ldy_zeropage(memory),
            0xB4 => self.ldy_zeropage_x(memory),
            0xAC => self.ldy_absolute(memory),
            0xBC => self.ldy_absolute_x(memory),

            // STA
            0x85 => self.sta_zeropage(memory),
            0x95 => self.sta_zeropage_x(memory),
            0x8D => self.sta_absolute(memory),
            0x9D => self.sta_absolute_x(memory),
            0x99 => self.sta_absolute_y(memory),
            0x81 => self.sta_indirect_x(memory),
            0x91 => self.sta_indirect_y(memory),

            // STX
            0x86 => self.stx_zeropage(memory),
            0x96 => self.stx_zeropage_y(memory),
            0x8E => self.stx_absolute(memory),

            // STY
            0x84 => self.sty_zeropage(memory),
            0x94 => self.sty_zeropage_x(memory),
            0x8C => self.sty_absolute(memory),

            // Transfers
            0xAA => self.tax(),
            0x8A => self.txa(),
            0xA8 => self.tay(),
            0x98 => self.tya(),
            0xBA => self.tsx(),
            0x9A => self.txs(),

            // Stack
            0x48 => self.pha(memory),
            0x68 => self.pla(memory),
            0x08 => self.php(memory),
            0x28 => self.plp(memory),

            // ADC
            0x69 => self.adc_immediate(memory),
            0x65 => self.adc_zeropage(memory),
            0x75 => self.adc_zeropage_x(memory),
            0x6D => self.adc_absolute(memory),
            0x7D => self.adc_absolute_x(memory),
            0x79 => self.adc_absolute_y(memory),
            0x61 => self.adc_indirect_x(memory),
            0x71 => self.adc_indirect_y(memory),

            // SBC
            0xE9 => self.sbc_immediate(memory),
            0xE5 => self.sbc_zeropage(memory),
            0xF5 => self.sbc_zeropage_x(memory),
            0xED => self.sbc_absolute(memory),
            0xFD => self.sbc_absolute_x(memory),
            0xF9 => self.sbc_absolute_y(memory),
            0xE1 => self.sbc_indirect_x(memory),
            0xF1 => self.sbc_indirect_y(memory),

            // Compare
            0xC9 => self.cmp_immediate(memory),
            0xC5 => self.cmp_zeropage(memory),
            0xD5 => self.cmp_zeropage_x(memory),
            0xCD => self.cmp_absolute(memory),
            0xDD => self.cmp_absolute_x(memory),
            0xD9 => self.cmp_absolute_y(memory),
            0xC1 => self.cmp_indirect_x(memory),
            0xD1 => self.cmp_indirect_y(memory),

            0xE0 => self.cpx_immediate(memory),
            0xE4 => self.cpx_zeropage(memory),
            0xEC => self.cpx_absolute(memory),

            0xC0 => self.cpy_immediate(memory),
            0xC4 => self.cpy_zeropage(memory),
            0xCC => self.cpy_absolute(memory),

            // Inc/dec
            0xE6 => self.inc_zeropage(memory),
            0xF6 => self.inc_zeropage_x(memory),
            0xEE => self.inc_absolute(memory),
            0xFE => self.inc_absolute_x(memory),

            0xC6 => self.dec_zeropage(memory),
            0xD6 => self.dec_zeropage_x(memory),
            0xCE => self.dec_absolute(memory),
            0xDE => self.dec_absolute_x(memory),

            0xE8 => self.inx(),
            0xC8 => self.iny(),
            0xCA => self.dex(),
            0x88 => self.dey(),

            // AND
            0x29 => self.and_immediate(memory),
            0x25 => self.and_zeropage(memory),
            0x35 => self.and_zeropage_x(memory),
            0x2D => self.and_absolute(memory),
            0x3D => self.and_absolute_x(memory),
            0x39 => self.and_absolute_y(memory),
            0x21 => self.and_indirect_x(memory),
            0x31 => self.and_indirect_y(memory),

            // ORA
            0x09 => self.ora_immediate(memory),
            0x05 => self.ora_zeropage(memory),
            0x15 => self.ora_zeropage_x(memory),
            0x0D => self.ora_absolute(memory),
            0x1D => self.ora_absolute_x(memory),
            0x19 => self.ora_absolute_y(memory),
            0x01 => self.ora_indirect_x(memory),
            0x11 => self.ora_indirect_y(memory),

            // EOR
            0x49 => self.eor_immediate(memory),
            0x45 => self.eor_zeropage(memory),
            0x55 => self.eor_zeropage_x(memory),
            0x4D => self.eor_absolute(memory),
            0x5D => self.eor_absolute_x(memory),
            0x59 => self.eor_absolute_y(memory),
            0x41 => self.eor_indirect_x(memory),
            0x51 => self.eor_indirect_y(memory),

            // Shifts
            0x0A => self.asl_accumulator(),
            0x06 => self.asl_zeropage(memory),
            0x16 => self.asl_zeropage_x(memory),
            0x0E => self.asl_absolute(memory),
            0x1E => self.asl_absolute_x(memory),

            0x4A => self.lsr_accumulator(),
            0x46 => self.lsr_zeropage(memory),
            0x56 => self.lsr_zeropage_x(memory),
            0x4E => self.lsr_absolute(memory),
            0x5E => self.lsr_absolute_x(memory),

            0x2A => self.rol_accumulator(),
            0x26 => self.rol_zeropage(memory),
            0x36 => self.rol_zeropage_x(memory),
            0x2E => self.rol_absolute(memory),
            0x3E => self.rol_absolute_x(memory),

            0x6A => self.ror_accumulator(),
            0x66 => self.ror_zeropage(memory),
            0x76 => self.ror_zeropage_x(memory),
            0x6E => self.ror_absolute(memory),
            0x7E => self.ror_absolute_x(memory),

            // BIT
            0x24 => self.bit_zeropage(memory),
            0x2C => self.bit_absolute(memory),

            // Branches
            0x10 => self.bpl(memory),
            0x30 => self.bmi(memory),
            0x50 => self.bvc(memory),
            0x70 => self.bvs(memory),
            0x90 => self.bcc(memory),
            0xB0 => self.bcs(memory),
            0xD0 => self.bne(memory),
            0xF0 => self.beq(memory),

            // Jump/call
            0x4C => self.jmp_absolute(memory),
            0x6C => self.jmp_indirect(memory),
            0x20 => self.jsr(memory),
            0x60 => self.rts(memory),

            // Interrupts
            0x00 => self.brk(memory),
            0x40 => self.rti(memory),

            // Flags
            0x18 => self.clc(),
            0x38 => self.sec(),
            0x58 => self.cli(),
            0x78 => self.sei(),
            0xB8 => self.clv(),
            0xD8 => self.cld(),
            0xF8 => self.sed(),

            0xEA => self.nop(),

            // 65C02 extensions
            0x1A if self.cpu_type == CpuType::Cpu65C02 => self.ina(),
            0x3A if self.cpu_type == CpuType::Cpu65C02 => self.dea(),
            0x80 if self.cpu_type == CpuType::Cpu65C02 => self.bra(memory),
            0x64 if self.cpu_type == CpuType::Cpu65C02 => self.stz_zeropage(memory),
            0x74 if self.cpu_type == CpuType::Cpu65C02 => self.stz_zeropage_x(memory),
            0x9C if self.cpu_type == CpuType::Cpu65C02 => self.stz_absolute(memory),
            0x9E if self.cpu_type == CpuType::Cpu65C02 => self.stz_absolute_x(memory),
            0x7C if self.cpu_type == CpuType::Cpu65C02 => self.jmp_absolute_x(memory),
            0x12 if self.cpu_type == CpuType::Cpu65C02 => self.ora_indirect(memory),
            0x32 if self.cpu_type == CpuType::Cpu65C02 => self.and_indirect(memory),
            0x52 if self.cpu_type == CpuType::Cpu65C02 => self.eor_indirect(memory),
            0x72 if self.cpu_type == CpuType::Cpu65C02 => self.adc_indirect(memory),
            0x92 if self.cpu_type == CpuType::Cpu65C02 => self.sta_indirect(memory),
            0xB2 if self.cpu_type == CpuType::Cpu65C02 => self.lda_indirect(memory),
            0xD2 if self.cpu_type == CpuType::Cpu65C02 => self.cmp_indirect(memory),
            0xF2 if self.cpu_type == CpuType::Cpu65C02 => self.sbc_indirect(memory),
            0xDA if self.cpu_type == CpuType::Cpu65C02 => self.phx(memory),
            0xFA if self.cpu_type == CpuType::Cpu65C02 => self.plx(memory),
            0x5A if self.cpu_type == CpuType::Cpu65C02 => self.phy(memory),
            0x7A if self.cpu_type == CpuType::Cpu65C02 => self.ply(memory),
            0x89 if self.cpu_type == CpuType::Cpu65C02 => self.bit_immediate(memory),
            0x34 if self.cpu_type == CpuType::Cpu65C02 => self.bit_zeropage_x(memory),
            0x3C if self.cpu_type == CpuType::Cpu65C02 => self.bit_absolute_x(memory),
            0x14 if self.cpu_type == CpuType::Cpu65C02 => self.trb_zeropage(memory),
            0x1C if self.cpu_type == CpuType::Cpu65C02 => self.trb_absolute(memory),
            0x04 if self.cpu_type == CpuType::Cpu65C02 => self.tsb_zeropage(memory),
            0x0C if self.cpu_type == CpuType::Cpu65C02 => self.tsb_absolute(memory),

            // RMB
            0x07 if self.cpu_type == CpuType::Cpu65C02 => self.rmb(memory, 0),
            0x17 if self.cpu_type == CpuType::Cpu65C02 => self.rmb(memory, 1),
            0x27 if self.cpu_type == CpuType::Cpu65C02 => self.rmb(memory, 2),
            0x37 if self.cpu_type == CpuType::Cpu65C02 => self.rmb(memory, 3),
            0x47 if self.cpu_type == CpuType::Cpu65C02 => self.rmb(memory, 4),
            0x57 if self.cpu_type == CpuType::Cpu65C02 => self.rmb(memory, 5),
            0x67 if self.cpu_type == CpuType::Cpu65C02 => self.rmb(memory, 6),
            0x77 if self.cpu_type == CpuType::Cpu65C02 => self.rmb(memory, 7),

            // SMB
            0x87 if self.cpu_type == CpuType::Cpu65C02 => self.smb(memory, 0),
            0x97 if self.cpu_type == CpuType::Cpu65C02 => self.smb(memory, 1),
            0xA7 if self.cpu_type == CpuType::Cpu65C02 => self.smb(memory, 2),
            0xB7 if self.cpu_type == CpuType::Cpu65C02 => self.smb(memory, 3),
            0xC7 if self.cpu_type == CpuType::Cpu65C02 => self.smb(memory, 4),
            0xD7 if self.cpu_type == CpuType::Cpu65C02 => self.smb(memory, 5),
            0xE7 if self.cpu_type == CpuType::Cpu65C02 => self.smb(memory, 6),
            0xF7 if self.cpu_type == CpuType::Cpu65C02 => self.smb(memory, 7),

            // BBR
            0x0F if self.cpu_type == CpuType::Cpu65C02 => self.bbr(memory, 0),
            0x1F if self.cpu_type == CpuType::Cpu65C02 => self.bbr(memory, 1),
            0x2F if self.cpu_type == CpuType::Cpu65C02 => self.bbr(memory, 2),
            0x3F if self.cpu_type == CpuType::Cpu65C02 => self.bbr(memory, 3),
            0x4F if self.cpu_type == CpuType::Cpu65C02 => self.bbr(memory, 4),
            0x5F if self.cpu_type == CpuType::Cpu65C02 => self.bbr(memory, 5),
            0x6F if self.cpu_type == CpuType::Cpu65C02 => self.bbr(memory, 6),
            0x7F if self.cpu_type == CpuType::Cpu65C02 => self.bbr(memory, 7),

            // BBS
            0x8F if self.cpu_type == CpuType::Cpu65C02 => self.bbs(memory, 0),
            0x9F if self.cpu_type == CpuType::Cpu65C02 => self.bbs(memory, 1),
            0xAF if self.cpu_type == CpuType::Cpu65C02 => self.bbs(memory, 2),
            0xBF if self.cpu_type == CpuType::Cpu65C02 => self.bbs(memory, 3),
            0xCF if self.cpu_type == CpuType::Cpu65C02 => self.bbs(memory, 4),
            0xDF if self.cpu_type == CpuType::Cpu65C02 => self.bbs(memory, 5),
            0xEF if self.cpu_type == CpuType::Cpu65C02 => self.bbs(memory, 6),
            0xFF if self.cpu_type == CpuType::Cpu65C02 => self.bbs(memory, 7),

            // Multi-byte NOPs for illegal 65C02 opcodes (2-byte, immediate-style operand)
            0x02 | 0x22 | 0x42 | 0x62 | 0x82 | 0xC2 | 0xE2 if self.cpu_type == CpuType::Cpu65C02 => {
                let _ = self.fetch_byte(memory);
                self.cycles += 1;
            }

            // 2-byte, zero-page-style operand
            0x44 | 0x54 | 0xD4 | 0xF4 if self.cpu_type == CpuType::Cpu65C02 => {
                let _ = self.fetch_byte(memory);
                self.cycles += 2;
            }

            // 3-byte, absolute-style operand
            0x5C | 0xDC | 0xFC if self.cpu_type == CpuType::Cpu65C02 => {
                let _ = self.fetch_byte(memory);
                let _ = self.fetch_byte(memory);
                self.cycles += 4;
            }

            // Undefined opcode: treated as a 1-cycle NOP on both cores.
            _ => {
                self.cycles += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatMemory(Vec<u8>);
    impl MemoryBus for FlatMemory {
        fn read(&mut self, address: u16) -> u8 {
            self.0[address as usize]
        }
        fn write(&mut self, address: u16, value: u8) {
            self.0[address as usize] = value;
        }
    }

    fn cpu_with(cpu_type: CpuType, program: &[u8]) -> (Cpu, FlatMemory) {
        let mut mem = vec![0u8; 0x10000];
        mem[0x0200..0x0200 + program.len()].copy_from_slice(program);
        mem[0xFFFC] = 0x00;
        mem[0xFFFD] = 0x02;
        let mut cpu = Cpu::new(cpu_type);
        let mut bus = FlatMemory(mem);
        cpu.reset(&mut bus);
        (cpu, bus)
    }

    #[test]
    fn lda_immediate_sets_zero_and_negative() {
        let (mut cpu, mut mem) = cpu_with(CpuType::Cpu6502, &[0xA9, 0x00]);
        cpu.step(&mut mem);
        assert_eq!(cpu.regs.a, 0);
        assert!(cpu.regs.get_flag(flags::ZERO));
        assert!(!cpu.regs.get_flag(flags::NEGATIVE));
    }

    #[test]
    fn adc_bcd_carries_into_tens_digit() {
        let (mut cpu, mut mem) = cpu_with(CpuType::Cpu6502, &[0x69, 0x09]);
        cpu.regs.set_flag(flags::DECIMAL, true);
        cpu.regs.a = 0x09;
        cpu.step(&mut mem);
        assert_eq!(cpu.regs.a, 0x18);
    }

    #[test]
    fn jmp_indirect_has_page_wrap_bug_on_nmos_only() {
        let (mut cpu_nmos, mut mem_nmos) = cpu_with(CpuType::Cpu6502, &[0x6C, 0xFF, 0x02]);
        mem_nmos.0[0x02FF] = 0x34;
        mem_nmos.0[0x0300] = 0x12;
        mem_nmos.0[0x0200] = 0x78;
        cpu_nmos.step(&mut mem_nmos);
        assert_eq!(cpu_nmos.regs.pc, 0x7834);

        let (mut cpu_cmos, mut mem_cmos) = cpu_with(CpuType::Cpu65C02, &[0x6C, 0xFF, 0x02]);
        mem_cmos.0[0x02FF] = 0x34;
        mem_cmos.0[0x0300] = 0x12;
        cpu_cmos.step(&mut mem_cmos);
        assert_eq!(cpu_cmos.regs.pc, 0x1234);
    }

    #[test]
    fn bra_is_only_decoded_on_65c02() {
        let (mut cpu, mut mem) = cpu_with(CpuType::Cpu6502, &[0x80, 0x10]);
        let pc_before = cpu.regs.pc;
        cpu.step(&mut mem);
        assert_eq!(cpu.regs.pc, pc_before.wrapping_add(1));
    }

    #[test]
    fn step_cycles_runs_at_least_the_requested_budget() {
        let (mut cpu, mut mem) = cpu_with(CpuType::Cpu6502, &[0xEA, 0xEA, 0xEA, 0xEA]);
        let executed = cpu.step_cycles(&mut mem, 5);
        assert!(executed >= 5);
    }

    #[test]
    fn get_state_set_state_round_trips() {
        let (mut cpu, mut mem) = cpu_with(CpuType::Cpu6502, &[0xA9, 0x42]);
        cpu.step(&mut mem);
        let snapshot = cpu.get_state();
        cpu.regs.a = 0;
        cpu.set_state(&snapshot);
        assert_eq!(cpu.regs.a, 0x42);
        assert_eq!(cpu.total_cycles, snapshot.total_cycles);
    }

    #[test]
    fn irq_is_masked_by_interrupt_disable_flag() {
        let (mut cpu, mut mem) = cpu_with(CpuType::Cpu6502, &[0xEA]);
        cpu.regs.set_flag(flags::IRQ_DISABLE, true);
        cpu.irq();
        let pc_before = cpu.regs.pc;
        cpu.step(&mut mem);
        assert_eq!(cpu.regs.pc, pc_before.wrapping_add(1));
    }

    #[test]
    fn nmi_services_even_when_irq_disable_is_set() {
        let (mut cpu, mut mem) = cpu_with(CpuType::Cpu6502, &[0xEA]);
        mem.0[0xFFFA] = 0x00;
        mem.0[0xFFFB] = 0x03;
        cpu.regs.set_flag(flags::IRQ_DISABLE, true);
        cpu.nmi();
        cpu.step(&mut mem);
        assert_eq!(cpu.regs.pc, 0x0300);
    }
}
