//! SmartPort block-device firmware for images too large for a 5.25" Disk
//! II track (≥ 800 KB): `.po`/`.2mg` hard-disk-style images addressed as
//! 512-byte blocks rather than GCR-nibblized tracks.
//!
//! Grounded on the same slot-card dispatch shape as `disk::Disk2InterfaceCard`
//! (an `io_read`/`io_write` window plus a `rom_read` firmware page), but a
//! block device's calling convention is different from Disk II's bit-banged
//! Q6/Q7 sequencer: a caller does `JSR $Cn00` followed by an inline
//! `[command, paramlist_lo, paramlist_hi]` triplet, and the firmware reads
//! its parameters out of a parameter list in main memory rather than out of
//! more io registers. `rom_read` serves a short, real 6502 trampoline that
//! unwinds the return address to find that inline triplet, stages it into
//! the io window, and lets `with_memory` do the actual block copy against
//! RAM before resuming the caller past the inline data with carry
//! clear/set to report success or failure.

use crate::mmu::SlotCard;

pub const BLOCK_SIZE: usize = 512;

const CMD_STATUS: u8 = 0x00;
const CMD_READ_BLOCK: u8 = 0x01;
const CMD_WRITE_BLOCK: u8 = 0x02;
const CMD_FORMAT: u8 = 0x03;

// Standard ProDOS MLI error codes.
const ERR_IO: u8 = 0x27;
const ERR_NO_DEVICE: u8 = 0x28;
const ERR_WRITE_PROTECTED: u8 = 0x2B;

/// Zero-page scratch the firmware trampoline uses to unwind the JSR return
/// address and walk the inline parameter triplet. Private to this card's
/// own firmware; nothing else in the machine touches $F8/$F9.
const SCRATCH_LO: u8 = 0xF8;
const SCRATCH_HI: u8 = 0xF9;

struct Unit {
    data: Vec<u8>,
    write_protected: bool,
}

/// A mounted ≥ 800 KB image, addressed in fixed 512-byte blocks.
pub struct SmartPortCard {
    units: [Option<Unit>; 2],
    io_base: u16,
    rom: Vec<u8>,
    // Staged by the firmware trampoline before it writes the trigger byte.
    staged_command: u8,
    staged_paramlist: u16,
    status: u8,
    trigger_pending: bool,
}

impl SmartPortCard {
    /// `slot` is the 1-7 slot number the card will be plugged into; the
    /// trampoline's absolute-addressed io references are baked in at
    /// construction since ROM is per-slot.
    pub fn new(slot: usize) -> Self {
        let io_base = 0xC090 + ((slot - 1) as u16) * 0x10;
        SmartPortCard {
            units: [None, None],
            io_base,
            rom: build_rom(io_base, 0xC000 + (slot as u16) * 0x100),
            staged_command: 0,
            staged_paramlist: 0,
            status: 0,
            trigger_pending: false,
        }
    }

    /// Mounts a raw image for `unit` (0 or 1). Length must be a whole
    /// number of 512-byte blocks.
    pub fn mount(&mut self, unit: usize, data: Vec<u8>, write_protected: bool) -> bool {
        if unit > 1 || data.len() % BLOCK_SIZE != 0 || data.is_empty() {
            return false;
        }
        self.units[unit] = Some(Unit { data, write_protected });
        true
    }

    pub fn eject(&mut self, unit: usize) {
        if unit <= 1 {
            self.units[unit] = None;
        }
    }

    pub fn block_count(&self, unit: usize) -> usize {
        self.units
            .get(unit)
            .and_then(|u| u.as_ref())
            .map(|u| u.data.len() / BLOCK_SIZE)
            .unwrap_or(0)
    }

    fn unit_for(&self, unit_num: u8) -> usize {
        if unit_num & 0x80 != 0 {
            1
        } else {
            0
        }
    }

    fn execute(&mut self, memory: &mut [u8; 65536]) {
        let p = self.staged_paramlist as usize;
        let unit_idx = self.unit_for(memory[p + 1]);

        self.status = match self.staged_command {
            CMD_STATUS => self.do_status(memory, p, unit_idx),
            CMD_READ_BLOCK => self.do_read(memory, p, unit_idx),
            CMD_WRITE_BLOCK => self.do_write(memory, p, unit_idx),
            CMD_FORMAT => self.do_format(unit_idx),
            _ => ERR_IO,
        };
    }

    fn do_status(&self, memory: &mut [u8; 65536], p: usize, unit_idx: usize) -> u8 {
        let Some(unit) = self.units[unit_idx].as_ref() else {
            return ERR_NO_DEVICE;
        };
        let blocks = unit.data.len() / BLOCK_SIZE;
        let buf = (memory[p + 2] as usize) | ((memory[p + 3] as usize) << 8);
        memory[buf] = (blocks & 0xFF) as u8;
        memory[buf + 1] = ((blocks >> 8) & 0xFF) as u8;
        0
    }

    fn do_read(&mut self, memory: &mut [u8; 65536], p: usize, unit_idx: usize) -> u8 {
        let Some(unit) = self.units[unit_idx].as_ref() else {
            return ERR_NO_DEVICE;
        };
        let buf = (memory[p + 2] as usize) | ((memory[p + 3] as usize) << 8);
        let block = (memory[p + 4] as usize) | ((memory[p + 5] as usize) << 8);
        let offset = block * BLOCK_SIZE;
        if offset + BLOCK_SIZE > unit.data.len() {
            return ERR_IO;
        }
        for i in 0..BLOCK_SIZE {
            memory[(buf + i) & 0xFFFF] = unit.data[offset + i];
        }
        0
    }

    fn do_write(&mut self, memory: &mut [u8; 65536], p: usize, unit_idx: usize) -> u8 {
        let buf = (memory[p + 2] as usize) | ((memory[p + 3] as usize) << 8);
        let block = (memory[p + 4] as usize) | ((memory[p + 5] as usize) << 8);
        let Some(unit) = self.units[unit_idx].as_mut() else {
            return ERR_NO_DEVICE;
        };
        if unit.write_protected {
            return ERR_WRITE_PROTECTED;
        }
        let offset = block * BLOCK_SIZE;
        if offset + BLOCK_SIZE > unit.data.len() {
            return ERR_IO;
        }
        for i in 0..BLOCK_SIZE {
            unit.data[offset + i] = memory[(buf + i) & 0xFFFF];
        }
        0
    }

    fn do_format(&mut self, unit_idx: usize) -> u8 {
        let Some(unit) = self.units[unit_idx].as_mut() else {
            return ERR_NO_DEVICE;
        };
        if unit.write_protected {
            return ERR_WRITE_PROTECTED;
        }
        unit.data.iter_mut().for_each(|b| *b = 0);
        0
    }
}

impl SlotCard for SmartPortCard {
    fn io_read(&mut self, offset: u8) -> u8 {
        if offset == 0 {
            self.status
        } else {
            0x00
        }
    }

    fn io_write(&mut self, offset: u8, value: u8) {
        match offset {
            0 => self.trigger_pending = true,
            1 => self.staged_command = value,
            2 => self.staged_paramlist = (self.staged_paramlist & 0xFF00) | value as u16,
            3 => self.staged_paramlist = (self.staged_paramlist & 0x00FF) | ((value as u16) << 8),
            _ => {}
        }
    }

    fn rom_read(&mut self, offset: u8) -> u8 {
        self.rom.get(offset as usize).copied().unwrap_or(0)
    }

    fn with_memory(&mut self, memory: &mut [u8; 65536]) {
        if self.trigger_pending {
            self.trigger_pending = false;
            self.execute(memory);
        }
    }
}

fn push_abs(code: &mut Vec<u8>, opcode: u8, addr: u16) {
    code.push(opcode);
    code.push((addr & 0xFF) as u8);
    code.push((addr >> 8) as u8);
}

fn push_branch(code: &mut Vec<u8>, opcode: u8, body: impl FnOnce(&mut Vec<u8>)) {
    code.push(opcode);
    let rel_pos = code.len();
    code.push(0);
    body(code);
    let rel = (code.len() - (rel_pos + 1)) as u8;
    code[rel_pos] = rel;
}

/// Builds the slot ROM page: a JMP past a short block-device identification
/// header into the real command-dispatch trampoline.
fn build_rom(io_base: u16, rom_base: u16) -> Vec<u8> {
    let mut rom = vec![0u8; 256];

    let entry_offset: u8 = 0x08;
    rom[0] = 0x4C; // JMP abs
    rom[1] = entry_offset;
    rom[2] = (rom_base >> 8) as u8;
    // Conventional ProDOS block-device identification bytes; this crate
    // doesn't implement the boot-time firmware scan that would read them.
    rom[3] = 0x00;
    rom[4] = 0x20;
    rom[5] = 0x00;
    rom[6] = 0x03;
    rom[7] = 0x00;

    let mut code: Vec<u8> = Vec::new();
    code.push(0x68); // PLA -> low byte of return address
    code.push(0x85);
    code.push(SCRATCH_LO); // STA scratch_lo
    code.push(0x68); // PLA -> high byte
    code.push(0x85);
    code.push(SCRATCH_HI); // STA scratch_hi

    code.push(0xE6);
    code.push(SCRATCH_LO); // INC scratch_lo (JSR pushes retaddr-1)
    push_branch(&mut code, 0xD0, |c| {
        // BNE +body
        c.push(0xE6);
        c.push(SCRATCH_HI); // INC scratch_hi
    });

    code.push(0xA0);
    code.push(0x00); // LDY #0
    code.push(0xB1);
    code.push(SCRATCH_LO); // LDA (scratch),Y  ; command byte
    push_abs(&mut code, 0x8D, io_base + 1); // STA io_base+1

    code.push(0xC8); // INY
    code.push(0xB1);
    code.push(SCRATCH_LO); // LDA (scratch),Y  ; paramlist lo
    push_abs(&mut code, 0x8D, io_base + 2);

    code.push(0xC8); // INY
    code.push(0xB1);
    code.push(SCRATCH_LO); // LDA (scratch),Y  ; paramlist hi
    push_abs(&mut code, 0x8D, io_base + 3);

    // advance the saved return address past the 3 inline bytes
    code.push(0xA5);
    code.push(SCRATCH_LO); // LDA scratch_lo
    code.push(0x18); // CLC
    code.push(0x69);
    code.push(0x03); // ADC #3
    code.push(0x85);
    code.push(SCRATCH_LO); // STA scratch_lo
    push_branch(&mut code, 0x90, |c| {
        // BCC +body
        c.push(0xE6);
        c.push(SCRATCH_HI); // INC scratch_hi
    });

    code.push(0xA5);
    code.push(SCRATCH_HI); // LDA scratch_hi
    code.push(0x48); // PHA
    code.push(0xA5);
    code.push(SCRATCH_LO); // LDA scratch_lo
    code.push(0x48); // PHA

    code.push(0xA9);
    code.push(0x00); // LDA #0
    push_abs(&mut code, 0x8D, io_base); // STA io_base (trigger)
    push_abs(&mut code, 0xAD, io_base); // LDA io_base (status)

    code.push(0xC9);
    code.push(0x00); // CMP #0
    push_branch(&mut code, 0xF0, |c| {
        // BEQ +body
        c.push(0x38); // SEC
        c.push(0x60); // RTS
    });
    code.push(0x18); // CLC
    code.push(0x60); // RTS

    let start = entry_offset as usize;
    rom[start..start + code.len()].copy_from_slice(&code);
    rom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_card_with_image(blocks: usize) -> SmartPortCard {
        let mut card = SmartPortCard::new(5);
        card.mount(0, vec![0u8; blocks * BLOCK_SIZE], false);
        card
    }

    #[test]
    fn status_reports_block_count() {
        let mut card = make_card_with_image(1600);
        let mut memory = [0u8; 65536];
        let p = 0x2000usize;
        memory[p] = 3; // param count
        memory[p + 1] = 0; // unit 0
        memory[p + 2] = 0x00;
        memory[p + 3] = 0x30; // status buffer at $3000
        card.staged_command = CMD_STATUS;
        card.staged_paramlist = p as u16;
        card.execute(&mut memory);
        assert_eq!(card.io_read(0), 0);
        assert_eq!(memory[0x3000], (1600 & 0xFF) as u8);
        assert_eq!(memory[0x3001], (1600 >> 8) as u8);
    }

    #[test]
    fn read_block_copies_image_data_into_ram() {
        let mut card = make_card_with_image(4);
        if let Some(unit) = card.units[0].as_mut() {
            unit.data[BLOCK_SIZE] = 0xAB;
        }
        let mut memory = [0u8; 65536];
        let p = 0x2000usize;
        memory[p + 1] = 0;
        memory[p + 2] = 0x00;
        memory[p + 3] = 0x40; // buffer at $4000
        memory[p + 4] = 1; // block 1
        memory[p + 5] = 0;
        card.staged_command = CMD_READ_BLOCK;
        card.staged_paramlist = p as u16;
        card.execute(&mut memory);
        assert_eq!(card.io_read(0), 0);
        assert_eq!(memory[0x4000], 0xAB);
    }

    #[test]
    fn write_block_is_rejected_when_write_protected() {
        let mut card = SmartPortCard::new(5);
        card.mount(0, vec![0u8; 4 * BLOCK_SIZE], true);
        let mut memory = [0u8; 65536];
        let p = 0x2000usize;
        memory[p + 1] = 0;
        memory[p + 4] = 0;
        memory[p + 5] = 0;
        card.staged_command = CMD_WRITE_BLOCK;
        card.staged_paramlist = p as u16;
        card.execute(&mut memory);
        assert_eq!(card.io_read(0), ERR_WRITE_PROTECTED);
    }

    #[test]
    fn read_out_of_range_block_reports_io_error() {
        let mut card = make_card_with_image(2);
        let mut memory = [0u8; 65536];
        let p = 0x2000usize;
        memory[p + 1] = 0;
        memory[p + 4] = 200;
        memory[p + 5] = 0;
        card.staged_command = CMD_READ_BLOCK;
        card.staged_paramlist = p as u16;
        card.execute(&mut memory);
        assert_eq!(card.io_read(0), ERR_IO);
    }

    #[test]
    fn entry_trampoline_is_well_formed_6502() {
        let card = SmartPortCard::new(3);
        // JMP past the identification header into the trampoline.
        assert_eq!(card.rom[0], 0x4C);
        assert_eq!(card.rom[1], 0x08);
        // Trampoline starts by unwinding the JSR return address.
        assert_eq!(card.rom[8], 0x68); // PLA
    }
}
