//! Apple II/IIe memory map: main/aux RAM, language card banking, soft
//! switches, and ROM/slot-ROM reads, exposed to the page-handler bus as a
//! single handler spanning every page (spec §4.2/§9 — "MMU as single
//! handler"). Per-slot I/O (Disk II, SmartPort, ...) is not hardcoded here;
//! a card registers itself in a slot and the MMU routes the slot's $C0n0-
//! $C0nF I/O window and $Cn00-$CnFF ROM window to it.

use crate::bus::PageHandler;
use crate::io::{AppleModel, SoftSwitches};
use crate::sound::Speaker;

/// What a slot card exposes to the bus: its I/O soft-switch window and its
/// 256-byte firmware ROM page.
pub trait SlotCard {
    fn io_read(&mut self, offset: u8) -> u8;
    fn io_write(&mut self, offset: u8, value: u8);
    fn rom_read(&mut self, offset: u8) -> u8;

    /// Called after every `io_write` to this card with direct access to
    /// main RAM. Real SmartPort-style cards are bus masters during a
    /// command: once the firmware trampoline has staged a command number
    /// and a parameter-list pointer into the io window and triggered it,
    /// the card reads the parameter list straight out of RAM rather than
    /// byte-at-a-time through more io registers. Disk II never needs this
    /// (RWTS bit-bangs everything through io_read/io_write) so it keeps
    /// the default no-op.
    fn with_memory(&mut self, _memory: &mut [u8; 65536]) {}
}

pub struct Mmu {
    pub main_ram: Box<[u8; 65536]>,
    pub aux_ram: Box<[u8; 65536]>,
    pub lc_ram: Box<[u8; 16384]>,
    pub lc_ram_bank2: Box<[u8; 4096]>,
    pub rom: Vec<u8>,
    pub model: AppleModel,
    pub switches: SoftSwitches,
    /// Speaker toggle events, timestamped in CPU cycles.
    pub speaker: Speaker,
    /// Set by the run-loop every step; backs both the paddle RC timer
    /// (elapsed cycles since the last $C070 trigger) and the cycle stamp
    /// recorded on every speaker toggle.
    pub current_cycle: u64,
    /// Current scanline, advanced by the video/run-loop layer; drives $C019 VBL.
    pub scanline: u16,
    /// Pages written to since the last `take_dirty_pages` call. Coarse
    /// dirty tracking that lets the video layer skip re-rasterizing frames
    /// where nothing in its source pages changed (spec's `blit() -> bool`).
    dirty_pages: [bool; 256],
    slots: [Option<Box<dyn SlotCard>>; 8],
}

impl Mmu {
    pub fn new(model: AppleModel) -> Self {
        let mut mmu = Mmu {
            main_ram: Box::new([0; 65536]),
            aux_ram: Box::new([0; 65536]),
            lc_ram: Box::new([0; 16384]),
            lc_ram_bank2: Box::new([0; 4096]),
            rom: Vec::new(),
            model,
            switches: SoftSwitches::default(),
            speaker: Speaker::new(),
            current_cycle: 0,
            scanline: 0,
            dirty_pages: [false; 256],
            slots: Default::default(),
        };
        mmu.install_monitor_stub();
        mmu
    }

    /// Returns which pages have been written to since the last call and
    /// clears the tracking. Used by the video layer to skip re-rasterizing
    /// when none of its source pages changed.
    pub fn take_dirty_pages(&mut self) -> [bool; 256] {
        std::mem::replace(&mut self.dirty_pages, [false; 256])
    }

    /// Plugs a card into `slot` (1-7). Panics on an out-of-range slot number
    /// or a slot already occupied — a construction-time wiring error.
    pub fn plug_slot(&mut self, slot: usize, card: Box<dyn SlotCard>) {
        assert!((1..=7).contains(&slot), "slot {slot} out of range");
        assert!(self.slots[slot].is_none(), "slot {slot} already occupied");
        self.slots[slot] = Some(card);
    }

    pub fn is_iie(&self) -> bool {
        matches!(self.model, AppleModel::AppleIIe | AppleModel::AppleIIeEnhanced)
    }

    /// Advances the scanline counter by the given CPU cycle count (65
    /// cycles/scanline, 262 scanlines/frame, NTSC timing), so $C019 reads
    /// reflect whether the beam is in the visible 192 lines or the
    /// vertical-blank tail.
    pub fn advance_scanline(&mut self, cycles: u32) {
        let total = self.scanline as u32 + cycles / 65;
        self.scanline = (total % 262) as u16;
    }

    /// Called once per frame boundary by the run-loop; starts the next
    /// frame out of vertical blank.
    pub fn reset_vb(&mut self) {
        self.scanline = 0;
    }

    /// Loads a ROM image, placing it according to its byte length. Mirrors
    /// the range of dump sizes collectors actually distribute: a bare 2K/
    /// 12K monitor, a full 16K II/II+ image, the 20K II+ ROM package (boot
    /// ROM + monitor bundled with padding), or the 32K IIe image (character
    /// generator + main ROM bundled).
    pub fn load_rom(&mut self, rom_data: &[u8]) {
        match rom_data.len() {
            2048 => {
                self.rom = vec![0xFF; 16384];
                let offset = 0x3800; // $F800 - $C000
                for (i, &byte) in rom_data.iter().enumerate() {
                    if offset + i < self.rom.len() {
                        self.rom[offset + i] = byte;
                    }
                }
            }
            12288 => {
                self.rom = vec![0xFF; 16384];
                for (i, &byte) in rom_data.iter().enumerate() {
                    self.rom[0x1000 + i] = byte;
                }
            }
            16384 => {
                self.rom = rom_data.to_vec();
            }
            20480 => {
                self.rom = vec![0xFF; 16384];
                for i in 0..256 {
                    self.rom[0x0600 + i] = rom_data[0x0600 + i];
                }
                for i in 0..12288 {
                    self.rom[0x1000 + i] = rom_data[0x2000 + i];
                }
                log::info!("loaded 20K ROM package: boot ROM at $C600, monitor at $D000");
            }
            32768 => {
                self.rom = rom_data[0x4000..0x8000].to_vec();
                log::info!("loaded 32K IIe ROM: main ROM at $C000 from file offset $4000");
                if !(self.rom[0x0600] == 0xA2 && self.rom[0x0601] == 0x20) {
                    for i in 0..256 {
                        self.rom[0x0600 + i] = rom_data[0x0600 + i];
                    }
                }
            }
            other => {
                log::warn!("unrecognized ROM size: {other} bytes, loading as-is");
                self.rom = rom_data.to_vec();
            }
        }
    }

    /// Fills $F800-$FFFF with a minimal hand-assembled monitor: just enough
    /// of COUT ($FDED), RDKEY ($FD0C) and CROUT ($FD8E) to echo keystrokes to
    /// the 40-column text screen and hold a `]` prompt, for the case where no
    /// real Monitor ROM dump is supplied. `load_rom` overwrites this wholesale
    /// once a real image is loaded.
    pub fn install_monitor_stub(&mut self) {
        const RDKEY: u16 = 0xFD0C;
        const CROUT: u16 = 0xFD8E;
        const COUT: u16 = 0xFDED;
        const ROW_LO: u16 = 0xFE20;
        const ROW_HI: u16 = 0xFE40;
        const RTI_STUB: u16 = 0xFE60;
        const COLD: u16 = 0xFF00;

        let mut rom = vec![0xFFu8; 16384];
        let at = |addr: u16| (addr - 0xC000) as usize;
        let place = |rom: &mut [u8], addr: u16, bytes: &[u8]| {
            let start = at(addr);
            rom[start..start + bytes.len()].copy_from_slice(bytes);
        };

        // RDKEY: spin on the keyboard strobe, ack it, return the char in A.
        place(
            &mut rom,
            RDKEY,
            &[
                0xAD, 0x00, 0xC0, // LDA $C000
                0x10, 0xFA, // BPL RDKEY
                0x8D, 0x10, 0xC0, // STA $C010 (clear strobe)
                0x60, // RTS
            ],
        );

        // CROUT: CH = 0, CV += 1 wrapping at 24.
        place(
            &mut rom,
            CROUT,
            &[
                0xA9, 0x00, // LDA #$00
                0x85, 0x24, // STA $24 (CH)
                0xE6, 0x25, // INC $25 (CV)
                0xA5, 0x25, // LDA $25
                0xC9, 0x18, // CMP #$18 (24 rows)
                0x90, 0x04, // BCC +4 (skip the wrap)
                0xA9, 0x00, // LDA #$00
                0x85, 0x25, // STA $25
                0x60, // RTS
            ],
        );

        // COUT: a char with CR ($8D) falls straight into CROUT; otherwise
        // plot it at (CH, CV) on the text page and advance CH, tailing into
        // CROUT once CH reaches column 40.
        let (lo0, hi0) = ((ROW_LO & 0xFF) as u8, (ROW_LO >> 8) as u8);
        let (lo1, hi1) = ((ROW_HI & 0xFF) as u8, (ROW_HI >> 8) as u8);
        let (croutlo, crouthi) = ((CROUT & 0xFF) as u8, (CROUT >> 8) as u8);
        place(
            &mut rom,
            COUT,
            &[
                0x48, // PHA
                0xC9, 0x8D, // CMP #$8D
                0xF0, 0x1F, // BEQ +31 (to the PLA/JMP CROUT tail below)
                0xA6, 0x25, // LDX $25 (CV)
                0xBD, lo0, hi0, // LDA ROW_LO,X
                0x85, 0x28, // STA $28 (BASL)
                0xBD, lo1, hi1, // LDA ROW_HI,X
                0x85, 0x29, // STA $29 (BASH)
                0xA4, 0x24, // LDY $24 (CH)
                0x68, // PLA
                0x09, 0x80, // ORA #$80
                0x91, 0x28, // STA ($28),Y
                0xE6, 0x24, // INC $24
                0xA5, 0x24, // LDA $24
                0xC9, 0x28, // CMP #$28 (40 columns)
                0x90, 0x03, // BCC +3 (skip the CROUT call)
                0x20, croutlo, crouthi, // JSR CROUT
                0x60, // RTS
                0x68, // PLA (CR landing pad: discard the saved char)
                0x4C, croutlo, crouthi, // JMP CROUT
            ],
        );

        // Text page row address table (see video.rs's `text_row_offset`):
        // row N's line base is $0400 + (N/8)*$28 + (N%8)*$80.
        let row_base = |row: u16| 0x0400 + (row / 8) * 0x28 + (row % 8) * 0x80;
        let row_lo: Vec<u8> = (0..24).map(|r| (row_base(r) & 0xFF) as u8).collect();
        let row_hi: Vec<u8> = (0..24).map(|r| (row_base(r) >> 8) as u8).collect();
        place(&mut rom, ROW_LO, &row_lo);
        place(&mut rom, ROW_HI, &row_hi);

        // This stub never unmasks interrupts; IRQ/BRK/NMI only need a vector
        // that returns cleanly, not a handler.
        place(&mut rom, RTI_STUB, &[0x40]); // RTI

        // Cold-start: init the stack, home the cursor, print a `]` prompt,
        // then loop reading and echoing keystrokes.
        let (rdkeylo, rdkeyhi) = ((RDKEY & 0xFF) as u8, (RDKEY >> 8) as u8);
        let (coutlo, couthi) = ((COUT & 0xFF) as u8, (COUT >> 8) as u8);
        place(
            &mut rom,
            COLD,
            &[
                0x78, // SEI
                0xA2, 0xFF, // LDX #$FF
                0x9A, // TXS
                0xD8, // CLD
                0xA9, 0x00, // LDA #$00
                0x85, 0x24, // STA $24 (CH)
                0x85, 0x25, // STA $25 (CV)
                0xA9, 0xDD, // LDA #$DD (']' with the high bit set)
                0x20, coutlo, couthi, // JSR COUT
                0x20, rdkeylo, rdkeyhi, // JSR RDKEY
                0x20, coutlo, couthi, // JSR COUT
                0x4C, ((COLD + 16) & 0xFF) as u8, ((COLD + 16) >> 8) as u8, // JMP loop
            ],
        );

        place(&mut rom, 0xFFFA, &[(RTI_STUB & 0xFF) as u8, (RTI_STUB >> 8) as u8]); // NMI
        place(&mut rom, 0xFFFC, &[(COLD & 0xFF) as u8, (COLD >> 8) as u8]); // RESET
        place(&mut rom, 0xFFFE, &[(RTI_STUB & 0xFF) as u8, (RTI_STUB >> 8) as u8]); // IRQ/BRK

        self.rom = rom;
    }

    fn read_soft_switch(&mut self, address: u16) -> u8 {
        let addr = address & 0xFF;
        match addr {
            0x00..=0x0F => self.switches.keyboard_strobe,
            0x10 => {
                let result = self.switches.keyboard_strobe;
                self.switches.keyboard_strobe &= 0x7F;
                result
            }
            0x11 if self.is_iie() => u8_flag(self.switches.lc_bank2),
            0x12 if self.is_iie() => u8_flag(self.switches.lc_read_enable),
            0x13 if self.is_iie() => u8_flag(self.switches.ramrd),
            0x14 if self.is_iie() => u8_flag(self.switches.ramwrt),
            0x15 if self.is_iie() => u8_flag(self.switches.intcxrom),
            0x16 if self.is_iie() => u8_flag(self.switches.altzp),
            0x17 if self.is_iie() => u8_flag(self.switches.slotc3rom),
            0x18 if self.is_iie() => u8_flag(self.switches.store_80),
            0x19 if self.is_iie() => {
                // $C019 RDVBL: bit7 clear during vertical blank (scanlines 192-261).
                if self.scanline >= 192 {
                    0x00
                } else {
                    0x80
                }
            }
            0x1A if self.is_iie() => u8_flag(self.switches.text_mode),
            0x1B if self.is_iie() => u8_flag(self.switches.mixed_mode),
            0x1C if self.is_iie() => u8_flag(self.switches.page2),
            0x1D if self.is_iie() => u8_flag(self.switches.hires),
            0x1E if self.is_iie() => u8_flag(self.switches.alt_char),
            0x1F if self.is_iie() => u8_flag(self.switches.col_80),
            0x11..=0x1F => {
                let result = self.switches.keyboard_strobe;
                self.switches.keyboard_strobe &= 0x7F;
                result
            }
            0x20..=0x2F => 0x00, // cassette I/O, not emulated
            0x30..=0x3F => {
                self.switches.speaker_click = !self.switches.speaker_click;
                self.speaker.click(self.current_cycle);
                0x00
            }
            0x40..=0x4F => 0x00,
            0x50 => {
                self.switches.text_mode = false;
                0x00
            }
            0x51 => {
                self.switches.text_mode = true;
                0x00
            }
            0x52 => {
                self.switches.mixed_mode = false;
                0x00
            }
            0x53 => {
                self.switches.mixed_mode = true;
                0x00
            }
            0x54 => {
                self.switches.page2 = false;
                0x00
            }
            0x55 => {
                self.switches.page2 = true;
                0x00
            }
            0x56 => {
                self.switches.hires = false;
                0x00
            }
            0x57 => {
                self.switches.hires = true;
                0x00
            }
            0x58 => {
                self.switches.annunciator[0] = false;
                0x00
            }
            0x59 => {
                self.switches.annunciator[0] = true;
                0x00
            }
            0x5A => {
                self.switches.annunciator[1] = false;
                0x00
            }
            0x5B => {
                self.switches.annunciator[1] = true;
                0x00
            }
            0x5C => {
                self.switches.annunciator[2] = false;
                0x00
            }
            0x5D => {
                self.switches.annunciator[2] = true;
                0x00
            }
            0x5E => {
                if self.is_iie() && !self.switches.ioudis {
                    self.switches.dhires = true;
                } else {
                    self.switches.annunciator[3] = false;
                }
                0x00
            }
            0x5F => {
                if self.is_iie() && !self.switches.ioudis {
                    self.switches.dhires = false;
                } else {
                    self.switches.annunciator[3] = true;
                }
                0x00
            }
            0x60 => 0x00,
            0x61 => u8_flag(self.switches.button0),
            0x62 => u8_flag(self.switches.button1),
            0x63 => u8_flag(self.switches.button2),
            0x64..=0x67 => {
                let paddle_idx = (addr - 0x64) as usize;
                let paddle_val = match paddle_idx {
                    0 => self.switches.paddle0,
                    1 => self.switches.paddle1,
                    2 => self.switches.paddle2,
                    _ => self.switches.paddle3,
                } as u64;
                // ~11 cycles per unit of RC discharge; a full-deflection
                // paddle (255) takes ~2,805 cycles, matching the documented
                // worst-case ~2,816-cycle paddle timer.
                let timeout_cycles = paddle_val * 11;
                let elapsed = self
                    .current_cycle
                    .saturating_sub(self.switches.paddle_trigger_cycle);
                if elapsed < timeout_cycles {
                    0x80
                } else {
                    0x00
                }
            }
            0x70..=0x7D => {
                self.switches.paddle_trigger_cycle = self.current_cycle;
                0x00
            }
            0x7E if self.is_iie() => u8_flag(self.switches.ioudis),
            0x7F if self.is_iie() => u8_flag(self.switches.dhires),
            0x7E | 0x7F => {
                self.switches.paddle_trigger_cycle = self.current_cycle;
                0x00
            }
            0x80..=0x8F => self.handle_language_card(addr),
            0x90..=0xFF => {
                let slot = ((addr - 0x90) / 16) as usize + 1;
                let offset = addr & 0x0F;
                match self.slots[slot].as_mut() {
                    Some(card) => card.io_read(offset),
                    None => 0x00,
                }
            }
        }
    }

    fn write_soft_switch(&mut self, address: u16, value: u8) {
        let addr = address & 0xFF;
        match addr {
            0x10..=0x1F => {
                self.switches.keyboard_strobe &= 0x7F;
            }
            0x00 if self.is_iie() => self.switches.store_80 = false,
            0x01 if self.is_iie() => self.switches.store_80 = true,
            0x02 if self.is_iie() => self.switches.ramrd = false,
            0x03 if self.is_iie() => self.switches.ramrd = true,
            0x04 if self.is_iie() => self.switches.ramwrt = false,
            0x05 if self.is_iie() => self.switches.ramwrt = true,
            0x06 if self.is_iie() => self.switches.intcxrom = false,
            0x07 if self.is_iie() => self.switches.intcxrom = true,
            0x08 if self.is_iie() => self.switches.altzp = false,
            0x09 if self.is_iie() => self.switches.altzp = true,
            0x0A if self.is_iie() => self.switches.slotc3rom = false,
            0x0B if self.is_iie() => self.switches.slotc3rom = true,
            0x0C if self.is_iie() => self.switches.col_80 = false,
            0x0D if self.is_iie() => self.switches.col_80 = true,
            0x0E if self.is_iie() => self.switches.alt_char = false,
            0x0F if self.is_iie() => self.switches.alt_char = true,
            0x30 => {
                self.switches.speaker_click = !self.switches.speaker_click;
                self.speaker.click(self.current_cycle);
            }
            0x50 => self.switches.text_mode = false,
            0x51 => self.switches.text_mode = true,
            0x52 => self.switches.mixed_mode = false,
            0x53 => self.switches.mixed_mode = true,
            0x54 => self.switches.page2 = false,
            0x55 => self.switches.page2 = true,
            0x56 => self.switches.hires = false,
            0x57 => self.switches.hires = true,
            0x5E if self.is_iie() && !self.switches.ioudis => self.switches.dhires = true,
            0x5F if self.is_iie() && !self.switches.ioudis => self.switches.dhires = false,
            0x7E if self.is_iie() => self.switches.ioudis = true,
            0x7F if self.is_iie() => self.switches.ioudis = false,
            0x80..=0x8F => {
                self.handle_language_card(addr);
            }
            0x90..=0xFF => {
                let slot = ((addr - 0x90) / 16) as usize + 1;
                let offset = addr & 0x0F;
                let Mmu { main_ram, slots, .. } = self;
                if let Some(card) = slots[slot].as_mut() {
                    card.io_write(offset, value);
                    card.with_memory(main_ram);
                }
            }
            _ => {}
        }
    }

    /// Decodes the $C080-$C08F language-card bank/read/write-enable state
    /// machine. Two consecutive reads of an odd address in the same state
    /// are required to arm write-enable — a stray read doesn't accidentally
    /// make the language card writable.
    fn handle_language_card(&mut self, addr: u8) -> u8 {
        let (bank2, read_enable, write_enable_transition) = match addr & 0x0F {
            0x0 | 0x4 => (true, true, false),
            0x1 | 0x5 => (true, false, true),
            0x2 | 0x6 => (true, false, false),
            0x3 | 0x7 => (true, true, true),
            0x8 | 0xC => (false, true, false),
            0x9 | 0xD => (false, false, true),
            0xA | 0xE => (false, false, false),
            0xB | 0xF => (false, true, true),
            _ => return 0x00,
        };

        self.switches.lc_bank2 = bank2;
        self.switches.lc_read_enable = read_enable;
        if write_enable_transition {
            if self.switches.lc_prewrite {
                self.switches.lc_write_enable = true;
            }
            self.switches.lc_prewrite = !self.switches.lc_prewrite;
        } else {
            self.switches.lc_write_enable = false;
            self.switches.lc_prewrite = false;
        }
        log::debug!(
            "language card: bank2={} read={} write={}",
            self.switches.lc_bank2,
            self.switches.lc_read_enable,
            self.switches.lc_write_enable
        );
        0x00
    }

    fn read16(&mut self, address: u16) -> u8 {
        match address {
            0x0000..=0x01FF => {
                if self.is_iie() && self.switches.altzp {
                    self.aux_ram[address as usize]
                } else {
                    self.main_ram[address as usize]
                }
            }
            0x0200..=0xBFFF => {
                // 80STORE overrides RAMRD/RAMWRT for the two video pages
                // when the relevant video mode is active (spec §4.4).
                let video_override = self.switches.store_80
                    && ((0x0400..=0x07FF).contains(&address)
                        || (self.switches.hires && (0x2000..=0x3FFF).contains(&address)));
                let use_aux = if video_override {
                    self.switches.page2
                } else {
                    self.is_iie() && self.switches.ramrd
                };
                if use_aux {
                    self.aux_ram[address as usize]
                } else {
                    self.main_ram[address as usize]
                }
            }
            0xC000..=0xC0FF => self.read_soft_switch(address),
            0xC100..=0xC6FF => {
                let slot = ((address - 0xC100) / 256) as usize + 1;
                let offset = (address & 0xFF) as u8;
                let use_internal = self.is_iie() && self.switches.intcxrom;
                if use_internal && !self.rom.is_empty() {
                    self.rom[(address - 0xC000) as usize]
                } else if let Some(card) = self.slots[slot].as_mut() {
                    card.rom_read(offset)
                } else if !self.rom.is_empty() && self.rom.len() >= 16384 {
                    self.rom[(address - 0xC000) as usize]
                } else {
                    0xFF
                }
            }
            0xC700..=0xCFFF => {
                if !self.rom.is_empty() && self.rom.len() >= 16384 {
                    self.rom[(address - 0xC000) as usize]
                } else {
                    0x00
                }
            }
            0xD000..=0xDFFF => {
                if self.switches.lc_read_enable {
                    if self.switches.lc_bank2 {
                        self.lc_ram_bank2[(address - 0xD000) as usize]
                    } else {
                        self.lc_ram[(address - 0xD000) as usize]
                    }
                } else if !self.rom.is_empty() {
                    let offset = (address - 0xC000) as usize;
                    if offset < self.rom.len() {
                        self.rom[offset]
                    } else {
                        0xFF
                    }
                } else {
                    0xFF
                }
            }
            0xE000..=0xFFFF => {
                if self.switches.lc_read_enable {
                    self.lc_ram[(address - 0xD000) as usize]
                } else if !self.rom.is_empty() {
                    let offset = (address - 0xC000) as usize;
                    if offset < self.rom.len() {
                        self.rom[offset]
                    } else {
                        0xFF
                    }
                } else {
                    0xFF
                }
            }
        }
    }

    fn write16(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0x01FF => {
                if self.is_iie() && self.switches.altzp {
                    self.aux_ram[address as usize] = value;
                } else {
                    self.main_ram[address as usize] = value;
                }
            }
            0x0200..=0xBFFF => {
                let video_override = self.switches.store_80
                    && ((0x0400..=0x07FF).contains(&address)
                        || (self.switches.hires && (0x2000..=0x3FFF).contains(&address)));
                let use_aux = if video_override {
                    self.switches.page2
                } else {
                    self.is_iie() && self.switches.ramwrt
                };
                if use_aux {
                    self.aux_ram[address as usize] = value;
                } else {
                    self.main_ram[address as usize] = value;
                }
                self.dirty_pages[(address >> 8) as usize] = true;
            }
            0xC000..=0xC0FF => self.write_soft_switch(address, value),
            0xC100..=0xCFFF => {}
            0xD000..=0xDFFF => {
                if self.switches.lc_write_enable {
                    if self.switches.lc_bank2 {
                        self.lc_ram_bank2[(address - 0xD000) as usize] = value;
                    } else {
                        self.lc_ram[(address - 0xD000) as usize] = value;
                    }
                }
            }
            0xE000..=0xFFFF => {
                if self.switches.lc_write_enable {
                    self.lc_ram[(address - 0xD000) as usize] = value;
                }
            }
        }
    }
}

fn u8_flag(value: bool) -> u8 {
    if value {
        0x80
    } else {
        0x00
    }
}

impl PageHandler for Mmu {
    fn read(&mut self, page: u8, offset: u8) -> u8 {
        self.read16(((page as u16) << 8) | offset as u16)
    }

    fn write(&mut self, page: u8, offset: u8, value: u8) {
        self.write16(((page as u16) << 8) | offset as u16, value)
    }
}

/// The run-loop drives the CPU straight against the MMU rather than
/// through `bus::Bus`'s 256-entry dispatch table: the MMU already owns
/// every page and branches internally on latch state (spec's "MMU as
/// single handler" design), so a second table on top of it would only add
/// an indirection with nothing left to dispatch.
impl crate::cpu::MemoryBus for Mmu {
    fn read(&mut self, address: u16) -> u8 {
        self.read16(address)
    }

    fn write(&mut self, address: u16, value: u8) {
        self.write16(address, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubCard {
        rom: [u8; 256],
    }
    impl SlotCard for StubCard {
        fn io_read(&mut self, _offset: u8) -> u8 {
            0x42
        }
        fn io_write(&mut self, _offset: u8, _value: u8) {}
        fn rom_read(&mut self, offset: u8) -> u8 {
            self.rom[offset as usize]
        }
    }

    #[test]
    fn main_ram_roundtrips() {
        let mut mmu = Mmu::new(AppleModel::AppleIIe);
        mmu.write(0x04, 0x00, 0xAB);
        assert_eq!(mmu.read(0x04, 0x00), 0xAB);
    }

    #[test]
    fn language_card_requires_two_reads_to_enable_write() {
        let mut mmu = Mmu::new(AppleModel::AppleIIPlus);
        // First read of $C081 arms prewrite but does not enable write yet.
        mmu.read(0xC0, 0x81);
        assert!(!mmu.switches.lc_write_enable);
        // Second read completes the double-read-to-enable-write sequence.
        mmu.read(0xC0, 0x81);
        assert!(mmu.switches.lc_write_enable);
        assert!(mmu.switches.lc_bank2);
    }

    #[test]
    fn slot_io_window_routes_to_card() {
        let mut mmu = Mmu::new(AppleModel::AppleIIe);
        mmu.plug_slot(6, Box::new(StubCard { rom: [0xEE; 256] }));
        assert_eq!(mmu.read(0xC0, 0xE3), 0x42); // slot 6: $C0E0-$C0EF
        assert_eq!(mmu.read(0xC6, 0x10), 0xEE); // slot 6 ROM: $C600-$C6FF
    }

    #[test]
    fn monitor_stub_installs_by_default_and_reset_vector_is_live() {
        let mmu = Mmu::new(AppleModel::AppleIIPlus);
        assert_eq!(mmu.rom.len(), 16384);
        let reset_lo = mmu.rom[(0xFFFC - 0xC000) as usize];
        let reset_hi = mmu.rom[(0xFFFD - 0xC000) as usize];
        let reset_addr = u16::from_le_bytes([reset_lo, reset_hi]);
        assert_eq!(reset_addr, 0xFF00);
        // COUT's entry opcode (PHA) should be in place at $FDED.
        assert_eq!(mmu.rom[(0xFDED - 0xC000) as usize], 0x48);
    }

    #[test]
    fn load_rom_overwrites_the_monitor_stub() {
        let mut mmu = Mmu::new(AppleModel::AppleIIPlus);
        mmu.load_rom(&[0xAA; 16384]);
        assert_eq!(mmu.rom[(0xFDED - 0xC000) as usize], 0xAA);
    }

    #[test]
    fn eighty_store_overrides_ramrd_for_text_page1() {
        let mut mmu = Mmu::new(AppleModel::AppleIIe);
        mmu.switches.store_80 = true;
        mmu.switches.page2 = true;
        mmu.write(0x04, 0x00, 0x99);
        assert_eq!(mmu.aux_ram[0x0400], 0x99);
        assert_eq!(mmu.main_ram[0x0400], 0x00);
    }
}
