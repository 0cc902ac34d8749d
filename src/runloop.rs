//! The machine: ties the CPU to the MMU and the two card-shaped peripherals
//! that can't live inside `Mmu::slots` (disk and SmartPort need direct
//! typed access for save-state capture), drives the cycle budget per host
//! frame tick, and exposes the control/disk/I-O surface a frontend drives.
//!
//! Grounded on `apple2.rs`'s `Apple2` struct and its `MemoryBus` impl,
//! which special-cases the same handful of address ranges before falling
//! through to the generic memory map.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::cpu::{Cpu, CpuType, MemoryBus};
use crate::disk::Disk2InterfaceCard;
use crate::error::ImageError;
use crate::io::AppleModel;
use crate::mmu::{Mmu, SlotCard};
use crate::smartport::SmartPortCard;
use crate::video::Video;

/// Disk II always answers at slot 6 ($C0E0-$C0EF I/O, $C600-$C6FF ROM),
/// SmartPort at slot 5 ($C0D0-$C0DF I/O, $C500-$C5FF ROM) once a big image
/// is mounted. Both are fixed by convention rather than configurable; real
/// Disk II and SmartPort controller cards boot at these slots too.
const DISK_SLOT: u8 = 6;
const SMARTPORT_SLOT: usize = 5;

/// Images at or above this size don't fit a 5.25" track layout and are
/// addressed as SmartPort blocks instead.
const SMARTPORT_THRESHOLD: usize = 800 * 1024;

pub struct MachineOptions {
    pub model: AppleModel,
    pub khz: u32,
}

impl Default for MachineOptions {
    fn default() -> Self {
        MachineOptions {
            model: AppleModel::AppleIIe,
            khz: 1023,
        }
    }
}

/// Per-drive bookkeeping the disk/SmartPort modules themselves don't carry
/// (a card knows its bytes, not what a host called the file they came from).
#[derive(Debug, Clone, Default)]
struct DriveInfo {
    name: String,
    ext: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskMetadata {
    pub name: String,
    pub ext: String,
    pub read_only: bool,
    pub dirty: bool,
    pub block_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub encoding: String,
    pub data: String,
}

/// Frame/render counters, persisted as part of a save state (spec's video
/// flash phase depends on `frames`' parity surviving a restore).
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub frames: u64,
    pub rendered_frames: u64,
}

pub struct TickResult {
    pub cycles_executed: u32,
    pub redrew: bool,
}

pub struct Machine {
    pub cpu: Cpu,
    pub mmu: Mmu,
    pub disk: Disk2InterfaceCard,
    pub smartport: Option<SmartPortCard>,
    pub video: Video,
    pub stats: Stats,

    khz: u32,
    running: bool,
    key_queue: VecDeque<u8>,
    vbr_boot_done: bool,
    drive_info: [DriveInfo; 2],
}

impl Machine {
    pub fn new(options: MachineOptions) -> Self {
        let mmu = Mmu::new(options.model);
        Machine {
            cpu: Cpu::new(cpu_type_for(options.model)),
            mmu,
            disk: Disk2InterfaceCard::new(),
            smartport: None,
            video: Video::new(),
            stats: Stats::default(),
            khz: options.khz,
            running: false,
            key_queue: VecDeque::new(),
            vbr_boot_done: false,
            drive_info: Default::default(),
        }
    }

    /// Loads a system ROM image and auto-detects the model from its size,
    /// the way a real machine's ROM set determines what it is.
    pub fn load_rom(&mut self, rom_data: &[u8]) {
        self.mmu.model = detect_model_from_rom(rom_data.len(), self.mmu.model);
        self.mmu.load_rom(rom_data);
        if rom_data.len() >= 0x0700 {
            let candidate = &rom_data[0x0600..0x0700];
            if candidate[0] == 0xA2 && candidate[1] == 0x20 {
                let _ = self.disk.load_boot_rom(candidate);
            }
        }
        if rom_data.len() == 32768 {
            self.video.load_char_rom_from_iie_rom(rom_data);
        }
    }

    pub fn load_disk_rom(&mut self, data: &[u8]) -> Result<(), ImageError> {
        self.disk.load_boot_rom(data)
    }

    /// Resets CPU, soft switches and the disk controller. When a disk is
    /// loaded and no boot ROM was supplied, the reset vector lands on
    /// $C600 which the memory-bus dispatch below turns into a virtual
    /// boot (straight track0/sector0 decode) instead of real firmware.
    pub fn reset(&mut self) {
        self.mmu.switches = crate::io::SoftSwitches::default();
        self.mmu.current_cycle = 0;
        for addr in 0x0400..=0x07FFusize {
            self.mmu.main_ram[addr] = 0xA0;
        }
        self.disk.reset();
        self.vbr_boot_done = false;

        let mut cpu = std::mem::take(&mut self.cpu);
        cpu.reset(self);
        self.cpu = cpu;

        if self.disk.drives[0].disk.disk_loaded {
            self.mmu.main_ram[0x01FC] = DISK_SLOT;
            self.cpu.regs.sp = 0xFC;
            self.cpu.regs.pc = 0xC600;
        }
    }

    // ---- control surface (spec run-loop) ----------------------------

    pub fn run(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn update_khz(&mut self, khz: u32) {
        self.khz = khz;
    }

    pub fn khz(&self) -> u32 {
        self.khz
    }

    /// Runs one host-driven scheduling step: `elapsed_ms` since the last
    /// tick, clamped to at most `interval_ms` worth of cycles so a stalled
    /// host (debugger breakpoint, backgrounded tab) can't demand a single
    /// tick simulate hours of emulated time.
    pub fn tick(&mut self, elapsed_ms: f64, interval_ms: f64) -> TickResult {
        if !self.running {
            return TickResult {
                cycles_executed: 0,
                redrew: false,
            };
        }

        self.service_key_queue();

        let wanted = elapsed_ms * self.khz as f64;
        let capped = self.khz as f64 * interval_ms;
        let budget = wanted.min(capped).max(0.0) as u32;

        // Step instruction-by-instruction rather than via `Cpu::step_cycles`
        // so `mmu.current_cycle` (what disk/speaker timing reads during a
        // bus access) advances as we go, not only after the whole budget
        // has run against a CPU that's been `mem::take`n out from under it.
        let start_cycle = self.mmu.current_cycle;
        let mut cpu = std::mem::take(&mut self.cpu);
        while (self.mmu.current_cycle - start_cycle) < budget as u64 {
            let cycles = cpu.step(self);
            self.mmu.current_cycle += cycles as u64;
        }
        self.cpu = cpu;
        let executed = (self.mmu.current_cycle - start_cycle) as u32;

        self.mmu.advance_scanline(executed);
        if self.mmu.is_iie() {
            self.mmu.reset_vb();
        }
        self.disk.update(self.cpu.total_cycles);

        self.video.multi_screen(self.mmu.switches.annunciator[0]);
        let redrew = self.video.blit(&mut self.mmu);
        self.stats.frames += 1;
        if redrew {
            self.stats.rendered_frames += 1;
        }

        TickResult {
            cycles_executed: executed,
            redrew,
        }
    }

    pub fn drain_audio(&mut self) -> Vec<u64> {
        self.mmu.speaker.drain_events()
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn video(&self) -> &Video {
        &self.video
    }

    pub fn video_mut(&mut self) -> &mut Video {
        &mut self.video
    }

    pub fn io(&self) -> &crate::io::SoftSwitches {
        &self.mmu.switches
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    // ---- I/O surface ---------------------------------------------------

    pub fn key_down(&mut self, code: u8) {
        self.mmu.switches.set_key(code);
    }

    pub fn key_up(&mut self) {
        self.mmu.switches.keyboard_strobe &= 0x7F;
    }

    /// Queues ASCII bytes to be typed one at a time as the program polls
    /// the keyboard, draining a byte whenever no key is currently strobed.
    pub fn set_key_buffer(&mut self, text: &str) {
        self.key_queue.extend(text.bytes());
    }

    fn service_key_queue(&mut self) {
        if !self.mmu.switches.has_key_strobe() {
            if let Some(byte) = self.key_queue.pop_front() {
                self.mmu.switches.set_key(byte);
            }
        }
    }

    pub fn button_down(&mut self, button: usize) {
        self.mmu.switches.set_button(button, true);
    }

    pub fn button_up(&mut self, button: usize) {
        self.mmu.switches.set_button(button, false);
    }

    pub fn paddle(&mut self, paddle: usize, value: f32) {
        self.mmu.switches.set_joystick_axis(paddle, value);
    }

    pub fn annunciator(&self, n: usize) -> bool {
        self.mmu.switches.annunciator.get(n).copied().unwrap_or(false)
    }

    // ---- disk surface ----------------------------------------------

    fn unit_for_drive(drive: usize) -> Option<usize> {
        match drive {
            1 => Some(0),
            2 => Some(1),
            _ => None,
        }
    }

    /// Mounts raw image bytes. Images at or above the SmartPort size
    /// threshold are mounted as a block device instead of a 5.25" track
    /// image; everything else goes through the Disk II nibblizer.
    pub fn set_binary(&mut self, drive: usize, name: &str, ext: &str, bytes: &[u8]) -> bool {
        let Some(unit) = Self::unit_for_drive(drive) else {
            return false;
        };

        let ok = if bytes.len() >= SMARTPORT_THRESHOLD {
            let payload = strip_2img_header(bytes).unwrap_or_else(|| bytes.to_vec());
            let card = self
                .smartport
                .get_or_insert_with(|| SmartPortCard::new(SMARTPORT_SLOT));
            card.mount(unit, payload, false)
        } else {
            self.disk.load_image(unit, bytes, Some(ext)).is_ok()
        };

        if ok {
            self.drive_info[unit] = DriveInfo {
                name: name.to_string(),
                ext: ext.to_string(),
            };
        }
        ok
    }

    pub fn set_json(&mut self, drive: usize, json: &str) -> bool {
        let Ok(descriptor) = serde_json::from_str::<DiskDescriptor>(json) else {
            return false;
        };
        if descriptor.encoding != "base64" {
            return false;
        }
        use base64::Engine as _;
        let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(&descriptor.data) else {
            return false;
        };
        self.set_binary(drive, &descriptor.name, &descriptor.kind, &bytes)
    }

    pub fn get_binary(&self, drive: usize) -> Option<Vec<u8>> {
        let unit = Self::unit_for_drive(drive)?;
        self.disk.export_disk(unit).ok()
    }

    pub fn get_json(&self, drive: usize, pretty: bool) -> Option<String> {
        let unit = Self::unit_for_drive(drive)?;
        let bytes = self.get_binary(drive)?;
        use base64::Engine as _;
        let descriptor = DiskDescriptor {
            kind: self.drive_info[unit].ext.clone(),
            name: self.drive_info[unit].name.clone(),
            encoding: "base64".to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(&bytes),
        };
        if pretty {
            serde_json::to_string_pretty(&descriptor).ok()
        } else {
            serde_json::to_string(&descriptor).ok()
        }
    }

    pub fn get_metadata(&self, drive: usize) -> Option<DiskMetadata> {
        let unit = Self::unit_for_drive(drive)?;

        if let Some(card) = &self.smartport {
            let blocks = card.block_count(unit);
            if blocks > 0 {
                return Some(DiskMetadata {
                    name: self.drive_info[unit].name.clone(),
                    ext: self.drive_info[unit].ext.clone(),
                    read_only: false,
                    dirty: false,
                    block_count: Some(blocks),
                });
            }
        }

        let disk = &self.disk.drives[unit].disk;
        if !disk.disk_loaded {
            return None;
        }
        Some(DiskMetadata {
            name: self.drive_info[unit].name.clone(),
            ext: self.drive_info[unit].ext.clone(),
            read_only: disk.write_protected,
            dirty: disk.modified,
            block_count: None,
        })
    }

    pub fn eject_disk(&mut self, drive: usize) {
        let Some(unit) = Self::unit_for_drive(drive) else {
            return;
        };
        self.disk.eject_disk(unit);
        if let Some(card) = &mut self.smartport {
            card.eject(unit);
        }
        self.drive_info[unit] = DriveInfo::default();
    }

    // ---- virtual boot ------------------------------------------------

    fn vbr_boot(&mut self) -> bool {
        if !self.disk.drives[0].disk.disk_loaded {
            return false;
        }
        let Some(dsk_data) = self.disk.drives[0].disk.dsk_data.clone() else {
            return false;
        };
        if dsk_data.len() < 256 {
            return false;
        }
        for (i, &byte) in dsk_data[0..256].iter().enumerate() {
            self.mmu.main_ram[0x0800 + i] = byte;
        }
        self.disk.motor_on = true;
        self.generate_decode_table();
        self.cpu.regs.pc = 0x0801;
        self.cpu.regs.sp = 0xFF;
        self.vbr_boot_done = true;
        crate::disk_log::log_boot_jump(0x0801);
        true
    }

    /// Writes the 6-and-2 GCR decode table RWTS expects preloaded at
    /// $0356-$0395 so the bytes vbr_boot() copied straight off disk can be
    /// treated as if firmware had nibblized and decoded them in flight.
    fn generate_decode_table(&mut self) {
        #[rustfmt::skip]
        const DECODE_TABLE: [u8; 64] = [
            0x00, 0x01, 0x98, 0x99, 0x02, 0x03, 0x9C, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C,
            0x0D, 0x0E, 0xA0, 0xA1, 0x0F, 0x10, 0x11, 0x12, 0x13, 0xA9, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19,
            0x1A, 0x1B, 0x1C, 0x1D, 0x1E, 0x1F, 0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29,
            0x2A, 0x2B, 0x2C, 0x2D, 0x2E, 0x2F, 0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39,
        ];
        for (i, &value) in DECODE_TABLE.iter().enumerate() {
            let addr = 0x0356 + i;
            if addr < 0x0400 {
                self.mmu.main_ram[addr] = value;
            }
        }
    }
}

impl MemoryBus for Machine {
    fn read(&mut self, address: u16) -> u8 {
        match address {
            0xC0E0..=0xC0EF => {
                self.disk.cumulative_cycles = self.mmu.current_cycle;
                self.disk.io_read((address - 0xC0E0) as u8)
            }
            0xC0D0..=0xC0DF if self.smartport.is_some() => self
                .smartport
                .as_mut()
                .map(|card| card.io_read((address - 0xC0D0) as u8))
                .unwrap_or(0x00),
            0xC600..=0xC6FF => {
                if self.disk.is_rom_loaded() {
                    self.disk.read_rom((address - 0xC600) as u8)
                } else {
                    if !self.vbr_boot_done && address == 0xC600 {
                        self.vbr_boot();
                    }
                    self.mmu.read(0x0801)
                }
            }
            0xC500..=0xC5FF if self.smartport.is_some() => self
                .smartport
                .as_mut()
                .map(|card| card.rom_read((address - 0xC500) as u8))
                .unwrap_or(0xFF),
            _ => self.mmu.read(address),
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            0xC0E0..=0xC0EF => {
                self.disk.cumulative_cycles = self.mmu.current_cycle;
                self.disk.io_write((address - 0xC0E0) as u8, value);
            }
            0xC0D0..=0xC0DF if self.smartport.is_some() => {
                if let Some(card) = self.smartport.as_mut() {
                    card.io_write((address - 0xC0D0) as u8, value);
                    card.with_memory(&mut self.mmu.main_ram);
                }
            }
            0xC500..=0xC6FF => {}
            _ => self.mmu.write(address, value),
        }
    }
}

fn cpu_type_for(model: AppleModel) -> CpuType {
    match model {
        AppleModel::AppleIIeEnhanced => CpuType::Cpu65C02,
        _ => CpuType::Cpu6502,
    }
}

fn detect_model_from_rom(len: usize, fallback: AppleModel) -> AppleModel {
    match len {
        32768 => AppleModel::AppleIIe,
        20480 | 12288 => AppleModel::AppleIIPlus,
        16384 => AppleModel::AppleIIe,
        _ => fallback,
    }
}

fn strip_2img_header(data: &[u8]) -> Option<Vec<u8>> {
    if data.len() >= 64 && &data[0..4] == b"2IMG" {
        let offset = u32::from_le_bytes([data[24], data[25], data[26], data[27]]) as usize;
        let length = u32::from_le_bytes([data[28], data[29], data[30], data[31]]) as usize;
        if offset.checked_add(length).map(|end| end <= data.len()) == Some(true) {
            return Some(data[offset..offset + length].to_vec());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_machine_boots_to_reset_vector_zero() {
        let machine = Machine::new(MachineOptions::default());
        assert_eq!(machine.cpu.regs.pc, 0);
        assert!(!machine.is_running());
    }

    #[test]
    fn run_stop_toggles_running_flag() {
        let mut machine = Machine::new(MachineOptions::default());
        machine.run();
        assert!(machine.is_running());
        machine.stop();
        assert!(!machine.is_running());
    }

    #[test]
    fn tick_is_a_no_op_while_stopped() {
        let mut machine = Machine::new(MachineOptions::default());
        let result = machine.tick(16.0, 16.0);
        assert_eq!(result.cycles_executed, 0);
    }

    #[test]
    fn tick_advances_cycles_while_running() {
        let mut machine = Machine::new(MachineOptions::default());
        machine.run();
        let result = machine.tick(16.0, 16.0);
        assert!(result.cycles_executed > 0);
        assert_eq!(machine.stats.frames, 1);
    }

    #[test]
    fn key_buffer_drains_one_byte_per_poll() {
        let mut machine = Machine::new(MachineOptions::default());
        machine.set_key_buffer("HI");
        machine.service_key_queue();
        assert_eq!(machine.mmu.switches.keyboard_strobe, b'H' | 0x80);
        machine.key_up();
        machine.service_key_queue();
        assert_eq!(machine.mmu.switches.keyboard_strobe, b'I' | 0x80);
    }

    #[test]
    fn set_binary_routes_small_image_to_disk_ii() {
        let mut machine = Machine::new(MachineOptions::default());
        let bytes = vec![0u8; 143360];
        assert!(machine.set_binary(1, "dos33", "dsk", &bytes));
        assert!(machine.get_metadata(1).is_some());
    }

    #[test]
    fn set_binary_routes_large_image_to_smartport() {
        let mut machine = Machine::new(MachineOptions::default());
        let bytes = vec![0u8; 900 * 1024];
        assert!(machine.set_binary(1, "hd20", "po", &bytes));
        assert!(machine.smartport.is_some());
        let meta = machine.get_metadata(1).unwrap();
        assert_eq!(meta.block_count, Some(900 * 1024 / crate::smartport::BLOCK_SIZE));
    }

    #[test]
    fn eject_clears_metadata() {
        let mut machine = Machine::new(MachineOptions::default());
        let bytes = vec![0u8; 143360];
        machine.set_binary(1, "dos33", "dsk", &bytes);
        machine.eject_disk(1);
        assert!(machine.get_metadata(1).is_none());
    }

    #[test]
    fn unknown_drive_index_is_rejected() {
        let mut machine = Machine::new(MachineOptions::default());
        assert!(!machine.set_binary(3, "x", "dsk", &[0u8; 143360]));
    }
}
